use adview_protocol::{ElementId, Millis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ratio at which an element counts as viewable (IAB display standard).
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// How long an element must stay viewable before it is reported.
pub const DEFAULT_REQUIRED_TIME_MS: Millis = 1_000;

/// Ratios at which the host is asked to notify. Finer than the configured
/// threshold so crossings are seen promptly whatever the threshold is.
pub const OBSERVATION_THRESHOLDS: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

#[derive(Debug, Error, PartialEq)]
pub enum OptionsError {
    #[error("threshold must be a finite ratio within [0, 1], got {0}")]
    Threshold(f64),
    #[error("required time must be greater than zero")]
    ZeroRequiredTime,
}

/// Tunables for a single observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewabilityOptions {
    pub threshold: f64,
    pub required_time_ms: Millis,
}

impl Default for ViewabilityOptions {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            required_time_ms: DEFAULT_REQUIRED_TIME_MS,
        }
    }
}

impl ViewabilityOptions {
    pub fn new(threshold: f64, required_time_ms: Millis) -> Result<Self, OptionsError> {
        let options = Self {
            threshold,
            required_time_ms,
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(OptionsError::Threshold(self.threshold));
        }
        if self.required_time_ms == 0 {
            return Err(OptionsError::ZeroRequiredTime);
        }
        Ok(())
    }
}

type ChangeFn = Box<dyn FnMut(bool, Millis)>;
type ElementFn = Box<dyn FnMut(ElementId)>;

/// Callbacks attached to an observation.
///
/// `on_change(is_viewable, duration_ms)` always fires first, then the
/// matching `on_viewable` / `on_hidden` hook with the element.
pub struct ViewabilityHooks {
    pub(crate) on_change: ChangeFn,
    pub(crate) on_viewable: Option<ElementFn>,
    pub(crate) on_hidden: Option<ElementFn>,
}

impl ViewabilityHooks {
    pub fn new(on_change: impl FnMut(bool, Millis) + 'static) -> Self {
        Self {
            on_change: Box::new(on_change),
            on_viewable: None,
            on_hidden: None,
        }
    }

    #[must_use]
    pub fn on_viewable(mut self, f: impl FnMut(ElementId) + 'static) -> Self {
        self.on_viewable = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_hidden(mut self, f: impl FnMut(ElementId) + 'static) -> Self {
        self.on_hidden = Some(Box::new(f));
        self
    }

    pub(crate) fn viewable(&mut self, element: ElementId, duration: Millis) {
        (self.on_change)(true, duration);
        if let Some(f) = self.on_viewable.as_mut() {
            f(element);
        }
    }

    pub(crate) fn hidden(&mut self, element: ElementId, duration: Millis) {
        (self.on_change)(false, duration);
        if let Some(f) = self.on_hidden.as_mut() {
            f(element);
        }
    }
}

impl std::fmt::Debug for ViewabilityHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewabilityHooks")
            .field("on_viewable", &self.on_viewable.is_some())
            .field("on_hidden", &self.on_hidden.is_some())
            .finish_non_exhaustive()
    }
}
