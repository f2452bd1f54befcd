//! Ad viewability tracking.
//!
//! An element is reported viewable once at least `threshold` of its area has
//! stayed inside the viewport for `required_time_ms`. Each continuous streak
//! reports at most once; streaks shorter than the required time never report.
//! The tracker also gates manual reloads of the ad surface behind a cooldown.

pub mod options;
pub mod phase;

use std::collections::HashMap;

use adview_protocol::{ElementId, FrameId, IntersectionEntry, Millis, TimerId};
use serde::Serialize;

use crate::host::{Host, Wakeup, WakeupSink};

pub use options::{
    DEFAULT_REQUIRED_TIME_MS, DEFAULT_THRESHOLD, OBSERVATION_THRESHOLDS, OptionsError,
    ViewabilityHooks, ViewabilityOptions,
};
pub use phase::{Phase, Report};

/// Minimum time between two reloads of the same ad surface.
pub const REFRESH_COOLDOWN_MS: Millis = 30_000;

/// Source assigned to a surface for the single frame between clear and
/// restore.
pub const BLANK_SOURCE: &str = "about:blank";

/// Handle returned by [`ViewabilityTracker::observe`].
///
/// Passing it to [`ViewabilityTracker::unobserve`] is always safe: an inert
/// or superseded subscription does nothing.
#[must_use = "dropping a subscription leaks the observation; pass it to `unobserve`"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    element: Option<ElementId>,
    generation: u64,
}

impl Subscription {
    /// A subscription that observes nothing.
    pub fn inert() -> Self {
        Self {
            element: None,
            generation: 0,
        }
    }

    pub fn element(&self) -> Option<ElementId> {
        self.element
    }

    pub fn is_inert(&self) -> bool {
        self.element.is_none()
    }
}

/// Snapshot of an element's viewability state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewabilityStats {
    pub is_viewable: bool,
    pub view_start_time: Option<Millis>,
    pub has_reported_viewable: bool,
    pub last_refresh_time: Option<Millis>,
}

#[derive(Debug)]
struct Registration {
    generation: u64,
    options: ViewabilityOptions,
    hooks: ViewabilityHooks,
}

#[derive(Debug, Default)]
struct ElementState {
    phase: Phase,
    last_refresh: Option<Millis>,
    registration: Option<Registration>,
}

impl ElementState {
    fn stats(&self) -> ViewabilityStats {
        ViewabilityStats {
            is_viewable: self.phase.is_viewable(),
            view_start_time: self.phase.view_start(),
            has_reported_viewable: self.phase.has_reported(),
            last_refresh_time: self.last_refresh,
        }
    }
}

/// Tracks viewability for every observed ad element on a page.
///
/// One registration per element: observing an element again supersedes the
/// earlier registration. State lives in an explicit registry keyed by
/// [`ElementId`] and is discarded on [`unobserve`](Self::unobserve).
#[derive(Debug)]
pub struct ViewabilityTracker<H: Host> {
    host: H,
    elements: HashMap<ElementId, ElementState>,
    pending_reloads: HashMap<FrameId, (ElementId, String)>,
    next_generation: u64,
}

impl<H: Host> ViewabilityTracker<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            elements: HashMap::new(),
            pending_reloads: HashMap::new(),
            next_generation: 0,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Start tracking an element.
    ///
    /// `None` (the element is not mounted) yields an inert subscription.
    pub fn observe(
        &mut self,
        element: Option<ElementId>,
        hooks: ViewabilityHooks,
        options: ViewabilityOptions,
    ) -> Subscription {
        let Some(element) = element else {
            return Subscription::inert();
        };
        if let Err(err) = options.validate() {
            tracing::warn!(%element, %err, "invalid viewability options, not observing");
            return Subscription::inert();
        }

        self.next_generation += 1;
        let generation = self.next_generation;

        let state = self.elements.entry(element).or_default();
        if state.registration.is_some() {
            tracing::debug!(%element, "re-observed, superseding earlier registration");
        }
        state.phase.cancel(&mut self.host);
        state.phase = Phase::Idle;
        state.registration = Some(Registration {
            generation,
            options,
            hooks,
        });

        self.host
            .observe_intersection(element, &OBSERVATION_THRESHOLDS);
        tracing::debug!(
            %element,
            threshold = options.threshold,
            required_ms = options.required_time_ms,
            "observing"
        );

        Subscription {
            element: Some(element),
            generation,
        }
    }

    /// Stop tracking and discard the element's state. Idempotent.
    pub fn unobserve(&mut self, subscription: Subscription) {
        let Some(element) = subscription.element else {
            return;
        };
        let current = self
            .elements
            .get(&element)
            .and_then(|s| s.registration.as_ref())
            .is_some_and(|r| r.generation == subscription.generation);
        if !current {
            return;
        }

        if let Some(state) = self.elements.remove(&element) {
            state.phase.cancel(&mut self.host);
        }
        self.host.unobserve_intersection(element);
        tracing::debug!(%element, "unobserved");
    }

    /// Discard everything held for an element the host has unmounted: its
    /// registration, pending confirmation, refresh timing and any surface
    /// restore still waiting for a frame.
    pub fn forget(&mut self, element: ElementId) {
        if let Some(state) = self.elements.remove(&element) {
            state.phase.cancel(&mut self.host);
            if state.registration.is_some() {
                self.host.unobserve_intersection(element);
            }
        }
        self.pending_reloads.retain(|_, (el, _)| *el != element);
        tracing::debug!(%element, "forgotten");
    }

    /// Feed one intersection observer notification.
    pub fn on_intersection(&mut self, entry: IntersectionEntry) {
        let Some(state) = self.elements.get_mut(&entry.element) else {
            return;
        };
        let Some(registration) = state.registration.as_mut() else {
            return;
        };

        let viewable =
            entry.is_intersecting && entry.ratio >= registration.options.threshold;
        let (phase, report) = state.phase.on_visibility(
            viewable,
            registration.options.required_time_ms,
            &mut self.host,
        );
        if phase != state.phase {
            tracing::debug!(element = %entry.element, ratio = entry.ratio, ?phase, "visibility changed");
        }
        state.phase = phase;

        if let Some(report) = report {
            deliver(entry.element, registration, report);
        }
    }

    /// Feed a fired timer. Returns `false` if no element owns it.
    pub fn on_timer(&mut self, timer: TimerId) -> bool {
        let Some((&element, state)) = self
            .elements
            .iter_mut()
            .find(|(_, s)| s.phase.pending_timer() == Some(timer))
        else {
            return false;
        };
        let Some(registration) = state.registration.as_mut() else {
            return false;
        };

        let (phase, report) = state.phase.on_timer(
            timer,
            registration.options.required_time_ms,
            &mut self.host,
        );
        state.phase = phase;

        if let Some(report) = report {
            tracing::info!(%element, duration_ms = report.duration, "viewable");
            deliver(element, registration, report);
        }
        true
    }

    /// Feed an animation frame: restores a surface blanked by
    /// [`refresh`](Self::refresh).
    pub fn on_animation_frame(&mut self, frame: FrameId) -> bool {
        let Some((element, src)) = self.pending_reloads.remove(&frame) else {
            return false;
        };
        self.host.set_surface_source(element, &src);
        true
    }

    /// Whether the element's ad surface may be reloaded now.
    pub fn can_refresh(&self, element: ElementId) -> bool {
        if self.host.is_inside_closed(element) {
            return false;
        }
        let last = self.elements.get(&element).and_then(|s| s.last_refresh);
        match last {
            Some(last) => self.host.now().saturating_sub(last) >= REFRESH_COOLDOWN_MS,
            None => true,
        }
    }

    /// Force the element's embedded ad surface to load again.
    ///
    /// Returns `false` when refresh is not allowed yet, or the element has
    /// no reloadable surface. Neither case is an error. The refresh time is
    /// kept even for unobserved elements, until [`forget`](Self::forget).
    pub fn refresh(&mut self, element: ElementId) -> bool {
        if !self.can_refresh(element) {
            tracing::debug!(%element, "refresh suppressed");
            return false;
        }
        let Some(src) = self.host.surface_source(element) else {
            tracing::debug!(%element, "no reloadable surface");
            return false;
        };

        self.host.set_surface_source(element, BLANK_SOURCE);
        let frame = self.host.request_animation_frame();
        self.pending_reloads.insert(frame, (element, src));

        let now = self.host.now();
        let state = self.elements.entry(element).or_default();
        state.last_refresh = Some(now);
        state.phase = state.phase.rearm();
        tracing::info!(%element, "surface refreshed");
        true
    }

    pub fn stats(&self, element: ElementId) -> Option<ViewabilityStats> {
        self.elements.get(&element).map(ElementState::stats)
    }

    /// Clear the reported flag and streak start. Refresh timing is kept.
    pub fn reset_state(&mut self, element: ElementId) {
        if let Some(state) = self.elements.get_mut(&element) {
            state.phase = state.phase.reset(&mut self.host);
        }
    }

    pub fn is_observing(&self, element: ElementId) -> bool {
        self.elements
            .get(&element)
            .is_some_and(|s| s.registration.is_some())
    }
}

fn deliver(element: ElementId, registration: &mut Registration, report: Report) {
    if report.viewable {
        registration.hooks.viewable(element, report.duration);
    } else {
        registration.hooks.hidden(element, report.duration);
    }
}

impl<H: Host> WakeupSink for ViewabilityTracker<H> {
    fn wake(&mut self, wakeup: Wakeup) -> bool {
        match wakeup {
            Wakeup::Timer(timer) => self.on_timer(timer),
            Wakeup::Frame(frame) => self.on_animation_frame(frame),
        }
    }
}

impl<H: Host> Drop for ViewabilityTracker<H> {
    fn drop(&mut self) {
        for (element, state) in self.elements.drain() {
            state.phase.cancel(&mut self.host);
            if state.registration.is_some() {
                self.host.unobserve_intersection(element);
            }
        }
        // Never leave a surface blank.
        for (_, (element, src)) in self.pending_reloads.drain() {
            self.host.set_surface_source(element, &src);
        }
    }
}
