//! Sticky, user-dismissible ad placement.
//!
//! The placement is pinned to the viewport until the page footer comes
//! within a buffer of its bottom edge, then falls back to normal flow so it
//! never covers the footer. Closing it hides it for the rest of the page
//! session.

use adview_protocol::{AdUnitId, LayoutMeasurement};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Distance from the footer at which the placement stops being sticky.
pub const FOOTER_BUFFER_PX: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StickyConfig {
    pub footer_buffer_px: f64,
}

impl Default for StickyConfig {
    fn default() -> Self {
        Self {
            footer_buffer_px: FOOTER_BUFFER_PX,
        }
    }
}

impl StickyConfig {
    pub fn validate(&self) -> Result<(), StickyConfigError> {
        let buffer = self.footer_buffer_px;
        if !buffer.is_finite() || buffer < 0.0 {
            return Err(StickyConfigError::FooterBuffer(buffer));
        }
        Ok(())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum StickyConfigError {
    #[error("footer buffer must be a finite, non-negative pixel count, got {0}")]
    FooterBuffer(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StickyPlacementState {
    pub is_near_footer: bool,
    pub is_dismissed: bool,
}

/// How the container should be positioned right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Positioning {
    /// Fixed to the viewport.
    Sticky,
    /// Normal document flow, parked above the footer.
    InFlow,
    /// Not rendered: dismissed, or no ad unit configured.
    Hidden,
}

impl Positioning {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sticky => "sticky",
            Self::InFlow => "inFlow",
            Self::Hidden => "hidden",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StickyPlacement {
    ad_unit: Option<AdUnitId>,
    config: StickyConfig,
    state: StickyPlacementState,
}

impl StickyPlacement {
    /// Mount the placement and take the initial measurement.
    pub fn mount(
        ad_unit: Option<AdUnitId>,
        config: StickyConfig,
        initial: LayoutMeasurement,
    ) -> Result<Self, StickyConfigError> {
        config.validate()?;
        if ad_unit.is_none() {
            tracing::debug!("sticky placement has no ad unit, rendering nothing");
        }
        let mut placement = Self {
            ad_unit,
            config,
            state: StickyPlacementState::default(),
        };
        placement.on_scroll(initial);
        Ok(placement)
    }

    pub fn ad_unit(&self) -> Option<&AdUnitId> {
        self.ad_unit.as_ref()
    }

    pub fn state(&self) -> StickyPlacementState {
        self.state
    }

    /// Re-evaluate against the footer after a scroll. Ignored once dismissed.
    pub fn on_scroll(&mut self, measurement: LayoutMeasurement) -> Positioning {
        if !self.state.is_dismissed {
            let near = measurement
                .footer_top
                .is_some_and(|top| top - measurement.container_bottom < self.config.footer_buffer_px);
            if near != self.state.is_near_footer {
                tracing::debug!(near_footer = near, "sticky placement handoff");
            }
            self.state.is_near_footer = near;
        }
        self.positioning()
    }

    /// Close the placement for the rest of the session.
    pub fn dismiss(&mut self) {
        if !self.state.is_dismissed {
            tracing::info!("sticky placement dismissed");
        }
        self.state.is_dismissed = true;
    }

    pub fn positioning(&self) -> Positioning {
        if self.state.is_dismissed || self.ad_unit.is_none() {
            Positioning::Hidden
        } else if self.state.is_near_footer {
            Positioning::InFlow
        } else {
            Positioning::Sticky
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> Option<AdUnitId> {
        AdUnitId::from_config(Some("2416950"))
    }

    #[test]
    fn footer_inside_buffer_unsticks() {
        let footer = 1_000.0;
        let mut placement = StickyPlacement::mount(
            unit(),
            StickyConfig::default(),
            LayoutMeasurement::new(footer - 200.0, Some(footer)),
        )
        .unwrap();
        assert!(!placement.state().is_near_footer);
        assert_eq!(placement.positioning(), Positioning::Sticky);

        let pos = placement.on_scroll(LayoutMeasurement::new(footer - 10.0, Some(footer)));
        assert!(placement.state().is_near_footer);
        assert_eq!(pos, Positioning::InFlow);

        let pos = placement.on_scroll(LayoutMeasurement::new(footer - 200.0, Some(footer)));
        assert_eq!(pos, Positioning::Sticky);
    }

    #[test]
    fn buffer_edge_is_not_near() {
        let placement = StickyPlacement::mount(
            unit(),
            StickyConfig::default(),
            LayoutMeasurement::new(950.0, Some(1_000.0)),
        )
        .unwrap();
        assert!(!placement.state().is_near_footer);
    }

    #[test]
    fn no_footer_stays_sticky() {
        let mut placement = StickyPlacement::mount(
            unit(),
            StickyConfig::default(),
            LayoutMeasurement::new(5_000.0, None),
        )
        .unwrap();
        assert_eq!(
            placement.on_scroll(LayoutMeasurement::new(9_000.0, None)),
            Positioning::Sticky
        );
    }

    #[test]
    fn dismissal_is_permanent() {
        let mut placement = StickyPlacement::mount(
            unit(),
            StickyConfig::default(),
            LayoutMeasurement::new(0.0, Some(1_000.0)),
        )
        .unwrap();
        placement.dismiss();
        assert_eq!(placement.positioning(), Positioning::Hidden);
        assert_eq!(
            placement.on_scroll(LayoutMeasurement::new(990.0, Some(1_000.0))),
            Positioning::Hidden
        );
        assert!(!placement.state().is_near_footer);
        assert!(placement.state().is_dismissed);
    }

    #[test]
    fn rejects_unusable_footer_buffer() {
        for footer_buffer_px in [f64::NAN, f64::INFINITY, -1.0] {
            let err = StickyPlacement::mount(
                unit(),
                StickyConfig { footer_buffer_px },
                LayoutMeasurement::new(0.0, None),
            )
            .unwrap_err();
            assert!(matches!(err, StickyConfigError::FooterBuffer(_)));
        }
        assert_eq!(StickyConfig { footer_buffer_px: 0.0 }.validate(), Ok(()));
    }

    #[test]
    fn missing_ad_unit_renders_nothing() {
        let placement = StickyPlacement::mount(
            AdUnitId::from_config(Some("")),
            StickyConfig::default(),
            LayoutMeasurement::new(0.0, None),
        )
        .unwrap();
        assert_eq!(placement.positioning(), Positioning::Hidden);
    }
}
