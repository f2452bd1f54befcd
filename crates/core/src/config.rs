use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::carousel::{CarouselConfig, CarouselConfigError};
use crate::sticky::{StickyConfig, StickyConfigError};
use crate::viewability::{OptionsError, ViewabilityOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("viewability: {0}")]
    Viewability(#[from] OptionsError),
    #[error("carousel: {0}")]
    Carousel(#[from] CarouselConfigError),
    #[error("sticky: {0}")]
    Sticky(#[from] StickyConfigError),
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Page-wide settings for every ad component. Every field has a default,
/// so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub viewability: ViewabilityOptions,
    pub carousel: CarouselConfig,
    pub sticky: StickyConfig,
}

impl EngineConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json(data: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_slice(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.viewability.validate()?;
        self.carousel.validate()?;
        self.sticky.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_object_is_all_defaults() {
        let config = EngineConfig::from_json(b"{}").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn nested_overrides() {
        let json = br#"{
            "viewability": { "requiredTimeMs": 2000 },
            "carousel": { "animationSpeedMs": 8000, "pauseOnHover": false },
            "sticky": { "footerBufferPx": 80 }
        }"#;
        let config = EngineConfig::from_json(json).unwrap();
        assert_eq!(config.viewability.required_time_ms, 2_000);
        assert_eq!(config.viewability.threshold, 0.5);
        assert_eq!(config.carousel.animation_speed_ms, 8_000);
        assert!(!config.carousel.pause_on_hover);
        assert_eq!(config.sticky.footer_buffer_px, 80.0);
    }

    #[test]
    fn invalid_values_are_reported() {
        let err = EngineConfig::from_json(br#"{"carousel":{"animationSpeedMs":0}}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Carousel(CarouselConfigError::ZeroAnimationSpeed)
        ));

        let err = EngineConfig::from_json(br#"{"viewability":{"threshold":2}}"#).unwrap_err();
        assert_eq!(err.to_string(), "viewability: threshold must be a finite ratio within [0, 1], got 2");

        let err = EngineConfig::from_json(br#"{"sticky":{"footerBufferPx":-1}}"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Sticky(StickyConfigError::FooterBuffer(_))
        ));

        assert!(matches!(
            EngineConfig::from_json(b"not json"),
            Err(ConfigError::Json(_))
        ));
    }
}
