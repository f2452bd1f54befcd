//! Ad viewability, banner rotation and sticky placement for news pages.
//!
//! The state machines here are host-agnostic: everything they need from the
//! page (clock, timers, intersection observation, the ad frame) comes through
//! the traits in [`host`]. A browser bridge implements them for real;
//! [`virtual_host::VirtualHost`] implements them deterministically.

pub mod carousel;
pub mod config;
pub mod host;
pub mod sticky;
pub mod viewability;
pub mod virtual_host;

pub use carousel::{Carousel, CarouselConfig, CarouselConfigError, RotationState, SwipeDirection};
pub use config::{ConfigError, EngineConfig};
pub use host::{Document, Host, Scheduler, Wakeup, WakeupSink};
pub use sticky::{
    Positioning, StickyConfig, StickyConfigError, StickyPlacement, StickyPlacementState,
};
pub use viewability::{
    Subscription, ViewabilityHooks, ViewabilityOptions, ViewabilityStats, ViewabilityTracker,
};
