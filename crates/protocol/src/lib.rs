pub mod commands;
pub mod types;

pub use commands::{HostCommand, ViewabilityEvent};
pub use types::{
    AdUnitId, BannerItem, ElementId, FrameId, IntersectionEntry, LayoutMeasurement, Millis,
    TimerId,
};
