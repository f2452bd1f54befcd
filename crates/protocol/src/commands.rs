use serde::{Deserialize, Serialize};

use crate::types::{ElementId, FrameId, Millis, TimerId};

/// A single, stateless request from the engine to the page.
///
/// Bridges that cannot call into the page synchronously queue these and let
/// the page drain them after every call. Each command carries all the data
/// the page needs to act on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostCommand {
    /// Start an intersection observer on the element with the given
    /// notification thresholds.
    ObserveIntersection {
        element: ElementId,
        thresholds: Vec<f64>,
    },

    /// Stop observing the element.
    UnobserveIntersection { element: ElementId },

    /// Arm a one-shot timer. The page reports it back via `timer_fired`.
    SetTimeout { timer: TimerId, delay_ms: Millis },

    /// Arm a repeating timer.
    SetInterval { timer: TimerId, period_ms: Millis },

    /// Cancel a timer of either kind.
    ClearTimer { timer: TimerId },

    /// Ask for a callback on the next animation frame.
    RequestAnimationFrame { frame: FrameId },

    /// Replace the `src` of the element's embedded ad frame.
    SetSurfaceSource { element: ElementId, src: String },

    /// A viewability callback fired for an observed element.
    Viewability(ViewabilityEvent),
}

/// Payload of the viewability callback: `callback(isViewable, durationMs)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewabilityEvent {
    pub element: ElementId,
    pub is_viewable: bool,
    pub duration_ms: Millis,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn commands_are_type_tagged() {
        let cmd = HostCommand::SetTimeout {
            timer: TimerId(7),
            delay_ms: 1000,
        };
        assert_eq!(
            serde_json::to_string(&cmd).unwrap(),
            r#"{"type":"setTimeout","timer":7,"delayMs":1000}"#
        );

        let event = HostCommand::Viewability(ViewabilityEvent {
            element: ElementId(3),
            is_viewable: true,
            duration_ms: 1200,
        });
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"viewability","element":3,"isViewable":true,"durationMs":1200}"#
        );
    }
}
