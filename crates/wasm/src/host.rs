use std::collections::HashMap;

use adview_core::{Document, Scheduler};
use adview_protocol::{ElementId, FrameId, HostCommand, Millis, TimerId};

#[derive(Debug, Default)]
struct ElementRecord {
    parent: Option<ElementId>,
    closed: bool,
    surface: Option<String>,
}

/// Host backed by the page through a command queue.
///
/// Side effects become [`HostCommand`]s the page drains after each call.
/// Queries are answered from mirrors the page keeps current: the clock, the
/// element registry, closed markers and surface sources.
#[derive(Debug, Default)]
pub struct QueueHost {
    now: Millis,
    next_handle: u32,
    elements: HashMap<ElementId, ElementRecord>,
    queue: Vec<HostCommand>,
}

impl QueueHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_now(&mut self, now: Millis) {
        self.now = now;
    }

    /// Issue a fresh handle. Handles stay within `u32` so they cross the JS
    /// boundary as plain numbers.
    pub fn next_handle(&mut self) -> u32 {
        self.next_handle = self.next_handle.wrapping_add(1).max(1);
        self.next_handle
    }

    pub fn register_element(&mut self, parent: Option<ElementId>) -> ElementId {
        let id = ElementId(u64::from(self.next_handle()));
        self.elements.insert(
            id,
            ElementRecord {
                parent,
                ..ElementRecord::default()
            },
        );
        id
    }

    pub fn unregister_element(&mut self, id: ElementId) -> bool {
        self.elements.remove(&id).is_some()
    }

    pub fn is_registered(&self, id: ElementId) -> bool {
        self.elements.contains_key(&id)
    }

    pub fn set_closed(&mut self, id: ElementId, closed: bool) {
        if let Some(record) = self.elements.get_mut(&id) {
            record.closed = closed;
        }
    }

    /// Mirror the `src` of the element's embedded frame; `None` if it has none.
    pub fn mirror_surface(&mut self, id: ElementId, src: Option<String>) {
        if let Some(record) = self.elements.get_mut(&id) {
            record.surface = src;
        }
    }

    pub fn push(&mut self, command: HostCommand) {
        self.queue.push(command);
    }

    pub fn drain(&mut self) -> Vec<HostCommand> {
        std::mem::take(&mut self.queue)
    }
}

impl Scheduler for QueueHost {
    fn now(&self) -> Millis {
        self.now
    }

    fn set_timeout(&mut self, delay: Millis) -> TimerId {
        let timer = TimerId(u64::from(self.next_handle()));
        self.push(HostCommand::SetTimeout {
            timer,
            delay_ms: delay,
        });
        timer
    }

    fn set_interval(&mut self, period: Millis) -> TimerId {
        let timer = TimerId(u64::from(self.next_handle()));
        self.push(HostCommand::SetInterval {
            timer,
            period_ms: period,
        });
        timer
    }

    fn clear_timer(&mut self, timer: TimerId) {
        self.push(HostCommand::ClearTimer { timer });
    }

    fn request_animation_frame(&mut self) -> FrameId {
        let frame = FrameId(u64::from(self.next_handle()));
        self.push(HostCommand::RequestAnimationFrame { frame });
        frame
    }
}

impl Document for QueueHost {
    fn observe_intersection(&mut self, element: ElementId, thresholds: &[f64]) {
        self.push(HostCommand::ObserveIntersection {
            element,
            thresholds: thresholds.to_vec(),
        });
    }

    fn unobserve_intersection(&mut self, element: ElementId) {
        self.push(HostCommand::UnobserveIntersection { element });
    }

    fn is_inside_closed(&self, element: ElementId) -> bool {
        let mut cursor = Some(element);
        let mut hops = 0;
        while let Some(id) = cursor {
            let Some(record) = self.elements.get(&id) else {
                return false;
            };
            if record.closed {
                return true;
            }
            hops += 1;
            if hops > self.elements.len() {
                tracing::warn!(%element, "element parent chain loops");
                return false;
            }
            cursor = record.parent;
        }
        false
    }

    fn surface_source(&self, element: ElementId) -> Option<String> {
        self.elements.get(&element)?.surface.clone()
    }

    fn set_surface_source(&mut self, element: ElementId, src: &str) {
        if let Some(record) = self.elements.get_mut(&element)
            && record.surface.is_some()
        {
            record.surface = Some(src.to_owned());
        }
        self.push(HostCommand::SetSurfaceSource {
            element,
            src: src.to_owned(),
        });
    }
}
