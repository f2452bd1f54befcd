//! The environment the state machines run in.
//!
//! Nothing in this crate touches `window` or `document` directly. A browser
//! bridge, the [`VirtualHost`](crate::virtual_host::VirtualHost) used by tests
//! and the simulator, or any other embedding implements these traits and
//! feeds wake-ups (intersection entries, fired timers, animation frames)
//! back into the components.

use std::cell::RefCell;
use std::rc::Rc;

use adview_protocol::{ElementId, FrameId, Millis, TimerId};

/// Clock and deferred execution.
pub trait Scheduler {
    /// Current time on the host clock.
    fn now(&self) -> Millis;

    /// Arm a one-shot timer firing `delay` ms from now.
    fn set_timeout(&mut self, delay: Millis) -> TimerId;

    /// Arm a repeating timer firing every `period` ms.
    fn set_interval(&mut self, period: Millis) -> TimerId;

    /// Cancel a timer. Unknown or already-fired ids are ignored.
    fn clear_timer(&mut self, timer: TimerId);

    /// Ask for a wake-up on the next animation frame.
    fn request_animation_frame(&mut self) -> FrameId;
}

/// The slice of the DOM the viewability tracker needs.
pub trait Document {
    fn observe_intersection(&mut self, element: ElementId, thresholds: &[f64]);

    fn unobserve_intersection(&mut self, element: ElementId);

    /// Whether the element, or any of its ancestors, carries the closed
    /// marker of a dismissed ad container.
    fn is_inside_closed(&self, element: ElementId) -> bool;

    /// Source of the first reloadable embedded surface inside the element.
    fn surface_source(&self, element: ElementId) -> Option<String>;

    fn set_surface_source(&mut self, element: ElementId, src: &str);
}

/// Everything the viewability tracker needs from its environment.
pub trait Host: Scheduler + Document {}

impl<T: Scheduler + Document> Host for T {}

// Several components on one page share a single clock and timer queue.

impl<T: Scheduler> Scheduler for Rc<RefCell<T>> {
    fn now(&self) -> Millis {
        self.borrow().now()
    }

    fn set_timeout(&mut self, delay: Millis) -> TimerId {
        self.borrow_mut().set_timeout(delay)
    }

    fn set_interval(&mut self, period: Millis) -> TimerId {
        self.borrow_mut().set_interval(period)
    }

    fn clear_timer(&mut self, timer: TimerId) {
        self.borrow_mut().clear_timer(timer);
    }

    fn request_animation_frame(&mut self) -> FrameId {
        self.borrow_mut().request_animation_frame()
    }
}

impl<T: Document> Document for Rc<RefCell<T>> {
    fn observe_intersection(&mut self, element: ElementId, thresholds: &[f64]) {
        self.borrow_mut().observe_intersection(element, thresholds);
    }

    fn unobserve_intersection(&mut self, element: ElementId) {
        self.borrow_mut().unobserve_intersection(element);
    }

    fn is_inside_closed(&self, element: ElementId) -> bool {
        self.borrow().is_inside_closed(element)
    }

    fn surface_source(&self, element: ElementId) -> Option<String> {
        self.borrow().surface_source(element)
    }

    fn set_surface_source(&mut self, element: ElementId, src: &str) {
        self.borrow_mut().set_surface_source(element, src);
    }
}

/// A deferred continuation the host hands back to a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    Timer(TimerId),
    Frame(FrameId),
}

/// A component that consumes host wake-ups.
pub trait WakeupSink {
    /// Returns `true` if the wake-up belonged to this component.
    fn wake(&mut self, wakeup: Wakeup) -> bool;
}
