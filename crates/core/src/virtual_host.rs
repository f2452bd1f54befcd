//! Deterministic in-memory host.
//!
//! Provides a manual clock, an ordered timer queue and a tiny element tree
//! with closed markers and embedded surfaces. Used by the test-suite and by
//! `adview-sim` to replay scenarios without a browser.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use adview_protocol::{ElementId, FrameId, Millis, TimerId};

use crate::host::{Document, Scheduler, Wakeup, WakeupSink};

#[derive(Debug, Clone)]
struct PendingTimer {
    id: TimerId,
    due: Millis,
    period: Option<Millis>,
    /// Arming order, breaks ties between timers due at the same instant.
    seq: u64,
}

#[derive(Debug, Clone, Default)]
struct VirtualElement {
    parent: Option<ElementId>,
    closed: bool,
    surface: Option<String>,
    /// Every `src` assigned to the surface, oldest first.
    source_history: Vec<String>,
}

#[derive(Debug, Default)]
pub struct VirtualHost {
    now: Millis,
    next_id: u64,
    seq: u64,
    timers: Vec<PendingTimer>,
    frames: Vec<FrameId>,
    elements: HashMap<ElementId, VirtualElement>,
    observed: HashMap<ElementId, Vec<f64>>,
}

impl VirtualHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap in the shared form components take when they share one clock.
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    pub fn insert_element(&mut self, id: ElementId, parent: Option<ElementId>) {
        self.elements.insert(
            id,
            VirtualElement {
                parent,
                ..VirtualElement::default()
            },
        );
    }

    pub fn remove_element(&mut self, id: ElementId) {
        self.elements.remove(&id);
        self.observed.remove(&id);
    }

    /// Set or clear the closed marker on an element.
    pub fn set_closed(&mut self, id: ElementId, closed: bool) {
        if let Some(el) = self.elements.get_mut(&id) {
            el.closed = closed;
        }
    }

    /// Embed a reloadable surface with the given source inside the element.
    pub fn attach_surface(&mut self, id: ElementId, src: impl Into<String>) {
        if let Some(el) = self.elements.get_mut(&id) {
            el.surface = Some(src.into());
        }
    }

    pub fn source_history(&self, id: ElementId) -> &[String] {
        self.elements
            .get(&id)
            .map(|el| el.source_history.as_slice())
            .unwrap_or_default()
    }

    pub fn is_observed(&self, id: ElementId) -> bool {
        self.observed.contains_key(&id)
    }

    pub fn observed_thresholds(&self, id: ElementId) -> Option<&[f64]> {
        self.observed.get(&id).map(Vec::as_slice)
    }

    /// Number of armed timers (one-shot and repeating).
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Pop the next wake-up due at or before `until`.
    ///
    /// Animation frames come first and fire at the current instant. Timers
    /// fire in due order; the clock jumps to each timer's due time and
    /// repeating timers are re-armed. When nothing is due the clock advances
    /// to `until` and `None` is returned.
    pub fn poll_until(&mut self, until: Millis) -> Option<Wakeup> {
        if !self.frames.is_empty() {
            return Some(Wakeup::Frame(self.frames.remove(0)));
        }

        let next = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due <= until)
            .min_by_key(|(_, t)| (t.due, t.seq))
            .map(|(idx, _)| idx);

        let Some(idx) = next else {
            self.now = self.now.max(until);
            return None;
        };

        let timer = self.timers.remove(idx);
        self.now = self.now.max(timer.due);
        if let Some(period) = timer.period {
            let seq = self.bump_seq();
            self.timers.push(PendingTimer {
                due: timer.due + period,
                seq,
                ..timer
            });
        }
        Some(Wakeup::Timer(timer.id))
    }

    fn next_handle(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn bump_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn arm(&mut self, delay: Millis, period: Option<Millis>) -> TimerId {
        let id = TimerId(self.next_handle());
        let seq = self.bump_seq();
        self.timers.push(PendingTimer {
            id,
            due: self.now + delay,
            period,
            seq,
        });
        id
    }
}

impl Scheduler for VirtualHost {
    fn now(&self) -> Millis {
        self.now
    }

    fn set_timeout(&mut self, delay: Millis) -> TimerId {
        self.arm(delay, None)
    }

    fn set_interval(&mut self, period: Millis) -> TimerId {
        // A zero period would spin forever inside `poll_until`.
        self.arm(period, Some(period.max(1)))
    }

    fn clear_timer(&mut self, timer: TimerId) {
        self.timers.retain(|t| t.id != timer);
    }

    fn request_animation_frame(&mut self) -> FrameId {
        let id = FrameId(self.next_handle());
        self.frames.push(id);
        id
    }
}

impl Document for VirtualHost {
    fn observe_intersection(&mut self, element: ElementId, thresholds: &[f64]) {
        self.observed.insert(element, thresholds.to_vec());
    }

    fn unobserve_intersection(&mut self, element: ElementId) {
        self.observed.remove(&element);
    }

    fn is_inside_closed(&self, element: ElementId) -> bool {
        let mut cursor = Some(element);
        // Bounded walk so a malformed parent cycle cannot hang the host.
        for _ in 0..=self.elements.len() {
            let Some(id) = cursor else {
                return false;
            };
            let Some(el) = self.elements.get(&id) else {
                return false;
            };
            if el.closed {
                return true;
            }
            cursor = el.parent;
        }
        false
    }

    fn surface_source(&self, element: ElementId) -> Option<String> {
        self.elements.get(&element)?.surface.clone()
    }

    fn set_surface_source(&mut self, element: ElementId, src: &str) {
        if let Some(el) = self.elements.get_mut(&element)
            && el.surface.is_some()
        {
            el.surface = Some(src.to_owned());
            el.source_history.push(src.to_owned());
        }
    }
}

/// Advance the shared host to `until`, delivering every due wake-up to the
/// first sink that claims it.
pub fn drive(host: &Rc<RefCell<VirtualHost>>, until: Millis, sinks: &mut [&mut dyn WakeupSink]) {
    loop {
        // The borrow must end before dispatch: sinks re-enter the host.
        let next = host.borrow_mut().poll_until(until);
        let Some(wakeup) = next else {
            break;
        };
        let claimed = sinks.iter_mut().any(|sink| sink.wake(wakeup));
        if !claimed {
            tracing::debug!(?wakeup, "unclaimed wake-up");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_fire_in_due_order() {
        let mut host = VirtualHost::new();
        let late = host.set_timeout(300);
        let early = host.set_timeout(100);

        assert_eq!(host.poll_until(1_000), Some(Wakeup::Timer(early)));
        assert_eq!(host.now(), 100);
        assert_eq!(host.poll_until(1_000), Some(Wakeup::Timer(late)));
        assert_eq!(host.poll_until(1_000), None);
        assert_eq!(host.now(), 1_000);
    }

    #[test]
    fn intervals_rearm_until_cleared() {
        let mut host = VirtualHost::new();
        let tick = host.set_interval(100);

        assert_eq!(host.poll_until(250), Some(Wakeup::Timer(tick)));
        assert_eq!(host.poll_until(250), Some(Wakeup::Timer(tick)));
        assert_eq!(host.poll_until(250), None);

        host.clear_timer(tick);
        assert_eq!(host.pending_timers(), 0);
    }

    #[test]
    fn closed_marker_is_inherited() {
        let mut host = VirtualHost::new();
        host.insert_element(ElementId(1), None);
        host.insert_element(ElementId(2), Some(ElementId(1)));
        assert!(!host.is_inside_closed(ElementId(2)));

        host.set_closed(ElementId(1), true);
        assert!(host.is_inside_closed(ElementId(2)));
        assert!(host.is_inside_closed(ElementId(1)));
        assert!(!host.is_inside_closed(ElementId(99)));
    }

    #[test]
    fn frames_preempt_timers() {
        let mut host = VirtualHost::new();
        let timer = host.set_timeout(0);
        let frame = host.request_animation_frame();

        assert_eq!(host.poll_until(0), Some(Wakeup::Frame(frame)));
        assert_eq!(host.poll_until(0), Some(Wakeup::Timer(timer)));
    }
}
