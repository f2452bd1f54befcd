use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use adview_core::{
    Carousel, CarouselConfigError, ConfigError, EngineConfig, StickyConfigError, StickyPlacement,
    Subscription,
    ViewabilityHooks, ViewabilityOptions, ViewabilityStats, ViewabilityTracker, Wakeup,
    WakeupSink,
};
use adview_protocol::{
    AdUnitId, BannerItem, ElementId, FrameId, HostCommand, IntersectionEntry, LayoutMeasurement,
    TimerId, ViewabilityEvent,
};
use thiserror::Error;

use crate::host::QueueHost;

type SharedHost = Rc<RefCell<QueueHost>>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("viewability: {0}")]
    Options(#[from] adview_core::viewability::OptionsError),
    #[error("carousel: {0}")]
    Carousel(#[from] CarouselConfigError),
    #[error("sticky: {0}")]
    Sticky(#[from] StickyConfigError),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid {kind} handle {handle}")]
    InvalidHandle { kind: &'static str, handle: u32 },
}

/// All ad components on one page, addressed by integer handles.
pub struct Engine {
    host: SharedHost,
    config: EngineConfig,
    tracker: ViewabilityTracker<SharedHost>,
    subscriptions: HashMap<u32, Subscription>,
    carousels: HashMap<u32, Carousel<SharedHost>>,
    stickies: HashMap<u32, StickyPlacement>,
}

impl Engine {
    pub fn new() -> Self {
        let host = Rc::new(RefCell::new(QueueHost::new()));
        Self {
            tracker: ViewabilityTracker::new(Rc::clone(&host)),
            host,
            config: EngineConfig::default(),
            subscriptions: HashMap::new(),
            carousels: HashMap::new(),
            stickies: HashMap::new(),
        }
    }

    /// Replace the configuration used by components created from now on.
    pub fn configure(&mut self, json: &[u8]) -> Result<(), BridgeError> {
        self.config = EngineConfig::from_json(json)?;
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Update the mirrored clock (`performance.now()`).
    pub fn set_now(&mut self, now_ms: f64) {
        // Float to int `as` saturates; negative and NaN clamp to zero.
        self.host.borrow_mut().set_now(now_ms as u64);
    }

    // --- element registry ---

    pub fn register_element(&mut self, parent: Option<u32>) -> u32 {
        let parent = parent.map(element);
        let id = self.host.borrow_mut().register_element(parent);
        handle_of(id.0)
    }

    /// Forget an element, dropping any observation and refresh state still
    /// attached to it.
    pub fn unregister_element(&mut self, id: u32) -> bool {
        let el = element(id);
        let stale: Vec<u32> = self
            .subscriptions
            .iter()
            .filter(|(_, sub)| sub.element() == Some(el))
            .map(|(&handle, _)| handle)
            .collect();
        for handle in stale {
            self.unobserve(handle);
        }
        self.tracker.forget(el);
        self.host.borrow_mut().unregister_element(el)
    }

    pub fn set_closed(&mut self, id: u32, closed: bool) {
        self.host.borrow_mut().set_closed(element(id), closed);
    }

    pub fn mirror_surface(&mut self, id: u32, src: Option<String>) {
        self.host.borrow_mut().mirror_surface(element(id), src);
    }

    // --- viewability ---

    /// Observe an element; `None` options use the configured defaults.
    /// Unknown elements get an inert subscription.
    pub fn observe(
        &mut self,
        id: Option<u32>,
        options: Option<ViewabilityOptions>,
    ) -> Result<u32, BridgeError> {
        let options = match options {
            Some(options) => {
                options.validate()?;
                options
            }
            None => self.config.viewability,
        };
        let target = id
            .map(element)
            .filter(|&el| self.host.borrow().is_registered(el));

        let subscription = match target {
            Some(el) => {
                let sink = Rc::clone(&self.host);
                let hooks = ViewabilityHooks::new(move |is_viewable, duration_ms| {
                    sink.borrow_mut()
                        .push(HostCommand::Viewability(ViewabilityEvent {
                            element: el,
                            is_viewable,
                            duration_ms,
                        }));
                });
                self.tracker.observe(Some(el), hooks, options)
            }
            None => Subscription::inert(),
        };

        let handle = self.host.borrow_mut().next_handle();
        self.subscriptions.insert(handle, subscription);
        Ok(handle)
    }

    pub fn unobserve(&mut self, handle: u32) {
        if let Some(subscription) = self.subscriptions.remove(&handle) {
            self.tracker.unobserve(subscription);
        }
    }

    pub fn intersection(&mut self, id: u32, ratio: f64, is_intersecting: bool) {
        self.tracker.on_intersection(IntersectionEntry {
            element: element(id),
            ratio,
            is_intersecting,
        });
    }

    pub fn can_refresh(&self, id: u32) -> bool {
        self.tracker.can_refresh(element(id))
    }

    pub fn refresh(&mut self, id: u32) -> bool {
        self.tracker.refresh(element(id))
    }

    pub fn stats(&self, id: u32) -> Option<ViewabilityStats> {
        self.tracker.stats(element(id))
    }

    pub fn reset_state(&mut self, id: u32) {
        self.tracker.reset_state(element(id));
    }

    // --- wake-ups ---

    pub fn timer_fired(&mut self, timer: u32) -> bool {
        self.dispatch(Wakeup::Timer(TimerId(u64::from(timer))))
    }

    pub fn animation_frame(&mut self, frame: u32) -> bool {
        self.dispatch(Wakeup::Frame(FrameId(u64::from(frame))))
    }

    fn dispatch(&mut self, wakeup: Wakeup) -> bool {
        if self.tracker.wake(wakeup) {
            return true;
        }
        self.carousels.values_mut().any(|c| c.wake(wakeup))
    }

    // --- carousels ---

    pub fn create_carousel(&mut self, banners_json: &[u8]) -> Result<u32, BridgeError> {
        let banners: Vec<BannerItem> = serde_json::from_slice(banners_json)?;
        let carousel = Carousel::new(Rc::clone(&self.host), banners, self.config.carousel.clone())?;
        let handle = self.host.borrow_mut().next_handle();
        self.carousels.insert(handle, carousel);
        Ok(handle)
    }

    pub fn carousel(&mut self, handle: u32) -> Result<&mut Carousel<SharedHost>, BridgeError> {
        self.carousels
            .get_mut(&handle)
            .ok_or(BridgeError::InvalidHandle {
                kind: "carousel",
                handle,
            })
    }

    /// Unmount a carousel; its timers are cleared on drop.
    pub fn destroy_carousel(&mut self, handle: u32) -> bool {
        self.carousels.remove(&handle).is_some()
    }

    // --- sticky placements ---

    pub fn create_sticky(
        &mut self,
        ad_unit: Option<&str>,
        initial: LayoutMeasurement,
    ) -> Result<u32, BridgeError> {
        let placement =
            StickyPlacement::mount(AdUnitId::from_config(ad_unit), self.config.sticky, initial)?;
        let handle = self.host.borrow_mut().next_handle();
        self.stickies.insert(handle, placement);
        Ok(handle)
    }

    pub fn sticky(&mut self, handle: u32) -> Result<&mut StickyPlacement, BridgeError> {
        self.stickies
            .get_mut(&handle)
            .ok_or(BridgeError::InvalidHandle {
                kind: "sticky",
                handle,
            })
    }

    pub fn destroy_sticky(&mut self, handle: u32) -> bool {
        self.stickies.remove(&handle).is_some()
    }

    /// Take every command queued since the last drain.
    pub fn drain(&mut self) -> Vec<HostCommand> {
        self.host.borrow_mut().drain()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

fn element(id: u32) -> ElementId {
    ElementId(u64::from(id))
}

fn handle_of(raw: u64) -> u32 {
    // Issued by `QueueHost::next_handle`, so always in range.
    u32::try_from(raw).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adview_core::Positioning;
    use pretty_assertions::assert_eq;

    fn find_timer(commands: &[HostCommand], delay: u64) -> Option<u32> {
        commands.iter().find_map(|c| match c {
            HostCommand::SetTimeout { timer, delay_ms } if *delay_ms == delay => {
                u32::try_from(timer.0).ok()
            }
            _ => None,
        })
    }

    #[test]
    fn viewability_round_trip_through_commands() {
        let mut engine = Engine::new();
        let ad = engine.register_element(None);
        let sub = engine.observe(Some(ad), None).unwrap();

        let commands = engine.drain();
        assert!(matches!(
            commands.as_slice(),
            [HostCommand::ObserveIntersection { .. }]
        ));

        engine.set_now(100.0);
        engine.intersection(ad, 0.9, true);
        let timer = find_timer(&engine.drain(), 1_000).unwrap();

        engine.set_now(1_100.0);
        assert!(engine.timer_fired(timer));
        assert_eq!(
            engine.drain(),
            vec![HostCommand::Viewability(ViewabilityEvent {
                element: element(ad),
                is_viewable: true,
                duration_ms: 1_000,
            })]
        );

        engine.unobserve(sub);
        assert_eq!(
            engine.drain(),
            vec![HostCommand::UnobserveIntersection {
                element: element(ad)
            }]
        );
    }

    #[test]
    fn unknown_element_is_inert() {
        let mut engine = Engine::new();
        let sub = engine.observe(Some(404), None).unwrap();
        engine.unobserve(sub);
        engine.unobserve(sub);
        assert!(engine.drain().is_empty());
    }

    #[test]
    fn refresh_emits_blank_then_restore() {
        let mut engine = Engine::new();
        let ad = engine.register_element(None);
        engine.mirror_surface(ad, Some("https://ads.example/300x250".to_owned()));
        engine.set_now(50_000.0);

        assert!(engine.refresh(ad));
        let commands = engine.drain();
        let frame = commands
            .iter()
            .find_map(|c| match c {
                HostCommand::RequestAnimationFrame { frame } => u32::try_from(frame.0).ok(),
                _ => None,
            })
            .unwrap();
        assert!(commands.contains(&HostCommand::SetSurfaceSource {
            element: element(ad),
            src: adview_core::viewability::BLANK_SOURCE.to_owned(),
        }));

        assert!(engine.animation_frame(frame));
        assert_eq!(
            engine.drain(),
            vec![HostCommand::SetSurfaceSource {
                element: element(ad),
                src: "https://ads.example/300x250".to_owned(),
            }]
        );
        assert!(!engine.can_refresh(ad));
    }

    #[test]
    fn closed_parent_blocks_refresh() {
        let mut engine = Engine::new();
        let container = engine.register_element(None);
        let ad = engine.register_element(Some(container));
        engine.mirror_surface(ad, Some("https://ads.example/x".to_owned()));
        engine.set_closed(container, true);
        assert!(!engine.refresh(ad));
    }

    #[test]
    fn carousel_timers_route_back() {
        let mut engine = Engine::new();
        let banners = br#"[
            {"id":"a","imageUrl":"/a.jpg","altText":"A","link":"https://a"},
            {"id":"b","imageUrl":"/b.jpg","altText":"B","link":"https://b"}
        ]"#;
        let handle = engine.create_carousel(banners).unwrap();
        let interval = engine
            .drain()
            .iter()
            .find_map(|c| match c {
                HostCommand::SetInterval { timer, .. } => u32::try_from(timer.0).ok(),
                _ => None,
            })
            .unwrap();

        assert!(engine.timer_fired(interval));
        assert_eq!(engine.carousel(handle).unwrap().state().current_index, 1);

        assert!(engine.destroy_carousel(handle));
        assert!(matches!(
            engine.carousel(handle),
            Err(BridgeError::InvalidHandle { kind: "carousel", .. })
        ));
    }

    #[test]
    fn sticky_without_ad_unit_is_hidden() {
        let mut engine = Engine::new();
        let handle = engine
            .create_sticky(None, LayoutMeasurement::new(0.0, None))
            .unwrap();
        assert_eq!(engine.sticky(handle).unwrap().positioning(), Positioning::Hidden);
    }

    #[test]
    fn unregister_drops_observation() {
        let mut engine = Engine::new();
        let ad = engine.register_element(None);
        let _sub = engine.observe(Some(ad), None).unwrap();
        engine.drain();

        assert!(engine.unregister_element(ad));
        assert_eq!(
            engine.drain(),
            vec![HostCommand::UnobserveIntersection {
                element: element(ad)
            }]
        );
    }

    #[test]
    fn unregister_releases_refresh_state() {
        let mut engine = Engine::new();
        let ad = engine.register_element(None);
        engine.mirror_surface(ad, Some("https://ads.example/x".to_owned()));
        engine.set_now(100_000.0);

        assert!(engine.refresh(ad));
        assert_eq!(
            engine.stats(ad).and_then(|s| s.last_refresh_time),
            Some(100_000)
        );

        assert!(engine.unregister_element(ad));
        assert_eq!(engine.stats(ad), None);
    }

    #[test]
    fn configure_rejects_bad_json() {
        let mut engine = Engine::new();
        assert!(matches!(
            engine.configure(br#"{"viewability":{"requiredTimeMs":0}}"#),
            Err(BridgeError::Config(_))
        ));
        engine.configure(br#"{"viewability":{"requiredTimeMs":2000}}"#).unwrap();
        assert_eq!(engine.config().viewability.required_time_ms, 2_000);
    }
}
