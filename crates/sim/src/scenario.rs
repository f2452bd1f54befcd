use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use adview_core::virtual_host::VirtualHost;
use adview_core::{
    Carousel, EngineConfig, Scheduler, StickyPlacement, Subscription, ViewabilityHooks,
    ViewabilityTracker, WakeupSink,
};
use adview_protocol::{
    AdUnitId, BannerItem, ElementId, IntersectionEntry, LayoutMeasurement, Millis,
};
use anyhow::{Context, Result, bail};
use serde::Deserialize;

type SharedHost = Rc<RefCell<VirtualHost>>;
type Log = Rc<RefCell<Vec<String>>>;

/// A page, its ad components and a timeline of events to replay.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default)]
    pub config: EngineConfig,
    #[serde(default)]
    pub elements: Vec<ElementSpec>,
    #[serde(default)]
    pub banners: Vec<BannerItem>,
    #[serde(default)]
    pub ad_unit: Option<String>,
    #[serde(default = "default_layout")]
    pub initial_layout: LayoutMeasurement,
    pub steps: Vec<Step>,
    /// Keep the clock running until this instant after the last step.
    #[serde(default)]
    pub end_at: Option<Millis>,
}

fn default_layout() -> LayoutMeasurement {
    LayoutMeasurement::new(0.0, None)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSpec {
    pub id: ElementId,
    #[serde(default)]
    pub parent: Option<ElementId>,
    #[serde(default)]
    pub surface: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Step {
    pub at: Millis,
    #[serde(flatten)]
    pub event: Event,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Event {
    Observe { element: ElementId },
    Unobserve { element: ElementId },
    Intersect { element: ElementId, ratio: f64 },
    Refresh { element: ElementId },
    Close { element: ElementId },
    Reset { element: ElementId },
    Stats { element: ElementId },
    Next,
    Prev,
    Goto { index: usize },
    Hover { inside: bool },
    Swipe { from: f64, to: f64 },
    ImageFailed { index: usize },
    Scroll { container_bottom: f64, footer_top: Option<f64> },
    Dismiss,
}

impl Scenario {
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let scenario: Self = serde_json::from_slice(data).context("invalid scenario JSON")?;
        scenario.config.validate().context("invalid scenario config")?;
        if scenario.steps.windows(2).any(|w| w[1].at < w[0].at) {
            bail!("scenario steps must be ordered by `at`");
        }
        Ok(scenario)
    }
}

/// Replay a scenario and return the observable log, one line per event.
pub fn run(scenario: &Scenario) -> Result<Vec<String>> {
    let host: SharedHost = VirtualHost::shared();
    for spec in &scenario.elements {
        let mut h = host.borrow_mut();
        h.insert_element(spec.id, spec.parent);
        if let Some(src) = &spec.surface {
            h.attach_surface(spec.id, src.clone());
        }
    }

    let log: Log = Rc::default();
    let mut tracker = ViewabilityTracker::new(Rc::clone(&host));
    let mut carousel = Carousel::new(
        Rc::clone(&host),
        scenario.banners.clone(),
        scenario.config.carousel.clone(),
    )
    .context("invalid banner list")?;
    let mut sticky = StickyPlacement::mount(
        AdUnitId::from_config(scenario.ad_unit.as_deref()),
        scenario.config.sticky,
        scenario.initial_layout,
    )
    .context("invalid sticky placement")?;
    let mut subscriptions: HashMap<ElementId, Subscription> = HashMap::new();

    for step in &scenario.steps {
        advance(&host, step.at, &mut tracker, &mut carousel, &log);
        let at = step.at;
        let line = match step.event.clone() {
            Event::Observe { element } => {
                let hooks = logging_hooks(element, &host, &log);
                let sub = tracker.observe(Some(element), hooks, scenario.config.viewability);
                subscriptions.insert(element, sub);
                format!("{element} observed")
            }
            Event::Unobserve { element } => {
                if let Some(sub) = subscriptions.remove(&element) {
                    tracker.unobserve(sub);
                }
                format!("{element} unobserved")
            }
            Event::Intersect { element, ratio } => {
                tracker.on_intersection(IntersectionEntry::new(element, ratio));
                format!("{element} ratio {ratio:.2}")
            }
            Event::Refresh { element } => {
                let ok = tracker.refresh(element);
                format!("{element} refresh {}", if ok { "ok" } else { "denied" })
            }
            Event::Close { element } => {
                host.borrow_mut().set_closed(element, true);
                format!("{element} closed")
            }
            Event::Reset { element } => {
                tracker.reset_state(element);
                format!("{element} state reset")
            }
            Event::Stats { element } => {
                let stats = serde_json::to_string(&tracker.stats(element))?;
                format!("{element} stats {stats}")
            }
            Event::Next => nav_line("next", carousel.next(), &carousel),
            Event::Prev => nav_line("prev", carousel.prev(), &carousel),
            Event::Goto { index } => nav_line("goto", carousel.goto_index(index), &carousel),
            Event::Hover { inside } => {
                if inside {
                    carousel.pointer_enter();
                } else {
                    carousel.pointer_leave();
                }
                format!("carousel paused={}", carousel.state().is_paused)
            }
            Event::Swipe { from, to } => {
                carousel.touch_start(from);
                carousel.touch_move(to);
                match carousel.touch_end() {
                    Some(dir) => nav_line(&format!("swipe {dir:?}"), true, &carousel),
                    None => "swipe ignored".to_owned(),
                }
            }
            Event::ImageFailed { index } => {
                carousel.image_failed(index);
                format!(
                    "banner {index} image -> {}",
                    carousel.image_url(index).unwrap_or("<none>")
                )
            }
            Event::Scroll {
                container_bottom,
                footer_top,
            } => {
                let pos = sticky.on_scroll(LayoutMeasurement::new(container_bottom, footer_top));
                format!("sticky {}", pos.as_str())
            }
            Event::Dismiss => {
                sticky.dismiss();
                format!("sticky {}", sticky.positioning().as_str())
            }
        };
        log.borrow_mut().push(stamp(at, &line));
    }

    if let Some(end) = scenario.end_at {
        advance(&host, end, &mut tracker, &mut carousel, &log);
    }

    let lines = log.borrow().clone();
    Ok(lines)
}

fn advance(
    host: &SharedHost,
    until: Millis,
    tracker: &mut ViewabilityTracker<SharedHost>,
    carousel: &mut Carousel<SharedHost>,
    log: &Log,
) {
    loop {
        // Release the host before dispatch: components re-enter it.
        let next = host.borrow_mut().poll_until(until);
        let Some(wakeup) = next else {
            break;
        };
        if tracker.wake(wakeup) {
            continue;
        }
        let before = carousel.state().current_index;
        if carousel.wake(wakeup) && carousel.state().current_index != before {
            let at = host.borrow().now();
            log.borrow_mut()
                .push(stamp(at, &nav_line("autoplay", true, carousel)));
        }
    }
}

fn logging_hooks(element: ElementId, host: &SharedHost, log: &Log) -> ViewabilityHooks {
    let (host, log) = (Rc::clone(host), Rc::clone(log));
    ViewabilityHooks::new(move |viewable, duration| {
        let at = host.borrow().now();
        let state = if viewable { "viewable" } else { "hidden" };
        log.borrow_mut()
            .push(stamp(at, &format!("{element} {state} after {duration}ms")));
    })
}

fn nav_line<S: Scheduler>(op: &str, accepted: bool, carousel: &Carousel<S>) -> String {
    if accepted {
        let id = carousel.current().map_or("-", |b| b.id.as_str());
        format!("carousel {op} -> {} ({id})", carousel.state().current_index)
    } else {
        format!("carousel {op} dropped")
    }
}

fn stamp(at: Millis, line: &str) -> String {
    format!("[{at:>7}ms] {line}")
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn replay(json: &str) -> Vec<String> {
        let scenario = Scenario::from_json(json.as_bytes()).unwrap();
        run(&scenario).unwrap()
    }

    #[test]
    fn viewable_then_refresh_cooldown() {
        let lines = replay(
            r#"{
                "elements": [{ "id": 1, "surface": "https://ads.example/slot" }],
                "steps": [
                    { "at": 0, "event": "observe", "element": 1 },
                    { "at": 100, "event": "intersect", "element": 1, "ratio": 0.6 },
                    { "at": 1200, "event": "refresh", "element": 1 },
                    { "at": 1300, "event": "refresh", "element": 1 },
                    { "at": 1400, "event": "intersect", "element": 1, "ratio": 0.0 }
                ]
            }"#,
        );
        assert_eq!(
            lines,
            vec![
                "[      0ms] element#1 observed",
                "[    100ms] element#1 ratio 0.60",
                "[   1100ms] element#1 viewable after 1000ms",
                "[   1200ms] element#1 refresh ok",
                "[   1300ms] element#1 refresh denied",
                "[   1400ms] element#1 hidden after 1300ms",
                "[   1400ms] element#1 ratio 0.00",
            ]
        );
    }

    #[test]
    fn short_glimpse_never_reports_viewable() {
        let lines = replay(
            r#"{
                "steps": [
                    { "at": 0, "event": "observe", "element": 7 },
                    { "at": 0, "event": "intersect", "element": 7, "ratio": 1.0 },
                    { "at": 400, "event": "intersect", "element": 7, "ratio": 0.2 }
                ],
                "endAt": 5000
            }"#,
        );
        assert_eq!(lines[2], "[    400ms] element#7 hidden after 400ms");
        assert!(!lines.iter().any(|l| l.contains("viewable")));
    }

    #[test]
    fn autoplay_and_hover_pause() {
        let lines = replay(
            r#"{
                "banners": [
                    { "id": "a", "imageUrl": "/a.png", "altText": "A", "link": "/a" },
                    { "id": "b", "imageUrl": "/b.png", "altText": "B", "link": "/b" },
                    { "id": "c", "imageUrl": "/c.png", "altText": "C", "link": "/c" }
                ],
                "steps": [
                    { "at": 5200, "event": "next" },
                    { "at": 5600, "event": "next" },
                    { "at": 6000, "event": "hover", "inside": true }
                ],
                "endAt": 20000
            }"#,
        );
        assert_eq!(
            lines,
            vec![
                "[   5000ms] carousel autoplay -> 1 (b)",
                "[   5200ms] carousel next dropped",
                "[   5600ms] carousel next -> 2 (c)",
                "[   6000ms] carousel paused=true",
            ]
        );
    }

    #[test]
    fn sticky_hands_off_to_footer() {
        let lines = replay(
            r#"{
                "adUnit": "2416950",
                "initialLayout": { "containerBottom": 600.0, "footerTop": 2000.0 },
                "steps": [
                    { "at": 10, "event": "scroll", "containerBottom": 1980.0, "footerTop": 2000.0 },
                    { "at": 20, "event": "scroll", "containerBottom": 900.0 },
                    { "at": 30, "event": "dismiss" },
                    { "at": 40, "event": "scroll", "containerBottom": 900.0, "footerTop": 2000.0 }
                ]
            }"#,
        );
        assert_eq!(
            lines,
            vec![
                "[     10ms] sticky inFlow",
                "[     20ms] sticky sticky",
                "[     30ms] sticky hidden",
                "[     40ms] sticky hidden",
            ]
        );
    }

    #[test]
    fn rejects_out_of_order_steps() {
        let err = Scenario::from_json(
            br#"{ "steps": [{ "at": 5, "event": "next" }, { "at": 1, "event": "prev" }] }"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("ordered"));
    }
}
