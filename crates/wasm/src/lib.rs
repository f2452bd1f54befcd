//! Page-facing bindings.
//!
//! The page owns the DOM: it registers elements, forwards observer, timer,
//! frame, scroll, pointer and touch events, and after each call drains the
//! queued [`HostCommand`](adview_protocol::HostCommand)s with
//! [`drain_commands`] and executes them.

mod engine;
mod host;

use std::cell::RefCell;

use adview_core::ViewabilityOptions;
use adview_protocol::LayoutMeasurement;
use wasm_bindgen::prelude::*;

pub use engine::{BridgeError, Engine};
pub use host::QueueHost;

thread_local! {
    static ENGINE: RefCell<Engine> = RefCell::new(Engine::new());
}

fn with_engine<T>(f: impl FnOnce(&mut Engine) -> T) -> T {
    ENGINE.with_borrow_mut(f)
}

fn js_err(e: BridgeError) -> JsError {
    JsError::new(&e.to_string())
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
}

/// Apply a JSON `EngineConfig` to components created afterwards.
#[wasm_bindgen]
pub fn configure(config_json: &str) -> Result<(), JsError> {
    with_engine(|e| e.configure(config_json.as_bytes())).map_err(js_err)
}

/// Mirror the page clock. Call before forwarding any event.
#[wasm_bindgen]
pub fn set_now(now_ms: f64) {
    with_engine(|e| e.set_now(now_ms));
}

#[wasm_bindgen]
pub fn register_element(parent: Option<u32>) -> u32 {
    with_engine(|e| e.register_element(parent))
}

#[wasm_bindgen]
pub fn unregister_element(element: u32) -> bool {
    with_engine(|e| e.unregister_element(element))
}

/// Set or clear the closed marker on a dismissed ad container.
#[wasm_bindgen]
pub fn set_closed(element: u32, closed: bool) {
    with_engine(|e| e.set_closed(element, closed));
}

/// Report the `src` of the element's embedded ad frame, or `undefined`.
#[wasm_bindgen]
pub fn set_surface(element: u32, src: Option<String>) {
    with_engine(|e| e.mirror_surface(element, src));
}

/// Observe with the configured options. Returns an unsubscribe handle.
#[wasm_bindgen]
pub fn observe(element: Option<u32>) -> Result<u32, JsError> {
    with_engine(|e| e.observe(element, None)).map_err(js_err)
}

#[wasm_bindgen]
pub fn observe_with(
    element: Option<u32>,
    threshold: f64,
    required_time_ms: u32,
) -> Result<u32, JsError> {
    let options = ViewabilityOptions {
        threshold,
        required_time_ms: u64::from(required_time_ms),
    };
    with_engine(|e| e.observe(element, Some(options))).map_err(js_err)
}

#[wasm_bindgen]
pub fn unobserve(handle: u32) {
    with_engine(|e| e.unobserve(handle));
}

#[wasm_bindgen]
pub fn intersection(element: u32, ratio: f64, is_intersecting: bool) {
    with_engine(|e| e.intersection(element, ratio, is_intersecting));
}

#[wasm_bindgen]
pub fn timer_fired(timer: u32) -> bool {
    with_engine(|e| e.timer_fired(timer))
}

#[wasm_bindgen]
pub fn animation_frame(frame: u32) -> bool {
    with_engine(|e| e.animation_frame(frame))
}

#[wasm_bindgen]
pub fn can_refresh(element: u32) -> bool {
    with_engine(|e| e.can_refresh(element))
}

#[wasm_bindgen]
pub fn refresh(element: u32) -> bool {
    with_engine(|e| e.refresh(element))
}

/// Viewability snapshot as JSON, `null` for unknown elements.
#[wasm_bindgen]
pub fn stats(element: u32) -> Result<String, JsError> {
    let stats = with_engine(|e| e.stats(element));
    serde_json::to_string(&stats).map_err(|e| JsError::new(&e.to_string()))
}

#[wasm_bindgen]
pub fn reset_state(element: u32) {
    with_engine(|e| e.reset_state(element));
}

/// Mount a carousel from a JSON array of banner items.
#[wasm_bindgen]
pub fn create_carousel(banners_json: &str) -> Result<u32, JsError> {
    with_engine(|e| e.create_carousel(banners_json.as_bytes())).map_err(js_err)
}

#[wasm_bindgen]
pub fn carousel_next(handle: u32) -> Result<bool, JsError> {
    with_engine(|e| e.carousel(handle).map(|c| c.next())).map_err(js_err)
}

#[wasm_bindgen]
pub fn carousel_prev(handle: u32) -> Result<bool, JsError> {
    with_engine(|e| e.carousel(handle).map(|c| c.prev())).map_err(js_err)
}

#[wasm_bindgen]
pub fn carousel_goto(handle: u32, index: usize) -> Result<bool, JsError> {
    with_engine(|e| e.carousel(handle).map(|c| c.goto_index(index))).map_err(js_err)
}

/// Pointer entered (`true`) or left (`false`) the carousel.
#[wasm_bindgen]
pub fn carousel_hover(handle: u32, inside: bool) -> Result<(), JsError> {
    with_engine(|e| {
        e.carousel(handle).map(|c| {
            if inside {
                c.pointer_enter();
            } else {
                c.pointer_leave();
            }
        })
    })
    .map_err(js_err)
}

#[wasm_bindgen]
pub fn carousel_touch_start(handle: u32, x: f64) -> Result<(), JsError> {
    with_engine(|e| e.carousel(handle).map(|c| c.touch_start(x))).map_err(js_err)
}

#[wasm_bindgen]
pub fn carousel_touch_move(handle: u32, x: f64) -> Result<(), JsError> {
    with_engine(|e| e.carousel(handle).map(|c| c.touch_move(x))).map_err(js_err)
}

/// Resolve a touch gesture. Returns whether it navigated.
#[wasm_bindgen]
pub fn carousel_touch_end(handle: u32) -> Result<bool, JsError> {
    with_engine(|e| e.carousel(handle).map(|c| c.touch_end().is_some())).map_err(js_err)
}

#[wasm_bindgen]
pub fn carousel_image_failed(handle: u32, index: usize) -> Result<(), JsError> {
    with_engine(|e| e.carousel(handle).map(|c| c.image_failed(index))).map_err(js_err)
}

/// Image URL to render for a banner, with the placeholder substituted.
#[wasm_bindgen]
pub fn carousel_image_url(handle: u32, index: usize) -> Result<Option<String>, JsError> {
    with_engine(|e| {
        e.carousel(handle)
            .map(|c| c.image_url(index).map(str::to_owned))
    })
    .map_err(js_err)
}

/// Rotation state as JSON.
#[wasm_bindgen]
pub fn carousel_state(handle: u32) -> Result<String, JsError> {
    with_engine(|e| -> Result<String, BridgeError> {
        let carousel = e.carousel(handle)?;
        Ok(serde_json::to_string(carousel.state())?)
    })
    .map_err(js_err)
}

#[wasm_bindgen]
pub fn destroy_carousel(handle: u32) -> bool {
    with_engine(|e| e.destroy_carousel(handle))
}

/// Mount a sticky placement. A missing or blank ad unit renders nothing.
#[wasm_bindgen]
pub fn create_sticky(
    ad_unit: Option<String>,
    container_bottom: f64,
    footer_top: Option<f64>,
) -> Result<u32, JsError> {
    with_engine(|e| {
        e.create_sticky(
            ad_unit.as_deref(),
            LayoutMeasurement::new(container_bottom, footer_top),
        )
    })
    .map_err(js_err)
}

/// Re-evaluate after a scroll. Returns `"sticky"`, `"inFlow"` or `"hidden"`.
#[wasm_bindgen]
pub fn sticky_scroll(
    handle: u32,
    container_bottom: f64,
    footer_top: Option<f64>,
) -> Result<String, JsError> {
    with_engine(|e| {
        e.sticky(handle).map(|s| {
            s.on_scroll(LayoutMeasurement::new(container_bottom, footer_top))
                .as_str()
                .to_owned()
        })
    })
    .map_err(js_err)
}

#[wasm_bindgen]
pub fn sticky_dismiss(handle: u32) -> Result<(), JsError> {
    with_engine(|e| e.sticky(handle).map(adview_core::StickyPlacement::dismiss)).map_err(js_err)
}

#[wasm_bindgen]
pub fn destroy_sticky(handle: u32) -> bool {
    with_engine(|e| e.destroy_sticky(handle))
}

/// Every command queued since the last drain, as a JSON array.
#[wasm_bindgen]
pub fn drain_commands() -> Result<String, JsError> {
    let commands = with_engine(Engine::drain);
    serde_json::to_string(&commands).map_err(|e| JsError::new(&e.to_string()))
}
