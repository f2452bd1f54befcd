//! Rotating banner carousel.
//!
//! Cycles through banners on an autoplay interval, with manual
//! next/prev/goto navigation and horizontal swipe. Transitions are exclusive:
//! navigation requested while a transition is settling is dropped, not
//! queued.

use std::collections::{BTreeSet, HashSet};

use adview_protocol::{BannerItem, Millis, TimerId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::host::{Scheduler, Wakeup, WakeupSink};

pub const DEFAULT_ANIMATION_SPEED_MS: Millis = 5_000;

/// Time a transition stays in flight before the next one is accepted.
pub const TRANSITION_SETTLE_MS: Millis = 500;

/// Horizontal travel a swipe must exceed to navigate.
pub const SWIPE_THRESHOLD_PX: f64 = 50.0;

pub const DEFAULT_PLACEHOLDER_IMAGE: &str = "/images/ad-placeholder.png";

#[derive(Debug, Error, PartialEq)]
pub enum CarouselConfigError {
    #[error("animation speed must be greater than zero")]
    ZeroAnimationSpeed,
    #[error("duplicate banner id {0:?}")]
    DuplicateBanner(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CarouselConfig {
    pub animation_speed_ms: Millis,
    /// Pause autoplay while the pointer hovers. Set to `false` on touch
    /// devices, which have no hover.
    pub pause_on_hover: bool,
    pub placeholder_image: String,
}

impl Default for CarouselConfig {
    fn default() -> Self {
        Self {
            animation_speed_ms: DEFAULT_ANIMATION_SPEED_MS,
            pause_on_hover: true,
            placeholder_image: DEFAULT_PLACEHOLDER_IMAGE.to_owned(),
        }
    }
}

impl CarouselConfig {
    pub fn validate(&self) -> Result<(), CarouselConfigError> {
        if self.animation_speed_ms == 0 {
            return Err(CarouselConfigError::ZeroAnimationSpeed);
        }
        Ok(())
    }
}

/// Observable rotation state of one carousel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RotationState {
    pub current_index: usize,
    pub is_transitioning: bool,
    pub is_paused: bool,
    /// Indices whose images may load. Only ever grows.
    pub loaded_indices: BTreeSet<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SwipeDirection {
    /// Finger moved left: advance.
    Left,
    /// Finger moved right: go back.
    Right,
}

#[derive(Debug, Clone, Copy, Default)]
struct TouchTrack {
    start_x: Option<f64>,
    last_x: Option<f64>,
}

pub struct Carousel<S: Scheduler> {
    scheduler: S,
    banners: Vec<BannerItem>,
    config: CarouselConfig,
    state: RotationState,
    failed_images: HashSet<usize>,
    touch: TouchTrack,
    autoplay: Option<TimerId>,
    settle: Option<TimerId>,
}

impl<S: Scheduler> Carousel<S> {
    /// Mount a carousel and start autoplay.
    pub fn new(
        scheduler: S,
        banners: Vec<BannerItem>,
        config: CarouselConfig,
    ) -> Result<Self, CarouselConfigError> {
        config.validate()?;
        let mut seen = HashSet::new();
        for banner in &banners {
            if !seen.insert(banner.id.as_str()) {
                return Err(CarouselConfigError::DuplicateBanner(banner.id.clone()));
            }
        }

        let mut carousel = Self {
            scheduler,
            banners,
            config,
            state: RotationState {
                current_index: 0,
                is_transitioning: false,
                is_paused: false,
                loaded_indices: BTreeSet::from([0]),
            },
            failed_images: HashSet::new(),
            touch: TouchTrack::default(),
            autoplay: None,
            settle: None,
        };
        carousel.preload_neighbors();
        carousel.restart_autoplay();
        tracing::debug!(banners = carousel.len(), "carousel mounted");
        Ok(carousel)
    }

    pub fn state(&self) -> &RotationState {
        &self.state
    }

    pub fn len(&self) -> usize {
        self.banners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.banners.is_empty()
    }

    pub fn current(&self) -> Option<&BannerItem> {
        self.banners.get(self.state.current_index)
    }

    pub fn banners(&self) -> &[BannerItem] {
        &self.banners
    }

    pub fn is_loaded(&self, index: usize) -> bool {
        self.state.loaded_indices.contains(&index)
    }

    /// Image to render for a banner: the placeholder once its image failed.
    pub fn image_url(&self, index: usize) -> Option<&str> {
        let banner = self.banners.get(index)?;
        if self.failed_images.contains(&index) {
            Some(self.config.placeholder_image.as_str())
        } else {
            Some(banner.image_url.as_str())
        }
    }

    /// Record an image load failure. Rotation is unaffected.
    pub fn image_failed(&mut self, index: usize) {
        if index < self.banners.len() && self.failed_images.insert(index) {
            tracing::warn!(index, "banner image failed, using placeholder");
        }
    }

    pub fn next(&mut self) -> bool {
        let count = self.banners.len();
        if count < 2 {
            return false;
        }
        self.transition_to((self.state.current_index + 1) % count)
    }

    pub fn prev(&mut self) -> bool {
        let count = self.banners.len();
        if count < 2 {
            return false;
        }
        self.transition_to((self.state.current_index + count - 1) % count)
    }

    pub fn goto_index(&mut self, index: usize) -> bool {
        if index >= self.banners.len() || index == self.state.current_index {
            return false;
        }
        self.transition_to(index)
    }

    fn transition_to(&mut self, index: usize) -> bool {
        if self.state.is_transitioning {
            tracing::debug!(index, "navigation dropped mid-transition");
            return false;
        }
        self.state.is_transitioning = true;
        self.state.current_index = index;
        self.preload_neighbors();
        self.settle = Some(self.scheduler.set_timeout(TRANSITION_SETTLE_MS));
        true
    }

    fn preload_neighbors(&mut self) {
        let count = self.banners.len();
        if count == 0 {
            return;
        }
        let current = self.state.current_index;
        self.state.loaded_indices.extend([
            current,
            (current + 1) % count,
            (current + count - 1) % count,
        ]);
    }

    pub fn set_paused(&mut self, paused: bool) {
        if self.state.is_paused == paused {
            return;
        }
        self.state.is_paused = paused;
        self.restart_autoplay();
    }

    pub fn set_animation_speed(&mut self, speed_ms: Millis) -> Result<(), CarouselConfigError> {
        if speed_ms == 0 {
            return Err(CarouselConfigError::ZeroAnimationSpeed);
        }
        if self.config.animation_speed_ms != speed_ms {
            self.config.animation_speed_ms = speed_ms;
            self.restart_autoplay();
        }
        Ok(())
    }

    pub fn pointer_enter(&mut self) {
        if self.config.pause_on_hover {
            self.set_paused(true);
        }
    }

    pub fn pointer_leave(&mut self) {
        if self.config.pause_on_hover {
            self.set_paused(false);
        }
    }

    pub fn touch_start(&mut self, x: f64) {
        self.touch = TouchTrack {
            start_x: Some(x),
            last_x: None,
        };
    }

    pub fn touch_move(&mut self, x: f64) {
        if self.touch.start_x.is_some() {
            self.touch.last_x = Some(x);
        }
    }

    /// Resolve the gesture. Returns the swipe direction if it navigated.
    pub fn touch_end(&mut self) -> Option<SwipeDirection> {
        let TouchTrack { start_x, last_x } = std::mem::take(&mut self.touch);
        let delta = start_x? - last_x?;
        if delta > SWIPE_THRESHOLD_PX {
            self.next().then_some(SwipeDirection::Left)
        } else if delta < -SWIPE_THRESHOLD_PX {
            self.prev().then_some(SwipeDirection::Right)
        } else {
            None
        }
    }

    /// Feed a fired timer. Returns `false` if it is not this carousel's.
    pub fn on_timer(&mut self, timer: TimerId) -> bool {
        if self.settle == Some(timer) {
            self.settle = None;
            self.state.is_transitioning = false;
            true
        } else if self.autoplay == Some(timer) {
            self.next();
            true
        } else {
            false
        }
    }

    fn restart_autoplay(&mut self) {
        if let Some(timer) = self.autoplay.take() {
            self.scheduler.clear_timer(timer);
        }
        if !self.state.is_paused && self.banners.len() > 1 {
            self.autoplay = Some(self.scheduler.set_interval(self.config.animation_speed_ms));
        }
    }
}

impl<S: Scheduler> WakeupSink for Carousel<S> {
    fn wake(&mut self, wakeup: Wakeup) -> bool {
        match wakeup {
            Wakeup::Timer(timer) => self.on_timer(timer),
            Wakeup::Frame(_) => false,
        }
    }
}

impl<S: Scheduler> Drop for Carousel<S> {
    fn drop(&mut self) {
        for timer in [self.autoplay.take(), self.settle.take()].into_iter().flatten() {
            self.scheduler.clear_timer(timer);
        }
    }
}

impl<S: Scheduler> std::fmt::Debug for Carousel<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Carousel")
            .field("banners", &self.banners.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
