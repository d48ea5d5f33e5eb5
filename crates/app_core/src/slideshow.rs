//! Slideshow autoplay state machine
//!
//! Time is passed in by the caller so the control loop owns the clock.

use serde::Serialize;
use std::time::{Duration, Instant};

const MIN_INTERVAL_SECS: f32 = 0.5;
const MAX_INTERVAL_SECS: f32 = 60.0;

/// Slideshow state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
pub enum SlideshowState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Slideshow controller
#[derive(Debug, Clone)]
pub struct SlideshowController {
    state: SlideshowState,
    interval: Duration,
    /// Next advance while playing
    deadline: Option<Instant>,
}

impl SlideshowController {
    pub fn new(interval: Duration) -> Self {
        let mut slideshow = Self {
            state: SlideshowState::Stopped,
            interval: Duration::ZERO,
            deadline: None,
        };
        slideshow.set_interval(interval);
        slideshow
    }

    pub fn state(&self) -> SlideshowState {
        self.state
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_playing(&self) -> bool {
        self.state == SlideshowState::Playing
    }

    /// Start from `Stopped`. An empty collection stays stopped.
    pub fn start(&mut self, now: Instant, collection_len: usize) -> SlideshowState {
        if self.state == SlideshowState::Stopped && collection_len > 0 {
            self.state = SlideshowState::Playing;
            self.deadline = Some(now + self.interval);
            tracing::info!("Slideshow started ({:?} interval)", self.interval);
        }
        self.state
    }

    pub fn pause(&mut self) -> SlideshowState {
        if self.state == SlideshowState::Playing {
            self.state = SlideshowState::Paused;
            self.deadline = None;
            tracing::debug!("Slideshow paused");
        }
        self.state
    }

    pub fn resume(&mut self, now: Instant) -> SlideshowState {
        if self.state == SlideshowState::Paused {
            self.state = SlideshowState::Playing;
            self.deadline = Some(now + self.interval);
            tracing::debug!("Slideshow resumed");
        }
        self.state
    }

    pub fn stop(&mut self) -> SlideshowState {
        if self.state != SlideshowState::Stopped {
            tracing::info!("Slideshow stopped");
        }
        self.state = SlideshowState::Stopped;
        self.deadline = None;
        self.state
    }

    /// Play/pause button
    pub fn toggle(&mut self, now: Instant, collection_len: usize) -> SlideshowState {
        match self.state {
            SlideshowState::Stopped => self.start(now, collection_len),
            SlideshowState::Playing => self.pause(),
            SlideshowState::Paused => self.resume(now),
        }
    }

    /// Returns true when the interval elapsed and the caller should advance
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if self.state == SlideshowState::Playing && now >= deadline => {
                self.deadline = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }

    /// When the next advance is due, if playing
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline.filter(|_| self.state == SlideshowState::Playing)
    }

    /// The user navigated: restart the interval without changing state
    pub fn on_user_navigation(&mut self, now: Instant) {
        if self.state == SlideshowState::Playing {
            self.deadline = Some(now + self.interval);
        }
    }

    /// The collection became empty
    pub fn on_collection_emptied(&mut self) {
        self.stop();
    }

    /// Set the interval, clamped to 0.5-60 seconds. Applies from the next
    /// advance.
    pub fn set_interval(&mut self, interval: Duration) {
        let secs = interval.as_secs_f32().clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS);
        self.interval = Duration::from_secs_f32(secs);
    }
}

impl Default for SlideshowController {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEC: Duration = Duration::from_secs(1);

    #[test]
    fn test_slideshow_toggle() {
        let now = Instant::now();
        let mut ss = SlideshowController::default();
        assert_eq!(ss.state(), SlideshowState::Stopped);

        assert_eq!(ss.toggle(now, 10), SlideshowState::Playing);
        assert_eq!(ss.toggle(now, 10), SlideshowState::Paused);
        assert_eq!(ss.toggle(now, 10), SlideshowState::Playing);
        assert_eq!(ss.stop(), SlideshowState::Stopped);
    }

    #[test]
    fn test_unlisted_transitions_are_noops() {
        let now = Instant::now();
        let mut ss = SlideshowController::default();
        assert_eq!(ss.pause(), SlideshowState::Stopped);
        assert_eq!(ss.resume(now), SlideshowState::Stopped);

        ss.start(now, 3);
        assert_eq!(ss.resume(now), SlideshowState::Playing);
        assert_eq!(ss.start(now, 3), SlideshowState::Playing);

        ss.pause();
        assert_eq!(ss.start(now, 3), SlideshowState::Paused);
        assert!(!ss.tick(now + 10 * SEC));
    }

    #[test]
    fn test_start_empty_stays_stopped() {
        let mut ss = SlideshowController::default();
        assert_eq!(ss.start(Instant::now(), 0), SlideshowState::Stopped);
        assert!(ss.next_deadline().is_none());
    }

    #[test]
    fn test_tick_fires_each_interval() {
        let t0 = Instant::now();
        let mut ss = SlideshowController::new(2 * SEC);
        ss.start(t0, 3);

        assert!(!ss.tick(t0 + SEC));
        assert!(ss.tick(t0 + 2 * SEC));
        assert!(!ss.tick(t0 + 3 * SEC));
        assert!(ss.tick(t0 + 4 * SEC));
        assert_eq!(ss.next_deadline(), Some(t0 + 6 * SEC));
    }

    #[test]
    fn test_user_navigation_resets_interval() {
        let t0 = Instant::now();
        let mut ss = SlideshowController::new(2 * SEC);
        ss.start(t0, 3);

        ss.on_user_navigation(t0 + SEC);
        assert!(!ss.tick(t0 + 2 * SEC));
        assert!(ss.tick(t0 + 3 * SEC));
        assert_eq!(ss.state(), SlideshowState::Playing);
    }

    #[test]
    fn test_emptied_forces_stop() {
        let mut ss = SlideshowController::default();
        ss.start(Instant::now(), 1);
        ss.on_collection_emptied();
        assert_eq!(ss.state(), SlideshowState::Stopped);
    }

    #[test]
    fn test_interval_clamped() {
        let mut ss = SlideshowController::default();
        ss.set_interval(Duration::from_millis(10));
        assert_eq!(ss.interval(), Duration::from_millis(500));
        ss.set_interval(Duration::from_secs(600));
        assert_eq!(ss.interval(), Duration::from_secs(60));
    }
}
