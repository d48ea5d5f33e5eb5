//! Zoom state of the displayed image

use crate::config::ViewConfig;
use serde::Serialize;

/// How the image scale is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FitMode {
    /// Scale follows the window
    FitToWindow,
    /// Explicit scale set by zooming
    Manual,
}

/// Pure view state; every operation is infallible
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewState {
    scale: f32,
    fit: FitMode,
    #[serde(skip)]
    limits: ViewConfig,
}

impl ViewState {
    pub fn new(limits: ViewConfig) -> Self {
        Self {
            scale: 1.0,
            fit: FitMode::FitToWindow,
            limits: limits.sanitized(),
        }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn fit(&self) -> FitMode {
        self.fit
    }

    pub fn zoom_in(&mut self) -> f32 {
        self.set_scale(self.scale * self.limits.zoom_step)
    }

    pub fn zoom_out(&mut self) -> f32 {
        self.set_scale(self.scale / self.limits.zoom_step)
    }

    /// Original size
    pub fn zoom_reset(&mut self) -> f32 {
        self.set_scale(1.0)
    }

    /// Fit the image into the window. With a known image and window size the
    /// resulting scale is computed; otherwise only the mode changes.
    pub fn fit_to_window(&mut self, image: Option<(u32, u32)>, window: Option<(u32, u32)>) -> f32 {
        if let (Some((iw, ih)), Some((ww, wh))) = (image, window) {
            if iw > 0 && ih > 0 {
                let scale = (ww as f32 / iw as f32).min(wh as f32 / ih as f32);
                self.scale = self.clamp(scale);
            }
        }
        self.fit = FitMode::FitToWindow;
        self.scale
    }

    /// A new image is shown: back to fit-to-window
    pub fn reset_for_new_image(&mut self) {
        self.scale = 1.0;
        self.fit = FitMode::FitToWindow;
    }

    fn set_scale(&mut self, scale: f32) -> f32 {
        self.scale = self.clamp(scale);
        self.fit = FitMode::Manual;
        self.scale
    }

    fn clamp(&self, scale: f32) -> f32 {
        if scale.is_finite() {
            scale.clamp(self.limits.min_scale, self.limits.max_scale)
        } else {
            self.limits.max_scale
        }
    }
}

impl Default for ViewState {
    fn default() -> Self {
        Self::new(ViewConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_clamped_to_limits() {
        let mut view = ViewState::default();
        for _ in 0..200 {
            view.zoom_in();
        }
        assert_eq!(view.scale(), 20.0);

        for _ in 0..400 {
            view.zoom_out();
        }
        assert_eq!(view.scale(), 0.02);
        assert_eq!(view.fit(), FitMode::Manual);
    }

    #[test]
    fn test_zoom_step() {
        let mut view = ViewState::default();
        let scale = view.zoom_in();
        assert!((scale - 1.1).abs() < 1e-6);
        view.zoom_out();
        assert!((view.scale() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_reset_and_fit() {
        let mut view = ViewState::default();
        view.zoom_in();
        assert_eq!(view.zoom_reset(), 1.0);

        let scale = view.fit_to_window(Some((2000, 1000)), Some((1000, 1000)));
        assert!((scale - 0.5).abs() < 1e-6);
        assert_eq!(view.fit(), FitMode::FitToWindow);

        view.zoom_in();
        view.reset_for_new_image();
        assert_eq!(view.scale(), 1.0);
        assert_eq!(view.fit(), FitMode::FitToWindow);
    }

    #[test]
    fn test_invalid_limits_fall_back_to_defaults() {
        let inverted = ViewConfig {
            min_scale: 5.0,
            max_scale: 1.0,
            ..ViewConfig::default()
        };
        let mut view = ViewState::new(inverted);
        assert!((view.zoom_in() - 1.1).abs() < 1e-6);

        let nan = ViewConfig {
            max_scale: f32::NAN,
            ..ViewConfig::default()
        };
        let mut view = ViewState::new(nan);
        for _ in 0..200 {
            view.zoom_in();
        }
        assert_eq!(view.scale(), 20.0);
    }
}
