//! Viewer configuration

use crate::thumbnail_cache::ThumbnailSize;
use crate::ViewerError;
use app_fs::CasePolicy;
use app_log::LogConfig;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main viewer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub view: ViewConfig,
    pub slideshow: SlideshowConfig,
    pub thumbnails: ThumbnailConfig,
    pub workers: WorkerConfig,
    pub live_text: LiveTextConfig,
    pub files: FilesConfig,
    pub log: LogConfig,
    pub keybindings: HashMap<String, Vec<String>>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            view: ViewConfig::default(),
            slideshow: SlideshowConfig::default(),
            thumbnails: ThumbnailConfig::default(),
            workers: WorkerConfig::default(),
            live_text: LiveTextConfig::default(),
            files: FilesConfig::default(),
            log: LogConfig::default(),
            keybindings: default_keybindings(),
        }
    }
}

/// Zoom limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub min_scale: f32,
    pub max_scale: f32,
    /// Factor applied per zoom step
    pub zoom_step: f32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.02,
            max_scale: 20.0,
            zoom_step: 1.1,
        }
    }
}

impl ViewConfig {
    /// Reject limits zoom cannot work with
    pub fn validate(&self) -> Result<(), ViewerError> {
        let finite = self.min_scale.is_finite()
            && self.max_scale.is_finite()
            && self.zoom_step.is_finite();
        if !finite || self.min_scale <= 0.0 || self.min_scale > self.max_scale {
            return Err(ViewerError::Config(format!(
                "view: need 0 < min_scale <= max_scale, got {} and {}",
                self.min_scale, self.max_scale
            )));
        }
        if self.zoom_step <= 1.0 {
            return Err(ViewerError::Config(format!(
                "view: zoom_step must be greater than 1, got {}",
                self.zoom_step
            )));
        }
        Ok(())
    }

    /// These limits if valid, otherwise the defaults
    pub fn sanitized(self) -> Self {
        match self.validate() {
            Ok(()) => self,
            Err(e) => {
                tracing::warn!("{}; using default zoom limits", e);
                Self::default()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlideshowConfig {
    pub interval_ms: u64,
}

impl Default for SlideshowConfig {
    fn default() -> Self {
        Self { interval_ms: 3000 }
    }
}

impl SlideshowConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub max_items: usize,
    pub max_bytes: usize,
    pub default_size: ThumbnailSize,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_items: 512,
            max_bytes: 64 * 1024 * 1024,
            default_size: ThumbnailSize::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Decode/extraction pool size
    pub threads: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self { threads: cores.min(4) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveTextConfig {
    /// Extraction requests older than this are treated as cancelled
    pub deadline_ms: Option<u64>,
    /// Tesseract language code
    pub language: String,
}

impl Default for LiveTextConfig {
    fn default() -> Self {
        Self {
            deadline_ms: None,
            language: "eng".to_string(),
        }
    }
}

impl LiveTextConfig {
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub rename_case_policy: CasePolicy,
    /// JPEG quality used by the re-encode rotation fallback
    pub reencode_quality: u8,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            rename_case_policy: CasePolicy::Insensitive,
            reencode_quality: 90,
        }
    }
}

impl ViewerConfig {
    /// Load configuration from the platform config directory
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults when it is missing
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.view.validate()?;
            tracing::info!("Configuration loaded from {:?}", path);
            Ok(config)
        } else {
            tracing::info!("Using default configuration");
            Ok(Self::default())
        }
    }

    /// Save configuration to the platform config directory
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        tracing::info!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Get the configuration file path
    pub fn config_path() -> PathBuf {
        ProjectDirs::from("org", "Iris", "iris")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("./config.toml"))
    }

    /// Command id bound to `key`, if any
    pub fn command_for_key(&self, key: &str) -> Option<&str> {
        self.keybindings
            .iter()
            .find(|(_, keys)| keys.iter().any(|k| k == key))
            .map(|(id, _)| id.as_str())
    }
}

fn default_keybindings() -> HashMap<String, Vec<String>> {
    let mut kb = HashMap::new();

    // ========================================
    // Navigation (nav.*)
    // ========================================

    kb.insert("nav.next_item".into(), vec!["Right".into(), "l".into()]);
    kb.insert("nav.prev_item".into(), vec!["Left".into(), "h".into()]);
    kb.insert("nav.first_item".into(), vec!["Home".into()]);
    kb.insert("nav.last_item".into(), vec!["End".into()]);

    // ========================================
    // View (view.*)
    // ========================================

    kb.insert("view.zoom_in".into(), vec!["Plus".into(), "=".into()]);
    kb.insert("view.zoom_out".into(), vec!["Minus".into()]);
    kb.insert("view.zoom_reset".into(), vec!["0".into()]);
    kb.insert("view.fit_window".into(), vec!["w".into()]);
    kb.insert("view.rotate_cw".into(), vec!["r".into()]);
    kb.insert("view.rotate_ccw".into(), vec!["Shift+r".into()]);
    kb.insert("view.slideshow".into(), vec!["F5".into()]);
    kb.insert("view.info".into(), vec!["i".into()]);
    kb.insert("view.live_text".into(), vec!["t".into()]);

    // ========================================
    // File (file.*)
    // ========================================

    kb.insert("file.delete".into(), vec!["Delete".into()]);
    kb.insert("file.delete_permanently".into(), vec!["Shift+Delete".into()]);
    kb.insert("file.apply_rotation".into(), vec!["Ctrl+s".into()]);
    kb.insert("file.reveal".into(), vec!["Ctrl+e".into()]);
    kb.insert("file.print".into(), vec!["Ctrl+p".into()]);
    kb.insert("file.set_wallpaper".into(), vec!["Ctrl+F8".into()]);

    kb
}
