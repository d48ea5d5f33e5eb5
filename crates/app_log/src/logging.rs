//! Structured logging setup with tracing

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_FILE_PREFIX: &str = "iris.log";

/// Logging configuration (the `[log]` table of the config file)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is not set
    pub level: String,
    /// Write JSON lines to a daily rolling file
    pub json_file: bool,
    /// Log files older than this are removed by `cleanup_old_logs`
    pub retain_days: u32,
    /// Overrides the platform data directory
    pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_file: true,
            retain_days: 7,
            directory: None,
        }
    }
}

impl LogConfig {
    pub fn dir(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(super::default_log_dir)
    }
}

/// Flushes buffered file output when dropped
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize the logging system
pub fn init_logging(config: &LogConfig) -> anyhow::Result<LogGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = if config.json_file {
        let log_dir = config.dir();
        std::fs::create_dir_all(&log_dir)?;
        let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        (Some(fmt::layer().json().with_writer(non_blocking)), Some(guard))
    } else {
        (None, None)
    };

    // Development: pretty console output; release: compact stderr
    #[cfg(debug_assertions)]
    let console_layer = fmt::layer().pretty().with_writer(std::io::stderr);
    #[cfg(not(debug_assertions))]
    let console_layer = fmt::layer().compact().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("logging already initialized: {}", e))?;

    tracing::info!(level = %config.level, json_file = config.json_file, "Logging initialized");
    Ok(LogGuard { _file: guard })
}

/// Remove log files in `dir` older than `days`
pub fn cleanup_old_logs(dir: &Path, days: u32) -> anyhow::Result<usize> {
    use std::time::{Duration, SystemTime};

    if !dir.exists() {
        return Ok(0);
    }

    let threshold = SystemTime::now() - Duration::from_secs(u64::from(days) * 24 * 60 * 60);
    let mut deleted = 0;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        let is_log = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with(LOG_FILE_PREFIX))
            .unwrap_or(false);
        if !is_log {
            continue;
        }

        let stale = entry
            .metadata()
            .and_then(|m| m.modified())
            .map(|modified| modified < threshold)
            .unwrap_or(false);
        if stale && std::fs::remove_file(&path).is_ok() {
            deleted += 1;
            tracing::debug!("Deleted old log: {:?}", path);
        }
    }

    tracing::info!("Cleaned up {} old log files", deleted);
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_keeps_fresh_and_foreign_files() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("iris.log.2026-10-15"), b"{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        let deleted = cleanup_old_logs(dir.path(), 7).unwrap();
        assert_eq!(deleted, 0);
        assert!(dir.path().join("iris.log.2026-10-15").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_cleanup_zero_days_removes_logs() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("iris.log.2026-10-01"), b"{}").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));

        let deleted = cleanup_old_logs(dir.path(), 0).unwrap();
        assert_eq!(deleted, 1);
    }

    #[test]
    fn test_missing_dir_is_empty() {
        assert_eq!(cleanup_old_logs(Path::new("/nonexistent-iris-logs"), 7).unwrap(), 0);
    }

    #[test]
    fn test_config_dir_override() {
        let config = LogConfig {
            directory: Some(PathBuf::from("/var/tmp/iris-logs")),
            ..LogConfig::default()
        };
        assert_eq!(config.dir(), PathBuf::from("/var/tmp/iris-logs"));
    }
}
