//! Iris Logging & Observability Module
//!
//! Provides structured logging, panic crash reports, and deadlock detection.

mod panic_hook;
mod logging;

pub use panic_hook::init_panic_hook;
pub use logging::{cleanup_old_logs, init_logging, LogConfig, LogGuard};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Default log directory for the application
pub fn default_log_dir() -> PathBuf {
    ProjectDirs::from("org", "Iris", "iris")
        .map(|dirs| dirs.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("./logs"))
}

/// Initialize all observability features.
///
/// The returned guard flushes the log file on drop; keep it alive for the
/// lifetime of the application.
pub fn init(config: &LogConfig) -> anyhow::Result<LogGuard> {
    let guard = init_logging(config)?;
    init_panic_hook(config.dir());

    #[cfg(debug_assertions)]
    init_deadlock_detector();

    Ok(guard)
}

#[cfg(debug_assertions)]
fn init_deadlock_detector() {
    use std::thread;
    use std::time::Duration;

    let spawned = thread::Builder::new()
        .name("deadlock-detector".into())
        .spawn(|| loop {
            thread::sleep(Duration::from_secs(10));
            let deadlocks = parking_lot::deadlock::check_deadlock();
            if deadlocks.is_empty() {
                continue;
            }
            tracing::error!("{} deadlock(s) detected", deadlocks.len());
            for (i, threads) in deadlocks.iter().enumerate() {
                for t in threads {
                    tracing::error!(deadlock = i, thread_id = ?t.thread_id(), "{:#?}", t.backtrace());
                }
            }
        });

    if let Err(e) = spawned {
        tracing::warn!("Deadlock detector not started: {}", e);
    }
}
