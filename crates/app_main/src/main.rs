//! Iris - headless image viewer
//!
//! Main entry point. Commands are read from stdin, one per line.

mod app;

use anyhow::Result;
use app_core::ViewerConfig;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "iris", version, about = "Headless image viewer")]
struct Args {
    /// Image files or a directory to open
    paths: Vec<PathBuf>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter, overrides the configured level
    #[arg(long)]
    log_level: Option<String>,

    /// Start the slideshow after opening
    #[arg(long)]
    slideshow: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ViewerConfig::load_from(path)?,
        None => ViewerConfig::load().unwrap_or_default(),
    };
    if let Some(level) = &args.log_level {
        config.log.level = level.clone();
    }

    // Initialize logging and panic hook first
    let _log_guard = app_log::init(&config.log)?;

    if let Err(e) = app_log::cleanup_old_logs(&config.log.dir(), config.log.retain_days) {
        tracing::warn!("Failed to cleanup old logs: {}", e);
    }

    tracing::info!("Iris starting...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("iris-rt")
        .build()?;

    runtime.block_on(app::run(config, args.paths, args.slideshow))
}
