//! File system watcher with notify-debouncer-mini

use crate::is_supported_image;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;

/// External change to an image file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    /// The file exists and changed (or appeared)
    Changed(PathBuf),
    /// The file no longer exists
    Removed(PathBuf),
}

impl FsEvent {
    pub fn path(&self) -> &Path {
        match self {
            FsEvent::Changed(p) | FsEvent::Removed(p) => p,
        }
    }
}

/// Watches the directory of the open collection
pub struct FileWatcher {
    debouncer: Debouncer<RecommendedWatcher>,
    event_rx: Receiver<Result<Vec<DebouncedEvent>, notify::Error>>,
    watched: Option<PathBuf>,
}

impl FileWatcher {
    /// Create a new file watcher with the given debounce window
    pub fn new(debounce: Duration) -> Result<Self, notify::Error> {
        let (tx, rx) = channel();
        let debouncer = new_debouncer(debounce, tx)?;

        Ok(Self {
            debouncer,
            event_rx: rx,
            watched: None,
        })
    }

    /// Watch `dir` (non-recursive), replacing any previous directory
    pub fn watch(&mut self, dir: &Path) -> Result<(), notify::Error> {
        if self.watched.as_deref() == Some(dir) {
            return Ok(());
        }
        self.unwatch();
        self.debouncer.watcher().watch(dir, RecursiveMode::NonRecursive)?;
        self.watched = Some(dir.to_path_buf());
        tracing::info!("Watching: {}", dir.display());
        Ok(())
    }

    pub fn unwatch(&mut self) {
        if let Some(dir) = self.watched.take() {
            if let Err(e) = self.debouncer.watcher().unwatch(&dir) {
                tracing::debug!("Unwatch {} failed: {}", dir.display(), e);
            }
        }
    }

    pub fn watched(&self) -> Option<&Path> {
        self.watched.as_deref()
    }

    /// Poll for image events (non-blocking)
    pub fn poll_events(&self) -> Vec<FsEvent> {
        let mut events = Vec::new();

        while let Ok(result) = self.event_rx.try_recv() {
            match result {
                Ok(batch) => events.extend(batch.into_iter().filter_map(Self::convert_event)),
                Err(e) => tracing::warn!("Watcher error: {:?}", e),
            }
        }

        events.dedup();
        events
    }

    fn convert_event(event: DebouncedEvent) -> Option<FsEvent> {
        use notify_debouncer_mini::DebouncedEventKind;

        if !matches!(event.kind, DebouncedEventKind::Any) || !is_supported_image(&event.path) {
            return None;
        }
        // The debouncer does not say what happened; existence decides
        if event.path.exists() {
            Some(FsEvent::Changed(event.path))
        } else {
            Some(FsEvent::Removed(event.path))
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.unwatch();
    }
}
