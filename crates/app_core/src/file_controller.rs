//! File controller: the only writer of the image collection
//!
//! Every operation validates before touching the filesystem and leaves the
//! collection unchanged on failure. Successful mutations are reported as
//! [`CollectionEvent`]s, which the caches and the slideshow consume.
//!
//! Destructive operations are split in three steps so the blocking part can
//! run off the control thread: `begin_*` validates and claims the entry,
//! [`FileJob::run`] performs the filesystem call, and [`FileController::finish`]
//! applies the result. The synchronous helpers (`delete`, `rename`, ...) run
//! all three in place.

use crate::config::ViewerConfig;
use crate::entry::{ImageEntry, RotateDirection, Rotation};
use crate::error::ConfirmAction;
use crate::metadata::{MetadataReader, MetadataSummary};
use crate::navigation::{ImageCollection, NavigationInfo};
use crate::view::ViewState;
use crate::{Result, ViewerError};
use app_fs::{
    find_collision, is_supported_image, list_images, validate_new_name, CasePolicy,
    DesktopServices, FileSystem, FsError, FsEvent, ImagePath, RotateMode,
};
use dashmap::DashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Mutation notifications emitted by the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectionEvent {
    Removed { path: ImagePath, index: usize },
    Inserted { path: ImagePath, index: usize },
    Renamed { from: ImagePath, to: ImagePath, modified: SystemTime },
    /// Contents on disk changed (write-back rotation or external edit)
    Modified { path: ImagePath },
    /// The backing file vanished externally; the entry stays, flagged
    Missing { path: ImagePath },
    /// The last entry was removed
    Emptied,
    /// The collection was replaced by an open
    Reset,
    ActiveChanged { from: Option<ImagePath>, to: Option<ImagePath> },
}

/// Blocking filesystem part of a destructive operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileJobKind {
    Trash,
    Delete,
    Rename { to: ImagePath },
    Rotate { degrees: u16, mode: RotateMode },
}

#[derive(Debug, Clone)]
pub struct FileJob {
    pub path: ImagePath,
    pub kind: FileJobKind,
}

impl FileJob {
    /// Perform the filesystem call. Safe to run on any thread.
    pub fn run(self, fs: &dyn FileSystem) -> FileJobDone {
        let path = self.path.as_path();
        let result = match &self.kind {
            FileJobKind::Trash => fs.trash(path).map_err(|e| match e {
                FsError::TrashUnavailable(reason) => {
                    tracing::warn!("Trash unavailable for {}: {}", self.path, reason);
                    ViewerError::NeedsConfirmation(ConfirmAction::PermanentDelete)
                }
                FsError::PermissionDenied(_) => {
                    tracing::warn!("Trash refused {}: permission denied", self.path);
                    ViewerError::NeedsConfirmation(ConfirmAction::PermanentDelete)
                }
                other => other.into(),
            }),
            FileJobKind::Delete => fs.remove(path).map_err(Into::into),
            FileJobKind::Rename { to } => fs.rename(path, to.as_path()).map_err(Into::into),
            FileJobKind::Rotate { degrees, mode } => {
                fs.rotate(path, *degrees, *mode).map_err(Into::into)
            }
        };

        FileJobDone {
            path: self.path,
            kind: self.kind,
            result,
        }
    }
}

/// Outcome of [`FileJob::run`]
#[derive(Debug)]
pub struct FileJobDone {
    pub path: ImagePath,
    pub kind: FileJobKind,
    pub result: Result<()>,
}

pub struct FileController {
    collection: ImageCollection,
    view: ViewState,
    directory: Option<PathBuf>,
    fs: Arc<dyn FileSystem>,
    desktop: Arc<dyn DesktopServices>,
    metadata: Arc<dyn MetadataReader>,
    case_policy: CasePolicy,
    reencode_quality: u8,
    /// Entries with a destructive operation in progress
    in_flight: Arc<DashSet<ImagePath>>,
    events: Vec<CollectionEvent>,
}

impl FileController {
    pub fn new(
        config: &ViewerConfig,
        fs: Arc<dyn FileSystem>,
        desktop: Arc<dyn DesktopServices>,
        metadata: Arc<dyn MetadataReader>,
    ) -> Self {
        Self {
            collection: ImageCollection::new(),
            view: ViewState::new(config.view.clone()),
            directory: None,
            fs,
            desktop,
            metadata,
            case_policy: config.files.rename_case_policy,
            reencode_quality: config.files.reencode_quality,
            in_flight: Arc::new(DashSet::new()),
            events: Vec::new(),
        }
    }

    // ========================================
    // Accessors
    // ========================================

    pub fn collection(&self) -> &ImageCollection {
        &self.collection
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    /// Directory of the open collection, if it came from one
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub fn fs(&self) -> Arc<dyn FileSystem> {
        Arc::clone(&self.fs)
    }

    /// Shared view of the single-flight set
    pub fn in_flight(&self) -> Arc<DashSet<ImagePath>> {
        Arc::clone(&self.in_flight)
    }

    pub fn is_busy(&self, path: &ImagePath) -> bool {
        self.in_flight.contains(path)
    }

    /// Drain the events emitted since the last call
    pub fn take_events(&mut self) -> Vec<CollectionEvent> {
        std::mem::take(&mut self.events)
    }

    // ========================================
    // Opening
    // ========================================

    /// Replace the collection with the images of `dir`
    pub fn open_directory(&mut self, dir: &Path) -> Result<usize> {
        let paths = list_images(dir)?;
        self.reset(paths, None, Some(ImagePath::new(dir).to_path_buf()));
        Ok(self.collection.len())
    }

    /// Open files picked by the user. A single file opens its whole directory
    /// with that file active; several files form the collection on their own.
    pub fn open_files(&mut self, files: &[PathBuf]) -> Result<usize> {
        let mut images: Vec<PathBuf> = files
            .iter()
            .filter(|p| is_supported_image(p))
            .cloned()
            .collect();
        let Some(first) = images.first().cloned() else {
            let shown = files
                .first()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            return Err(ViewerError::UnsupportedFormat(shown));
        };
        let active = ImagePath::new(&first);

        if images.len() == 1 {
            if let Some(dir) = active.parent().map(Path::to_path_buf) {
                let paths = list_images(&dir)?;
                self.reset(paths, Some(&active), Some(dir));
                return Ok(self.collection.len());
            }
        }

        images.sort_by_key(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default()
        });
        self.reset(images, Some(&active), None);
        Ok(self.collection.len())
    }

    fn reset(&mut self, paths: Vec<PathBuf>, active: Option<&ImagePath>, directory: Option<PathBuf>) {
        let before = self.active_path();
        let entries = paths
            .into_iter()
            .map(|p| {
                let path = ImagePath::new(&p);
                ImageEntry::from_fs(self.fs.as_ref(), path.clone()).unwrap_or_else(|e| {
                    tracing::warn!("Could not stat {}: {}", path, e);
                    ImageEntry::new(path)
                })
            })
            .collect();

        self.collection.replace_all(entries, active);
        self.directory = directory;
        self.view.reset_for_new_image();
        self.events.push(CollectionEvent::Reset);
        self.note_active_change(before);

        tracing::info!(
            "Opened {} images{}",
            self.collection.len(),
            self.directory
                .as_deref()
                .map(|d| format!(" from {}", d.display()))
                .unwrap_or_default()
        );
    }

    // ========================================
    // Navigation
    // ========================================

    pub fn next(&mut self) -> Option<&ImageEntry> {
        self.navigate(ImageCollection::next)
    }

    pub fn previous(&mut self) -> Option<&ImageEntry> {
        self.navigate(ImageCollection::previous)
    }

    pub fn first(&mut self) -> Option<&ImageEntry> {
        self.navigate(ImageCollection::first)
    }

    pub fn last(&mut self) -> Option<&ImageEntry> {
        self.navigate(ImageCollection::last)
    }

    pub fn set_active_path(&mut self, path: &ImagePath) -> Result<()> {
        let before = self.active_path();
        self.collection.set_active_path(path)?;
        self.note_active_change(before);
        Ok(())
    }

    pub fn navigation_info(&self) -> NavigationInfo {
        self.collection.navigation_info()
    }

    fn navigate(&mut self, step: fn(&mut ImageCollection) -> Option<usize>) -> Option<&ImageEntry> {
        let before = self.active_path();
        step(&mut self.collection);
        self.note_active_change(before);
        self.collection.active()
    }

    fn active_path(&self) -> Option<ImagePath> {
        self.collection.active().map(|e| e.path.clone())
    }

    fn note_active_change(&mut self, before: Option<ImagePath>) {
        let after = self.active_path();
        if before != after {
            self.view.reset_for_new_image();
            self.events.push(CollectionEvent::ActiveChanged { from: before, to: after });
        }
    }

    // ========================================
    // View state
    // ========================================

    /// Rotate the in-memory view of `path`; nothing is written
    pub fn rotate(&mut self, path: &ImagePath, direction: RotateDirection) -> Result<Rotation> {
        let entry = self
            .collection
            .get_mut(path)
            .ok_or_else(|| ViewerError::NotFound(path.to_string()))?;
        entry.rotation = entry.rotation.rotated(direction);
        tracing::debug!("Rotation of {} is now {}", path, entry.rotation.degrees());
        Ok(entry.rotation)
    }

    pub fn zoom_in(&mut self) -> f32 {
        self.view.zoom_in()
    }

    pub fn zoom_out(&mut self) -> f32 {
        self.view.zoom_out()
    }

    pub fn zoom_reset(&mut self) -> f32 {
        self.view.zoom_reset()
    }

    /// Fit the active image into `window` (when known)
    pub fn fit_to_window(&mut self, window: Option<(u32, u32)>) -> f32 {
        let image = self
            .collection
            .active()
            .and_then(|e| e.dimensions.map(|(w, h)| e.rotation.apply_to_size(w, h)));
        self.view.fit_to_window(image, window)
    }

    // ========================================
    // Destructive operations: begin / run / finish
    // ========================================

    /// Validate a move to the trash
    pub fn begin_delete(&mut self, path: &ImagePath) -> Result<FileJob> {
        self.collection.index_of(path)?;
        self.claim(path)?;
        Ok(FileJob { path: path.clone(), kind: FileJobKind::Trash })
    }

    /// Validate an unrecoverable delete
    pub fn begin_delete_permanently(&mut self, path: &ImagePath) -> Result<FileJob> {
        self.collection.index_of(path)?;
        self.claim(path)?;
        Ok(FileJob { path: path.clone(), kind: FileJobKind::Delete })
    }

    /// Validate a rename. `None` when `new_name` is the current name.
    pub fn begin_rename(&mut self, path: &ImagePath, new_name: &str) -> Result<Option<FileJob>> {
        validate_new_name(new_name)?;
        let index = self.collection.index_of(path)?;
        let current_name = self.collection.entries()[index].name.clone();
        if current_name == new_name {
            return Ok(None);
        }

        let parent = path
            .parent()
            .ok_or_else(|| ViewerError::NotFound(path.to_string()))?;
        let siblings = self.fs.list_names(parent)?;
        if let Some(existing) = find_collision(&siblings, &current_name, new_name, self.case_policy) {
            tracing::warn!("Rename of {} to {:?} collides with {:?}", path, new_name, existing);
            return Err(ViewerError::NameCollision(existing));
        }

        self.claim(path)?;
        Ok(Some(FileJob {
            path: path.clone(),
            kind: FileJobKind::Rename { to: path.with_file_name(new_name) },
        }))
    }

    /// Validate writing the in-memory rotation back to disk. `None` when the
    /// entry is not rotated.
    pub fn begin_apply_rotation(&mut self, path: &ImagePath, mode: RotateMode) -> Result<Option<FileJob>> {
        let index = self.collection.index_of(path)?;
        let rotation = self.collection.entries()[index].rotation;
        if rotation == Rotation::R0 {
            return Ok(None);
        }

        self.claim(path)?;
        Ok(Some(FileJob {
            path: path.clone(),
            kind: FileJobKind::Rotate { degrees: rotation.degrees(), mode },
        }))
    }

    /// Apply the result of a finished job and release the entry
    pub fn finish(&mut self, done: FileJobDone) -> Result<()> {
        self.in_flight.remove(&done.path);

        if let Err(e) = done.result {
            tracing::warn!("{:?} failed for {}: {}", done.kind, done.path, e);
            return Err(e);
        }

        match done.kind {
            FileJobKind::Trash | FileJobKind::Delete => {
                self.remove_entry(&done.path);
                tracing::info!("Deleted {}", done.path);
            }
            FileJobKind::Rename { to } => {
                let Some(entry) = self.collection.get_mut(&done.path) else {
                    tracing::warn!("Renamed entry left the collection: {}", done.path);
                    return Ok(());
                };
                entry.set_path(to.clone());
                let modified = entry.modified;
                self.events.push(CollectionEvent::Renamed {
                    from: done.path.clone(),
                    to: to.clone(),
                    modified,
                });
                tracing::info!("Renamed {} -> {}", done.path, to);
            }
            FileJobKind::Rotate { degrees, .. } => {
                let fs = Arc::clone(&self.fs);
                if let Some(entry) = self.collection.get_mut(&done.path) {
                    entry.rotation = Rotation::R0;
                    entry.metadata = None;
                    if let Err(e) = entry.refresh_stat(fs.as_ref()) {
                        tracing::warn!("Could not refresh {} after rotation: {}", done.path, e);
                    }
                }
                self.events.push(CollectionEvent::Modified { path: done.path.clone() });
                tracing::info!("Rotated {} by {} degrees on disk", done.path, degrees);
            }
        }
        Ok(())
    }

    fn claim(&self, path: &ImagePath) -> Result<()> {
        if self.in_flight.insert(path.clone()) {
            Ok(())
        } else {
            Err(ViewerError::Busy(path.to_string()))
        }
    }

    fn remove_entry(&mut self, path: &ImagePath) {
        let Ok(index) = self.collection.index_of(path) else {
            return;
        };
        let before = self.active_path();
        self.collection.remove_at(index);
        self.events.push(CollectionEvent::Removed { path: path.clone(), index });
        if self.collection.is_empty() {
            self.events.push(CollectionEvent::Emptied);
        }
        self.note_active_change(before);
    }

    fn run_now(&mut self, job: FileJob) -> Result<()> {
        let done = job.run(self.fs.as_ref());
        self.finish(done)
    }

    // ========================================
    // Destructive operations: synchronous
    // ========================================

    /// Move to the trash. `NeedsConfirmation` when the trash refuses; the
    /// caller may then use [`delete_permanently`](Self::delete_permanently).
    pub fn delete(&mut self, path: &ImagePath) -> Result<()> {
        let job = self.begin_delete(path)?;
        self.run_now(job)
    }

    pub fn delete_permanently(&mut self, path: &ImagePath) -> Result<()> {
        let job = self.begin_delete_permanently(path)?;
        self.run_now(job)
    }

    /// Rename in place; returns the new path
    pub fn rename(&mut self, path: &ImagePath, new_name: &str) -> Result<ImagePath> {
        match self.begin_rename(path, new_name)? {
            Some(job) => {
                self.run_now(job)?;
                Ok(path.with_file_name(new_name))
            }
            None => Ok(path.clone()),
        }
    }

    /// Write the in-memory rotation to disk. `Lossless` fails with
    /// `UnsupportedFormat` on formats it cannot rotate exactly; retry with
    /// [`reencode_mode`](Self::reencode_mode) to accept a re-encode.
    pub fn apply_rotation(&mut self, path: &ImagePath, mode: RotateMode) -> Result<()> {
        match self.begin_apply_rotation(path, mode)? {
            Some(job) => self.run_now(job),
            None => Ok(()),
        }
    }

    /// Re-encode fallback with the configured quality
    pub fn reencode_mode(&self) -> RotateMode {
        RotateMode::Reencode { quality: self.reencode_quality }
    }

    // ========================================
    // Desktop services
    // ========================================

    pub fn set_wallpaper(&self, path: &ImagePath) -> Result<()> {
        self.collection.index_of(path)?;
        self.desktop.set_wallpaper(path.as_path())?;
        tracing::info!("Wallpaper set to {}", path);
        Ok(())
    }

    pub fn print(&self, path: &ImagePath) -> Result<()> {
        self.collection.index_of(path)?;
        self.desktop.print(path.as_path())?;
        Ok(())
    }

    pub fn reveal_in_file_manager(&self, path: &ImagePath) -> Result<()> {
        self.collection.index_of(path)?;
        self.desktop.reveal(path.as_path())?;
        Ok(())
    }

    // ========================================
    // Metadata
    // ========================================

    /// "Image info" summary, read on first use and cached on the entry
    pub fn metadata(&mut self, path: &ImagePath) -> Result<MetadataSummary> {
        let index = self.collection.index_of(path)?;
        if let Some(summary) = &self.collection.entries()[index].metadata {
            return Ok(summary.clone());
        }

        let data = self.fs.read(path.as_path())?;
        let summary = self.metadata.read(&data)?;
        if let Some(entry) = self.collection.get_mut(path) {
            entry.metadata = Some(summary.clone());
        }
        Ok(summary)
    }

    // ========================================
    // External changes
    // ========================================

    /// Apply a change reported by the file watcher
    pub fn handle_external(&mut self, event: &FsEvent) {
        let path = self.resolve_external(event.path());

        if self.in_flight.contains(&path) {
            tracing::debug!("Ignoring watcher event for in-flight entry: {}", path);
            return;
        }

        match event {
            FsEvent::Removed(_) => {
                if let Some(entry) = self.collection.get_mut(&path) {
                    if !entry.not_found {
                        entry.not_found = true;
                        tracing::warn!("Image file not found: {}", path);
                        self.events.push(CollectionEvent::Missing { path });
                    }
                }
            }
            FsEvent::Changed(_) => {
                let fs = Arc::clone(&self.fs);
                if let Some(entry) = self.collection.get_mut(&path) {
                    let before = (entry.modified, entry.size, entry.not_found);
                    match entry.refresh_stat(fs.as_ref()) {
                        Ok(()) if before == (entry.modified, entry.size, false) => {
                            tracing::trace!("Watcher event without content change: {}", path);
                        }
                        Ok(()) => self.events.push(CollectionEvent::Modified { path }),
                        Err(e) => {
                            tracing::warn!("Could not refresh {}: {}", path, e);
                            entry.not_found = true;
                            self.events.push(CollectionEvent::Missing { path });
                        }
                    }
                } else if self.directory.as_deref().is_some_and(|d| path.parent() == Some(d)) {
                    self.insert_external(path);
                }
            }
        }
    }

    /// Collection path matching a watcher path
    fn resolve_external(&self, raw: &Path) -> ImagePath {
        let lexical = ImagePath::from_canonical(raw.to_path_buf());
        if self.collection.contains(&lexical) {
            return lexical;
        }
        ImagePath::new(raw)
    }

    /// A new image appeared in the open directory; insert it in name order
    fn insert_external(&mut self, path: ImagePath) {
        let entry = match ImageEntry::from_fs(self.fs.as_ref(), path.clone()) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!("Ignoring new file {}: {}", path, e);
                return;
            }
        };

        let key = entry.name.to_lowercase();
        let index = self
            .collection
            .entries()
            .iter()
            .position(|e| e.name.to_lowercase() > key)
            .unwrap_or(self.collection.len());
        let before = self.active_path();

        match self.collection.insert_at(index, entry) {
            Ok(index) => {
                tracing::info!("New image in directory: {}", path);
                self.events.push(CollectionEvent::Inserted { path, index });
                self.note_active_change(before);
            }
            Err(e) => tracing::debug!("Not inserting {}: {}", path, e),
        }
    }
}
