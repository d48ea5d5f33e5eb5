//! Viewer state: the context object that owns every component
//!
//! [`ViewerCore`] is driven from one thread. Commands go through
//! [`ViewerCore::execute`]; worker results come back as [`Completion`]s.
//! After every mutation the collection events are routed to the caches and
//! the slideshow, so no component reads another's state directly.

use crate::command::{Command, Outcome, SlideshowAction, StatusSnapshot, Target};
use crate::config::ViewerConfig;
use crate::entry::ImageEntry;
use crate::file_controller::{CollectionEvent, FileController, FileJob, FileJobDone, FileJobKind};
use crate::image_loader::{ImageCrateDecoder, ImageDecoder};
use crate::live_text::{LiveTextSession, TextExtractor};
use crate::metadata::{ExifMetadataReader, MetadataReader};
use crate::slideshow::SlideshowController;
use crate::thumbnail_cache::{Thumbnail, ThumbnailCache, ThumbnailSize};
use crate::workers::{Completion, Workers};
use crate::{Result, ViewerError};
use app_fs::{DesktopServices, FileSystem, ImagePath, LocalFileSystem, RotateMode, SystemDesktop};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// External services the core talks to
#[derive(Clone)]
pub struct Collaborators {
    pub fs: Arc<dyn FileSystem>,
    pub desktop: Arc<dyn DesktopServices>,
    pub metadata: Arc<dyn MetadataReader>,
    pub decoder: Arc<dyn ImageDecoder>,
    pub extractor: Arc<dyn TextExtractor>,
}

impl Collaborators {
    /// Local filesystem, the desktop shell and the compiled-in text engine
    pub fn system(config: &ViewerConfig) -> Self {
        Self {
            fs: Arc::new(LocalFileSystem::new()),
            desktop: Arc::new(SystemDesktop),
            metadata: Arc::new(ExifMetadataReader),
            decoder: Arc::new(ImageCrateDecoder),
            extractor: text_engine(&config.live_text.language),
        }
    }
}

#[cfg(feature = "tesseract")]
fn text_engine(language: &str) -> Arc<dyn TextExtractor> {
    use crate::live_text::{TesseractExtractor, UnavailableExtractor};

    if TesseractExtractor::is_available() {
        Arc::new(TesseractExtractor::new(language))
    } else {
        Arc::new(UnavailableExtractor)
    }
}

#[cfg(not(feature = "tesseract"))]
fn text_engine(_language: &str) -> Arc<dyn TextExtractor> {
    Arc::new(crate::live_text::UnavailableExtractor)
}

/// First half of a destructive command
#[derive(Debug)]
pub enum FileStep {
    /// Run this off the control thread, then pass the result to
    /// [`ViewerCore::finish_file_job`]
    Job(FileJob),
    /// Nothing to do on disk
    Finished(Outcome),
}

/// Main viewer state
pub struct ViewerCore {
    config: ViewerConfig,
    files: FileController,
    slideshow: SlideshowController,
    live_text: LiveTextSession,
    thumbnails: ThumbnailCache,
    workers: Workers,
}

impl ViewerCore {
    /// Build the core and the completion queue its workers feed
    pub fn new(
        config: ViewerConfig,
        collaborators: Collaborators,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Completion>)> {
        let (workers, completions) = Workers::new(config.workers.threads)?;

        let files = FileController::new(
            &config,
            collaborators.fs,
            collaborators.desktop,
            collaborators.metadata,
        );
        let thumbnails = ThumbnailCache::new(
            config.thumbnails.max_items,
            config.thumbnails.max_bytes,
            Arc::clone(&collaborators.decoder),
        );
        let live_text = LiveTextSession::new(
            collaborators.decoder,
            collaborators.extractor,
            config.live_text.deadline(),
        );
        let slideshow = SlideshowController::new(config.slideshow.interval());

        tracing::info!("Viewer core initialized ({} workers)", workers.threads());
        Ok((
            Self {
                config,
                files,
                slideshow,
                live_text,
                thumbnails,
                workers,
            },
            completions,
        ))
    }

    // ========================================
    // Accessors
    // ========================================

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn files(&self) -> &FileController {
        &self.files
    }

    pub fn slideshow(&self) -> &SlideshowController {
        &self.slideshow
    }

    pub fn thumbnails(&self) -> &ThumbnailCache {
        &self.thumbnails
    }

    pub fn live_text(&self) -> &LiveTextSession {
        &self.live_text
    }

    pub fn workers(&self) -> &Workers {
        &self.workers
    }

    /// Path a target refers to right now
    pub fn resolve(&self, target: &Target) -> Result<ImagePath> {
        match target {
            Target::Active => self
                .files
                .collection()
                .active()
                .map(|e| e.path.clone())
                .ok_or_else(|| ViewerError::NotFound("no active image".to_string())),
            Target::Path(path) => Ok(path.clone()),
        }
    }

    fn entry(&self, target: &Target) -> Result<ImageEntry> {
        let path = self.resolve(target)?;
        self.files
            .collection()
            .get(&path)
            .cloned()
            .ok_or_else(|| ViewerError::NotFound(path.to_string()))
    }

    // ========================================
    // Commands
    // ========================================

    /// Run a command to completion on the calling thread.
    ///
    /// Destructive commands block on the filesystem here; the control loop
    /// splits them with [`begin_file_job`](Self::begin_file_job) instead.
    pub fn execute(&mut self, cmd: Command, now: Instant) -> Result<Outcome> {
        tracing::debug!("Executing command: {}", cmd.id().as_str());

        if cmd.is_destructive() {
            return match self.begin_file_job(&cmd)? {
                FileStep::Finished(outcome) => Ok(outcome),
                FileStep::Job(job) => {
                    let done = job.run(self.files.fs().as_ref());
                    self.finish_file_job(done)
                }
            };
        }

        let outcome = self.execute_inner(cmd, now);
        self.dispatch_events();
        outcome
    }

    fn execute_inner(&mut self, cmd: Command, now: Instant) -> Result<Outcome> {
        let outcome = match cmd {
            // ===== Navigation =====
            Command::Next => self.navigate(now, FileController::next),
            Command::Previous => self.navigate(now, FileController::previous),
            Command::First => self.navigate(now, FileController::first),
            Command::Last => self.navigate(now, FileController::last),
            Command::Select(path) => {
                self.files.set_active_path(&path)?;
                self.slideshow.on_user_navigation(now);
                Outcome::Navigated(self.files.navigation_info())
            }

            // ===== View =====
            Command::ZoomIn => Outcome::Scale(self.files.zoom_in()),
            Command::ZoomOut => Outcome::Scale(self.files.zoom_out()),
            Command::ZoomReset => Outcome::Scale(self.files.zoom_reset()),
            Command::FitToWindow { window } => Outcome::Scale(self.files.fit_to_window(window)),
            Command::Rotate { target, direction } => {
                let path = self.resolve(&target)?;
                Outcome::Rotation(self.files.rotate(&path, direction)?)
            }

            // ===== File (collaborators) =====
            Command::SetWallpaper(target) => {
                self.files.set_wallpaper(&self.resolve(&target)?)?;
                Outcome::Done
            }
            Command::Print(target) => {
                self.files.print(&self.resolve(&target)?)?;
                Outcome::Done
            }
            Command::Reveal(target) => {
                self.files.reveal_in_file_manager(&self.resolve(&target)?)?;
                Outcome::Done
            }
            Command::Open(paths) => {
                let count = match paths.as_slice() {
                    [dir] if dir.is_dir() => self.files.open_directory(dir)?,
                    files => self.files.open_files(files)?,
                };
                Outcome::Opened(count)
            }
            Command::External(event) => {
                self.files.handle_external(&event);
                Outcome::Done
            }

            // ===== Slideshow =====
            Command::Slideshow(action) => {
                let len = self.files.collection().len();
                let state = match action {
                    SlideshowAction::Start => self.slideshow.start(now, len),
                    SlideshowAction::Pause => self.slideshow.pause(),
                    SlideshowAction::Resume => self.slideshow.resume(now),
                    SlideshowAction::Stop => self.slideshow.stop(),
                    SlideshowAction::Toggle => self.slideshow.toggle(now, len),
                };
                Outcome::Slideshow(state)
            }
            Command::SetSlideshowInterval(interval) => {
                self.slideshow.set_interval(interval);
                Outcome::Slideshow(self.slideshow.state())
            }

            // ===== Background work =====
            Command::ExtractText(target) => {
                let entry = self.entry(&target)?;
                Outcome::Text(self.live_text.extract(&entry, &self.workers))
            }
            Command::CancelText(target) => {
                self.live_text.cancel(&self.resolve(&target)?);
                Outcome::Done
            }
            Command::Thumbnail { target, size } => {
                let entry = self.entry(&target)?;
                let size = size.unwrap_or(self.config.thumbnails.default_size);
                Outcome::Thumbnail(self.thumbnails.request(&entry, size, &self.workers))
            }
            Command::Info(target) => Outcome::Info(self.files.metadata(&self.resolve(&target)?)?),
            Command::Status => Outcome::Status(Box::new(self.status())),

            file_job => {
                return Err(ViewerError::InvalidCommand(format!(
                    "{} must run as a file job",
                    file_job.id().as_str()
                )))
            }
        };
        Ok(outcome)
    }

    fn navigate(
        &mut self,
        now: Instant,
        step: fn(&mut FileController) -> Option<&ImageEntry>,
    ) -> Outcome {
        step(&mut self.files);
        self.slideshow.on_user_navigation(now);
        Outcome::Navigated(self.files.navigation_info())
    }

    /// Validate a destructive command and claim its entry
    pub fn begin_file_job(&mut self, cmd: &Command) -> Result<FileStep> {
        let step = match cmd {
            Command::Delete(target) => FileStep::Job(self.files.begin_delete(&self.resolve(target)?)?),
            Command::DeletePermanently(target) => {
                FileStep::Job(self.files.begin_delete_permanently(&self.resolve(target)?)?)
            }
            Command::Rename { target, new_name } => {
                let path = self.resolve(target)?;
                match self.files.begin_rename(&path, new_name)? {
                    Some(job) => FileStep::Job(job),
                    None => FileStep::Finished(Outcome::Renamed(path)),
                }
            }
            Command::ApplyRotation { target, reencode } => {
                let mode = if *reencode {
                    self.files.reencode_mode()
                } else {
                    RotateMode::Lossless
                };
                match self.files.begin_apply_rotation(&self.resolve(target)?, mode)? {
                    Some(job) => FileStep::Job(job),
                    None => FileStep::Finished(Outcome::Done),
                }
            }
            other => {
                return Err(ViewerError::InvalidCommand(format!(
                    "{} is not a file job",
                    other.id().as_str()
                )))
            }
        };
        Ok(step)
    }

    /// Apply a finished file job and route the resulting events
    pub fn finish_file_job(&mut self, done: FileJobDone) -> Result<Outcome> {
        let outcome = match &done.kind {
            FileJobKind::Rename { to } => Outcome::Renamed(to.clone()),
            _ => Outcome::Done,
        };
        let result = self.files.finish(done);
        self.dispatch_events();
        result.map(|()| outcome)
    }

    /// Apply a worker result
    pub fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::Thumbnail(done) => {
                self.thumbnails.complete(done);
            }
            Completion::LiveText(done) => {
                self.live_text.complete(done);
            }
            Completion::File(done) => {
                if let Err(e) = self.finish_file_job(done) {
                    tracing::warn!("File job failed: {}", e);
                }
            }
        }
    }

    /// Decode a thumbnail on the calling thread, using the cache
    pub fn thumbnail(&mut self, path: &ImagePath, size: ThumbnailSize) -> Result<Thumbnail> {
        let entry = self.entry(&Target::Path(path.clone()))?;
        Ok(self.thumbnails.get_or_decode(&entry, size))
    }

    // ========================================
    // Slideshow clock
    // ========================================

    /// Advance the slideshow if its interval elapsed. Returns true when it
    /// moved to the next image.
    pub fn tick(&mut self, now: Instant) -> bool {
        if !self.slideshow.tick(now) {
            return false;
        }
        let advanced = self.files.next().is_some();
        self.dispatch_events();
        advanced
    }

    pub fn next_slideshow_deadline(&self) -> Option<Instant> {
        self.slideshow.next_deadline()
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            directory: self.files.directory().map(Path::to_path_buf),
            navigation: self.files.navigation_info(),
            active: self.files.collection().active().cloned(),
            scale: self.files.view().scale(),
            slideshow: self.slideshow.state(),
            thumbnails: self.thumbnails.stats(),
            text_in_flight: self.live_text.in_flight(),
            busy: self.files.in_flight().len(),
        }
    }

    /// Stop the slideshow and cancel background work
    pub fn shutdown(&mut self) {
        self.slideshow.stop();
        self.thumbnails.clear();
        self.live_text.clear();
        tracing::info!("Viewer core shut down");
    }

    // ========================================
    // Event routing
    // ========================================

    fn dispatch_events(&mut self) {
        for event in self.files.take_events() {
            tracing::trace!("Collection event: {:?}", event);
            match event {
                CollectionEvent::Removed { path, .. }
                | CollectionEvent::Modified { path }
                | CollectionEvent::Missing { path } => {
                    self.thumbnails.invalidate(&path);
                    self.live_text.invalidate(&path);
                }
                CollectionEvent::Renamed { from, to, modified } => {
                    self.thumbnails.rekey(&from, &to, modified);
                    self.live_text.rekey(&from, &to, modified);
                }
                CollectionEvent::Emptied => self.slideshow.on_collection_emptied(),
                CollectionEvent::Reset => {
                    self.slideshow.stop();
                }
                CollectionEvent::ActiveChanged { from, .. } => {
                    if let Some(from) = from {
                        self.live_text.release(&from);
                    }
                }
                CollectionEvent::Inserted { .. } => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{RotateDirection, Rotation};
    use crate::image_loader::DecodedImage;
    use crate::live_text::{Bounds, ExtractError, LiveTextStatus, TextRegion};
    use crate::slideshow::SlideshowState;
    use app_fs::FsEvent;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    struct NameExtractor;

    impl TextExtractor for NameExtractor {
        fn extract(&self, path: &Path, _image: &DecodedImage) -> std::result::Result<Vec<TextRegion>, ExtractError> {
            Ok(vec![TextRegion {
                bounds: Bounds { x: 0, y: 0, width: 1, height: 1 },
                text: path.file_name().unwrap().to_string_lossy().into_owned(),
            }])
        }
    }

    /// Desktop that does nothing
    struct NoDesktop;

    impl DesktopServices for NoDesktop {
        fn set_wallpaper(&self, _path: &Path) -> app_fs::Result<()> {
            Ok(())
        }
        fn reveal(&self, _path: &Path) -> app_fs::Result<()> {
            Ok(())
        }
        fn print(&self, _path: &Path) -> app_fs::Result<()> {
            Ok(())
        }
    }

    fn write_png(path: &Path) {
        let mut img = RgbaImage::new(6, 4);
        img.put_pixel(0, 0, Rgba([0, 255, 0, 255]));
        img.save(path).unwrap();
    }

    struct Fixture {
        dir: TempDir,
        core: ViewerCore,
        completions: mpsc::UnboundedReceiver<Completion>,
    }

    impl Fixture {
        fn path(&self, name: &str) -> ImagePath {
            ImagePath::new(self.dir.path().join(name))
        }

        fn active(&self) -> Option<String> {
            self.core.files().collection().active().map(|e| e.name.clone())
        }

        fn run(&mut self, cmd: Command) -> Result<Outcome> {
            self.core.execute(cmd, Instant::now())
        }

        fn pump_one(&mut self) {
            let completion = self.completions.blocking_recv().unwrap();
            self.core.complete(completion);
        }
    }

    fn fixture(names: &[&str]) -> Fixture {
        let dir = TempDir::new().unwrap();
        for name in names {
            write_png(&dir.path().join(name));
        }
        let mut config = ViewerConfig::default();
        config.workers.threads = 2;
        let collaborators = Collaborators {
            fs: Arc::new(LocalFileSystem::new()),
            desktop: Arc::new(NoDesktop),
            metadata: Arc::new(ExifMetadataReader),
            decoder: Arc::new(ImageCrateDecoder),
            extractor: Arc::new(NameExtractor),
        };
        let (mut core, completions) = ViewerCore::new(config, collaborators).unwrap();
        core.execute(Command::Open(vec![dir.path().to_path_buf()]), Instant::now())
            .unwrap();
        Fixture { dir, core, completions }
    }

    #[test]
    fn test_open_and_navigate() {
        let mut f = fixture(&["b.png", "a.png", "c.png"]);
        assert_eq!(f.active().as_deref(), Some("a.png"));

        match f.run(Command::Last).unwrap() {
            Outcome::Navigated(info) => {
                assert_eq!(info.position, Some(2));
                assert!(info.at_last);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        f.run(Command::Next).unwrap();
        assert_eq!(f.active().as_deref(), Some("a.png"));

        let b = f.path("b.png");
        f.run(Command::Select(b)).unwrap();
        assert_eq!(f.active().as_deref(), Some("b.png"));
    }

    #[test]
    fn test_destructive_command_invalidates_thumbnails() {
        let mut f = fixture(&["a.png", "b.png"]);
        let a = f.path("a.png");

        let first = f
            .run(Command::Thumbnail { target: Target::Active, size: None })
            .unwrap();
        assert!(matches!(first, Outcome::Thumbnail(None)));
        f.pump_one();
        assert_eq!(f.core.thumbnails().stats().items, 1);

        f.run(Command::DeletePermanently(Target::Active)).unwrap();
        assert!(!a.as_path().exists());
        assert_eq!(f.core.thumbnails().stats().items, 0);
        assert_eq!(f.active().as_deref(), Some("b.png"));
    }

    #[test]
    fn test_rename_rekeys_thumbnails() {
        let mut f = fixture(&["a.png"]);
        let a = f.path("a.png");
        assert!(!f.core.thumbnail(&a, ThumbnailSize::Small).unwrap().is_broken());

        let renamed = match f
            .run(Command::Rename { target: Target::Active, new_name: "z.png".into() })
            .unwrap()
        {
            Outcome::Renamed(path) => path,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(renamed.file_name(), Some("z.png"));

        let hits = f.core.thumbnails().stats().hits;
        f.core.thumbnail(&renamed, ThumbnailSize::Small).unwrap();
        assert_eq!(f.core.thumbnails().stats().hits, hits + 1);
    }

    #[test]
    fn test_watcher_event_after_rename_keeps_cache() {
        let mut f = fixture(&["a.png"]);
        let a = f.path("a.png");
        f.core.thumbnail(&a, ThumbnailSize::Small).unwrap();

        let Outcome::Renamed(z) = f
            .run(Command::Rename { target: Target::Active, new_name: "z.png".into() })
            .unwrap()
        else {
            panic!("expected rename");
        };
        assert_eq!(f.core.thumbnails().stats().items, 1);

        // The watcher reports our own rename; the file itself is untouched
        f.run(Command::External(FsEvent::Changed(z.as_path().to_path_buf())))
            .unwrap();
        assert_eq!(f.core.thumbnails().stats().items, 1);

        // A real content change still invalidates
        RgbaImage::new(16, 16).save(z.as_path()).unwrap();
        f.run(Command::External(FsEvent::Changed(z.as_path().to_path_buf())))
            .unwrap();
        assert_eq!(f.core.thumbnails().stats().items, 0);
    }

    #[test]
    fn test_rename_collision_leaves_state() {
        let mut f = fixture(&["a.png", "b.png"]);
        let err = f
            .run(Command::Rename { target: Target::Active, new_name: "B.PNG".into() })
            .unwrap_err();
        assert!(matches!(err, ViewerError::NameCollision(_)));
        assert_eq!(f.active().as_deref(), Some("a.png"));
        assert_eq!(f.core.status().busy, 0);
    }

    #[test]
    fn test_file_job_is_single_flight() {
        let mut f = fixture(&["a.png"]);
        let step = f
            .core
            .begin_file_job(&Command::DeletePermanently(Target::Active))
            .unwrap();
        let FileStep::Job(job) = step else {
            panic!("expected a job");
        };

        let second = f.core.begin_file_job(&Command::Delete(Target::Active));
        assert!(matches!(second, Err(ViewerError::Busy(_))));

        let done = job.run(f.core.files().fs().as_ref());
        f.core.finish_file_job(done).unwrap();
        assert!(f.core.files().collection().is_empty());
    }

    #[test]
    fn test_apply_rotation_without_rotation_is_noop() {
        let mut f = fixture(&["a.png"]);
        let outcome = f
            .run(Command::ApplyRotation { target: Target::Active, reencode: false })
            .unwrap();
        assert!(matches!(outcome, Outcome::Done));

        let rotated = f
            .run(Command::Rotate { target: Target::Active, direction: RotateDirection::Clockwise })
            .unwrap();
        assert!(matches!(rotated, Outcome::Rotation(Rotation::R90)));
    }

    #[test]
    fn test_slideshow_ticks_and_user_navigation() {
        let mut f = fixture(&["a.png", "b.png", "c.png"]);
        let t0 = Instant::now();
        let interval = f.core.slideshow().interval();

        f.core
            .execute(Command::Slideshow(SlideshowAction::Start), t0)
            .unwrap();
        assert!(!f.core.tick(t0 + interval / 2));
        assert!(f.core.tick(t0 + interval));
        assert_eq!(f.active().as_deref(), Some("b.png"));

        // Manual navigation restarts the interval
        let t1 = t0 + interval + interval / 2;
        f.core.execute(Command::Next, t1).unwrap();
        assert_eq!(f.core.next_slideshow_deadline(), Some(t1 + interval));
        assert_eq!(f.core.slideshow().state(), SlideshowState::Playing);
    }

    #[test]
    fn test_deleting_last_image_stops_slideshow() {
        let mut f = fixture(&["a.png"]);
        f.run(Command::Slideshow(SlideshowAction::Start)).unwrap();
        assert!(f.core.slideshow().is_playing());

        f.run(Command::DeletePermanently(Target::Active)).unwrap();
        assert_eq!(f.core.slideshow().state(), SlideshowState::Stopped);
        assert!(f.core.next_slideshow_deadline().is_none());
    }

    #[test]
    fn test_live_text_released_on_navigation() {
        let mut f = fixture(&["a.png", "b.png"]);
        let a = f.path("a.png");

        let handle = match f.run(Command::ExtractText(Target::Active)).unwrap() {
            Outcome::Text(handle) => handle,
            other => panic!("unexpected outcome: {:?}", other),
        };
        f.pump_one();
        assert_eq!(handle.current().status, LiveTextStatus::Ready);
        assert_eq!(handle.current().text(), "a.png");
        assert!(f.core.live_text().is_observed(&a));

        f.run(Command::Next).unwrap();
        assert!(!f.core.live_text().is_observed(&a));
    }

    #[test]
    fn test_unknown_target_is_not_found() {
        let mut f = fixture(&["a.png"]);
        let ghost = f.path("ghost.png");
        let err = f.run(Command::Info(Target::Path(ghost))).unwrap_err();
        assert!(matches!(err, ViewerError::NotFound(_)));
    }

    #[test]
    fn test_status_snapshot() {
        let mut f = fixture(&["a.png", "b.png"]);
        f.run(Command::ZoomIn).unwrap();
        let Outcome::Status(status) = f.run(Command::Status).unwrap() else {
            panic!("expected status");
        };
        assert_eq!(status.navigation.total, 2);
        assert_eq!(status.active.map(|e| e.name).as_deref(), Some("a.png"));
        assert!(status.scale > 1.0);
        assert_eq!(status.slideshow, SlideshowState::Stopped);
    }

    #[test]
    fn test_shutdown_stops_everything() {
        let mut f = fixture(&["a.png"]);
        f.run(Command::Slideshow(SlideshowAction::Start)).unwrap();
        f.core.shutdown();
        assert!(!f.core.slideshow().is_playing());
        assert_eq!(f.core.thumbnails().stats().pending, 0);
    }
}
