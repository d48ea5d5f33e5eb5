//! Async control loop
//!
//! One task owns the [`ViewerCore`]. It multiplexes user commands, worker
//! completions and the slideshow timer. Blocking file jobs run on tokio's
//! blocking pool; further destructive commands for the same entry wait in a
//! per-entry queue and run in arrival order.

use crate::command::{Command, Outcome, Target};
use crate::state::{FileStep, ViewerCore};
use crate::workers::Completion;
use crate::{Result, ViewerError};
use app_fs::ImagePath;
use dashmap::DashSet;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

struct Request {
    cmd: Command,
    reply: oneshot::Sender<Result<Outcome>>,
}

/// Cloneable sender side of the control loop
#[derive(Clone)]
pub struct CoreHandle {
    tx: mpsc::UnboundedSender<Request>,
    in_flight: Arc<DashSet<ImagePath>>,
}

impl CoreHandle {
    /// Send a command and wait for its outcome
    pub async fn send(&self, cmd: Command) -> Result<Outcome> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request { cmd, reply })
            .map_err(|_| ViewerError::Shutdown)?;
        rx.await.map_err(|_| ViewerError::Shutdown)?
    }

    /// Send a command without waiting for the outcome
    pub fn post(&self, cmd: Command) -> Result<()> {
        let (reply, _) = oneshot::channel();
        self.tx
            .send(Request { cmd, reply })
            .map_err(|_| ViewerError::Shutdown)
    }

    /// Is a destructive operation running for `path`?
    pub fn is_busy(&self, path: &ImagePath) -> bool {
        self.in_flight.contains(path)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Start the control loop on the current tokio runtime.
///
/// The loop ends once every handle is dropped; the task then returns the
/// core after in-flight file jobs have finished.
pub fn spawn(
    core: ViewerCore,
    completions: mpsc::UnboundedReceiver<Completion>,
) -> (CoreHandle, JoinHandle<ViewerCore>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = CoreHandle {
        tx,
        in_flight: core.files().in_flight(),
    };
    let task = tokio::spawn(run(core, rx, completions));
    (handle, task)
}

/// A file job in progress and the requests waiting behind it
struct PendingFile {
    reply: oneshot::Sender<Result<Outcome>>,
    queued: VecDeque<Request>,
}

struct ControlLoop {
    core: ViewerCore,
    pending: HashMap<ImagePath, PendingFile>,
}

async fn run(
    core: ViewerCore,
    mut requests: mpsc::UnboundedReceiver<Request>,
    mut completions: mpsc::UnboundedReceiver<Completion>,
) -> ViewerCore {
    let mut control = ControlLoop {
        core,
        pending: HashMap::new(),
    };
    tracing::debug!("Control loop started");

    loop {
        let deadline = control.core.next_slideshow_deadline();

        tokio::select! {
            request = requests.recv() => match request {
                Some(request) => control.handle_request(request),
                None => break,
            },
            Some(completion) = completions.recv() => control.handle_completion(completion),
            _ = sleep_until(deadline) => {
                control.core.tick(Instant::now());
            }
        }
    }

    tracing::debug!("Control loop draining {} file jobs", control.pending.len());
    while !control.pending.is_empty() {
        match completions.recv().await {
            Some(completion) => control.handle_completion(completion),
            None => break,
        }
    }

    control.core.shutdown();
    control.core
}

/// Sleep until the slideshow deadline; never resolves without one
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(tokio::time::Instant::from_std(d)).await,
        None => std::future::pending().await,
    }
}

impl ControlLoop {
    fn handle_request(&mut self, request: Request) {
        let Request { cmd, reply } = request;

        if !cmd.is_destructive() {
            let _ = reply.send(self.core.execute(cmd, Instant::now()));
            return;
        }

        let target = cmd.target().cloned().unwrap_or(Target::Active);
        let path = match self.core.resolve(&target) {
            Ok(path) => path,
            Err(e) => {
                let _ = reply.send(Err(e));
                return;
            }
        };
        let request = Request {
            cmd: cmd.retarget(path.clone()),
            reply,
        };

        if let Some(pending) = self.pending.get_mut(&path) {
            tracing::debug!(
                "Queued {} behind in-flight job: {}",
                request.cmd.id().as_str(),
                path
            );
            pending.queued.push_back(request);
            return;
        }
        self.start_file_job(path, request);
    }

    /// Returns true when a job was started and is now pending
    fn start_file_job(&mut self, path: ImagePath, request: Request) -> bool {
        match self.core.begin_file_job(&request.cmd) {
            Ok(FileStep::Job(job)) => {
                let fs = self.core.files().fs();
                let tx = self.core.workers().completion_sender();
                tokio::task::spawn_blocking(move || {
                    let done = job.run(fs.as_ref());
                    if tx.send(Completion::File(done)).is_err() {
                        tracing::debug!("File job finished after the control loop exited");
                    }
                });
                self.pending.insert(
                    path,
                    PendingFile {
                        reply: request.reply,
                        queued: VecDeque::new(),
                    },
                );
                true
            }
            Ok(FileStep::Finished(outcome)) => {
                let _ = request.reply.send(Ok(outcome));
                false
            }
            Err(e) => {
                let _ = request.reply.send(Err(e));
                false
            }
        }
    }

    fn handle_completion(&mut self, completion: Completion) {
        let Completion::File(done) = completion else {
            self.core.complete(completion);
            return;
        };

        let mut path = done.path.clone();
        let result = self.core.finish_file_job(done);
        let Some(mut finished) = self.pending.remove(&path) else {
            if let Err(e) = result {
                tracing::warn!("Unclaimed file job failed for {}: {}", path, e);
            }
            return;
        };

        // The entry lives on under its new name; so does its queue
        if let Ok(Outcome::Renamed(to)) = &result {
            path = to.clone();
            finished.queued = finished
                .queued
                .drain(..)
                .map(|r| Request {
                    cmd: r.cmd.retarget(to.clone()),
                    reply: r.reply,
                })
                .collect();
        }
        let _ = finished.reply.send(result);

        if let Some(pending) = self.pending.get_mut(&path) {
            pending.queued.append(&mut finished.queued);
            return;
        }
        while let Some(next) = finished.queued.pop_front() {
            if self.start_file_job(path.clone(), next) {
                if let Some(pending) = self.pending.get_mut(&path) {
                    pending.queued.append(&mut finished.queued);
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::SlideshowAction;
    use crate::config::ViewerConfig;
    use crate::image_loader::ImageCrateDecoder;
    use crate::live_text::UnavailableExtractor;
    use crate::metadata::ExifMetadataReader;
    use crate::slideshow::SlideshowState;
    use crate::state::Collaborators;
    use app_fs::{DesktopServices, FileStat, FileSystem, LocalFileSystem, RotateMode};
    use image::{Rgba, RgbaImage};
    use parking_lot::Mutex;
    use std::ffi::OsString;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

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

    /// Local filesystem whose first rename waits for a release signal
    struct GatedFs {
        inner: LocalFileSystem,
        gate: Mutex<Option<std::sync::mpsc::Receiver<()>>>,
    }

    impl FileSystem for GatedFs {
        fn stat(&self, path: &Path) -> app_fs::Result<FileStat> {
            self.inner.stat(path)
        }
        fn dimensions(&self, path: &Path) -> app_fs::Result<(u32, u32)> {
            self.inner.dimensions(path)
        }
        fn read(&self, path: &Path) -> app_fs::Result<Vec<u8>> {
            self.inner.read(path)
        }
        fn list_names(&self, dir: &Path) -> app_fs::Result<Vec<OsString>> {
            self.inner.list_names(dir)
        }
        fn rename(&self, from: &Path, to: &Path) -> app_fs::Result<()> {
            let gate = self.gate.lock().take();
            if let Some(gate) = gate {
                let _ = gate.recv();
            }
            self.inner.rename(from, to)
        }
        fn trash(&self, path: &Path) -> app_fs::Result<()> {
            self.inner.remove(path)
        }
        fn remove(&self, path: &Path) -> app_fs::Result<()> {
            self.inner.remove(path)
        }
        fn rotate(&self, path: &Path, degrees: u16, mode: RotateMode) -> app_fs::Result<()> {
            self.inner.rotate(path, degrees, mode)
        }
    }

    fn start(names: &[&str]) -> (TempDir, CoreHandle, JoinHandle<ViewerCore>) {
        start_with(names, Arc::new(LocalFileSystem::new()))
    }

    fn start_with(
        names: &[&str],
        fs: Arc<dyn FileSystem>,
    ) -> (TempDir, CoreHandle, JoinHandle<ViewerCore>) {
        let dir = TempDir::new().unwrap();
        for name in names {
            let mut img = RgbaImage::new(4, 4);
            img.put_pixel(1, 1, Rgba([0, 0, 255, 255]));
            img.save(dir.path().join(name)).unwrap();
        }

        let mut config = ViewerConfig::default();
        config.workers.threads = 1;
        config.slideshow.interval_ms = 500;
        let collaborators = Collaborators {
            fs,
            desktop: Arc::new(NoDesktop),
            metadata: Arc::new(ExifMetadataReader),
            decoder: Arc::new(ImageCrateDecoder),
            extractor: Arc::new(UnavailableExtractor),
        };
        let (mut core, completions) = ViewerCore::new(config, collaborators).unwrap();
        core.execute(Command::Open(vec![dir.path().to_path_buf()]), Instant::now())
            .unwrap();

        let (handle, task) = spawn(core, completions);
        (dir, handle, task)
    }

    fn active_name(outcome: Outcome) -> Option<String> {
        match outcome {
            Outcome::Status(status) => status.active.map(|e| e.name),
            other => panic!("expected status, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_commands_round_trip() {
        let (_dir, handle, _task) = start(&["a.png", "b.png"]);

        let outcome = handle.send(Command::Next).await.unwrap();
        assert!(matches!(outcome, Outcome::Navigated(info) if info.position == Some(1)));

        let status = handle.send(Command::Status).await.unwrap();
        assert_eq!(active_name(status).as_deref(), Some("b.png"));
    }

    #[tokio::test]
    async fn test_delete_runs_off_loop() {
        let (dir, handle, _task) = start(&["a.png", "b.png"]);
        let a = ImagePath::new(dir.path().join("a.png"));

        handle
            .send(Command::DeletePermanently(Target::Active))
            .await
            .unwrap();
        assert!(!dir.path().join("a.png").exists());
        assert!(!handle.is_busy(&a));

        let status = handle.send(Command::Status).await.unwrap();
        assert_eq!(active_name(status).as_deref(), Some("b.png"));
    }

    #[tokio::test]
    async fn test_requests_for_busy_entry_are_queued() {
        let (dir, handle, _task) = start(&["a.png", "b.png"]);
        let a = ImagePath::new(dir.path().join("a.png"));

        let (deleted, renamed) = tokio::join!(
            handle.send(Command::DeletePermanently(Target::Path(a.clone()))),
            handle.send(Command::Rename {
                target: Target::Path(a),
                new_name: "c.png".into()
            }),
        );

        // The rename was aimed at a.png, which is gone by the time it runs
        deleted.unwrap();
        assert!(matches!(renamed, Err(ViewerError::NotFound(_))));
        assert!(dir.path().join("b.png").exists());
        assert!(!dir.path().join("c.png").exists());
    }

    #[tokio::test]
    async fn test_queue_follows_renamed_entry() {
        let (release, gate) = std::sync::mpsc::channel();
        let fs = GatedFs {
            inner: LocalFileSystem::new(),
            gate: Mutex::new(Some(gate)),
        };
        let (dir, handle, _task) = start_with(&["a.png", "b.png"], Arc::new(fs));
        let a = ImagePath::new(dir.path().join("a.png"));

        // Both requests are in the channel before the loop sees either
        let (reply, renamed) = oneshot::channel();
        let rename = Command::Rename {
            target: Target::Path(a.clone()),
            new_name: "c.png".into(),
        };
        handle.tx.send(Request { cmd: rename, reply }).unwrap();
        let (reply, deleted) = oneshot::channel();
        let delete = Command::DeletePermanently(Target::Path(a.clone()));
        handle.tx.send(Request { cmd: delete, reply }).unwrap();

        // Requests are handled in order, so the delete is queued by now
        handle.send(Command::Status).await.unwrap();
        assert!(handle.is_busy(&a));
        release.send(()).unwrap();

        let renamed = renamed.await.unwrap().unwrap();
        assert!(matches!(renamed, Outcome::Renamed(ref p) if p.file_name() == Some("c.png")));
        assert!(matches!(deleted.await.unwrap(), Ok(Outcome::Done)));

        assert!(!dir.path().join("a.png").exists());
        assert!(!dir.path().join("c.png").exists());
        let status = handle.send(Command::Status).await.unwrap();
        assert_eq!(active_name(status).as_deref(), Some("b.png"));
    }

    #[tokio::test]
    async fn test_rename_then_validation_error() {
        let (dir, handle, _task) = start(&["a.png", "b.png"]);

        let outcome = handle
            .send(Command::Rename { target: Target::Active, new_name: "z.png".into() })
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Renamed(ref p) if p.file_name() == Some("z.png")));
        assert!(dir.path().join("z.png").exists());

        let err = handle
            .send(Command::Rename { target: Target::Active, new_name: "bad/name.png".into() })
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn test_slideshow_advances_on_timer() {
        let (_dir, handle, _task) = start(&["a.png", "b.png", "c.png"]);

        let state = handle
            .send(Command::Slideshow(SlideshowAction::Start))
            .await
            .unwrap();
        assert!(matches!(state, Outcome::Slideshow(SlideshowState::Playing)));

        tokio::time::sleep(Duration::from_millis(800)).await;
        let status = handle.send(Command::Status).await.unwrap();
        assert_eq!(active_name(status).as_deref(), Some("b.png"));
    }

    #[tokio::test]
    async fn test_dropping_handles_shuts_down() {
        let (_dir, handle, task) = start(&["a.png"]);
        handle
            .send(Command::Slideshow(SlideshowAction::Start))
            .await
            .unwrap();

        let other = handle.clone();
        drop(handle);
        assert!(!other.is_closed());
        drop(other);

        let core = task.await.unwrap();
        assert_eq!(core.slideshow().state(), SlideshowState::Stopped);
    }
}
