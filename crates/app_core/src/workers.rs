//! Bounded worker pool and completion queue
//!
//! Decode and extraction jobs run on a rayon pool; results come back to the
//! control thread as [`Completion`] values over a tokio channel.

use crate::file_controller::FileJobDone;
use crate::live_text::LiveTextDone;
use crate::thumbnail_cache::ThumbnailDone;
use crate::{Result, ViewerError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Cooperative cancellation flag with an optional deadline.
///
/// Jobs check it when they start; past the deadline the token reads as
/// cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::default(),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Result delivered back to the control thread
#[derive(Debug)]
pub enum Completion {
    Thumbnail(ThumbnailDone),
    LiveText(LiveTextDone),
    File(FileJobDone),
}

/// Fixed-size rayon pool plus the sending half of the completion queue
#[derive(Clone)]
pub struct Workers {
    pool: Arc<rayon::ThreadPool>,
    completions: mpsc::UnboundedSender<Completion>,
}

impl Workers {
    /// Create the pool and the completion queue it feeds
    pub fn new(threads: usize) -> Result<(Self, mpsc::UnboundedReceiver<Completion>)> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("iris-worker-{}", i))
            .build()
            .map_err(|e| ViewerError::Init(format!("worker pool: {}", e)))?;
        let (tx, rx) = mpsc::unbounded_channel();

        tracing::debug!("Worker pool started with {} threads", threads.max(1));
        Ok((
            Self {
                pool: Arc::new(pool),
                completions: tx,
            },
            rx,
        ))
    }

    /// Run `job` on the pool and queue its completion.
    ///
    /// A job whose token is already cancelled when it starts does not run;
    /// `on_cancel` builds its completion instead.
    pub fn spawn<F, C>(&self, token: CancelToken, job: F, on_cancel: C)
    where
        F: FnOnce() -> Completion + Send + 'static,
        C: FnOnce() -> Completion + Send + 'static,
    {
        let tx = self.completions.clone();
        self.pool.spawn(move || {
            let completion = if token.is_cancelled() { on_cancel() } else { job() };
            if tx.send(completion).is_err() {
                tracing::debug!("Completion dropped: control loop is gone");
            }
        });
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Sender for completions produced outside the pool (blocking file jobs)
    pub fn completion_sender(&self) -> mpsc::UnboundedSender<Completion> {
        self.completions.clone()
    }
}

impl std::fmt::Debug for Workers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workers").field("threads", &self.threads()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_controller::{FileJobKind, FileJobDone};
    use app_fs::ImagePath;
    use std::time::Duration;

    fn done(ok: bool) -> Completion {
        Completion::File(FileJobDone {
            path: ImagePath::from_canonical("/a.png".into()),
            kind: FileJobKind::Delete,
            result: if ok { Ok(()) } else { Err(ViewerError::Cancelled) },
        })
    }

    #[test]
    fn test_token_deadline() {
        let token = CancelToken::with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(token.is_cancelled());

        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_spawn_runs_or_cancels() {
        let (workers, mut rx) = Workers::new(2).unwrap();
        assert_eq!(workers.threads(), 2);

        workers.spawn(CancelToken::new(), || done(true), || done(false));
        let first = rx.blocking_recv().unwrap();
        assert!(matches!(first, Completion::File(FileJobDone { result: Ok(()), .. })));

        let token = CancelToken::new();
        token.cancel();
        workers.spawn(token, || done(true), || done(false));
        let second = rx.blocking_recv().unwrap();
        assert!(matches!(
            second,
            Completion::File(FileJobDone { result: Err(ViewerError::Cancelled), .. })
        ));
    }
}
