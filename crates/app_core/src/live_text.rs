//! Live text: on-demand, de-duplicated, cancellable text extraction
//!
//! One slot per path. Requests for the same (path, modified) share the slot's
//! watch channel, so every caller observes the same eventual result. Results
//! stay cached until the entry's modified time changes or the path is
//! invalidated.

use crate::entry::ImageEntry;
use crate::image_loader::{DecodedImage, ImageDecoder};
use crate::workers::{CancelToken, Completion, Workers};
use app_fs::ImagePath;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use thiserror::Error;
use tokio::sync::watch;

/// Pixel rectangle in image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bounds {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One recognized piece of text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRegion {
    pub bounds: Bounds,
    pub text: String,
}

/// Why an extraction produced no result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ExtractFailure {
    Cancelled,
    Decode(String),
    Engine(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LiveTextStatus {
    Pending,
    Ready,
    Failed(ExtractFailure),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveTextResult {
    pub path: ImagePath,
    pub modified: SystemTime,
    pub regions: Vec<TextRegion>,
    pub status: LiveTextStatus,
}

impl LiveTextResult {
    fn pending(path: ImagePath, modified: SystemTime) -> Self {
        Self {
            path,
            modified,
            regions: Vec::new(),
            status: LiveTextStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == LiveTextStatus::Pending
    }

    fn is_cancelled(&self) -> bool {
        self.status == LiveTextStatus::Failed(ExtractFailure::Cancelled)
    }

    /// All recognized text, one region per line
    pub fn text(&self) -> String {
        self.regions
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Handle returned by [`LiveTextSession::extract`]
#[derive(Debug, Clone)]
pub struct LiveTextHandle {
    rx: watch::Receiver<Arc<LiveTextResult>>,
}

impl LiveTextHandle {
    pub fn current(&self) -> Arc<LiveTextResult> {
        Arc::clone(&self.rx.borrow())
    }

    /// Wait until the result is no longer `Pending`
    pub async fn wait(&mut self) -> Arc<LiveTextResult> {
        loop {
            let current = Arc::clone(&self.rx.borrow_and_update());
            if !current.is_pending() {
                return current;
            }
            if self.rx.changed().await.is_err() {
                return self.current();
            }
        }
    }
}

/// Text-recognition engine errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("text recognition unavailable: {0}")]
    Unavailable(String),
    #[error("text recognition failed: {0}")]
    Engine(String),
}

/// Text-recognition engine; called synchronously on a worker thread
pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path, image: &DecodedImage) -> Result<Vec<TextRegion>, ExtractError>;
}

/// Engine used when no recognizer is compiled in
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableExtractor;

impl TextExtractor for UnavailableExtractor {
    fn extract(&self, _path: &Path, _image: &DecodedImage) -> Result<Vec<TextRegion>, ExtractError> {
        Err(ExtractError::Unavailable("no text engine compiled in".to_string()))
    }
}

/// Tesseract engine via `rusty-tesseract`
#[cfg(feature = "tesseract")]
#[derive(Debug, Clone)]
pub struct TesseractExtractor {
    language: String,
}

#[cfg(feature = "tesseract")]
impl TesseractExtractor {
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
        }
    }

    /// Check if Tesseract is installed
    pub fn is_available() -> bool {
        match rusty_tesseract::get_tesseract_version() {
            Ok(version) => {
                tracing::info!("Tesseract available: {}", version);
                true
            }
            Err(e) => {
                tracing::warn!("Tesseract unavailable: {}", e);
                false
            }
        }
    }
}

#[cfg(feature = "tesseract")]
impl TextExtractor for TesseractExtractor {
    fn extract(&self, path: &Path, _image: &DecodedImage) -> Result<Vec<TextRegion>, ExtractError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| ExtractError::Engine(format!("non UTF-8 path: {}", path.display())))?;
        let image = rusty_tesseract::Image::from_path(path_str)
            .map_err(|e| ExtractError::Engine(e.to_string()))?;
        let args = rusty_tesseract::Args {
            lang: self.language.clone(),
            ..rusty_tesseract::Args::default()
        };

        let output = rusty_tesseract::image_to_data(&image, &args)
            .map_err(|e| ExtractError::Engine(e.to_string()))?;

        Ok(output
            .data
            .into_iter()
            .filter(|d| d.conf > 0.0 && !d.text.trim().is_empty())
            .map(|d| TextRegion {
                bounds: Bounds {
                    x: d.left.max(0) as u32,
                    y: d.top.max(0) as u32,
                    width: d.width.max(0) as u32,
                    height: d.height.max(0) as u32,
                },
                text: d.text.trim().to_string(),
            })
            .collect())
    }
}

/// Completion of an extraction job
#[derive(Debug)]
pub struct LiveTextDone {
    pub path: ImagePath,
    job_id: u64,
    outcome: Result<Vec<TextRegion>, ExtractFailure>,
}

struct Slot {
    modified: SystemTime,
    tx: watch::Sender<Arc<LiveTextResult>>,
    token: CancelToken,
    /// The UI is waiting on this result
    observed: bool,
    /// Set while an extraction is in flight
    job_id: Option<u64>,
}

impl Slot {
    fn current(&self) -> Arc<LiveTextResult> {
        Arc::clone(&self.tx.borrow())
    }

    fn publish(&self, result: LiveTextResult) -> Arc<LiveTextResult> {
        let result = Arc::new(result);
        self.tx.send_replace(Arc::clone(&result));
        result
    }

    fn publish_cancelled(&self) {
        let current = self.current();
        self.publish(LiveTextResult {
            regions: Vec::new(),
            status: LiveTextStatus::Failed(ExtractFailure::Cancelled),
            ..(*current).clone()
        });
    }
}

pub struct LiveTextSession {
    slots: HashMap<ImagePath, Slot>,
    decoder: Arc<dyn ImageDecoder>,
    extractor: Arc<dyn TextExtractor>,
    default_deadline: Option<Duration>,
    next_job: u64,
}

impl LiveTextSession {
    pub fn new(
        decoder: Arc<dyn ImageDecoder>,
        extractor: Arc<dyn TextExtractor>,
        default_deadline: Option<Duration>,
    ) -> Self {
        Self {
            slots: HashMap::new(),
            decoder,
            extractor,
            default_deadline,
            next_job: 0,
        }
    }

    /// Request extraction with the configured default deadline
    pub fn extract(&mut self, entry: &ImageEntry, workers: &Workers) -> LiveTextHandle {
        self.extract_with_deadline(entry, self.default_deadline, workers)
    }

    /// Request extraction for `entry`.
    ///
    /// A cached or in-flight result for the same modified time is shared.
    /// Cancelled results are not reused; the request starts a new job.
    pub fn extract_with_deadline(
        &mut self,
        entry: &ImageEntry,
        deadline: Option<Duration>,
        workers: &Workers,
    ) -> LiveTextHandle {
        if let Some(slot) = self.slots.get_mut(&entry.path) {
            if slot.modified == entry.modified && !slot.current().is_cancelled() {
                slot.observed = true;
                tracing::debug!("Live text reused: {}", entry.path);
                return LiveTextHandle { rx: slot.tx.subscribe() };
            }
        }

        // Stale or cancelled: anyone still holding the old handle sees it end
        if let Some(old) = self.slots.remove(&entry.path) {
            old.token.cancel();
            if old.current().is_pending() {
                old.publish_cancelled();
            }
        }

        self.start(entry, deadline, workers)
    }

    fn start(&mut self, entry: &ImageEntry, deadline: Option<Duration>, workers: &Workers) -> LiveTextHandle {
        self.next_job += 1;
        let job_id = self.next_job;
        let token = match deadline {
            Some(d) => CancelToken::with_deadline(Instant::now() + d),
            None => CancelToken::new(),
        };
        let (tx, rx) = watch::channel(Arc::new(LiveTextResult::pending(
            entry.path.clone(),
            entry.modified,
        )));

        self.slots.insert(
            entry.path.clone(),
            Slot {
                modified: entry.modified,
                tx,
                token: token.clone(),
                observed: true,
                job_id: Some(job_id),
            },
        );

        let decoder = Arc::clone(&self.decoder);
        let extractor = Arc::clone(&self.extractor);
        let path = entry.path.clone();
        let cancel_path = entry.path.clone();
        let job_token = token.clone();
        tracing::debug!("Scheduling text extraction #{}: {}", job_id, path);

        workers.spawn(
            token,
            move || {
                let outcome = run_extraction(decoder.as_ref(), extractor.as_ref(), &path, &job_token);
                Completion::LiveText(LiveTextDone { path, job_id, outcome })
            },
            move || {
                Completion::LiveText(LiveTextDone {
                    path: cancel_path,
                    job_id,
                    outcome: Err(ExtractFailure::Cancelled),
                })
            },
        );

        LiveTextHandle { rx }
    }

    /// Apply a worker result. Returns the published result, or `None` when it
    /// belonged to a superseded request.
    pub fn complete(&mut self, done: LiveTextDone) -> Option<Arc<LiveTextResult>> {
        let Some(slot) = self.slots.get_mut(&done.path) else {
            tracing::debug!("Discarding live text for dropped slot: {}", done.path);
            return None;
        };
        if slot.job_id != Some(done.job_id) {
            tracing::debug!("Discarding stale live text #{}: {}", done.job_id, done.path);
            return None;
        }
        slot.job_id = None;

        // Past the deadline the result is discarded
        let outcome = if slot.token.is_cancelled() {
            Err(ExtractFailure::Cancelled)
        } else {
            done.outcome
        };

        let (regions, status) = match outcome {
            Ok(regions) => (regions, LiveTextStatus::Ready),
            Err(failure) => {
                tracing::warn!("Text extraction failed for {}: {:?}", done.path, failure);
                (Vec::new(), LiveTextStatus::Failed(failure))
            }
        };

        let result = slot.publish(LiveTextResult {
            path: done.path,
            modified: slot.modified,
            regions,
            status,
        });
        tracing::debug!(
            "Live text completed: {} ({} regions, observed: {})",
            result.path,
            result.regions.len(),
            slot.observed
        );
        Some(result)
    }

    /// The UI navigated away. An in-flight extraction still completes and is
    /// cached; nobody needs to wait for it.
    pub fn release(&mut self, path: &ImagePath) {
        if let Some(slot) = self.slots.get_mut(path) {
            slot.observed = false;
        }
    }

    /// Cancel an in-flight extraction for `path`
    pub fn cancel(&mut self, path: &ImagePath) {
        if let Some(slot) = self.slots.get_mut(path) {
            if slot.job_id.take().is_some() {
                slot.token.cancel();
                slot.publish_cancelled();
                tracing::debug!("Live text cancelled: {}", path);
            }
        }
    }

    /// Drop the cached result for `path`, cancelling any extraction
    pub fn invalidate(&mut self, path: &ImagePath) {
        if let Some(slot) = self.slots.remove(path) {
            slot.token.cancel();
            if slot.current().is_pending() {
                slot.publish_cancelled();
            }
            tracing::debug!("Live text invalidated: {}", path);
        }
    }

    /// Move a finished result to a renamed path. Results whose stamp differs
    /// from `modified`, or that are still in flight, are dropped.
    pub fn rekey(&mut self, from: &ImagePath, to: &ImagePath, modified: SystemTime) {
        let Some(slot) = self.slots.remove(from) else { return };
        let current = slot.current();

        if slot.job_id.is_some() || slot.modified != modified || current.status != LiveTextStatus::Ready {
            slot.token.cancel();
            if current.is_pending() {
                slot.publish_cancelled();
            }
            return;
        }

        let (tx, _) = watch::channel(Arc::new(LiveTextResult {
            path: to.clone(),
            ..(*current).clone()
        }));
        self.slots.insert(
            to.clone(),
            Slot {
                modified,
                tx,
                token: CancelToken::new(),
                observed: slot.observed,
                job_id: None,
            },
        );
    }

    /// Finished result for `path` at `modified`, if cached
    pub fn cached(&self, path: &ImagePath, modified: SystemTime) -> Option<Arc<LiveTextResult>> {
        let slot = self.slots.get(path)?;
        let current = slot.current();
        let finished = !current.is_pending() && !current.is_cancelled();
        (slot.modified == modified && finished).then_some(current)
    }

    /// Drop every result, cancelling in-flight extractions
    pub fn clear(&mut self) {
        let paths: Vec<ImagePath> = self.slots.keys().cloned().collect();
        for path in &paths {
            self.invalidate(path);
        }
    }

    pub fn is_observed(&self, path: &ImagePath) -> bool {
        self.slots.get(path).is_some_and(|s| s.observed)
    }

    pub fn in_flight(&self) -> usize {
        self.slots.values().filter(|s| s.job_id.is_some()).count()
    }
}

/// Decode then recognize, checking the token between the two steps
fn run_extraction(
    decoder: &dyn ImageDecoder,
    extractor: &dyn TextExtractor,
    path: &ImagePath,
    token: &CancelToken,
) -> Result<Vec<TextRegion>, ExtractFailure> {
    let image = decoder
        .decode(path.as_path(), None)
        .map_err(|e| ExtractFailure::Decode(e.to_string()))?;

    if token.is_cancelled() {
        return Err(ExtractFailure::Cancelled);
    }

    extractor.extract(path.as_path(), &image).map_err(|e| match e {
        ExtractError::Unavailable(msg) | ExtractError::Engine(msg) => ExtractFailure::Engine(msg),
    })
}
