//! Bounded LRU cache of decoded thumbnails
//!
//! Entries are keyed by (path, size class, rotation) and stamped with the
//! file's modified time; a stamp mismatch counts as a miss. Decode failures
//! are cached as [`Thumbnail::Broken`] until the file changes.

use crate::entry::{ImageEntry, Rotation};
use crate::image_loader::{DecodedImage, ImageDecoder};
use crate::workers::{CancelToken, Completion, Workers};
use crate::{Result, ViewerError};
use app_fs::ImagePath;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

/// Thumbnail size presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailSize {
    Small,  // 128x128
    Medium, // 256x256
    Large,  // 512x512
}

impl ThumbnailSize {
    pub fn max_edge(self) -> u32 {
        match self {
            ThumbnailSize::Small => 128,
            ThumbnailSize::Medium => 256,
            ThumbnailSize::Large => 512,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThumbnailKey {
    pub path: ImagePath,
    pub size: ThumbnailSize,
    pub rotation: Rotation,
}

impl ThumbnailKey {
    pub fn for_entry(entry: &ImageEntry, size: ThumbnailSize) -> Self {
        Self {
            path: entry.path.clone(),
            size,
            rotation: entry.rotation,
        }
    }
}

/// Cached value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Thumbnail {
    Ready(Arc<DecodedImage>),
    /// Decoding failed; not retried until the file changes
    Broken,
}

impl Thumbnail {
    pub fn is_broken(&self) -> bool {
        matches!(self, Thumbnail::Broken)
    }

    fn byte_size(&self) -> usize {
        match self {
            Thumbnail::Ready(image) => image.byte_size(),
            Thumbnail::Broken => 0,
        }
    }
}

/// Completion of a deferred decode
#[derive(Debug)]
pub struct ThumbnailDone {
    pub key: ThumbnailKey,
    pub modified: SystemTime,
    job_id: u64,
    result: Result<DecodedImage>,
}

#[derive(Debug, Clone)]
struct CachedThumbnail {
    thumbnail: Thumbnail,
    modified: SystemTime,
    bytes: usize,
}

#[derive(Debug)]
struct PendingDecode {
    job_id: u64,
    token: CancelToken,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub items: usize,
    pub bytes: usize,
    pub max_items: usize,
    pub max_bytes: usize,
    pub pending: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

pub struct ThumbnailCache {
    entries: LruCache<ThumbnailKey, CachedThumbnail>,
    bytes: usize,
    max_items: usize,
    max_bytes: usize,
    decoder: Arc<dyn ImageDecoder>,
    pending: HashMap<ThumbnailKey, PendingDecode>,
    next_job: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl ThumbnailCache {
    pub fn new(max_items: usize, max_bytes: usize, decoder: Arc<dyn ImageDecoder>) -> Self {
        Self {
            entries: LruCache::unbounded(),
            bytes: 0,
            max_items: max_items.max(1),
            max_bytes,
            decoder,
            pending: HashMap::new(),
            next_job: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Cached thumbnail for `entry` if present and current; refreshes recency
    pub fn get(&mut self, entry: &ImageEntry, size: ThumbnailSize) -> Option<Thumbnail> {
        let key = ThumbnailKey::for_entry(entry, size);
        self.lookup(&key, entry.modified)
    }

    /// Cached thumbnail, or decode inline and cache the result
    pub fn get_or_decode(&mut self, entry: &ImageEntry, size: ThumbnailSize) -> Thumbnail {
        let key = ThumbnailKey::for_entry(entry, size);
        if let Some(hit) = self.lookup(&key, entry.modified) {
            return hit;
        }

        let decoded = decode_thumbnail(self.decoder.as_ref(), &key);
        let thumbnail = self.thumbnail_from(&key, decoded);
        self.insert(key, thumbnail.clone(), entry.modified);
        thumbnail
    }

    /// Cached thumbnail, or schedule a decode on the worker pool and return
    /// `None`. A decode already pending for the same key is reused.
    pub fn request(
        &mut self,
        entry: &ImageEntry,
        size: ThumbnailSize,
        workers: &Workers,
    ) -> Option<Thumbnail> {
        let key = ThumbnailKey::for_entry(entry, size);
        if let Some(hit) = self.lookup(&key, entry.modified) {
            return Some(hit);
        }
        if self.pending.contains_key(&key) {
            tracing::debug!("Thumbnail decode already pending: {}", key.path);
            return None;
        }

        self.next_job += 1;
        let job_id = self.next_job;
        let token = CancelToken::new();
        self.pending.insert(
            key.clone(),
            PendingDecode {
                job_id,
                token: token.clone(),
            },
        );

        let decoder = Arc::clone(&self.decoder);
        let modified = entry.modified;
        let job_key = key.clone();
        let cancel_key = key;
        tracing::debug!("Scheduling thumbnail decode #{}: {}", job_id, job_key.path);
        workers.spawn(
            token,
            move || {
                let result = decode_thumbnail(decoder.as_ref(), &job_key);
                Completion::Thumbnail(ThumbnailDone {
                    key: job_key,
                    modified,
                    job_id,
                    result,
                })
            },
            move || {
                Completion::Thumbnail(ThumbnailDone {
                    key: cancel_key,
                    modified,
                    job_id,
                    result: Err(ViewerError::Cancelled),
                })
            },
        );
        None
    }

    /// Apply a worker result. Returns the cached thumbnail, or `None` when the
    /// result was cancelled or superseded.
    pub fn complete(&mut self, done: ThumbnailDone) -> Option<Thumbnail> {
        match self.pending.get(&done.key) {
            Some(p) if p.job_id == done.job_id => {
                self.pending.remove(&done.key);
            }
            _ => {
                tracing::debug!("Discarding stale thumbnail #{}: {}", done.job_id, done.key.path);
                return None;
            }
        }

        if matches!(done.result, Err(ViewerError::Cancelled)) {
            return None;
        }

        let thumbnail = self.thumbnail_from(&done.key, done.result);
        self.insert(done.key, thumbnail.clone(), done.modified);
        Some(thumbnail)
    }

    /// Drop every entry for `path` (all sizes and rotations) and cancel its
    /// pending decodes
    pub fn invalidate(&mut self, path: &ImagePath) {
        let keys: Vec<ThumbnailKey> = self
            .entries
            .iter()
            .filter(|(k, _)| &k.path == path)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &keys {
            if let Some(old) = self.entries.pop(key) {
                self.bytes = self.bytes.saturating_sub(old.bytes);
            }
        }
        self.cancel_pending(path);

        if !keys.is_empty() {
            tracing::debug!("Invalidated {} thumbnails: {}", keys.len(), path);
        }
    }

    /// Move entries of a renamed file to its new path. Entries whose stamp
    /// differs from `modified` are dropped instead.
    pub fn rekey(&mut self, from: &ImagePath, to: &ImagePath, modified: SystemTime) {
        let keys: Vec<ThumbnailKey> = self
            .entries
            .iter()
            .filter(|(k, _)| &k.path == from)
            .map(|(k, _)| k.clone())
            .collect();

        let mut moved = 0;
        for key in keys {
            let Some(cached) = self.entries.pop(&key) else { continue };
            self.bytes = self.bytes.saturating_sub(cached.bytes);
            if cached.modified != modified {
                continue;
            }
            let new_key = ThumbnailKey {
                path: to.clone(),
                ..key
            };
            self.bytes += cached.bytes;
            self.entries.put(new_key, cached);
            moved += 1;
        }
        self.cancel_pending(from);

        tracing::debug!("Re-keyed {} thumbnails: {} -> {}", moved, from, to);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.bytes = 0;
        for (_, pending) in self.pending.drain() {
            pending.token.cancel();
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            items: self.entries.len(),
            bytes: self.bytes,
            max_items: self.max_items,
            max_bytes: self.max_bytes,
            pending: self.pending.len(),
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    fn lookup(&mut self, key: &ThumbnailKey, modified: SystemTime) -> Option<Thumbnail> {
        let stale = match self.entries.get(key) {
            Some(cached) if cached.modified == modified => {
                self.hits += 1;
                tracing::debug!("Thumbnail hit: {}", key.path);
                return Some(cached.thumbnail.clone());
            }
            Some(_) => true,
            None => false,
        };

        if stale {
            if let Some(old) = self.entries.pop(key) {
                self.bytes = self.bytes.saturating_sub(old.bytes);
            }
        }
        self.misses += 1;
        tracing::debug!("Thumbnail miss: {}", key.path);
        None
    }

    fn thumbnail_from(&self, key: &ThumbnailKey, decoded: Result<DecodedImage>) -> Thumbnail {
        match decoded {
            Ok(image) => Thumbnail::Ready(Arc::new(image)),
            Err(e) => {
                tracing::warn!("Thumbnail decode failed for {}: {}", key.path, e);
                Thumbnail::Broken
            }
        }
    }

    fn insert(&mut self, key: ThumbnailKey, thumbnail: Thumbnail, modified: SystemTime) {
        let bytes = thumbnail.byte_size();
        let cached = CachedThumbnail {
            thumbnail,
            modified,
            bytes,
        };
        if let Some(old) = self.entries.put(key, cached) {
            self.bytes = self.bytes.saturating_sub(old.bytes);
        }
        self.bytes += bytes;

        while self.entries.len() > self.max_items || self.bytes > self.max_bytes {
            match self.entries.pop_lru() {
                Some((evicted_key, evicted)) => {
                    self.bytes = self.bytes.saturating_sub(evicted.bytes);
                    self.evictions += 1;
                    tracing::debug!("Evicted thumbnail: {}", evicted_key.path);
                }
                None => break,
            }
        }
    }

    fn cancel_pending(&mut self, path: &ImagePath) {
        self.pending.retain(|key, pending| {
            if &key.path == path {
                pending.token.cancel();
                false
            } else {
                true
            }
        });
    }
}

fn decode_thumbnail(decoder: &dyn ImageDecoder, key: &ThumbnailKey) -> Result<DecodedImage> {
    decoder
        .decode(key.path.as_path(), Some(key.size.max_edge()))
        .map(|image| image.rotated(key.rotation))
}
