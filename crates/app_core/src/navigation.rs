//! Image collection and active-index navigation

use crate::entry::ImageEntry;
use crate::{Result, ViewerError};
use app_fs::ImagePath;
use serde::Serialize;

/// Snapshot of the navigation state for UI rendering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NavigationInfo {
    /// Current position (0-indexed); `None` when empty
    pub position: Option<usize>,
    pub total: usize,
    /// Navigation wraps, so this is true whenever there is more than one entry
    pub has_next: bool,
    pub has_previous: bool,
    pub at_first: bool,
    pub at_last: bool,
}

/// Ordered, path-unique set of entries with an active index.
///
/// `active` is `Some(i)` with `i < entries.len()` whenever the collection is
/// non-empty, and `None` exactly when it is empty.
#[derive(Debug, Clone, Default)]
pub struct ImageCollection {
    entries: Vec<ImageEntry>,
    active: Option<usize>,
}

impl ImageCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from entries in listing order; duplicate paths are dropped
    pub fn from_entries(entries: Vec<ImageEntry>) -> Self {
        let mut collection = Self::new();
        collection.replace_all(entries, None);
        collection
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ImageEntry] {
        &self.entries
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active(&self) -> Option<&ImageEntry> {
        self.active.and_then(|i| self.entries.get(i))
    }

    pub fn get(&self, path: &ImagePath) -> Option<&ImageEntry> {
        self.entries.iter().find(|e| &e.path == path)
    }

    pub fn get_mut(&mut self, path: &ImagePath) -> Option<&mut ImageEntry> {
        self.entries.iter_mut().find(|e| &e.path == path)
    }

    pub fn contains(&self, path: &ImagePath) -> bool {
        self.get(path).is_some()
    }

    /// Position of `path`, `NotFound` when absent
    pub fn index_of(&self, path: &ImagePath) -> Result<usize> {
        self.entries
            .iter()
            .position(|e| &e.path == path)
            .ok_or_else(|| ViewerError::NotFound(path.to_string()))
    }

    /// Advance cyclically. Returns the new active index, `None` when the
    /// collection has fewer than two entries (no-op).
    pub fn next(&mut self) -> Option<usize> {
        let len = self.entries.len();
        if len <= 1 {
            return None;
        }
        let next = self.active.map_or(0, |i| (i + 1) % len);
        self.active = Some(next);
        Some(next)
    }

    /// Step back cyclically; same no-op rule as [`next`](Self::next)
    pub fn previous(&mut self) -> Option<usize> {
        let len = self.entries.len();
        if len <= 1 {
            return None;
        }
        let prev = self.active.map_or(0, |i| (i + len - 1) % len);
        self.active = Some(prev);
        Some(prev)
    }

    pub fn first(&mut self) -> Option<usize> {
        self.set_active(0).ok()
    }

    pub fn last(&mut self) -> Option<usize> {
        let last = self.entries.len().checked_sub(1)?;
        self.set_active(last).ok()
    }

    pub fn set_active(&mut self, index: usize) -> Result<usize> {
        if index >= self.entries.len() {
            return Err(ViewerError::NotFound(format!("index {}", index)));
        }
        self.active = Some(index);
        Ok(index)
    }

    pub fn set_active_path(&mut self, path: &ImagePath) -> Result<usize> {
        let index = self.index_of(path)?;
        self.set_active(index)
    }

    /// Remove the entry at `index` and repair the active index.
    ///
    /// Removing an entry before the active one keeps the same entry active.
    /// Removing the active entry selects the entry now at the same position,
    /// or the new last entry, or nothing when the collection becomes empty.
    pub fn remove_at(&mut self, index: usize) -> Option<ImageEntry> {
        if index >= self.entries.len() {
            return None;
        }
        let removed = self.entries.remove(index);
        let len = self.entries.len();

        self.active = match self.active {
            _ if len == 0 => None,
            Some(active) if index < active => Some(active - 1),
            Some(active) if index == active => Some(active.min(len - 1)),
            other => other,
        };

        Some(removed)
    }

    /// Insert `entry` at `index` (appending when past the end).
    ///
    /// Duplicate paths are rejected. Inserting at or before the active index
    /// keeps the same entry active; inserting into an empty collection makes
    /// the new entry active.
    pub fn insert_at(&mut self, index: usize, entry: ImageEntry) -> Result<usize> {
        if self.contains(&entry.path) {
            return Err(ViewerError::NameCollision(entry.path.to_string()));
        }
        let index = index.min(self.entries.len());
        self.entries.insert(index, entry);

        self.active = match self.active {
            None => Some(index),
            Some(active) if index <= active => Some(active + 1),
            other => other,
        };

        Ok(index)
    }

    /// Replace the whole collection (directory open). The entry at
    /// `active_path` becomes active, else the first one.
    pub fn replace_all(&mut self, entries: Vec<ImageEntry>, active_path: Option<&ImagePath>) {
        self.entries.clear();
        for entry in entries {
            if !self.contains(&entry.path) {
                self.entries.push(entry);
            }
        }

        self.active = if self.entries.is_empty() {
            None
        } else {
            Some(
                active_path
                    .and_then(|p| self.entries.iter().position(|e| &e.path == p))
                    .unwrap_or(0),
            )
        };
    }

    pub fn navigation_info(&self) -> NavigationInfo {
        let total = self.entries.len();
        NavigationInfo {
            position: self.active,
            total,
            has_next: total > 1,
            has_previous: total > 1,
            at_first: total > 0 && self.active == Some(0),
            at_last: total > 0 && self.active == Some(total - 1),
        }
    }
}
