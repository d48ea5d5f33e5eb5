//! Iris File System Layer
//!
//! Everything the viewer core consumes from the local machine:
//! - ImagePath: canonical path key with a stable hash id
//! - FileSystem: stat, rename, trash, delete and rotate write-back
//! - DesktopServices: wallpaper, print and file-manager reveal
//! - Directory listing of supported images
//! - New-name validation and collision matching
//! - File watching

mod image_path;
mod file_operations;
mod desktop;
mod browser;
mod sanitize;
mod watcher;

pub use image_path::ImagePath;
pub use file_operations::{FileStat, FileSystem, LocalFileSystem, RotateMode};
pub use desktop::{DesktopServices, SystemDesktop};
pub use browser::{is_supported_image, list_images, IMAGE_EXTENSIONS};
pub use sanitize::{find_collision, names_match, validate_new_name, CasePolicy, InvalidName};
pub use watcher::{FileWatcher, FsEvent};

use std::path::PathBuf;
use thiserror::Error;

/// File system errors
#[derive(Error, Debug)]
pub enum FsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("Trash unavailable: {0}")]
    TrashUnavailable(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

impl FsError {
    /// Classify an `io::Error` raised while touching `path`
    pub fn from_io(err: std::io::Error, path: &std::path::Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => FsError::PermissionDenied(path.to_path_buf()),
            _ => FsError::Io(err),
        }
    }
}

pub type Result<T> = std::result::Result<T, FsError>;
