//! Viewer error types

use app_fs::FsError;
use serde::Serialize;
use thiserror::Error;

/// Action that needs an explicit user confirmation before it can run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConfirmAction {
    /// The trash refused the file; deleting means losing it for good
    PermanentDelete,
}

/// Main viewer error type
#[derive(Error, Debug)]
pub enum ViewerError {
    // ===== Validation (never touches the filesystem) =====
    #[error("Invalid name: {0}")]
    InvalidName(#[from] app_fs::InvalidName),

    #[error("Name collision: {0}")]
    NameCollision(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    // ===== Filesystem / collaborators (entry left unchanged) =====
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Confirmation required: {0:?}")]
    NeedsConfirmation(ConfirmAction),

    #[error("Operation already in progress: {0}")]
    Busy(String),

    // ===== Fatal =====
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Initialization failed: {0}")]
    Init(String),

    #[error("Viewer core has shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, ViewerError>;

impl ViewerError {
    /// Is this error recoverable?
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ViewerError::Config(_) | ViewerError::Init(_) | ViewerError::Shutdown
        )
    }

    /// Is this a validation failure detected before any filesystem call?
    pub fn is_validation(&self) -> bool {
        matches!(self, ViewerError::InvalidName(_) | ViewerError::NameCollision(_))
    }

    /// Get a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            ViewerError::NameCollision(_) => {
                "The file already exists, please use another name".to_string()
            }
            ViewerError::NotFound(_) => "Image file not found".to_string(),
            ViewerError::NeedsConfirmation(ConfirmAction::PermanentDelete) => {
                "Cannot move the file to the trash. Do you want to permanently delete it?"
                    .to_string()
            }
            ViewerError::UnsupportedFormat(format) => format!("Unsupported format: {}", format),
            _ => self.to_string(),
        }
    }
}

impl From<FsError> for ViewerError {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound(p) => ViewerError::NotFound(p.display().to_string()),
            FsError::PermissionDenied(p) => ViewerError::PermissionDenied(p.display().to_string()),
            FsError::UnsupportedFormat(f) => ViewerError::UnsupportedFormat(f),
            FsError::Io(io) => ViewerError::Io(io),
            FsError::TrashUnavailable(msg) => ViewerError::Io(std::io::Error::other(msg)),
            FsError::InvalidPath(msg) => {
                ViewerError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, msg))
            }
        }
    }
}
