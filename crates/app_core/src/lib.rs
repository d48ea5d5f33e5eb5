//! Iris Viewer Core Domain Logic
//!
//! This crate contains:
//! - Image collection and navigation
//! - File operations (delete, rename, rotate write-back)
//! - Slideshow state machine
//! - Live text extraction sessions
//! - Thumbnail cache
//! - Command system and the async control loop
//! - Configuration and error types

pub mod command;
pub mod config;
pub mod control;
pub mod entry;
pub mod error;
pub mod file_controller;
pub mod image_loader;
pub mod live_text;
pub mod metadata;
pub mod navigation;
pub mod slideshow;
pub mod state;
pub mod thumbnail_cache;
pub mod view;
pub mod workers;

pub use command::{
    Command, CommandId, CommandParseError, Outcome, SlideshowAction, StatusSnapshot, Target,
};
pub use config::{
    FilesConfig, LiveTextConfig, SlideshowConfig, ThumbnailConfig, ViewConfig, ViewerConfig,
    WorkerConfig,
};
pub use control::{spawn, CoreHandle};
pub use entry::{ImageEntry, RotateDirection, Rotation};
pub use error::{ConfirmAction, Result, ViewerError};
pub use file_controller::{CollectionEvent, FileController, FileJob, FileJobDone, FileJobKind};
pub use image_loader::{DecodedImage, ImageCrateDecoder, ImageDecoder};
pub use live_text::{
    Bounds, ExtractError, ExtractFailure, LiveTextHandle, LiveTextResult, LiveTextSession,
    LiveTextStatus, TextExtractor, TextRegion, UnavailableExtractor,
};
#[cfg(feature = "tesseract")]
pub use live_text::TesseractExtractor;
pub use metadata::{ExifMetadataReader, MetadataReader, MetadataSummary};
pub use navigation::{ImageCollection, NavigationInfo};
pub use slideshow::{SlideshowController, SlideshowState};
pub use state::{Collaborators, FileStep, ViewerCore};
pub use thumbnail_cache::{CacheStats, Thumbnail, ThumbnailCache, ThumbnailKey, ThumbnailSize};
pub use view::{FitMode, ViewState};
pub use workers::{CancelToken, Completion, Workers};
