//! Command system for user actions

use crate::entry::{ImageEntry, RotateDirection, Rotation};
use crate::live_text::LiveTextHandle;
use crate::metadata::MetadataSummary;
use crate::navigation::NavigationInfo;
use crate::slideshow::SlideshowState;
use crate::thumbnail_cache::{CacheStats, Thumbnail, ThumbnailSize};
use app_fs::{FsEvent, ImagePath};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Command identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommandId(pub String);

impl CommandId {
    pub fn new(id: &str) -> Self {
        Self(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    // Navigation commands
    pub const NAV_NEXT_ITEM: &'static str = "nav.next_item";
    pub const NAV_PREV_ITEM: &'static str = "nav.prev_item";
    pub const NAV_FIRST_ITEM: &'static str = "nav.first_item";
    pub const NAV_LAST_ITEM: &'static str = "nav.last_item";
    pub const NAV_SELECT: &'static str = "nav.select";

    // View commands
    pub const VIEW_ZOOM_IN: &'static str = "view.zoom_in";
    pub const VIEW_ZOOM_OUT: &'static str = "view.zoom_out";
    pub const VIEW_ZOOM_RESET: &'static str = "view.zoom_reset";
    pub const VIEW_FIT_WINDOW: &'static str = "view.fit_window";
    pub const VIEW_ROTATE_CW: &'static str = "view.rotate_cw";
    pub const VIEW_ROTATE_CCW: &'static str = "view.rotate_ccw";
    pub const VIEW_INFO: &'static str = "view.info";
    pub const VIEW_LIVE_TEXT: &'static str = "view.live_text";
    pub const VIEW_LIVE_TEXT_CANCEL: &'static str = "view.live_text_cancel";
    pub const VIEW_THUMBNAIL: &'static str = "view.thumbnail";

    // Slideshow commands
    pub const VIEW_SLIDESHOW: &'static str = "view.slideshow";
    pub const SLIDESHOW_START: &'static str = "slideshow.start";
    pub const SLIDESHOW_PAUSE: &'static str = "slideshow.pause";
    pub const SLIDESHOW_RESUME: &'static str = "slideshow.resume";
    pub const SLIDESHOW_STOP: &'static str = "slideshow.stop";
    pub const SLIDESHOW_INTERVAL: &'static str = "slideshow.interval";

    // File commands
    pub const FILE_OPEN: &'static str = "file.open";
    pub const FILE_DELETE: &'static str = "file.delete";
    pub const FILE_DELETE_PERMANENTLY: &'static str = "file.delete_permanently";
    pub const FILE_RENAME: &'static str = "file.rename";
    pub const FILE_APPLY_ROTATION: &'static str = "file.apply_rotation";
    pub const FILE_SET_WALLPAPER: &'static str = "file.set_wallpaper";
    pub const FILE_PRINT: &'static str = "file.print";
    pub const FILE_REVEAL: &'static str = "file.reveal";
    pub const FILE_EXTERNAL: &'static str = "file.external";

    // App commands
    pub const APP_STATUS: &'static str = "app.status";
}

/// Which entry a command applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Active,
    Path(ImagePath),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlideshowAction {
    Start,
    Pause,
    Resume,
    Stop,
    Toggle,
}

/// A user action delivered to the viewer core
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    // ===== Navigation =====
    Next,
    Previous,
    First,
    Last,
    Select(ImagePath),

    // ===== View =====
    ZoomIn,
    ZoomOut,
    ZoomReset,
    FitToWindow { window: Option<(u32, u32)> },
    Rotate { target: Target, direction: RotateDirection },

    // ===== File (destructive) =====
    ApplyRotation { target: Target, reencode: bool },
    Delete(Target),
    DeletePermanently(Target),
    Rename { target: Target, new_name: String },

    // ===== File (collaborators) =====
    SetWallpaper(Target),
    Print(Target),
    Reveal(Target),
    Open(Vec<PathBuf>),
    External(FsEvent),

    // ===== Slideshow =====
    Slideshow(SlideshowAction),
    SetSlideshowInterval(Duration),

    // ===== Background work =====
    ExtractText(Target),
    CancelText(Target),
    Thumbnail { target: Target, size: Option<ThumbnailSize> },
    Info(Target),

    Status,
}

impl Command {
    pub fn id(&self) -> CommandId {
        let id = match self {
            Command::Next => CommandId::NAV_NEXT_ITEM,
            Command::Previous => CommandId::NAV_PREV_ITEM,
            Command::First => CommandId::NAV_FIRST_ITEM,
            Command::Last => CommandId::NAV_LAST_ITEM,
            Command::Select(_) => CommandId::NAV_SELECT,
            Command::ZoomIn => CommandId::VIEW_ZOOM_IN,
            Command::ZoomOut => CommandId::VIEW_ZOOM_OUT,
            Command::ZoomReset => CommandId::VIEW_ZOOM_RESET,
            Command::FitToWindow { .. } => CommandId::VIEW_FIT_WINDOW,
            Command::Rotate { direction: RotateDirection::Clockwise, .. } => CommandId::VIEW_ROTATE_CW,
            Command::Rotate { direction: RotateDirection::Counterclockwise, .. } => {
                CommandId::VIEW_ROTATE_CCW
            }
            Command::ApplyRotation { .. } => CommandId::FILE_APPLY_ROTATION,
            Command::Delete(_) => CommandId::FILE_DELETE,
            Command::DeletePermanently(_) => CommandId::FILE_DELETE_PERMANENTLY,
            Command::Rename { .. } => CommandId::FILE_RENAME,
            Command::SetWallpaper(_) => CommandId::FILE_SET_WALLPAPER,
            Command::Print(_) => CommandId::FILE_PRINT,
            Command::Reveal(_) => CommandId::FILE_REVEAL,
            Command::Open(_) => CommandId::FILE_OPEN,
            Command::External(_) => CommandId::FILE_EXTERNAL,
            Command::Slideshow(SlideshowAction::Start) => CommandId::SLIDESHOW_START,
            Command::Slideshow(SlideshowAction::Pause) => CommandId::SLIDESHOW_PAUSE,
            Command::Slideshow(SlideshowAction::Resume) => CommandId::SLIDESHOW_RESUME,
            Command::Slideshow(SlideshowAction::Stop) => CommandId::SLIDESHOW_STOP,
            Command::Slideshow(SlideshowAction::Toggle) => CommandId::VIEW_SLIDESHOW,
            Command::SetSlideshowInterval(_) => CommandId::SLIDESHOW_INTERVAL,
            Command::ExtractText(_) => CommandId::VIEW_LIVE_TEXT,
            Command::CancelText(_) => CommandId::VIEW_LIVE_TEXT_CANCEL,
            Command::Thumbnail { .. } => CommandId::VIEW_THUMBNAIL,
            Command::Info(_) => CommandId::VIEW_INFO,
            Command::Status => CommandId::APP_STATUS,
        };
        CommandId::new(id)
    }

    /// Commands that run a blocking filesystem job and are single-flight per
    /// entry
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Command::ApplyRotation { .. }
                | Command::Delete(_)
                | Command::DeletePermanently(_)
                | Command::Rename { .. }
        )
    }

    pub fn target(&self) -> Option<&Target> {
        match self {
            Command::Rotate { target, .. }
            | Command::ApplyRotation { target, .. }
            | Command::Rename { target, .. }
            | Command::Thumbnail { target, .. } => Some(target),
            Command::Delete(target)
            | Command::DeletePermanently(target)
            | Command::SetWallpaper(target)
            | Command::Print(target)
            | Command::Reveal(target)
            | Command::ExtractText(target)
            | Command::CancelText(target)
            | Command::Info(target) => Some(target),
            _ => None,
        }
    }

    /// Pin the command to `path`, so a queued command still applies to the
    /// entry it was aimed at when the active entry changes meanwhile
    pub fn retarget(mut self, path: ImagePath) -> Self {
        match &mut self {
            Command::Rotate { target, .. }
            | Command::ApplyRotation { target, .. }
            | Command::Rename { target, .. }
            | Command::Thumbnail { target, .. }
            | Command::Delete(target)
            | Command::DeletePermanently(target)
            | Command::SetWallpaper(target)
            | Command::Print(target)
            | Command::Reveal(target)
            | Command::ExtractText(target)
            | Command::CancelText(target)
            | Command::Info(target) => *target = Target::Path(path),
            _ => {}
        }
        self
    }

    /// Parse a command line: a command id followed by its argument.
    ///
    /// The argument is the rest of the line, so names and paths may contain
    /// spaces. Commands that take an entry apply to the active one.
    pub fn parse(line: &str) -> Result<Self, CommandParseError> {
        let line = line.trim();
        let (id, arg) = match line.split_once(char::is_whitespace) {
            Some((id, arg)) => (id, Some(arg.trim()).filter(|a| !a.is_empty())),
            None => (line, None),
        };
        let required = |what: &'static str| arg.ok_or(CommandParseError::MissingArgument(what));
        let active = Target::Active;

        let cmd = match id {
            CommandId::NAV_NEXT_ITEM => Command::Next,
            CommandId::NAV_PREV_ITEM => Command::Previous,
            CommandId::NAV_FIRST_ITEM => Command::First,
            CommandId::NAV_LAST_ITEM => Command::Last,
            CommandId::NAV_SELECT => Command::Select(ImagePath::new(required("path")?)),
            CommandId::VIEW_ZOOM_IN => Command::ZoomIn,
            CommandId::VIEW_ZOOM_OUT => Command::ZoomOut,
            CommandId::VIEW_ZOOM_RESET => Command::ZoomReset,
            CommandId::VIEW_FIT_WINDOW => Command::FitToWindow {
                window: arg.map(parse_size).transpose()?,
            },
            CommandId::VIEW_ROTATE_CW => Command::Rotate {
                target: active,
                direction: RotateDirection::Clockwise,
            },
            CommandId::VIEW_ROTATE_CCW => Command::Rotate {
                target: active,
                direction: RotateDirection::Counterclockwise,
            },
            CommandId::VIEW_INFO => Command::Info(active),
            CommandId::VIEW_LIVE_TEXT => Command::ExtractText(active),
            CommandId::VIEW_LIVE_TEXT_CANCEL => Command::CancelText(active),
            CommandId::VIEW_THUMBNAIL => Command::Thumbnail {
                target: active,
                size: arg.map(parse_thumbnail_size).transpose()?,
            },
            CommandId::VIEW_SLIDESHOW => Command::Slideshow(SlideshowAction::Toggle),
            CommandId::SLIDESHOW_START => Command::Slideshow(SlideshowAction::Start),
            CommandId::SLIDESHOW_PAUSE => Command::Slideshow(SlideshowAction::Pause),
            CommandId::SLIDESHOW_RESUME => Command::Slideshow(SlideshowAction::Resume),
            CommandId::SLIDESHOW_STOP => Command::Slideshow(SlideshowAction::Stop),
            CommandId::SLIDESHOW_INTERVAL => {
                let ms = required("milliseconds")?;
                let ms: u64 = ms
                    .parse()
                    .map_err(|_| CommandParseError::InvalidArgument(ms.to_string()))?;
                Command::SetSlideshowInterval(Duration::from_millis(ms))
            }
            CommandId::FILE_OPEN => Command::Open(vec![PathBuf::from(required("path")?)]),
            CommandId::FILE_DELETE => Command::Delete(active),
            CommandId::FILE_DELETE_PERMANENTLY => Command::DeletePermanently(active),
            CommandId::FILE_RENAME => Command::Rename {
                target: active,
                new_name: required("new name")?.to_string(),
            },
            CommandId::FILE_APPLY_ROTATION => Command::ApplyRotation {
                target: active,
                reencode: match arg {
                    None | Some("lossless") => false,
                    Some("reencode") => true,
                    Some(other) => return Err(CommandParseError::InvalidArgument(other.to_string())),
                },
            },
            CommandId::FILE_SET_WALLPAPER => Command::SetWallpaper(active),
            CommandId::FILE_PRINT => Command::Print(active),
            CommandId::FILE_REVEAL => Command::Reveal(active),
            CommandId::APP_STATUS => Command::Status,
            other => return Err(CommandParseError::UnknownCommand(other.to_string())),
        };
        Ok(cmd)
    }
}

fn parse_size(s: &str) -> Result<(u32, u32), CommandParseError> {
    let invalid = || CommandParseError::InvalidArgument(s.to_string());
    let (w, h) = s.split_once('x').ok_or_else(invalid)?;
    Ok((w.parse().map_err(|_| invalid())?, h.parse().map_err(|_| invalid())?))
}

fn parse_thumbnail_size(s: &str) -> Result<ThumbnailSize, CommandParseError> {
    match s {
        "small" => Ok(ThumbnailSize::Small),
        "medium" => Ok(ThumbnailSize::Medium),
        "large" => Ok(ThumbnailSize::Large),
        other => Err(CommandParseError::InvalidArgument(other.to_string())),
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),
    #[error("missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Reply to a command
#[derive(Debug, Clone)]
pub enum Outcome {
    Done,
    Navigated(NavigationInfo),
    Scale(f32),
    Rotation(Rotation),
    Renamed(ImagePath),
    Opened(usize),
    Slideshow(SlideshowState),
    Text(LiveTextHandle),
    /// `None` while the decode is pending
    Thumbnail(Option<Thumbnail>),
    Info(MetadataSummary),
    Status(Box<StatusSnapshot>),
}

/// Snapshot of the core for status displays
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub directory: Option<PathBuf>,
    pub navigation: NavigationInfo,
    pub active: Option<ImageEntry>,
    pub scale: f32,
    pub slideshow: SlideshowState,
    pub thumbnails: CacheStats,
    pub text_in_flight: usize,
    pub busy: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        assert_eq!(Command::parse("nav.next_item").unwrap(), Command::Next);
        assert_eq!(Command::parse("  view.zoom_in  ").unwrap(), Command::ZoomIn);
        assert_eq!(
            Command::parse("view.slideshow").unwrap(),
            Command::Slideshow(SlideshowAction::Toggle)
        );
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(
            Command::parse("file.rename my photo.png").unwrap(),
            Command::Rename {
                target: Target::Active,
                new_name: "my photo.png".to_string()
            }
        );
        assert_eq!(
            Command::parse("view.fit_window 800x600").unwrap(),
            Command::FitToWindow { window: Some((800, 600)) }
        );
        assert_eq!(
            Command::parse("file.apply_rotation reencode").unwrap(),
            Command::ApplyRotation { target: Target::Active, reencode: true }
        );
        assert_eq!(
            Command::parse("slideshow.interval 1500").unwrap(),
            Command::SetSlideshowInterval(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            Command::parse("nav.teleport"),
            Err(CommandParseError::UnknownCommand("nav.teleport".into()))
        );
        assert_eq!(
            Command::parse("file.rename"),
            Err(CommandParseError::MissingArgument("new name"))
        );
        assert!(matches!(
            Command::parse("view.fit_window wide"),
            Err(CommandParseError::InvalidArgument(_))
        ));
        assert!(matches!(
            Command::parse("view.thumbnail huge"),
            Err(CommandParseError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_id_roundtrips_through_parse() {
        for line in [
            "nav.prev_item",
            "view.rotate_ccw",
            "file.delete",
            "file.delete_permanently",
            "slideshow.pause",
            "view.live_text",
            "app.status",
        ] {
            assert_eq!(Command::parse(line).unwrap().id().as_str(), line);
        }
    }

    #[test]
    fn test_destructive_and_retarget() {
        let path = ImagePath::from_canonical("/photos/a.png".into());
        let cmd = Command::Delete(Target::Active);
        assert!(cmd.is_destructive());
        assert!(!Command::ZoomIn.is_destructive());

        let pinned = cmd.retarget(path.clone());
        assert_eq!(pinned.target(), Some(&Target::Path(path)));
        assert_eq!(Command::Next.retarget(ImagePath::from_canonical("/x".into())), Command::Next);
    }
}
