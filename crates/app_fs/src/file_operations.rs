//! File operations consumed by the viewer core
//! Provides stat, rename, trash, permanent delete and rotate write-back

use crate::{FsError, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, ImageReader};
use std::ffi::OsString;
use std::fs;
use std::io::BufWriter;
use std::path::Path;
use std::time::SystemTime;

/// Result of a stat call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub modified: SystemTime,
    pub size: u64,
}

/// How a rotation is written back to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateMode {
    /// Pixel-exact rotation; only formats whose encoding is lossless
    Lossless,
    /// Decode, rotate and encode again; JPEG uses the given quality
    Reencode { quality: u8 },
}

/// Filesystem collaborator.
///
/// Every method either completes or fails with a typed [`FsError`]; no
/// timeouts are applied.
pub trait FileSystem: Send + Sync {
    fn stat(&self, path: &Path) -> Result<FileStat>;

    /// Pixel dimensions read from the image header
    fn dimensions(&self, path: &Path) -> Result<(u32, u32)>;

    fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Names of all entries in `dir`
    fn list_names(&self, dir: &Path) -> Result<Vec<OsString>>;

    /// Rename without overwriting an existing target
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Move to the recoverable trash
    fn trash(&self, path: &Path) -> Result<()>;

    /// Permanently delete
    fn remove(&self, path: &Path) -> Result<()>;

    /// Rotate the file on disk by `degrees` clockwise (90, 180 or 270)
    fn rotate(&self, path: &Path, degrees: u16, mode: RotateMode) -> Result<()>;
}

/// Formats whose encoder reproduces the decoded pixels exactly
const LOSSLESS_ROTATE: &[ImageFormat] = &[ImageFormat::Png, ImageFormat::Bmp];

/// Formats the re-encode fallback can write
const REENCODE_ROTATE: &[ImageFormat] = &[ImageFormat::Png, ImageFormat::Bmp, ImageFormat::Jpeg];

/// Local disk implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }

    fn ensure_exists(path: &Path) -> Result<()> {
        fs::symlink_metadata(path)
            .map(|_| ())
            .map_err(|e| FsError::from_io(e, path))
    }

    fn write_rotated(path: &Path, image: &DynamicImage, format: ImageFormat, mode: RotateMode) -> Result<()> {
        let file_name = path
            .file_name()
            .ok_or_else(|| FsError::InvalidPath(path.display().to_string()))?;
        let mut tmp_name = OsString::from(".");
        tmp_name.push(file_name);
        tmp_name.push(".rotate");
        let tmp = path.with_file_name(tmp_name);

        let written = (|| -> Result<()> {
            let file = fs::File::create(&tmp).map_err(|e| FsError::from_io(e, &tmp))?;
            let mut writer = BufWriter::new(file);
            match (format, mode) {
                (ImageFormat::Jpeg, RotateMode::Reencode { quality }) => {
                    let encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
                    DynamicImage::ImageRgb8(image.to_rgb8())
                        .write_with_encoder(encoder)
                        .map_err(image_error)?;
                }
                _ => image.write_to(&mut writer, format).map_err(image_error)?,
            }
            Ok(())
        })();

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        // Replace in one step so a failed write never leaves a half-rotated file
        fs::rename(&tmp, path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            FsError::from_io(e, path)
        })
    }
}

impl FileSystem for LocalFileSystem {
    fn stat(&self, path: &Path) -> Result<FileStat> {
        let metadata = fs::metadata(path).map_err(|e| FsError::from_io(e, path))?;
        Ok(FileStat {
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            size: metadata.len(),
        })
    }

    fn dimensions(&self, path: &Path) -> Result<(u32, u32)> {
        ImageReader::open(path)
            .map_err(|e| FsError::from_io(e, path))?
            .with_guessed_format()
            .map_err(|e| FsError::from_io(e, path))?
            .into_dimensions()
            .map_err(image_error)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| FsError::from_io(e, path))
    }

    fn list_names(&self, dir: &Path) -> Result<Vec<OsString>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| FsError::from_io(e, dir))? {
            names.push(entry?.file_name());
        }
        Ok(names)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        Self::ensure_exists(from)?;

        // Identical paths apart from case are allowed through: on a
        // case-insensitive filesystem `to` "exists" because it is `from`.
        let same_file = from
            .file_name()
            .zip(to.file_name())
            .map(|(a, b)| a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase())
            .unwrap_or(false)
            && from.parent() == to.parent();
        if to.exists() && !same_file {
            return Err(FsError::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("target exists: {}", to.display()),
            )));
        }

        fs::rename(from, to).map_err(|e| FsError::from_io(e, from))?;
        tracing::info!("Renamed: {} -> {}", from.display(), to.display());
        Ok(())
    }

    #[cfg(feature = "trash-support")]
    fn trash(&self, path: &Path) -> Result<()> {
        Self::ensure_exists(path)?;
        trash::delete(path).map_err(|e| classify_trash_error(e, path))?;
        tracing::info!("Moved to trash: {}", path.display());
        Ok(())
    }

    #[cfg(not(feature = "trash-support"))]
    fn trash(&self, path: &Path) -> Result<()> {
        Self::ensure_exists(path)?;
        Err(FsError::TrashUnavailable("trash support not enabled".to_string()))
    }

    fn remove(&self, path: &Path) -> Result<()> {
        Self::ensure_exists(path)?;
        fs::remove_file(path).map_err(|e| FsError::from_io(e, path))?;
        tracing::warn!("Permanently deleted: {}", path.display());
        Ok(())
    }

    fn rotate(&self, path: &Path, degrees: u16, mode: RotateMode) -> Result<()> {
        Self::ensure_exists(path)?;

        let format = ImageFormat::from_path(path)
            .map_err(|_| FsError::UnsupportedFormat(path.display().to_string()))?;
        let supported = match mode {
            RotateMode::Lossless => LOSSLESS_ROTATE,
            RotateMode::Reencode { .. } => REENCODE_ROTATE,
        };
        if !supported.contains(&format) {
            return Err(FsError::UnsupportedFormat(format!("{:?}", format)));
        }

        let degrees = degrees % 360;
        if degrees == 0 {
            return Ok(());
        }

        let image = image::open(path).map_err(image_error)?;
        let rotated = match degrees {
            90 => image.rotate90(),
            180 => image.rotate180(),
            270 => image.rotate270(),
            other => return Err(FsError::InvalidPath(format!("rotation by {} degrees", other))),
        };

        Self::write_rotated(path, &rotated, format, mode)?;
        tracing::info!("Rotated {} by {} degrees ({:?})", path.display(), degrees, mode);
        Ok(())
    }
}

fn image_error(e: image::ImageError) -> FsError {
    match e {
        image::ImageError::IoError(io) => FsError::Io(io),
        image::ImageError::Unsupported(u) => FsError::UnsupportedFormat(u.to_string()),
        other => FsError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, other.to_string())),
    }
}

#[cfg(feature = "trash-support")]
fn classify_trash_error(err: trash::Error, path: &Path) -> FsError {
    let io_kind = std::error::Error::source(&err)
        .and_then(|s| s.downcast_ref::<std::io::Error>())
        .map(|io| io.kind());

    match io_kind {
        Some(std::io::ErrorKind::PermissionDenied) => FsError::PermissionDenied(path.to_path_buf()),
        Some(std::io::ErrorKind::NotFound) => FsError::NotFound(path.to_path_buf()),
        _ => match err {
            trash::Error::CouldNotAccess { .. } => FsError::PermissionDenied(path.to_path_buf()),
            other => FsError::TrashUnavailable(other.to_string()),
        },
    }
}
