//! Image decoding service used by thumbnails and text extraction

use crate::entry::Rotation;
use crate::Result;
use app_fs::FsError;
use image::{imageops, DynamicImage, GenericImageView, ImageReader, RgbaImage};
use std::io::Cursor;
use std::path::Path;

/// Decoded RGBA8 pixels
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for DecodedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl DecodedImage {
    pub fn from_rgba(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: image.into_raw(),
        }
    }

    /// Memory charged against the cache budget
    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    /// Apply an in-memory rotation
    pub fn rotated(self, rotation: Rotation) -> Self {
        if rotation == Rotation::R0 {
            return self;
        }
        let (width, height) = (self.width, self.height);
        let Some(image) = RgbaImage::from_raw(width, height, self.data) else {
            return Self { width: 0, height: 0, data: Vec::new() };
        };
        let rotated = match rotation {
            Rotation::R90 => imageops::rotate90(&image),
            Rotation::R180 => imageops::rotate180(&image),
            Rotation::R270 => imageops::rotate270(&image),
            Rotation::R0 => image,
        };
        Self::from_rgba(rotated)
    }
}

/// Decoder collaborator; runs on worker threads
pub trait ImageDecoder: Send + Sync {
    /// Decode `path`, downscaling so neither edge exceeds `max_edge`
    fn decode(&self, path: &Path, max_edge: Option<u32>) -> Result<DecodedImage>;
}

/// `image` crate decoder
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCrateDecoder;

impl ImageDecoder for ImageCrateDecoder {
    fn decode(&self, path: &Path, max_edge: Option<u32>) -> Result<DecodedImage> {
        tracing::debug!("Decoding image: {}", path.display());

        let data = std::fs::read(path).map_err(|e| FsError::from_io(e, path))?;
        let img = decode_bytes(&data)?;

        // Resize if needed
        let img = match max_edge {
            Some(edge) => {
                let (w, h) = img.dimensions();
                if w > edge || h > edge {
                    img.thumbnail(edge, edge)
                } else {
                    img
                }
            }
            None => img,
        };

        Ok(DecodedImage::from_rgba(img.to_rgba8()))
    }
}

fn decode_bytes(data: &[u8]) -> Result<DynamicImage> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(crate::ViewerError::Io)?;

    reader.decode().map_err(|e| match e {
        image::ImageError::Unsupported(u) => crate::ViewerError::UnsupportedFormat(u.to_string()),
        image::ImageError::IoError(io) => crate::ViewerError::Io(io),
        other => crate::ViewerError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            other.to_string(),
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn write_png(path: &Path, width: u32, height: u32) {
        let mut img = RgbaImage::new(width, height);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img.save(path).unwrap();
    }

    #[test]
    fn test_decode_full_size() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path, 40, 20);

        let decoded = ImageCrateDecoder.decode(&path, None).unwrap();
        assert_eq!((decoded.width, decoded.height), (40, 20));
        assert_eq!(decoded.byte_size(), 40 * 20 * 4);
    }

    #[test]
    fn test_decode_thumbnail_bounds() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        write_png(&path, 400, 200);

        let decoded = ImageCrateDecoder.decode(&path, Some(100)).unwrap();
        assert!(decoded.width <= 100 && decoded.height <= 100);
        assert_eq!(decoded.width, 100);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(ImageCrateDecoder.decode(&path, None).is_err());
    }

    #[test]
    fn test_decode_missing_is_not_found() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = ImageCrateDecoder.decode(&dir.path().join("gone.png"), None);
        assert!(matches!(result, Err(crate::ViewerError::NotFound(_))));
    }

    #[test]
    fn test_rotated_moves_pixels() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let decoded = DecodedImage::from_rgba(img).rotated(Rotation::R90);
        assert_eq!((decoded.width, decoded.height), (1, 2));

        // Row-major RGBA: (0, 0) then (0, 1)
        assert_eq!(&decoded.data[0..4], &[255, 0, 0, 255]);
        assert_eq!(&decoded.data[4..8], &[0, 0, 0, 0]);
    }
}
