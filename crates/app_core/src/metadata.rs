//! "Image info" metadata summary
//!
//! Parsed lazily the first time the user asks for it and cached on the entry.

use crate::Result;
use chrono::NaiveDateTime;
use exif::{Exif, In, Reader, Tag, Value};
use serde::Serialize;
use std::io::Cursor;

/// EXIF-style summary shown in the info panel
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetadataSummary {
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub lens_model: Option<String>,
    pub date_captured: Option<NaiveDateTime>,
    /// As written by the camera, e.g. `1/250`
    pub exposure_time: Option<String>,
    pub aperture: Option<f64>,
    pub iso: Option<u32>,
    /// Millimetres
    pub focal_length: Option<f64>,
    pub flash: Option<String>,
    pub white_balance: Option<String>,
    pub metering_mode: Option<String>,
    pub exposure_program: Option<String>,
    pub exposure_mode: Option<String>,
    pub color_space: Option<String>,
    /// Raw EXIF orientation (1-8)
    pub orientation: Option<u32>,
}

impl MetadataSummary {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Parses the metadata summary out of an image file's bytes
pub trait MetadataReader: Send + Sync {
    fn read(&self, data: &[u8]) -> Result<MetadataSummary>;
}

/// `kamadak-exif` backed reader. Data without EXIF yields an empty summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExifMetadataReader;

impl MetadataReader for ExifMetadataReader {
    fn read(&self, data: &[u8]) -> Result<MetadataSummary> {
        match Reader::new().read_from_container(&mut Cursor::new(data)) {
            Ok(exif) => Ok(parse_exif(&exif)),
            Err(e) => {
                tracing::debug!("No EXIF data: {}", e);
                Ok(MetadataSummary::default())
            }
        }
    }
}

fn parse_exif(exif: &Exif) -> MetadataSummary {
    let text = |tag: Tag| {
        exif.get_field(tag, In::PRIMARY)
            .map(|f| f.display_value().to_string().trim_matches('"').trim().to_string())
            .filter(|s| !s.is_empty())
    };
    let described = |tag: Tag| {
        exif.get_field(tag, In::PRIMARY)
            .map(|f| f.display_value().with_unit(exif).to_string())
    };
    let field = |tag: Tag| exif.get_field(tag, In::PRIMARY).map(|f| &f.value);

    MetadataSummary {
        camera_make: text(Tag::Make),
        camera_model: text(Tag::Model),
        lens_model: text(Tag::LensModel),
        date_captured: text(Tag::DateTimeOriginal)
            .or_else(|| text(Tag::DateTime))
            .and_then(|s| parse_datetime(&s)),
        exposure_time: text(Tag::ExposureTime),
        aperture: field(Tag::FNumber).and_then(rational_value),
        iso: field(Tag::PhotographicSensitivity).and_then(u32_value),
        focal_length: field(Tag::FocalLength).and_then(rational_value),
        flash: described(Tag::Flash),
        white_balance: described(Tag::WhiteBalance),
        metering_mode: described(Tag::MeteringMode),
        exposure_program: described(Tag::ExposureProgram),
        exposure_mode: described(Tag::ExposureMode),
        color_space: described(Tag::ColorSpace),
        orientation: field(Tag::Orientation).and_then(u32_value),
    }
}

fn u32_value(value: &Value) -> Option<u32> {
    match value {
        Value::Short(v) => v.first().map(|&n| u32::from(n)),
        Value::Long(v) => v.first().copied(),
        _ => None,
    }
}

fn rational_value(value: &Value) -> Option<f64> {
    match value {
        Value::Rational(v) => v
            .first()
            .filter(|r| r.denom != 0)
            .map(|r| f64::from(r.num) / f64::from(r.denom)),
        _ => None,
    }
}

/// EXIF dates look like `2024:01:15 10:30:45`
fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s.trim(), "%Y:%m:%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s.trim(), "%Y-%m-%d %H:%M:%S"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_datetime() {
        let dt = parse_datetime("2024:01:15 10:30:45").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 1, 15));
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (10, 30, 45));
        assert!(parse_datetime("2024-01-15 10:30:45").is_some());
        assert!(parse_datetime("yesterday").is_none());
    }

    #[test]
    fn test_value_helpers() {
        assert_eq!(u32_value(&Value::Short(vec![200])), Some(200));
        assert_eq!(u32_value(&Value::Long(vec![])), None);
        assert_eq!(
            rational_value(&Value::Rational(vec![exif::Rational { num: 28, denom: 10 }])),
            Some(2.8)
        );
        assert_eq!(
            rational_value(&Value::Rational(vec![exif::Rational { num: 1, denom: 0 }])),
            None
        );
    }

    #[test]
    fn test_png_without_exif_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("plain.png");
        image::RgbaImage::new(2, 2).save(&path).unwrap();

        let summary = ExifMetadataReader.read(&std::fs::read(&path).unwrap()).unwrap();
        assert!(summary.is_empty());
    }

    #[test]
    fn test_garbage_is_empty() {
        let summary = ExifMetadataReader.read(b"not an image").unwrap();
        assert!(summary.is_empty());
    }
}
