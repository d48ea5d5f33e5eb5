//! Image entries tracked by the collection

use crate::metadata::MetadataSummary;
use crate::Result;
use app_fs::{FileSystem, ImagePath};
use serde::Serialize;
use std::time::SystemTime;

/// In-memory rotation of an entry, clockwise
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Rotation {
    #[default]
    R0,
    R90,
    R180,
    R270,
}

/// Rotation direction requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RotateDirection {
    Clockwise,
    Counterclockwise,
}

impl Rotation {
    pub fn degrees(self) -> u16 {
        match self {
            Rotation::R0 => 0,
            Rotation::R90 => 90,
            Rotation::R180 => 180,
            Rotation::R270 => 270,
        }
    }

    /// `(current + 90 * sign) mod 360`
    pub fn rotated(self, direction: RotateDirection) -> Self {
        match (self, direction) {
            (Rotation::R0, RotateDirection::Clockwise) => Rotation::R90,
            (Rotation::R90, RotateDirection::Clockwise) => Rotation::R180,
            (Rotation::R180, RotateDirection::Clockwise) => Rotation::R270,
            (Rotation::R270, RotateDirection::Clockwise) => Rotation::R0,
            (Rotation::R0, RotateDirection::Counterclockwise) => Rotation::R270,
            (Rotation::R90, RotateDirection::Counterclockwise) => Rotation::R0,
            (Rotation::R180, RotateDirection::Counterclockwise) => Rotation::R90,
            (Rotation::R270, RotateDirection::Counterclockwise) => Rotation::R180,
        }
    }

    /// Displayed size of a `width` x `height` image under this rotation
    pub fn apply_to_size(self, width: u32, height: u32) -> (u32, u32) {
        match self {
            Rotation::R90 | Rotation::R270 => (height, width),
            Rotation::R0 | Rotation::R180 => (width, height),
        }
    }
}

/// One image tracked by the collection
#[derive(Debug, Clone, Serialize)]
pub struct ImageEntry {
    pub path: ImagePath,
    pub name: String,
    pub rotation: Rotation,
    pub modified: SystemTime,
    pub size: u64,
    pub dimensions: Option<(u32, u32)>,
    /// Filled lazily the first time "Image info" is requested
    pub metadata: Option<MetadataSummary>,
    /// The backing file vanished externally
    pub not_found: bool,
}

impl ImageEntry {
    /// Entry with no stat information, used before the first stat succeeds
    pub fn new(path: ImagePath) -> Self {
        let name = path.display_name();
        Self {
            path,
            name,
            rotation: Rotation::R0,
            modified: SystemTime::UNIX_EPOCH,
            size: 0,
            dimensions: None,
            metadata: None,
            not_found: false,
        }
    }

    /// Build an entry from a stat of `path`. Dimensions are best-effort.
    pub fn from_fs(fs: &dyn FileSystem, path: ImagePath) -> Result<Self> {
        let mut entry = Self::new(path);
        entry.refresh_stat(fs)?;
        Ok(entry)
    }

    /// Re-read modified time, size and dimensions from disk
    pub fn refresh_stat(&mut self, fs: &dyn FileSystem) -> Result<()> {
        let stat = fs.stat(self.path.as_path())?;
        if stat.modified != self.modified || stat.size != self.size {
            self.metadata = None;
        }
        self.modified = stat.modified;
        self.size = stat.size;
        self.dimensions = fs.dimensions(self.path.as_path()).ok();
        self.not_found = false;
        Ok(())
    }

    /// Point the entry at a renamed path
    pub fn set_path(&mut self, path: ImagePath) {
        self.name = path.display_name();
        self.path = path;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use app_fs::LocalFileSystem;

    #[test]
    fn test_four_clockwise_rotations_are_identity() {
        for start in [Rotation::R0, Rotation::R90, Rotation::R180, Rotation::R270] {
            let mut r = start;
            for _ in 0..4 {
                r = r.rotated(RotateDirection::Clockwise);
            }
            assert_eq!(r, start);
        }
    }

    #[test]
    fn test_rotation_inverse() {
        let r = Rotation::R90
            .rotated(RotateDirection::Clockwise)
            .rotated(RotateDirection::Counterclockwise);
        assert_eq!(r, Rotation::R90);
        assert_eq!(Rotation::R0.rotated(RotateDirection::Counterclockwise), Rotation::R270);
    }

    #[test]
    fn test_degrees() {
        assert_eq!(Rotation::R0.degrees(), 0);
        assert_eq!(Rotation::R270.degrees(), 270);
    }

    #[test]
    fn test_apply_to_size() {
        assert_eq!(Rotation::R90.apply_to_size(4, 2), (2, 4));
        assert_eq!(Rotation::R180.apply_to_size(4, 2), (4, 2));
    }

    #[test]
    fn test_from_fs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        image::RgbaImage::new(3, 2).save(&path).unwrap();

        let entry = ImageEntry::from_fs(&LocalFileSystem::new(), ImagePath::new(&path)).unwrap();
        assert_eq!(entry.name, "a.png");
        assert_eq!(entry.dimensions, Some((3, 2)));
        assert!(entry.size > 0);
        assert!(!entry.not_found);
    }

    #[test]
    fn test_from_fs_missing() {
        let dir = tempfile::TempDir::new().unwrap();
        let result = ImageEntry::from_fs(
            &LocalFileSystem::new(),
            ImagePath::new(dir.path().join("gone.png")),
        );
        assert!(matches!(result, Err(crate::ViewerError::NotFound(_))));
    }
}
