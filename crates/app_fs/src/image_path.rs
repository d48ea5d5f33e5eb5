//! ImagePath - canonical path used as the identity of an image

use serde::{Serialize, Serializer};
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};
use xxhash_rust::xxh3::xxh3_64;

/// Canonical filesystem path of an image.
///
/// Two `ImagePath`s are equal exactly when their canonical paths are equal, so
/// the value can key every per-image cache in the core. The hash id is kept
/// alongside for cheap lookups and log correlation.
#[derive(Debug, Clone)]
pub struct ImagePath {
    raw: PathBuf,
    id: u64,
}

impl ImagePath {
    /// Canonicalize `path` through the filesystem, falling back to a lexical
    /// normalization when the file does not exist (yet).
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let raw = path
            .canonicalize()
            .unwrap_or_else(|_| Self::normalize(path));
        Self::from_canonical(raw)
    }

    /// Wrap a path that is already canonical without touching the filesystem
    pub fn from_canonical(raw: PathBuf) -> Self {
        let id = xxh3_64(raw.as_os_str().as_encoded_bytes());
        Self { raw, id }
    }

    pub fn as_path(&self) -> &Path {
        &self.raw
    }

    pub fn to_path_buf(&self) -> PathBuf {
        self.raw.clone()
    }

    pub fn parent(&self) -> Option<&Path> {
        self.raw.parent()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.raw.file_name()?.to_str()
    }

    /// File name for UI display (lossy for non-UTF8 names)
    pub fn display_name(&self) -> String {
        self.raw
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.raw.to_string_lossy().into_owned())
    }

    /// Sibling path with the same parent and a different file name
    pub fn with_file_name(&self, name: &str) -> Self {
        Self::from_canonical(self.raw.with_file_name(name))
    }

    /// Make absolute and resolve `.` and `..` without consulting the filesystem
    fn normalize(path: &Path) -> PathBuf {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().unwrap_or_default().join(path)
        };

        let mut normalized = PathBuf::new();
        for component in absolute.components() {
            match component {
                Component::ParentDir => {
                    normalized.pop();
                }
                Component::CurDir => {}
                other => normalized.push(other),
            }
        }
        normalized
    }
}

impl PartialEq for ImagePath {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.raw == other.raw
    }
}

impl Eq for ImagePath {}

impl Hash for ImagePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl AsRef<Path> for ImagePath {
    fn as_ref(&self) -> &Path {
        &self.raw
    }
}

impl From<PathBuf> for ImagePath {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&Path> for ImagePath {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl From<&str> for ImagePath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl std::fmt::Display for ImagePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw.display())
    }
}

impl Serialize for ImagePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_consistency() {
        let a = ImagePath::new("/tmp/iris-test/image.jpg");
        let b = ImagePath::new("/tmp/iris-test/image.jpg");
        assert_eq!(a, b);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_lexical_normalization() {
        let path = ImagePath::new("/nonexistent-iris/a/../b/./c.png");
        assert_eq!(path.as_path(), Path::new("/nonexistent-iris/b/c.png"));
        assert_eq!(path.file_name(), Some("c.png"));
    }

    #[test]
    fn test_with_file_name() {
        let path = ImagePath::from_canonical(PathBuf::from("/photos/a.png"));
        let renamed = path.with_file_name("b.png");
        assert_eq!(renamed.as_path(), Path::new("/photos/b.png"));
        assert_eq!(renamed.parent(), path.parent());
        assert_ne!(renamed, path);
    }

    #[test]
    fn test_canonicalizes_existing_files() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("x.png"), b"x").unwrap();
        let via_dot = ImagePath::new(dir.path().join(".").join("x.png"));
        let direct = ImagePath::new(dir.path().join("x.png"));
        assert_eq!(via_dot, direct);
    }
}
