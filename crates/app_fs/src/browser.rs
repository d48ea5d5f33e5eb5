//! Directory listing of viewable images

use crate::{FsError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions the viewer opens
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "ico", "tiff", "tif",
];

/// Check if a file is a supported image format
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// List the images directly inside `dir`, sorted by file name.
///
/// Hidden files and subdirectories are skipped. The returned order is the
/// insertion order of a freshly opened collection.
pub fn list_images<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();

    if !dir.exists() {
        return Err(FsError::NotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(FsError::InvalidPath(format!("{} is not a directory", dir.display())));
    }

    let mut images = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| FsError::from_io(e, dir))? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden || !path.is_file() || !is_supported_image(&path) {
            continue;
        }
        images.push(path);
    }

    images.sort_by_cached_key(|p| {
        p.file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    });

    tracing::debug!("Listed {} images in {}", images.len(), dir.display());
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_supported_image() {
        assert!(is_supported_image(Path::new("test.jpg")));
        assert!(is_supported_image(Path::new("test.PNG")));
        assert!(is_supported_image(Path::new("test.WebP")));
        assert!(!is_supported_image(Path::new("test.txt")));
        assert!(!is_supported_image(Path::new("test")));
    }

    #[test]
    fn test_list_images_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        for name in ["c.png", "B.jpg", "a.gif", "notes.txt", ".hidden.png"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(dir.path().join("sub.png")).unwrap();

        let names: Vec<String> = list_images(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.gif", "B.jpg", "c.png"]);
    }

    #[test]
    fn test_list_images_missing_dir() {
        let result = list_images("/nonexistent-iris-dir");
        assert!(matches!(result, Err(FsError::NotFound(_))));
    }
}
