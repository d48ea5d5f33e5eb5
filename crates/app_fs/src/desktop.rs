//! Desktop services: wallpaper, printing and file-manager reveal

use crate::{is_supported_image, FsError, Result};
use std::path::Path;
use std::process::Command;
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
use url::Url;

/// OS-level desktop collaborators used by the file controller.
pub trait DesktopServices: Send + Sync {
    fn set_wallpaper(&self, path: &Path) -> Result<()>;

    /// Show the file selected in the system file manager
    fn reveal(&self, path: &Path) -> Result<()>;

    fn print(&self, path: &Path) -> Result<()>;
}

/// Extensions the common desktop environments accept as wallpaper
const WALLPAPER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

/// Spawns the platform tools for each service
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDesktop;

impl SystemDesktop {
    pub fn new() -> Self {
        Self
    }

    fn run(mut cmd: Command, what: &str) -> Result<()> {
        let status = cmd
            .status()
            .map_err(|e| FsError::Io(std::io::Error::new(e.kind(), format!("{}: {}", what, e))))?;
        if status.success() {
            Ok(())
        } else {
            Err(FsError::Io(std::io::Error::other(format!("{} exited with {}", what, status))))
        }
    }

    /// Percent-encoded `file://` URI for an absolute path
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    fn file_uri(path: &Path) -> Result<String> {
        Url::from_file_path(path)
            .map(String::from)
            .map_err(|()| FsError::InvalidPath(path.display().to_string()))
    }

    #[cfg(target_os = "linux")]
    fn apply_wallpaper(path: &Path) -> Result<()> {
        let uri = Self::file_uri(path)?;
        for key in ["picture-uri", "picture-uri-dark"] {
            let mut cmd = Command::new("gsettings");
            cmd.args(["set", "org.gnome.desktop.background", key, &uri]);
            Self::run(cmd, "gsettings")?;
        }
        Ok(())
    }

    #[cfg(target_os = "macos")]
    fn apply_wallpaper(path: &Path) -> Result<()> {
        let script = format!(
            "tell application \"System Events\" to tell every desktop to set picture to \"{}\"",
            path.display()
        );
        let mut cmd = Command::new("osascript");
        cmd.args(["-e", &script]);
        Self::run(cmd, "osascript")
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    fn apply_wallpaper(_path: &Path) -> Result<()> {
        Err(FsError::Io(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "wallpaper service not available on this platform",
        )))
    }
}

impl DesktopServices for SystemDesktop {
    fn set_wallpaper(&self, path: &Path) -> Result<()> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if !WALLPAPER_EXTENSIONS.contains(&ext.as_str()) {
            return Err(FsError::UnsupportedFormat(ext));
        }
        if !path.exists() {
            return Err(FsError::NotFound(path.to_path_buf()));
        }

        Self::apply_wallpaper(path)?;
        tracing::info!("Wallpaper set: {}", path.display());
        Ok(())
    }

    #[cfg(target_os = "windows")]
    fn reveal(&self, path: &Path) -> Result<()> {
        let mut cmd = Command::new("explorer");
        cmd.arg("/select,").arg(path);
        // Explorer returns a non-zero code even on success
        cmd.spawn()
            .map_err(|e| FsError::Io(std::io::Error::new(e.kind(), format!("explorer: {}", e))))?;
        tracing::info!("Revealed in Explorer: {}", path.display());
        Ok(())
    }

    #[cfg(target_os = "macos")]
    fn reveal(&self, path: &Path) -> Result<()> {
        let mut cmd = Command::new("open");
        cmd.arg("-R").arg(path);
        Self::run(cmd, "open -R")?;
        tracing::info!("Revealed in Finder: {}", path.display());
        Ok(())
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    fn reveal(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(FsError::NotFound(path.to_path_buf()));
        }

        // FileManager1 selects the file; without it open the folder instead
        let mut cmd = Command::new("dbus-send");
        cmd.args([
            "--session",
            "--print-reply",
            "--dest=org.freedesktop.FileManager1",
            "/org/freedesktop/FileManager1",
            "org.freedesktop.FileManager1.ShowItems",
        ])
        .arg(format!("array:string:{}", Self::file_uri(path)?))
        .arg("string:");

        match Self::run(cmd, "dbus-send") {
            Ok(()) => {}
            Err(e) => {
                tracing::debug!("FileManager1 unavailable ({}), opening folder", e);
                let folder = path.parent().unwrap_or(path);
                open_folder(folder)?;
            }
        }

        tracing::info!("Revealed in file manager: {}", path.display());
        Ok(())
    }

    fn print(&self, path: &Path) -> Result<()> {
        if !is_supported_image(path) {
            return Err(FsError::UnsupportedFormat(path.display().to_string()));
        }

        #[cfg(unix)]
        {
            let mut cmd = Command::new("lp");
            cmd.arg(path);
            Self::run(cmd, "lp")?;
            tracing::info!("Sent to printer: {}", path.display());
            Ok(())
        }

        #[cfg(not(unix))]
        {
            Err(FsError::Io(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "print service not available on this platform",
            )))
        }
    }
}

#[cfg(all(feature = "open-external", not(any(target_os = "windows", target_os = "macos"))))]
fn open_folder(folder: &Path) -> Result<()> {
    open::that(folder).map_err(|e| FsError::Io(std::io::Error::new(e.kind(), e.to_string())))
}

#[cfg(all(not(feature = "open-external"), not(any(target_os = "windows", target_os = "macos"))))]
fn open_folder(folder: &Path) -> Result<()> {
    let mut cmd = Command::new("xdg-open");
    cmd.arg(folder);
    SystemDesktop::run(cmd, "xdg-open")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallpaper_rejects_unsupported_format() {
        let desktop = SystemDesktop::new();
        let result = desktop.set_wallpaper(Path::new("/tmp/animation.gif"));
        assert!(matches!(result, Err(FsError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_wallpaper_missing_file() {
        let desktop = SystemDesktop::new();
        let result = desktop.set_wallpaper(Path::new("/nonexistent-iris/wall.png"));
        assert!(matches!(result, Err(FsError::NotFound(_))));
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    #[test]
    fn test_file_uri_is_percent_encoded() {
        let uri = SystemDesktop::file_uri(Path::new("/photos/summer 2024/#1 100%.png")).unwrap();
        assert_eq!(uri, "file:///photos/summer%202024/%231%20100%25.png");

        let relative = SystemDesktop::file_uri(Path::new("photos/a.png"));
        assert!(matches!(relative, Err(FsError::InvalidPath(_))));
    }

    #[test]
    fn test_print_rejects_non_image() {
        let desktop = SystemDesktop::new();
        assert!(matches!(
            desktop.print(Path::new("/tmp/notes.txt")),
            Err(FsError::UnsupportedFormat(_))
        ));
    }
}
