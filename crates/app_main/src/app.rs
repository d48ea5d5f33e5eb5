//! Stdin front end for the viewer core

use anyhow::Result;
use app_core::{
    Collaborators, Command, CommandParseError, CoreHandle, LiveTextStatus, Outcome,
    SlideshowAction, Thumbnail, ViewerConfig, ViewerCore,
};
use app_fs::FileWatcher;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

const WATCH_DEBOUNCE: Duration = Duration::from_millis(300);
const WATCH_POLL: Duration = Duration::from_millis(200);

pub async fn run(config: ViewerConfig, paths: Vec<PathBuf>, slideshow: bool) -> Result<()> {
    let collaborators = Collaborators::system(&config);
    let (core, completions) = ViewerCore::new(config.clone(), collaborators)?;
    let (handle, task) = app_core::spawn(core, completions);
    let watcher = DirectoryWatcher::start(handle.clone())?;

    if !paths.is_empty() {
        submit(&handle, &watcher, Command::Open(paths)).await;
    }
    if slideshow {
        submit(&handle, &watcher, Command::Slideshow(SlideshowAction::Start)).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }

        match parse_line(&config, line) {
            Ok(cmd) => submit(&handle, &watcher, cmd).await,
            Err(e) => println!("error: {}", e),
        }
    }

    watcher.stop();
    drop(handle);
    task.await?;
    tracing::info!("Iris exiting");
    Ok(())
}

/// A command id with its argument, or a key from the keybinding table
fn parse_line(config: &ViewerConfig, line: &str) -> Result<Command, CommandParseError> {
    match Command::parse(line) {
        Err(CommandParseError::UnknownCommand(id)) => match config.command_for_key(line) {
            Some(bound) => Command::parse(bound),
            None => Err(CommandParseError::UnknownCommand(id)),
        },
        other => other,
    }
}

async fn submit(handle: &CoreHandle, watcher: &DirectoryWatcher, cmd: Command) {
    let opens = matches!(cmd, Command::Open(_));

    match handle.send(cmd).await {
        Ok(outcome) => println!("{}", describe(outcome).await),
        Err(e) => {
            tracing::debug!("Command failed: {:?}", e);
            println!("error: {}", e.user_message());
        }
    }

    if opens {
        if let Ok(Outcome::Status(status)) = handle.send(Command::Status).await {
            if let Some(dir) = status.directory {
                watcher.watch(dir);
            }
        }
    }
}

/// One line of output for an outcome. Live text is awaited.
async fn describe(outcome: Outcome) -> String {
    match outcome {
        Outcome::Done => "ok".to_string(),
        Outcome::Navigated(info) => match info.position {
            Some(i) => format!("{}/{}", i + 1, info.total),
            None => "empty".to_string(),
        },
        Outcome::Scale(scale) => format!("{:.0}%", scale * 100.0),
        Outcome::Rotation(rotation) => format!("rotation {}", rotation.degrees()),
        Outcome::Renamed(path) => format!("renamed to {}", path.display_name()),
        Outcome::Opened(count) => format!("opened {} images", count),
        Outcome::Slideshow(state) => format!("slideshow {:?}", state).to_lowercase(),
        Outcome::Text(mut handle) => {
            let result = handle.wait().await;
            match &result.status {
                LiveTextStatus::Ready if result.regions.is_empty() => "no text".to_string(),
                LiveTextStatus::Ready => result.text(),
                LiveTextStatus::Failed(failure) => format!("no text: {:?}", failure),
                LiveTextStatus::Pending => "pending".to_string(),
            }
        }
        Outcome::Thumbnail(None) => "thumbnail pending".to_string(),
        Outcome::Thumbnail(Some(Thumbnail::Broken)) => "thumbnail broken".to_string(),
        Outcome::Thumbnail(Some(Thumbnail::Ready(image))) => {
            format!("thumbnail {}x{}", image.width, image.height)
        }
        Outcome::Info(summary) if summary.is_empty() => "no metadata".to_string(),
        Outcome::Info(summary) => format!("{:#?}", summary),
        Outcome::Status(status) => {
            let active = status
                .active
                .as_ref()
                .map(|e| e.name.clone())
                .unwrap_or_else(|| "-".to_string());
            let position = status
                .navigation
                .position
                .map(|i| format!("{}/{}", i + 1, status.navigation.total))
                .unwrap_or_else(|| "0/0".to_string());
            format!(
                "{} {} scale {:.0}% slideshow {:?} thumbnails {}/{} busy {}",
                position,
                active,
                status.scale * 100.0,
                status.slideshow,
                status.thumbnails.items,
                status.thumbnails.max_items,
                status.busy
            )
        }
    }
}

/// Runs the file watcher on its own thread and forwards its events
struct DirectoryWatcher {
    dirs: mpsc::Sender<PathBuf>,
    thread: JoinHandle<()>,
}

impl DirectoryWatcher {
    fn start(handle: CoreHandle) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<PathBuf>();
        let thread = std::thread::Builder::new()
            .name("fs-watcher".into())
            .spawn(move || {
                let mut watcher = match FileWatcher::new(WATCH_DEBOUNCE) {
                    Ok(watcher) => watcher,
                    Err(e) => {
                        tracing::warn!("File watcher unavailable: {}", e);
                        return;
                    }
                };

                loop {
                    match rx.recv_timeout(WATCH_POLL) {
                        Ok(dir) => {
                            if let Err(e) = watcher.watch(&dir) {
                                tracing::warn!("Cannot watch {}: {}", dir.display(), e);
                            }
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }

                    for event in watcher.poll_events() {
                        if handle.post(Command::External(event)).is_err() {
                            return;
                        }
                    }
                }
            })?;

        Ok(Self { dirs: tx, thread })
    }

    fn watch(&self, dir: PathBuf) {
        if self.dirs.send(dir).is_err() {
            tracing::debug!("File watcher thread has exited");
        }
    }

    /// Disconnect and join the watcher thread
    fn stop(self) {
        let Self { dirs, thread } = self;
        drop(dirs);
        if thread.join().is_err() {
            tracing::warn!("File watcher thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use app_core::Target;

    #[test]
    fn test_parse_line_accepts_ids_and_keys() {
        let config = ViewerConfig::default();
        assert_eq!(parse_line(&config, "nav.next_item").unwrap(), Command::Next);
        assert_eq!(parse_line(&config, "Right").unwrap(), Command::Next);
        assert_eq!(
            parse_line(&config, "Delete").unwrap(),
            Command::Delete(Target::Active)
        );
        assert!(matches!(
            parse_line(&config, "no.such_command"),
            Err(CommandParseError::UnknownCommand(_))
        ));
    }

    #[tokio::test]
    async fn test_describe_navigation() {
        let info = app_core::NavigationInfo {
            position: Some(0),
            total: 3,
            has_next: true,
            has_previous: true,
            at_first: true,
            at_last: false,
        };
        assert_eq!(describe(Outcome::Navigated(info)).await, "1/3");
        assert_eq!(describe(Outcome::Scale(1.5)).await, "150%");
    }
}
