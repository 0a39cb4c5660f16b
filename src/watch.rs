// Config file watcher for hot reload
//
// notify delivers events on its own thread; we forward them over a channel
// and drain it once per frame.

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::Path;
use std::sync::mpsc;

pub struct ConfigWatcher {
    /// Kept alive for as long as events are wanted
    _watcher: RecommendedWatcher,
    event_rx: mpsc::Receiver<notify::Event>,
    file_name: OsString,
}

impl ConfigWatcher {
    /// Watch the directory holding `path` so editors that replace the file
    /// (write to temp, rename) are still noticed
    pub fn new(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .with_context(|| format!("Config path {:?} has no file name", path))?
            .to_os_string();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let (tx, rx) = mpsc::channel::<notify::Event>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => log::warn!("Config watcher error: {}", e),
            }
        })
        .context("Failed to create config watcher")?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {:?}", dir))?;
        log::info!("Watching {:?} for config changes", path);

        Ok(Self {
            _watcher: watcher,
            event_rx: rx,
            file_name,
        })
    }

    /// Drain pending events; true if any of them touched the config file
    pub fn poll(&self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.event_rx.try_recv() {
            changed |= touches_file(&event, &self.file_name);
        }
        changed
    }
}

fn touches_file(event: &notify::Event, file_name: &OsString) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use notify::Event;
    use std::path::PathBuf;

    fn name() -> OsString {
        OsString::from("config.toml")
    }

    #[test]
    fn modify_of_config_file_counts() {
        let event = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/tmp/app/config.toml"));
        assert!(touches_file(&event, &name()));
    }

    #[test]
    fn create_after_rename_counts() {
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("config.toml"));
        assert!(touches_file(&event, &name()));
    }

    #[test]
    fn other_files_and_removals_are_ignored() {
        let other = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/tmp/app/camera.toml"));
        assert!(!touches_file(&other, &name()));

        let removed = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/tmp/app/config.toml"));
        assert!(!touches_file(&removed, &name()));
    }
}
