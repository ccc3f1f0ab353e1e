use super::DaemonEvent;
use crate::error::Result;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Reference-counted per-file watches. A file included by several indexed
/// composites is registered once with the OS and tracked by count; change
/// notifications land in the daemon's event queue.
pub struct WatchPool {
    watcher: RecommendedWatcher,
    refs: HashMap<PathBuf, usize>,
}

impl WatchPool {
    pub fn new(events: mpsc::UnboundedSender<DaemonEvent>) -> Result<Self> {
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let Ok(event) = res else { return };
                if matches!(event.kind, EventKind::Access(_)) {
                    return;
                }
                for path in event.paths {
                    let _ = events.send(DaemonEvent::FileChanged(path));
                }
            },
            Config::default(),
        )?;
        Ok(WatchPool {
            watcher,
            refs: HashMap::new(),
        })
    }

    pub fn watch(&mut self, path: &Path) {
        let count = self.refs.entry(path.to_path_buf()).or_insert(0);
        *count += 1;
        if *count == 1 {
            if let Err(err) = self.watcher.watch(path, RecursiveMode::NonRecursive) {
                tracing::warn!("failed to watch {}: {}", path.display(), err);
            }
        }
    }

    pub fn unwatch(&mut self, path: &Path) {
        match self.refs.get_mut(path) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.refs.remove(path);
                let _ = self.watcher.unwatch(path);
            }
            None => {}
        }
    }

    /// Drop a watch no matter how many composites held it. Used when an
    /// event arrives for a file no Database references any more.
    pub fn unwatch_all(&mut self, path: &Path) {
        if self.refs.remove(path).is_some() {
            let _ = self.watcher.unwatch(path);
        }
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        self.refs.contains_key(path)
    }
}
