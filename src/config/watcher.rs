//! Configuration file watcher for hot reload.
//!
//! # Data Flow
//! ```text
//! notify thread ──► event for our file? ──► reload task
//! reload task   ──► quiet period ──► load_config ──► update channel
//! ```
//!
//! # Design Decisions
//! - The parent directory is watched so saves that replace the file by
//!   rename are still seen; events naming other files are dropped
//! - One save usually yields several events; they are coalesced until no
//!   event arrives for the debounce period, then the file is read once
//! - A file that fails to load is logged and skipped; the receiver keeps
//!   the configuration it already has

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::loader::load_config;
use crate::config::schema::DispatchConfig;
use crate::observability::metrics;

/// Quiet period after the last file event before reloading.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Watches one configuration file and sends every valid new version.
pub struct ConfigWatcher {
    path: PathBuf,
    debounce: Duration,
    update_tx: mpsc::UnboundedSender<DispatchConfig>,
}

/// Keeps the watch alive. Dropping it stops the notify watcher and the
/// reload task.
pub struct WatchGuard {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<DispatchConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                debounce: DEFAULT_DEBOUNCE,
                update_tx,
            },
            update_rx,
        )
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching. Must be called inside a Tokio runtime, which runs
    /// the reload task.
    pub fn run(self) -> Result<WatchGuard, notify::Error> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| notify::Error::generic("config watcher requires a Tokio runtime"))?;

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let watched = self.path.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if concerns(&event, &watched) => {
                    if event_tx.send(()).is_err() {
                        tracing::trace!(path = ?watched, "Reload task gone, event dropped");
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, debounce_ms = self.debounce.as_millis() as u64, "Config watcher started");
        let task = runtime.spawn(reload_loop(self.path, self.debounce, event_rx, self.update_tx));
        Ok(WatchGuard {
            _watcher: watcher,
            task,
        })
    }
}

/// Whether `event` changes the file at `path`.
fn concerns(event: &Event, path: &Path) -> bool {
    if !(event.kind.is_modify() || event.kind.is_create()) {
        return false;
    }
    let Some(name) = path.file_name() else {
        return false;
    };
    event.paths.iter().any(|p| p.file_name() == Some(name))
}

async fn reload_loop(
    path: PathBuf,
    debounce: Duration,
    mut events: mpsc::UnboundedReceiver<()>,
    updates: mpsc::UnboundedSender<DispatchConfig>,
) {
    while events.recv().await.is_some() {
        while let Ok(Some(())) = tokio::time::timeout(debounce, events.recv()).await {}

        tracing::info!(path = ?path, "Config file change detected, reloading");
        let config = match load_config(&path) {
            Ok(config) => config,
            Err(e) => {
                metrics::record_reload(false);
                tracing::error!(error = %e, "Failed to reload config, keeping current configuration");
                continue;
            }
        };
        metrics::record_reload(true);
        if updates.send(config).is_err() {
            tracing::warn!(path = ?path, "Config update receiver closed, stopping watcher");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};
    use notify::EventKind;

    #[test]
    fn test_concerns_only_the_watched_file() {
        let path = Path::new("/etc/dispatch/dispatch.toml");
        let modify = |p: &str| Event::new(EventKind::Modify(ModifyKind::Any)).add_path(PathBuf::from(p));

        assert!(concerns(&modify("/etc/dispatch/dispatch.toml"), path));
        assert!(!concerns(&modify("/etc/dispatch/other.toml"), path));
        assert!(concerns(
            &Event::new(EventKind::Create(CreateKind::File)).add_path(path.to_path_buf()),
            path
        ));
        assert!(!concerns(
            &Event::new(EventKind::Access(AccessKind::Any)).add_path(path.to_path_buf()),
            path
        ));
    }

    #[tokio::test]
    async fn test_burst_of_events_reloads_once() {
        let dir = std::env::temp_dir().join(format!("soap-dispatch-watch-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("dispatch.toml");
        std::fs::write(&path, "[[templates]]\nname = \"a\"\ntemplate = \"/a\"\n").unwrap();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (update_tx, mut update_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(reload_loop(path, Duration::from_millis(50), event_rx, update_tx));
        for _ in 0..5 {
            event_tx.send(()).unwrap();
        }

        let config = tokio::time::timeout(Duration::from_secs(2), update_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(config.templates.len(), 1);
        assert!(tokio::time::timeout(Duration::from_millis(200), update_rx.recv())
            .await
            .is_err());

        drop(event_tx);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_receiver_stops_reloading() {
        let dir = std::env::temp_dir().join(format!("soap-dispatch-closed-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("dispatch.toml");
        std::fs::write(&path, "").unwrap();

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        drop(update_rx);
        let task = tokio::spawn(reload_loop(path, Duration::from_millis(10), event_rx, update_tx));
        event_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
    }
}
