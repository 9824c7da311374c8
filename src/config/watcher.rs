//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config as NotifyConfig, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::Config;

/// A watcher that monitors the configuration file for changes.
///
/// Both writes and removals trigger a reload attempt: atomic-save editors
/// replace the file with a remove/rename pair, and the recreated file must
/// win. When the reload finds the file missing or malformed, the previous
/// configuration stays in force.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<Config>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher.
    ///
    /// Returns the watcher and a receiver for configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<Config>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching in a background thread.
    ///
    /// The returned watcher must be kept alive for events to keep flowing.
    /// The parent directory is watched (not the file itself) so the watch
    /// survives the file being replaced.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let path = self.path.clone();
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = event.kind.is_modify()
                        || event.kind.is_create()
                        || event.kind.is_remove();
                    if !relevant || !event.paths.iter().any(|p| is_config_file(p, &path)) {
                        return;
                    }
                    match load_config(&path) {
                        Ok(new_config) => {
                            tracing::info!("Config file change detected, reloading...");
                            let _ = tx.send(new_config);
                        }
                        Err(e) if e.is_not_found() => {
                            // Mid atomic save; the create/rename event for the
                            // new file follows.
                            tracing::debug!(path = %path.display(), "Config file missing, keeping current configuration");
                        }
                        Err(e) => {
                            tracing::error!("Failed to reload config: {}. Keeping current configuration.", e);
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            NotifyConfig::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}

/// Event paths may be absolute while the configured path is relative (or the
/// reverse), so compare by file name.
fn is_config_file(event_path: &Path, config_path: &Path) -> bool {
    match (event_path.file_name(), config_path.file_name()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn reload_flows_through_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"DefaultAction": "allow"}"#).unwrap();

        let (watcher, mut rx) = ConfigWatcher::new(&path);
        let _guard = watcher.run().unwrap();

        fs::write(&path, r#"{"DefaultAction": "deny"}"#).unwrap();

        let updated = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("no config update observed")
            .expect("update channel closed");
        assert_eq!(updated.default_action, crate::rules::Action::Deny);
    }

    #[tokio::test]
    async fn unrelated_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{}").unwrap();

        let (watcher, mut rx) = ConfigWatcher::new(&path);
        let _guard = watcher.run().unwrap();

        fs::write(dir.path().join("other.json"), r#"{"DefaultAction": "deny"}"#).unwrap();

        let res = tokio::time::timeout(Duration::from_millis(1500), rx.recv()).await;
        assert!(res.is_err(), "unrelated file must not trigger a reload");
    }
}
