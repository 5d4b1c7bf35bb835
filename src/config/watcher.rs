//! Store file watcher for live settings changes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_configuration;
use crate::config::schema::Setting;
use crate::config::validation::validate_setting;

/// A watcher that monitors the configuration store for settings changes.
pub struct SettingsWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<Setting>,
}

impl SettingsWatcher {
    /// Create a new SettingsWatcher.
    ///
    /// Returns the watcher and a receiver for settings updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<Setting>) {
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
    /// The parent directory is watched because the store replaces its file on every write.
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
                    let relevant = (event.kind.is_modify() || event.kind.is_create())
                        && event.paths.iter().any(|p| p == &path);
                    if !relevant {
                        return;
                    }
                    match load_configuration(&path) {
                        Ok(cfg) => match validate_setting(&cfg.setting) {
                            Ok(()) => {
                                let _ = tx.send(cfg.setting);
                            }
                            Err(errors) => {
                                tracing::warn!(?errors, "Ignoring invalid settings change");
                            }
                        },
                        Err(e) => {
                            tracing::debug!(error = %e, "Store file not readable yet, skipping event");
                        }
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Settings watcher started");
        Ok(watcher)
    }
}
