//! JSON file backed configuration store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use crate::config::Configuration;
use crate::storage::{ConfigStore, StoreError};

/// Stores the whole [`Configuration`] as one JSON document.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write never leaves a truncated store behind.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    state: RwLock<Option<Configuration>>,
    closed: AtomicBool,
}

impl JsonFileStore {
    /// Open the store at `path`, loading the existing document if there is one.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let bytes = fs::read(&path)?;
            Some(serde_json::from_slice(&bytes)?)
        } else {
            None
        };

        tracing::debug!(path = %path.display(), exists = state.is_some(), "Config store opened");

        Ok(Self {
            path,
            state: RwLock::new(state),
            closed: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, cfg: &Configuration) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(cfg)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }
}

impl ConfigStore for JsonFileStore {
    fn configuration_exists(&self) -> bool {
        self.state.read().map(|s| s.is_some()).unwrap_or(false)
    }

    fn configuration(&self) -> Result<Configuration, StoreError> {
        let guard = self.state.read().map_err(|_| StoreError::Closed)?;
        guard.clone().ok_or(StoreError::NotInitialised)
    }

    fn set_configuration(&self, cfg: &Configuration) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut guard = self.state.write().map_err(|_| StoreError::Closed)?;
        self.persist(cfg)?;
        *guard = Some(cfg.clone());
        Ok(())
    }

    fn modify(&self, edit: &mut dyn FnMut(&mut Configuration)) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut guard = self.state.write().map_err(|_| StoreError::Closed)?;
        let mut cfg = guard.clone().ok_or(StoreError::NotInitialised)?;
        edit(&mut cfg);
        self.persist(&cfg)?;
        *guard = Some(cfg);
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::debug!(path = %self.path.display(), "Config store closed");
        Ok(())
    }
}
