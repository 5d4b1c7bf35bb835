//! Persistent configuration storage.
//!
//! # Responsibilities
//! - Report whether persisted configuration exists
//! - Read and replace the whole [`Configuration`]
//! - Targeted mutations used by updaters and the API
//! - Close the handle during shutdown
//!
//! # Design Decisions
//! - The trait is synchronous: every implementation is local and small
//! - Targeted mutations are default methods built on `modify`

pub mod json_store;

use thiserror::Error;

use crate::config::{Configuration, Setting, Subscription};

pub use json_store::JsonFileStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("store contents are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration has not been initialised")]
    NotInitialised,

    #[error("subscription {0} does not exist")]
    NoSuchSubscription(usize),

    #[error("store is closed")]
    Closed,
}

/// Access to the persisted daemon configuration.
pub trait ConfigStore: Send + Sync {
    /// Whether a configuration has been persisted.
    fn configuration_exists(&self) -> bool;

    /// Snapshot of the persisted configuration.
    fn configuration(&self) -> Result<Configuration, StoreError>;

    /// Replace the persisted configuration.
    fn set_configuration(&self, cfg: &Configuration) -> Result<(), StoreError>;

    /// Apply an in-place edit and persist the result.
    fn modify(&self, edit: &mut dyn FnMut(&mut Configuration)) -> Result<(), StoreError>;

    /// Flush and release the store.
    fn close(&self) -> Result<(), StoreError>;

    fn subscriptions(&self) -> Vec<Subscription> {
        self.configuration()
            .map(|cfg| cfg.subscriptions)
            .unwrap_or_default()
    }

    fn setting(&self) -> Setting {
        self.configuration().map(|cfg| cfg.setting).unwrap_or_default()
    }

    fn set_setting(&self, setting: Setting) -> Result<(), StoreError> {
        self.modify(&mut |cfg| cfg.setting = setting.clone())
    }

    fn is_running(&self) -> bool {
        self.configuration().map(|cfg| cfg.running).unwrap_or(false)
    }

    fn set_running(&self, running: bool) -> Result<(), StoreError> {
        self.modify(&mut |cfg| cfg.running = running)
    }

    /// Drop every management account so the next login re-registers.
    ///
    /// A store that was never initialised has no accounts to drop.
    fn reset_accounts(&self) -> Result<(), StoreError> {
        match self.modify(&mut |cfg| cfg.accounts.clear()) {
            Err(StoreError::NotInitialised) => Ok(()),
            other => other,
        }
    }

    fn set_rule_list_version(&self, version: &str) -> Result<(), StoreError> {
        self.modify(&mut |cfg| cfg.rule_list_version = Some(version.to_string()))
    }

    /// Store freshly fetched nodes for the subscription at `index`.
    fn update_subscription_nodes(
        &self,
        index: usize,
        nodes: Vec<String>,
        updated_at: u64,
    ) -> Result<(), StoreError> {
        let mut found = false;
        let mut nodes = Some(nodes);
        self.modify(&mut |cfg| {
            if let Some(sub) = cfg.subscriptions.get_mut(index) {
                sub.nodes = nodes.take().unwrap_or_default();
                sub.updated_at = Some(updated_at);
                found = true;
            }
        })?;
        if found {
            Ok(())
        } else {
            Err(StoreError::NoSuchSubscription(index))
        }
    }
}
