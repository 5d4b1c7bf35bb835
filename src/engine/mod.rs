//! Proxy engine collaborator.
//!
//! # Data Flow
//! ```text
//! Coordinator / Scheduler
//!     → ProxyEngine trait (apply config, stop, transparent forwarding)
//!     → process.rs (child process + hook commands)
//!
//! Bootstrap
//!     → assets.rs (asset presence, upstream download)
//! ```
//!
//! # Design Decisions
//! - Config generation and protocol details stay behind the trait
//! - Transparent forwarding is delegated to operator-supplied hook commands

pub mod assets;
pub mod process;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

use crate::storage::StoreError;

pub use assets::{AssetDownloader, AssetError, AssetLocator, FsAssets};
pub use process::ProcessEngine;

/// Binary names searched in PATH when no explicit engine binary is configured.
pub const ENGINE_BINARY_NAMES: &[&str] = &["v2ray", "xray"];

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine binary not found (looked for {0})")]
    BinaryNotFound(String),

    #[error("engine I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("hook `{command}` exited with {status}")]
    Hook { command: String, status: String },

    #[error("engine exited immediately with {0}")]
    ExitedEarly(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Operations the orchestrator needs from the proxy engine.
#[async_trait]
pub trait ProxyEngine: Send + Sync {
    /// Regenerate the engine configuration and (re)start the engine.
    async fn apply_configuration(&self) -> Result<(), EngineError>;

    /// Stop the engine. `force` skips the graceful termination window.
    async fn stop_service(&self, force: bool) -> Result<(), EngineError>;

    /// Remove any transparent forwarding rules left in place.
    async fn stop_transparent_forwarding(&self) -> Result<(), EngineError>;

    /// Check whether the kernel supports transparent forwarding.
    async fn probe_transparent_capability(&self) -> Result<(), EngineError>;

    /// Contents written when no engine configuration exists yet.
    fn default_config_template(&self) -> Vec<u8>;

    fn write_config(&self, bytes: &[u8]) -> Result<(), EngineError>;

    fn binary_path(&self) -> Result<PathBuf, EngineError>;
}

/// Resolve the engine binary: the explicit path if given, else the first hit in PATH.
pub fn resolve_binary(explicit: Option<&Path>) -> Result<PathBuf, EngineError> {
    if let Some(path) = explicit {
        return if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(EngineError::BinaryNotFound(path.display().to_string()))
        };
    }

    let search = std::env::var_os("PATH").unwrap_or_default();
    for dir in std::env::split_paths(&search) {
        for name in ENGINE_BINARY_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
    }
    Err(EngineError::BinaryNotFound(ENGINE_BINARY_NAMES.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_binary_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("v2ray");
        assert!(matches!(
            resolve_binary(Some(&bin)),
            Err(EngineError::BinaryNotFound(_))
        ));

        std::fs::write(&bin, b"#!/bin/sh\n").unwrap();
        assert_eq!(resolve_binary(Some(&bin)).unwrap(), bin);
    }
}
