//! First-run configuration and asset bootstrap.
//!
//! # Responsibilities
//! - Create the configuration directory
//! - Migrate a legacy JSON configuration, or seed defaults
//! - Write the default engine configuration if none exists
//! - Fetch missing geo data assets when an engine binary is installed
//!
//! # Design Decisions
//! - Only failing to seed defaults is fatal; everything else degrades
//!   with a warning
//! - Legacy candidates are a plain list so tests can point at temp files

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::config::loader::{load_configuration, ConfigError};
use crate::config::{Configuration, EnvironmentConfig, APP_NAME};
use crate::engine::assets::{ensure_geo_assets, AssetDownloader, AssetLocator};
use crate::engine::ProxyEngine;
use crate::storage::{ConfigStore, StoreError};

/// File name of the configuration written by older releases.
pub const LEGACY_FILE_NAME: &str = "proxy-manager.json";

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("failed to seed default configuration: {0}")]
    Seed(#[source] StoreError),
}

#[derive(Debug, Error)]
enum MigrationError {
    #[error(transparent)]
    Read(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Legacy configuration locations, in the order they are tried.
pub fn legacy_candidates(config_dir: &Path) -> Vec<PathBuf> {
    vec![
        config_dir.join(LEGACY_FILE_NAME),
        PathBuf::from("/etc/v2ray").join(LEGACY_FILE_NAME),
        PathBuf::from("/etc").join(APP_NAME).join(LEGACY_FILE_NAME),
    ]
}

pub struct Bootstrap {
    store: Arc<dyn ConfigStore>,
    engine: Arc<dyn ProxyEngine>,
    assets: Arc<dyn AssetLocator>,
    downloader: Option<AssetDownloader>,
    store_path: PathBuf,
    legacy: Vec<PathBuf>,
}

impl Bootstrap {
    pub fn new(
        env: &EnvironmentConfig,
        store: Arc<dyn ConfigStore>,
        engine: Arc<dyn ProxyEngine>,
        assets: Arc<dyn AssetLocator>,
    ) -> Self {
        let downloader = match AssetDownloader::new() {
            Ok(d) => Some(d),
            Err(e) => {
                tracing::warn!(error = %e, "Asset downloads disabled");
                None
            }
        };
        Self {
            store,
            engine,
            assets,
            downloader,
            store_path: env.store_path(),
            legacy: legacy_candidates(&env.config),
        }
    }

    pub fn with_legacy_candidates(mut self, candidates: Vec<PathBuf>) -> Self {
        self.legacy = candidates;
        self
    }

    pub fn with_downloader(mut self, downloader: Option<AssetDownloader>) -> Self {
        self.downloader = downloader;
        self
    }

    pub async fn init_configure(&self) -> Result<(), BootstrapError> {
        self.ensure_config_dir();

        if !self.store.configuration_exists() && !self.migrate_legacy() {
            tracing::info!("Initialising default configuration");
            self.store
                .set_configuration(&Configuration::default())
                .map_err(BootstrapError::Seed)?;
        }

        let engine_config = self.assets.config_path();
        if !engine_config.exists() {
            if let Err(e) = self
                .engine
                .write_config(&self.engine.default_config_template())
            {
                tracing::warn!(path = %engine_config.display(), error = %e, "Failed to write default engine config");
            }
        }

        if self.engine.binary_path().is_ok() {
            if let Some(downloader) = &self.downloader {
                ensure_geo_assets(self.assets.as_ref(), downloader).await;
            }
        }

        Ok(())
    }

    fn ensure_config_dir(&self) {
        let Some(dir) = self.store_path.parent() else {
            return;
        };
        if dir.exists() {
            return;
        }
        if let Err(e) = create_private_dir(dir) {
            tracing::warn!(path = %dir.display(), error = %e, "Failed to create config directory");
        }
    }

    /// Try each legacy candidate in order. Returns whether one was applied.
    fn migrate_legacy(&self) -> bool {
        for candidate in &self.legacy {
            if !candidate.exists() {
                continue;
            }
            tracing::info!(path = %candidate.display(), "Migrating legacy configuration");
            match self.migrate(candidate) {
                Ok(()) => {
                    tracing::info!("Migration complete");
                    return true;
                }
                Err(e) => tracing::warn!(path = %candidate.display(), error = %e, "Migration failed"),
            }
        }
        false
    }

    fn migrate(&self, path: &Path) -> Result<(), MigrationError> {
        let cfg = load_configuration(path)?;
        self.store.set_configuration(&cfg)?;
        Ok(())
    }

    /// Print the startup banner.
    pub fn hello(&self) {
        let binary = self
            .engine
            .binary_path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let cwd = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_default();

        println!("Asset directory is {}", self.assets.location_path().display());
        println!("Engine binary is {binary}");
        println!("{APP_NAME} working directory is {cwd}");
        println!("Version: {}", env!("CARGO_PKG_VERSION"));
        println!("Starting...");
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o750).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)
}
