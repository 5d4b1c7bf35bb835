//! proxy-manager daemon
//!
//! # Architecture Overview
//!
//! ```text
//!   CLI / env / TOML ──▶ EnvironmentConfig
//!                            │
//!                            ▼
//!   preflight ──▶ bootstrap ──▶ coordinator ─────────────┐
//!   (root, port)  (store,        │                       │
//!                  assets)       ├─ API service (axum)   │ first outcome
//!                                ├─ signal listener      ├──▶ shutdown
//!                                │                       │
//!   scheduler.check_update ──────┘                       │
//!     ├─ readiness gate (DNS)                            │
//!     ├─ rule-list timer loop ───┐                       │
//!     ├─ subscription timer loop ├─ cancelled on shutdown┘
//!     └─ weekly release check ───┘
//!
//!   settings watcher (store.json) ──▶ scheduler.apply_setting
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use proxy_manager::admin::{AdminState, ApiServer};
use proxy_manager::config::loader::{load_environment, ConfigError};
use proxy_manager::config::validation::validate_environment;
use proxy_manager::config::watcher::SettingsWatcher;
use proxy_manager::config::EnvironmentConfig;
use proxy_manager::engine::{AssetDownloader, AssetLocator, FsAssets, ProcessEngine, ProxyEngine};
use proxy_manager::lifecycle::{Bootstrap, Coordinator, Preflight, PreflightChecker, Shutdown};
use proxy_manager::net::{ProcNetInspector, SystemResolver};
use proxy_manager::observability::{logging, metrics};
use proxy_manager::storage::{ConfigStore, JsonFileStore};
use proxy_manager::update::{GithubReleaseChecker, HttpUpdater, ReadinessGate, Scheduler};

#[derive(Debug, Parser)]
#[command(name = "proxy-manager", version)]
#[command(about = "Lifecycle and background-update daemon for a proxy engine", long_about = None)]
struct Args {
    /// TOML file with environment settings; flags override it.
    #[arg(long, env = "PROXY_MANAGER_ENV_FILE")]
    env_file: Option<PathBuf>,

    /// Management API listen address.
    #[arg(short, long, env = "PROXY_MANAGER_ADDRESS")]
    address: Option<String>,

    /// Configuration directory.
    #[arg(short, long, env = "PROXY_MANAGER_CONFIG")]
    config: Option<PathBuf>,

    /// Skip the root privilege check.
    #[arg(long = "passcheckroot", env = "PROXY_MANAGER_PASS_CHECK_ROOT")]
    pass_check_root: bool,

    /// Reset management accounts and exit.
    #[arg(long = "reset-password", env = "PROXY_MANAGER_RESET_PASSWORD")]
    reset_password: bool,

    /// Directory holding engine data assets.
    #[arg(long, env = "PROXY_MANAGER_ASSET_DIR")]
    asset_dir: Option<PathBuf>,

    /// Proxy engine binary.
    #[arg(long, env = "PROXY_MANAGER_ENGINE_BIN")]
    engine_bin: Option<PathBuf>,

    /// Engine configuration file.
    #[arg(long, env = "PROXY_MANAGER_ENGINE_CONFIG")]
    engine_config: Option<PathBuf>,

    #[arg(long, env = "PROXY_MANAGER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Prometheus exporter address.
    #[arg(long, env = "PROXY_MANAGER_METRICS_ADDRESS")]
    metrics_address: Option<String>,

    /// Bearer key for the management API.
    #[arg(long, env = "PROXY_MANAGER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// GitHub `owner/name` to check for newer releases.
    #[arg(long, env = "PROXY_MANAGER_RELEASE_REPO")]
    release_repo: Option<String>,
}

impl Args {
    fn into_environment(self) -> Result<EnvironmentConfig, ConfigError> {
        let mut env = match &self.env_file {
            Some(path) => load_environment(path)?,
            None => EnvironmentConfig::default(),
        };

        if let Some(address) = self.address {
            env.address = address;
        }
        if let Some(config) = self.config {
            env.config = config;
        }
        env.pass_check_root |= self.pass_check_root;
        env.reset_password |= self.reset_password;
        if let Some(dir) = self.asset_dir {
            env.asset_dir = dir;
        }
        if self.engine_bin.is_some() {
            env.engine_bin = self.engine_bin;
        }
        if let Some(path) = self.engine_config {
            env.engine_config = path;
        }
        if let Some(level) = self.log_level {
            env.observability.log_level = level;
        }
        if self.metrics_address.is_some() {
            env.observability.metrics_address = self.metrics_address;
        }
        if self.api_key.is_some() {
            env.api_key = self.api_key;
        }
        if self.release_repo.is_some() {
            env.release_repo = self.release_repo;
        }

        validate_environment(&env).map_err(ConfigError::Validation)?;
        Ok(env)
    }
}

#[tokio::main]
async fn main() {
    let env = match Args::parse().into_environment() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    logging::init(&env.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "proxy-manager starting");

    if let Some(addr) = &env.observability.metrics_address {
        match addr.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(metrics_address = %addr, error = %e, "Failed to parse metrics address"),
        }
    }

    match run(env).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

async fn run(env: EnvironmentConfig) -> Result<i32, Box<dyn std::error::Error>> {
    let store: Arc<dyn ConfigStore> = Arc::new(JsonFileStore::open(env.store_path())?);
    let engine: Arc<dyn ProxyEngine> = Arc::new(ProcessEngine::new(&env, Arc::clone(&store)));

    let ports = ProcNetInspector::default();
    let preflight = PreflightChecker::new(&env, store.as_ref(), &ports, engine.as_ref())
        .check_environment()
        .await?;
    if let Preflight::Exit(code) = preflight {
        return Ok(code);
    }

    let assets: Arc<dyn AssetLocator> =
        Arc::new(FsAssets::new(&env.asset_dir, &env.engine_config));
    let bootstrap = Bootstrap::new(&env, Arc::clone(&store), Arc::clone(&engine), Arc::clone(&assets));
    bootstrap.init_configure().await?;
    bootstrap.hello();

    let shutdown = Shutdown::new();

    let updater = Arc::new(HttpUpdater::new(
        Arc::clone(&store),
        AssetDownloader::new()?,
        assets.location_path(),
    )?);
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&store),
        Arc::clone(&engine),
        updater,
        Arc::new(GithubReleaseChecker::new(env.release_repo.as_deref())?),
        ReadinessGate::new(Arc::new(SystemResolver)),
        shutdown.subscribe(),
    ));

    {
        let scheduler = Arc::clone(&scheduler);
        let token = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = scheduler.check_update() => {}
            }
        });
    }

    let (watcher, mut settings) = SettingsWatcher::new(&env.store_path());
    let _watcher = match watcher.run() {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(error = %e, "Settings watcher unavailable, live changes need the API");
            None
        }
    };
    {
        let scheduler = Arc::clone(&scheduler);
        let token = shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    setting = settings.recv() => match setting {
                        Some(setting) => scheduler.apply_setting(&setting),
                        None => break,
                    },
                }
            }
        });
    }

    let api = ApiServer::new(
        env.address.clone(),
        AdminState {
            store: Arc::clone(&store),
            scheduler,
            api_key: env.api_key.as_deref().map(Arc::from),
        },
        shutdown.subscribe(),
    );

    Coordinator::new(store, engine, Arc::new(api), shutdown)
        .run()
        .await?;
    Ok(0)
}
