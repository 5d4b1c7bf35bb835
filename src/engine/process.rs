//! Engine process management.
//!
//! # Responsibilities
//! - Write the engine configuration file
//! - Spawn and stop the engine child process
//! - Run transparent forwarding hooks
//!
//! # Design Decisions
//! - Graceful stop sends SIGTERM and waits before killing
//! - Stopping never clears the persisted `running` flag, so the engine
//!   comes back on the next daemon start

use std::fs;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::{EnvironmentConfig, TransparentMode};
use crate::config::schema::TransparentHookConfig;
use crate::engine::{resolve_binary, EngineError, ProxyEngine};
use crate::storage::ConfigStore;

/// Time the engine gets to exit after SIGTERM.
const STOP_GRACE: Duration = Duration::from_secs(3);

/// Time after spawn during which an exit counts as a failed start.
const START_SETTLE: Duration = Duration::from_millis(300);

/// Runs the proxy engine as a child process.
pub struct ProcessEngine {
    bin: Option<PathBuf>,
    config_path: PathBuf,
    asset_dir: PathBuf,
    hooks: TransparentHookConfig,
    store: Arc<dyn ConfigStore>,
    child: Mutex<Option<Child>>,
    transparent_active: AtomicBool,
}

impl ProcessEngine {
    pub fn new(env: &EnvironmentConfig, store: Arc<dyn ConfigStore>) -> Self {
        Self {
            bin: env.engine_bin.clone(),
            config_path: env.engine_config.clone(),
            asset_dir: env.asset_dir.clone(),
            hooks: env.transparent.clone(),
            store,
            child: Mutex::new(None),
            transparent_active: AtomicBool::new(false),
        }
    }

    async fn run_hook(command: &str) -> Result<(), EngineError> {
        tracing::debug!(command, "Running hook");
        let status = Command::new("sh").arg("-c").arg(command).status().await?;
        if status.success() {
            Ok(())
        } else {
            Err(EngineError::Hook {
                command: command.to_string(),
                status: status.to_string(),
            })
        }
    }

    async fn terminate(child: &mut Child, force: bool) {
        if !force {
            if let Some(pid) = child.id() {
                let pid = nix::unistd::Pid::from_raw(pid as i32);
                if nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM).is_ok()
                    && tokio::time::timeout(STOP_GRACE, child.wait()).await.is_ok()
                {
                    return;
                }
                tracing::warn!("Engine ignored SIGTERM, killing");
            }
        }
        if let Err(e) = child.kill().await {
            tracing::debug!(error = %e, "Engine already exited");
        }
    }
}

#[async_trait]
impl ProxyEngine for ProcessEngine {
    async fn apply_configuration(&self) -> Result<(), EngineError> {
        let bin = self.binary_path()?;
        if !self.config_path.exists() {
            self.write_config(&self.default_config_template())?;
        }

        let mut slot = self.child.lock().await;
        if let Some(mut previous) = slot.take() {
            Self::terminate(&mut previous, false).await;
        }

        let mut child = Command::new(&bin)
            .arg("run")
            .arg("-c")
            .arg(&self.config_path)
            .env("V2RAY_LOCATION_ASSET", &self.asset_dir)
            .env("XRAY_LOCATION_ASSET", &self.asset_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        tokio::time::sleep(START_SETTLE).await;
        if let Some(status) = child.try_wait()? {
            return Err(EngineError::ExitedEarly(status.to_string()));
        }

        tracing::info!(bin = %bin.display(), pid = ?child.id(), "Engine started");
        *slot = Some(child);
        drop(slot);

        self.store.set_running(true)?;

        if self.store.setting().transparent != TransparentMode::Close {
            if let Some(cmd) = &self.hooks.setup_command {
                Self::run_hook(cmd).await?;
                self.transparent_active.store(true, Ordering::Release);
            }
        }
        Ok(())
    }

    async fn stop_service(&self, force: bool) -> Result<(), EngineError> {
        let mut slot = self.child.lock().await;
        match slot.take() {
            Some(mut child) => {
                Self::terminate(&mut child, force).await;
                tracing::info!(force, "Engine stopped");
            }
            None => tracing::debug!("Engine not running, nothing to stop"),
        }
        Ok(())
    }

    async fn stop_transparent_forwarding(&self) -> Result<(), EngineError> {
        let was_active = self.transparent_active.swap(false, Ordering::AcqRel);
        match &self.hooks.teardown_command {
            Some(cmd) => {
                Self::run_hook(cmd).await?;
                tracing::debug!(was_active, "Transparent forwarding removed");
            }
            None if was_active => {
                tracing::warn!("Transparent forwarding was active but no teardown hook is configured");
            }
            None => {}
        }
        Ok(())
    }

    async fn probe_transparent_capability(&self) -> Result<(), EngineError> {
        match &self.hooks.probe_command {
            Some(cmd) => Self::run_hook(cmd).await,
            None => Ok(()),
        }
    }

    fn default_config_template(&self) -> Vec<u8> {
        let template = serde_json::json!({
            "log": { "loglevel": "warning" },
            "inbounds": [],
            "outbounds": [
                { "tag": "direct", "protocol": "freedom" }
            ]
        });
        serde_json::to_vec_pretty(&template).unwrap_or_default()
    }

    fn write_config(&self, bytes: &[u8]) -> Result<(), EngineError> {
        if let Some(dir) = self.config_path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.config_path, bytes)?;
        Ok(())
    }

    fn binary_path(&self) -> Result<PathBuf, EngineError> {
        resolve_binary(self.bin.as_deref())
    }
}
