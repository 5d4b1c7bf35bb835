//! Configuration schema definitions.
//!
//! Two families of types live here:
//! - [`EnvironmentConfig`]: process-level settings fixed at startup (CLI, env, TOML).
//! - [`Configuration`]: the persisted daemon state owned by the config store.
//!
//! All types derive Serde traits; missing fields fall back to defaults.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Name used in banners, legacy file names and default paths.
pub const APP_NAME: &str = "proxy-manager";

/// Process-level configuration for the daemon.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Management API listen address (e.g., "0.0.0.0:2017").
    pub address: String,

    /// Directory holding the persistent configuration store.
    pub config: PathBuf,

    /// Skip the root privilege check.
    pub pass_check_root: bool,

    /// Reset stored credentials and exit.
    pub reset_password: bool,

    /// Directory holding engine data assets (geoip.dat, geosite.dat).
    pub asset_dir: PathBuf,

    /// Explicit path of the proxy engine binary. Searched in PATH when unset.
    pub engine_bin: Option<PathBuf>,

    /// Engine configuration file written before every engine start.
    pub engine_config: PathBuf,

    /// Transparent-proxy hook commands.
    pub transparent: TransparentHookConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Bearer key required by the management API. Open API when unset.
    pub api_key: Option<String>,

    /// GitHub `owner/name` whose latest release is compared against this
    /// build. Release checks are skipped when unset.
    pub release_repo: Option<String>,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:2017".to_string(),
            config: PathBuf::from("/etc/proxy-manager"),
            pass_check_root: false,
            reset_password: false,
            asset_dir: PathBuf::from("/usr/share/v2ray"),
            engine_bin: None,
            engine_config: PathBuf::from("/etc/proxy-manager/engine.json"),
            transparent: TransparentHookConfig::default(),
            observability: ObservabilityConfig::default(),
            api_key: None,
            release_repo: None,
        }
    }
}

impl EnvironmentConfig {
    /// Path of the JSON store inside the config directory.
    pub fn store_path(&self) -> PathBuf {
        self.config.join("store.json")
    }
}

/// Shell commands that install or remove transparent forwarding rules.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TransparentHookConfig {
    /// Run after the engine starts while transparent mode is enabled.
    pub setup_command: Option<String>,

    /// Run to remove forwarding rules.
    pub teardown_command: Option<String>,

    /// Run once at startup to probe kernel support (e.g., TPROXY module).
    pub probe_command: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Prometheus exporter bind address. Metrics are not exported when unset.
    pub metrics_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_address: None,
        }
    }
}

/// Persisted daemon state.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Configuration {
    /// Update and routing settings.
    pub setting: Setting,

    /// Ordered subscriptions; the index is the subscription ID.
    pub subscriptions: Vec<Subscription>,

    /// Management accounts.
    pub accounts: Vec<Account>,

    /// Whether the engine was running when the daemon last stopped.
    pub running: bool,

    /// Version of the locally installed rule list.
    pub rule_list_version: Option<String>,
}

/// A subscription source.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Subscription {
    /// Source URL.
    pub address: String,

    /// Display name.
    pub remarks: Option<String>,

    /// Share links fetched on the last successful update.
    pub nodes: Vec<String>,

    /// Unix timestamp of the last successful update.
    pub updated_at: Option<u64>,
}

impl Subscription {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }
}

/// A management account.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Account {
    pub username: String,
    pub password_hash: String,
}

/// Automatic update policy for one data category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoUpdateMode {
    /// Never update automatically.
    #[default]
    #[serde(rename = "none")]
    Off,
    /// Update once after the network comes up.
    AutoUpdate,
    /// Update after the network comes up, then every N hours.
    AutoUpdateAtIntervals,
}

impl AutoUpdateMode {
    /// True for both enabled modes.
    pub fn is_enabled(self) -> bool {
        !matches!(self, AutoUpdateMode::Off)
    }
}

/// Transparent proxy mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransparentMode {
    #[default]
    Close,
    Proxy,
    Whitelist,
    Gfwlist,
}

/// Rule-port routing mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RulePortMode {
    #[default]
    Whitelist,
    Gfwlist,
    Custom,
}

/// Update and routing settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Setting {
    pub rule_list_auto_update_mode: AutoUpdateMode,
    pub rule_list_auto_update_interval_hours: u64,
    pub subscription_auto_update_mode: AutoUpdateMode,
    pub subscription_auto_update_interval_hours: u64,
    pub transparent: TransparentMode,
    pub rule_port_mode: RulePortMode,
}

impl Default for Setting {
    fn default() -> Self {
        Self {
            rule_list_auto_update_mode: AutoUpdateMode::AutoUpdate,
            rule_list_auto_update_interval_hours: 12,
            subscription_auto_update_mode: AutoUpdateMode::Off,
            subscription_auto_update_interval_hours: 12,
            transparent: TransparentMode::Close,
            rule_port_mode: RulePortMode::Whitelist,
        }
    }
}
