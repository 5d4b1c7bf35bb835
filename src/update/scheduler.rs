//! Periodic update scheduler.
//!
//! # Responsibilities
//! - Own the rule-list and subscription timers and their tick loops
//! - Arm the timers from the stored settings once the network is ready
//! - Run the weekly release check and hold its latest result
//! - Rearm timers when settings change at runtime
//!
//! # Design Decisions
//! - Timers are created disarmed and only ever reset, so the tick loops
//!   have no start/stop state of their own
//! - Every loop exits on the shutdown token; a pass already running when
//!   the token fires is allowed to finish

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio_util::sync::CancellationToken;

use crate::config::{AutoUpdateMode, RulePortMode, Setting, TransparentMode};
use crate::engine::ProxyEngine;
use crate::observability::metrics;
use crate::storage::ConfigStore;
use crate::update::readiness::ReadinessGate;
use crate::update::subscriptions;
use crate::update::timer::{RecurringTimer, Ticker};
use crate::update::version::RemoteVersion;
use crate::update::{ReleaseChecker, Updater};

/// Fixed period of the release check.
pub const VERSION_CHECK_PERIOD: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// The two user-configurable update categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateCategory {
    RuleList,
    Subscription,
}

impl std::fmt::Display for UpdateCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateCategory::RuleList => f.write_str("rule list"),
            UpdateCategory::Subscription => f.write_str("subscriptions"),
        }
    }
}

struct Timers {
    rule_list: RecurringTimer,
    subscription: RecurringTimer,
}

impl Timers {
    fn get(&self, category: UpdateCategory) -> &RecurringTimer {
        match category {
            UpdateCategory::RuleList => &self.rule_list,
            UpdateCategory::Subscription => &self.subscription,
        }
    }
}

pub struct Scheduler {
    store: Arc<dyn ConfigStore>,
    engine: Arc<dyn ProxyEngine>,
    updater: Arc<dyn Updater>,
    releases: Arc<dyn ReleaseChecker>,
    gate: ReadinessGate,
    shutdown: CancellationToken,
    timers: OnceLock<Timers>,
    remote: ArcSwap<RemoteVersion>,
    applied: ArcSwap<Setting>,
    version_check_period: Duration,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        engine: Arc<dyn ProxyEngine>,
        updater: Arc<dyn Updater>,
        releases: Arc<dyn ReleaseChecker>,
        gate: ReadinessGate,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            engine,
            updater,
            releases,
            gate,
            shutdown,
            timers: OnceLock::new(),
            remote: ArcSwap::from_pointee(RemoteVersion::default()),
            applied: ArcSwap::from_pointee(Setting::default()),
            version_check_period: VERSION_CHECK_PERIOD,
        }
    }

    pub fn with_version_check_period(mut self, period: Duration) -> Self {
        self.version_check_period = period;
        self
    }

    pub fn is_started(&self) -> bool {
        self.timers.get().is_some()
    }

    /// Latest release check result.
    pub fn remote_version(&self) -> RemoteVersion {
        RemoteVersion::clone(&self.remote.load())
    }

    /// Current period of a category's timer, `None` before [`Scheduler::start`].
    pub fn timer_period(&self, category: UpdateCategory) -> Option<Duration> {
        self.timers.get().map(|t| t.get(category).period())
    }

    /// Create both timers disarmed and spawn their tick loops.
    ///
    /// Returns `false` if the scheduler was already started.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut created = false;
        let timers = self.timers.get_or_init(|| {
            created = true;
            Timers {
                rule_list: RecurringTimer::disarmed(),
                subscription: RecurringTimer::disarmed(),
            }
        });
        if !created {
            return false;
        }

        self.spawn_tick_loop(UpdateCategory::RuleList, timers.rule_list.ticker());
        self.spawn_tick_loop(UpdateCategory::Subscription, timers.subscription.ticker());
        tracing::debug!("Update timers started");
        true
    }

    fn spawn_tick_loop(self: &Arc<Self>, category: UpdateCategory, mut ticker: Ticker) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = this.shutdown.cancelled() => break,
                    tick = ticker.tick() => {
                        if tick.is_none() {
                            break;
                        }
                        tracing::debug!(%category, "Update timer fired");
                        match category {
                            UpdateCategory::RuleList => {
                                if let Err(e) = this.run_rule_list_update().await {
                                    tracing::info!(error = %e, "[AutoUpdate] Rule list update failed");
                                }
                            }
                            UpdateCategory::Subscription => this.update_subscriptions().await,
                        }
                    }
                }
            }
            tracing::debug!(%category, "Update loop stopped");
        });
    }

    /// Startup update pass.
    ///
    /// Waits for the network, arms the timers from the stored settings,
    /// kicks off the immediate updates and the release check loop.
    pub async fn check_update(self: &Arc<Self>) {
        if let Err(e) = self.engine.stop_transparent_forwarding().await {
            tracing::warn!(error = %e, "Failed to stop transparent forwarding");
        }

        self.gate.wait().await;
        self.start();
        // Settings saved while waiting for the network were not applied yet.
        let setting = self.store.setting();
        self.applied.store(Arc::new(setting.clone()));

        let rule_mode = setting.rule_list_auto_update_mode;
        if rule_mode.is_enabled() || setting.transparent == TransparentMode::Gfwlist {
            if rule_mode == AutoUpdateMode::AutoUpdateAtIntervals {
                self.reset_interval(
                    UpdateCategory::RuleList,
                    setting.rule_list_auto_update_interval_hours,
                );
            }
            if setting.rule_port_mode != RulePortMode::Custom {
                let this = Arc::clone(self);
                tokio::spawn(async move {
                    match this.run_rule_list_update().await {
                        Ok(version) => tracing::info!(%version, "Rule list updated"),
                        Err(e) => tracing::warn!(error = %e, "Failed to update rule list"),
                    }
                });
            }
        }

        let sub_mode = setting.subscription_auto_update_mode;
        if sub_mode.is_enabled() {
            if sub_mode == AutoUpdateMode::AutoUpdateAtIntervals {
                self.reset_interval(
                    UpdateCategory::Subscription,
                    setting.subscription_auto_update_interval_hours,
                );
            }
            let this = Arc::clone(self);
            tokio::spawn(async move { this.update_subscriptions().await });
        }

        self.spawn_version_loop();
    }

    fn spawn_version_loop(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.version_check_period);
            loop {
                tokio::select! {
                    _ = this.shutdown.cancelled() => break,
                    _ = interval.tick() => this.check_release().await,
                }
            }
        });
    }

    fn reset_interval(&self, category: UpdateCategory, hours: u64) -> bool {
        let Some(timers) = self.timers.get() else {
            return false;
        };
        if hours == 0 {
            tracing::warn!(%category, "Update interval of 0 hours ignored");
            return false;
        }
        let period = Duration::from_secs(hours.saturating_mul(3600));
        timers.get(category).reset(period);
        tracing::info!(%category, hours, "Update interval armed");
        true
    }

    /// Apply a new mode and interval to a started scheduler.
    ///
    /// Interval mode resets the timer to the new period; the other modes
    /// disarm it. Returns whether a timer was changed.
    pub fn rearm(&self, category: UpdateCategory, mode: AutoUpdateMode, hours: u64) -> bool {
        let Some(timers) = self.timers.get() else {
            return false;
        };
        match mode {
            AutoUpdateMode::AutoUpdateAtIntervals => self.reset_interval(category, hours),
            AutoUpdateMode::AutoUpdate | AutoUpdateMode::Off => {
                let timer = timers.get(category);
                if !timer.is_armed() {
                    return false;
                }
                timer.disarm();
                tracing::info!(%category, "Update interval disarmed");
                true
            }
        }
    }

    /// Rearm whichever categories differ from the last applied setting.
    pub fn apply_setting(&self, setting: &Setting) {
        if !self.is_started() {
            return;
        }
        let previous = self.applied.swap(Arc::new(setting.clone()));

        if previous.rule_list_auto_update_mode != setting.rule_list_auto_update_mode
            || previous.rule_list_auto_update_interval_hours
                != setting.rule_list_auto_update_interval_hours
        {
            self.rearm(
                UpdateCategory::RuleList,
                setting.rule_list_auto_update_mode,
                setting.rule_list_auto_update_interval_hours,
            );
        }

        if previous.subscription_auto_update_mode != setting.subscription_auto_update_mode
            || previous.subscription_auto_update_interval_hours
                != setting.subscription_auto_update_interval_hours
        {
            self.rearm(
                UpdateCategory::Subscription,
                setting.subscription_auto_update_mode,
                setting.subscription_auto_update_interval_hours,
            );
        }
    }

    /// One rule-list update, returning the installed version.
    pub async fn run_rule_list_update(&self) -> Result<String, crate::update::UpdateError> {
        self.updater.update_rule_list().await
    }

    /// One full subscription pass.
    pub async fn update_subscriptions(&self) {
        subscriptions::update_subscriptions(self.store.as_ref(), Arc::clone(&self.updater)).await;
    }

    /// Run the release check once and record a successful result.
    pub async fn check_release(&self) {
        match self.releases.check_for_newer_release().await {
            Ok((found_new, remote_version)) => {
                if found_new {
                    tracing::info!(%remote_version, "Newer release available");
                }
                metrics::record_remote_version(found_new);
                self.remote.store(Arc::new(RemoteVersion {
                    found_new,
                    remote_version,
                }));
            }
            Err(e) => tracing::debug!(error = %e, "Release check failed"),
        }
    }
}
