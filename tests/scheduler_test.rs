//! Periodic scheduling behavior.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{
    CallLog, CountingUpdater, FixedRelease, MemoryStore, ReadyResolver, RecordingEngine,
    SwitchableResolver,
};
use proxy_manager::config::{
    AutoUpdateMode, Configuration, RulePortMode, Setting, Subscription, TransparentMode,
};
use proxy_manager::lifecycle::Shutdown;
use proxy_manager::storage::ConfigStore;
use proxy_manager::update::{ReadinessGate, Scheduler, UpdateCategory, DISARMED_PERIOD};

const HOUR: Duration = Duration::from_secs(3600);

struct Fixture {
    scheduler: Arc<Scheduler>,
    updater: Arc<CountingUpdater>,
    releases: Arc<FixedRelease>,
    log: CallLog,
    shutdown: Shutdown,
}

fn fixture(setting: Setting, subscriptions: usize) -> Fixture {
    let cfg = Configuration {
        setting,
        subscriptions: (0..subscriptions)
            .map(|i| Subscription::new(format!("https://sub{i}.example/")))
            .collect(),
        ..Configuration::default()
    };
    let log = CallLog::default();
    let store = Arc::new(MemoryStore::with(cfg));
    let engine = Arc::new(RecordingEngine::logging_to(log.clone()));
    let updater = Arc::new(CountingUpdater::default());
    let releases = Arc::new(FixedRelease::new(true, "9.9.9"));
    let shutdown = Shutdown::new();

    let scheduler = Arc::new(Scheduler::new(
        store,
        engine,
        updater.clone(),
        releases.clone(),
        ReadinessGate::new(Arc::new(ReadyResolver)),
        shutdown.subscribe(),
    ));

    Fixture {
        scheduler,
        updater,
        releases,
        log,
        shutdown,
    }
}

fn interval_setting(rule_hours: u64, sub_hours: u64) -> Setting {
    Setting {
        rule_list_auto_update_mode: AutoUpdateMode::AutoUpdateAtIntervals,
        rule_list_auto_update_interval_hours: rule_hours,
        subscription_auto_update_mode: AutoUpdateMode::AutoUpdateAtIntervals,
        subscription_auto_update_interval_hours: sub_hours,
        ..Setting::default()
    }
}

fn disabled_setting() -> Setting {
    Setting {
        rule_list_auto_update_mode: AutoUpdateMode::Off,
        subscription_auto_update_mode: AutoUpdateMode::Off,
        ..Setting::default()
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn interval_modes_reset_both_timers() {
    let f = fixture(interval_setting(6, 3), 2);
    f.scheduler.check_update().await;
    settle().await;

    assert_eq!(f.scheduler.timer_period(UpdateCategory::RuleList), Some(6 * HOUR));
    assert_eq!(f.scheduler.timer_period(UpdateCategory::Subscription), Some(3 * HOUR));
    assert_eq!(f.log.position("engine.stop_transparent_forwarding"), Some(0));

    // One immediate pass of each.
    assert_eq!(f.updater.rule_list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(f.updater.subscription_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn interval_tick_runs_another_pass() {
    let f = fixture(interval_setting(24, 1), 2);
    f.scheduler.check_update().await;
    settle().await;
    assert_eq!(f.updater.subscription_calls.load(Ordering::SeqCst), 2);

    tokio::time::sleep(HOUR).await;
    settle().await;
    assert_eq!(f.updater.subscription_calls.load(Ordering::SeqCst), 4);
    assert_eq!(f.updater.rule_list_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn disabled_modes_leave_timers_disarmed() {
    let f = fixture(disabled_setting(), 3);
    f.scheduler.check_update().await;
    settle().await;

    assert_eq!(f.scheduler.timer_period(UpdateCategory::RuleList), Some(DISARMED_PERIOD));
    assert_eq!(
        f.scheduler.timer_period(UpdateCategory::Subscription),
        Some(DISARMED_PERIOD)
    );
    assert_eq!(f.updater.rule_list_calls.load(Ordering::SeqCst), 0);
    assert_eq!(f.updater.subscription_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn gfwlist_transparent_mode_forces_rule_update() {
    let setting = Setting {
        transparent: TransparentMode::Gfwlist,
        ..disabled_setting()
    };
    let f = fixture(setting, 0);
    f.scheduler.check_update().await;
    settle().await;

    assert_eq!(f.updater.rule_list_calls.load(Ordering::SeqCst), 1);
    assert_eq!(f.scheduler.timer_period(UpdateCategory::RuleList), Some(DISARMED_PERIOD));
}

#[tokio::test(start_paused = true)]
async fn custom_rule_port_mode_skips_immediate_update() {
    let setting = Setting {
        rule_port_mode: RulePortMode::Custom,
        ..interval_setting(2, 2)
    };
    let f = fixture(setting, 0);
    f.scheduler.check_update().await;
    settle().await;

    assert_eq!(f.updater.rule_list_calls.load(Ordering::SeqCst), 0);
    assert_eq!(f.scheduler.timer_period(UpdateCategory::RuleList), Some(2 * HOUR));
}

#[tokio::test(start_paused = true)]
async fn zero_interval_is_not_applied() {
    let f = fixture(interval_setting(0, 0), 0);
    f.scheduler.check_update().await;

    assert_eq!(f.scheduler.timer_period(UpdateCategory::RuleList), Some(DISARMED_PERIOD));
    assert_eq!(
        f.scheduler.timer_period(UpdateCategory::Subscription),
        Some(DISARMED_PERIOD)
    );
}

#[tokio::test(start_paused = true)]
async fn release_check_is_recorded() {
    let f = fixture(disabled_setting(), 0);
    assert!(!f.scheduler.remote_version().found_new);

    f.scheduler.check_update().await;
    settle().await;

    let remote = f.scheduler.remote_version();
    assert!(remote.found_new);
    assert_eq!(remote.remote_version, "9.9.9");
    assert_eq!(f.releases.calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(7 * 24 * 3600)).await;
    settle().await;
    assert_eq!(f.releases.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn rearm_before_start_is_ignored() {
    let f = fixture(disabled_setting(), 0);
    assert!(!f.scheduler.rearm(
        UpdateCategory::Subscription,
        AutoUpdateMode::AutoUpdateAtIntervals,
        4
    ));
    assert_eq!(f.scheduler.timer_period(UpdateCategory::Subscription), None);
}

#[tokio::test(start_paused = true)]
async fn rearm_resets_and_disarms() {
    let f = fixture(disabled_setting(), 1);
    assert!(f.scheduler.start());
    assert!(!f.scheduler.start());

    assert!(f.scheduler.rearm(
        UpdateCategory::Subscription,
        AutoUpdateMode::AutoUpdateAtIntervals,
        4
    ));
    assert_eq!(f.scheduler.timer_period(UpdateCategory::Subscription), Some(4 * HOUR));

    tokio::time::sleep(4 * HOUR).await;
    settle().await;
    assert_eq!(f.updater.subscription_calls.load(Ordering::SeqCst), 1);

    assert!(f.scheduler.rearm(UpdateCategory::Subscription, AutoUpdateMode::Off, 4));
    assert_eq!(
        f.scheduler.timer_period(UpdateCategory::Subscription),
        Some(DISARMED_PERIOD)
    );
    tokio::time::sleep(8 * HOUR).await;
    assert_eq!(f.updater.subscription_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn apply_setting_only_touches_changed_categories() {
    let f = fixture(interval_setting(6, 3), 0);
    f.scheduler.check_update().await;

    let mut changed = interval_setting(6, 3);
    changed.subscription_auto_update_interval_hours = 1;
    f.scheduler.apply_setting(&changed);

    assert_eq!(f.scheduler.timer_period(UpdateCategory::RuleList), Some(6 * HOUR));
    assert_eq!(f.scheduler.timer_period(UpdateCategory::Subscription), Some(HOUR));

    changed.rule_list_auto_update_mode = AutoUpdateMode::AutoUpdate;
    f.scheduler.apply_setting(&changed);
    assert_eq!(f.scheduler.timer_period(UpdateCategory::RuleList), Some(DISARMED_PERIOD));
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_tick_loops() {
    let f = fixture(interval_setting(24, 1), 1);
    f.scheduler.check_update().await;
    settle().await;
    assert_eq!(f.updater.subscription_calls.load(Ordering::SeqCst), 1);

    f.shutdown.trigger();
    settle().await;

    tokio::time::sleep(3 * HOUR).await;
    assert_eq!(f.updater.subscription_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn setting_saved_during_network_wait_is_armed() {
    let store = Arc::new(MemoryStore::with(Configuration {
        setting: disabled_setting(),
        ..Configuration::default()
    }));
    let resolver = Arc::new(SwitchableResolver::default());
    let scheduler = Arc::new(Scheduler::new(
        store.clone(),
        Arc::new(RecordingEngine::default()),
        Arc::new(CountingUpdater::default()),
        Arc::new(FixedRelease::new(false, "0.1.0")),
        ReadinessGate::new(resolver.clone()).with_interval(Duration::from_millis(50)),
        Shutdown::new().subscribe(),
    ));

    let pending = tokio::spawn({
        let scheduler = scheduler.clone();
        async move { scheduler.check_update().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!scheduler.is_started());

    let changed = Setting {
        subscription_auto_update_mode: AutoUpdateMode::AutoUpdateAtIntervals,
        subscription_auto_update_interval_hours: 2,
        ..disabled_setting()
    };
    store.set_setting(changed.clone()).unwrap();
    scheduler.apply_setting(&changed);

    resolver.online.store(true, Ordering::SeqCst);
    pending.await.unwrap();

    assert_eq!(
        scheduler.timer_period(UpdateCategory::Subscription),
        Some(2 * HOUR)
    );
}
