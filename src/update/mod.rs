//! Background update subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (after bootstrap):
//!     scheduler.rs check_update()
//!         → engine: stop transparent forwarding
//!         → readiness.rs (poll DNS every 5s until resolved)
//!         → timer.rs (two disarmed recurring timers + tick loops)
//!         → reset timers for interval mode, spawn one-shot passes
//!         → version.rs (weekly release check)
//!
//! Every subscription pass:
//!     subscriptions.rs → pool.rs (2 permits, fan-out / fan-in)
//!         → Updater::update_subscription(index)
//! ```
//!
//! # Design Decisions
//! - Timers start disarmed (100-year period) and are reset, never recreated
//! - Per-item failures are logged and contained; nothing here escalates
//! - Loops stop on the shared shutdown token; in-flight passes finish

pub mod http;
pub mod pool;
pub mod readiness;
pub mod scheduler;
pub mod subscriptions;
pub mod timer;
pub mod version;

use async_trait::async_trait;
use thiserror::Error;

use crate::engine::AssetError;
use crate::storage::StoreError;

pub use http::HttpUpdater;
pub use pool::BoundedPool;
pub use readiness::ReadinessGate;
pub use scheduler::{Scheduler, UpdateCategory};
pub use subscriptions::{update_subscriptions, UPDATE_CONCURRENCY};
pub use timer::{RecurringTimer, Ticker, DISARMED_PERIOD};
pub use version::{GithubReleaseChecker, RemoteVersion};

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} answered {status}")]
    Status { url: String, status: u16 },

    #[error("subscription {0} does not exist")]
    NoSuchSubscription(usize),

    #[error("invalid subscription address: {0}")]
    InvalidAddress(String),

    #[error("subscription {0} returned no nodes")]
    EmptySubscription(usize),

    #[error("failed to parse version: {0}")]
    VersionParse(#[from] semver::Error),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Refreshes subscription and rule-list data.
#[async_trait]
pub trait Updater: Send + Sync {
    /// Re-fetch the subscription at `index`. `forced` bypasses freshness checks.
    async fn update_subscription(&self, index: usize, forced: bool) -> Result<(), UpdateError>;

    /// Bring the rule list up to date, returning the installed version.
    async fn update_rule_list(&self) -> Result<String, UpdateError>;
}

/// Looks for a newer daemon release.
#[async_trait]
pub trait ReleaseChecker: Send + Sync {
    /// Returns whether a newer release exists and its version string.
    async fn check_for_newer_release(&self) -> Result<(bool, String), UpdateError>;
}
