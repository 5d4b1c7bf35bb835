//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! CLI flags / env vars / optional TOML file
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EnvironmentConfig (immutable for the process lifetime)
//!
//! Persisted daemon state (store.json):
//!     → storage::JsonFileStore owns reads and writes
//!     → watcher.rs detects external edits
//!     → validated Setting forwarded to the scheduler for rearm
//! ```
//!
//! # Design Decisions
//! - Environment config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use schema::{
    Account, AutoUpdateMode, Configuration, EnvironmentConfig, RulePortMode, Setting,
    Subscription, TransparentMode, APP_NAME,
};
