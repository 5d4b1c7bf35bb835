//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     preflight.rs (platform, privileges, port) → maybe exit
//!     bootstrap.rs (config dir, migration, engine config, assets)
//!
//! Run (coordinator.rs):
//!     engine restart if it was running
//!     API service ─┐
//!                  ├→ completion signal (first outcome wins)
//!     signals.rs ──┘
//!
//! Shutdown:
//!     cancel background loops → stop transparent forwarding
//!     → stop engine → close store
//! ```
//!
//! # Design Decisions
//! - Ordered startup: checks first, then state, then services
//! - Ordered shutdown: loops, forwarding, engine, storage
//! - Only the API service can turn into a non-zero exit at run time

pub mod bootstrap;
pub mod coordinator;
pub mod preflight;
pub mod shutdown;
pub mod signals;

pub use bootstrap::{Bootstrap, BootstrapError};
pub use coordinator::{ApiService, Coordinator, LifecycleError, ServiceError};
pub use preflight::{Preflight, PreflightChecker, PreflightError};
pub use shutdown::{completion, CompletionReceiver, CompletionSender, Shutdown};
