//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (update counters, in-flight gauge, readiness waits)
//!
//! Consumers:
//!     → stdout (fmt layer)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event instead of formatted messages
//! - Metrics are recorded through the `metrics` facade; recording without
//!   an installed exporter is a no-op

pub mod logging;
pub mod metrics;
