//! Resilience helpers for outbound HTTP.
//!
//! # Data Flow
//! ```text
//! Asset and rule-list downloads:
//!     → request fails
//!     → backoff.rs (jittered delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Attempt counts live with the caller; this module only computes delays
//! - Jitter is up to 10% of the capped delay

pub mod backoff;
