//! Network probing subsystem.
//!
//! # Data Flow
//! ```text
//! Preflight:
//!     listen address → "port:tcp" token
//!     → ports.rs (proc tables → socket inode → owning process)
//!
//! Readiness gate:
//!     well-known host name
//!     → dns.rs (Resolver trait, system resolver)
//! ```
//!
//! # Design Decisions
//! - Both probes sit behind traits so lifecycle code is testable without
//!   touching the host network stack

pub mod dns;
pub mod ports;

pub use dns::{Resolver, SystemResolver};
pub use ports::{OccupiedSocket, PortError, PortInspector, ProcNetInspector, ProcessInfo};
