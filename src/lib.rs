//! proxy-manager: lifecycle and background-update orchestration for a
//! proxy engine daemon.

// Core subsystems
pub mod config;
pub mod engine;
pub mod net;
pub mod storage;

// Background work
pub mod update;

// Cross-cutting concerns
pub mod admin;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::{Configuration, EnvironmentConfig, Setting};
pub use lifecycle::{Coordinator, Shutdown};
pub use update::Scheduler;
