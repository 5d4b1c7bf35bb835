//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Listen address must split into host and port
//! - Interval hours must be positive when interval mode is selected
//! - Release repository must be `owner/name`
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function over the parsed config

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{AutoUpdateMode, EnvironmentConfig, Setting};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Split a listen address into host and port. Bracketed IPv6 is required.
pub fn split_host_port(address: &str) -> Option<(String, u16)> {
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Some((addr.ip().to_string(), addr.port()));
    }
    let (host, port) = address.rsplit_once(':')?;
    if host.contains(':') {
        return None;
    }
    let port = port.parse().ok()?;
    Some((host.to_string(), port))
}

pub fn validate_environment(config: &EnvironmentConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if split_host_port(&config.address).is_none() {
        errors.push(ValidationError {
            field: "address",
            message: format!("'{}' is not a host:port pair", config.address),
        });
    }
    if config.config.as_os_str().is_empty() {
        errors.push(ValidationError {
            field: "config",
            message: "config directory must not be empty".to_string(),
        });
    }
    if let Some(addr) = &config.observability.metrics_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError {
                field: "observability.metrics_address",
                message: format!("'{}' is not a socket address", addr),
            });
        }
    }

    if let Some(repo) = &config.release_repo {
        if !is_repo_slug(repo) {
            errors.push(ValidationError {
                field: "release_repo",
                message: format!("'{}' is not an owner/name pair", repo),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_repo_slug(repo: &str) -> bool {
    matches!(repo.split_once('/'), Some((owner, name))
        if !owner.is_empty() && !name.is_empty() && !name.contains('/'))
}

pub fn validate_setting(setting: &Setting) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if setting.rule_list_auto_update_mode == AutoUpdateMode::AutoUpdateAtIntervals
        && setting.rule_list_auto_update_interval_hours == 0
    {
        errors.push(ValidationError {
            field: "rule_list_auto_update_interval_hours",
            message: "must be at least 1 in interval mode".to_string(),
        });
    }
    if setting.subscription_auto_update_mode == AutoUpdateMode::AutoUpdateAtIntervals
        && setting.subscription_auto_update_interval_hours == 0
    {
        errors.push(ValidationError {
            field: "subscription_auto_update_interval_hours",
            message: "must be at least 1 in interval mode".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
