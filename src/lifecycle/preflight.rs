//! Environment preflight checks.
//!
//! # Responsibilities
//! - Refuse unsupported platforms and missing privileges
//! - Handle the one-shot credential reset
//! - Make sure the management port is free
//! - Probe transparent-proxy support (informational only)
//!
//! # Design Decisions
//! - Fatal conditions are returned as [`PreflightError`]; only `main` exits
//! - The privilege probe and OS name are injectable for tests

use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::config::validation::split_host_port;
use crate::config::{EnvironmentConfig, APP_NAME};
use crate::engine::ProxyEngine;
use crate::net::PortInspector;
use crate::storage::{ConfigStore, StoreError};

#[derive(Debug, Error)]
pub enum PreflightError {
    #[error(
        "Please execute this program with sudo or as a root user for the best experience.\n\
         If you don't want to run as root, use the --passcheckroot parameter to skip the check.\n\
         For example:\n\
         $ {app} --passcheckroot --config ~/.config/{app}",
        app = APP_NAME
    )]
    NotRoot,

    #[error("failed to reset accounts: {0}")]
    ResetAccounts(#[source] StoreError),

    #[error("invalid listen address '{0}'")]
    Address(String),

    #[error("Port {port} is occupied by {name}/{pid}")]
    PortOccupied { port: u16, name: String, pid: u32 },
}

/// Outcome of a successful preflight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preflight {
    /// Start the daemon.
    Continue,
    /// Stop now with the given exit status.
    Exit(i32),
}

fn effective_root() -> bool {
    nix::unistd::Uid::effective().is_root()
}

pub struct PreflightChecker<'a> {
    env: &'a EnvironmentConfig,
    store: &'a dyn ConfigStore,
    ports: &'a dyn PortInspector,
    engine: &'a dyn ProxyEngine,
    is_root: fn() -> bool,
    os: &'static str,
}

impl<'a> PreflightChecker<'a> {
    pub fn new(
        env: &'a EnvironmentConfig,
        store: &'a dyn ConfigStore,
        ports: &'a dyn PortInspector,
        engine: &'a dyn ProxyEngine,
    ) -> Self {
        Self {
            env,
            store,
            ports,
            engine,
            is_root: effective_root,
            os: std::env::consts::OS,
        }
    }

    pub fn with_root_probe(mut self, is_root: fn() -> bool) -> Self {
        self.is_root = is_root;
        self
    }

    pub fn with_os(mut self, os: &'static str) -> Self {
        self.os = os;
        self
    }

    pub async fn check_environment(&self) -> Result<Preflight, PreflightError> {
        if self.os == "windows" {
            println!("{APP_NAME} cannot run on windows");
            println!("Press any key to continue...");
            let _ = io::stdout().flush();
            let mut line = String::new();
            let _ = io::stdin().lock().read_line(&mut line);
            return Ok(Preflight::Exit(1));
        }

        if (!self.env.pass_check_root || self.env.reset_password) && !(self.is_root)() {
            return Err(PreflightError::NotRoot);
        }

        if self.env.reset_password {
            self.store
                .reset_accounts()
                .map_err(PreflightError::ResetAccounts)?;
            println!("It will work after you restart {APP_NAME}");
            return Ok(Preflight::Exit(0));
        }

        self.check_port()?;

        if let Err(e) = self.engine.probe_transparent_capability().await {
            tracing::info!(error = %e, "Transparent proxy support unavailable");
        }

        Ok(Preflight::Continue)
    }

    fn check_port(&self) -> Result<(), PreflightError> {
        let (_, port) = split_host_port(&self.env.address)
            .ok_or_else(|| PreflightError::Address(self.env.address.clone()))?;

        // An unreadable socket table cannot prove the port is taken.
        let (occupied, sockets) = match self.ports.is_port_occupied(&[format!("{port}:tcp")]) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(port, error = %e, "Could not inspect listening sockets");
                return Ok(());
            }
        };
        if !occupied {
            return Ok(());
        }

        match sockets.iter().find_map(|s| s.process()) {
            Some(owner) => Err(PreflightError::PortOccupied {
                port,
                name: owner.name.clone(),
                pid: owner.pid,
            }),
            None => {
                tracing::debug!(port, "Port is bound but its owner is unknown, continuing");
                Ok(())
            }
        }
    }
}
