//! Shared stubs for integration tests.

#![allow(dead_code)]

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use tokio::net::TcpListener;

use proxy_manager::config::Configuration;
use proxy_manager::engine::{EngineError, ProxyEngine};
use proxy_manager::lifecycle::{ApiService, ServiceError};
use proxy_manager::net::{OccupiedSocket, PortError, PortInspector, ProcessInfo, Resolver};
use proxy_manager::storage::{ConfigStore, StoreError};
use proxy_manager::update::{ReleaseChecker, UpdateError, Updater};

/// Ordered record of collaborator calls shared between stubs.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, call: impl Into<String>) {
        self.0.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }
}

/// In-memory [`ConfigStore`].
#[derive(Default)]
pub struct MemoryStore {
    pub state: Mutex<Option<Configuration>>,
    pub log: CallLog,
}

impl MemoryStore {
    pub fn with(cfg: Configuration) -> Self {
        Self {
            state: Mutex::new(Some(cfg)),
            log: CallLog::default(),
        }
    }

    pub fn logging_to(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }
}

impl ConfigStore for MemoryStore {
    fn configuration_exists(&self) -> bool {
        self.state.lock().unwrap().is_some()
    }

    fn configuration(&self) -> Result<Configuration, StoreError> {
        self.state
            .lock()
            .unwrap()
            .clone()
            .ok_or(StoreError::NotInitialised)
    }

    fn set_configuration(&self, cfg: &Configuration) -> Result<(), StoreError> {
        self.log.push("store.set_configuration");
        *self.state.lock().unwrap() = Some(cfg.clone());
        Ok(())
    }

    fn modify(&self, edit: &mut dyn FnMut(&mut Configuration)) -> Result<(), StoreError> {
        let mut guard = self.state.lock().unwrap();
        let cfg = guard.as_mut().ok_or(StoreError::NotInitialised)?;
        edit(cfg);
        Ok(())
    }

    fn close(&self) -> Result<(), StoreError> {
        self.log.push("store.close");
        Ok(())
    }
}

/// [`ProxyEngine`] that records calls instead of running anything.
#[derive(Default)]
pub struct RecordingEngine {
    pub log: CallLog,
    pub binary: Option<PathBuf>,
    pub config_written: Mutex<Option<Vec<u8>>>,
}

impl RecordingEngine {
    pub fn logging_to(log: CallLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }
}

#[async_trait]
impl ProxyEngine for RecordingEngine {
    async fn apply_configuration(&self) -> Result<(), EngineError> {
        self.log.push("engine.apply_configuration");
        Ok(())
    }

    async fn stop_service(&self, force: bool) -> Result<(), EngineError> {
        self.log.push(format!("engine.stop_service({force})"));
        Ok(())
    }

    async fn stop_transparent_forwarding(&self) -> Result<(), EngineError> {
        self.log.push("engine.stop_transparent_forwarding");
        Ok(())
    }

    async fn probe_transparent_capability(&self) -> Result<(), EngineError> {
        self.log.push("engine.probe");
        Err(EngineError::BinaryNotFound("probe".into()))
    }

    fn default_config_template(&self) -> Vec<u8> {
        b"{}".to_vec()
    }

    fn write_config(&self, bytes: &[u8]) -> Result<(), EngineError> {
        self.log.push("engine.write_config");
        *self.config_written.lock().unwrap() = Some(bytes.to_vec());
        Ok(())
    }

    fn binary_path(&self) -> Result<PathBuf, EngineError> {
        self.binary
            .clone()
            .ok_or_else(|| EngineError::BinaryNotFound("stub".into()))
    }
}

/// [`Updater`] that tracks how many refreshes run at once.
#[derive(Default)]
pub struct CountingUpdater {
    pub delay: Duration,
    pub current: AtomicUsize,
    pub peak: AtomicUsize,
    pub subscription_calls: AtomicUsize,
    pub rule_list_calls: AtomicUsize,
    pub forced_calls: AtomicUsize,
    pub failing_index: Option<usize>,
}

impl CountingUpdater {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Updater for CountingUpdater {
    async fn update_subscription(&self, index: usize, forced: bool) -> Result<(), UpdateError> {
        if forced {
            self.forced_calls.fetch_add(1, Ordering::SeqCst);
        }
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.subscription_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_index == Some(index) {
            return Err(UpdateError::EmptySubscription(index));
        }
        Ok(())
    }

    async fn update_rule_list(&self) -> Result<String, UpdateError> {
        self.rule_list_calls.fetch_add(1, Ordering::SeqCst);
        Ok("20240101".to_string())
    }
}

/// [`ReleaseChecker`] returning a fixed answer.
pub struct FixedRelease {
    pub found_new: bool,
    pub version: String,
    pub calls: AtomicUsize,
}

impl FixedRelease {
    pub fn new(found_new: bool, version: &str) -> Self {
        Self {
            found_new,
            version: version.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ReleaseChecker for FixedRelease {
    async fn check_for_newer_release(&self) -> Result<(bool, String), UpdateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.found_new, self.version.clone()))
    }
}

/// [`Resolver`] that always resolves.
pub struct ReadyResolver;

#[async_trait]
impl Resolver for ReadyResolver {
    async fn lookup_host(&self, _host: &str) -> io::Result<Vec<IpAddr>> {
        Ok(vec![IpAddr::from([127, 0, 0, 1])])
    }
}

/// Resolver that fails until `online` is set.
#[derive(Default)]
pub struct SwitchableResolver {
    pub online: AtomicBool,
}

#[async_trait]
impl Resolver for SwitchableResolver {
    async fn lookup_host(&self, _host: &str) -> io::Result<Vec<IpAddr>> {
        if self.online.load(Ordering::SeqCst) {
            Ok(vec![IpAddr::from([127, 0, 0, 1])])
        } else {
            Err(io::Error::new(io::ErrorKind::Other, "network unreachable"))
        }
    }
}

/// [`ApiService`] that finishes with a fixed outcome after a delay.
pub struct StubService {
    pub delay: Duration,
    pub fail: bool,
    pub runs: AtomicUsize,
}

impl StubService {
    pub fn ok_after(delay: Duration) -> Self {
        Self {
            delay,
            fail: false,
            runs: AtomicUsize::new(0),
        }
    }

    pub fn failing_after(delay: Duration) -> Self {
        Self {
            delay,
            fail: true,
            runs: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ApiService for StubService {
    async fn run(&self) -> Result<(), ServiceError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail {
            Err(ServiceError::Serve(io::Error::new(
                io::ErrorKind::AddrInUse,
                "listener died",
            )))
        } else {
            Ok(())
        }
    }
}

/// [`PortInspector`] with a canned answer.
pub struct StubPorts {
    pub occupied: bool,
    pub owner: Option<ProcessInfo>,
    pub unreadable: bool,
    pub queried: Mutex<Vec<String>>,
}

impl StubPorts {
    pub fn free() -> Self {
        Self {
            occupied: false,
            owner: None,
            unreadable: false,
            queried: Mutex::new(Vec::new()),
        }
    }

    pub fn held_by(name: &str, pid: u32) -> Self {
        Self {
            occupied: true,
            owner: Some(ProcessInfo {
                name: name.to_string(),
                pid,
            }),
            unreadable: false,
            queried: Mutex::new(Vec::new()),
        }
    }
}

impl PortInspector for StubPorts {
    fn is_port_occupied(&self, tokens: &[String]) -> Result<(bool, Vec<OccupiedSocket>), PortError> {
        self.queried.lock().unwrap().extend(tokens.iter().cloned());
        if self.unreadable {
            return Err(PortError::Io {
                path: PathBuf::from("/proc/net/tcp"),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            });
        }
        if !self.occupied {
            return Ok((false, Vec::new()));
        }
        Ok((
            true,
            vec![OccupiedSocket {
                port: 2017,
                protocol: "tcp".into(),
                inode: 4242,
                owner: self.owner.clone(),
            }],
        ))
    }
}

/// Serve `router` on an ephemeral local port.
pub async fn start_mock_server(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}
