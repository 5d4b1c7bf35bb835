//! Network readiness gate.
//!
//! Blocks until a DNS lookup of a well-known host returns at least one
//! address. There is no timeout: this runs once at startup, and updates are
//! pointless without a network.

use std::sync::Arc;
use std::time::Duration;

use crate::net::Resolver;
use crate::observability::metrics;

pub const READINESS_HOST: &str = "apple.com";
pub const READINESS_INTERVAL: Duration = Duration::from_secs(5);

pub struct ReadinessGate {
    resolver: Arc<dyn Resolver>,
    host: String,
    interval: Duration,
}

impl ReadinessGate {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            resolver,
            host: READINESS_HOST.to_string(),
            interval: READINESS_INTERVAL,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Wait until the network resolves; returns how many waits it took.
    pub async fn wait(&self) -> u32 {
        let mut waits = 0;
        loop {
            match self.resolver.lookup_host(&self.host).await {
                Ok(addrs) if !addrs.is_empty() => break,
                Ok(_) => tracing::debug!(host = %self.host, "Lookup returned no addresses"),
                Err(e) => tracing::debug!(host = %self.host, error = %e, "Lookup failed"),
            }
            tracing::warn!("Waiting for network connection");
            metrics::record_readiness_wait();
            tokio::time::sleep(self.interval).await;
            waits += 1;
        }
        tracing::warn!(waits, "Network is connected");
        waits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io;
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyResolver {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Resolver for FlakyResolver {
        async fn lookup_host(&self, _host: &str) -> io::Result<Vec<IpAddr>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(io::Error::new(io::ErrorKind::Other, "no route"))
            } else {
                Ok(vec!["17.253.144.10".parse().unwrap()])
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn completes_after_two_waits() {
        let resolver = Arc::new(FlakyResolver {
            failures: 2,
            calls: AtomicU32::new(0),
        });
        let gate = ReadinessGate::new(resolver.clone());
        let start = tokio::time::Instant::now();

        assert_eq!(gate.wait().await, 2);
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_network_does_not_wait() {
        let resolver = Arc::new(FlakyResolver {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        assert_eq!(ReadinessGate::new(resolver).wait().await, 0);
    }
}
