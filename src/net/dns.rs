//! Host name resolution.

use std::io;
use std::net::IpAddr;

use async_trait::async_trait;

/// Resolves host names to addresses.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn lookup_host(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the system resolver through Tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup_host(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|a| a.ip()).collect())
    }
}
