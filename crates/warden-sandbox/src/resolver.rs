//! Host resolution for the HTTP strategy.
//!
//! [`HostResolver`] is the seam that performs both the check-time and the
//! connect-time lookups. [`PinnedResolver`] hands the verified addresses to
//! reqwest so the connection cannot be steered elsewhere by a third lookup.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;

/// Resolves a host name to socket addresses.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Resolve `host`. An empty answer is allowed and treated as unsafe.
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>>;
}

/// Resolver backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
        Ok(tokio::net::lookup_host((host, port)).await?.collect())
    }
}

/// A reqwest resolver that only answers for one host, with fixed addresses.
#[derive(Debug, Clone)]
pub struct PinnedResolver {
    host: String,
    addrs: Arc<[SocketAddr]>,
}

impl PinnedResolver {
    /// Pin `host` to `addrs`.
    #[must_use]
    pub fn new(host: impl Into<String>, addrs: Vec<SocketAddr>) -> Self {
        Self {
            host: host.into().to_ascii_lowercase(),
            addrs: addrs.into(),
        }
    }
}

impl reqwest::dns::Resolve for PinnedResolver {
    fn resolve(&self, name: reqwest::dns::Name) -> reqwest::dns::Resolving {
        let requested = name.as_str().trim_end_matches('.').to_ascii_lowercase();
        let matches = requested == self.host.trim_end_matches('.');
        let addrs = Arc::clone(&self.addrs);
        Box::pin(async move {
            if !matches {
                return Err(Box::new(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "host was not verified for this request",
                )) as Box<dyn std::error::Error + Send + Sync>);
            }
            let iter: reqwest::dns::Addrs = Box::new(addrs.to_vec().into_iter());
            Ok(iter)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn system_resolver_resolves_localhost() {
        let addrs = SystemResolver.resolve("localhost", 80).await.unwrap();
        assert!(!addrs.is_empty());
        assert!(addrs.iter().all(|a| a.ip().is_loopback()));
    }
}
