//! DNS resolver with a bounded-lifetime cache.
//!
//! Plugged into `reqwest` through [`reqwest::dns::Resolve`]. Lookups go
//! through tokio's system resolver; results are kept for `ttl` so that a
//! burst of new connections to the same host resolves it once.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use tracing::debug;

/// Resolved hosts kept at most. The pool talks to one backend host, so
/// this only needs headroom for redirects and proxies.
const MAX_CACHED_HOSTS: u64 = 64;

/// Caching DNS resolver for the connection pool.
#[derive(Clone)]
pub struct CachingResolver {
    cache: Cache<String, Arc<Vec<SocketAddr>>>,
}

impl CachingResolver {
    /// Create a resolver that reuses each lookup for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(MAX_CACHED_HOSTS)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    /// Resolve `host`, consulting the cache first.
    ///
    /// Returned addresses carry port 0; the connector fills in the port.
    pub async fn lookup(&self, host: &str) -> io::Result<Arc<Vec<SocketAddr>>> {
        let owned = host.to_owned();
        self.cache
            .try_get_with(owned.clone(), async move {
                debug!(host = %owned, "resolving backend host");
                let addrs: Vec<SocketAddr> =
                    tokio::net::lookup_host((owned.as_str(), 0)).await?.collect();
                if addrs.is_empty() {
                    return Err(io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("no addresses found for {owned}"),
                    ));
                }
                Ok(Arc::new(addrs))
            })
            .await
            .map_err(|e: Arc<io::Error>| io::Error::new(e.kind(), e.to_string()))
    }

    /// Number of hosts currently cached.
    pub fn cached_hosts(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Resolve for CachingResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = self.clone();
        Box::pin(async move {
            let addrs = resolver.lookup(name.as_str()).await?;
            let iter: Addrs = Box::new(addrs.as_ref().clone().into_iter());
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(iter)
        })
    }
}
