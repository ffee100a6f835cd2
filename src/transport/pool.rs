//! Bounded, shared HTTP connection pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use reqwest::Client;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::dns::CachingResolver;
use crate::config::ClientConfig;
use crate::{Result, VedantaError};

static SHARED_POOL: OnceLock<Arc<ConnectionPool>> = OnceLock::new();

/// Sizing for a [`ConnectionPool`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum requests in flight at once. Default: 100.
    pub max_connections: usize,
    /// Lifetime of a cached DNS lookup. Default: 300s.
    pub dns_ttl: Duration,
    /// How long an idle keep-alive connection is kept. Default: 90s.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

impl From<&ClientConfig> for PoolConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            dns_ttl: config.dns_ttl,
            idle_timeout: config.pool_idle_timeout,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_connections(mut self, n: usize) -> Self {
        self.max_connections = n;
        self
    }

    pub fn dns_ttl(mut self, ttl: Duration) -> Self {
        self.dns_ttl = ttl;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }
}

/// Reusable connections to the backend host.
///
/// Wraps one `reqwest::Client` (which owns the keep-alive pool) together
/// with a semaphore that bounds in-flight requests. Cloning the inner
/// client is cheap and shares the same connections.
///
/// Usually one instance exists per process, obtained through
/// [`ConnectionPool::shared()`]. Tests and isolated subsystems can build
/// their own and inject it into the gateway builder.
pub struct ConnectionPool {
    http: Client,
    permits: Arc<Semaphore>,
    max_connections: usize,
    closed: AtomicBool,
    shutdown: CancellationToken,
    resolver: Arc<CachingResolver>,
}

impl ConnectionPool {
    /// Build a pool with the given sizing.
    pub fn new(config: &PoolConfig) -> Result<Self> {
        if config.max_connections == 0 {
            return Err(VedantaError::Configuration(
                "max_connections must be at least 1".into(),
            ));
        }

        let resolver = Arc::new(CachingResolver::new(config.dns_ttl));
        let http = Client::builder()
            .pool_idle_timeout(config.idle_timeout)
            .pool_max_idle_per_host(config.max_connections)
            .dns_resolver(resolver.clone())
            .build()
            .map_err(|e| VedantaError::Configuration(format!("failed to build HTTP client: {e}")))?;

        debug!(
            max_connections = config.max_connections,
            dns_ttl_secs = config.dns_ttl.as_secs(),
            "connection pool created"
        );

        Ok(Self {
            http,
            permits: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            resolver,
        })
    }

    /// The process-wide pool, created with default sizing on first use.
    pub fn shared() -> Result<Arc<Self>> {
        if let Some(pool) = SHARED_POOL.get() {
            return Ok(pool.clone());
        }
        let pool = Arc::new(Self::new(&PoolConfig::default())?);
        // A concurrent first caller may have won the race; keep its pool.
        Ok(SHARED_POOL.get_or_init(|| pool).clone())
    }

    /// Wait for a free slot and return a handle for one request.
    ///
    /// The slot is released when the handle is dropped. Fails with
    /// `PoolClosed` once the pool is closed, or `Cancelled` if `cancel`
    /// fires while waiting.
    pub async fn acquire(&self, cancel: Option<&CancellationToken>) -> Result<PooledConnection> {
        let acquire = self.permits.clone().acquire_owned();
        let permit = match cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => return Err(VedantaError::Cancelled),
                permit = acquire => permit,
            },
            None => acquire.await,
        }
        .map_err(|_| VedantaError::PoolClosed)?;

        Ok(PooledConnection {
            http: self.http.clone(),
            _permit: permit,
        })
    }

    /// Stop handing out connections.
    ///
    /// Idempotent. Requests already holding a connection run to completion;
    /// later `acquire` calls fail with `PoolClosed` and calls waiting out a
    /// retry backoff stop waiting. Idle keep-alive sockets
    /// are released once the last client handle is dropped.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.permits.close();
            self.shutdown.cancel();
            info!(in_flight = self.in_flight(), "connection pool closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Token cancelled when the pool closes.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Configured bound on in-flight requests.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Requests currently holding a connection.
    pub fn in_flight(&self) -> usize {
        self.max_connections
            .saturating_sub(self.permits.available_permits())
    }

    /// The DNS cache used by this pool.
    pub fn resolver(&self) -> &CachingResolver {
        &self.resolver
    }
}

/// A slot in the pool, valid for one request.
pub struct PooledConnection {
    http: Client,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    pub fn http(&self) -> &Client {
        &self.http
    }
}
