//! Builder for configuring gateway clients

use std::sync::Arc;
use std::time::Duration;

use super::GatewayClient;
use crate::cache::RequestCache;
use crate::config::ClientConfig;
use crate::transport::{ConnectionPool, PoolConfig};
use crate::Result;

/// Main entry point for creating gateway clients.
pub struct Vedanta;

impl Vedanta {
    /// Create a new builder for configuring the client.
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }
}

/// Builder for configuring gateway clients.
///
/// Unset values come from the base config ([`config()`](Self::config)),
/// or from the environment when no base config is given.
#[derive(Default)]
pub struct GatewayBuilder {
    config: Option<ClientConfig>,
    base_url: Option<String>,
    credential: Option<String>,
    model: Option<String>,
    system_prompt: Option<String>,
    request_timeout: Option<Duration>,
    max_retries: Option<u32>,
    retry_base_delay: Option<Duration>,
    max_retry_delay: Option<Duration>,
    pool: Option<Arc<ConnectionPool>>,
    dedicated_pool: bool,
    cache: Option<Arc<RequestCache>>,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an explicit config instead of the environment.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Backend base URL (e.g. `http://localhost:11434`).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Bearer credential forwarded in the `Authorization` header.
    pub fn credential(mut self, key: impl Into<String>) -> Self {
        self.credential = Some(key.into());
        self
    }

    /// Model name sent with each request.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// System message that opens every conversation.
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Upper bound on each physical attempt.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Additional attempts after the first failure.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Base delay of the exponential backoff.
    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = Some(delay);
        self
    }

    /// Cap on any single backoff wait.
    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = Some(delay);
        self
    }

    /// Use an explicit connection pool instead of the process-wide one.
    pub fn pool(mut self, pool: Arc<ConnectionPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Give this client its own pool, sized from the resolved config.
    ///
    /// Ignored when an explicit [`pool()`](Self::pool) is set.
    pub fn dedicated_pool(mut self) -> Self {
        self.dedicated_pool = true;
        self
    }

    /// Use an explicit request cache instead of the process-wide one.
    ///
    /// Entries are keyed by model and system prompt as well, so clients
    /// configured differently can safely share one cache.
    pub fn cache(mut self, cache: Arc<RequestCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<GatewayClient> {
        let mut config = self.config.unwrap_or_else(ClientConfig::from_env);

        if let Some(url) = self.base_url {
            config.base_url = url;
        }
        if let Some(key) = self.credential {
            config.credential = Some(key);
        }
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(prompt) = self.system_prompt {
            config.system_prompt = prompt;
        }
        if let Some(timeout) = self.request_timeout {
            config.request_timeout = timeout;
        }
        if let Some(n) = self.max_retries {
            config.max_retries = n;
        }
        if let Some(delay) = self.retry_base_delay {
            config.retry_base_delay = delay;
        }
        if let Some(delay) = self.max_retry_delay {
            config.max_retry_delay = delay;
        }

        let config = config.validate()?;

        let pool = match self.pool {
            Some(pool) => pool,
            None if self.dedicated_pool => Arc::new(ConnectionPool::new(&PoolConfig::from(&config))?),
            None => ConnectionPool::shared()?,
        };
        let cache = self.cache.unwrap_or_else(RequestCache::shared);

        Ok(GatewayClient::new(Arc::new(config), pool, cache))
    }
}
