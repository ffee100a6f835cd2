//! Client configuration.
//!
//! A [`ClientConfig`] is resolved once, when the gateway is built, and is
//! immutable afterwards. Values come from (highest priority first):
//!
//! 1. explicit builder calls ([`GatewayBuilder`](crate::GatewayBuilder))
//! 2. a TOML file passed to [`ClientConfig::load()`]
//! 3. environment variables (`LLAMA_API_URL`, `LLAMA_API_KEY`)
//! 4. built-in defaults
//!
//! ```toml
//! [backend]
//! url = "http://localhost:11434"
//! model = "llama3.2"
//!
//! [limits]
//! request_timeout_secs = 60
//! max_retries = 3
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::{Result, VedantaError};

/// Environment variable holding the backend base URL.
pub const ENV_BASE_URL: &str = "LLAMA_API_URL";

/// Environment variable holding the bearer credential.
pub const ENV_CREDENTIAL: &str = "LLAMA_API_KEY";

/// Default backend (a local Ollama server).
pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default model name sent with every request.
pub const DEFAULT_MODEL: &str = "llama3.2";

/// Default system message prepended to every conversation.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Connection parameters for the backend.
///
/// Shared by reference (`Arc`) by every call made through one client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL, without trailing slash.
    pub base_url: String,
    /// Bearer credential. Absent is legal (unauthenticated backends).
    pub credential: Option<String>,
    /// Model name sent in each request body.
    pub model: String,
    /// Fixed system message that opens every conversation.
    pub system_prompt: String,
    /// Upper bound on a single physical attempt. Default: 60s.
    pub request_timeout: Duration,
    /// Additional attempts after the first failure. Default: 3.
    pub max_retries: u32,
    /// Base of the exponential backoff. Default: 500ms.
    pub retry_base_delay: Duration,
    /// Cap on any single backoff wait. Default: 30s.
    pub max_retry_delay: Duration,
    /// Maximum in-flight requests through the pool. Default: 100.
    pub max_connections: usize,
    /// How long resolved addresses are reused. Default: 300s.
    pub dns_ttl: Duration,
    /// How long an idle keep-alive connection stays pooled. Default: 90s.
    pub pool_idle_timeout: Duration,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            credential: None,
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            request_timeout: Duration::from_secs(60),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(30),
            max_connections: 100,
            dns_ttl: Duration::from_secs(300),
            pool_idle_timeout: Duration::from_secs(90),
            user_agent: crate::version::user_agent(),
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    ///
    /// Empty values are treated as absent.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        config.apply_env(lookup);
        config
    }

    /// Parse a TOML document. Fields it omits keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: FileConfig = toml::from_str(content)
            .map_err(|e| VedantaError::Configuration(format!("invalid config: {e}")))?;
        Ok(file.into_config())
    }

    /// Load a TOML config file, then fill unset backend fields from the
    /// environment.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            VedantaError::Configuration(format!("failed to read config file {path:?}: {e}"))
        })?;
        let file: FileConfig = toml::from_str(&content).map_err(|e| {
            VedantaError::Configuration(format!("failed to parse config file {path:?}: {e}"))
        })?;
        let has_url = file.backend.url.is_some();
        let has_credential = file.backend.credential.is_some();
        let mut config = file.into_config();
        config.apply_env(|key| match key {
            ENV_BASE_URL if has_url => None,
            ENV_CREDENTIAL if has_credential => None,
            _ => std::env::var(key).ok(),
        });
        Ok(config)
    }

    /// Check the config is usable and normalise the base URL.
    ///
    /// The only hard requirement is a non-empty base URL.
    pub fn validate(mut self) -> Result<Self> {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(VedantaError::Configuration(
                "base URL must not be empty".into(),
            ));
        }
        self.base_url = trimmed.to_string();
        if self.credential.as_deref().is_some_and(|c| c.trim().is_empty()) {
            self.credential = None;
        }
        Ok(self)
    }

    /// Full URL of the chat endpoint.
    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    /// Full URL of the embedding endpoint.
    pub fn embed_url(&self) -> String {
        format!("{}/api/embed", self.base_url)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_BASE_URL) {
            self.base_url = url;
        }
        if let Some(key) = non_empty(ENV_CREDENTIAL) {
            self.credential = Some(key);
        }
    }
}

/// On-disk layout of the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    backend: BackendSection,
    #[serde(default)]
    limits: LimitsSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BackendSection {
    url: Option<String>,
    credential: Option<String>,
    model: Option<String>,
    system_prompt: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct LimitsSection {
    request_timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    max_retry_delay_ms: Option<u64>,
    max_connections: Option<usize>,
    dns_ttl_secs: Option<u64>,
    pool_idle_timeout_secs: Option<u64>,
}

impl FileConfig {
    fn into_config(self) -> ClientConfig {
        let mut config = ClientConfig::default();
        let FileConfig { backend, limits } = self;

        if let Some(url) = backend.url {
            config.base_url = url;
        }
        config.credential = backend.credential;
        if let Some(model) = backend.model {
            config.model = model;
        }
        if let Some(prompt) = backend.system_prompt {
            config.system_prompt = prompt;
        }

        if let Some(secs) = limits.request_timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = limits.max_retries {
            config.max_retries = n;
        }
        if let Some(ms) = limits.retry_base_delay_ms {
            config.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = limits.max_retry_delay_ms {
            config.max_retry_delay = Duration::from_millis(ms);
        }
        if let Some(n) = limits.max_connections {
            config.max_connections = n;
        }
        if let Some(secs) = limits.dns_ttl_secs {
            config.dns_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = limits.pool_idle_timeout_secs {
            config.pool_idle_timeout = Duration::from_secs(secs);
        }
        config
    }
}
