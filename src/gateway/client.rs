//! GatewayClient - cache, retry, and pool composed behind one call

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span};

use crate::cache::{EmbeddingCache, RequestCache, make_scoped_key};
use crate::config::ClientConfig;
use crate::providers::OllamaBackend;
use crate::providers::retry::{RetryPolicy, with_retry_until};
use crate::telemetry;
use crate::transport::ConnectionPool;
use crate::types::{Conversation, GenerationOptions, Message};
use crate::{Result, VedantaError};

/// Client for the language-model backend.
///
/// Holds no per-call mutable state: every `generate` is independent and
/// may run concurrently with others. The pool and cache are shared.
///
/// ```rust,no_run
/// use vedanta::{GenerationOptions, Message, Vedanta};
///
/// #[tokio::main]
/// async fn main() -> vedanta::Result<()> {
///     let client = Vedanta::builder()
///         .base_url("http://localhost:11434")
///         .build()?;
///
///     let history = [Message::user("Hi"), Message::assistant("Hello!")];
///     let reply = client
///         .generate("What is the capital of France?", &history, &GenerationOptions::default())
///         .await?;
///     println!("{reply}");
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct GatewayClient {
    config: Arc<ClientConfig>,
    pool: Arc<ConnectionPool>,
    cache: Arc<RequestCache>,
    embeddings: Arc<EmbeddingCache>,
    backend: OllamaBackend,
    retry: RetryPolicy,
}

impl GatewayClient {
    pub(crate) fn new(
        config: Arc<ClientConfig>,
        pool: Arc<ConnectionPool>,
        cache: Arc<RequestCache>,
    ) -> Self {
        Self {
            retry: RetryPolicy::from_config(&config),
            backend: OllamaBackend::new(config.clone()),
            embeddings: Arc::new(EmbeddingCache::new()),
            config,
            pool,
            cache,
        }
    }

    /// Generate a reply to `prompt` given the prior `history`.
    ///
    /// Identical (prompt, history, options) triples for the same model and
    /// system prompt are answered from the request cache without touching
    /// the network.
    pub async fn generate(
        &self,
        prompt: &str,
        history: &[Message],
        options: &GenerationOptions,
    ) -> Result<String> {
        self.generate_inner(prompt, history, options, None).await
    }

    /// [`generate()`](Self::generate), aborted with `Cancelled` when
    /// `cancel` fires while waiting on the pool, the network, or a backoff.
    pub async fn generate_with_cancel(
        &self,
        prompt: &str,
        history: &[Message],
        options: &GenerationOptions,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.generate_inner(prompt, history, options, Some(cancel))
            .await
    }

    /// Embed `text` with the configured model.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(VedantaError::InvalidInput(
                "text to embed must not be empty".into(),
            ));
        }
        if let Some(values) = self.embeddings.get(&self.config.model, text) {
            return Ok(values);
        }
        self.ensure_open()?;

        let start = Instant::now();
        let shutdown = Some(self.pool.shutdown_token());
        let result = with_retry_until(&self.retry, None, shutdown, "embed", || async move {
            let conn = self.pool.acquire(None).await?;
            self.backend.embed(&conn, text).await
        })
        .await;
        record_request("embed", start, &result);

        let values = result?;
        self.embeddings
            .insert(&self.config.model, text, values.clone());
        Ok(values)
    }

    /// Release the connection pool this client uses.
    ///
    /// With the default process-wide pool this affects every client in the
    /// process; call it once at shutdown. Requests already on the wire
    /// finish; calls waiting out a retry backoff fail at once with
    /// `PoolClosed` (kind `Connection`).
    pub fn close(&self) {
        self.pool.close();
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn cache(&self) -> &Arc<RequestCache> {
        &self.cache
    }

    async fn generate_inner(
        &self,
        prompt: &str,
        history: &[Message],
        options: &GenerationOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(VedantaError::InvalidInput(
                "prompt must not be empty".into(),
            ));
        }
        options.validate()?;
        if cancel.is_some_and(|token| token.is_cancelled()) {
            return Err(VedantaError::Cancelled);
        }

        let key = make_scoped_key(
            &self.config.model,
            &self.config.system_prompt,
            prompt,
            history,
            options,
        );
        if let Some(text) = self.cache.get(&key).await {
            debug!(key = %&key[..12], "request cache hit");
            return Ok(text);
        }
        self.ensure_open()?;

        let conversation = Conversation::build(&self.config.system_prompt, history, prompt);
        let span = info_span!(
            "generate",
            model = %self.config.model,
            messages = conversation.len(),
        );

        let start = Instant::now();
        let shutdown = Some(self.pool.shutdown_token());
        let result = with_retry_until(&self.retry, cancel, shutdown, "generate", || {
            self.attempt_chat(&conversation, options, cancel)
        })
        .instrument(span)
        .await;
        record_request("generate", start, &result);

        let text = result?;
        self.cache.put(key, text.clone()).await;
        Ok(text)
    }

    /// One physical attempt: acquire a pooled connection and send.
    async fn attempt_chat(
        &self,
        conversation: &Conversation,
        options: &GenerationOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<String> {
        let conn = self.pool.acquire(cancel).await?;
        let call = self.backend.chat(&conn, conversation.messages(), options);
        match cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(VedantaError::Cancelled),
                result = call => result,
            },
            None => call.await,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.pool.is_closed() {
            return Err(VedantaError::PoolClosed);
        }
        Ok(())
    }
}

fn record_request<T>(operation: &'static str, start: Instant, result: &Result<T>) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) => e.kind().as_str(),
    };
    metrics::counter!(telemetry::REQUESTS_TOTAL,
        "operation" => operation,
        "status" => status,
    )
    .increment(1);
    metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "operation" => operation)
        .record(start.elapsed().as_secs_f64());
}
