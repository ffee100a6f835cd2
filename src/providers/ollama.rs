//! Wire protocol for Ollama-style chat backends.
//!
//! One physical attempt = one POST through a pooled connection:
//!
//! - `POST {base}/api/chat` with `{model, messages, stream: false,
//!   options: {temperature, num_predict, top_p}}`, answered by
//!   `{message: {content}, ...}`.
//! - `POST {base}/api/embed` with `{model, input}`, answered by
//!   `{embeddings: [[f32]]}`.
//!
//! See: <https://github.com/ollama/ollama/blob/main/docs/api.md>

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER, USER_AGENT};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::transport::PooledConnection;
use crate::types::{GenerationOptions, Message};
use crate::{Result, VedantaError};

/// Maximum bytes of an error body carried into error messages.
const MAX_ERROR_BODY: usize = 512;

/// Request/response mapping for one configured backend.
#[derive(Clone)]
pub struct OllamaBackend {
    config: Arc<ClientConfig>,
}

impl OllamaBackend {
    pub fn new(config: Arc<ClientConfig>) -> Self {
        Self { config }
    }

    /// Send one chat request and extract `message.content`.
    pub async fn chat(
        &self,
        conn: &PooledConnection,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<String> {
        let body = ChatRequest {
            model: &self.config.model,
            messages,
            stream: false,
            options: ChatRequestOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
                top_p: options.top_p,
            },
        };

        let response = self
            .post(conn, self.config.chat_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let parsed: ChatResponse = self.read_success(response).await?;
        if let Some(error) = parsed.error {
            return Err(VedantaError::Backend {
                status: None,
                message: error,
            });
        }
        parsed
            .message
            .and_then(|m| m.content)
            .ok_or_else(|| VedantaError::Backend {
                status: None,
                message: "response is missing message.content".into(),
            })
    }

    /// Send one embedding request and return the first vector.
    pub async fn embed(&self, conn: &PooledConnection, text: &str) -> Result<Vec<f32>> {
        let body = EmbedRequest {
            model: &self.config.model,
            input: text,
        };

        let response = self
            .post(conn, self.config.embed_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let parsed: EmbedResponse = self.read_success(response).await?;
        parsed
            .embeddings
            .into_iter()
            .next()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| VedantaError::Backend {
                status: None,
                message: "response contains no embedding".into(),
            })
    }

    fn post(&self, conn: &PooledConnection, url: String) -> RequestBuilder {
        let request = conn
            .http()
            .post(url)
            .timeout(self.config.request_timeout)
            .header(USER_AGENT, &self.config.user_agent);
        match &self.config.credential {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// Map non-2xx statuses to errors, then decode the body.
    async fn read_success<T: DeserializeOwned>(&self, response: Response) -> Result<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(self.status_error(response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e))?;
        serde_json::from_slice(&bytes).map_err(|e| VedantaError::Backend {
            status: Some(status.as_u16()),
            message: format!("malformed response body: {e}"),
        })
    }

    async fn status_error(&self, response: Response) -> VedantaError {
        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        // The body is best effort; a failed read still yields a classified error.
        let body = response.text().await.unwrap_or_default();
        classify_status(status, retry_after, &body)
    }

    fn transport_error(&self, err: reqwest::Error) -> VedantaError {
        if err.is_timeout() {
            VedantaError::Timeout {
                after: self.config.request_timeout,
            }
        } else {
            VedantaError::Connection(err.to_string())
        }
    }
}

/// Classify a non-success HTTP status.
pub(crate) fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> VedantaError {
    let message = error_message(status, body);
    match status.as_u16() {
        429 => VedantaError::RateLimited { retry_after },
        code @ 400..=499 => VedantaError::RequestRejected {
            status: code,
            message,
        },
        code => VedantaError::Backend {
            status: Some(code),
            message,
        },
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Prefer the JSON `error` field, then the raw body, then the status text.
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(ErrorBody { error }) = serde_json::from_str::<ErrorBody>(body) {
        return error;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return status
            .canonical_reason()
            .unwrap_or("unknown status")
            .to_string();
    }
    match trimmed.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: ChatRequestOptions,
}

#[derive(Serialize)]
struct ChatRequestOptions {
    temperature: f32,
    num_predict: u32,
    top_p: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}
