//! Backend wire protocol and the retry controller that drives it.

pub mod ollama;
pub mod retry;

pub use ollama::OllamaBackend;
pub use retry::{AttemptOutcome, CallAttempt, RetryPolicy, RetryState, with_retry, with_retry_until};
