//! Retry policy, attempt classification, and the shared retry loop.
//!
//! One logical call runs as up to `max_retries + 1` physical attempts.
//! Each failed attempt is classified into an [`AttemptOutcome`] and the
//! policy decides whether, and how long, to wait before the next one:
//!
//! | outcome            | retried | wait                                     |
//! |--------------------|---------|------------------------------------------|
//! | timeout            | yes     | `base * 2^attempt`                       |
//! | connection error   | yes     | `base * 2^attempt`                       |
//! | rate limited (429) | yes     | `Retry-After` if present, else `base`    |
//! | server error (5xx) | yes     | `base * 2^attempt`                       |
//! | client error (4xx) | no      | fails immediately                        |
//!
//! When the budget runs out the last concrete error is returned wrapped in
//! [`VedantaError::Exhausted`].

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::telemetry;
use crate::{Result, VedantaError};

/// Classification of one physical network round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttemptOutcome {
    Success,
    Timeout,
    ConnectionError,
    ServerError,
    RateLimited,
    ClientError,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Timeout => "timeout",
            AttemptOutcome::ConnectionError => "connection_error",
            AttemptOutcome::ServerError => "server_error",
            AttemptOutcome::RateLimited => "rate_limited",
            AttemptOutcome::ClientError => "client_error",
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record of one physical attempt. Lives only for the duration of a call.
#[derive(Debug, Clone)]
pub struct CallAttempt {
    /// 1-based attempt number.
    pub attempt_number: u32,
    pub started_at: Instant,
    pub outcome: AttemptOutcome,
}

/// Where a logical call is in its lifecycle.
///
/// `Idle → Attempting → {Success | Retrying → Attempting | Exhausted | Rejected}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Attempting,
    Retrying,
    Success,
    Exhausted,
    /// Non-retryable failure, surfaced without retrying.
    Rejected,
}

/// How many times to retry and how long to wait between attempts.
///
/// ```rust
/// # use vedanta::RetryPolicy;
/// # use std::time::Duration;
/// let policy = RetryPolicy::new()
///     .max_retries(2)
///     .base_delay(Duration::from_millis(100));
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Additional attempts after the first. 0 = no retry. Default: 3.
    pub max_retries: u32,
    /// Base delay of the exponential schedule. Default: 500ms.
    pub base_delay: Duration,
    /// Cap on any single wait. Default: 30s.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that makes exactly one attempt.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Derive the policy from a client config.
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay,
            max_delay: config.max_retry_delay,
        }
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Total physical attempts allowed.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Exponential backoff for a 0-indexed attempt: `base * 2^attempt`,
    /// capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_delay)
    }

    /// Wait before retrying after `error` failed attempt `attempt` (0-indexed).
    ///
    /// Rate limits honour the provider's `Retry-After` hint, falling back to
    /// the flat base delay. A provider hint is not capped.
    pub fn delay_after(&self, attempt: u32, error: &VedantaError) -> Duration {
        match error {
            VedantaError::RateLimited { retry_after } => retry_after.unwrap_or(self.base_delay),
            _ => self.delay_for_attempt(attempt),
        }
    }
}

/// Run `f` until it succeeds, fails permanently, or the budget runs out.
///
/// Retries transient errors (see [`VedantaError::is_transient()`]).
/// Permanent errors are returned unchanged after a single attempt. When
/// `cancel` fires during a backoff sleep, returns `Cancelled`.
pub async fn with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: Option<&CancellationToken>,
    operation: &'static str,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    with_retry_until(policy, cancel, None, operation, f).await
}

/// [`with_retry()`] that also stops backing off once `shutdown` fires.
///
/// `shutdown` is the connection pool's close signal: a call waiting out a
/// backoff when the pool closes returns `PoolClosed` at once instead of
/// sleeping through the rest of its schedule. An attempt already on the
/// wire is not interrupted.
pub async fn with_retry_until<F, Fut, T>(
    policy: &RetryPolicy,
    cancel: Option<&CancellationToken>,
    shutdown: Option<&CancellationToken>,
    operation: &'static str,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts();
    let mut state = RetryState::Idle;
    let mut attempt = 0u32;

    loop {
        state = transition(state, RetryState::Attempting);
        let started_at = Instant::now();
        let result = f().await;

        let err = match result {
            Ok(value) => {
                let record = CallAttempt {
                    attempt_number: attempt + 1,
                    started_at,
                    outcome: AttemptOutcome::Success,
                };
                log_attempt(operation, &record, None);
                transition(state, RetryState::Success);
                return Ok(value);
            }
            Err(e) => e,
        };

        // Cancellation and validation failures never came from the wire.
        let Some(outcome) = err.outcome() else {
            return Err(err);
        };
        let record = CallAttempt {
            attempt_number: attempt + 1,
            started_at,
            outcome,
        };
        log_attempt(operation, &record, Some(&err));

        if !err.is_transient() {
            transition(state, RetryState::Rejected);
            return Err(err);
        }

        if attempt + 1 >= max_attempts {
            transition(state, RetryState::Exhausted);
            return Err(VedantaError::Exhausted {
                attempts: attempt + 1,
                last: Box::new(err),
            });
        }

        let delay = policy.delay_after(attempt, &err);
        metrics::counter!(telemetry::RETRIES_TOTAL,
            "operation" => operation,
            "outcome" => outcome.as_str(),
        )
        .increment(1);
        warn!(
            operation,
            attempt = attempt + 1,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying after transient error"
        );
        state = transition(state, RetryState::Retrying);
        backoff(delay, cancel, shutdown).await?;
        attempt += 1;
    }
}

fn transition(from: RetryState, to: RetryState) -> RetryState {
    debug!(?from, ?to, "retry state");
    to
}

fn log_attempt(operation: &'static str, record: &CallAttempt, error: Option<&VedantaError>) {
    let elapsed_ms = record.started_at.elapsed().as_millis() as u64;
    match error {
        None => debug!(
            operation,
            attempt = record.attempt_number,
            outcome = %record.outcome,
            elapsed_ms,
            "attempt finished"
        ),
        Some(err) => debug!(
            operation,
            attempt = record.attempt_number,
            outcome = %record.outcome,
            elapsed_ms,
            error = %err,
            "attempt failed"
        ),
    }
}

/// Sleep for `delay`. Ends early with `Cancelled` when `cancel` fires or
/// `PoolClosed` when `shutdown` fires.
async fn backoff(
    delay: Duration,
    cancel: Option<&CancellationToken>,
    shutdown: Option<&CancellationToken>,
) -> Result<()> {
    tokio::select! {
        _ = fired(cancel) => Err(VedantaError::Cancelled),
        _ = fired(shutdown) => Err(VedantaError::PoolClosed),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

/// Resolves when `token` is cancelled; never, without a token.
async fn fired(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}
