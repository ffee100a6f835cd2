//! Vedanta error types

use std::time::Duration;

use crate::providers::retry::AttemptOutcome;

/// Vedanta error types
#[derive(Debug, thiserror::Error)]
pub enum VedantaError {
    // Caller errors
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Transport errors
    #[error("request timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("connection error: {0}")]
    Connection(String),

    /// The connection pool was closed. Reported as a connection failure
    /// but never retried.
    #[error("connection pool closed")]
    PoolClosed,

    // Backend errors
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("backend error ({status:?}): {message}")]
    Backend { status: Option<u16>, message: String },

    #[error("request rejected ({status}): {message}")]
    RequestRejected { status: u16, message: String },

    /// Retry budget consumed. `last` is the final concrete error observed.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<VedantaError>,
    },

    #[error("operation cancelled")]
    Cancelled,

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Copyable discriminant of [`VedantaError`].
///
/// Lets callers branch on what went wrong without matching payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    Timeout,
    Connection,
    RateLimited,
    Backend,
    RequestRejected,
    Exhausted,
    Cancelled,
    Configuration,
    Json,
}

impl ErrorKind {
    /// Stable lowercase name, used as a metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connection => "connection",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Backend => "backend",
            ErrorKind::RequestRejected => "request_rejected",
            ErrorKind::Exhausted => "exhausted",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Json => "json",
        }
    }
}

impl VedantaError {
    /// The kind of this error. `Exhausted` reports [`ErrorKind::Exhausted`];
    /// use [`root_cause()`](Self::root_cause) for the underlying kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VedantaError::InvalidInput(_) => ErrorKind::InvalidInput,
            VedantaError::Timeout { .. } => ErrorKind::Timeout,
            VedantaError::Connection(_) | VedantaError::PoolClosed => ErrorKind::Connection,
            VedantaError::RateLimited { .. } => ErrorKind::RateLimited,
            VedantaError::Backend { .. } => ErrorKind::Backend,
            VedantaError::RequestRejected { .. } => ErrorKind::RequestRejected,
            VedantaError::Exhausted { .. } => ErrorKind::Exhausted,
            VedantaError::Cancelled => ErrorKind::Cancelled,
            VedantaError::Configuration(_) => ErrorKind::Configuration,
            VedantaError::Json(_) => ErrorKind::Json,
        }
    }

    /// The innermost error, looking through `Exhausted`.
    pub fn root_cause(&self) -> &VedantaError {
        match self {
            VedantaError::Exhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }

    /// Whether the error is worth retrying.
    ///
    /// Timeouts, transport failures, 429s and backend failures (5xx or a
    /// malformed success body) are transient. Everything else is permanent,
    /// including a closed pool.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VedantaError::Timeout { .. }
                | VedantaError::Connection(_)
                | VedantaError::RateLimited { .. }
                | VedantaError::Backend { .. }
        )
    }

    /// Provider-supplied wait hint, only present on `RateLimited`.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            VedantaError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Classify this error as the outcome of one physical attempt.
    ///
    /// Returns `None` for errors that are not produced by a network round
    /// trip (input validation, cancellation, configuration).
    pub fn outcome(&self) -> Option<AttemptOutcome> {
        match self {
            VedantaError::Timeout { .. } => Some(AttemptOutcome::Timeout),
            VedantaError::Connection(_) | VedantaError::PoolClosed => {
                Some(AttemptOutcome::ConnectionError)
            }
            VedantaError::RateLimited { .. } => Some(AttemptOutcome::RateLimited),
            VedantaError::Backend { .. } => Some(AttemptOutcome::ServerError),
            VedantaError::RequestRejected { .. } => Some(AttemptOutcome::ClientError),
            _ => None,
        }
    }

    /// Whether an end user should be told the service is temporarily
    /// unavailable (as opposed to their request being invalid).
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Timeout
                | ErrorKind::Connection
                | ErrorKind::Exhausted
                | ErrorKind::RateLimited
                | ErrorKind::Backend
        )
    }
}

/// Result type alias for Vedanta operations
pub type Result<T> = std::result::Result<T, VedantaError>;
