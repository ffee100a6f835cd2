//! Telemetry metric name constants.
//!
//! Consumers install their own `metrics` recorder (e.g. prometheus,
//! statsd); without a recorder installed, all metric calls are no-ops.
//!
//! # Common labels
//!
//! - `operation`: "generate" or "embed"
//! - `status`: "ok" or the error kind of the final outcome
//! - `outcome`: classification of one physical attempt

/// Logical calls that reached the backend (cache hits excluded).
///
/// Labels: `operation`, `status`.
pub const REQUESTS_TOTAL: &str = "vedanta_requests_total";

/// Duration of a logical call, retries and backoff included, in seconds.
///
/// Labels: `operation`.
pub const REQUEST_DURATION_SECONDS: &str = "vedanta_request_duration_seconds";

/// Retries scheduled after a transient failure (initial attempt excluded).
///
/// Labels: `operation`, `outcome`.
pub const RETRIES_TOTAL: &str = "vedanta_retries_total";

/// Request cache hits.
///
/// Labels: `operation`.
pub const CACHE_HITS_TOTAL: &str = "vedanta_cache_hits_total";

/// Request cache misses.
///
/// Labels: `operation`.
pub const CACHE_MISSES_TOTAL: &str = "vedanta_cache_misses_total";
