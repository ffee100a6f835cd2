//! Shared transport to the backend host.
//!
//! - [`ConnectionPool`]: keep-alive HTTP connections plus a bound on
//!   in-flight requests, shared by every client in the process unless an
//!   explicit pool is injected.
//! - [`dns::CachingResolver`]: resolves the backend host once per TTL
//!   instead of once per connection.

pub mod dns;
mod pool;

pub use dns::CachingResolver;
pub use pool::{ConnectionPool, PoolConfig, PooledConnection};
