//! Vedanta - pooled, cached, retrying client for LLM chat backends
//!
//! This crate talks to one self-hosted chat backend (Ollama-style
//! `/api/chat`) on behalf of application code. Every call goes through:
//!
//! 1. input validation (empty prompts never reach the network)
//! 2. a bounded request cache keyed by prompt, history, and options
//! 3. a retry controller that classifies failures and backs off
//! 4. a shared connection pool with a DNS cache and an in-flight limit
//!
//! # Async Example
//!
//! ```rust,no_run
//! use vedanta::{GenerationOptions, Vedanta};
//!
//! #[tokio::main]
//! async fn main() -> vedanta::Result<()> {
//!     let client = Vedanta::builder()
//!         .base_url("http://localhost:11434")
//!         .max_retries(2)
//!         .build()?;
//!
//!     let reply = client
//!         .generate("What is the capital of France?", &[], &GenerationOptions::default())
//!         .await?;
//!
//!     println!("{reply}");
//!     client.close();
//!     Ok(())
//! }
//! ```
//!
//! # Blocking Example
//!
//! ```rust,no_run
//! use vedanta::{BlockingGateway, GenerationOptions, Vedanta};
//!
//! fn main() -> vedanta::Result<()> {
//!     let gateway = BlockingGateway::new(Vedanta::builder())?;
//!     let reply = gateway.generate_sync("Hello", &[], &GenerationOptions::default())?;
//!     println!("{reply}");
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod providers;
pub mod telemetry;
pub mod transport;
pub mod types;
mod version;

// Re-export main types at crate root
pub use cache::{CacheEntry, EmbeddingCache, RequestCache, make_key, make_scoped_key};
pub use config::ClientConfig;
pub use error::{ErrorKind, Result, VedantaError};
pub use gateway::{BlockingGateway, GatewayBuilder, GatewayClient, Vedanta};
pub use providers::{AttemptOutcome, CallAttempt, RetryPolicy, RetryState};
pub use transport::{ConnectionPool, PoolConfig};
pub use types::{Conversation, GenerationOptions, Message, Role};
pub use version::{PKG_VERSION, user_agent, version_string};

pub use tokio_util::sync::CancellationToken;
