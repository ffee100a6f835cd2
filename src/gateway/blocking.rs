//! Blocking adapter for callers without an async runtime.
//!
//! [`BlockingGateway`] owns a private single-threaded tokio runtime and a
//! [`GatewayClient`] with its own connection pool, and drives one call at a
//! time to completion with `block_on`.
//!
//! It must not be used from inside a tokio runtime: blocking a worker on a
//! nested runtime can deadlock, and dropping a runtime from async context
//! panics. Both constructors and calls check for this and return
//! `Configuration` instead. Async callers should use [`GatewayClient`].

use tokio::runtime::{Builder, Handle, Runtime};

use super::{GatewayBuilder, GatewayClient};
use crate::types::{GenerationOptions, Message};
use crate::{Result, VedantaError};

/// Synchronous front end to a [`GatewayClient`].
///
/// ```rust,no_run
/// use vedanta::{BlockingGateway, GenerationOptions, Vedanta};
///
/// fn main() -> vedanta::Result<()> {
///     let gateway = BlockingGateway::new(Vedanta::builder())?;
///     let reply = gateway.generate_sync("Hi", &[], &GenerationOptions::default())?;
///     println!("{reply}");
///     Ok(())
/// }
/// ```
pub struct BlockingGateway {
    client: GatewayClient,
    runtime: Runtime,
}

impl BlockingGateway {
    /// Build a client from `builder` bound to a private runtime.
    ///
    /// The client always gets a dedicated pool: connections opened on this
    /// runtime are never handed to tasks on another one. An explicit pool
    /// set on the builder still takes precedence.
    pub fn new(builder: GatewayBuilder) -> Result<Self> {
        ensure_outside_runtime()?;
        let runtime = Builder::new_current_thread()
            .enable_all()
            .thread_name("vedanta-blocking")
            .build()
            .map_err(|e| {
                VedantaError::Configuration(format!("failed to start blocking runtime: {e}"))
            })?;
        let client = {
            let _guard = runtime.enter();
            builder.dedicated_pool().build()?
        };
        Ok(Self { client, runtime })
    }

    /// Blocking [`GatewayClient::generate()`].
    pub fn generate_sync(
        &self,
        prompt: &str,
        history: &[Message],
        options: &GenerationOptions,
    ) -> Result<String> {
        ensure_outside_runtime()?;
        self.runtime
            .block_on(self.client.generate(prompt, history, options))
    }

    /// Blocking [`GatewayClient::embed()`].
    pub fn embed_sync(&self, text: &str) -> Result<Vec<f32>> {
        ensure_outside_runtime()?;
        self.runtime.block_on(self.client.embed(text))
    }

    /// The wrapped async client.
    pub fn client(&self) -> &GatewayClient {
        &self.client
    }

    /// Close the private pool.
    pub fn close(&self) {
        self.client.close();
    }
}

fn ensure_outside_runtime() -> Result<()> {
    if Handle::try_current().is_ok() {
        return Err(VedantaError::Configuration(
            "blocking gateway called from inside an async runtime; use GatewayClient instead"
                .into(),
        ));
    }
    Ok(())
}
