//! Gateway client and its synchronous adapter

mod blocking;
mod builder;
mod client;

pub use blocking::BlockingGateway;
pub use builder::{GatewayBuilder, Vedanta};
pub use client::GatewayClient;
