//! Public types for the Vedanta API.

mod message;
mod options;

pub use message::{Conversation, Message, Role};
pub use options::GenerationOptions;
