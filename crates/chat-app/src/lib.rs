#![deny(unsafe_code)]

//! Terminal chat client for a retrieval-augmented chat backend.

/// Conversation timeline, controller and transcript rendering.
pub mod chat;
pub mod error;
/// Client settings persistence.
pub mod settings;

pub use error::{ChatError, ChatResult};
