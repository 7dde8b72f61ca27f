//! Message Persistence
//!
//! Chat messages are handed to an external store after they are broadcast.
//! The hub never waits on it: the connection's read pump spawns each call,
//! and a failure is logged and otherwise ignored.

use async_trait::async_trait;
use thiserror::Error;

use crate::websocket::ChatMessage;

/// Sink for chat messages worth keeping
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn persist(&self, message: &ChatMessage) -> Result<(), PersistError>;
}

/// Errors reported by a message sink
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Message store unavailable: {0}")]
    Unavailable(String),

    #[error("Message rejected: {0}")]
    Rejected(String),
}

/// Sink that only records messages in the trace log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl MessageSink for LogSink {
    async fn persist(&self, message: &ChatMessage) -> Result<(), PersistError> {
        tracing::debug!(
            room = message.room.as_deref().unwrap_or_default(),
            sender = message.sender.as_deref().unwrap_or_default(),
            "Chat message"
        );
        Ok(())
    }
}
