//! Error types for broker session operations.

use thiserror::Error;

/// Errors surfaced while running or publishing on a broker session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to queue message for {topic}: {message}")]
    Publish { topic: String, message: String },
    #[error("failed to subscribe to {topic}: {message}")]
    Subscribe { topic: String, message: String },
    #[error("failed to request disconnect: {message}")]
    Disconnect { message: String },
    #[error("session already started")]
    AlreadyStarted,
    #[error("failed to spawn network thread: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },
    #[error("network thread panicked")]
    ThreadPanic,
}

impl TransportError {
    /// Creates a publish error for `topic`.
    pub fn publish(topic: impl Into<String>, message: impl ToString) -> Self {
        Self::Publish {
            topic: topic.into(),
            message: message.to_string(),
        }
    }
}
