//! Retained presence announcements.

use std::sync::Arc;

use thiserror::Error;

use crate::envelope::{AgentStatus, StatusEnvelope};
use crate::registry::OperationRegistry;
use crate::transport::{MessagePublisher, OutboundMessage, TransportError};

/// Errors raised while announcing status.
#[derive(Debug, Error)]
pub enum StatusError {
    #[error("failed to encode status envelope: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Builds retained status messages for one agent.
///
/// Used both for live announcements and for the last-will message registered
/// with the broker before the session exists.
#[derive(Debug, Clone)]
pub struct StatusChannel {
    topic: String,
    client_id: String,
    registry: Arc<OperationRegistry>,
}

impl StatusChannel {
    /// Creates a channel announcing on `topic`.
    #[must_use]
    pub fn new(
        topic: impl Into<String>,
        client_id: impl Into<String>,
        registry: Arc<OperationRegistry>,
    ) -> Self {
        Self {
            topic: topic.into(),
            client_id: client_id.into(),
            registry,
        }
    }

    /// Builds a fresh status envelope.
    #[must_use]
    pub fn envelope(&self, status: AgentStatus) -> StatusEnvelope {
        StatusEnvelope::status(status, self.registry.names(), &self.client_id)
    }

    /// Encodes a fresh status envelope as a retained message.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] when the envelope cannot be encoded.
    pub fn message(&self, status: AgentStatus) -> Result<OutboundMessage, serde_json::Error> {
        let body = self.envelope(status).to_bytes()?;
        Ok(OutboundMessage::retained(self.topic.clone(), body))
    }
}

/// Publishes status envelopes through the session.
pub struct StatusPublisher {
    channel: StatusChannel,
    publisher: Arc<dyn MessagePublisher>,
}

impl StatusPublisher {
    /// Binds a channel to a publisher.
    #[must_use]
    pub fn new(channel: StatusChannel, publisher: Arc<dyn MessagePublisher>) -> Self {
        Self { channel, publisher }
    }

    /// Queues a retained status announcement.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError`] when encoding or queuing fails.
    pub fn publish(&self, status: AgentStatus) -> Result<(), StatusError> {
        let message = self.channel.message(status)?;
        self.publisher.publish(message)?;
        Ok(())
    }
}
