//! Message bus transport.
//!
//! The transport owns the broker session. It delivers inbound messages to a
//! [`SessionHandler`] one at a time on its network thread, and exposes a
//! [`MessagePublisher`] through which the rest of the agent queues outbound
//! envelopes. All traffic uses at-least-once delivery.

mod delivery;
mod errors;
mod mqtt;

use std::sync::Arc;
use std::time::Duration;

use castle_config::Config;

pub use self::delivery::DeliveryTracker;
pub use self::errors::TransportError;
pub use self::mqtt::{MqttSession, MqttSessionFactory, MqttSettings};

pub(crate) const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// A message queued for publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Destination topic.
    pub topic: String,
    /// Encoded envelope.
    pub payload: Vec<u8>,
    /// Whether the broker should retain the message for late subscribers.
    pub retain: bool,
}

impl OutboundMessage {
    /// Builds a non-retained message.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            retain: false,
        }
    }

    /// Builds a message the broker retains for late subscribers.
    #[must_use]
    pub fn retained(topic: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            payload,
            retain: true,
        }
    }
}

/// Queues outbound messages on the bus.
pub trait MessagePublisher: Send + Sync {
    /// Queues `message` for at-least-once delivery.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Publish`] when the session cannot accept the
    /// message.
    fn publish(&self, message: OutboundMessage) -> Result<(), TransportError>;
}

/// Receives session events on the transport's network thread.
///
/// Calls are serialised: the next event is not delivered until the current
/// call returns.
pub trait SessionHandler: Send + Sync {
    /// The broker accepted the session and the request topic is subscribed.
    fn connected(&self);

    /// The session dropped; the transport will retry after its delay.
    fn disconnected(&self, reason: &str);

    /// A message arrived on a subscribed topic.
    fn message(&self, topic: &str, payload: &[u8]);
}

/// A broker session owned by the agent.
pub trait Session: Send {
    /// Returns a publisher that queues messages on this session.
    fn publisher(&self) -> Arc<dyn MessagePublisher>;

    /// Starts the network thread and begins delivering events to `handler`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::AlreadyStarted`] when called twice.
    fn start(&mut self, handler: Arc<dyn SessionHandler>) -> Result<(), TransportError>;

    /// Waits up to `timeout` for every queued message to be acknowledged.
    ///
    /// Returns `true` when nothing remains unacknowledged.
    fn flush(&self, timeout: Duration) -> bool;

    /// Disconnects from the broker and joins the network thread.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ThreadPanic`] when the network thread
    /// panicked.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens sessions from configuration.
pub trait SessionFactory {
    /// Session type produced by this factory.
    type Session: Session;

    /// Opens a session that registers `last_will` with the broker.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the session cannot be configured.
    fn open(
        &self,
        config: &Config,
        last_will: OutboundMessage,
    ) -> Result<Self::Session, TransportError>;
}
