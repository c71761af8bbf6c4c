//! Publisher double that records every queued message.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

use crate::transport::{MessagePublisher, OutboundMessage, TransportError};

/// Records published messages and optionally rejects them.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<OutboundMessage>>,
    rejecting: AtomicBool,
}

impl RecordingPublisher {
    /// Makes subsequent publishes fail.
    pub fn reject_publishes(&self) {
        self.rejecting.store(true, Ordering::SeqCst);
    }

    /// Captures a copy of the recorded messages.
    #[must_use]
    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.messages
            .lock()
            .expect("publisher mutex poisoned")
            .clone()
    }

    /// Decoded bodies of messages published on `topic`, oldest first.
    #[must_use]
    pub fn envelopes_on(&self, topic: &str) -> Vec<Value> {
        self.messages()
            .into_iter()
            .filter(|message| message.topic == topic)
            .map(|message| {
                serde_json::from_slice(&message.payload).expect("published body should be JSON")
            })
            .collect()
    }
}

impl MessagePublisher for RecordingPublisher {
    fn publish(&self, message: OutboundMessage) -> Result<(), TransportError> {
        if self.rejecting.load(Ordering::SeqCst) {
            return Err(TransportError::publish(message.topic, "rejected by test"));
        }
        self.messages
            .lock()
            .expect("publisher mutex poisoned")
            .push(message);
        Ok(())
    }
}
