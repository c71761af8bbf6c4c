//! Routes decoded requests to registered operations.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use castle_config::Topics;

use super::DISPATCH_TARGET;
use super::errors::DispatchError;
use super::request::{Invocation, RequestEnvelope};
use crate::envelope::{ErrorEnvelope, ResponseEnvelope};
use crate::operation::ResultMap;
use crate::registry::OperationRegistry;
use crate::transport::{MessagePublisher, OutboundMessage};

/// What happened to a single inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The message arrived on a topic other than the request topic.
    Ignored,
    /// The message could not be decoded; nothing was published.
    DecodeFailed,
    /// A response envelope was produced.
    Responded,
    /// An error envelope was produced.
    Failed,
}

/// Routes request messages to operations and publishes the replies.
pub struct Dispatcher {
    registry: Arc<OperationRegistry>,
    publisher: Arc<dyn MessagePublisher>,
    request_topic: String,
    response_topic: String,
}

impl Dispatcher {
    /// Builds a dispatcher over a populated registry.
    #[must_use]
    pub fn new(
        registry: Arc<OperationRegistry>,
        publisher: Arc<dyn MessagePublisher>,
        topics: &Topics,
    ) -> Self {
        Self {
            registry,
            publisher,
            request_topic: topics.request.clone(),
            response_topic: topics.response.clone(),
        }
    }

    /// Handles one inbound message.
    ///
    /// Publishes at most one envelope. Never panics on behalf of an
    /// operation: a panicking operation is reported as an error envelope.
    pub fn dispatch(&self, topic: &str, body: &[u8]) -> DispatchOutcome {
        if topic != self.request_topic {
            debug!(
                target: DISPATCH_TARGET,
                topic,
                "ignoring message on foreign topic"
            );
            return DispatchOutcome::Ignored;
        }

        let RequestEnvelope { id, payload } = match RequestEnvelope::parse(body) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(
                    target: DISPATCH_TARGET,
                    %error,
                    bytes = body.len(),
                    "discarding undecodable request"
                );
                return DispatchOutcome::DecodeFailed;
            }
        };

        match self.execute(&id, payload) {
            Ok(data) => {
                self.reply(&id, ResponseEnvelope::response(&id, data).to_bytes());
                DispatchOutcome::Responded
            }
            Err(error) => {
                warn!(
                    target: DISPATCH_TARGET,
                    request_id = %id,
                    %error,
                    "request failed"
                );
                self.reply(&id, ErrorEnvelope::error(&id, error.to_string()).to_bytes());
                DispatchOutcome::Failed
            }
        }
    }

    /// Resolves and runs the operation named in `payload`.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] whose display text becomes the message of
    /// the error envelope.
    pub fn execute(&self, request_id: &str, payload: Value) -> Result<ResultMap, DispatchError> {
        let Invocation { action, params } = Invocation::from_payload(payload)?;
        let operation = self
            .registry
            .lookup(&action)
            .ok_or_else(|| DispatchError::unknown_operation(&action))?;

        info!(
            target: DISPATCH_TARGET,
            request_id,
            action = %action,
            "executing operation"
        );
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| operation.invoke(params)));
        let elapsed_ms = started.elapsed().as_millis();

        match outcome {
            Ok(Ok(data)) => {
                debug!(
                    target: DISPATCH_TARGET,
                    request_id,
                    action = %action,
                    elapsed_ms,
                    "operation completed"
                );
                Ok(data)
            }
            Ok(Err(error)) => Err(error.into()),
            Err(_) => Err(DispatchError::panicked(action)),
        }
    }

    fn reply(&self, request_id: &str, encoded: Result<Vec<u8>, serde_json::Error>) {
        let body = match encoded {
            Ok(body) => body,
            Err(error) => {
                warn!(
                    target: DISPATCH_TARGET,
                    request_id,
                    %error,
                    "failed to encode reply"
                );
                return;
            }
        };

        let message = OutboundMessage::new(self.response_topic.clone(), body);
        if let Err(error) = self.publisher.publish(message) {
            warn!(
                target: DISPATCH_TARGET,
                request_id,
                %error,
                "failed to publish reply"
            );
        }
    }
}
