//! Outbound envelopes published by the agent.
//!
//! Every envelope carries a fresh unique identifier and the wall-clock time in
//! milliseconds since the Unix epoch at which it was built. Field names on the
//! wire are camel-cased (`requestId`, `clientId`).

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::operation::ResultMap;

/// Discriminates the three outbound envelope shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    /// Successful operation result.
    Response,
    /// Failed request.
    Error,
    /// Agent presence announcement.
    Status,
}

/// Presence value carried by status envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// The agent is connected and serving requests.
    Online,
    /// The agent has stopped or lost its connection.
    Offline,
}

impl AgentStatus {
    /// Returns the wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// Common envelope frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<P> {
    /// Envelope shape.
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    /// Unique identifier of this envelope.
    pub id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Shape-specific body.
    pub payload: P,
}

/// Body of a response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePayload {
    /// Identifier of the request being answered.
    pub request_id: String,
    /// Result map returned by the operation.
    pub data: ResultMap,
}

/// Body of an error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Identifier of the request that failed.
    pub request_id: String,
    /// Human-readable failure description.
    pub message: String,
}

/// Body of a status envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    /// Presence value.
    pub status: AgentStatus,
    /// Registered operation names in ascending order.
    pub operations: Vec<String>,
    /// Client identifier the agent connected with.
    pub client_id: String,
}

/// Envelope answering a request successfully.
pub type ResponseEnvelope = Envelope<ResponsePayload>;
/// Envelope reporting a failed request.
pub type ErrorEnvelope = Envelope<ErrorPayload>;
/// Envelope announcing agent presence.
pub type StatusEnvelope = Envelope<StatusPayload>;

impl<P> Envelope<P> {
    fn stamped(kind: EnvelopeKind, payload: P) -> Self {
        Self {
            kind,
            id: Uuid::new_v4().to_string(),
            timestamp: now_millis(),
            payload,
        }
    }
}

impl<P: Serialize> Envelope<P> {
    /// Serialises the envelope to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload cannot be represented as JSON.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl ResponseEnvelope {
    /// Builds a response correlated with `request_id`.
    #[must_use]
    pub fn response(request_id: impl Into<String>, data: ResultMap) -> Self {
        Self::stamped(
            EnvelopeKind::Response,
            ResponsePayload {
                request_id: request_id.into(),
                data,
            },
        )
    }
}

impl ErrorEnvelope {
    /// Builds an error correlated with `request_id`.
    #[must_use]
    pub fn error(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::stamped(
            EnvelopeKind::Error,
            ErrorPayload {
                request_id: request_id.into(),
                message: message.into(),
            },
        )
    }
}

impl StatusEnvelope {
    /// Builds a status announcement.
    #[must_use]
    pub fn status(
        status: AgentStatus,
        operations: Vec<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self::stamped(
            EnvelopeKind::Status,
            StatusPayload {
                status,
                operations,
                client_id: client_id.into(),
            },
        )
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::operation::into_result;

    fn wire(bytes: &[u8]) -> Value {
        serde_json::from_slice(bytes).expect("envelope should be valid JSON")
    }

    #[test]
    fn response_uses_camel_case_fields() {
        let envelope = ResponseEnvelope::response("req-1", into_result(json!({"ok": true})));
        let value = wire(&envelope.to_bytes().expect("serialise"));

        assert_eq!(value["type"], "response");
        assert_eq!(value["payload"]["requestId"], "req-1");
        assert_eq!(value["payload"]["data"], json!({"ok": true}));
        assert!(value["timestamp"].as_u64().is_some_and(|ms| ms > 0));
    }

    #[test]
    fn error_carries_message() {
        let envelope = ErrorEnvelope::error("req-2", "Unknown operation: nope");
        let value = wire(&envelope.to_bytes().expect("serialise"));

        assert_eq!(value["type"], "error");
        assert_eq!(value["payload"]["message"], "Unknown operation: nope");
    }

    #[test]
    fn status_lists_client_and_operations() {
        let envelope = StatusEnvelope::status(
            AgentStatus::Offline,
            vec![String::from("a"), String::from("b")],
            "castle_desktop_7",
        );
        let value = wire(&envelope.to_bytes().expect("serialise"));

        assert_eq!(value["type"], "status");
        assert_eq!(value["payload"]["status"], "offline");
        assert_eq!(value["payload"]["clientId"], "castle_desktop_7");
        assert_eq!(value["payload"]["operations"], json!(["a", "b"]));
    }

    #[test]
    fn every_envelope_gets_a_fresh_id() {
        let first = ErrorEnvelope::error("r", "m");
        let second = ErrorEnvelope::error("r", "m");
        assert_ne!(first.id, second.id);
    }
}
