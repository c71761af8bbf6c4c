//! Request decoding for the dispatch loop.

use serde::Deserialize;
use serde_json::Value;

use super::errors::{DecodeError, DispatchError};
use crate::operation::ParamMap;

/// Inbound request envelope.
///
/// Only the identifier is required for decoding to succeed; the payload is
/// validated separately so that shape problems can be reported back under the
/// request's identifier.
#[derive(Debug, Deserialize)]
pub(crate) struct RequestEnvelope {
    /// Sender-chosen correlation identifier.
    pub id: String,
    /// Action and parameters.
    #[serde(default)]
    pub payload: Value,
}

impl RequestEnvelope {
    /// Parses a raw message body.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the body is empty, is not JSON, is not an
    /// object, or lacks a string `id`.
    pub fn parse(body: &[u8]) -> Result<Self, DecodeError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(DecodeError::Empty);
        }
        Ok(serde_json::from_slice(body)?)
    }
}

/// Operation name and parameters extracted from a request payload.
#[derive(Debug, PartialEq)]
pub(crate) struct Invocation {
    pub action: String,
    pub params: ParamMap,
}

impl Invocation {
    /// Validates a request payload.
    ///
    /// An absent payload, action, or params behaves like an empty one. The
    /// action name is used verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MissingAction`] when no non-empty action is
    /// present, or [`DispatchError::InvalidField`] when the payload, action,
    /// or params have the wrong JSON type.
    pub fn from_payload(payload: Value) -> Result<Self, DispatchError> {
        let mut payload = match payload {
            Value::Null => return Err(DispatchError::MissingAction),
            Value::Object(map) => map,
            _ => return Err(DispatchError::invalid_field("payload", "an object")),
        };

        let action = match payload.remove("action") {
            None | Some(Value::Null) => return Err(DispatchError::MissingAction),
            Some(Value::String(action)) if action.is_empty() => {
                return Err(DispatchError::MissingAction);
            }
            Some(Value::String(action)) => action,
            Some(_) => return Err(DispatchError::invalid_field("action", "a string")),
        };

        let params = match payload.remove("params") {
            None | Some(Value::Null) => ParamMap::new(),
            Some(Value::Object(params)) => params,
            Some(_) => return Err(DispatchError::invalid_field("params", "an object")),
        };

        Ok(Self { action, params })
    }
}
