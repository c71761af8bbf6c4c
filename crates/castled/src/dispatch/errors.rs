//! Error types for request decoding and dispatch.

use thiserror::Error;

use crate::operation::OperationError;

/// Reasons an inbound message could not be decoded into a request.
///
/// Decode failures cannot be answered because no request identifier is
/// available to correlate a reply with.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The message body was empty or whitespace.
    #[error("empty request body")]
    Empty,

    /// The body was not a JSON object with a string `id`.
    #[error("malformed request: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Failures reported back to the requester in an error envelope.
///
/// The display text of each variant is the exact message placed in the
/// envelope.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request payload named no action.
    #[error("Missing 'action' in payload")]
    MissingAction,

    /// A request field had the wrong JSON type.
    #[error("'{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    /// No operation is registered under the requested action.
    #[error("Unknown operation: {action}")]
    UnknownOperation { action: String },

    /// The operation panicked instead of returning.
    #[error("Operation '{action}' failed unexpectedly")]
    Panicked { action: String },

    /// The operation returned an error.
    #[error(transparent)]
    Operation(#[from] OperationError),
}

impl DispatchError {
    /// Creates an invalid field error.
    pub fn invalid_field(field: &'static str, expected: &'static str) -> Self {
        Self::InvalidField { field, expected }
    }

    /// Creates an unknown operation error.
    pub fn unknown_operation(action: impl Into<String>) -> Self {
        Self::UnknownOperation {
            action: action.into(),
        }
    }

    /// Creates an error for an operation that panicked.
    pub fn panicked(action: impl Into<String>) -> Self {
        Self::Panicked {
            action: action.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(DispatchError::MissingAction, "Missing 'action' in payload")]
    #[case(DispatchError::unknown_operation("fly"), "Unknown operation: fly")]
    #[case(
        DispatchError::invalid_field("params", "an object"),
        "'params' must be an object"
    )]
    #[case(
        DispatchError::Operation(OperationError::missing("text")),
        "text is required"
    )]
    fn messages_match_wire_text(#[case] error: DispatchError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }
}
