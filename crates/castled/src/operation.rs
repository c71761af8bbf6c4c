//! Handler contract for operations invoked through the dispatcher.
//!
//! An operation receives its parameters by value and returns either a result
//! map or an [`OperationError`]. Whether the work completes immediately or
//! blocks on an external process is invisible to callers: [`Operation::invoke`]
//! returns only once the operation has finished.

use std::io;

use serde_json::{Map, Value};
use thiserror::Error;

/// Parameters supplied by the sender of a request.
pub type ParamMap = Map<String, Value>;

/// Result produced by a successful operation.
pub type ResultMap = Map<String, Value>;

/// A named unit of host-machine functionality.
///
/// Implementations must not publish to the bus or depend on dispatcher state.
pub trait Operation: Send + Sync {
    /// Runs the operation to completion.
    ///
    /// # Errors
    ///
    /// Returns an [`OperationError`] describing why the operation failed. The
    /// error's display text is sent back to the requester verbatim.
    fn invoke(&self, params: ParamMap) -> Result<ResultMap, OperationError>;
}

impl<F> Operation for F
where
    F: Fn(ParamMap) -> Result<ResultMap, OperationError> + Send + Sync,
{
    fn invoke(&self, params: ParamMap) -> Result<ResultMap, OperationError> {
        self(params)
    }
}

/// Failures reported by operations.
#[derive(Debug, Error)]
pub enum OperationError {
    /// A parameter was missing or had the wrong shape.
    #[error("{message}")]
    InvalidParams { message: String },

    /// The target of the operation does not exist.
    #[error("{message}")]
    NotFound { message: String },

    /// The capability is not available on this host.
    #[error("{capability} is unavailable on this platform")]
    Unavailable { capability: String },

    /// The operation exceeded its time budget and was abandoned.
    #[error("{operation} timed out after {seconds}s")]
    TimedOut { operation: String, seconds: u64 },

    /// The operating system rejected a request.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Any other failure, described by its message.
    #[error("{message}")]
    Failed { message: String },
}

impl OperationError {
    /// Creates an invalid parameters error.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Creates an error for a required parameter that was absent.
    pub fn missing(name: &str) -> Self {
        Self::invalid_params(format!("{name} is required"))
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates an unavailable capability error.
    pub fn unavailable(capability: impl Into<String>) -> Self {
        Self::Unavailable {
            capability: capability.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timed_out(operation: impl Into<String>, seconds: u64) -> Self {
        Self::TimedOut {
            operation: operation.into(),
            seconds,
        }
    }

    /// Wraps an IO error with context describing the attempted action.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Creates a generic failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Typed accessors over a [`ParamMap`].
///
/// Absent keys and explicit `null` values are treated alike.
pub trait ParamLookup {
    /// Returns a string parameter, failing when it is absent or empty.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidParams`] when the value is missing,
    /// empty, or not a string.
    fn required_str(&self, key: &str) -> Result<&str, OperationError>;

    /// Returns a string parameter when present.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidParams`] when the value is not a string.
    fn optional_str(&self, key: &str) -> Result<Option<&str>, OperationError>;

    /// Returns a non-negative integer parameter when present.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidParams`] when the value is not a
    /// non-negative integer.
    fn optional_u64(&self, key: &str) -> Result<Option<u64>, OperationError>;

    /// Returns a numeric parameter when present.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidParams`] when the value is not a number.
    fn optional_f64(&self, key: &str) -> Result<Option<f64>, OperationError>;

    /// Returns a boolean parameter when present.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidParams`] when the value is not a boolean.
    fn optional_bool(&self, key: &str) -> Result<Option<bool>, OperationError>;

    /// Returns a list of strings, or an empty list when absent.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::InvalidParams`] when the value is not an
    /// array of strings.
    fn string_list(&self, key: &str) -> Result<Vec<String>, OperationError>;
}

impl ParamLookup for ParamMap {
    fn required_str(&self, key: &str) -> Result<&str, OperationError> {
        match self.optional_str(key)? {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(OperationError::missing(key)),
        }
    }

    fn optional_str(&self, key: &str) -> Result<Option<&str>, OperationError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(value)) => Ok(Some(value.as_str())),
            Some(_) => Err(wrong_type(key, "a string")),
        }
    }

    fn optional_u64(&self, key: &str) -> Result<Option<u64>, OperationError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_u64()
                .map(Some)
                .ok_or_else(|| wrong_type(key, "a non-negative integer")),
        }
    }

    fn optional_f64(&self, key: &str) -> Result<Option<f64>, OperationError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value
                .as_f64()
                .map(Some)
                .ok_or_else(|| wrong_type(key, "a number")),
        }
    }

    fn optional_bool(&self, key: &str) -> Result<Option<bool>, OperationError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(value)) => Ok(Some(*value)),
            Some(_) => Err(wrong_type(key, "a boolean")),
        }
    }

    fn string_list(&self, key: &str) -> Result<Vec<String>, OperationError> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_owned)
                        .ok_or_else(|| wrong_type(key, "an array of strings"))
                })
                .collect(),
            Some(_) => Err(wrong_type(key, "an array of strings")),
        }
    }
}

fn wrong_type(key: &str, expected: &str) -> OperationError {
    OperationError::invalid_params(format!("{key} must be {expected}"))
}

/// Converts a JSON value into a result map.
///
/// Objects are used as-is; any other value is wrapped under a `value` key.
pub fn into_result(value: Value) -> ResultMap {
    match value {
        Value::Object(map) => map,
        other => {
            let mut map = ResultMap::new();
            map.insert(String::from("value"), other);
            map
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn params(value: Value) -> ParamMap {
        into_result(value)
    }

    #[test]
    fn closures_satisfy_the_contract() {
        let echo = |params: ParamMap| -> Result<ResultMap, OperationError> { Ok(params) };
        let result = echo
            .invoke(params(json!({"text": "hi"})))
            .expect("echo should succeed");
        assert_eq!(result.get("text"), Some(&json!("hi")));
    }

    #[rstest]
    #[case(json!({}))]
    #[case(json!({"command": null}))]
    #[case(json!({"command": ""}))]
    fn required_str_reports_missing_values(#[case] input: Value) {
        let error = params(input)
            .required_str("command")
            .expect_err("value should be rejected");
        assert_eq!(error.to_string(), "command is required");
    }

    #[test]
    fn optional_u64_rejects_negative_numbers() {
        let error = params(json!({"limit": -3}))
            .optional_u64("limit")
            .expect_err("negative limit should be rejected");
        assert!(matches!(error, OperationError::InvalidParams { .. }));
    }

    #[test]
    fn string_list_defaults_to_empty() {
        let list = params(json!({})).string_list("args").expect("list");
        assert!(list.is_empty());
    }

    #[test]
    fn string_list_rejects_mixed_items() {
        let result = params(json!({"args": ["-v", 3]})).string_list("args");
        assert!(result.is_err());
    }

    #[test]
    fn into_result_wraps_scalars() {
        let map = into_result(json!(42));
        assert_eq!(map.get("value"), Some(&json!(42)));
    }

    #[test]
    fn unavailable_message_names_capability() {
        let error = OperationError::unavailable("window management");
        assert_eq!(
            error.to_string(),
            "window management is unavailable on this platform"
        );
    }
}
