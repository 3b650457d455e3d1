//! Error types shared by the server and the client.

use serde_json::Value;

/// Status used when an arbitrary error reaches the server boundary unmapped.
pub const STATUS_INTERNAL: u16 = 500;
/// Status used when a path does not resolve to an operation.
pub const STATUS_NOT_FOUND: u16 = 404;
/// Status used when the request body is not valid JSON.
pub const STATUS_BAD_REQUEST: u16 = 400;

/// Message sent for errors the server refuses to describe.
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown server error";

/// The single structured error that crosses the client/server boundary.
///
/// On the server it is raised by dispatch (`NotFound`), by operations that
/// want to control what the caller sees, or produced by the `on_error` hook.
/// On the client it is rebuilt from the `{"error": ...}` response payload.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct RpcError {
    /// The path that was attempted when the error occurred.
    pub path: String,
    /// Numeric status code, mirrored as the HTTP status on the wire.
    pub status: u16,
    /// Human readable message.
    pub message: String,
    /// Optional structured payload echoed to the caller.
    pub output: Option<Value>,
}

impl RpcError {
    /// Creates an error without an output payload.
    #[must_use]
    pub fn new(path: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status,
            message: message.into(),
            output: None,
        }
    }

    /// Attaches a structured payload.
    #[must_use]
    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    /// Dispatch miss. `origin` is the full path the caller asked for, `path`
    /// is what was left of it at the level where the lookup failed.
    #[must_use]
    pub fn not_found(origin: &str, path: &str) -> Self {
        Self::new(
            path,
            STATUS_NOT_FOUND,
            format!("operation `{origin}` not found"),
        )
    }

    /// Generic 500 with no details, used when nothing mapped the error.
    #[must_use]
    pub fn unknown(path: impl Into<String>) -> Self {
        Self::new(path, STATUS_INTERNAL, UNKNOWN_ERROR_MESSAGE)
    }

    /// The request body could not be decoded.
    #[must_use]
    pub fn bad_request(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(path, STATUS_BAD_REQUEST, message)
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status == STATUS_NOT_FOUND
    }
}

/// Raised by an operation's input transform when the raw input does not
/// match what the operation accepts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid input: {message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn not_found_names_full_path_and_keeps_remaining_path() {
        let err = RpcError::not_found("users:missing", "missing");
        assert_eq!(err.status, 404);
        assert_eq!(err.path, "missing");
        assert!(err.message.contains("users:missing"));
        assert!(err.is_not_found());
        assert!(err.output.is_none());
    }

    #[test]
    fn unknown_error_has_no_output() {
        let err = RpcError::unknown("a:b");
        assert_eq!(err.status, 500);
        assert_eq!(err.message, UNKNOWN_ERROR_MESSAGE);
        assert!(err.output.is_none());
    }

    #[test]
    fn display_is_the_message() {
        let err = RpcError::new("p", 400, "bad").with_output(json!({"code": 1}));
        assert_eq!(err.to_string(), "bad");
        assert_eq!(err.output, Some(json!({"code": 1})));
    }

    #[test]
    fn rpc_error_survives_anyhow_round_trip() {
        let err: anyhow::Error = RpcError::new("p", 418, "teapot").into();
        let back = err.downcast_ref::<RpcError>().unwrap();
        assert_eq!(back.status, 418);
    }

    #[test]
    fn validation_error_from_serde() {
        let serde_err = serde_json::from_str::<u32>("\"x\"").unwrap_err();
        let err = ValidationError::from(serde_err);
        assert!(err.to_string().starts_with("invalid input: "));
    }
}
