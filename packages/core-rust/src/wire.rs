//! JSON envelopes exchanged between client and server.
//!
//! Request body: the JSON-encoded input, or empty when there is no input.
//! Response body: `{"output": ...}` on success, or
//! `{"error": {"message": ..., "output": ...}}` on failure with the HTTP
//! status carrying the error status.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RpcError, UNKNOWN_ERROR_MESSAGE};

/// Content type of every request and response body.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Error half of a response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
}

impl ErrorBody {
    /// Builds the wire form of `error`. An empty message is replaced so that
    /// every error on the wire carries one.
    #[must_use]
    pub fn from_error(error: &RpcError) -> Self {
        let message = if error.message.is_empty() {
            UNKNOWN_ERROR_MESSAGE.to_owned()
        } else {
            error.message.clone()
        };
        Self {
            message,
            output: error.output.clone(),
        }
    }
}

/// A full response body. Exactly one of the two fields is set by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl ResponseBody {
    #[must_use]
    pub fn success(output: Value) -> Self {
        Self {
            output: Some(output),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(error: &RpcError) -> Self {
        Self {
            output: None,
            error: Some(ErrorBody::from_error(error)),
        }
    }

    /// Turns a decoded response back into the caller-facing result.
    ///
    /// `path` and `status` come from the call site and the HTTP response,
    /// since neither is part of the error payload.
    ///
    /// # Errors
    ///
    /// Returns the rebuilt [`RpcError`] when the body carries an error.
    pub fn into_result(self, path: &str, status: u16) -> Result<Value, RpcError> {
        match self.error {
            Some(error) => Err(RpcError {
                path: path.to_owned(),
                status,
                message: error.message,
                output: error.output,
            }),
            None => Ok(self.output.unwrap_or(Value::Null)),
        }
    }
}

/// Decodes a request body. An empty body means "no input".
///
/// # Errors
///
/// Returns the JSON error when a non-empty body does not parse.
pub fn decode_input(body: &[u8]) -> serde_json::Result<Option<Value>> {
    if body.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(body).map(Some)
}

/// Encodes a request body. Absent input produces no body at all.
///
/// # Errors
///
/// Returns the JSON error if serialization fails.
pub fn encode_input(input: Option<&Value>) -> serde_json::Result<Option<Vec<u8>>> {
    input.map(serde_json::to_vec).transpose()
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;

    #[test]
    fn success_body_shape() {
        let body = serde_json::to_string(&ResponseBody::success(json!({"id": 1}))).unwrap();
        assert_eq!(body, r#"{"output":{"id":1}}"#);
    }

    #[test]
    fn null_output_is_still_emitted() {
        let body = serde_json::to_string(&ResponseBody::success(Value::Null)).unwrap();
        assert_eq!(body, r#"{"output":null}"#);
    }

    #[test]
    fn failure_body_shape_with_output() {
        let err = RpcError::new("p", 400, "bad").with_output(json!({"code": 1}));
        let body = serde_json::to_string(&ResponseBody::failure(&err)).unwrap();
        assert_eq!(body, r#"{"error":{"message":"bad","output":{"code":1}}}"#);
    }

    #[test]
    fn failure_body_omits_missing_output() {
        let body = serde_json::to_string(&ResponseBody::failure(&RpcError::unknown("p"))).unwrap();
        assert_eq!(body, r#"{"error":{"message":"Unknown server error"}}"#);
    }

    #[test]
    fn empty_message_is_replaced() {
        let body = ErrorBody::from_error(&RpcError::new("p", 403, ""));
        assert_eq!(body.message, UNKNOWN_ERROR_MESSAGE);
    }

    #[test]
    fn error_payload_becomes_rpc_error() {
        let body: ResponseBody = serde_json::from_str(r#"{"error":{"message":"x"}}"#).unwrap();
        let err = body.into_result("users:get", 403).unwrap_err();
        assert_eq!(err.path, "users:get");
        assert_eq!(err.status, 403);
        assert_eq!(err.message, "x");
        assert!(err.output.is_none());
    }

    #[test]
    fn missing_output_reads_as_null() {
        let body: ResponseBody = serde_json::from_str("{}").unwrap();
        assert_eq!(body.into_result("p", 200).unwrap(), Value::Null);
    }

    #[test]
    fn empty_body_is_no_input() {
        assert_eq!(decode_input(b"").unwrap(), None);
        assert_eq!(decode_input(b"null").unwrap(), Some(Value::Null));
        assert!(decode_input(b"{oops").is_err());
        assert_eq!(encode_input(None).unwrap(), None);
    }

    fn json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|map| Value::Object(map.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn input_survives_encode_then_decode(value in json_value()) {
            let bytes = encode_input(Some(&value)).unwrap().unwrap();
            prop_assert_eq!(decode_input(&bytes).unwrap(), Some(value));
        }

        #[test]
        fn output_survives_response_envelope(value in json_value()) {
            let text = serde_json::to_string(&ResponseBody::success(value.clone())).unwrap();
            let body: ResponseBody = serde_json::from_str(&text).unwrap();
            prop_assert_eq!(body.into_result("p", 200).unwrap(), value);
        }
    }
}
