//! `Trellis` Client: calls operations of a remote route tree over HTTP.
//!
//! Each call is one `POST <base_url><path>` with the JSON-encoded input as the
//! body (no body when there is no input). The response's `error` payload is
//! turned back into an [`RpcError`] carrying the HTTP status.

use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use trellis_core::wire::{encode_input, ResponseBody, CONTENT_TYPE_JSON};
use trellis_core::RpcError;

/// Everything a call can fail with.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server answered with an error payload.
    #[error(transparent)]
    Rpc(#[from] RpcError),
    /// The request never produced a response (connection refused, reset...).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The server answered with something other than a JSON envelope, e.g.
    /// a transport-level 408, 413 or bare 500.
    #[error("unexpected {status} response: {source}")]
    Unexpected {
        status: u16,
        #[source]
        source: serde_json::Error,
    },
    /// An input or output that does not fit its serde type.
    #[error("malformed body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// The structured server error, if that is what this is.
    #[must_use]
    pub fn as_rpc(&self) -> Option<&RpcError> {
        match self {
            Self::Rpc(err) => Some(err),
            _ => None,
        }
    }

    /// HTTP status of the response, when one was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rpc(err) => Some(err.status),
            Self::Unexpected { status, .. } => Some(*status),
            Self::Transport(err) => err.status().map(|s| s.as_u16()),
            Self::Decode(_) => None,
        }
    }
}

/// HTTP client for one server.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    /// Creates a client. `base_url` is prepended verbatim to every path, so
    /// it should end with the server's prefix and a `/`
    /// (e.g. `http://localhost:3000/rpc/`).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_http_client(reqwest::Client::new(), base_url)
    }

    /// Creates a client on top of a preconfigured `reqwest::Client`, e.g. one
    /// with a cookie store or default headers.
    #[must_use]
    pub fn with_http_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Calls `path` with raw JSON input. `None` sends no body.
    ///
    /// # Errors
    ///
    /// [`ClientError::Rpc`] when the server answered with an error payload,
    /// [`ClientError::Transport`] when the request failed, and
    /// [`ClientError::Unexpected`] when the response body is not a JSON
    /// envelope.
    pub async fn call_raw(&self, path: &str, input: Option<Value>) -> Result<Value, ClientError> {
        let url = format!("{}{path}", self.base_url);

        let mut request = self.http.post(&url).header(CONTENT_TYPE, CONTENT_TYPE_JSON);
        if let Some(body) = encode_input(input.as_ref())? {
            request = request.body(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        let body: ResponseBody = serde_json::from_slice(&bytes)
            .map_err(|source| ClientError::Unexpected { status, source })?;

        body.into_result(path, status).map_err(|err| {
            debug!(path, status, message = %err.message, "rpc call failed");
            ClientError::Rpc(err)
        })
    }

    /// Calls `path` with a typed input and decodes the output into `O`.
    ///
    /// An input that serializes to JSON `null` (`()`, `None`) is sent as an
    /// absent body.
    ///
    /// # Errors
    ///
    /// As [`call_raw`](Self::call_raw), plus [`ClientError::Decode`] when
    /// the input cannot be serialized or the output does not fit `O`.
    pub async fn call<I, O>(&self, path: &str, input: &I) -> Result<O, ClientError>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned,
    {
        let input = serde_json::to_value(input)?;
        let input = (!input.is_null()).then_some(input);
        let output = self.call_raw(path, input).await?;
        Ok(serde_json::from_value(output)?)
    }
}
