//! Server adapter: bridges one HTTP request to one dispatch call and back.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::response::Response;
use futures_util::FutureExt;
use http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument};
use trellis_core::wire::{decode_input, CONTENT_TYPE_JSON};
use trellis_core::{Call, Cookies, Dispatch, ResponseBody, RpcError};

use super::options::ServeOptions;

/// Body sent if a response body cannot be serialized.
const FALLBACK_BODY: &[u8] = br#"{"error":{"message":"Unknown server error"}}"#;

// ---------------------------------------------------------------------------
// MountError
// ---------------------------------------------------------------------------

/// The request could not be handed to the route tree at all.
///
/// This signals a binding misconfiguration (the server is receiving paths it
/// was not mounted for), not a per-request failure, so it never reaches the
/// `on_error` hook.
#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("request path `{path}` is outside the configured prefix `{prefix}`")]
    PrefixMismatch { path: String, prefix: String },
}

// ---------------------------------------------------------------------------
// RpcService
// ---------------------------------------------------------------------------

/// Binds a root route tree to HTTP request/response values.
///
/// Every request gets a fresh `C::default()` root context and its own
/// cookie accessor. The response is assembled in [`finalize`], which every
/// exit path goes through exactly once.
pub struct RpcService<C> {
    root: Arc<dyn Dispatch<C>>,
    options: ServeOptions,
}

impl<C> RpcService<C>
where
    C: Default + Send + 'static,
{
    pub fn new<D>(root: D, options: ServeOptions) -> Self
    where
        D: Dispatch<C> + 'static,
    {
        Self::from_shared(Arc::new(root), options)
    }

    #[must_use]
    pub fn from_shared(root: Arc<dyn Dispatch<C>>, options: ServeOptions) -> Self {
        Self { root, options }
    }

    #[must_use]
    pub fn options(&self) -> &ServeOptions {
        &self.options
    }

    /// Full paths of every operation in the bound tree.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.root.paths()
    }

    /// Strips the configured prefix, then a single leading `/`.
    ///
    /// The prefix must end on a segment boundary: with prefix `/rpc`,
    /// `/rpc/users:get` maps to `users:get` but `/rpcx` is rejected.
    ///
    /// # Errors
    ///
    /// [`MountError::PrefixMismatch`] when `request_path` is not under the
    /// prefix.
    pub fn strip_prefix<'a>(&self, request_path: &'a str) -> Result<&'a str, MountError> {
        let prefix = self.options.prefix.as_str();
        let mismatch = || MountError::PrefixMismatch {
            path: request_path.to_owned(),
            prefix: prefix.to_owned(),
        };

        let rest = request_path.strip_prefix(prefix).ok_or_else(mismatch)?;
        if prefix.ends_with('/') || rest.is_empty() {
            return Ok(rest);
        }
        rest.strip_prefix('/').ok_or_else(mismatch)
    }

    /// Handles one request.
    ///
    /// `request_path` is the path component of the request URI, `headers`
    /// its headers, `body` the fully buffered body.
    ///
    /// # Errors
    ///
    /// [`MountError`] when the request path is outside the prefix. Every
    /// dispatch outcome, success or failure, is an `Ok` response.
    pub async fn handle(
        &self,
        request_path: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Response, MountError> {
        let path = self.strip_prefix(request_path)?;
        let cookies = Cookies::from_headers(
            headers
                .get_all(COOKIE)
                .iter()
                .filter_map(|value| value.to_str().ok()),
        );

        let span = info_span!(
            "rpc",
            path = path,
            status = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );

        let response = async move {
            let start = Instant::now();

            let (status, body) = match self.run(path, body, cookies.clone()).await {
                Ok(output) => (StatusCode::OK, ResponseBody::success(output)),
                Err(err) => {
                    let error = self.map_error(path, &err, &cookies);
                    let status = StatusCode::from_u16(error.status)
                        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                    (status, ResponseBody::failure(&error))
                }
            };
            let response = finalize(status, &body, &cookies);

            let elapsed = start.elapsed();
            #[allow(clippy::cast_possible_truncation)]
            let duration_ms = elapsed.as_millis() as u64;
            let status = response.status().as_u16();
            tracing::Span::current().record("status", status);
            tracing::Span::current().record("duration_ms", duration_ms);

            let outcome = if response.status().is_success() { "ok" } else { "error" };
            metrics::counter!("trellis_rpc_requests_total", "outcome" => outcome).increment(1);
            metrics::histogram!("trellis_rpc_request_duration_seconds")
                .record(elapsed.as_secs_f64());

            tracing::info!(status, duration_ms, outcome, "rpc complete");
            response
        }
        .instrument(span)
        .await;

        Ok(response)
    }

    /// Decodes the body and dispatches it. Panics are turned into errors.
    async fn run(&self, path: &str, body: &[u8], cookies: Cookies) -> anyhow::Result<Value> {
        let input = decode_input(body).map_err(|err| {
            RpcError::bad_request(path, format!("request body is not valid JSON: {err}"))
        })?;

        let dispatch = self.root.dispatch(Call::new(path, input, cookies), C::default());
        match AssertUnwindSafe(dispatch).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(anyhow::anyhow!(
                "operation panicked: {}",
                panic_message(panic.as_ref())
            )),
        }
    }

    /// Resolves the error sent to the caller.
    ///
    /// Order: the `on_error` hook, then an `RpcError` raised as-is (not
    /// found, bad body, or one an operation raised on purpose), then a
    /// generic 500 that leaks nothing.
    fn map_error(&self, path: &str, err: &anyhow::Error, cookies: &Cookies) -> RpcError {
        if let Some(mapped) = self.options.on_error.as_ref().and_then(|hook| {
            // A panicking hook counts as declining; the response is still finalized.
            std::panic::catch_unwind(AssertUnwindSafe(|| hook(path, err, cookies)))
                .unwrap_or_else(|panic| {
                    warn!("on_error hook panicked: {}", panic_message(panic.as_ref()));
                    None
                })
        }) {
            debug!(status = mapped.status, "error mapped by on_error hook");
            return mapped;
        }

        if let Some(rpc) = err.downcast_ref::<RpcError>() {
            debug!(status = rpc.status, "{rpc}");
            return rpc.clone();
        }

        warn!("unmapped error for {path}: {err:#}");
        RpcError::unknown(path)
    }
}

/// Assembles the response: JSON body, content type, and the buffered
/// cookie writes, drained here and nowhere else.
fn finalize(status: StatusCode, body: &ResponseBody, cookies: &Cookies) -> Response {
    let (status, bytes) = match serde_json::to_vec(body) {
        Ok(bytes) => (status, bytes),
        Err(err) => {
            warn!("failed to encode response body: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, FALLBACK_BODY.to_vec())
        }
    };

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_JSON));
    for directive in cookies.take_set_cookies() {
        match HeaderValue::from_str(&directive) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(err) => warn!("dropping unencodable Set-Cookie directive: {err}"),
        }
    }

    response
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
