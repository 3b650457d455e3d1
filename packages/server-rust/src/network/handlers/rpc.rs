//! RPC endpoint handler.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::error;

use super::AppState;

/// Handles `POST <prefix>/<path>` with a JSON (or empty) body.
///
/// Every dispatch outcome is produced by the server adapter. A path outside
/// the configured prefix means the router and the adapter disagree about
/// where the service is mounted; it is logged as an error and answered with
/// a bare 500.
pub async fn rpc_handler<C>(
    State(state): State<AppState<C>>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    C: Default + Send + 'static,
{
    match state.service.handle(uri.path(), &headers, &body).await {
        Ok(response) => response,
        Err(err) => {
            error!("RPC binding misconfigured: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
