//! HTTP middleware stack for the `Trellis` server.
//!
//! Layers are listed outermost first: the first one sees the request first
//! and the response last.

use std::time::Duration;

use axum::http::header::HeaderName;
use axum::http::{Method, StatusCode};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Wraps `router` in the transport-level middleware.
///
/// 1. `SetRequestId` -- assigns a UUID v4 `x-request-id` when absent
/// 2. `Tracing` -- one span per HTTP request
/// 3. `Compression` -- gzip for JSON responses
/// 4. `CORS` -- from `config.cors_origins`, POST only
/// 5. `Timeout` -- 408 after `config.request_timeout`
/// 6. `PropagateRequestId` -- echoes `x-request-id` on the response
///
/// The RPC error mapping is not middleware; it lives in the server adapter.
pub fn with_http_layers<S>(router: Router<S>, config: &NetworkConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    router.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(build_cors_layer(&config.cors_origins))
            .layer(timeout_layer(config.request_timeout))
            .layer(PropagateRequestIdLayer::new(request_id)),
    )
}

fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// Any origin when the list contains `"*"`, otherwise the parseable entries.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| o.parse().ok()))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::POST])
        .allow_headers(Any)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::post;
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn request_id_is_assigned_and_echoed() {
        let router = with_http_layers(
            Router::new().route("/", post(|| async { "ok" })),
            &NetworkConfig::default(),
        );

        let response = router
            .oneshot(Request::post("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }

    #[tokio::test]
    async fn slow_handler_times_out_with_408() {
        let config = NetworkConfig {
            request_timeout: Duration::from_millis(20),
            ..NetworkConfig::default()
        };
        let router = with_http_layers(
            Router::new().route(
                "/",
                post(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            ),
            &config,
        );

        let response = router
            .oneshot(Request::post("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    fn preflight(origin: &str) -> Request<Body> {
        Request::options("/")
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn cors_allows_only_listed_origins() {
        let config = NetworkConfig {
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "not a header value\n".to_string(),
            ],
            ..NetworkConfig::default()
        };
        let router = with_http_layers(Router::new().route("/", post(|| async { "ok" })), &config);

        let allowed = router
            .clone()
            .oneshot(preflight("http://localhost:3000"))
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
        assert_eq!(
            allowed.headers()["access-control-allow-origin"],
            "http://localhost:3000"
        );

        let denied = router.oneshot(preflight("http://evil.test")).await.unwrap();
        assert!(!denied.headers().contains_key("access-control-allow-origin"));
    }

    #[tokio::test]
    async fn wildcard_origin_allows_any() {
        let router = with_http_layers(
            Router::new().route("/", post(|| async { "ok" })),
            &NetworkConfig::default(),
        );

        let response = router.oneshot(preflight("http://anywhere.test")).await.unwrap();
        assert_eq!(response.headers()["access-control-allow-origin"], "*");
    }
}
