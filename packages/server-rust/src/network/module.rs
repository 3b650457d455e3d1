//! Network module with deferred startup lifecycle.
//!
//! `new()` wires the service, `start()` binds the TCP listener, and
//! `serve()` accepts connections until the shutdown future resolves. Binding
//! before serving lets callers learn the OS-assigned port first.

use std::future::Future;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use super::config::NetworkConfig;
use super::handlers::{rpc_handler, AppState};
use super::middleware::with_http_layers;
use crate::service::RpcService;

/// Owns the HTTP server lifecycle for one bound route tree.
///
/// 1. `new()` -- stores the config and the shared [`RpcService`]
/// 2. `start()` -- binds the TCP listener to the configured address
/// 3. `serve()` -- accepts connections until shutdown is signalled
pub struct RpcServer<C> {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    service: Arc<RpcService<C>>,
}

impl<C> RpcServer<C>
where
    C: Default + Send + 'static,
{
    /// Creates a server without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, service: RpcService<C>) -> Self {
        Self {
            config,
            listener: None,
            service: Arc::new(service),
        }
    }

    /// Returns a shared reference to the server adapter.
    #[must_use]
    pub fn service(&self) -> Arc<RpcService<C>> {
        Arc::clone(&self.service)
    }

    /// Assembles the axum router with the RPC route and all middleware.
    ///
    /// Every POST path is routed to [`rpc_handler`]; the adapter itself
    /// strips the prefix and resolves the rest. Other methods get 405.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            service: Arc::clone(&self.service),
        };

        let router = Router::new()
            .route("/", post(rpc_handler::<C>))
            .route("/{*path}", post(rpc_handler::<C>))
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes));

        with_http_layers(router, &self.config).with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the bound port, which differs from the configured one when
    /// port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);
        for path in self.service.paths() {
            info!(path = %path, "operation registered");
        }

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves, then stops accepting and
    /// lets in-flight requests finish.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first, or if the server
    /// hits a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();

        info!("Serving RPC requests under prefix {}", self.service.options().prefix);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Server stopped");
        Ok(())
    }
}
