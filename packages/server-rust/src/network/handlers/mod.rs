//! HTTP handler definitions for the `Trellis` server.
//!
//! Defines `AppState` (the shared state carried through axum extractors)
//! and re-exports the handler functions used when building the router.

pub mod rpc;

pub use rpc::rpc_handler;

use std::sync::Arc;

use crate::service::RpcService;

/// Shared application state passed to handlers via `State` extraction.
///
/// Only holds `Arc`s, so cloning is cheap.
pub struct AppState<C> {
    /// The server adapter every RPC request goes through.
    pub service: Arc<RpcService<C>>,
}

// Manual impl: a derive would require `C: Clone`.
impl<C> Clone for AppState<C> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
        }
    }
}
