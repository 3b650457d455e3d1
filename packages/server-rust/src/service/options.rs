//! Binding options for the server adapter.

use std::fmt;
use std::sync::Arc;

use trellis_core::{Cookies, RpcError};

/// Maps an error raised during dispatch into the error sent to the caller.
///
/// Receives the dispatched path, the raised error and the request's cookies
/// (so it can, for instance, clear a session cookie on an auth failure).
/// Returning `None` declines the mapping.
pub type ErrorHook = Arc<dyn Fn(&str, &anyhow::Error, &Cookies) -> Option<RpcError> + Send + Sync>;

/// How a route tree is bound to incoming requests.
#[derive(Clone)]
pub struct ServeOptions {
    /// Leading part of the request path that is not part of the RPC path.
    pub prefix: String,
    /// Optional error mapping hook.
    pub on_error: Option<ErrorHook>,
}

impl ServeOptions {
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Installs the error mapping hook.
    #[must_use]
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &anyhow::Error, &Cookies) -> Option<RpcError> + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(hook));
        self
    }
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            prefix: "/".to_string(),
            on_error: None,
        }
    }
}

impl fmt::Debug for ServeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServeOptions")
            .field("prefix", &self.prefix)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}
