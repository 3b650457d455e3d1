//! Network configuration for the `Trellis` server.

use std::time::Duration;

/// Transport-level settings of an [`RpcServer`](super::RpcServer).
///
/// The RPC prefix lives in [`ServeOptions`](crate::service::ServeOptions),
/// next to the route tree it applies to.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Bind address for the server.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Allowed CORS origins. `"*"` allows any origin.
    pub cors_origins: Vec<String>,
    /// Maximum time a request may take, body read and dispatch included.
    pub request_timeout: Duration,
    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            request_timeout: Duration::from_secs(30),
            max_body_bytes: 2 * 1024 * 1024, // 2 MiB
        }
    }
}

impl NetworkConfig {
    /// `host:port` string suitable for binding.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
