//! `Trellis` Server: binds route trees to HTTP with axum.
//!
//! [`RpcService`] is the server adapter: one request in, one dispatch, one
//! JSON response out. [`RpcServer`] wraps it in an axum router with the
//! transport middleware and owns the listener lifecycle.

pub mod network;
pub mod service;
pub mod telemetry;

pub use network::{NetworkConfig, RpcServer};
pub use service::{ErrorHook, MountError, RpcService, ServeOptions};
