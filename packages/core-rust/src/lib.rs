//! `Trellis` Core: route trees, context adapters, cookies, and wire envelopes.
//!
//! A tree of [`RouteGroup`]s maps `:`-delimited paths to [`Operation`]s.
//! [`ContextAdapter`]s derive a new context for the sub-tree they wrap.
//! Nothing in this crate touches a transport; the server and client crates
//! bind it to HTTP.

pub mod adapter;
pub mod cookies;
pub mod error;
pub mod group;
pub mod operation;
pub mod path;
pub mod wire;

pub use adapter::ContextAdapter;
pub use cookies::{CookieOptions, Cookies, SameSite};
pub use error::{RpcError, ValidationError};
pub use group::{Call, Dispatch, Route, RouteGroup};
pub use operation::{BoxedFuture, Operation, Params};
pub use path::{split_path, PATH_DELIMITER};
pub use wire::{ErrorBody, ResponseBody};
