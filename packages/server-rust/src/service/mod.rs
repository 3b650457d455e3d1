//! Server adapter: binds a route tree to HTTP requests.
//!
//! 1. **Options** (`options`): path prefix and the `on_error` mapping hook
//! 2. **Binding** (`binding`): `RpcService`, which turns one request into one
//!    dispatch and the outcome into one JSON response

pub mod binding;
pub mod options;

pub use binding::{MountError, RpcService};
pub use options::{ErrorHook, ServeOptions};
