//! Demo server: a small route tree served over HTTP.
//!
//! ```text
//! demo-server --port 3000 --prefix /rpc
//! curl -X POST localhost:3000/rpc/users:create -d '{"name":"ada"}'
//! curl -X POST localhost:3000/rpc/users:get -d '{"id":1}'
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::info;
use trellis_core::{CookieOptions, Cookies, Operation, Params, RouteGroup, RpcError, SameSite, ValidationError};
use trellis_server::telemetry::init_tracing;
use trellis_server::{NetworkConfig, RpcServer, RpcService, ServeOptions};

const SESSION_COOKIE: &str = "session";

#[derive(Debug, Parser)]
#[command(name = "demo-server", about = "Serve a sample Trellis route tree over HTTP")]
struct Args {
    /// Address to bind.
    #[arg(long, env = "TRELLIS_HOST", default_value = "127.0.0.1")]
    host: String,
    /// Port to bind; 0 picks a free one.
    #[arg(long, env = "TRELLIS_PORT", default_value_t = 3000)]
    port: u16,
    /// Request path prefix the RPC paths live under.
    #[arg(long, env = "TRELLIS_PREFIX", default_value = "/rpc")]
    prefix: String,
    /// Allowed CORS origins, comma separated.
    #[arg(long = "cors-origin", env = "TRELLIS_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    cors_origins: Vec<String>,
    /// Per-request timeout in seconds.
    #[arg(long, env = "TRELLIS_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    request_timeout_secs: u64,
    /// Largest accepted request body in bytes.
    #[arg(long, env = "TRELLIS_MAX_BODY_BYTES", default_value_t = 2 * 1024 * 1024)]
    max_body_bytes: usize,
    /// Emit logs as JSON lines.
    #[arg(long, env = "TRELLIS_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            cors_origins: self.cors_origins.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            max_body_bytes: self.max_body_bytes,
        }
    }
}

// ---------------------------------------------------------------------------
// Domain
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
struct User {
    id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct GetUser {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct CreateUser {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Login {
    user: String,
}

#[derive(Debug, Default)]
struct UserStore {
    next_id: AtomicU64,
    users: RwLock<HashMap<u64, User>>,
}

/// Context of the `session` sub-tree.
#[derive(Debug, Clone)]
struct Session {
    user: Option<String>,
}

#[derive(Debug, thiserror::Error)]
#[error("not logged in")]
struct Unauthorized;

/// Attributes shared by every write of the session cookie, deletes included.
fn session_cookie() -> CookieOptions {
    CookieOptions {
        path: Some("/".to_string()),
        same_site: Some(SameSite::Lax),
        ..CookieOptions::default()
    }
}

// ---------------------------------------------------------------------------
// Route tree
// ---------------------------------------------------------------------------

fn users(store: &Arc<UserStore>) -> RouteGroup<()> {
    let get_store = Arc::clone(store);
    let create_store = Arc::clone(store);

    RouteGroup::new()
        .operation(
            "get",
            Operation::typed(move |params: Params<(), GetUser>| {
                let store = Arc::clone(&get_store);
                async move {
                    let users = store.users.read().await;
                    users.get(&params.input.id).cloned().ok_or_else(|| {
                        anyhow::Error::from(
                            RpcError::new("users:get", 404, "no such user")
                                .with_output(json!({"id": params.input.id})),
                        )
                    })
                }
            }),
        )
        .operation(
            "create",
            Operation::typed(move |params: Params<(), CreateUser>| {
                let store = Arc::clone(&create_store);
                async move {
                    if params.input.name.trim().is_empty() {
                        return Err(anyhow::Error::from(ValidationError::new("name must not be empty")));
                    }
                    if store.users.read().await.values().any(|u| u.name == params.input.name) {
                        return Err(anyhow::Error::from(ValidationError::new("name already taken")));
                    }
                    let id = store.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                    let user = User {
                        id,
                        name: params.input.name,
                    };
                    store.users.write().await.insert(id, user.clone());
                    Ok(user)
                }
            }),
        )
}

fn session() -> RouteGroup<Session> {
    RouteGroup::new()
        .operation(
            "login",
            Operation::typed(|params: Params<Session, Login>| async move {
                params
                    .cookies
                    .set_with(SESSION_COOKIE, &params.input.user, &session_cookie());
                Ok(json!({"user": params.input.user}))
            }),
        )
        .operation(
            "me",
            Operation::new(|params: Params<Session>| async move {
                let user = params.context.user.ok_or(Unauthorized)?;
                Ok(json!({"user": user}))
            }),
        )
        .operation(
            "logout",
            Operation::new(|params: Params<Session>| async move {
                params.cookies.delete_with(SESSION_COOKIE, &session_cookie());
                Ok(json!(params.context.user.is_some()))
            }),
        )
}

fn build_tree() -> RouteGroup<()> {
    let store = Arc::new(UserStore::default());

    RouteGroup::new()
        .operation(
            "ping",
            Operation::typed(|_params: Params<(), ()>| async { Ok::<_, anyhow::Error>("pong") }),
        )
        .group("users", users(&store))
        .scope(
            "session",
            |(), cookies: Cookies| async move {
                Ok(Session {
                    user: cookies.get(SESSION_COOKIE).map(str::to_owned),
                })
            },
            session(),
        )
}

fn map_error(path: &str, err: &anyhow::Error, cookies: &Cookies) -> Option<RpcError> {
    if let Some(invalid) = err.downcast_ref::<ValidationError>() {
        return Some(
            RpcError::new(path, 400, "invalid input").with_output(json!({"reason": invalid.message})),
        );
    }
    if err.downcast_ref::<Unauthorized>().is_some() {
        cookies.delete_with(SESSION_COOKIE, &session_cookie());
        return Some(RpcError::new(path, 401, err.to_string()));
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json)?;

    let options = ServeOptions::default()
        .with_prefix(args.prefix.clone())
        .on_error(map_error);
    let service = RpcService::new(build_tree(), options);

    let mut server = RpcServer::new(args.network_config(), service);
    let port = server.start().await?;
    info!("demo server listening on {}:{port}", args.host);

    server
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await
}
