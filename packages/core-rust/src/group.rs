//! Route groups: the dispatch tree that resolves a path to an operation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use crate::adapter::ContextAdapter;
use crate::cookies::Cookies;
use crate::error::RpcError;
use crate::operation::Operation;
use crate::path::{join_path, split_path};

// ---------------------------------------------------------------------------
// Call
// ---------------------------------------------------------------------------

/// Request-scoped arguments threaded through one dispatch.
#[derive(Debug, Clone)]
pub struct Call<'a> {
    /// The full path the caller asked for. Never changes while descending.
    pub origin: &'a str,
    /// What is left of the path at the current level.
    pub path: &'a str,
    /// Raw input, `None` when the request carried no body.
    pub input: Option<Value>,
    pub cookies: Cookies,
}

impl<'a> Call<'a> {
    /// Starts a dispatch at the root of a tree.
    #[must_use]
    pub fn new(path: &'a str, input: Option<Value>, cookies: Cookies) -> Self {
        Self {
            origin: path,
            path,
            input,
            cookies,
        }
    }

    fn descend(self, rest: &'a str) -> Self {
        Self { path: rest, ..self }
    }
}

// ---------------------------------------------------------------------------
// Dispatch trait
// ---------------------------------------------------------------------------

/// Anything that can resolve a path under a context of type `C`.
///
/// Implemented by [`RouteGroup`] and [`ContextAdapter`]. Implementations are
/// shared across concurrent requests and must not mutate themselves.
#[async_trait]
pub trait Dispatch<C: Send + 'static>: Send + Sync {
    /// Resolves `call.path` and invokes the operation it names.
    ///
    /// # Errors
    ///
    /// [`RpcError`] with status 404 when the path does not name an
    /// operation; otherwise whatever the operation or an adapter raised.
    async fn dispatch(&self, call: Call<'_>, context: C) -> anyhow::Result<Value>;

    /// Full paths of every operation reachable from this node, sorted.
    fn paths(&self) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// RouteGroup
// ---------------------------------------------------------------------------

/// One child of a [`RouteGroup`].
pub enum Route<C> {
    Operation(Operation<C>),
    /// Nested group sharing this group's context type.
    Group(RouteGroup<C>),
    /// Sub-tree behind a type-erased dispatcher, typically a
    /// [`ContextAdapter`] that switches to another context type.
    Mount(Arc<dyn Dispatch<C>>),
}

/// A named collection of operations and nested groups.
///
/// Built once at startup with the consuming builder methods, then shared
/// read-only (usually behind an `Arc`).
pub struct RouteGroup<C> {
    routes: HashMap<String, Route<C>>,
}

impl<C: Send + 'static> RouteGroup<C> {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Registers an operation under `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is already registered in this group.
    #[must_use]
    pub fn operation(self, key: impl Into<String>, operation: Operation<C>) -> Self {
        self.insert(key.into(), Route::Operation(operation))
    }

    /// Registers a nested group under `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is already registered in this group.
    #[must_use]
    pub fn group(self, key: impl Into<String>, group: RouteGroup<C>) -> Self {
        self.insert(key.into(), Route::Group(group))
    }

    /// Registers any dispatcher under `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is already registered in this group.
    #[must_use]
    pub fn mount<D>(self, key: impl Into<String>, node: D) -> Self
    where
        D: Dispatch<C> + 'static,
    {
        self.insert(key.into(), Route::Mount(Arc::new(node)))
    }

    /// Registers `group` under `key` behind a context adapter built from
    /// `derive`. Shorthand for `mount(key, ContextAdapter::wrap(derive, group))`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is already registered in this group.
    #[must_use]
    pub fn scope<Inner, F, Fut>(self, key: impl Into<String>, derive: F, group: RouteGroup<Inner>) -> Self
    where
        Inner: Send + 'static,
        F: Fn(C, Cookies) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<Inner>> + Send + 'static,
    {
        self.mount(key, ContextAdapter::wrap(derive, group))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn insert(mut self, key: String, route: Route<C>) -> Self {
        assert!(
            !self.routes.contains_key(&key),
            "route key `{key}` registered twice in the same group"
        );
        self.routes.insert(key, route);
        self
    }

    fn collect_paths(&self, parent: Option<&str>, out: &mut Vec<String>) {
        for (key, route) in &self.routes {
            let full = join_path(parent, key);
            match route {
                Route::Operation(_) => out.push(full),
                Route::Group(group) => group.collect_paths(Some(&full), out),
                Route::Mount(node) => {
                    out.extend(node.paths().iter().map(|p| join_path(Some(&full), p)));
                }
            }
        }
    }
}

impl<C: Send + 'static> Default for RouteGroup<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for RouteGroup<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.routes.keys().collect();
        keys.sort();
        f.debug_struct("RouteGroup").field("routes", &keys).finish()
    }
}

#[async_trait]
impl<C: Send + 'static> Dispatch<C> for RouteGroup<C> {
    async fn dispatch(&self, call: Call<'_>, context: C) -> anyhow::Result<Value> {
        // Plain nested groups are walked here; only mounts recurse, since
        // they may change the context type.
        let mut group = self;
        let mut path = call.path;
        loop {
            let (head, rest) = split_path(path);
            let Some(route) = group.routes.get(head) else {
                trace!(origin = call.origin, path, "no route for path");
                return Err(RpcError::not_found(call.origin, path).into());
            };
            match (route, rest) {
                (Route::Operation(operation), _) => {
                    return operation.invoke(call.input, context, call.cookies).await;
                }
                (Route::Group(_) | Route::Mount(_), None) => {
                    trace!(origin = call.origin, path, "path ends at a group");
                    return Err(RpcError::not_found(call.origin, path).into());
                }
                (Route::Group(child), Some(rest)) => {
                    group = child;
                    path = rest;
                }
                (Route::Mount(node), Some(rest)) => {
                    return node.dispatch(call.descend(rest), context).await;
                }
            }
        }
    }

    fn paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_paths(None, &mut out);
        out.sort();
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::operation::Params;

    fn echo(tag: &'static str) -> Operation<()> {
        Operation::new(move |params: Params<()>| async move {
            Ok(json!({"op": tag, "input": params.input}))
        })
    }

    fn counted(counter: &Arc<AtomicUsize>) -> Operation<()> {
        let counter = Arc::clone(counter);
        Operation::new(move |_params: Params<()>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(Value::Null) }
        })
    }

    async fn run(root: &RouteGroup<()>, path: &str, input: Option<Value>) -> anyhow::Result<Value> {
        root.dispatch(Call::new(path, input, Cookies::new()), ()).await
    }

    fn status_of(err: &anyhow::Error) -> u16 {
        err.downcast_ref::<RpcError>().map_or(0, |e| e.status)
    }

    #[tokio::test]
    async fn resolves_nested_operation_with_input() {
        let root = RouteGroup::new().group("users", RouteGroup::new().operation("get", echo("get")));

        let out = run(&root, "users:get", Some(json!({"id": 1}))).await.unwrap();
        assert_eq!(out, json!({"op": "get", "input": {"id": 1}}));
    }

    #[tokio::test]
    async fn missing_key_is_not_found_with_attempted_path() {
        let root = RouteGroup::new().group("users", RouteGroup::new().operation("get", echo("get")));

        let err = run(&root, "users:missing", None).await.unwrap_err();
        let rpc = err.downcast_ref::<RpcError>().unwrap();
        assert_eq!(rpc.status, 404);
        assert!(rpc.message.contains("users:missing"));
        assert_eq!(rpc.path, "missing");
    }

    #[tokio::test]
    async fn unknown_top_level_key_is_not_found() {
        let root = RouteGroup::new().operation("ping", echo("ping"));
        let err = run(&root, "pong", None).await.unwrap_err();
        assert_eq!(status_of(&err), 404);
    }

    #[tokio::test]
    async fn path_ending_on_group_is_not_found() {
        let root = RouteGroup::new().group("users", RouteGroup::new().operation("get", echo("get")));
        let err = run(&root, "users", None).await.unwrap_err();
        assert_eq!(status_of(&err), 404);
    }

    #[tokio::test]
    async fn trailing_delimiter_looks_up_empty_key() {
        let root = RouteGroup::new().group(
            "users",
            RouteGroup::new().operation("", echo("empty")).operation("get", echo("get")),
        );
        let out = run(&root, "users:", None).await.unwrap();
        assert_eq!(out["op"], "empty");
    }

    #[tokio::test]
    async fn operation_key_ignores_remaining_segments() {
        // An operation matched on the head segment is invoked regardless of
        // what follows the delimiter.
        let root = RouteGroup::new().operation("get", echo("get"));
        let out = run(&root, "get:extra", None).await.unwrap();
        assert_eq!(out["op"], "get");
    }

    #[tokio::test]
    async fn matching_is_case_sensitive() {
        let root = RouteGroup::new().operation("get", echo("get"));
        let err = run(&root, "GET", None).await.unwrap_err();
        assert_eq!(status_of(&err), 404);
    }

    #[tokio::test]
    async fn deep_trees_are_walked_without_recursion_limits() {
        let mut group = RouteGroup::new().operation("leaf", echo("leaf"));
        let mut path = String::from("leaf");
        for _ in 0..500 {
            group = RouteGroup::new().group("n", group);
            path = format!("n:{path}");
        }
        let out = run(&group, &path, None).await.unwrap();
        assert_eq!(out["op"], "leaf");
    }

    #[tokio::test]
    async fn every_registered_path_reaches_its_operation_exactly_once() {
        let counters: Vec<_> = (0..4).map(|_| Arc::new(AtomicUsize::new(0))).collect();
        let root = RouteGroup::new()
            .operation("a", counted(&counters[0]))
            .group(
                "b",
                RouteGroup::new()
                    .operation("c", counted(&counters[1]))
                    .group("d", RouteGroup::new().operation("e", counted(&counters[2]))),
            )
            .operation("f", counted(&counters[3]));

        let paths = root.paths();
        assert_eq!(paths, vec!["a", "b:c", "b:d:e", "f"]);

        for path in &paths {
            run(&root, path, None).await.unwrap();
        }
        for counter in &counters {
            assert_eq!(counter.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn errors_from_operations_pass_through_unchanged() {
        let root = RouteGroup::new().operation(
            "fail",
            Operation::new(|_params: Params<()>| async { Err(anyhow::anyhow!("boom")) }),
        );
        let err = run(&root, "fail", None).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(err.downcast_ref::<RpcError>().is_none());
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_keys_panic_at_construction() {
        let _ = RouteGroup::new().operation("a", echo("a")).operation("a", echo("b"));
    }

    #[test]
    fn debug_lists_sorted_keys() {
        let root = RouteGroup::new().operation("b", echo("b")).operation("a", echo("a"));
        assert_eq!(format!("{root:?}"), r#"RouteGroup { routes: ["a", "b"] }"#);
        assert_eq!(root.len(), 2);
        assert!(!root.is_empty());
    }
}
