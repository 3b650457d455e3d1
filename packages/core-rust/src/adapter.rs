//! Context adapters: derive a new context before entering a sub-tree.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::cookies::Cookies;
use crate::group::{Call, Dispatch};
use crate::operation::BoxedFuture;

type Derive<Outer, Inner> =
    Arc<dyn Fn(Outer, Cookies) -> BoxedFuture<anyhow::Result<Inner>> + Send + Sync>;

/// Wraps a dispatcher expecting context `Inner` so that it can be mounted
/// where context `Outer` flows.
///
/// On every dispatch the derive function runs first with the outer context
/// and the request's cookies; its error aborts the call before the wrapped
/// tree is reached. Adapters nest: each level applies its transformation in
/// order, outermost first.
pub struct ContextAdapter<Outer, Inner> {
    derive: Derive<Outer, Inner>,
    inner: Arc<dyn Dispatch<Inner>>,
}

impl<Outer, Inner> ContextAdapter<Outer, Inner>
where
    Outer: Send + 'static,
    Inner: Send + 'static,
{
    /// Wraps `inner` behind `derive`.
    pub fn wrap<F, Fut, D>(derive: F, inner: D) -> Self
    where
        F: Fn(Outer, Cookies) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Inner>> + Send + 'static,
        D: Dispatch<Inner> + 'static,
    {
        Self {
            derive: Arc::new(
                move |context: Outer, cookies: Cookies| -> BoxedFuture<anyhow::Result<Inner>> {
                    Box::pin(derive(context, cookies))
                },
            ),
            inner: Arc::new(inner),
        }
    }
}

#[async_trait]
impl<Outer, Inner> Dispatch<Outer> for ContextAdapter<Outer, Inner>
where
    Outer: Send + 'static,
    Inner: Send + 'static,
{
    async fn dispatch(&self, call: Call<'_>, context: Outer) -> anyhow::Result<Value> {
        let derived = (self.derive)(context, call.cookies.clone())
            .await
            .inspect_err(|err| debug!(origin = call.origin, "context derivation failed: {err}"))?;
        self.inner.dispatch(call, derived).await
    }

    fn paths(&self) -> Vec<String> {
        self.inner.paths()
    }
}
