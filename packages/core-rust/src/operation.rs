//! Operations: the leaf units of work in a route tree.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::cookies::Cookies;
use crate::error::ValidationError;

/// Boxed, sendable future used at every type-erased seam in the tree.
pub type BoxedFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

type InputCheck = Arc<dyn Fn(Option<&Value>) -> anyhow::Result<()> + Send + Sync>;
type Resolver<C> = Arc<dyn Fn(Params<C>) -> BoxedFuture<anyhow::Result<Value>> + Send + Sync>;

/// What an operation's resolve function receives.
///
/// `I` is the raw JSON input (`None` when the request had no body) for
/// [`Operation::new`], or the decoded input type for [`Operation::typed`].
pub struct Params<C, I = Option<Value>> {
    pub input: I,
    pub context: C,
    pub cookies: Cookies,
}

/// A single invocable operation.
///
/// Holds an optional input transform, used only to reject bad input before
/// resolve runs, and the resolve function itself. Operations are built once
/// and shared read-only by every request.
pub struct Operation<C> {
    input: Option<InputCheck>,
    resolve: Resolver<C>,
}

impl<C: Send + 'static> Operation<C> {
    /// Creates an operation over raw JSON input and output.
    pub fn new<F, Fut>(resolve: F) -> Self
    where
        F: Fn(Params<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            input: None,
            resolve: Arc::new(move |params: Params<C>| -> BoxedFuture<anyhow::Result<Value>> {
                Box::pin(resolve(params))
            }),
        }
    }

    /// Creates an operation with a declared contract: input decoded into
    /// `I`, output encoded from `O`.
    ///
    /// The input transform rejects anything that does not decode into `I`
    /// with a [`ValidationError`] before resolve is called. Absent input is
    /// decoded from JSON `null`, so `I = ()` or `I = Option<T>` accept an
    /// empty body.
    pub fn typed<I, O, F, Fut>(resolve: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + 'static,
        F: Fn(Params<C, I>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
    {
        let resolve = Arc::new(resolve);
        Self::new(move |params: Params<C>| {
            let resolve = Arc::clone(&resolve);
            async move {
                let input = decode::<I>(params.input.as_ref())?;
                let output = resolve(Params {
                    input,
                    context: params.context,
                    cookies: params.cookies,
                })
                .await?;
                Ok::<_, anyhow::Error>(serde_json::to_value(output)?)
            }
        })
        .with_input(decode::<I>)
    }

    /// Installs an input transform. Its value is discarded; only its error
    /// matters, which aborts the call before resolve.
    #[must_use]
    pub fn with_input<T, E, F>(mut self, transform: F) -> Self
    where
        F: Fn(Option<&Value>) -> Result<T, E> + Send + Sync + 'static,
        anyhow::Error: From<E>,
    {
        self.input = Some(Arc::new(move |raw: Option<&Value>| {
            transform(raw).map(drop).map_err(anyhow::Error::from)
        }));
        self
    }

    #[must_use]
    pub fn has_input_transform(&self) -> bool {
        self.input.is_some()
    }

    /// Validates `input` and runs resolve.
    ///
    /// # Errors
    ///
    /// Whatever the input transform or resolve raised, unchanged.
    pub async fn invoke(
        &self,
        input: Option<Value>,
        context: C,
        cookies: Cookies,
    ) -> anyhow::Result<Value> {
        if let Some(check) = &self.input {
            check(input.as_ref())?;
        }
        (self.resolve)(Params {
            input,
            context,
            cookies,
        })
        .await
    }
}

impl<C> fmt::Debug for Operation<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("input", &self.input.is_some())
            .finish_non_exhaustive()
    }
}

fn decode<I: DeserializeOwned>(raw: Option<&Value>) -> Result<I, ValidationError> {
    let raw = raw.unwrap_or(&Value::Null);
    I::deserialize(raw).map_err(ValidationError::from)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct GetUser {
        id: u64,
    }

    #[derive(Debug, Serialize)]
    struct User {
        id: u64,
        name: String,
    }

    #[tokio::test]
    async fn raw_operation_sees_input_context_and_cookies() {
        let op = Operation::new(|params: Params<String>| async move {
            params.cookies.set("seen", "1");
            Ok(json!({"input": params.input, "context": params.context}))
        });

        let cookies = Cookies::new();
        let out = op
            .invoke(Some(json!({"id": 1})), "ctx".to_string(), cookies.clone())
            .await
            .unwrap();

        assert_eq!(out, json!({"input": {"id": 1}, "context": "ctx"}));
        assert_eq!(cookies.pending().len(), 1);
    }

    #[tokio::test]
    async fn absent_input_reaches_resolve_as_none() {
        let op = Operation::new(|params: Params<()>| async move {
            Ok(Value::Bool(params.input.is_none()))
        });
        let out = op.invoke(None, (), Cookies::new()).await.unwrap();
        assert_eq!(out, Value::Bool(true));
    }

    #[tokio::test]
    async fn input_transform_rejects_before_resolve() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let op = Operation::new(move |_params: Params<()>| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(Value::Null) }
        })
        .with_input(|raw| match raw {
            Some(Value::Number(n)) => Ok(n.clone()),
            _ => Err(ValidationError::new("expected a number")),
        });

        let err = op.invoke(Some(json!("x")), (), Cookies::new()).await.unwrap_err();
        assert!(err.downcast_ref::<ValidationError>().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        op.invoke(Some(json!(3)), (), Cookies::new()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn typed_operation_decodes_and_encodes() {
        let op = Operation::typed(|params: Params<(), GetUser>| async move {
            Ok(User {
                id: params.input.id,
                name: "ada".to_string(),
            })
        });
        assert!(op.has_input_transform());

        let out = op.invoke(Some(json!({"id": 7})), (), Cookies::new()).await.unwrap();
        assert_eq!(out, json!({"id": 7, "name": "ada"}));
    }

    #[tokio::test]
    async fn typed_operation_rejects_mismatched_input() {
        let op = Operation::typed(|params: Params<(), GetUser>| async move { Ok(params.input.id) });

        let err = op.invoke(Some(json!({"id": "seven"})), (), Cookies::new()).await.unwrap_err();
        assert!(err.downcast_ref::<ValidationError>().is_some());

        let err = op.invoke(None, (), Cookies::new()).await.unwrap_err();
        assert!(err.downcast_ref::<ValidationError>().is_some());
    }

    #[tokio::test]
    async fn typed_unit_input_accepts_empty_body() {
        let op = Operation::typed(|_params: Params<(), ()>| async { Ok("pong") });
        let out = op.invoke(None, (), Cookies::new()).await.unwrap();
        assert_eq!(out, json!("pong"));
    }

    #[tokio::test]
    async fn application_errors_propagate_unchanged() {
        let op = Operation::new(|_params: Params<()>| async { Err(anyhow::anyhow!("boom")) });
        let err = op.invoke(None, (), Cookies::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }
}
