//! Middleware chain
//!
//! A middleware receives the context, the request and a [`Next`] handle for
//! the rest of the chain. It may call `next.run(..)` (optionally altering the
//! request or the response) or short-circuit by returning without calling it.
//!
//! Chains compose by pure wrapping: [`MiddlewareChain::build`] folds the list
//! right-to-left around a terminal handler, so the first middleware added is
//! the outermost wrapper and the last added sits directly around the handler.
//!
//! ```rust
//! use typed_rpc_server::middleware::{self, MiddlewareChain};
//!
//! let mut chain = MiddlewareChain::new();
//! chain.push(middleware::from_fn(|ctx, request, next| async move {
//!     tracing::debug!("calling {}", request.method);
//!     next.run(ctx, request).await
//! }));
//! assert_eq!(chain.len(), 1);
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::context::RpcContext;
use crate::error::HandlerError;
use crate::request::JsonRpcRequest;
use crate::response::JsonRpcResponse;

/// Result of running (part of) a chain. An `Err` is mapped through the error
/// model into an error response by the dispatch engine.
pub type MiddlewareResult = Result<JsonRpcResponse, HandlerError>;

type BoxHandler =
    Arc<dyn Fn(RpcContext, JsonRpcRequest) -> BoxFuture<'static, MiddlewareResult> + Send + Sync>;

/// The remainder of a chain, down to the terminal handler
#[derive(Clone)]
pub struct Next {
    inner: BoxHandler,
}

impl Next {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(RpcContext, JsonRpcRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MiddlewareResult> + Send + 'static,
    {
        Self {
            inner: Arc::new(move |ctx, request| Box::pin(handler(ctx, request))),
        }
    }

    pub async fn run(&self, ctx: RpcContext, request: JsonRpcRequest) -> MiddlewareResult {
        (self.inner)(ctx, request).await
    }

    #[cfg(test)]
    pub(crate) fn ptr_eq(&self, other: &Next) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Next {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").finish_non_exhaustive()
    }
}

/// A wrapper around the rest of a method's handling
#[async_trait]
pub trait RpcMiddleware: Send + Sync {
    async fn handle(&self, ctx: RpcContext, request: JsonRpcRequest, next: Next)
    -> MiddlewareResult;
}

/// Middleware backed by an async closure; see [`from_fn`]
pub struct FnMiddleware<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> RpcMiddleware for FnMiddleware<F>
where
    F: Fn(RpcContext, JsonRpcRequest, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareResult> + Send + 'static,
{
    async fn handle(
        &self,
        ctx: RpcContext,
        request: JsonRpcRequest,
        next: Next,
    ) -> MiddlewareResult {
        (self.f)(ctx, request, next).await
    }
}

/// Turn an async closure into a shareable middleware
pub fn from_fn<F, Fut>(f: F) -> Arc<dyn RpcMiddleware>
where
    F: Fn(RpcContext, JsonRpcRequest, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = MiddlewareResult> + Send + 'static,
{
    Arc::new(FnMiddleware { f })
}

/// Ordered list of middleware
#[derive(Default, Clone)]
pub struct MiddlewareChain {
    middleware: Vec<Arc<dyn RpcMiddleware>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add middleware to the end of the chain (innermost so far)
    pub fn push(&mut self, middleware: Arc<dyn RpcMiddleware>) {
        self.middleware.push(middleware);
    }

    pub fn extend<I>(&mut self, middleware: I)
    where
        I: IntoIterator<Item = Arc<dyn RpcMiddleware>>,
    {
        self.middleware.extend(middleware);
    }

    /// This chain followed by `inner`
    pub fn concat(&self, inner: &MiddlewareChain) -> MiddlewareChain {
        let mut combined = self.clone();
        combined.extend(inner.middleware.iter().cloned());
        combined
    }

    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }

    /// Wrap `terminal` with every middleware, first-added outermost.
    ///
    /// An empty chain returns `terminal` itself.
    pub fn build(&self, terminal: Next) -> Next {
        self.middleware
            .iter()
            .rev()
            .fold(terminal, |next, middleware| {
                let middleware = Arc::clone(middleware);
                Next::new(move |ctx, request| {
                    let middleware = Arc::clone(&middleware);
                    let next = next.clone();
                    async move { middleware.handle(ctx, request, next).await }
                })
            })
    }
}

impl FromIterator<Arc<dyn RpcMiddleware>> for MiddlewareChain {
    fn from_iter<I: IntoIterator<Item = Arc<dyn RpcMiddleware>>>(iter: I) -> Self {
        Self {
            middleware: iter.into_iter().collect(),
        }
    }
}

impl fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("len", &self.middleware.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use crate::types::RequestId;
    use serde_json::json;
    use std::sync::Mutex;

    fn recorder(log: Arc<Mutex<Vec<String>>>, id: &'static str) -> Arc<dyn RpcMiddleware> {
        from_fn(move |ctx, request, next| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push(format!("before_{}", id));
                let response = next.run(ctx, request).await;
                log.lock().unwrap().push(format!("after_{}", id));
                response
            }
        })
    }

    fn terminal(log: Arc<Mutex<Vec<String>>>) -> Next {
        Next::new(move |_ctx, request: JsonRpcRequest| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push("handler".to_string());
                Ok(JsonRpcResponse::success(request.id, json!({"ok": true})))
            }
        })
    }

    fn request() -> JsonRpcRequest {
        JsonRpcRequest::new(RequestId::parse("1").unwrap(), "test/method", None)
    }

    #[tokio::test]
    async fn test_middleware_execution_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = MiddlewareChain::new();
        chain.push(recorder(log.clone(), "first"));
        chain.push(recorder(log.clone(), "second"));

        let handler = chain.build(terminal(log.clone()));
        let response = handler.run(RpcContext::new(), request()).await.unwrap();
        assert!(!response.is_error());

        let log = log.lock().unwrap();
        assert_eq!(
            *log,
            vec![
                "before_first",
                "before_second",
                "handler",
                "after_second",
                "after_first"
            ]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = MiddlewareChain::new();
        chain.push(recorder(log.clone(), "outer"));
        chain.push(from_fn(|_ctx, request: JsonRpcRequest, _next| async move {
            Ok(JsonRpcResponse::error(
                request.id,
                RpcError::invalid_request("blocked"),
            ))
        }));

        let handler = chain.build(terminal(log.clone()));
        let response = handler.run(RpcContext::new(), request()).await.unwrap();
        assert!(response.is_error());
        assert_eq!(*log.lock().unwrap(), vec!["before_outer", "after_outer"]);
    }

    #[tokio::test]
    async fn test_empty_chain_is_identity() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::new();
        assert!(chain.is_empty());

        let terminal = terminal(log);
        let built = chain.build(terminal.clone());
        assert!(built.ptr_eq(&terminal));
    }

    #[test]
    fn test_concat_keeps_precedence() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let outer: MiddlewareChain = [recorder(log.clone(), "a")].into_iter().collect();
        let inner: MiddlewareChain = [recorder(log.clone(), "b"), recorder(log, "c")]
            .into_iter()
            .collect();
        assert_eq!(outer.concat(&inner).len(), 3);
        assert_eq!(outer.len(), 1);
    }
}
