//! Per-request context token
//!
//! Carries a cooperative cancellation signal and a type-keyed side channel
//! from the transport boundary down to handlers and middleware. The runtime
//! never inspects the side channel; it only passes the token along.

use std::sync::Arc;

use http::Extensions;
use tokio_util::sync::CancellationToken;

/// Context token handed to every middleware and handler invocation.
#[derive(Clone, Debug, Default)]
pub struct RpcContext {
    cancellation: CancellationToken,
    extensions: Arc<Extensions>,
}

impl RpcContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context that observes an existing cancellation token.
    ///
    /// The boundary keeps its own clone (or a parent token) and cancels it
    /// when the caller goes away.
    pub fn with_cancellation(cancellation: CancellationToken) -> Self {
        Self {
            cancellation,
            extensions: Arc::default(),
        }
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Attach a value to the side channel. Earlier clones are unaffected.
    pub fn with_extension<T>(mut self, value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.extensions).insert(value);
        self
    }

    pub fn extension<T>(&self) -> Option<&T>
    where
        T: Send + Sync + 'static,
    {
        self.extensions.get::<T>()
    }

    /// Attach the inbound HTTP request head (method, uri, headers)
    pub fn with_http_parts(self, parts: http::request::Parts) -> Self {
        self.with_extension(parts)
    }

    pub fn http_parts(&self) -> Option<&http::request::Parts> {
        self.extension::<http::request::Parts>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Clone, Debug, PartialEq)]
    struct UserId(u64);

    #[test]
    fn test_parent_token_cancels_context() {
        let parent = CancellationToken::new();
        let ctx = RpcContext::with_cancellation(parent.child_token());
        assert!(!ctx.is_cancelled());
        parent.cancel();
        parent.cancel();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let ctx = RpcContext::new();
        let waiter = ctx.clone();
        let task = tokio::spawn(async move { waiter.cancellation().cancelled().await });

        tokio::time::sleep(Duration::from_millis(5)).await;
        ctx.cancellation().cancel();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn test_extensions_are_copy_on_write() {
        let base = RpcContext::new();
        let with_user = base.clone().with_extension(UserId(7));

        assert_eq!(with_user.extension::<UserId>(), Some(&UserId(7)));
        assert!(base.extension::<UserId>().is_none());
    }

    #[test]
    fn test_http_parts_round_trip() {
        let (parts, _) = http::Request::builder()
            .method("POST")
            .uri("/rpc")
            .header("x-api-key", "secret")
            .body(())
            .unwrap()
            .into_parts();

        let ctx = RpcContext::new().with_http_parts(parts);
        let parts = ctx.http_parts().unwrap();
        assert_eq!(parts.uri.path(), "/rpc");
        assert_eq!(parts.headers["x-api-key"], "secret");
    }
}
