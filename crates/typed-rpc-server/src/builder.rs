//! Builder for [`RpcServer`]

use std::sync::Arc;

use crate::error::{ConfigError, RpcError};
use crate::middleware::{MiddlewareChain, RpcMiddleware};
use crate::server::RpcServer;
use crate::validation::{ValidationBridge, ValidationErrors, ValidationFormatter};

/// Collects server configuration before any method is registered
///
/// ```rust
/// use typed_rpc_server::{RpcServer, RpcError};
///
/// let server = RpcServer::builder()
///     .max_batch_size(64)
///     .validation_formatter(|errors| RpcError::invalid_params(errors.to_string()))
///     .build()
///     .unwrap();
/// assert_eq!(server.max_batch_size(), Some(64));
/// ```
#[derive(Default)]
pub struct RpcServerBuilder {
    middleware: MiddlewareChain,
    formatter: Option<ValidationFormatter>,
    max_batch_size: Option<usize>,
}

impl RpcServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add global middleware (outermost for every method)
    pub fn middleware(mut self, middleware: Arc<dyn RpcMiddleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Format validation failures with `formatter` instead of the default
    pub fn validation_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&ValidationErrors) -> RpcError + Send + Sync + 'static,
    {
        self.formatter = Some(Arc::new(formatter));
        self
    }

    /// Reject batches with more than `limit` entries as Invalid Request
    pub fn max_batch_size(mut self, limit: usize) -> Self {
        self.max_batch_size = Some(limit);
        self
    }

    pub fn build(self) -> Result<RpcServer, ConfigError> {
        if self.max_batch_size == Some(0) {
            return Err(ConfigError::ZeroBatchLimit);
        }

        Ok(RpcServer::from_parts(
            self.middleware,
            ValidationBridge::new(self.formatter),
            self.max_batch_size,
        ))
    }
}
