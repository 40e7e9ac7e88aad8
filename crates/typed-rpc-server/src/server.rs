//! The RPC server: registry owner and dispatch entry point

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::builder::RpcServerBuilder;
use crate::error::RpcError;
use crate::group::Group;
use crate::middleware::{MiddlewareChain, RpcMiddleware};
use crate::registry::{DynMethod, MethodEntry, MethodRegistry, Registerer};
use crate::schema::{Reflector, ServerSpec};
use crate::validation::{ValidationBridge, ValidationErrors};

pub(crate) struct ServerInner {
    pub(crate) registry: MethodRegistry,
    pub(crate) global: RwLock<MiddlewareChain>,
    pub(crate) bridge: Arc<ValidationBridge>,
    pub(crate) max_batch_size: Option<usize>,
}

/// In-process JSON-RPC 2.0 server.
///
/// Cheap to clone; clones share the registry and configuration.
#[derive(Clone)]
pub struct RpcServer {
    pub(crate) inner: Arc<ServerInner>,
}

impl RpcServer {
    /// A server with no global middleware, the default validation formatter
    /// and no batch size limit
    pub fn new() -> Self {
        Self::from_parts(MiddlewareChain::new(), ValidationBridge::default(), None)
    }

    pub fn builder() -> RpcServerBuilder {
        RpcServerBuilder::new()
    }

    pub(crate) fn from_parts(
        global: MiddlewareChain,
        bridge: ValidationBridge,
        max_batch_size: Option<usize>,
    ) -> Self {
        Self {
            inner: Arc::new(ServerInner {
                registry: MethodRegistry::new(),
                global: RwLock::new(global),
                bridge: Arc::new(bridge),
                max_batch_size,
            }),
        }
    }

    /// Add global middleware. Only methods registered afterwards see it.
    pub fn use_middleware(&self, middleware: Arc<dyn RpcMiddleware>) {
        self.inner.global.write().push(middleware);
    }

    /// Replace the formatter used for validation failures
    pub fn set_validation_formatter<F>(&self, formatter: F)
    where
        F: Fn(&ValidationErrors) -> RpcError + Send + Sync + 'static,
    {
        self.inner.bridge.set_formatter(Arc::new(formatter));
    }

    /// A registration handle that prefixes names and adds `middleware`
    /// between the global chain and each method's own
    pub fn group<I>(&self, prefix: impl Into<String>, middleware: I) -> Group
    where
        I: IntoIterator<Item = Arc<dyn RpcMiddleware>>,
    {
        Group::new(self.clone(), prefix.into(), middleware.into_iter().collect())
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.inner.registry.contains(name)
    }

    pub fn method_names(&self) -> Vec<String> {
        self.inner.registry.names()
    }

    pub fn method(&self, name: &str) -> Option<Arc<MethodEntry>> {
        self.inner.registry.get(name)
    }

    pub fn max_batch_size(&self) -> Option<usize> {
        self.inner.max_batch_size
    }

    /// Reflect every registered method and the types it reaches.
    ///
    /// Methods are sorted by name and types keyed by qualified name, so two
    /// snapshots without intervening registrations are identical.
    pub fn spec(&self) -> ServerSpec {
        let mut reflector = Reflector::new();
        let methods = self
            .inner
            .registry
            .entries()
            .iter()
            .map(|entry| {
                reflector.method(entry.name(), &entry.params_shape(), &entry.result_shape())
            })
            .collect();

        ServerSpec {
            methods,
            types: reflector.into_types(),
        }
    }

    /// The schema snapshot as pretty-printed JSON
    pub fn spec_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.spec())
    }
}

impl Default for RpcServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Registerer for RpcServer {
    fn register_method(&self, name: &str, method: Arc<dyn DynMethod>, middleware: MiddlewareChain) {
        let chain = self.inner.global.read().concat(&middleware);
        debug!(
            "Registering '{}' with {} middleware ({} global)",
            name,
            chain.len(),
            chain.len() - middleware.len()
        );
        let entry = MethodEntry::new(name, method, chain, Arc::clone(&self.inner.bridge));
        self.inner.registry.insert(entry);
    }
}

impl fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcServer")
            .field("methods", &self.inner.registry)
            .field("global_middleware", &self.inner.global.read().len())
            .field("max_batch_size", &self.inner.max_batch_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RpcContext;
    use crate::error::HandlerError;
    use crate::middleware;
    use crate::registry::register;

    async fn echo(_ctx: RpcContext, value: String) -> Result<String, HandlerError> {
        Ok(value)
    }

    #[test]
    fn test_use_middleware_applies_to_later_registrations() {
        let server = RpcServer::new();
        register(&server, "before", echo);
        server.use_middleware(middleware::from_fn(|ctx, request, next| async move {
            next.run(ctx, request).await
        }));
        register(&server, "after", echo);

        assert_eq!(server.method("before").unwrap().middleware().len(), 0);
        assert_eq!(server.method("after").unwrap().middleware().len(), 1);
    }

    #[test]
    fn test_spec_lists_methods_sorted() {
        let server = RpcServer::new();
        register(&server, "zeta", echo);
        register(&server, "alpha", echo);

        let spec = server.spec();
        let names: Vec<&str> = spec.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(spec.methods[0].params, "String");
        assert!(spec.types.is_empty());
    }

    #[test]
    fn test_spec_json_is_idempotent() {
        let server = RpcServer::new();
        register(&server, "echo", echo);
        assert_eq!(server.spec_json().unwrap(), server.spec_json().unwrap());
    }
}
