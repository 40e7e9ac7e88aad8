//! Method registry and the typed registration contract
//!
//! Handlers are registered with their concrete parameter and result types
//! and erased to [`DynMethod`] only at the registry boundary. The typed
//! wrapper owns the decode, validate, invoke and encode steps, so the rest of
//! the runtime deals in raw requests and responses.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::RpcContext;
use crate::error::{HandlerError, RpcError};
use crate::middleware::{MiddlewareChain, MiddlewareResult, Next, RpcMiddleware};
use crate::request::JsonRpcRequest;
use crate::response::JsonRpcResponse;
use crate::schema::{Describe, Shape};
use crate::validation::{Validate, ValidationBridge, missing_fields};

/// A handler with its parameter and result types erased
#[async_trait]
pub trait DynMethod: Send + Sync {
    /// Bind `params`, validate, call the handler and encode its result.
    ///
    /// Binding and validation failures come back as `Ok` error responses;
    /// a handler failure comes back as `Err` so middleware can observe it.
    async fn invoke(
        &self,
        ctx: RpcContext,
        request: JsonRpcRequest,
        bridge: &ValidationBridge,
    ) -> MiddlewareResult;

    fn params_shape(&self) -> Shape;

    fn result_shape(&self) -> Shape;
}

/// Typed wrapper around a handler function `Fn(RpcContext, P) -> Future<Result<R, E>>`
pub struct TypedHandler<F, P, R, E> {
    handler: F,
    validates: bool,
    _marker: PhantomData<fn(P) -> (R, E)>,
}

impl<F, P, R, E> TypedHandler<F, P, R, E>
where
    P: Describe,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            // only record-typed parameters are validated
            validates: P::shape().is_record(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, Fut, P, R, E> DynMethod for TypedHandler<F, P, R, E>
where
    F: Fn(RpcContext, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    P: DeserializeOwned + Describe + Validate + Send + 'static,
    R: Serialize + Describe + Send + 'static,
    E: Into<HandlerError> + Send + 'static,
{
    async fn invoke(
        &self,
        ctx: RpcContext,
        request: JsonRpcRequest,
        bridge: &ValidationBridge,
    ) -> MiddlewareResult {
        let id = request.id;
        let raw = request.params.unwrap_or(Value::Null);
        let params = match P::deserialize(&raw) {
            Ok(params) => params,
            Err(e) => {
                // an absent member of a record is a validation failure, not a shape mismatch
                if self.validates
                    && let Some(errors) = missing_fields(&P::shape(), &raw, &e)
                {
                    return Ok(JsonRpcResponse::error(id, bridge.format(&errors)));
                }
                return Ok(JsonRpcResponse::error(
                    id,
                    RpcError::invalid_params(format!("Failed to unmarshal params: {}", e)),
                ));
            }
        };

        if self.validates
            && let Err(error) = bridge.check(&params)
        {
            return Ok(JsonRpcResponse::error(id, error));
        }

        let result = match (self.handler)(ctx, params).await {
            Ok(result) => result,
            Err(e) => return Err(e.into()),
        };
        match serde_json::to_value(&result) {
            Ok(value) => Ok(JsonRpcResponse::success(id, value)),
            Err(e) => Ok(JsonRpcResponse::error(
                id,
                RpcError::internal_error(Some(format!("Failed to serialize result: {}", e))),
            )),
        }
    }

    fn params_shape(&self) -> Shape {
        P::shape()
    }

    fn result_shape(&self) -> Shape {
        R::shape()
    }
}

/// A registered method: name, erased handler and its resolved chain
pub struct MethodEntry {
    name: String,
    method: Arc<dyn DynMethod>,
    middleware: MiddlewareChain,
    handler: Next,
}

impl MethodEntry {
    /// Compose `middleware` around `method` once; the result is reused for every call
    pub fn new(
        name: impl Into<String>,
        method: Arc<dyn DynMethod>,
        middleware: MiddlewareChain,
        bridge: Arc<ValidationBridge>,
    ) -> Self {
        let terminal = {
            let method = Arc::clone(&method);
            Next::new(move |ctx, request| {
                let method = Arc::clone(&method);
                let bridge = Arc::clone(&bridge);
                async move { method.invoke(ctx, request, &bridge).await }
            })
        };
        let handler = middleware.build(terminal);

        Self {
            name: name.into(),
            method,
            middleware,
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn middleware(&self) -> &MiddlewareChain {
        &self.middleware
    }

    pub fn params_shape(&self) -> Shape {
        self.method.params_shape()
    }

    pub fn result_shape(&self) -> Shape {
        self.method.result_shape()
    }

    /// Run the full chain for one request
    pub async fn call(&self, ctx: RpcContext, request: JsonRpcRequest) -> MiddlewareResult {
        self.handler.run(ctx, request).await
    }
}

impl fmt::Debug for MethodEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodEntry")
            .field("name", &self.name)
            .field("middleware", &self.middleware)
            .finish_non_exhaustive()
    }
}

/// Name-keyed store of method entries, read-mostly
#[derive(Default)]
pub struct MethodRegistry {
    methods: RwLock<HashMap<String, Arc<MethodEntry>>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entry`, replacing any method with the same name
    pub fn insert(&self, entry: MethodEntry) -> Option<Arc<MethodEntry>> {
        let name = entry.name.clone();
        let previous = self.methods.write().insert(name.clone(), Arc::new(entry));
        if previous.is_some() {
            warn!("Method '{}' registered twice; the later registration wins", name);
        } else {
            debug!("Registered method '{}'", name);
        }
        previous
    }

    pub fn get(&self, name: &str) -> Option<Arc<MethodEntry>> {
        self.methods.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.methods.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.read().is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Every entry, sorted by name
    pub fn entries(&self) -> Vec<Arc<MethodEntry>> {
        let mut entries: Vec<Arc<MethodEntry>> = self.methods.read().values().cloned().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry")
            .field("methods", &self.names())
            .finish()
    }
}

/// Something methods can be registered on: the server or a group
pub trait Registerer {
    /// Register an erased method; `middleware` is the caller's chain, which
    /// the implementor prefixes with its own.
    fn register_method(&self, name: &str, method: Arc<dyn DynMethod>, middleware: MiddlewareChain);
}

/// Register a typed handler under `name`.
///
/// ```rust
/// use typed_rpc_server::{RpcContext, RpcServer, HandlerError, register};
///
/// let server = RpcServer::new();
/// register(&server, "add", |_ctx: RpcContext, params: Vec<i64>| async move {
///     Ok::<_, HandlerError>(params.iter().sum::<i64>())
/// });
/// assert!(server.has_method("add"));
/// ```
pub fn register<Reg, F, Fut, P, R, E>(registerer: &Reg, name: &str, handler: F)
where
    Reg: Registerer + ?Sized,
    F: Fn(RpcContext, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    P: DeserializeOwned + Describe + Validate + Send + 'static,
    R: Serialize + Describe + Send + 'static,
    E: Into<HandlerError> + Send + 'static,
{
    register_with_middleware(registerer, name, handler, Vec::<Arc<dyn RpcMiddleware>>::new())
}

/// Register a typed handler with method-level middleware (innermost)
pub fn register_with_middleware<Reg, F, Fut, P, R, E, I>(
    registerer: &Reg,
    name: &str,
    handler: F,
    middleware: I,
) where
    Reg: Registerer + ?Sized,
    F: Fn(RpcContext, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    P: DeserializeOwned + Describe + Validate + Send + 'static,
    R: Serialize + Describe + Send + 'static,
    E: Into<HandlerError> + Send + 'static,
    I: IntoIterator<Item = Arc<dyn RpcMiddleware>>,
{
    let method: Arc<dyn DynMethod> = Arc::new(TypedHandler::<F, P, R, E>::new(handler));
    registerer.register_method(name, method, middleware.into_iter().collect());
}
