//! Request dispatch
//!
//! One request in, one response out. Each stage either hands over to the
//! next or produces the final response:
//!
//! 1. protocol version check (Invalid Request)
//! 2. method lookup (Method not found)
//! 3. the method's middleware chain, whose terminal binds and validates
//!    params (Invalid params) and calls the handler
//! 4. handler failures mapped through [`HandlerError::into_rpc_error`]
//!
//! A panic anywhere below the entry point is caught and answered with a
//! generic Internal error; the panic message is only logged.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::context::RpcContext;
use crate::error::{HandlerError, RpcError};
use crate::request::JsonRpcRequest;
use crate::response::JsonRpcResponse;
use crate::server::RpcServer;

impl RpcServer {
    /// Dispatch a parsed request. Always yields a response, even for a
    /// notification; callers suppress it when `request.is_notification()`.
    pub async fn handle_request(&self, ctx: RpcContext, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        let method = request.method.clone();

        match AssertUnwindSafe(self.dispatch(ctx, request))
            .catch_unwind()
            .await
        {
            Ok(response) => response,
            Err(panic) => {
                error!(
                    "Handler for method '{}' panicked: {}",
                    method,
                    panic_message(panic.as_ref())
                );
                JsonRpcResponse::error(id, RpcError::internal_error(None))
            }
        }
    }

    async fn dispatch(&self, ctx: RpcContext, request: JsonRpcRequest) -> JsonRpcResponse {
        if !request.has_valid_version() {
            warn!(
                "Rejecting '{}': unsupported jsonrpc version '{}'",
                request.method, request.jsonrpc
            );
            return JsonRpcResponse::error(
                request.id,
                RpcError::invalid_request("Invalid JSON-RPC version"),
            );
        }

        let Some(entry) = self.inner.registry.get(&request.method) else {
            debug!("Method not found: {}", request.method);
            return JsonRpcResponse::error(request.id, RpcError::method_not_found(&request.method));
        };

        if request.is_notification() {
            debug!("Handling notification: {}", request.method);
        } else {
            debug!("Handling request: {}", request.method);
        }

        let id = request.id.clone();
        match entry.call(ctx, request).await {
            Ok(response) => response,
            Err(failure) => {
                if let HandlerError::Opaque(description) = &failure {
                    debug!("Method '{}' failed: {}", entry.name(), description);
                }
                JsonRpcResponse::error(id, failure.into_rpc_error())
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
