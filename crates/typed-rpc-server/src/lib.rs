//! # Typed JSON-RPC 2.0 Server Runtime
//!
//! An in-process, transport-agnostic JSON-RPC 2.0 server. Application code
//! registers strongly-typed async handlers under method names; the runtime
//! parses raw payloads (single or batched), resolves the method, binds and
//! validates parameters, runs the method's middleware chain and encodes the
//! response.
//!
//! ## Features
//! - Typed registration: `Fn(RpcContext, P) -> Future<Output = Result<R, E>>`
//! - Global, group and per-method middleware, composed once at registration
//! - Notifications and concurrent batches
//! - Panics inside a handler become an Internal error for that request only
//! - Schema reflection over every registered signature
//!
//! ```rust
//! use serde::Deserialize;
//! use typed_rpc_server::prelude::*;
//!
//! #[derive(Deserialize, Describe, Validate)]
//! struct ConcatParams {
//!     #[rpc(validate = "required")]
//!     a: String,
//!     #[rpc(validate = "required")]
//!     b: String,
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let server = RpcServer::new();
//! register(&server, "concat", |_ctx: RpcContext, p: ConcatParams| async move {
//!     Ok::<_, HandlerError>(p.a + &p.b)
//! });
//!
//! let outcome = server
//!     .handle_payload(
//!         RpcContext::new(),
//!         br#"{"jsonrpc":"2.0","method":"concat","params":{"a":"x","b":"y"},"id":1}"#,
//!     )
//!     .await;
//! let body = outcome.body().unwrap().unwrap();
//! assert_eq!(body, br#"{"jsonrpc":"2.0","result":"xy","id":1}"#);
//! # }
//! ```

// Generated derive code refers to `::typed_rpc_server`, including inside this crate's tests.
extern crate self as typed_rpc_server;

pub mod batch;
pub mod builder;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod group;
pub mod middleware;
pub mod prelude;
pub mod registry;
pub mod request;
pub mod response;
pub mod schema;
pub mod server;
pub mod types;
pub mod validation;
pub mod wire;

// Re-export main types
pub use batch::DispatchOutcome;
pub use builder::RpcServerBuilder;
pub use context::RpcContext;
pub use error::{
    ConfigError, ErrorProvider, HandlerError, JsonRpcErrorCode, PayloadError, RpcError,
};
pub use group::Group;
pub use middleware::{MiddlewareChain, MiddlewareResult, Next, RpcMiddleware};
pub use registry::{DynMethod, MethodEntry, Registerer, register, register_with_middleware};
pub use request::JsonRpcRequest;
pub use response::{JsonRpcResponse, ResponsePayload};
pub use schema::{Describe, MethodInfo, ServerSpec, Shape, TypeDescriptor};
pub use server::RpcServer;
pub use tokio_util::sync::CancellationToken;
pub use types::{JsonRpcVersion, RequestId};
pub use validation::{FieldError, Presence, Validate, ValidationErrors};

#[cfg(feature = "derive")]
pub use typed_rpc_derive::{Describe, Validate};

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    // Server error range: -32099 to -32000
    pub const SERVER_ERROR_START: i64 = -32099;
    pub const SERVER_ERROR_END: i64 = -32000;
}
