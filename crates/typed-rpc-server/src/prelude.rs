//! # Typed RPC Server Prelude
//!
//! Everything needed to define, register and serve methods.
//!
//! ```rust
//! use typed_rpc_server::prelude::*;
//! ```

pub use crate::batch::DispatchOutcome;
pub use crate::CancellationToken;
pub use crate::context::RpcContext;
pub use crate::error::{ErrorProvider, HandlerError, RpcError};
pub use crate::group::Group;
pub use crate::middleware::{self, MiddlewareResult, Next, RpcMiddleware};
pub use crate::registry::{Registerer, register, register_with_middleware};
pub use crate::request::JsonRpcRequest;
pub use crate::response::JsonRpcResponse;
pub use crate::schema::{Describe, ServerSpec};
pub use crate::server::RpcServer;
pub use crate::validation::{FieldError, Validate, ValidationErrors};
pub use crate::wire::{Duration, Time};

#[cfg(feature = "derive")]
pub use typed_rpc_derive::{Describe, Validate};

// Standard error codes
pub use crate::error_codes::*;
