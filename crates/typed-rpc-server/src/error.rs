use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// JSON-RPC error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonRpcErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ServerError(i64), // application-defined
}

impl JsonRpcErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            JsonRpcErrorCode::ParseError => crate::error_codes::PARSE_ERROR,
            JsonRpcErrorCode::InvalidRequest => crate::error_codes::INVALID_REQUEST,
            JsonRpcErrorCode::MethodNotFound => crate::error_codes::METHOD_NOT_FOUND,
            JsonRpcErrorCode::InvalidParams => crate::error_codes::INVALID_PARAMS,
            JsonRpcErrorCode::InternalError => crate::error_codes::INTERNAL_ERROR,
            JsonRpcErrorCode::ServerError(code) => *code,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            JsonRpcErrorCode::ParseError => "Parse error",
            JsonRpcErrorCode::InvalidRequest => "Invalid Request",
            JsonRpcErrorCode::MethodNotFound => "Method not found",
            JsonRpcErrorCode::InvalidParams => "Invalid params",
            JsonRpcErrorCode::InternalError => "Internal error",
            JsonRpcErrorCode::ServerError(_) => "Server error",
        }
    }
}

impl fmt::Display for JsonRpcErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

/// JSON-RPC error object as it appears on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: JsonRpcErrorCode, message: Option<String>, data: Option<Value>) -> Self {
        Self {
            code: code.code(),
            message: message.unwrap_or_else(|| code.message().to_string()),
            data,
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(JsonRpcErrorCode::ParseError, Some(message.into()), None)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(JsonRpcErrorCode::InvalidRequest, Some(message.into()), None)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            JsonRpcErrorCode::MethodNotFound,
            Some(format!("Method '{}' not found", method)),
            None,
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(JsonRpcErrorCode::InvalidParams, Some(message.into()), None)
    }

    pub fn internal_error(message: Option<String>) -> Self {
        Self::new(JsonRpcErrorCode::InternalError, message, None)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JSON-RPC Error {}: {}", self.code, self.message)
    }
}

/// Capability of a domain failure to supply its own wire error.
///
/// Implement this on an application error type and return it through
/// [`HandlerError::provided`] to have its code, message and data surfaced
/// verbatim instead of being folded into an internal error.
pub trait ErrorProvider {
    fn code(&self) -> i64;
    fn message(&self) -> String;
    fn data(&self) -> Option<Value> {
        None
    }
}

impl ErrorProvider for RpcError {
    fn code(&self) -> i64 {
        self.code
    }

    fn message(&self) -> String {
        self.message.clone()
    }

    fn data(&self) -> Option<Value> {
        self.data.clone()
    }
}

/// Failure returned by a handler or middleware.
///
/// `Structured` failures reach the caller with their own code, message and
/// data. `Opaque` failures become an internal error carrying only their
/// description. Any `std::error::Error` converts into `Opaque` with `?`.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerError {
    Structured(RpcError),
    Opaque(String),
}

impl HandlerError {
    pub fn structured(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self::Structured(RpcError {
            code,
            message: message.into(),
            data,
        })
    }

    pub fn opaque(description: impl fmt::Display) -> Self {
        Self::Opaque(description.to_string())
    }

    /// Wrap a failure that opts in to supplying its own wire error
    pub fn provided<P: ErrorProvider + ?Sized>(provider: &P) -> Self {
        Self::Structured(RpcError {
            code: provider.code(),
            message: provider.message(),
            data: provider.data(),
        })
    }

    /// Convert to the wire error. Total over both variants.
    pub fn into_rpc_error(self) -> RpcError {
        match self {
            HandlerError::Structured(error) => error,
            HandlerError::Opaque(description) => RpcError::internal_error(Some(description)),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerError::Structured(error) => write!(f, "{}", error),
            HandlerError::Opaque(description) => f.write_str(description),
        }
    }
}

impl<E> From<E> for HandlerError
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        HandlerError::Opaque(error.to_string())
    }
}

impl From<RpcError> for HandlerError {
    fn from(error: RpcError) -> Self {
        HandlerError::Structured(error)
    }
}

/// Errors in a raw payload detected before any request is dispatched
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Empty request body")]
    Empty,

    #[error("Invalid JSON: unexpected leading byte 0x{0:02x}")]
    UnexpectedToken(u8),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Empty batch")]
    EmptyBatch,

    #[error("Batch of {size} requests exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },
}

impl PayloadError {
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            PayloadError::Empty | PayloadError::UnexpectedToken(_) | PayloadError::Json(_) => {
                RpcError::parse_error(self.to_string())
            }
            PayloadError::EmptyBatch | PayloadError::BatchTooLarge { .. } => {
                RpcError::invalid_request(self.to_string())
            }
        }
    }
}

/// Invalid server configuration detected by the builder
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_batch_size must be greater than zero")]
    ZeroBatchLimit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug)]
    struct QuotaExceeded {
        remaining: u32,
    }

    impl ErrorProvider for QuotaExceeded {
        fn code(&self) -> i64 {
            -32000
        }

        fn message(&self) -> String {
            "Quota exceeded".to_string()
        }

        fn data(&self) -> Option<Value> {
            Some(json!({ "remaining": self.remaining }))
        }
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(JsonRpcErrorCode::ParseError.code(), -32700);
        assert_eq!(JsonRpcErrorCode::MethodNotFound.code(), -32601);
        assert_eq!(JsonRpcErrorCode::ServerError(-32050).code(), -32050);
    }

    #[test]
    fn test_error_serialization_omits_missing_data() {
        let error = RpcError::method_not_found("test");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("Method 'test' not found"));
        assert!(!json.contains("data"));
    }

    #[test]
    fn test_provided_error_is_verbatim() {
        let error = HandlerError::provided(&QuotaExceeded { remaining: 3 }).into_rpc_error();
        assert_eq!(error.code, -32000);
        assert_eq!(error.message, "Quota exceeded");
        assert_eq!(error.data, Some(json!({ "remaining": 3 })));
    }

    #[test]
    fn test_std_error_becomes_internal() {
        let io = std::io::Error::other("disk on fire");
        let error: HandlerError = io.into();
        let rpc = error.into_rpc_error();
        assert_eq!(rpc.code, -32603);
        assert_eq!(rpc.message, "disk on fire");
        assert!(rpc.data.is_none());
    }

    #[test]
    fn test_payload_error_codes() {
        assert_eq!(PayloadError::Empty.to_rpc_error().code, -32700);
        assert_eq!(PayloadError::UnexpectedToken(b'x').to_rpc_error().code, -32700);
        assert_eq!(PayloadError::EmptyBatch.to_rpc_error().code, -32600);
        assert_eq!(
            PayloadError::BatchTooLarge { size: 3, limit: 2 }
                .to_rpc_error()
                .code,
            -32600
        );
    }
}
