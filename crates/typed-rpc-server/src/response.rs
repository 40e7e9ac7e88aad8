use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RpcError;
use crate::types::{JsonRpcVersion, RequestId};

/// Outcome carried by a response: exactly one of `result` or `error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponsePayload {
    Result(Value),
    Error(RpcError),
}

/// A JSON-RPC response.
///
/// `id` serialises as `null` when the request id could not be determined.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    #[serde(rename = "jsonrpc")]
    pub version: JsonRpcVersion,
    #[serde(flatten)]
    pub payload: ResponsePayload,
    pub id: Option<RequestId>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            payload: ResponsePayload::Result(result),
            id,
        }
    }

    pub fn error(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            version: JsonRpcVersion::V2_0,
            payload: ResponsePayload::Error(error),
            id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.payload, ResponsePayload::Error(_))
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Result(value) => Some(value),
            ResponsePayload::Error(_) => None,
        }
    }

    pub fn rpc_error(&self) -> Option<&RpcError> {
        match &self.payload {
            ResponsePayload::Result(_) => None,
            ResponsePayload::Error(error) => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_has_result_and_no_error() {
        let response = JsonRpcResponse::success(RequestId::parse("1").ok(), json!("xy"));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "result": "xy", "id": 1}));
    }

    #[test]
    fn test_null_result_is_still_present() {
        let response = JsonRpcResponse::success(RequestId::parse("1").ok(), Value::Null);
        let json_str = serde_json::to_string(&response).unwrap();
        assert!(json_str.contains("\"result\":null"));
        assert!(!json_str.contains("\"error\""));
    }

    #[test]
    fn test_error_with_unknown_id_serializes_null() {
        let response = JsonRpcResponse::error(None, RpcError::parse_error("Invalid JSON"));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], json!(-32700));
        assert!(value.get("result").is_none());
    }
}
