//! Raw payload handling and batch fan-out
//!
//! [`RpcServer::handle_payload`] is the entry point for a transport: it
//! takes the raw request body and returns a [`DispatchOutcome`] that knows
//! its own status code and body. Batches are dispatched one task per entry;
//! the reply array only holds answers to calls, in completion order.

use http::StatusCode;
use serde::Deserialize;
use serde_json::value::RawValue;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::context::RpcContext;
use crate::error::{PayloadError, RpcError};
use crate::request::JsonRpcRequest;
use crate::response::JsonRpcResponse;
use crate::server::RpcServer;
use crate::types::{RequestId, deserialize_present_id};

/// What the transport should send back for one payload
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// Reply to a single call
    Single(JsonRpcResponse),
    /// Replies to the calls in a batch, in no particular order
    Batch(Vec<JsonRpcResponse>),
    /// Nothing to send: a notification or a batch of only notifications
    NoContent,
    /// The payload as a whole was unusable
    Rejected(JsonRpcResponse),
}

impl DispatchOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchOutcome::Single(_) | DispatchOutcome::Batch(_) => StatusCode::OK,
            DispatchOutcome::NoContent => StatusCode::NO_CONTENT,
            DispatchOutcome::Rejected(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Serialized JSON body, `None` for [`DispatchOutcome::NoContent`]
    pub fn body(&self) -> Result<Option<Vec<u8>>, serde_json::Error> {
        match self {
            DispatchOutcome::Single(response) | DispatchOutcome::Rejected(response) => {
                serde_json::to_vec(response).map(Some)
            }
            DispatchOutcome::Batch(responses) => serde_json::to_vec(responses).map(Some),
            DispatchOutcome::NoContent => Ok(None),
        }
    }

    pub fn responses(&self) -> Vec<&JsonRpcResponse> {
        match self {
            DispatchOutcome::Single(response) | DispatchOutcome::Rejected(response) => {
                vec![response]
            }
            DispatchOutcome::Batch(responses) => responses.iter().collect(),
            DispatchOutcome::NoContent => Vec::new(),
        }
    }
}

enum Payload {
    Single(Box<RawValue>),
    Batch(Vec<Box<RawValue>>),
}

fn split_payload(payload: &[u8], max_batch_size: Option<usize>) -> Result<Payload, PayloadError> {
    let payload = payload.trim_ascii();
    match payload.first() {
        None => Err(PayloadError::Empty),
        Some(b'{') => Ok(Payload::Single(serde_json::from_slice(payload)?)),
        Some(b'[') => {
            let items: Vec<Box<RawValue>> = serde_json::from_slice(payload)?;
            if items.is_empty() {
                return Err(PayloadError::EmptyBatch);
            }
            if let Some(limit) = max_batch_size
                && items.len() > limit
            {
                return Err(PayloadError::BatchTooLarge {
                    size: items.len(),
                    limit,
                });
            }
            Ok(Payload::Batch(items))
        }
        Some(other) => Err(PayloadError::UnexpectedToken(*other)),
    }
}

/// The `id` member of an object that failed to parse as a request
#[derive(Deserialize)]
struct SalvagedId {
    #[serde(default, deserialize_with = "deserialize_present_id")]
    id: Option<RequestId>,
}

/// Parse one request object, or build the Invalid Request reply for it.
///
/// The reply carries the object's `id`, byte for byte, when one can still be read.
fn parse_request(raw: &RawValue) -> Result<JsonRpcRequest, JsonRpcResponse> {
    serde_json::from_str::<JsonRpcRequest>(raw.get()).map_err(|e| {
        let id = serde_json::from_str::<SalvagedId>(raw.get())
            .ok()
            .and_then(|salvaged| salvaged.id);
        JsonRpcResponse::error(id, RpcError::invalid_request(format!("Invalid request: {}", e)))
    })
}

impl RpcServer {
    /// Dispatch a raw JSON-RPC payload, single or batch
    pub async fn handle_payload(&self, ctx: RpcContext, payload: &[u8]) -> DispatchOutcome {
        let payload = match split_payload(payload, self.inner.max_batch_size) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Rejecting payload: {}", e);
                return DispatchOutcome::Rejected(JsonRpcResponse::error(None, e.to_rpc_error()));
            }
        };

        match payload {
            Payload::Single(raw) => match parse_request(&raw) {
                Ok(request) if request.is_notification() => {
                    self.handle_request(ctx, request).await;
                    DispatchOutcome::NoContent
                }
                Ok(request) => DispatchOutcome::Single(self.handle_request(ctx, request).await),
                Err(response) => {
                    warn!("Rejecting malformed request object");
                    DispatchOutcome::Rejected(response)
                }
            },
            Payload::Batch(items) => {
                let responses = self.handle_batch(ctx, items).await;
                if responses.is_empty() {
                    DispatchOutcome::NoContent
                } else {
                    DispatchOutcome::Batch(responses)
                }
            }
        }
    }

    /// Fan a batch out, one task per entry, and wait for every task
    async fn handle_batch(&self, ctx: RpcContext, items: Vec<Box<RawValue>>) -> Vec<JsonRpcResponse> {
        debug!("Dispatching batch of {} requests", items.len());

        let mut tasks = JoinSet::new();
        for item in items {
            let server = self.clone();
            let ctx = ctx.clone();
            tasks.spawn(async move {
                match parse_request(&item) {
                    Ok(request) if request.is_notification() => {
                        server.handle_request(ctx, request).await;
                        None
                    }
                    Ok(request) => Some(server.handle_request(ctx, request).await),
                    Err(response) => Some(response),
                }
            });
        }

        let mut responses = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(response)) => responses.push(response),
                Ok(None) => {}
                Err(e) => error!("Batch task failed: {}", e),
            }
        }
        responses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::registry::register;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_server(counter: Arc<AtomicUsize>) -> RpcServer {
        let server = RpcServer::new();
        register(&server, "bump", move |_ctx: RpcContext, _: Value| {
            let counter = counter.clone();
            async move { Ok::<_, HandlerError>(counter.fetch_add(1, Ordering::SeqCst)) }
        });
        server
    }

    #[test]
    fn test_split_payload_errors() {
        assert!(matches!(split_payload(b"  \n", None), Err(PayloadError::Empty)));
        assert!(matches!(
            split_payload(b"42", None),
            Err(PayloadError::UnexpectedToken(b'4'))
        ));
        assert!(matches!(split_payload(b"[]", None), Err(PayloadError::EmptyBatch)));
        assert!(matches!(split_payload(b"{\"a\":", None), Err(PayloadError::Json(_))));
        assert!(matches!(
            split_payload(b"[1,2,3]", Some(2)),
            Err(PayloadError::BatchTooLarge { size: 3, limit: 2 })
        ));
    }

    #[tokio::test]
    async fn test_notification_runs_without_reply() {
        let counter = Arc::new(AtomicUsize::new(0));
        let server = counting_server(counter.clone());

        let outcome = server
            .handle_payload(RpcContext::new(), br#"{"jsonrpc":"2.0","method":"bump"}"#)
            .await;
        assert!(matches!(outcome, DispatchOutcome::NoContent));
        assert_eq!(outcome.status(), StatusCode::NO_CONTENT);
        assert!(outcome.body().unwrap().is_none());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batch_filters_notifications() {
        let counter = Arc::new(AtomicUsize::new(0));
        let server = counting_server(counter.clone());

        let payload = br#"[
            {"jsonrpc":"2.0","method":"bump"},
            {"jsonrpc":"2.0","method":"bump","id":"x"},
            {"jsonrpc":"2.0","method":"bump"}
        ]"#;
        let outcome = server.handle_payload(RpcContext::new(), payload).await;

        let DispatchOutcome::Batch(responses) = &outcome else {
            panic!("expected a batch reply, got {:?}", outcome);
        };
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].id.as_ref().unwrap().as_raw(), r#""x""#);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalid_item_does_not_abort_siblings() {
        let server = counting_server(Arc::new(AtomicUsize::new(0)));
        let outcome = server
            .handle_payload(
                RpcContext::new(),
                br#"[1, {"jsonrpc":"2.0","method":"bump","id":2}]"#,
            )
            .await;

        let mut codes: Vec<Option<i64>> = outcome
            .responses()
            .iter()
            .map(|response| response.rpc_error().map(|error| error.code))
            .collect();
        codes.sort();
        assert_eq!(codes, vec![None, Some(-32600)]);
    }

    #[tokio::test]
    async fn test_rejected_payload_has_null_id() {
        let server = RpcServer::new();
        let outcome = server.handle_payload(RpcContext::new(), b"{not json").await;
        assert_eq!(outcome.status(), StatusCode::BAD_REQUEST);

        let body: Value = serde_json::from_slice(&outcome.body().unwrap().unwrap()).unwrap();
        assert_eq!(body["error"]["code"], json!(-32700));
        assert_eq!(body["id"], Value::Null);
    }

    #[tokio::test]
    async fn test_malformed_single_keeps_id() {
        let server = RpcServer::new();
        let outcome = server
            .handle_payload(RpcContext::new(), br#"{"jsonrpc":"2.0","id":9}"#)
            .await;
        let DispatchOutcome::Rejected(response) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(response.rpc_error().unwrap().code, -32600);
        assert_eq!(response.id.unwrap().as_raw(), "9");
    }

    #[tokio::test]
    async fn test_malformed_entries_echo_id_text_exactly() {
        let server = RpcServer::new();
        let outcome = server
            .handle_payload(RpcContext::new(), br#"{"jsonrpc":"2.0","method":["m"],"id":1e3}"#)
            .await;
        let DispatchOutcome::Rejected(response) = outcome else {
            panic!("expected rejection");
        };
        assert_eq!(response.id.unwrap().as_raw(), "1e3");

        let outcome = server
            .handle_payload(RpcContext::new(), br#"[{"jsonrpc":"2.0","method":5,"id":2.50}, 7]"#)
            .await;
        let mut ids: Vec<Option<String>> = outcome
            .responses()
            .iter()
            .map(|response| response.id.as_ref().map(|id| id.as_raw().to_string()))
            .collect();
        ids.sort();
        assert_eq!(ids, vec![None, Some("2.50".to_string())]);
    }
}
