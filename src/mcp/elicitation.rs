//! Server-initiated elicitation requests
//!
//! The server asks the client a question by sending an `elicitation/create`
//! request and waiting for the matching response. Waiters are registered in
//! [`PendingRequests`]; the [`PendingGuard`] returned on registration removes
//! the entry when the waiting call is dropped, so aborted calls leave nothing
//! behind.

use crate::error::{GatewayError, Result};
use crate::mcp::errors::McpError;
use crate::mcp::types::{ElicitationRequest, ElicitationResponse, McpRequest, McpResponse};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

pub const ELICITATION_METHOD: &str = "elicitation/create";

/// A channel for asking the caller for structured input
#[async_trait]
pub trait Elicitor: Send + Sync {
    async fn elicit(&self, request: ElicitationRequest) -> Result<ElicitationResponse>;
}

type Reply = std::result::Result<Value, McpError>;

/// Server-initiated requests awaiting a client response
#[derive(Clone, Default)]
pub struct PendingRequests {
    waiters: Arc<DashMap<String, oneshot::Sender<Reply>>>,
    next_id: Arc<AtomicU64>,
}

/// Removes its pending entry when dropped
pub struct PendingGuard {
    id: String,
    waiters: Arc<DashMap<String, oneshot::Sender<Reply>>>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.waiters.remove(&self.id);
    }
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a request id and a receiver for its reply
    pub fn register(&self) -> (String, oneshot::Receiver<Reply>, PendingGuard) {
        let id = format!("srv-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(id.clone(), tx);
        let guard = PendingGuard {
            id: id.clone(),
            waiters: self.waiters.clone(),
        };
        (id, rx, guard)
    }

    /// Route a client response to its waiter. Returns false for unknown ids.
    pub fn complete(&self, response: McpResponse) -> bool {
        let Some(id) = response.id.as_str() else {
            return false;
        };
        let Some((_, waiter)) = self.waiters.remove(id) else {
            debug!(id = %id, "Response for unknown or abandoned server request");
            return false;
        };
        let reply = match (response.result, response.error) {
            (_, Some(error)) => Err(error),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        };
        // The waiter may have gone away in the meantime
        let _ = waiter.send(reply);
        true
    }

    /// Drop every waiter; their receivers observe a closed channel
    pub fn clear(&self) {
        self.waiters.clear();
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

/// Elicitor that writes requests to an outbound message queue.
///
/// Used by the stdio transport, whose writer task owns stdout.
pub struct ClientElicitor {
    outbound: mpsc::UnboundedSender<Value>,
    pending: PendingRequests,
}

impl ClientElicitor {
    pub fn new(outbound: mpsc::UnboundedSender<Value>, pending: PendingRequests) -> Self {
        Self { outbound, pending }
    }
}

#[async_trait]
impl Elicitor for ClientElicitor {
    async fn elicit(&self, request: ElicitationRequest) -> Result<ElicitationResponse> {
        let (id, reply, _guard) = self.pending.register();
        let message = McpRequest::new(
            Value::String(id.clone()),
            ELICITATION_METHOD,
            Some(serde_json::to_value(&request)?),
        );
        self.outbound
            .send(serde_json::to_value(&message)?)
            .map_err(|_| GatewayError::mcp("Client connection closed"))?;
        debug!(id = %id, "Sent elicitation request");

        let value = match reply.await {
            Ok(Ok(value)) => value,
            Ok(Err(error)) => {
                warn!(id = %id, code = error.code, "Client rejected elicitation: {}", error.message);
                return Err(GatewayError::mcp(format!("Elicitation failed: {}", error.message)));
            }
            Err(_) => return Err(GatewayError::mcp("Client connection closed before answering")),
        };
        serde_json::from_value(value)
            .map_err(|e| GatewayError::mcp(format!("Malformed elicitation response: {}", e)))
    }
}
