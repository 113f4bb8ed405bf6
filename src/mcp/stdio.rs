//! Line-delimited JSON-RPC over stdin and stdout
//!
//! Each request runs on its own task so a call waiting for confirmation does
//! not block the reader that will deliver the answer. Stdout is owned by a
//! single writer task; everything else sends messages to it.

use crate::auth::VerifiedClaims;
use crate::error::Result;
use crate::mcp::elicitation::{ClientElicitor, Elicitor, PendingRequests};
use crate::mcp::errors::McpError;
use crate::mcp::server::{McpServer, Session};
use crate::mcp::types::{McpRequest, McpResponse};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long the writer may take to flush remaining output after EOF
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Serve MCP on the process's stdin and stdout
pub async fn serve_stdio(server: Arc<McpServer>, caller: Option<VerifiedClaims>) -> Result<()> {
    serve(server, caller, tokio::io::stdin(), tokio::io::stdout()).await
}

fn spawn_writer<W>(writer: W, mut outbound: mpsc::UnboundedReceiver<Value>) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut writer = writer;
        while let Some(message) = outbound.recv().await {
            let mut line = match serde_json::to_string(&message) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Failed to encode outgoing message: {}", e);
                    continue;
                }
            };
            line.push('\n');
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                warn!("Failed to write to stdout: {}", e);
                break;
            }
            if let Err(e) = writer.flush().await {
                warn!("Failed to flush stdout: {}", e);
                break;
            }
        }
    })
}

fn send(outbound: &mpsc::UnboundedSender<Value>, response: &McpResponse) {
    match serde_json::to_value(response) {
        Ok(value) => {
            if outbound.send(value).is_err() {
                debug!("Writer closed, dropping response");
            }
        }
        Err(e) => warn!("Failed to encode response: {}", e),
    }
}

/// Serve MCP over any line-oriented reader and writer
pub async fn serve<R, W>(server: Arc<McpServer>, caller: Option<VerifiedClaims>, reader: R, writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbound, outbound_rx) = mpsc::unbounded_channel::<Value>();
    let writer_task = spawn_writer(writer, outbound_rx);

    let pending = PendingRequests::new();
    let elicitor: Arc<dyn Elicitor> = Arc::new(ClientElicitor::new(outbound.clone(), pending.clone()));
    let session = Arc::new(Session::new(caller, Some(elicitor)));
    let in_flight: DashMap<String, JoinHandle<()>> = DashMap::new();

    info!("Serving MCP over stdio");
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let message: Value = match serde_json::from_str(&line) {
            Ok(message) => message,
            Err(e) => {
                send(&outbound, &McpResponse::error(Value::Null, McpError::parse_error(e.to_string())));
                continue;
            }
        };

        // Answers to our own requests carry no method
        if message.get("method").is_none() {
            match serde_json::from_value::<McpResponse>(message) {
                Ok(response) => {
                    pending.complete(response);
                }
                Err(e) => warn!("Ignoring malformed client response: {}", e),
            }
            continue;
        }

        let request: McpRequest = match serde_json::from_value(message.clone()) {
            Ok(request) => request,
            Err(e) => {
                let id = message.get("id").cloned().unwrap_or(Value::Null);
                send(&outbound, &McpResponse::error(id, McpError::invalid_request(e.to_string())));
                continue;
            }
        };

        if request.method == "notifications/cancelled" {
            let target = request
                .params
                .as_ref()
                .and_then(|p| p.get("requestId"))
                .map(Value::to_string);
            if let Some((key, handle)) = target.and_then(|key| in_flight.remove(&key)) {
                info!(request_id = %key, "Client cancelled request");
                handle.abort();
            }
            continue;
        }

        in_flight.retain(|_, handle| !handle.is_finished());

        let key = request.id.as_ref().map(Value::to_string);
        let handle = tokio::spawn({
            let server = server.clone();
            let session = session.clone();
            let outbound = outbound.clone();
            async move {
                if let Some(response) = server.handle_request(request, &session).await {
                    send(&outbound, &response);
                }
            }
        });
        if let Some(key) = key {
            in_flight.insert(key, handle);
        }
    }

    info!(in_flight = in_flight.len(), "stdin closed, shutting down");
    for entry in in_flight.iter() {
        entry.value().abort();
    }
    in_flight.clear();
    pending.clear();
    drop(session);
    drop(outbound);

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer_task).await.is_err() {
        warn!("Timed out flushing stdout");
    }
    Ok(())
}
