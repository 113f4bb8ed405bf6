//! MCP request dispatch

use crate::auth::VerifiedClaims;
use crate::error::GatewayError;
use crate::mcp::elicitation::Elicitor;
use crate::mcp::errors::McpError;
use crate::mcp::types::{initialize_result, CallToolParams, CallToolResult, InitializeParams, McpRequest, McpResponse, Tool};
use crate::pipeline::{MiddlewareChain, ToolInvocation};
use crate::tools::ToolCatalog;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const SERVER_NAME: &str = "mealie-mcp";

/// State of one client connection
pub struct Session {
    caller: Option<VerifiedClaims>,
    elicitor: Option<Arc<dyn Elicitor>>,
    elicitation_supported: AtomicBool,
}

impl Session {
    /// A session whose transport can carry elicitation requests
    pub fn new(caller: Option<VerifiedClaims>, elicitor: Option<Arc<dyn Elicitor>>) -> Self {
        Self {
            caller,
            elicitor,
            elicitation_supported: AtomicBool::new(false),
        }
    }

    /// A session with no way to ask the caller anything
    pub fn without_elicitation(caller: Option<VerifiedClaims>) -> Self {
        Self::new(caller, None)
    }

    pub fn caller(&self) -> Option<&VerifiedClaims> {
        self.caller.as_ref()
    }

    /// The elicitation channel, if the transport has one and the client announced support
    pub fn elicitor(&self) -> Option<Arc<dyn Elicitor>> {
        if self.elicitation_supported.load(Ordering::Acquire) {
            self.elicitor.clone()
        } else {
            None
        }
    }

    fn record_capabilities(&self, params: &InitializeParams) {
        self.elicitation_supported
            .store(params.capabilities.elicitation.is_some(), Ordering::Release);
    }
}

/// Dispatches MCP requests to the tool catalog and pipeline
pub struct McpServer {
    catalog: Arc<ToolCatalog>,
    pipeline: Arc<MiddlewareChain>,
}

impl McpServer {
    pub fn new(catalog: Arc<ToolCatalog>, pipeline: Arc<MiddlewareChain>) -> Self {
        Self { catalog, pipeline }
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub fn pipeline(&self) -> &MiddlewareChain {
        &self.pipeline
    }

    /// Handle one request. Notifications produce no response.
    pub async fn handle_request(&self, request: McpRequest, session: &Session) -> Option<McpResponse> {
        debug!("Handling MCP method: {}", request.method);

        let Some(id) = request.id.clone() else {
            self.handle_notification(&request);
            return None;
        };

        let result = match request.method.as_str() {
            "initialize" => Ok(self.initialize(request.params, session)),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.list_tools()),
            "tools/call" => self.call_tool(request.params, session).await,
            other => Err(McpError::method_not_found(other.to_string())),
        };

        Some(match result {
            Ok(value) => McpResponse::success(id, value),
            Err(error) => McpResponse::error(id, error),
        })
    }

    fn handle_notification(&self, request: &McpRequest) {
        match request.method.as_str() {
            "initialized" | "notifications/initialized" => debug!("Client finished initialization"),
            "notifications/cancelled" => debug!("Cancellation handled by the transport"),
            other => debug!("Ignoring notification {}", other),
        }
    }

    fn initialize(&self, params: Option<Value>, session: &Session) -> Value {
        let params: InitializeParams = params
            .and_then(|p| serde_json::from_value(p).ok())
            .unwrap_or_default();
        session.record_capabilities(&params);
        info!(
            protocol_version = params.protocol_version.as_deref().unwrap_or("unknown"),
            elicitation = params.capabilities.elicitation.is_some(),
            "Client initialized"
        );
        initialize_result(SERVER_NAME, crate::VERSION)
    }

    fn list_tools(&self) -> Value {
        let tools: Vec<Tool> = self.catalog.tools().iter().map(|t| Tool::from(t.as_ref())).collect();
        json!({ "tools": tools })
    }

    async fn call_tool(&self, params: Option<Value>, session: &Session) -> Result<Value, McpError> {
        let params: CallToolParams = serde_json::from_value(params.unwrap_or_else(|| json!({})))
            .map_err(|e| McpError::invalid_params(format!("Invalid tool call parameters: {}", e)))?;

        let tool = self.catalog.get(&params.name).ok_or_else(|| {
            warn!(tool_name = %params.name, "Unknown tool requested");
            McpError::from(&GatewayError::tool_not_found(params.name.clone()))
        })?;

        let mut invocation = ToolInvocation::new(tool, params.arguments.unwrap_or_default())
            .with_caller(session.caller().cloned())
            .with_elicitor(session.elicitor());

        let outcome = self.pipeline.execute(&mut invocation).await;
        serde_json::to_value(CallToolResult::from(&outcome))
            .map_err(|e| McpError::internal_error(format!("Failed to encode tool result: {}", e)))
    }
}
