//! JSON-RPC error objects for protocol-level failures
//!
//! Tool failures are not protocol errors: they are returned as `tools/call`
//! results with `isError: true`. Only malformed requests, unknown methods and
//! rejected callers end up here.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// JSON-RPC error codes used by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,

    ToolNotFound = -32000,
    AuthenticationFailed = -31994,
    ConfigurationError = -31992,
}

impl McpErrorCode {
    pub fn code(&self) -> i32 {
        *self as i32
    }
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl McpError {
    pub fn new(code: McpErrorCode, message: String) -> Self {
        Self {
            code: code.code(),
            message,
            data: None,
        }
    }

    pub fn with_data(code: McpErrorCode, message: String, data: Value) -> Self {
        Self {
            code: code.code(),
            message,
            data: Some(data),
        }
    }

    pub fn parse_error(message: String) -> Self {
        Self::new(McpErrorCode::ParseError, message)
    }

    pub fn invalid_request(message: String) -> Self {
        Self::new(McpErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: String) -> Self {
        Self::with_data(
            McpErrorCode::MethodNotFound,
            format!("Method '{}' not found", method),
            json!({ "method": method }),
        )
    }

    pub fn invalid_params(message: String) -> Self {
        Self::new(McpErrorCode::InvalidParams, message)
    }

    pub fn internal_error(message: String) -> Self {
        Self::new(McpErrorCode::InternalError, message)
    }

    pub fn tool_not_found(tool_name: String) -> Self {
        Self::with_data(
            McpErrorCode::ToolNotFound,
            format!("Tool '{}' not found", tool_name),
            json!({ "tool_name": tool_name }),
        )
    }
}

impl From<&GatewayError> for McpError {
    fn from(error: &GatewayError) -> Self {
        match error {
            GatewayError::ToolNotFound { name } => McpError::tool_not_found(name.clone()),
            GatewayError::Validation { message } => McpError::invalid_params(message.clone()),
            GatewayError::Auth { message } => McpError::with_data(
                McpErrorCode::AuthenticationFailed,
                message.clone(),
                json!({ "category": error.category() }),
            ),
            GatewayError::Config { message } => McpError::with_data(
                McpErrorCode::ConfigurationError,
                message.clone(),
                json!({ "category": error.category() }),
            ),
            GatewayError::Serde(e) => McpError::parse_error(e.to_string()),
            other => McpError::with_data(
                McpErrorCode::InternalError,
                other.public_message().to_string(),
                json!({ "category": other.category() }),
            ),
        }
    }
}
