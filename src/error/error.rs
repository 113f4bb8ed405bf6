//! Error types and handling for the Mealie MCP server

use thiserror::Error;

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for the server
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration errors, fatal at startup
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Inbound authentication errors
    #[error("Authentication error: {message}")]
    Auth { message: String },

    /// Token exchange failures
    #[error("Delegation error: {message}")]
    Delegation { message: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {message}")]
    RateLimited { message: String },

    /// Policy decision point denied the call
    #[error("Policy denied: {message}")]
    PolicyDenied { message: String },

    /// Confirmation was required but no elicitation channel exists
    #[error("Confirmation unavailable: {message}")]
    ConfirmationUnavailable { message: String },

    /// Downstream API errors
    #[error("{}", render_downstream(*.status, .text))]
    Downstream { status: Option<u16>, text: String },

    /// Unknown tool
    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Connection errors
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// MCP protocol errors
    #[error("MCP protocol error: {message}")]
    Mcp { message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client errors
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

fn render_downstream(status: Option<u16>, text: &str) -> String {
    match status {
        Some(status) => format!("API error: {} - {}", status, text),
        None => format!("API error: {}", text),
    }
}

impl GatewayError {
    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a delegation error
    pub fn delegation<S: Into<String>>(message: S) -> Self {
        Self::Delegation {
            message: message.into(),
        }
    }

    /// Create a rate limit error
    pub fn rate_limited<S: Into<String>>(message: S) -> Self {
        Self::RateLimited {
            message: message.into(),
        }
    }

    /// Create a policy denial
    pub fn policy_denied<S: Into<String>>(message: S) -> Self {
        Self::PolicyDenied {
            message: message.into(),
        }
    }

    pub fn confirmation_unavailable<S: Into<String>>(message: S) -> Self {
        Self::ConfirmationUnavailable {
            message: message.into(),
        }
    }

    /// Create a downstream error with an HTTP status
    pub fn downstream<S: Into<String>>(status: u16, text: S) -> Self {
        Self::Downstream {
            status: Some(status),
            text: text.into(),
        }
    }

    /// Create a downstream error for a request that never got a response
    pub fn downstream_unreachable<S: Into<String>>(text: S) -> Self {
        Self::Downstream {
            status: None,
            text: text.into(),
        }
    }

    pub fn tool_not_found<S: Into<String>>(name: S) -> Self {
        Self::ToolNotFound { name: name.into() }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a timeout error (using connection error type)
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        Self::Connection {
            message: format!("Timeout: {}", message.into()),
        }
    }

    /// Create an MCP protocol error
    pub fn mcp<S: Into<String>>(message: S) -> Self {
        Self::Mcp {
            message: message.into(),
        }
    }

    /// Check if the caller may retry the same call later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::RateLimited { .. }
                | GatewayError::Connection { .. }
                | GatewayError::Http(_)
                | GatewayError::Downstream { status: None, .. }
        )
    }

    /// Get the error category, used for logging and as the user-visible kind
    pub fn category(&self) -> &'static str {
        match self {
            GatewayError::Config { .. } => "configuration",
            GatewayError::Auth { .. } => "authentication",
            GatewayError::Delegation { .. } => "delegation",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::PolicyDenied { .. } => "policy_denied",
            GatewayError::ConfirmationUnavailable { .. } => "confirmation_unavailable",
            GatewayError::Downstream { .. } => "downstream",
            GatewayError::ToolNotFound { .. } | GatewayError::Validation { .. } => {
                "invalid_request"
            }
            GatewayError::Connection { .. } => "connection",
            GatewayError::Mcp { .. }
            | GatewayError::Io(_)
            | GatewayError::Serde(_)
            | GatewayError::Yaml(_)
            | GatewayError::Http(_)
            | GatewayError::Internal(_) => "internal",
        }
    }

    /// Fixed message per category, shown when error detail is suppressed
    pub fn public_message(&self) -> &'static str {
        match self {
            GatewayError::Config { .. } => "Server misconfiguration",
            GatewayError::Auth { .. } => "Authentication failed",
            GatewayError::Delegation { .. } => "Could not obtain a downstream credential",
            GatewayError::RateLimited { .. } => "Rate limit exceeded, retry later",
            GatewayError::PolicyDenied { .. } => "Denied by policy",
            GatewayError::ConfirmationUnavailable { .. } => {
                "This operation requires confirmation, which the client cannot provide"
            }
            GatewayError::Downstream { .. } => "The recipe API returned an error",
            GatewayError::ToolNotFound { .. } | GatewayError::Validation { .. } => {
                "Invalid tool request"
            }
            GatewayError::Connection { .. } => "Connection failure",
            _ => "Internal error",
        }
    }

    /// HTTP status of a downstream failure, when one was received
    pub fn downstream_status(&self) -> Option<u16> {
        match self {
            GatewayError::Downstream { status, .. } => *status,
            _ => None,
        }
    }
}

impl Clone for GatewayError {
    fn clone(&self) -> Self {
        match self {
            GatewayError::Config { message } => GatewayError::Config { message: message.clone() },
            GatewayError::Auth { message } => GatewayError::Auth { message: message.clone() },
            GatewayError::Delegation { message } => GatewayError::Delegation { message: message.clone() },
            GatewayError::RateLimited { message } => GatewayError::RateLimited { message: message.clone() },
            GatewayError::PolicyDenied { message } => GatewayError::PolicyDenied { message: message.clone() },
            GatewayError::ConfirmationUnavailable { message } => {
                GatewayError::ConfirmationUnavailable { message: message.clone() }
            }
            GatewayError::Downstream { status, text } => GatewayError::Downstream {
                status: *status,
                text: text.clone(),
            },
            GatewayError::ToolNotFound { name } => GatewayError::ToolNotFound { name: name.clone() },
            GatewayError::Validation { message } => GatewayError::Validation { message: message.clone() },
            GatewayError::Connection { message } => GatewayError::Connection { message: message.clone() },
            GatewayError::Mcp { message } => GatewayError::Mcp { message: message.clone() },

            // For non-cloneable types, convert to string representation
            GatewayError::Io(e) => GatewayError::connection(format!("IO error: {}", e)),
            GatewayError::Serde(e) => GatewayError::mcp(format!("Serialization error: {}", e)),
            GatewayError::Yaml(e) => GatewayError::config(format!("YAML error: {}", e)),
            GatewayError::Http(e) => GatewayError::connection(format!("HTTP error: {}", e)),
            GatewayError::Internal(e) => GatewayError::Internal(anyhow::anyhow!("{}", e)),
        }
    }
}
