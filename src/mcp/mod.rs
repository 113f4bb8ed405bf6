//! Model Context Protocol surface: message types, dispatch and transports

pub mod confirmation;
pub mod elicitation;
pub mod errors;
pub mod http;
pub mod server;
pub mod stdio;
pub mod types;

pub use confirmation::{ConfirmationGate, ConfirmationOutcome};
pub use elicitation::{ClientElicitor, Elicitor, PendingRequests};
pub use errors::{McpError, McpErrorCode};
pub use http::{serve_http, HttpState};
pub use server::{McpServer, Session};
pub use stdio::serve_stdio;
pub use types::{CallToolResult, ElicitationAction, ElicitationRequest, ElicitationResponse, McpRequest, McpResponse, Tool};
