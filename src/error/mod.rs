//! Error handling module for the Mealie MCP server
//!
//! One error type covers startup (configuration) and per-call failures.

mod error;

// Re-export the main error types and utilities
pub use error::{GatewayError, Result};
