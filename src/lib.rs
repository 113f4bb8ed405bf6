//! Mealie MCP - Model Context Protocol tool server for the Mealie recipe API
//!
//! Each tool is a thin wrapper over one recipe API endpoint. Calls pass through
//! a middleware pipeline that verifies the caller, optionally exchanges the
//! caller's token for a delegated downstream token, rate limits, logs, applies
//! external policy and asks the caller to confirm state-changing operations.

pub mod auth;
pub mod config;
pub mod downstream;
pub mod error;
pub mod mcp;
pub mod pipeline;
pub mod startup;
pub mod tools;

pub use config::Config;
pub use error::{GatewayError, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "mealie-mcp.yaml";
