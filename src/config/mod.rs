//! Configuration module for the Mealie MCP server
//!
//! This module provides configuration management and loading utilities.

mod config;

// Re-export the main configuration types
pub use config::{
    AuthConfig, AuthModeKind, Config, ConfigOverrides, ConfirmationConfig, DelegationConfig,
    DelegationClient, DownstreamConfig, ErrorHandlingConfig, JwtConfig, LogFormat, LoggingConfig,
    OAuthProxyConfig, OidcProxyConfig, PolicyConfig, RateLimitConfig, RemoteOAuthConfig,
    ServerConfig, StaticTokenEntry, TransportKind,
};
