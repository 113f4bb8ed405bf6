//! Startup summary logging

use crate::auth::AuthMode;
use crate::config::{Config, TransportKind};
use crate::pipeline::MiddlewareChain;
use tracing::{info, warn};

/// Logs what the server is about to run with
pub struct StartupLogger;

impl StartupLogger {
    pub fn display_startup_info(config: &Config, auth: &AuthMode, pipeline: &MiddlewareChain, tools: usize) {
        info!("🚀 mealie-mcp v{} starting...", crate::VERSION);

        Self::display_transport(config);
        Self::display_auth(config, auth);

        info!("🧰 Tools: {} registered", tools);
        info!("🔗 Middleware: {}", pipeline.names().join(" → "));
        info!("🍲 Recipe API: {}", config.downstream.base_url);
        if !config.downstream.verify_tls {
            warn!("   ⚠️  TLS certificate verification is disabled");
        }
        if config.downstream.token.is_none() {
            warn!("   ⚠️  No default recipe API token configured");
        }

        if config.confirmation.require_confirmation {
            info!("✋ Confirmation: required for mutating tools");
        } else {
            info!("✋ Confirmation: requested when the client supports elicitation");
        }
    }

    fn display_transport(config: &Config) {
        match config.server.transport {
            TransportKind::Stdio => info!("📡 Transport: stdio"),
            TransportKind::Http => info!(
                "📡 Transport: http on {}:{} (public URL {})",
                config.server.host,
                config.server.port,
                config.public_base_url()
            ),
        }
    }

    fn display_auth(config: &Config, auth: &AuthMode) {
        info!("🔐 Auth mode: {}", auth.kind());
        if config.delegation.enabled {
            info!(
                "   Delegation: enabled (audience {}, scopes {}, cache {})",
                config.delegation.audience.as_deref().unwrap_or("-"),
                config.delegation.scope_string(),
                if config.delegation.cache_tokens { "on" } else { "off" }
            );
        } else {
            info!("   Delegation: disabled");
        }
        if let Some(endpoint) = &config.policy.endpoint {
            info!("   Policy decision point: {}", endpoint);
        }
    }
}
