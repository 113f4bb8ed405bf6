//! Wires configuration into a running server

use crate::auth::{discover, AuthMode, TokenDelegationExchange, VerifiedClaims};
use crate::config::{AuthModeKind, Config};
use crate::downstream::{DownstreamFactory, HttpClientFactory};
use crate::error::{GatewayError, Result};
use crate::mcp::McpServer;
use crate::pipeline::assemble;
use crate::tools::ToolCatalog;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Bearer token used to identify the stdio client
pub const STDIO_TOKEN_ENV: &str = "MEALIE_MCP_STDIO_TOKEN";

/// Everything a transport needs, built once and shared read-only
pub struct Runtime {
    pub config: Arc<Config>,
    pub auth: Arc<AuthMode>,
    pub server: Arc<McpServer>,
    pub exchange: Option<Arc<TokenDelegationExchange>>,
}

/// Select the auth mode, discover the delegation token endpoint and assemble the pipeline
pub async fn bootstrap(config: Config) -> Result<Runtime> {
    let factory = Arc::new(HttpClientFactory::new(&config.downstream));
    bootstrap_with_factory(config, factory).await
}

pub async fn bootstrap_with_factory(mut config: Config, factory: Arc<dyn DownstreamFactory>) -> Result<Runtime> {
    let auth = AuthMode::select(&config).await?;

    let exchange = if config.delegation.enabled {
        let token_endpoint = delegation_token_endpoint(&config, &auth).await?;
        info!(token_endpoint = %token_endpoint, "Token delegation enabled");
        config.delegation.token_endpoint = Some(token_endpoint);
        Some(Arc::new(TokenDelegationExchange::from_config(&config)?))
    } else {
        None
    };

    let pipeline = assemble(&config, &auth, exchange.clone(), factory)?;
    let catalog = ToolCatalog::mealie()?;
    let server = McpServer::new(Arc::new(catalog), Arc::new(pipeline));

    Ok(Runtime {
        config: Arc::new(config),
        auth: Arc::new(auth),
        server: Arc::new(server),
        exchange,
    })
}

/// Reuse the auth mode's discovery result when it came from the same document
async fn delegation_token_endpoint(config: &Config, auth: &AuthMode) -> Result<String> {
    let client = config.delegation.client(&config.auth.oidc_proxy).ok_or_else(|| {
        GatewayError::config("Token delegation requires an OIDC discovery URL, client id and client secret")
    })?;

    if let Some((discovery_url, provider)) = auth.provider_metadata() {
        if discovery_url == client.discovery_url {
            return Ok(provider.token_endpoint.clone());
        }
    }

    let provider = discover(
        &client.discovery_url,
        Duration::from_secs(config.delegation.timeout_seconds),
    )
    .await?;
    Ok(provider.token_endpoint)
}

/// Identity of the stdio client.
///
/// Only `static` and `jwt` modes can verify a preconfigured token; every
/// other combination runs anonymously.
pub async fn stdio_caller(auth: &AuthMode) -> Result<Option<VerifiedClaims>> {
    let token = std::env::var(STDIO_TOKEN_ENV).ok().filter(|t| !t.trim().is_empty());

    match (auth.kind(), token) {
        (AuthModeKind::Static | AuthModeKind::Jwt, Some(token)) => {
            let claims = auth.verify(Some(&token)).await.map_err(|e| {
                GatewayError::config(format!("{} was rejected: {}", STDIO_TOKEN_ENV, e))
            })?;
            if let Some(claims) = &claims {
                info!(subject = %claims.subject, "stdio client identified");
            }
            Ok(claims)
        }
        (AuthModeKind::None, _) => Ok(None),
        (kind, Some(_)) => {
            warn!("{} is ignored in {} mode; stdio calls are anonymous", STDIO_TOKEN_ENV, kind);
            Ok(None)
        }
        (kind, None) => {
            warn!("No {} set; stdio calls in {} mode are anonymous", STDIO_TOKEN_ENV, kind);
            Ok(None)
        }
    }
}
