//! OpenID Connect discovery

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{error, info};

/// Fields of an OpenID provider configuration document used by this server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcProviderMetadata {
    pub issuer: Option<String>,
    pub authorization_endpoint: Option<String>,
    pub token_endpoint: String,
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub scopes_supported: Vec<String>,
    #[serde(default)]
    pub grant_types_supported: Vec<String>,
    #[serde(default)]
    pub code_challenge_methods_supported: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawProviderMetadata {
    issuer: Option<String>,
    authorization_endpoint: Option<String>,
    token_endpoint: Option<String>,
    jwks_uri: Option<String>,
    #[serde(default)]
    scopes_supported: Vec<String>,
    #[serde(default)]
    grant_types_supported: Vec<String>,
    #[serde(default)]
    code_challenge_methods_supported: Vec<String>,
}

/// Fetch and parse the provider configuration once.
///
/// Any failure is a configuration error: network errors, non-2xx status,
/// malformed JSON and a document without `token_endpoint`. No retries.
pub async fn discover(discovery_url: &str, timeout: Duration) -> Result<OidcProviderMetadata> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| GatewayError::config(format!("Failed to build discovery client: {}", e)))?;

    info!("Fetching OIDC discovery document from {}", discovery_url);
    let response = client.get(discovery_url).send().await.map_err(|e| {
        error!("OIDC discovery request failed: {}", e);
        GatewayError::config(format!("OIDC discovery request to {} failed: {}", discovery_url, e))
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!("OIDC discovery returned {}: {}", status, body);
        return Err(GatewayError::config(format!(
            "OIDC discovery at {} returned HTTP {}",
            discovery_url, status
        )));
    }

    let raw: RawProviderMetadata = response.json().await.map_err(|e| {
        GatewayError::config(format!("OIDC discovery document is not valid JSON: {}", e))
    })?;

    let token_endpoint = raw
        .token_endpoint
        .filter(|endpoint| !endpoint.trim().is_empty())
        .ok_or_else(|| {
            GatewayError::config(format!(
                "OIDC discovery document at {} has no token_endpoint",
                discovery_url
            ))
        })?;

    info!("Discovered OIDC token endpoint {}", token_endpoint);
    Ok(OidcProviderMetadata {
        issuer: raw.issuer,
        authorization_endpoint: raw.authorization_endpoint,
        token_endpoint,
        jwks_uri: raw.jwks_uri,
        scopes_supported: raw.scopes_supported,
        grant_types_supported: raw.grant_types_supported,
        code_challenge_methods_supported: raw.code_challenge_methods_supported,
    })
}
