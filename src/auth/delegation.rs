//! OAuth 2.0 token exchange (RFC 8693) for delegated downstream credentials

use crate::auth::VerifiedClaims;
use crate::config::Config;
use crate::error::{GatewayError, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info};

pub const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
pub const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";

/// Cached tokens are not served this close to expiry
const EXPIRY_MARGIN_SECONDS: i64 = 30;

/// Downstream access token obtained on behalf of a caller
#[derive(Debug, Clone)]
pub struct DelegatedToken {
    value: Secret<String>,
    pub obtained_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub audience: String,
    pub scope: String,
}

impl DelegatedToken {
    pub fn value(&self) -> &Secret<String> {
        &self.value
    }

    /// Usable until the margin before the earlier of its own and the caller's expiry
    fn is_fresh(&self, now: DateTime<Utc>, caller_expires_at: Option<DateTime<Utc>>) -> bool {
        let expiry = match (self.expires_at, caller_expires_at) {
            (Some(own), Some(caller)) => own.min(caller),
            (Some(own), None) => own,
            (None, _) => return false,
        };
        now + ChronoDuration::seconds(EXPIRY_MARGIN_SECONDS) < expiry
    }
}

#[derive(Debug, Deserialize)]
struct TokenExchangeResponse {
    access_token: Option<Secret<String>>,
    expires_in: Option<i64>,
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

/// Exchanges verified caller tokens for audience-scoped downstream tokens
pub struct TokenDelegationExchange {
    token_endpoint: String,
    client_id: String,
    client_secret: Secret<String>,
    audience: String,
    scope: String,
    client: reqwest::Client,
    cache: Option<DashMap<String, DelegatedToken>>,
}

impl TokenDelegationExchange {
    /// Build from a configuration whose token endpoint was filled in by discovery
    pub fn from_config(config: &Config) -> Result<Self> {
        let delegation = &config.delegation;
        let client = delegation.client(&config.auth.oidc_proxy).ok_or_else(|| {
            GatewayError::config("Token delegation requires an OIDC client id and secret")
        })?;
        let token_endpoint = delegation.token_endpoint.clone().ok_or_else(|| {
            GatewayError::config("Token delegation has no token endpoint; OIDC discovery has not run")
        })?;
        let audience = delegation
            .audience
            .clone()
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| GatewayError::config("Token delegation requires delegation.audience"))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(delegation.timeout_seconds))
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to build token exchange client: {}", e)))?;

        Ok(Self {
            token_endpoint,
            client_id: client.client_id,
            client_secret: client.client_secret,
            audience,
            scope: delegation.scope_string(),
            client: http,
            cache: delegation.cache_tokens.then(DashMap::new),
        })
    }

    pub fn token_endpoint(&self) -> &str {
        &self.token_endpoint
    }

    pub fn audience(&self) -> &str {
        &self.audience
    }

    pub fn caches_tokens(&self) -> bool {
        self.cache.is_some()
    }

    /// Exchange the caller's token for a delegated one
    pub async fn exchange(&self, caller: &VerifiedClaims) -> Result<DelegatedToken> {
        let cache_key = format!("{}:{}:{}", caller.token_fingerprint(), self.audience, self.scope);
        if let Some(cache) = &self.cache {
            if let Some(entry) = cache.get(&cache_key) {
                if entry.is_fresh(Utc::now(), caller.expires_at) {
                    debug!(subject = %caller.subject, "Reusing cached delegated token");
                    return Ok(entry.clone());
                }
            }
        }

        let params = [
            ("grant_type", TOKEN_EXCHANGE_GRANT),
            ("subject_token", caller.token().expose_secret().as_str()),
            ("subject_token_type", ACCESS_TOKEN_TYPE),
            ("requested_token_type", ACCESS_TOKEN_TYPE),
            ("audience", self.audience.as_str()),
            ("scope", self.scope.as_str()),
        ];

        let response = self
            .client
            .post(&self.token_endpoint)
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                error!(subject = %caller.subject, "Token exchange request failed: {}", e);
                if e.is_timeout() {
                    GatewayError::delegation("Token exchange timed out")
                } else {
                    GatewayError::delegation(format!("Token exchange request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(subject = %caller.subject, status = status.as_u16(), "Token exchange rejected");
            let reason = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| match e.error_description {
                    Some(description) => format!("{}: {}", e.error, description),
                    None => e.error,
                })
                .unwrap_or_else(|_| "no error description".to_string());
            return Err(GatewayError::delegation(format!(
                "Token endpoint returned HTTP {} ({})",
                status.as_u16(),
                reason
            )));
        }

        let parsed: TokenExchangeResponse = response.json().await.map_err(|e| {
            error!("Failed to parse token exchange response: {}", e);
            GatewayError::delegation("Invalid token exchange response")
        })?;
        let value = parsed
            .access_token
            .filter(|t| !t.expose_secret().is_empty())
            .ok_or_else(|| GatewayError::delegation("Token exchange response has no access_token"))?;

        let obtained_at = Utc::now();
        let expires_at = match parsed.expires_in {
            Some(seconds) => Some(expiry_after(obtained_at, seconds).ok_or_else(|| {
                error!(subject = %caller.subject, expires_in = seconds, "Token exchange returned an unusable expires_in");
                GatewayError::delegation("Invalid expires_in in token exchange response")
            })?),
            None => None,
        };
        let token = DelegatedToken {
            value,
            obtained_at,
            expires_at,
            audience: self.audience.clone(),
            scope: parsed.scope.unwrap_or_else(|| self.scope.clone()),
        };
        info!(subject = %caller.subject, audience = %self.audience, "Obtained delegated token");

        if let Some(cache) = &self.cache {
            if token.is_fresh(obtained_at, caller.expires_at) {
                cache.retain(|_, cached| cached.is_fresh(obtained_at, None));
                cache.insert(cache_key, token.clone());
            }
        }

        Ok(token)
    }
}

/// `None` when the lifetime does not fit a timestamp
fn expiry_after(obtained_at: DateTime<Utc>, seconds: i64) -> Option<DateTime<Utc>> {
    ChronoDuration::try_seconds(seconds).and_then(|lifetime| obtained_at.checked_add_signed(lifetime))
}
