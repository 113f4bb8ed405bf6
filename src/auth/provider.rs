//! Selection of the process-wide authentication mode

use crate::auth::discovery::{discover, OidcProviderMetadata};
use crate::auth::metadata::{AuthorizationServerMetadata, ProtectedResourceMetadata};
use crate::auth::{JwtVerifier, OAuthProxy, StaticTokenVerifier, UpstreamProvider, VerifiedClaims};
use crate::config::{AuthModeKind, Config};
use crate::error::{GatewayError, Result};
use std::time::Duration;
use tracing::{info, warn};

/// The single authentication strategy governing inbound calls.
///
/// Built once at startup by [`AuthMode::select`] and shared read-only.
pub enum AuthMode {
    None,
    Static(StaticTokenVerifier),
    Jwt(JwtVerifier),
    OAuthProxy {
        proxy: OAuthProxy,
        verifier: JwtVerifier,
    },
    OidcProxy {
        discovery_url: String,
        provider: OidcProviderMetadata,
        proxy: OAuthProxy,
        verifier: JwtVerifier,
    },
    RemoteOAuth {
        authorization_servers: Vec<String>,
        verifier: JwtVerifier,
    },
}

fn blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn required(value: &Option<String>, name: &str) -> Result<String> {
    value
        .clone()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| GatewayError::config(format!("{} is required", name)))
}

fn fail_missing(mode: AuthModeKind, missing: Vec<&str>) -> Result<()> {
    if missing.is_empty() {
        Ok(())
    } else {
        Err(GatewayError::config(format!(
            "Auth mode '{}' is missing required settings: {}",
            mode,
            missing.join(", ")
        )))
    }
}

impl AuthMode {
    /// Validate the auth settings and construct exactly one mode.
    ///
    /// All required fields are checked before any network call so that a
    /// misconfiguration is reported in one pass. The `oidc-proxy` mode runs
    /// discovery here; its failure is fatal.
    pub async fn select(config: &Config) -> Result<Self> {
        let mode = config.auth.mode;

        if config.delegation.enabled && mode != AuthModeKind::OidcProxy {
            return Err(GatewayError::config(format!(
                "Token delegation requires the oidc-proxy auth mode, but '{}' is configured",
                mode
            )));
        }

        Self::check_required(config)?;

        let selected = match mode {
            AuthModeKind::None => {
                warn!("Authentication is disabled; all calls are anonymous");
                AuthMode::None
            }
            AuthModeKind::Static => AuthMode::Static(StaticTokenVerifier::new(&config.auth.static_tokens)?),
            AuthModeKind::Jwt => AuthMode::Jwt(JwtVerifier::from_config(&config.auth.jwt)?),
            AuthModeKind::OAuthProxy => {
                let upstream = &config.auth.oauth_proxy;
                let provider = UpstreamProvider {
                    authorization_endpoint: required(
                        &upstream.authorization_endpoint,
                        "auth.oauth_proxy.authorization_endpoint",
                    )?,
                    token_endpoint: required(&upstream.token_endpoint, "auth.oauth_proxy.token_endpoint")?,
                    client_id: required(&upstream.client_id, "auth.oauth_proxy.client_id")?,
                    client_secret: upstream
                        .client_secret
                        .clone()
                        .ok_or_else(|| GatewayError::config("auth.oauth_proxy.client_secret is required"))?,
                    scopes: upstream.scopes.clone(),
                };
                AuthMode::OAuthProxy {
                    proxy: OAuthProxy::new(provider, &config.public_base_url())?.with_local_tokens(),
                    verifier: JwtVerifier::from_config(&config.auth.jwt)?,
                }
            }
            AuthModeKind::OidcProxy => Self::select_oidc_proxy(config).await?,
            AuthModeKind::RemoteOAuth => AuthMode::RemoteOAuth {
                authorization_servers: config.auth.remote_oauth.authorization_servers.clone(),
                verifier: JwtVerifier::from_config(&config.auth.jwt)?,
            },
        };

        info!("Authentication mode: {}", selected.kind());
        Ok(selected)
    }

    fn check_required(config: &Config) -> Result<()> {
        let auth = &config.auth;
        let public_base_url_missing = blank(&config.server.public_base_url);
        let mut missing = Vec::new();

        match auth.mode {
            AuthModeKind::None => {}
            AuthModeKind::Static => {
                if auth.static_tokens.is_empty() {
                    missing.push("auth.static_tokens");
                }
            }
            AuthModeKind::Jwt => missing.extend(auth.jwt.missing_fields()),
            AuthModeKind::OAuthProxy => {
                let upstream = &auth.oauth_proxy;
                if blank(&upstream.authorization_endpoint) {
                    missing.push("auth.oauth_proxy.authorization_endpoint");
                }
                if blank(&upstream.token_endpoint) {
                    missing.push("auth.oauth_proxy.token_endpoint");
                }
                if blank(&upstream.client_id) {
                    missing.push("auth.oauth_proxy.client_id");
                }
                if upstream.client_secret.is_none() {
                    missing.push("auth.oauth_proxy.client_secret");
                }
                if public_base_url_missing {
                    missing.push("server.public_base_url");
                }
                missing.extend(auth.jwt.missing_fields());
            }
            AuthModeKind::OidcProxy => {
                let oidc = &auth.oidc_proxy;
                if blank(&oidc.discovery_url) {
                    missing.push("auth.oidc_proxy.discovery_url");
                }
                if blank(&oidc.client_id) {
                    missing.push("auth.oidc_proxy.client_id");
                }
                if oidc.client_secret.is_none() {
                    missing.push("auth.oidc_proxy.client_secret");
                }
                if public_base_url_missing {
                    missing.push("server.public_base_url");
                }
            }
            AuthModeKind::RemoteOAuth => {
                if auth.remote_oauth.authorization_servers.is_empty() {
                    missing.push("auth.remote_oauth.authorization_servers");
                }
                if public_base_url_missing {
                    missing.push("server.public_base_url");
                }
                missing.extend(auth.jwt.missing_fields());
            }
        }

        fail_missing(auth.mode, missing)
    }

    async fn select_oidc_proxy(config: &Config) -> Result<Self> {
        let oidc = &config.auth.oidc_proxy;
        let discovery_url = required(&oidc.discovery_url, "auth.oidc_proxy.discovery_url")?;
        let provider = discover(&discovery_url, Duration::from_secs(oidc.timeout_seconds)).await?;

        let authorization_endpoint = provider.authorization_endpoint.clone().ok_or_else(|| {
            GatewayError::config("OIDC discovery document has no authorization_endpoint")
        })?;
        let jwks_uri = provider
            .jwks_uri
            .clone()
            .ok_or_else(|| GatewayError::config("OIDC discovery document has no jwks_uri"))?;

        let upstream = UpstreamProvider {
            authorization_endpoint,
            token_endpoint: provider.token_endpoint.clone(),
            client_id: required(&oidc.client_id, "auth.oidc_proxy.client_id")?,
            client_secret: oidc
                .client_secret
                .clone()
                .ok_or_else(|| GatewayError::config("auth.oidc_proxy.client_secret is required"))?,
            scopes: oidc.scopes.clone(),
        };

        let verifier = JwtVerifier::with_jwks(
            jwks_uri,
            provider.issuer.clone(),
            oidc.audience.clone(),
            Duration::from_secs(config.auth.jwt.jwks_cache_seconds),
        )?
        .with_required_scopes(config.auth.jwt.required_scopes.clone());

        Ok(AuthMode::OidcProxy {
            discovery_url,
            proxy: OAuthProxy::new(upstream, &config.public_base_url())?,
            provider,
            verifier,
        })
    }

    pub fn kind(&self) -> AuthModeKind {
        match self {
            AuthMode::None => AuthModeKind::None,
            AuthMode::Static(_) => AuthModeKind::Static,
            AuthMode::Jwt(_) => AuthModeKind::Jwt,
            AuthMode::OAuthProxy { .. } => AuthModeKind::OAuthProxy,
            AuthMode::OidcProxy { .. } => AuthModeKind::OidcProxy,
            AuthMode::RemoteOAuth { .. } => AuthModeKind::RemoteOAuth,
        }
    }

    /// Verify a bearer token. `Ok(None)` means anonymous, which only the `none` mode allows.
    pub async fn verify(&self, bearer: Option<&str>) -> Result<Option<VerifiedClaims>> {
        let token = match (self, bearer) {
            (AuthMode::None, _) => return Ok(None),
            (_, Some(token)) if !token.is_empty() => token,
            _ => return Err(GatewayError::auth("Missing bearer token")),
        };

        let claims = match self {
            AuthMode::None => return Ok(None),
            AuthMode::Static(verifier) => verifier.verify(token)?,
            AuthMode::OAuthProxy { proxy, verifier } => proxy.verify_issued(token, verifier).await?,
            AuthMode::Jwt(verifier)
            | AuthMode::OidcProxy { verifier, .. }
            | AuthMode::RemoteOAuth { verifier, .. } => verifier.verify(token).await?,
        };
        Ok(Some(claims))
    }

    pub fn requires_bearer(&self) -> bool {
        !matches!(self, AuthMode::None)
    }

    /// Carries caller tokens that can be forwarded downstream
    pub fn passes_through_tokens(&self) -> bool {
        matches!(self, AuthMode::Jwt(_))
    }

    pub fn oauth_proxy(&self) -> Option<&OAuthProxy> {
        match self {
            AuthMode::OAuthProxy { proxy, .. } | AuthMode::OidcProxy { proxy, .. } => Some(proxy),
            _ => None,
        }
    }

    /// Provider metadata learned by discovery, in `oidc-proxy` mode
    pub fn provider_metadata(&self) -> Option<(&str, &OidcProviderMetadata)> {
        match self {
            AuthMode::OidcProxy {
                discovery_url,
                provider,
                ..
            } => Some((discovery_url.as_str(), provider)),
            _ => None,
        }
    }

    /// RFC 9728 metadata for token-based modes
    pub fn protected_resource_metadata(&self, public_base_url: &str) -> Option<ProtectedResourceMetadata> {
        let base = public_base_url.trim_end_matches('/');
        let metadata = ProtectedResourceMetadata::new(base);
        match self {
            AuthMode::None | AuthMode::Static(_) => None,
            AuthMode::Jwt(verifier) => Some(match verifier.issuer() {
                Some(issuer) => metadata.authorization_server(issuer),
                None => metadata,
            }),
            AuthMode::OAuthProxy { proxy, .. } => {
                Some(metadata.authorization_server(base).scopes(&proxy.upstream().scopes))
            }
            AuthMode::OidcProxy { proxy, .. } => {
                Some(metadata.authorization_server(base).scopes(&proxy.upstream().scopes))
            }
            AuthMode::RemoteOAuth {
                authorization_servers,
                ..
            } => Some(
                authorization_servers
                    .iter()
                    .fold(metadata, |m, server| m.authorization_server(server.clone())),
            ),
        }
    }

    /// RFC 8414 metadata advertising the proxy endpoints
    pub fn authorization_server_metadata(&self, public_base_url: &str) -> Option<AuthorizationServerMetadata> {
        let proxy = self.oauth_proxy()?;
        let base = public_base_url.trim_end_matches('/');
        Some(AuthorizationServerMetadata {
            issuer: base.to_string(),
            authorization_endpoint: format!("{}/oauth/authorize", base),
            token_endpoint: format!("{}/oauth/token", base),
            registration_endpoint: format!("{}/oauth/register", base),
            jwks_uri: self.provider_metadata().and_then(|(_, p)| p.jwks_uri.clone()),
            response_types_supported: vec!["code".to_string()],
            grant_types_supported: vec!["authorization_code".to_string(), "refresh_token".to_string()],
            token_endpoint_auth_methods_supported: vec!["none".to_string()],
            code_challenge_methods_supported: vec!["S256".to_string()],
            scopes_supported: proxy.upstream().scopes.clone(),
        })
    }
}
