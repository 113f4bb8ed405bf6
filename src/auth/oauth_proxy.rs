//! Authorization-code proxy in front of an upstream OAuth/OIDC provider
//!
//! MCP clients register with the proxy, then run a standard authorization-code
//! flow with PKCE against it. The proxy forwards the authorization to the
//! upstream provider using its own client credentials and a second PKCE pair,
//! redeems the upstream code on the callback and hands the client a code of
//! its own. The client redeems that code at `/oauth/token`.
//!
//! With local tokens enabled the proxy issues its own access tokens, each
//! bound to the upstream token it was minted for. Otherwise the upstream token
//! response is relayed as is.

use crate::auth::{fingerprint, JwtVerifier, VerifiedClaims};
use crate::error::{GatewayError, Result};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long an authorization request may stay pending upstream
const PENDING_TTL: Duration = Duration::from_secs(600);
/// How long a proxy-issued authorization code may go unredeemed
const CODE_TTL: Duration = Duration::from_secs(300);
const TOKEN_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_TOKEN_LIFETIME_SECONDS: u64 = 3600;
const MAX_TOKEN_LIFETIME_SECONDS: u64 = 86_400;
const REFRESH_TOKEN_LIFETIME_DAYS: i64 = 30;
const MAX_REGISTERED_CLIENTS: usize = 10_000;

/// Upstream provider the proxy forwards to
#[derive(Debug, Clone)]
pub struct UpstreamProvider {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub scopes: Vec<String>,
}

/// OAuth token response, as received upstream and as returned to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokenResponse {
    #[serde(with = "secret_string")]
    pub access_token: Secret<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "option_secret_string")]
    pub refresh_token: Option<Secret<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "option_secret_string")]
    pub id_token: Option<Secret<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Custom serde module for Secret<String>
mod secret_string {
    use secrecy::{ExposeSecret, Secret};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(secret: &Secret<String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(secret.expose_secret())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Secret<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Secret::new(s))
    }
}

/// Custom serde module for Option<Secret<String>>
mod option_secret_string {
    use secrecy::{ExposeSecret, Secret};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(secret: &Option<Secret<String>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match secret {
            Some(ref s) => serializer.serialize_some(s.expose_secret()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Secret<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt_s = Option::<String>::deserialize(deserializer)?;
        Ok(opt_s.map(Secret::new))
    }
}

/// OAuth error response body (RFC 6749 section 5.2)
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[error("{error}: {error_description}")]
pub struct OAuthError {
    pub error: &'static str,
    pub error_description: String,
}

impl OAuthError {
    fn new<S: Into<String>>(error: &'static str, description: S) -> Self {
        Self {
            error,
            error_description: description.into(),
        }
    }

    pub fn invalid_request<S: Into<String>>(description: S) -> Self {
        Self::new("invalid_request", description)
    }

    pub fn invalid_grant<S: Into<String>>(description: S) -> Self {
        Self::new("invalid_grant", description)
    }

    pub fn invalid_client<S: Into<String>>(description: S) -> Self {
        Self::new("invalid_client", description)
    }

    pub fn unsupported_grant_type<S: Into<String>>(description: S) -> Self {
        Self::new("unsupported_grant_type", description)
    }

    pub fn invalid_redirect_uri<S: Into<String>>(description: S) -> Self {
        Self::new("invalid_redirect_uri", description)
    }

    pub fn server_error<S: Into<String>>(description: S) -> Self {
        Self::new("server_error", description)
    }
}

/// Dynamic client registration request (RFC 7591)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationRequest {
    #[serde(default)]
    pub redirect_uris: Vec<String>,
    pub client_name: Option<String>,
}

/// A registered public client
#[derive(Debug, Clone, Serialize)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_id_issued_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: String,
}

/// Query of `/oauth/authorize`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizationRequest {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// Form body of `/oauth/token`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
}

/// An authorization forwarded upstream and not yet called back
struct PendingAuthorization {
    client_id: String,
    redirect_uri: String,
    client_state: Option<String>,
    code_challenge: String,
    upstream_verifier: Secret<String>,
    created_at: Instant,
}

/// A proxy-issued authorization code awaiting redemption
struct IssuedCode {
    client_id: String,
    redirect_uri: String,
    code_challenge: String,
    tokens: OAuthTokenResponse,
    created_at: Instant,
}

/// Claims of proxy-issued access tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocalClaims {
    iss: String,
    aud: String,
    sub: String,
    client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<String>,
    iat: i64,
    exp: i64,
    jti: String,
}

struct UpstreamGrant {
    access_token: Secret<String>,
    expires_at: DateTime<Utc>,
}

struct RefreshGrant {
    client_id: String,
    upstream_refresh: Secret<String>,
    expires_at: DateTime<Utc>,
}

/// Issues and checks the proxy's own access tokens.
///
/// Tokens are HS256 JWTs signed with a per-process key; each one names the
/// upstream token it stands for by `jti`.
struct LocalTokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    grants: DashMap<String, UpstreamGrant>,
    refresh: DashMap<String, RefreshGrant>,
}

impl LocalTokenIssuer {
    fn new(issuer: String) -> Self {
        let mut key = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self {
            encoding: EncodingKey::from_secret(&key),
            decoding: DecodingKey::from_secret(&key),
            issuer,
            grants: DashMap::new(),
            refresh: DashMap::new(),
        }
    }

    fn issue(&self, client_id: &str, upstream: OAuthTokenResponse) -> std::result::Result<OAuthTokenResponse, OAuthError> {
        let now = Utc::now();
        let lifetime = upstream
            .expires_in
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECONDS)
            .min(MAX_TOKEN_LIFETIME_SECONDS);
        let expires_at = now + ChronoDuration::seconds(lifetime as i64);
        let jti = random_token(16);

        let claims = LocalClaims {
            iss: self.issuer.clone(),
            aud: self.issuer.clone(),
            sub: client_id.to_string(),
            client_id: client_id.to_string(),
            scope: upstream.scope.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: jti.clone(),
        };
        let access_token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            error!("Failed to sign access token: {}", e);
            OAuthError::server_error("Failed to issue access token")
        })?;

        self.grants.retain(|_, grant| grant.expires_at > now);
        self.grants.insert(
            jti,
            UpstreamGrant {
                access_token: upstream.access_token,
                expires_at,
            },
        );

        let refresh_token = upstream.refresh_token.map(|upstream_refresh| {
            let local = random_token(32);
            self.refresh.retain(|_, grant| grant.expires_at > now);
            self.refresh.insert(
                fingerprint(&local),
                RefreshGrant {
                    client_id: client_id.to_string(),
                    upstream_refresh,
                    expires_at: now + ChronoDuration::days(REFRESH_TOKEN_LIFETIME_DAYS),
                },
            );
            Secret::new(local)
        });

        info!(client_id = %client_id, expires_in = lifetime, "Issued proxy access token");
        Ok(OAuthTokenResponse {
            access_token: Secret::new(access_token),
            token_type: default_token_type(),
            expires_in: Some(lifetime),
            refresh_token,
            id_token: None,
            scope: upstream.scope,
        })
    }

    /// Check a proxy-issued token and return its claims and upstream token
    fn verify(&self, token: &str) -> Result<(LocalClaims, Secret<String>)> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.issuer]);

        let data = decode::<LocalClaims>(token, &self.decoding, &validation).map_err(|e| {
            warn!("Proxy token validation failed: {}", e);
            match e.kind() {
                ErrorKind::ExpiredSignature => GatewayError::auth("Access token has expired"),
                _ => GatewayError::auth("Invalid access token"),
            }
        })?;

        let upstream = self
            .grants
            .get(&data.claims.jti)
            .filter(|grant| grant.expires_at > Utc::now())
            .map(|grant| grant.access_token.clone())
            .ok_or_else(|| GatewayError::auth("Access token is no longer valid"))?;
        Ok((data.claims, upstream))
    }
}

/// Authorization-code proxy with PKCE on both legs
pub struct OAuthProxy {
    upstream: UpstreamProvider,
    base_url: String,
    callback_url: String,
    client: reqwest::Client,
    clients: DashMap<String, ClientRegistration>,
    pending: DashMap<String, PendingAuthorization>,
    codes: DashMap<String, IssuedCode>,
    local: Option<LocalTokenIssuer>,
}

impl OAuthProxy {
    pub fn new(upstream: UpstreamProvider, public_base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(TOKEN_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to build OAuth client: {}", e)))?;
        let base_url = public_base_url.trim_end_matches('/').to_string();
        Ok(Self {
            upstream,
            callback_url: format!("{}/oauth/callback", base_url),
            base_url,
            client,
            clients: DashMap::new(),
            pending: DashMap::new(),
            codes: DashMap::new(),
            local: None,
        })
    }

    /// Issue proxy-signed access tokens instead of relaying upstream ones
    pub fn with_local_tokens(mut self) -> Self {
        self.local = Some(LocalTokenIssuer::new(self.base_url.clone()));
        self
    }

    pub fn upstream(&self) -> &UpstreamProvider {
        &self.upstream
    }

    /// Register a public client (RFC 7591)
    pub fn register(&self, request: RegistrationRequest) -> std::result::Result<ClientRegistration, OAuthError> {
        if request.redirect_uris.is_empty() {
            return Err(OAuthError::invalid_redirect_uri("redirect_uris is required"));
        }
        for uri in &request.redirect_uris {
            validate_redirect_uri(uri)?;
        }
        if self.clients.len() >= MAX_REGISTERED_CLIENTS {
            warn!("Client registration refused: registry is full");
            return Err(OAuthError::server_error("Too many registered clients"));
        }

        let registration = ClientRegistration {
            client_id: random_token(16),
            client_id_issued_at: Utc::now().timestamp(),
            client_name: request.client_name,
            redirect_uris: request.redirect_uris,
            grant_types: vec!["authorization_code".to_string(), "refresh_token".to_string()],
            response_types: vec!["code".to_string()],
            token_endpoint_auth_method: "none".to_string(),
        };
        self.clients
            .insert(registration.client_id.clone(), registration.clone());
        info!(client_id = %registration.client_id, "Registered OAuth client");
        Ok(registration)
    }

    /// Validate a client's authorization request and build the upstream
    /// authorization URL it is redirected to.
    pub fn authorize(&self, request: &AuthorizationRequest) -> std::result::Result<String, OAuthError> {
        self.purge_expired();

        if request.response_type.as_deref() != Some("code") {
            return Err(OAuthError::new("unsupported_response_type", "response_type must be code"));
        }
        let client_id = non_empty(&request.client_id, "client_id")?;
        let redirect_uri = non_empty(&request.redirect_uri, "redirect_uri")?;
        let registered = self
            .clients
            .get(client_id)
            .map(|client| client.redirect_uris.iter().any(|uri| uri == redirect_uri))
            .ok_or_else(|| OAuthError::invalid_client("Unknown client_id"))?;
        if !registered {
            return Err(OAuthError::invalid_request("redirect_uri is not registered for this client"));
        }
        let code_challenge = non_empty(&request.code_challenge, "code_challenge")?;
        if request.code_challenge_method.as_deref().unwrap_or("S256") != "S256" {
            return Err(OAuthError::invalid_request("Only the S256 code_challenge_method is supported"));
        }

        let upstream_verifier = generate_code_verifier();
        let upstream_challenge = generate_code_challenge(&upstream_verifier);
        let transaction = random_token(16);

        let mut url = url::Url::parse(&self.upstream.authorization_endpoint).map_err(|e| {
            error!("Invalid upstream authorization endpoint: {}", e);
            OAuthError::server_error("Upstream authorization endpoint is invalid")
        })?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.upstream.client_id)
            .append_pair("redirect_uri", &self.callback_url)
            .append_pair("state", &transaction)
            .append_pair("scope", &self.upstream.scopes.join(" "))
            .append_pair("code_challenge", &upstream_challenge)
            .append_pair("code_challenge_method", "S256");

        match self.pending.entry(transaction) {
            Entry::Occupied(_) => {
                warn!("Authorization transaction id collided with a pending one");
                return Err(OAuthError::server_error("Could not start authorization"));
            }
            Entry::Vacant(slot) => {
                slot.insert(PendingAuthorization {
                    client_id: client_id.to_string(),
                    redirect_uri: redirect_uri.to_string(),
                    client_state: request.state.clone().filter(|s| !s.is_empty()),
                    code_challenge: code_challenge.to_string(),
                    upstream_verifier: Secret::new(upstream_verifier),
                    created_at: Instant::now(),
                });
            }
        }
        debug!(client_id = %client_id, "Forwarding authorization upstream");

        Ok(url.to_string())
    }

    fn take_pending(&self, transaction: &str) -> std::result::Result<PendingAuthorization, OAuthError> {
        let (_, pending) = self
            .pending
            .remove(transaction)
            .ok_or_else(|| OAuthError::invalid_request("Unknown or expired OAuth state"))?;
        if pending.created_at.elapsed() > PENDING_TTL {
            warn!("OAuth callback arrived after the pending authorization expired");
            return Err(OAuthError::invalid_request("Unknown or expired OAuth state"));
        }
        Ok(pending)
    }

    /// Handle the upstream callback: redeem the upstream code and return the
    /// client redirect carrying a proxy-issued code.
    pub async fn complete(&self, code: &str, transaction: &str) -> std::result::Result<String, OAuthError> {
        let pending = self.take_pending(transaction)?;

        let tokens = match self.redeem_upstream_code(code, &pending.upstream_verifier).await {
            Ok(tokens) => tokens,
            Err(e) => {
                return client_redirect(
                    &pending.redirect_uri,
                    &[("error", e.error), ("error_description", e.error_description.as_str())],
                    pending.client_state.as_deref(),
                )
            }
        };

        let proxy_code = random_token(32);
        self.codes.insert(
            fingerprint(&proxy_code),
            IssuedCode {
                client_id: pending.client_id,
                redirect_uri: pending.redirect_uri.clone(),
                code_challenge: pending.code_challenge,
                tokens,
                created_at: Instant::now(),
            },
        );
        info!("Upstream authorization completed; issued authorization code");

        client_redirect(
            &pending.redirect_uri,
            &[("code", proxy_code.as_str())],
            pending.client_state.as_deref(),
        )
    }

    /// Relay an upstream authorization error to the client
    pub fn fail(
        &self,
        transaction: &str,
        error: &str,
        description: Option<&str>,
    ) -> std::result::Result<String, OAuthError> {
        let pending = self.take_pending(transaction)?;
        warn!(error = %error, "Upstream authorization failed");
        let mut params = vec![("error", error)];
        if let Some(description) = description {
            params.push(("error_description", description));
        }
        client_redirect(&pending.redirect_uri, &params, pending.client_state.as_deref())
    }

    /// The `/oauth/token` endpoint
    pub async fn token(&self, request: &TokenRequest) -> std::result::Result<OAuthTokenResponse, OAuthError> {
        match request.grant_type.as_deref() {
            Some("authorization_code") => self.redeem_code(request),
            Some("refresh_token") => self.refresh(request).await,
            Some(other) => Err(OAuthError::unsupported_grant_type(format!(
                "Grant type '{}' is not supported",
                other
            ))),
            None => Err(OAuthError::invalid_request("grant_type is required")),
        }
    }

    fn redeem_code(&self, request: &TokenRequest) -> std::result::Result<OAuthTokenResponse, OAuthError> {
        let code = non_empty(&request.code, "code")?;
        let verifier = non_empty(&request.code_verifier, "code_verifier")?;

        let (_, issued) = self
            .codes
            .remove(&fingerprint(code))
            .ok_or_else(|| OAuthError::invalid_grant("Unknown or already used authorization code"))?;
        if issued.created_at.elapsed() > CODE_TTL {
            return Err(OAuthError::invalid_grant("Authorization code has expired"));
        }
        if request.client_id.as_deref().is_some_and(|id| id != issued.client_id) {
            return Err(OAuthError::invalid_grant("Authorization code was issued to another client"));
        }
        if request.redirect_uri.as_deref().is_some_and(|uri| uri != issued.redirect_uri) {
            return Err(OAuthError::invalid_grant("redirect_uri does not match the authorization request"));
        }
        if !(43..=128).contains(&verifier.len()) || generate_code_challenge(verifier) != issued.code_challenge {
            warn!(client_id = %issued.client_id, "PKCE verification failed");
            return Err(OAuthError::invalid_grant("PKCE verification failed"));
        }

        match &self.local {
            Some(local) => local.issue(&issued.client_id, issued.tokens),
            None => Ok(issued.tokens),
        }
    }

    async fn refresh(&self, request: &TokenRequest) -> std::result::Result<OAuthTokenResponse, OAuthError> {
        let presented = non_empty(&request.refresh_token, "refresh_token")?;

        let Some(local) = &self.local else {
            return self
                .upstream_token_request(&[("grant_type", "refresh_token"), ("refresh_token", presented)])
                .await;
        };

        let (_, grant) = local
            .refresh
            .remove(&fingerprint(presented))
            .ok_or_else(|| OAuthError::invalid_grant("Unknown refresh token"))?;
        if grant.expires_at <= Utc::now() {
            return Err(OAuthError::invalid_grant("Refresh token has expired"));
        }
        if request.client_id.as_deref().is_some_and(|id| id != grant.client_id) {
            return Err(OAuthError::invalid_grant("Refresh token was issued to another client"));
        }

        let mut upstream = self
            .upstream_token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", grant.upstream_refresh.expose_secret().as_str()),
            ])
            .await?;
        if upstream.refresh_token.is_none() {
            upstream.refresh_token = Some(grant.upstream_refresh);
        }
        local.issue(&grant.client_id, upstream)
    }

    async fn redeem_upstream_code(
        &self,
        code: &str,
        verifier: &Secret<String>,
    ) -> std::result::Result<OAuthTokenResponse, OAuthError> {
        self.upstream_token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.callback_url.as_str()),
            ("code_verifier", verifier.expose_secret().as_str()),
        ])
        .await
    }

    async fn upstream_token_request(&self, grant: &[(&str, &str)]) -> std::result::Result<OAuthTokenResponse, OAuthError> {
        let mut params: Vec<(&str, &str)> = grant.to_vec();
        params.push(("client_id", self.upstream.client_id.as_str()));
        params.push(("client_secret", self.upstream.client_secret.expose_secret().as_str()));

        let response = self
            .client
            .post(&self.upstream.token_endpoint)
            .header("Accept", "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                error!("Upstream token request failed: {}", e);
                OAuthError::server_error("Upstream token endpoint is unreachable")
            })?;

        if !response.status().is_success() {
            error!("Upstream token request failed with status: {}", response.status());
            return Err(OAuthError::invalid_grant("Upstream provider rejected the grant"));
        }

        response.json().await.map_err(|e| {
            error!("Failed to parse upstream token response: {}", e);
            OAuthError::server_error("Invalid upstream token response")
        })
    }

    /// Verify a proxy-issued access token, then the upstream token behind it
    pub async fn verify_issued(&self, token: &str, verifier: &JwtVerifier) -> Result<VerifiedClaims> {
        let local = self
            .local
            .as_ref()
            .ok_or_else(|| GatewayError::auth("This server does not issue access tokens"))?;
        let (claims, upstream) = local.verify(token)?;
        let verified = verifier.verify(upstream.expose_secret()).await?;
        Ok(verified
            .with_client_id(Some(claims.client_id))
            .with_token(Secret::new(token.to_string())))
    }

    fn purge_expired(&self) {
        self.pending
            .retain(|_, pending| pending.created_at.elapsed() <= PENDING_TTL);
        self.codes.retain(|_, code| code.created_at.elapsed() <= CODE_TTL);
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn non_empty<'a>(value: &'a Option<String>, name: &str) -> std::result::Result<&'a str, OAuthError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OAuthError::invalid_request(format!("{} is required", name)))
}

/// Registered redirect URIs must be absolute, carry no fragment, and use
/// plain http only for loopback hosts.
fn validate_redirect_uri(uri: &str) -> std::result::Result<(), OAuthError> {
    let parsed = url::Url::parse(uri)
        .map_err(|_| OAuthError::invalid_redirect_uri(format!("'{}' is not an absolute URI", uri)))?;
    if parsed.fragment().is_some() {
        return Err(OAuthError::invalid_redirect_uri("redirect URIs may not contain a fragment"));
    }
    match parsed.scheme() {
        "javascript" | "data" | "file" => Err(OAuthError::invalid_redirect_uri(format!(
            "scheme '{}' is not allowed",
            parsed.scheme()
        ))),
        "http" => match parsed.host_str() {
            Some("localhost") | Some("127.0.0.1") | Some("[::1]") => Ok(()),
            _ => Err(OAuthError::invalid_redirect_uri("http redirect URIs must use a loopback host")),
        },
        _ => Ok(()),
    }
}

fn client_redirect(
    redirect_uri: &str,
    params: &[(&str, &str)],
    state: Option<&str>,
) -> std::result::Result<String, OAuthError> {
    let mut url = url::Url::parse(redirect_uri).map_err(|e| {
        error!("Stored redirect URI is invalid: {}", e);
        OAuthError::server_error("Invalid redirect URI")
    })?;
    {
        let mut query = url.query_pairs_mut();
        for (name, value) in params {
            query.append_pair(name, value);
        }
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }
    Ok(url.to_string())
}

fn random_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// 32 random bytes, base64url encoded (43 characters)
fn generate_code_verifier() -> String {
    let mut buf = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut buf);
    general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// Generate code challenge from verifier using the S256 method
pub fn generate_code_challenge(code_verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(code_verifier.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(hasher.finalize())
}
