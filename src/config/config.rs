use crate::error::{GatewayError, Result};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server and transport configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Recipe API (downstream) configuration
    #[serde(default)]
    pub downstream: DownstreamConfig,
    /// Inbound authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,
    /// Token delegation configuration
    #[serde(default)]
    pub delegation: DelegationConfig,
    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Confirmation gate configuration
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
    /// Error containment configuration
    #[serde(default)]
    pub error_handling: ErrorHandlingConfig,
    /// Policy decision point configuration
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Transport used to receive tool calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Line-delimited JSON-RPC over stdin/stdout
    #[default]
    Stdio,
    /// JSON-RPC over HTTP POST
    Http,
}

impl FromStr for TransportKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "stdio" => Ok(TransportKind::Stdio),
            "http" => Ok(TransportKind::Http),
            other => Err(GatewayError::config(format!(
                "Unknown transport '{}'. Expected 'stdio' or 'http'",
                other
            ))),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Stdio => write!(f, "stdio"),
            TransportKind::Http => write!(f, "http"),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Transport to serve
    #[serde(default)]
    pub transport: TransportKind,
    /// Host to bind the HTTP transport to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind the HTTP transport to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally reachable base URL of this server, used in OAuth metadata and redirects
    #[serde(default)]
    pub public_base_url: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Stdio,
            host: default_host(),
            port: default_port(),
            public_base_url: None,
        }
    }
}

/// Recipe API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownstreamConfig {
    /// Base URL of the recipe API, e.g. `https://mealie.example.com`
    #[serde(default)]
    pub base_url: String,
    /// Default API token for the recipe API
    #[serde(default, serialize_with = "redact_optional_secret")]
    pub token: Option<Secret<String>>,
    /// Verify TLS certificates of the recipe API
    #[serde(default = "default_true")]
    pub verify_tls: bool,
    /// Request timeout in seconds
    #[serde(default = "default_downstream_timeout")]
    pub timeout_seconds: u64,
    /// Reuse HTTP clients keyed by base URL and TLS setting instead of one client per call
    #[serde(default)]
    pub pool_clients: bool,
}

fn default_true() -> bool {
    true
}

fn default_downstream_timeout() -> u64 {
    30
}

impl Default for DownstreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            verify_tls: true,
            timeout_seconds: default_downstream_timeout(),
            pool_clients: false,
        }
    }
}

/// Inbound authentication mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AuthModeKind {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "static")]
    Static,
    #[serde(rename = "jwt")]
    Jwt,
    #[serde(rename = "oauth-proxy")]
    OAuthProxy,
    #[serde(rename = "oidc-proxy")]
    OidcProxy,
    #[serde(rename = "remote-oauth")]
    RemoteOAuth,
}

impl FromStr for AuthModeKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "none" | "" => Ok(AuthModeKind::None),
            "static" => Ok(AuthModeKind::Static),
            "jwt" => Ok(AuthModeKind::Jwt),
            "oauth-proxy" => Ok(AuthModeKind::OAuthProxy),
            "oidc-proxy" => Ok(AuthModeKind::OidcProxy),
            "remote-oauth" => Ok(AuthModeKind::RemoteOAuth),
            other => Err(GatewayError::config(format!(
                "Unknown auth mode '{}'. Expected one of: none, static, jwt, oauth-proxy, oidc-proxy, remote-oauth",
                other
            ))),
        }
    }
}

impl fmt::Display for AuthModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthModeKind::None => "none",
            AuthModeKind::Static => "static",
            AuthModeKind::Jwt => "jwt",
            AuthModeKind::OAuthProxy => "oauth-proxy",
            AuthModeKind::OidcProxy => "oidc-proxy",
            AuthModeKind::RemoteOAuth => "remote-oauth",
        };
        write!(f, "{}", name)
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Selected authentication mode
    #[serde(default)]
    pub mode: AuthModeKind,
    /// Token table for `static` mode
    #[serde(default)]
    pub static_tokens: Vec<StaticTokenEntry>,
    /// JWT verification settings, used by `jwt`, `oauth-proxy` and `remote-oauth`
    #[serde(default)]
    pub jwt: JwtConfig,
    /// Upstream OAuth provider for `oauth-proxy`
    #[serde(default)]
    pub oauth_proxy: OAuthProxyConfig,
    /// OIDC provider for `oidc-proxy`
    #[serde(default)]
    pub oidc_proxy: OidcProxyConfig,
    /// Trusted authorization servers for `remote-oauth`
    #[serde(default)]
    pub remote_oauth: RemoteOAuthConfig,
}

/// Static token table entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticTokenEntry {
    /// Bearer token value
    #[serde(serialize_with = "redact_secret")]
    pub token: Secret<String>,
    /// Client identifier reported for calls using this token
    pub client_id: String,
    /// Scopes granted to this token
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// JWT verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// JWKS endpoint used to fetch verification keys
    #[serde(default)]
    pub jwks_uri: Option<String>,
    /// Expected issuer
    #[serde(default)]
    pub issuer: Option<String>,
    /// Expected audience
    #[serde(default)]
    pub audience: Option<String>,
    /// Signing algorithm (RS256, ES256, HS256, ...)
    #[serde(default = "default_jwt_algorithm")]
    pub algorithm: String,
    /// Shared secret (HMAC) or PEM public key
    #[serde(default, serialize_with = "redact_optional_secret")]
    pub signing_key: Option<Secret<String>>,
    /// Scopes every token must carry
    #[serde(default)]
    pub required_scopes: Vec<String>,
    /// How long fetched JWKS keys are reused, in seconds
    #[serde(default = "default_jwks_cache_seconds")]
    pub jwks_cache_seconds: u64,
}

fn default_jwt_algorithm() -> String {
    "RS256".to_string()
}

fn default_jwks_cache_seconds() -> u64 {
    300
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            jwks_uri: None,
            issuer: None,
            audience: None,
            algorithm: default_jwt_algorithm(),
            signing_key: None,
            required_scopes: Vec::new(),
            jwks_cache_seconds: default_jwks_cache_seconds(),
        }
    }
}

impl JwtConfig {
    /// Names of the fields a JWT verifier cannot work without
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.jwks_uri) && self.signing_key.is_none() {
            missing.push("auth.jwt.jwks_uri or auth.jwt.signing_key");
        }
        if is_blank(&self.issuer) {
            missing.push("auth.jwt.issuer");
        }
        if is_blank(&self.audience) {
            missing.push("auth.jwt.audience");
        }
        missing
    }

    pub fn is_hmac(&self) -> bool {
        self.algorithm.to_ascii_uppercase().starts_with("HS")
    }
}

/// Upstream OAuth provider proxied by `oauth-proxy`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OAuthProxyConfig {
    /// Upstream authorization endpoint
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    /// Upstream token endpoint
    #[serde(default)]
    pub token_endpoint: Option<String>,
    /// Client registered with the upstream provider
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default, serialize_with = "redact_optional_secret")]
    pub client_secret: Option<Secret<String>>,
    /// Scopes requested during authorization
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// OIDC provider proxied by `oidc-proxy`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcProxyConfig {
    /// OpenID configuration document URL
    #[serde(default)]
    pub discovery_url: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default, serialize_with = "redact_optional_secret")]
    pub client_secret: Option<Secret<String>>,
    /// Expected audience of inbound tokens; unchecked when unset
    #[serde(default)]
    pub audience: Option<String>,
    /// Scopes requested during authorization
    #[serde(default = "default_oidc_scopes")]
    pub scopes: Vec<String>,
    /// Discovery request timeout in seconds
    #[serde(default = "default_short_timeout")]
    pub timeout_seconds: u64,
}

fn default_oidc_scopes() -> Vec<String> {
    vec!["openid".to_string()]
}

fn default_short_timeout() -> u64 {
    10
}

impl Default for OidcProxyConfig {
    fn default() -> Self {
        Self {
            discovery_url: None,
            client_id: None,
            client_secret: None,
            audience: None,
            scopes: default_oidc_scopes(),
            timeout_seconds: default_short_timeout(),
        }
    }
}

/// Trusted authorization servers for `remote-oauth`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RemoteOAuthConfig {
    #[serde(default)]
    pub authorization_servers: Vec<String>,
}

/// Token delegation (RFC 8693 token exchange) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationConfig {
    /// Exchange caller tokens for downstream tokens
    #[serde(default)]
    pub enabled: bool,
    /// Audience of the delegated token
    #[serde(default)]
    pub audience: Option<String>,
    /// Scopes of the delegated token
    #[serde(default = "default_delegation_scopes")]
    pub scopes: Vec<String>,
    /// Discovery URL; falls back to `auth.oidc_proxy.discovery_url`
    #[serde(default)]
    pub oidc_discovery_url: Option<String>,
    /// Client id; falls back to `auth.oidc_proxy.client_id`
    #[serde(default)]
    pub oidc_client_id: Option<String>,
    /// Client secret; falls back to `auth.oidc_proxy.client_secret`
    #[serde(default, serialize_with = "redact_optional_secret")]
    pub oidc_client_secret: Option<Secret<String>>,
    /// Token exchange timeout in seconds
    #[serde(default = "default_short_timeout")]
    pub timeout_seconds: u64,
    /// Reuse delegated tokens until shortly before they expire
    #[serde(default)]
    pub cache_tokens: bool,
    /// Token endpoint learned from OIDC discovery; never read from file or environment
    #[serde(skip)]
    pub token_endpoint: Option<String>,
}

fn default_delegation_scopes() -> Vec<String> {
    vec!["api".to_string()]
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            audience: None,
            scopes: default_delegation_scopes(),
            oidc_discovery_url: None,
            oidc_client_id: None,
            oidc_client_secret: None,
            timeout_seconds: default_short_timeout(),
            cache_tokens: false,
            token_endpoint: None,
        }
    }
}

/// OIDC client used for token exchange after fallbacks are applied
#[derive(Debug, Clone)]
pub struct DelegationClient {
    pub discovery_url: String,
    pub client_id: String,
    pub client_secret: Secret<String>,
}

impl DelegationConfig {
    /// Resolve the OIDC client, preferring the delegation block over the oidc-proxy block
    pub fn client(&self, oidc: &OidcProxyConfig) -> Option<DelegationClient> {
        let discovery_url = non_blank(&self.oidc_discovery_url).or(non_blank(&oidc.discovery_url))?;
        let client_id = non_blank(&self.oidc_client_id).or(non_blank(&oidc.client_id))?;
        let client_secret = non_blank_secret(&self.oidc_client_secret)
            .or(non_blank_secret(&oidc.client_secret))?;
        Some(DelegationClient {
            discovery_url,
            client_id,
            client_secret: client_secret.clone(),
        })
    }

    /// Scopes joined the way the token endpoint expects them
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

/// Token bucket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Steady refill rate
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,
    /// Bucket capacity
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Keep one bucket per caller subject instead of one per process
    #[serde(default)]
    pub per_caller: bool,
}

fn default_requests_per_second() -> u32 {
    10
}

fn default_burst() -> u32 {
    20
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst: default_burst(),
            per_caller: false,
        }
    }
}

/// Confirmation gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Fail mutating calls when the client cannot be asked for confirmation
    #[serde(default)]
    pub require_confirmation: bool,
    /// How long to wait for the caller's answer, in seconds
    #[serde(default = "default_confirmation_timeout")]
    pub timeout_seconds: u64,
}

fn default_confirmation_timeout() -> u64 {
    300
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            require_confirmation: false,
            timeout_seconds: default_confirmation_timeout(),
        }
    }
}

/// Error containment configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ErrorHandlingConfig {
    /// Attach the full error text to failed tool results
    #[serde(default)]
    pub include_detail: bool,
}

/// Policy decision point configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Decision endpoint, e.g. `http://opa:8181/v1/data/mealie/allow`
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_short_timeout")]
    pub timeout_seconds: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_seconds: default_short_timeout(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::Text,
        }
    }
}

/// Command-line overrides, applied last
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub transport: Option<TransportKind>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub auth_mode: Option<AuthModeKind>,
    pub delegation: Option<bool>,
    pub audience: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub policy_endpoint: Option<String>,
    pub require_confirmation: Option<bool>,
    pub log_level: Option<String>,
}

fn redact_secret<S: Serializer>(_secret: &Secret<String>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str("[REDACTED]")
}

fn redact_optional_secret<S: Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match secret {
        Some(_) => serializer.serialize_some("[REDACTED]"),
        None => serializer.serialize_none(),
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.clone().filter(|v| !v.trim().is_empty())
}

fn non_blank_secret(value: &Option<Secret<String>>) -> Option<&Secret<String>> {
    value.as_ref().filter(|s| !s.expose_secret().trim().is_empty())
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: fmt::Display,
{
    match env_value(name) {
        Some(raw) => raw.parse().map(Some).map_err(|e: T::Err| {
            GatewayError::config(format!("Invalid {} environment variable: {}", name, e))
        }),
        None => Ok(None),
    }
}

fn split_list(raw: &str, separator: char) -> Vec<String> {
    raw.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parse `token:client_id:scope1 scope2;token2:client2` into static token entries
fn parse_static_tokens(raw: &str) -> Result<Vec<StaticTokenEntry>> {
    split_list(raw, ';')
        .into_iter()
        .map(|entry| {
            let mut parts = entry.splitn(3, ':');
            let token = parts.next().unwrap_or_default().trim().to_string();
            let client_id = parts.next().unwrap_or_default().trim().to_string();
            if token.is_empty() || client_id.is_empty() {
                return Err(GatewayError::config(
                    "Invalid MEALIE_MCP_STATIC_TOKENS entry: expected token:client_id[:scopes]",
                ));
            }
            let scopes = parts.next().map(|s| split_list(s, ' ')).unwrap_or_default();
            Ok(StaticTokenEntry {
                token: Secret::new(token),
                client_id,
                scopes,
            })
        })
        .collect()
}

impl Config {
    /// Load .env files in order of precedence
    fn load_env_files() {
        let env = std::env::var("MEALIE_MCP_ENV").unwrap_or_else(|_| "development".to_string());

        let env_specific_file = format!(".env.{}", env);
        let env_files = [".env", env_specific_file.as_str(), ".env.local"];

        for env_file in env_files {
            match dotenvy::from_filename(env_file) {
                Ok(_) => {
                    tracing::info!("Loaded environment variables from {}", env_file);
                }
                Err(e) if e.not_found() => {
                    tracing::debug!("No {} file found, skipping", env_file);
                }
                Err(e) => {
                    tracing::warn!("Failed to load {}: {}", env_file, e);
                }
            }
        }
    }

    /// Load configuration from file with environment variables and CLI overrides
    pub fn load<P: AsRef<Path>>(path: P, overrides: ConfigOverrides) -> Result<Self> {
        // Precedence: defaults < file < .env/environment < CLI
        Self::load_env_files();

        let mut config = Self::from_file(path)?;
        config.apply_environment_overrides()?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML file, falling back to defaults when it does not exist
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                GatewayError::config(format!("Failed to read config file: {}", e))
            })?;

            serde_yaml::from_str(&content).map_err(|e| {
                GatewayError::config(format!("Failed to parse config file: {}", e))
            })
        } else {
            tracing::warn!(
                "Config file {} not found, using defaults",
                path.as_ref().display()
            );
            Ok(Self::default())
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_environment_overrides(&mut self) -> Result<()> {
        // Recipe API
        if let Some(base_url) = env_value("MEALIE_BASE_URL") {
            self.downstream.base_url = base_url;
        }
        if let Some(token) = env_value("MEALIE_API_TOKEN") {
            self.downstream.token = Some(Secret::new(token));
        }
        if let Some(verify) = parse_env::<bool>("MEALIE_VERIFY_TLS")? {
            self.downstream.verify_tls = verify;
        }

        // Server
        if let Some(transport) = parse_env::<TransportKind>("MEALIE_MCP_TRANSPORT")? {
            self.server.transport = transport;
        }
        if let Some(host) = env_value("MEALIE_MCP_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parse_env::<u16>("MEALIE_MCP_PORT")? {
            self.server.port = port;
        }
        if let Some(base_url) = env_value("MEALIE_MCP_BASE_URL") {
            self.server.public_base_url = Some(base_url);
        }

        // Authentication
        if let Some(mode) = parse_env::<AuthModeKind>("MEALIE_MCP_AUTH")? {
            self.auth.mode = mode;
        }
        if let Some(raw) = env_value("MEALIE_MCP_STATIC_TOKENS") {
            self.auth.static_tokens = parse_static_tokens(&raw)?;
        }
        if let Some(v) = env_value("MEALIE_MCP_JWT_JWKS_URI") {
            self.auth.jwt.jwks_uri = Some(v);
        }
        if let Some(v) = env_value("MEALIE_MCP_JWT_ISSUER") {
            self.auth.jwt.issuer = Some(v);
        }
        if let Some(v) = env_value("MEALIE_MCP_JWT_AUDIENCE") {
            self.auth.jwt.audience = Some(v);
        }
        if let Some(v) = env_value("MEALIE_MCP_JWT_ALGORITHM") {
            self.auth.jwt.algorithm = v;
        }
        if let Some(v) = env_value("MEALIE_MCP_JWT_SIGNING_KEY") {
            self.auth.jwt.signing_key = Some(Secret::new(v));
        }
        if let Some(v) = env_value("MEALIE_MCP_JWT_REQUIRED_SCOPES") {
            self.auth.jwt.required_scopes = split_list(&v, ',');
        }
        if let Some(v) = env_value("MEALIE_MCP_OAUTH_AUTHORIZATION_ENDPOINT") {
            self.auth.oauth_proxy.authorization_endpoint = Some(v);
        }
        if let Some(v) = env_value("MEALIE_MCP_OAUTH_TOKEN_ENDPOINT") {
            self.auth.oauth_proxy.token_endpoint = Some(v);
        }
        if let Some(v) = env_value("MEALIE_MCP_OAUTH_CLIENT_ID") {
            self.auth.oauth_proxy.client_id = Some(v);
        }
        if let Some(v) = env_value("MEALIE_MCP_OAUTH_CLIENT_SECRET") {
            self.auth.oauth_proxy.client_secret = Some(Secret::new(v));
        }
        if let Some(v) = env_value("MEALIE_MCP_OIDC_DISCOVERY_URL") {
            self.auth.oidc_proxy.discovery_url = Some(v);
        }
        if let Some(v) = env_value("MEALIE_MCP_OIDC_CLIENT_ID") {
            self.auth.oidc_proxy.client_id = Some(v);
        }
        if let Some(v) = env_value("MEALIE_MCP_OIDC_CLIENT_SECRET") {
            self.auth.oidc_proxy.client_secret = Some(Secret::new(v));
        }
        if let Some(v) = env_value("MEALIE_MCP_AUTH_SERVERS") {
            self.auth.remote_oauth.authorization_servers = split_list(&v, ',');
        }

        // Delegation
        if let Some(enabled) = parse_env::<bool>("MEALIE_MCP_DELEGATION")? {
            self.delegation.enabled = enabled;
        }
        if let Some(audience) = env_value("MEALIE_MCP_AUDIENCE") {
            self.delegation.audience = Some(audience);
        }
        if let Some(scopes) = env_value("MEALIE_MCP_SCOPES") {
            self.delegation.scopes = split_list(&scopes, ',');
        }

        // Pipeline
        if let Some(endpoint) = env_value("MEALIE_MCP_POLICY_ENDPOINT") {
            self.policy.endpoint = Some(endpoint);
        }
        if let Some(required) = parse_env::<bool>("MEALIE_MCP_REQUIRE_CONFIRMATION")? {
            self.confirmation.require_confirmation = required;
        }
        if let Some(detail) = parse_env::<bool>("MEALIE_MCP_INCLUDE_ERROR_DETAIL")? {
            self.error_handling.include_detail = detail;
        }

        Ok(())
    }

    /// Apply command-line overrides (highest precedence)
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(transport) = overrides.transport {
            self.server.transport = transport;
        }
        if let Some(host) = overrides.host {
            self.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(mode) = overrides.auth_mode {
            self.auth.mode = mode;
        }
        if let Some(enabled) = overrides.delegation {
            self.delegation.enabled = enabled;
        }
        if let Some(audience) = overrides.audience {
            self.delegation.audience = Some(audience);
        }
        if let Some(scopes) = overrides.scopes {
            self.delegation.scopes = scopes;
        }
        if let Some(endpoint) = overrides.policy_endpoint {
            self.policy.endpoint = Some(endpoint);
        }
        if let Some(required) = overrides.require_confirmation {
            self.confirmation.require_confirmation = required;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    /// Validate the configuration. Per-mode auth requirements are checked by the auth selector.
    pub fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            return Err(GatewayError::config("Server host cannot be empty"));
        }
        if self.server.transport == TransportKind::Http && self.server.port == 0 {
            return Err(GatewayError::config("Server port cannot be 0"));
        }

        if self.downstream.base_url.trim().is_empty() {
            return Err(GatewayError::config(
                "Recipe API base URL is required (downstream.base_url or MEALIE_BASE_URL)",
            ));
        }
        url::Url::parse(&self.downstream.base_url).map_err(|e| {
            GatewayError::config(format!(
                "Invalid recipe API base URL '{}': {}",
                self.downstream.base_url, e
            ))
        })?;
        if self.downstream.timeout_seconds == 0 {
            return Err(GatewayError::config("downstream.timeout_seconds cannot be 0"));
        }

        if self.rate_limit.requests_per_second == 0 {
            return Err(GatewayError::config("rate_limit.requests_per_second cannot be 0"));
        }
        if self.rate_limit.burst == 0 {
            return Err(GatewayError::config("rate_limit.burst cannot be 0"));
        }

        if let Some(endpoint) = &self.policy.endpoint {
            url::Url::parse(endpoint).map_err(|e| {
                GatewayError::config(format!("Invalid policy endpoint '{}': {}", endpoint, e))
            })?;
        }

        self.validate_delegation()
    }

    fn validate_delegation(&self) -> Result<()> {
        if !self.delegation.enabled {
            return Ok(());
        }

        let mut missing = Vec::new();
        if is_blank(&self.delegation.audience) {
            missing.push("delegation.audience");
        }
        if self.delegation.scopes.is_empty() {
            missing.push("delegation.scopes");
        }
        let oidc = &self.auth.oidc_proxy;
        if is_blank(&self.delegation.oidc_discovery_url) && is_blank(&oidc.discovery_url) {
            missing.push("OIDC discovery URL");
        }
        if is_blank(&self.delegation.oidc_client_id) && is_blank(&oidc.client_id) {
            missing.push("OIDC client id");
        }
        if non_blank_secret(&self.delegation.oidc_client_secret).is_none()
            && non_blank_secret(&oidc.client_secret).is_none()
        {
            missing.push("OIDC client secret");
        }
        if !missing.is_empty() {
            return Err(GatewayError::config(format!(
                "Token delegation is enabled but missing: {}",
                missing.join(", ")
            )));
        }

        if self.auth.mode != AuthModeKind::OidcProxy {
            return Err(GatewayError::config(format!(
                "Token delegation requires the oidc-proxy auth mode, but '{}' is configured",
                self.auth.mode
            )));
        }

        Ok(())
    }

    /// Public base URL of this server, derived from host and port when not configured
    pub fn public_base_url(&self) -> String {
        match non_blank(&self.server.public_base_url) {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.server.host, self.server.port),
        }
    }
}
