//! JWT verification against a configured key or a JWKS endpoint

use crate::auth::VerifiedClaims;
use crate::config::JwtConfig;
use crate::error::{GatewayError, Result};
use base64::{engine::general_purpose, Engine};
use chrono::{TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Header, Validation};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Claims read from verified tokens
#[derive(Debug, Clone, Deserialize)]
struct RawClaims {
    sub: Option<String>,
    iss: Option<String>,
    exp: Option<i64>,
    client_id: Option<String>,
    azp: Option<String>,
    scope: Option<String>,
    scp: Option<ScopeClaim>,
}

/// `scp` may be a space-separated string or an array
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ScopeClaim {
    Single(String),
    Multiple(Vec<String>),
}

impl RawClaims {
    fn scopes(&self) -> Vec<String> {
        if let Some(scope) = &self.scope {
            return scope.split_whitespace().map(String::from).collect();
        }
        match &self.scp {
            Some(ScopeClaim::Single(s)) => s.split_whitespace().map(String::from).collect(),
            Some(ScopeClaim::Multiple(v)) => v.clone(),
            None => Vec::new(),
        }
    }
}

/// JSON Web Key Set
#[derive(Debug, Clone, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: Option<String>,
    pub alg: Option<String>,
    #[serde(rename = "use")]
    pub use_: Option<String>,
    // RSA
    pub n: Option<String>,
    pub e: Option<String>,
    // EC
    pub x: Option<String>,
    pub y: Option<String>,
    // Symmetric
    pub k: Option<String>,
}

impl Jwk {
    fn to_decoding_key(&self) -> Result<DecodingKey> {
        let missing = |what: &str| GatewayError::auth(format!("JWKS key is missing {}", what));
        match self.kty.as_str() {
            "RSA" => {
                let n = self.n.as_deref().ok_or_else(|| missing("RSA modulus"))?;
                let e = self.e.as_deref().ok_or_else(|| missing("RSA exponent"))?;
                DecodingKey::from_rsa_components(n, e)
                    .map_err(|e| GatewayError::auth(format!("Invalid RSA key in JWKS: {}", e)))
            }
            "EC" => {
                let x = self.x.as_deref().ok_or_else(|| missing("EC x coordinate"))?;
                let y = self.y.as_deref().ok_or_else(|| missing("EC y coordinate"))?;
                DecodingKey::from_ec_components(x, y)
                    .map_err(|e| GatewayError::auth(format!("Invalid EC key in JWKS: {}", e)))
            }
            "oct" => {
                let k = self.k.as_deref().ok_or_else(|| missing("symmetric key"))?;
                let bytes = general_purpose::URL_SAFE_NO_PAD
                    .decode(k)
                    .map_err(|_| GatewayError::auth("Invalid base64 key in JWKS"))?;
                Ok(DecodingKey::from_secret(&bytes))
            }
            other => Err(GatewayError::auth(format!("Unsupported JWKS key type: {}", other))),
        }
    }
}

struct CachedJwks {
    fetched_at: Instant,
    jwks: Jwks,
}

/// JWKS endpoint with a time-bounded cache
struct JwksSource {
    uri: String,
    client: reqwest::Client,
    ttl: Duration,
    cache: RwLock<Option<CachedJwks>>,
}

impl JwksSource {
    fn new(uri: String, ttl: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to build JWKS client: {}", e)))?;
        Ok(Self {
            uri,
            client,
            ttl,
            cache: RwLock::new(None),
        })
    }

    async fn keys(&self, force_refresh: bool) -> Result<Jwks> {
        if !force_refresh {
            let cached = self.cache.read().await;
            if let Some(entry) = cached.as_ref() {
                if entry.fetched_at.elapsed() < self.ttl {
                    return Ok(entry.jwks.clone());
                }
            }
        }

        debug!(jwks_uri = %self.uri, "Fetching JWKS");
        let response = self.client.get(&self.uri).send().await.map_err(|e| {
            warn!("JWKS fetch from {} failed: {}", self.uri, e);
            GatewayError::auth("Unable to fetch token signing keys")
        })?;
        if !response.status().is_success() {
            warn!("JWKS endpoint {} returned {}", self.uri, response.status());
            return Err(GatewayError::auth("Unable to fetch token signing keys"));
        }
        let jwks: Jwks = response.json().await.map_err(|e| {
            warn!("Invalid JWKS document from {}: {}", self.uri, e);
            GatewayError::auth("Unable to fetch token signing keys")
        })?;

        *self.cache.write().await = Some(CachedJwks {
            fetched_at: Instant::now(),
            jwks: jwks.clone(),
        });
        Ok(jwks)
    }

    async fn decoding_key(&self, header: &Header) -> Result<DecodingKey> {
        let jwks = self.keys(false).await?;
        if let Some(jwk) = find_key(&jwks, header) {
            return jwk.to_decoding_key();
        }

        // Unknown kid: the provider may have rotated keys
        let jwks = self.keys(true).await?;
        find_key(&jwks, header)
            .ok_or_else(|| GatewayError::auth("Signing key not found in JWKS"))?
            .to_decoding_key()
    }
}

fn find_key<'a>(jwks: &'a Jwks, header: &Header) -> Option<&'a Jwk> {
    match &header.kid {
        Some(kid) => jwks.keys.iter().find(|k| k.kid.as_deref() == Some(kid.as_str())),
        None => jwks
            .keys
            .iter()
            .find(|k| k.use_.as_deref().map_or(true, |u| u == "sig")),
    }
}

enum KeySource {
    Static { key: DecodingKey, algorithm: Algorithm },
    Jwks(JwksSource),
}

/// Verifies bearer JWTs: signature, issuer, audience, expiry and required scopes
pub struct JwtVerifier {
    keys: KeySource,
    issuer: Option<String>,
    audience: Option<String>,
    required_scopes: Vec<String>,
}

impl JwtVerifier {
    /// Build a verifier from `auth.jwt`
    pub fn from_config(config: &JwtConfig) -> Result<Self> {
        let algorithm = parse_algorithm(&config.algorithm)?;
        let jwks_uri = config.jwks_uri.as_deref().filter(|u| !u.trim().is_empty());

        let keys = match (jwks_uri, &config.signing_key) {
            (Some(_), Some(_)) => {
                return Err(GatewayError::config(
                    "auth.jwt.jwks_uri and auth.jwt.signing_key are mutually exclusive",
                ))
            }
            (Some(_), None) if is_hmac(algorithm) => {
                return Err(GatewayError::config(format!(
                    "JWT algorithm {:?} is symmetric and cannot be used with a JWKS URI",
                    algorithm
                )))
            }
            (Some(uri), None) => KeySource::Jwks(JwksSource::new(
                uri.to_string(),
                Duration::from_secs(config.jwks_cache_seconds),
            )?),
            (None, Some(key)) => KeySource::Static {
                key: decoding_key_from_config(algorithm, key)?,
                algorithm,
            },
            (None, None) => {
                return Err(GatewayError::config(
                    "JWT verification requires auth.jwt.jwks_uri or auth.jwt.signing_key",
                ))
            }
        };

        Ok(Self {
            keys,
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            required_scopes: config.required_scopes.clone(),
        })
    }

    /// Build a verifier for keys published at a JWKS URI, e.g. one learned from discovery
    pub fn with_jwks(
        jwks_uri: String,
        issuer: Option<String>,
        audience: Option<String>,
        cache_ttl: Duration,
    ) -> Result<Self> {
        Ok(Self {
            keys: KeySource::Jwks(JwksSource::new(jwks_uri, cache_ttl)?),
            issuer,
            audience,
            required_scopes: Vec::new(),
        })
    }

    pub fn with_required_scopes(mut self, scopes: Vec<String>) -> Self {
        self.required_scopes = scopes;
        self
    }

    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        if let Some(ref issuer) = self.issuer {
            validation.set_issuer(&[issuer]);
        }
        match self.audience {
            Some(ref audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation
    }

    /// Verify a bearer token and return the caller's claims
    pub async fn verify(&self, token: &str) -> Result<VerifiedClaims> {
        let header = decode_header(token).map_err(|e| {
            warn!("Malformed JWT header: {}", e);
            GatewayError::auth("Invalid JWT token")
        })?;

        let (key, algorithm) = match &self.keys {
            KeySource::Static { key, algorithm } => {
                if header.alg != *algorithm {
                    warn!("JWT algorithm {:?} does not match configured {:?}", header.alg, algorithm);
                    return Err(GatewayError::auth("Invalid JWT token"));
                }
                (key.clone(), *algorithm)
            }
            KeySource::Jwks(source) => {
                if is_hmac(header.alg) {
                    warn!("Rejected symmetric JWT algorithm {:?} for JWKS keys", header.alg);
                    return Err(GatewayError::auth("Invalid JWT token"));
                }
                (source.decoding_key(&header).await?, header.alg)
            }
        };

        let data = decode::<RawClaims>(token, &key, &self.validation(algorithm)).map_err(|e| {
            warn!("JWT validation failed: {}", e);
            match e.kind() {
                ErrorKind::ExpiredSignature => GatewayError::auth("JWT token has expired"),
                ErrorKind::InvalidIssuer => GatewayError::auth("JWT issuer mismatch"),
                ErrorKind::InvalidAudience => GatewayError::auth("JWT audience mismatch"),
                _ => GatewayError::auth("Invalid JWT token"),
            }
        })?;

        let raw = data.claims;
        let subject = raw
            .sub
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| GatewayError::auth("JWT token has no subject"))?;
        let scopes = raw.scopes();

        let claims = VerifiedClaims::new(subject, Secret::new(token.to_string()))
            .with_issuer(raw.iss.clone())
            .with_client_id(raw.client_id.clone().or(raw.azp.clone()))
            .with_scopes(scopes)
            .with_expires_at(raw.exp.and_then(|exp| Utc.timestamp_opt(exp, 0).single()));

        if !claims.has_scopes(&self.required_scopes) {
            warn!(
                subject = %claims.subject,
                "JWT token lacks required scopes {:?}",
                self.required_scopes
            );
            return Err(GatewayError::auth("JWT token lacks required scopes"));
        }

        debug!(subject = %claims.subject, "JWT verified");
        Ok(claims)
    }
}

fn is_hmac(algorithm: Algorithm) -> bool {
    matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

fn decoding_key_from_config(algorithm: Algorithm, key: &Secret<String>) -> Result<DecodingKey> {
    let material = key.expose_secret().as_bytes();
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(DecodingKey::from_secret(material)),
        Algorithm::RS256
        | Algorithm::RS384
        | Algorithm::RS512
        | Algorithm::PS256
        | Algorithm::PS384
        | Algorithm::PS512 => DecodingKey::from_rsa_pem(material)
            .map_err(|e| GatewayError::config(format!("Invalid RSA public key: {}", e))),
        Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(material)
            .map_err(|e| GatewayError::config(format!("Invalid ECDSA public key: {}", e))),
        other => Err(GatewayError::config(format!("Unsupported JWT algorithm: {:?}", other))),
    }
}

/// Parse JWT algorithm from string
fn parse_algorithm(algorithm: &str) -> Result<Algorithm> {
    match algorithm.to_ascii_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        "PS256" => Ok(Algorithm::PS256),
        "PS384" => Ok(Algorithm::PS384),
        "PS512" => Ok(Algorithm::PS512),
        "ES256" => Ok(Algorithm::ES256),
        "ES384" => Ok(Algorithm::ES384),
        _ => Err(GatewayError::config(format!(
            "Unsupported JWT algorithm: '{}'. Supported: HS256, HS384, HS512, RS256, RS384, RS512, PS256, PS384, PS512, ES256, ES384",
            algorithm
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey};
    use serde_json::json;

    const SECRET: &str = "unit-test-signing-secret";

    fn hmac_config() -> JwtConfig {
        JwtConfig {
            algorithm: "HS256".to_string(),
            signing_key: Some(Secret::new(SECRET.to_string())),
            issuer: Some("https://issuer.example.com".to_string()),
            audience: Some("mealie-mcp".to_string()),
            ..JwtConfig::default()
        }
    }

    fn token(claims: serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn valid_claims() -> serde_json::Value {
        json!({
            "sub": "alice",
            "iss": "https://issuer.example.com",
            "aud": "mealie-mcp",
            "exp": Utc::now().timestamp() + 600,
            "scope": "api recipes",
            "azp": "desktop-client",
        })
    }

    #[tokio::test]
    async fn test_valid_token() {
        let verifier = JwtVerifier::from_config(&hmac_config()).unwrap();
        let claims = verifier.verify(&token(valid_claims())).await.unwrap();
        assert_eq!(claims.subject, "alice");
        assert_eq!(claims.client_id.as_deref(), Some("desktop-client"));
        assert_eq!(claims.scopes, vec!["api", "recipes"]);
        assert!(claims.expires_at.is_some());
    }

    #[tokio::test]
    async fn test_wrong_audience_rejected() {
        let verifier = JwtVerifier::from_config(&hmac_config()).unwrap();
        let mut claims = valid_claims();
        claims["aud"] = json!("someone-else");
        let err = verifier.verify(&token(claims)).await.unwrap_err();
        assert!(err.to_string().contains("audience"));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let verifier = JwtVerifier::from_config(&hmac_config()).unwrap();
        let mut claims = valid_claims();
        claims["exp"] = json!(Utc::now().timestamp() - 3600);
        let err = verifier.verify(&token(claims)).await.unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[tokio::test]
    async fn test_required_scopes() {
        let mut config = hmac_config();
        config.required_scopes = vec!["admin".to_string()];
        let verifier = JwtVerifier::from_config(&config).unwrap();
        let err = verifier.verify(&token(valid_claims())).await.unwrap_err();
        assert!(err.to_string().contains("scopes"));
    }

    #[test]
    fn test_hmac_with_jwks_rejected() {
        let mut config = hmac_config();
        config.signing_key = None;
        config.jwks_uri = Some("https://issuer.example.com/jwks".to_string());
        assert!(JwtVerifier::from_config(&config).is_err());
    }

    #[test]
    fn test_key_and_jwks_rejected() {
        let mut config = hmac_config();
        config.jwks_uri = Some("https://issuer.example.com/jwks".to_string());
        assert!(JwtVerifier::from_config(&config).is_err());
    }
}
