//! Verified caller identity

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, Secret};
use serde_json::{json, Value};

/// Identity of a caller whose bearer token passed verification.
///
/// The raw token is kept only so it can be passed through or exchanged
/// downstream; it is never logged or serialized.
#[derive(Debug, Clone)]
pub struct VerifiedClaims {
    pub subject: String,
    pub issuer: Option<String>,
    pub client_id: Option<String>,
    pub scopes: Vec<String>,
    pub expires_at: Option<DateTime<Utc>>,
    token: Secret<String>,
}

impl VerifiedClaims {
    pub fn new<S: Into<String>>(subject: S, token: Secret<String>) -> Self {
        Self {
            subject: subject.into(),
            issuer: None,
            client_id: None,
            scopes: Vec::new(),
            expires_at: None,
            token,
        }
    }

    pub fn with_issuer(mut self, issuer: Option<String>) -> Self {
        self.issuer = issuer;
        self
    }

    pub fn with_client_id(mut self, client_id: Option<String>) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_expires_at(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Replace the token with the one the caller actually presented
    pub fn with_token(mut self, token: Secret<String>) -> Self {
        self.token = token;
        self
    }

    /// Raw bearer token presented by the caller
    pub fn token(&self) -> &Secret<String> {
        &self.token
    }

    /// Whether every required scope is granted
    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }

    /// Loggable and policy-safe view of the claims, without the token
    pub fn to_public_json(&self) -> Value {
        json!({
            "sub": self.subject,
            "iss": self.issuer,
            "client_id": self.client_id,
            "scopes": self.scopes,
            "exp": self.expires_at.map(|exp| exp.timestamp()),
        })
    }

    /// SHA-256 fingerprint of the raw token, safe to use as a cache key
    pub fn token_fingerprint(&self) -> String {
        crate::auth::fingerprint(self.token.expose_secret())
    }
}
