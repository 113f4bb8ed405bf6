//! Static bearer token table

use crate::auth::{fingerprint, VerifiedClaims};
use crate::config::StaticTokenEntry;
use crate::error::{GatewayError, Result};
use secrecy::{ExposeSecret, Secret};
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
struct StaticIdentity {
    client_id: String,
    scopes: Vec<String>,
}

/// Verifies bearer tokens against a fixed table. Tokens are stored as fingerprints.
#[derive(Debug, Clone)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, StaticIdentity>,
}

impl StaticTokenVerifier {
    pub fn new(entries: &[StaticTokenEntry]) -> Result<Self> {
        if entries.is_empty() {
            return Err(GatewayError::config(
                "Auth mode 'static' requires at least one entry in auth.static_tokens",
            ));
        }

        let mut tokens = HashMap::with_capacity(entries.len());
        for entry in entries {
            let token = entry.token.expose_secret();
            if token.is_empty() {
                return Err(GatewayError::config(format!(
                    "Static token for client '{}' is empty",
                    entry.client_id
                )));
            }
            let previous = tokens.insert(
                fingerprint(token),
                StaticIdentity {
                    client_id: entry.client_id.clone(),
                    scopes: entry.scopes.clone(),
                },
            );
            if previous.is_some() {
                return Err(GatewayError::config(format!(
                    "Duplicate static token configured (client '{}')",
                    entry.client_id
                )));
            }
        }

        Ok(Self { tokens })
    }

    pub fn verify(&self, token: &str) -> Result<VerifiedClaims> {
        match self.tokens.get(&fingerprint(token)) {
            Some(identity) => {
                debug!(client_id = %identity.client_id, "Static token accepted");
                Ok(VerifiedClaims::new(identity.client_id.clone(), Secret::new(token.to_string()))
                    .with_client_id(Some(identity.client_id.clone()))
                    .with_scopes(identity.scopes.clone()))
            }
            None => {
                warn!("Rejected unknown static token");
                Err(GatewayError::auth("Unknown bearer token"))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(token: &str, client: &str) -> StaticTokenEntry {
        StaticTokenEntry {
            token: Secret::new(token.to_string()),
            client_id: client.to_string(),
            scopes: vec!["api".to_string()],
        }
    }

    #[test]
    fn test_known_token_accepted() {
        let verifier = StaticTokenVerifier::new(&[entry("abc", "alice")]).unwrap();
        let claims = verifier.verify("abc").unwrap();
        assert_eq!(claims.subject, "alice");
        assert_eq!(claims.client_id.as_deref(), Some("alice"));
        assert_eq!(claims.scopes, vec!["api"]);
    }

    #[test]
    fn test_unknown_token_rejected() {
        let verifier = StaticTokenVerifier::new(&[entry("abc", "alice")]).unwrap();
        assert!(matches!(verifier.verify("abd"), Err(GatewayError::Auth { .. })));
    }

    #[test]
    fn test_empty_table_rejected() {
        assert!(StaticTokenVerifier::new(&[]).is_err());
    }

    #[test]
    fn test_duplicate_token_rejected() {
        assert!(StaticTokenVerifier::new(&[entry("abc", "a"), entry("abc", "b")]).is_err());
    }
}
