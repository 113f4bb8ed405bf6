//! Construction of per-call recipe API clients

use crate::config::DownstreamConfig;
use crate::downstream::{DownstreamApi, MealieClient, ResolvedCredential};
use crate::error::{GatewayError, Result};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Builds a downstream client for one call
pub trait DownstreamFactory: Send + Sync {
    fn create(&self, credential: &ResolvedCredential) -> Result<Arc<dyn DownstreamApi>>;
}

/// Factory producing [`MealieClient`]s.
///
/// Without pooling every call gets a fresh HTTP client. With pooling, HTTP
/// clients are shared per `(base_url, verify_tls)`; the token is always
/// attached per request and never stored with a pooled client.
pub struct HttpClientFactory {
    timeout: Duration,
    pool: Option<DashMap<(String, bool), reqwest::Client>>,
}

impl HttpClientFactory {
    pub fn new(config: &DownstreamConfig) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_seconds),
            pool: config.pool_clients.then(DashMap::new),
        }
    }

    fn build_http(&self, verify_tls: bool) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(|e| GatewayError::connection(format!("Failed to build HTTP client: {}", e)))
    }

    fn http_for(&self, credential: &ResolvedCredential) -> Result<reqwest::Client> {
        let Some(pool) = &self.pool else {
            return self.build_http(credential.verify_tls);
        };

        let key = (credential.base_url.clone(), credential.verify_tls);
        if let Some(client) = pool.get(&key) {
            return Ok(client.clone());
        }
        let client = self.build_http(credential.verify_tls)?;
        debug!(base_url = %credential.base_url, verify_tls = credential.verify_tls, "Pooling new HTTP client");
        Ok(pool.entry(key).or_insert(client).clone())
    }

    pub fn pooled_clients(&self) -> usize {
        self.pool.as_ref().map_or(0, |p| p.len())
    }
}

impl DownstreamFactory for HttpClientFactory {
    fn create(&self, credential: &ResolvedCredential) -> Result<Arc<dyn DownstreamApi>> {
        let http = self.http_for(credential)?;
        let client = MealieClient::new(&credential.base_url, credential.token.clone(), http)?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn credential(base_url: &str, token: &str) -> ResolvedCredential {
        ResolvedCredential {
            base_url: base_url.to_string(),
            token: Some(Secret::new(token.to_string())),
            verify_tls: true,
        }
    }

    #[test]
    fn test_pool_keyed_by_base_url_not_token() {
        let factory = HttpClientFactory::new(&DownstreamConfig {
            pool_clients: true,
            ..DownstreamConfig::default()
        });
        factory.create(&credential("https://a.example.com", "t1")).unwrap();
        factory.create(&credential("https://a.example.com", "t2")).unwrap();
        factory.create(&credential("https://b.example.com", "t1")).unwrap();
        assert_eq!(factory.pooled_clients(), 2);
    }

    #[test]
    fn test_unpooled_by_default() {
        let factory = HttpClientFactory::new(&DownstreamConfig::default());
        factory.create(&credential("https://a.example.com", "t1")).unwrap();
        assert_eq!(factory.pooled_clients(), 0);
    }

    #[test]
    fn test_invalid_base_url() {
        let factory = HttpClientFactory::new(&DownstreamConfig::default());
        assert!(factory.create(&credential("not a url", "t")).is_err());
    }
}
