//! HTTP client for the recipe API

use crate::downstream::{DownstreamApi, HttpMethod};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, Secret};
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

/// Recipe API client bound to one base URL and token
pub struct MealieClient {
    base_url: Url,
    token: Option<Secret<String>>,
    http: reqwest::Client,
}

impl MealieClient {
    pub fn new(base_url: &str, token: Option<Secret<String>>, http: reqwest::Client) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            GatewayError::validation(format!("Invalid recipe API base URL '{}': {}", base_url, e))
        })?;
        Ok(Self { base_url, token, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve `path` against the base URL (RFC 3986 reference resolution)
    fn url_for(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| GatewayError::validation(format!("Invalid API path '{}': {}", path, e)))
    }
}

/// Normalize a successful response body: 204 and non-JSON bodies become status objects
fn normalize_success(status: StatusCode, text: String) -> Value {
    if status == StatusCode::NO_CONTENT {
        return json!({ "status": "success" });
    }
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => value,
        Err(_) => json!({ "status": "success", "text": text }),
    }
}

#[async_trait]
impl DownstreamApi for MealieClient {
    async fn invoke(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = self.url_for(path)?;
        debug!(method = %method, url = %url, "Calling recipe API");

        let mut request = self.http.request(method.to_reqwest(), url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            warn!(method = %method, path = %path, "Recipe API request failed: {}", e);
            if e.is_timeout() {
                GatewayError::downstream_unreachable(format!("request to {} timed out", path))
            } else {
                GatewayError::downstream_unreachable(e.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::downstream_unreachable(format!("failed to read response: {}", e)))?;

        if status.as_u16() >= 400 {
            warn!(method = %method, path = %path, status = status.as_u16(), "Recipe API returned an error");
            return Err(GatewayError::downstream(status.as_u16(), text));
        }

        Ok(normalize_success(status, text))
    }
}
