//! Auth mode selection and OIDC discovery integration tests

use mealie_mcp::auth::{discover, AuthMode};
use mealie_mcp::config::{AuthModeKind, Config, StaticTokenEntry};
use mealie_mcp::GatewayError;
use secrecy::Secret;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

fn base_config() -> Config {
    let mut config = Config::default();
    config.downstream.base_url = "https://mealie.example.com".to_string();
    config
}

fn oidc_config(discovery_url: &str) -> Config {
    let mut config = base_config();
    config.auth.mode = AuthModeKind::OidcProxy;
    config.server.public_base_url = Some("https://mcp.example.com".to_string());
    config.auth.oidc_proxy.discovery_url = Some(discovery_url.to_string());
    config.auth.oidc_proxy.client_id = Some("mcp".to_string());
    config.auth.oidc_proxy.client_secret = Some(Secret::new("s3cret".to_string()));
    config
}

async fn mock_provider(document: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(document))
        .mount(&server)
        .await;
    server
}

fn provider_document(server_uri: &str) -> serde_json::Value {
    json!({
        "issuer": server_uri,
        "authorization_endpoint": format!("{}/authorize", server_uri),
        "token_endpoint": format!("{}/token", server_uri),
        "jwks_uri": format!("{}/jwks", server_uri),
        "grant_types_supported": ["authorization_code", "urn:ietf:params:oauth:grant-type:token-exchange"],
    })
}

fn assert_config_error<T>(result: Result<T, GatewayError>, needle: &str) {
    match result {
        Err(GatewayError::Config { message }) => {
            assert!(message.contains(needle), "'{}' does not mention '{}'", message, needle)
        }
        Err(other) => panic!("expected configuration error, got {:?}", other),
        Ok(_) => panic!("expected configuration error"),
    }
}

#[tokio::test]
async fn test_none_mode_is_anonymous() {
    let auth = AuthMode::select(&base_config()).await.unwrap();
    assert_eq!(auth.kind(), AuthModeKind::None);
    assert!(auth.verify(None).await.unwrap().is_none());
    assert!(auth.protected_resource_metadata("https://mcp.example.com").is_none());
}

#[tokio::test]
async fn test_static_mode_verifies_table_tokens() {
    let mut config = base_config();
    config.auth.mode = AuthModeKind::Static;
    config.auth.static_tokens = vec![StaticTokenEntry {
        token: Secret::new("tok-1".to_string()),
        client_id: "alice-laptop".to_string(),
        scopes: vec!["read".to_string()],
    }];

    let auth = AuthMode::select(&config).await.unwrap();
    let claims = auth.verify(Some("tok-1")).await.unwrap().unwrap();
    assert_eq!(claims.subject, "alice-laptop");
    assert_eq!(claims.scopes, vec!["read".to_string()]);

    assert!(matches!(auth.verify(Some("nope")).await, Err(GatewayError::Auth { .. })));
    assert!(matches!(auth.verify(None).await, Err(GatewayError::Auth { .. })));
}

#[tokio::test]
async fn test_static_mode_without_tokens_fails() {
    let mut config = base_config();
    config.auth.mode = AuthModeKind::Static;
    assert_config_error(AuthMode::select(&config).await, "auth.static_tokens");
}

#[tokio::test]
async fn test_jwt_mode_reports_all_missing_fields() {
    let mut config = base_config();
    config.auth.mode = AuthModeKind::Jwt;

    let result = AuthMode::select(&config).await;
    assert_config_error(result, "auth.jwt.issuer");
    let result = AuthMode::select(&config).await;
    assert_config_error(result, "auth.jwt.audience");
}

#[tokio::test]
async fn test_delegation_requires_oidc_proxy() {
    let mut config = base_config();
    config.auth.mode = AuthModeKind::Static;
    config.delegation.enabled = true;

    assert_config_error(AuthMode::select(&config).await, "oidc-proxy");
}

#[tokio::test]
async fn test_oidc_proxy_missing_settings_checked_before_network() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = oidc_config(&format!("{}{}", server.uri(), DISCOVERY_PATH));
    config.auth.oidc_proxy.client_id = None;
    config.server.public_base_url = None;

    let result = AuthMode::select(&config).await;
    assert_config_error(result, "auth.oidc_proxy.client_id");
    let result = AuthMode::select(&config).await;
    assert_config_error(result, "server.public_base_url");
}

#[tokio::test]
async fn test_oidc_proxy_selects_with_discovery() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(provider_document(&server.uri())))
        .expect(1)
        .mount(&server)
        .await;

    let discovery_url = format!("{}{}", server.uri(), DISCOVERY_PATH);
    let auth = AuthMode::select(&oidc_config(&discovery_url)).await.unwrap();

    assert_eq!(auth.kind(), AuthModeKind::OidcProxy);
    let (url, provider) = auth.provider_metadata().unwrap();
    assert_eq!(url, discovery_url);
    assert_eq!(provider.token_endpoint, format!("{}/token", server.uri()));
    assert!(auth.oauth_proxy().is_some());

    let resource = auth.protected_resource_metadata("https://mcp.example.com").unwrap();
    let resource = serde_json::to_value(resource).unwrap();
    assert_eq!(resource["resource"], "https://mcp.example.com");
}

#[tokio::test]
async fn test_oidc_proxy_discovery_failure_is_fatal() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = oidc_config(&format!("{}{}", server.uri(), DISCOVERY_PATH));
    assert_config_error(AuthMode::select(&config).await, "HTTP 503");
}

#[tokio::test]
async fn test_discovery_requires_token_endpoint() {
    let server = mock_provider(json!({
        "issuer": "https://idp.example.com",
        "authorization_endpoint": "https://idp.example.com/authorize",
    }))
    .await;

    let result = discover(&format!("{}{}", server.uri(), DISCOVERY_PATH), Duration::from_secs(5)).await;
    assert_config_error(result, "token_endpoint");
}

#[tokio::test]
async fn test_discovery_rejects_malformed_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let result = discover(&format!("{}{}", server.uri(), DISCOVERY_PATH), Duration::from_secs(5)).await;
    assert_config_error(result, "not valid JSON");
}

#[tokio::test]
async fn test_discovery_unreachable_provider() {
    let result = discover("http://127.0.0.1:9/.well-known/openid-configuration", Duration::from_secs(2)).await;
    assert_config_error(result, "failed");
}
