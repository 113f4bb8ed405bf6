//! Configuration loading: YAML files, environment variables and CLI overrides

use mealie_mcp::config::{AuthModeKind, Config, ConfigOverrides, LogFormat, TransportKind};
use mealie_mcp::GatewayError;
use secrecy::ExposeSecret;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(yaml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

#[test]
fn test_full_file_parses() {
    let file = write_config(
        r#"
server:
  transport: http
  host: 0.0.0.0
  port: 8080
  public_base_url: https://mcp.example.com/
downstream:
  base_url: https://mealie.example.com
  token: file-token
  verify_tls: false
  pool_clients: true
auth:
  mode: oidc-proxy
  oidc_proxy:
    discovery_url: https://idp.example.com/.well-known/openid-configuration
    client_id: mcp
    client_secret: s3cret
delegation:
  enabled: true
  audience: mealie
  scopes: [recipes.read, recipes.write]
  cache_tokens: true
rate_limit:
  requests_per_second: 5
  burst: 10
  per_caller: true
confirmation:
  require_confirmation: true
  timeout_seconds: 60
policy:
  endpoint: http://opa:8181/v1/data/mealie/allow
logging:
  level: debug
  format: json
"#,
    );

    let config = Config::from_file(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.server.transport, TransportKind::Http);
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.public_base_url(), "https://mcp.example.com");
    assert_eq!(config.downstream.token.as_ref().unwrap().expose_secret(), "file-token");
    assert!(!config.downstream.verify_tls);
    assert!(config.downstream.pool_clients);
    assert_eq!(config.auth.mode, AuthModeKind::OidcProxy);
    assert_eq!(config.delegation.scope_string(), "recipes.read recipes.write");
    assert!(config.delegation.cache_tokens);
    assert!(config.delegation.token_endpoint.is_none());
    assert_eq!(config.rate_limit.burst, 10);
    assert!(config.confirmation.require_confirmation);
    assert_eq!(config.logging.format, LogFormat::Json);
}

#[test]
fn test_defaults_for_minimal_file() {
    let file = write_config("downstream:\n  base_url: https://mealie.example.com\n");
    let config = Config::from_file(file.path()).unwrap();

    assert_eq!(config.server.transport, TransportKind::Stdio);
    assert_eq!(config.auth.mode, AuthModeKind::None);
    assert!(!config.delegation.enabled);
    assert!(!config.delegation.cache_tokens);
    assert_eq!(config.rate_limit.requests_per_second, 10);
    assert_eq!(config.rate_limit.burst, 20);
    assert!(!config.confirmation.require_confirmation);
    assert!(!config.error_handling.include_detail);
    assert!(config.downstream.verify_tls);
    assert_eq!(config.logging.format, LogFormat::Text);
    assert_eq!(config.public_base_url(), "http://127.0.0.1:3001");
}

#[test]
fn test_missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::from_file(dir.path().join("absent.yaml")).unwrap();
    assert!(config.downstream.base_url.is_empty());
}

#[test]
fn test_malformed_file_is_config_error() {
    let file = write_config("server: [not, a, map");
    assert!(matches!(Config::from_file(file.path()), Err(GatewayError::Config { .. })));
}

#[test]
fn test_unknown_auth_mode_rejected() {
    let file = write_config("auth:\n  mode: kerberos\n");
    assert!(Config::from_file(file.path()).is_err());
}

#[test]
fn test_validation_requires_base_url() {
    let config = Config::default();
    match config.validate() {
        Err(GatewayError::Config { message }) => assert!(message.contains("MEALIE_BASE_URL")),
        other => panic!("expected configuration error, got {:?}", other),
    }
}

#[test]
fn test_delegation_validation_lists_missing_settings() {
    let mut config = Config::default();
    config.downstream.base_url = "https://mealie.example.com".to_string();
    config.delegation.enabled = true;

    match config.validate() {
        Err(GatewayError::Config { message }) => {
            assert!(message.contains("delegation.audience"));
            assert!(message.contains("OIDC discovery URL"));
            assert!(message.contains("OIDC client secret"));
        }
        other => panic!("expected configuration error, got {:?}", other),
    }
}

#[test]
fn test_cli_overrides_win() {
    let file = write_config(
        "server:\n  transport: http\n  port: 8080\ndownstream:\n  base_url: https://mealie.example.com\n",
    );
    let mut config = Config::from_file(file.path()).unwrap();
    config.apply_overrides(ConfigOverrides {
        transport: Some(TransportKind::Stdio),
        port: Some(9090),
        auth_mode: Some(AuthModeKind::Static),
        scopes: Some(vec!["a".to_string(), "b".to_string()]),
        require_confirmation: Some(true),
        ..Default::default()
    });

    assert_eq!(config.server.transport, TransportKind::Stdio);
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.auth.mode, AuthModeKind::Static);
    assert_eq!(config.delegation.scope_string(), "a b");
    assert!(config.confirmation.require_confirmation);
}

/// The only test in this binary that touches process environment variables
#[test]
fn test_environment_layer() {
    let file = write_config(
        "downstream:\n  base_url: https://file.example.com\n  token: file-token\nserver:\n  port: 8080\n",
    );

    std::env::set_var("MEALIE_BASE_URL", "https://env.example.com");
    std::env::set_var("MEALIE_API_TOKEN", "env-token");
    std::env::set_var("MEALIE_MCP_AUTH", "static");
    std::env::set_var("MEALIE_MCP_STATIC_TOKENS", "tok-1:laptop:read write;tok-2:phone");
    std::env::set_var("MEALIE_MCP_SCOPES", "recipes.read, recipes.write");

    let loaded = Config::load(
        file.path(),
        ConfigOverrides {
            port: Some(9191),
            ..Default::default()
        },
    );

    std::env::set_var("MEALIE_MCP_PORT", "not-a-port");
    let bad_port = Config::load(file.path(), ConfigOverrides::default());

    for name in [
        "MEALIE_BASE_URL",
        "MEALIE_API_TOKEN",
        "MEALIE_MCP_AUTH",
        "MEALIE_MCP_STATIC_TOKENS",
        "MEALIE_MCP_SCOPES",
        "MEALIE_MCP_PORT",
    ] {
        std::env::remove_var(name);
    }

    let config = loaded.unwrap();
    assert_eq!(config.downstream.base_url, "https://env.example.com");
    assert_eq!(config.downstream.token.as_ref().unwrap().expose_secret(), "env-token");
    assert_eq!(config.auth.mode, AuthModeKind::Static);
    assert_eq!(config.auth.static_tokens.len(), 2);
    assert_eq!(config.auth.static_tokens[0].client_id, "laptop");
    assert_eq!(config.auth.static_tokens[0].scopes, vec!["read", "write"]);
    assert!(config.auth.static_tokens[1].scopes.is_empty());
    assert_eq!(config.delegation.scopes, vec!["recipes.read", "recipes.write"]);
    assert_eq!(config.server.port, 9191);

    match bad_port {
        Err(GatewayError::Config { message }) => assert!(message.contains("MEALIE_MCP_PORT")),
        other => panic!("expected configuration error, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_secrets_are_redacted_when_serialized() {
    let file = write_config(
        "downstream:\n  base_url: https://mealie.example.com\n  token: very-secret\nauth:\n  static_tokens:\n    - token: also-secret\n      client_id: laptop\n",
    );
    let config = Config::from_file(file.path()).unwrap();
    let rendered = serde_yaml::to_string(&config).unwrap();

    assert!(!rendered.contains("very-secret"));
    assert!(!rendered.contains("also-secret"));
    assert!(rendered.contains("[REDACTED]"));
}
