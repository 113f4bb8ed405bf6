//! HTTP transport tests: bearer verification, JSON-RPC dispatch and the OAuth proxy endpoints

use actix_web::{http::StatusCode, test, web, App};
use mealie_mcp::config::{AuthModeKind, Config, StaticTokenEntry};
use mealie_mcp::downstream::HttpClientFactory;
use mealie_mcp::mcp::http::configure;
use mealie_mcp::mcp::HttpState;
use mealie_mcp::startup::{bootstrap_with_factory, Runtime};
use secrecy::Secret;
use serde_json::{json, Value};
use std::collections::HashMap;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PUBLIC_URL: &str = "https://mcp.example.com";

async fn runtime(config: Config) -> Runtime {
    let factory = std::sync::Arc::new(HttpClientFactory::new(&config.downstream));
    bootstrap_with_factory(config, factory).await.unwrap()
}

fn state(runtime: &Runtime) -> web::Data<HttpState> {
    web::Data::new(HttpState::new(runtime.server.clone(), runtime.auth.clone(), PUBLIC_URL))
}

fn static_config() -> Config {
    let mut config = Config::default();
    config.downstream.base_url = "https://mealie.example.com".to_string();
    config.server.public_base_url = Some(PUBLIC_URL.to_string());
    config.auth.mode = AuthModeKind::Static;
    config.auth.static_tokens = vec![StaticTokenEntry {
        token: Secret::new("tok-1".to_string()),
        client_id: "laptop".to_string(),
        scopes: Vec::new(),
    }];
    config
}

#[actix_rt::test]
async fn test_missing_bearer_is_challenged() {
    let runtime = runtime(static_config()).await;
    let app = test::init_service(App::new().app_data(state(&runtime)).configure(configure)).await;

    let req = test::TestRequest::post()
        .uri("/mcp")
        .set_json(json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let challenge = resp.headers().get("www-authenticate").unwrap().to_str().unwrap();
    assert_eq!(
        challenge,
        "Bearer resource_metadata=\"https://mcp.example.com/.well-known/oauth-protected-resource\""
    );
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], -31994);
}

#[actix_rt::test]
async fn test_wrong_bearer_is_rejected() {
    let runtime = runtime(static_config()).await;
    let app = test::init_service(App::new().app_data(state(&runtime)).configure(configure)).await;

    let req = test::TestRequest::post()
        .uri("/mcp")
        .insert_header(("Authorization", "Bearer guessed"))
        .set_json(json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
}

#[actix_rt::test]
async fn test_verified_request_is_dispatched() {
    let runtime = runtime(static_config()).await;
    let app = test::init_service(App::new().app_data(state(&runtime)).configure(configure)).await;

    let req = test::TestRequest::post()
        .uri("/mcp")
        .insert_header(("Authorization", "Bearer tok-1"))
        .set_json(json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["id"], 1);
    assert!(!body["result"]["tools"].as_array().unwrap().is_empty());
}

#[actix_rt::test]
async fn test_notification_is_accepted_without_body() {
    let runtime = runtime(static_config()).await;
    let app = test::init_service(App::new().app_data(state(&runtime)).configure(configure)).await;

    let req = test::TestRequest::post()
        .uri("/mcp")
        .insert_header(("Authorization", "Bearer tok-1"))
        .set_json(json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), StatusCode::ACCEPTED);
}

#[actix_rt::test]
async fn test_malformed_body_is_parse_error() {
    let runtime = runtime(static_config()).await;
    let app = test::init_service(App::new().app_data(state(&runtime)).configure(configure)).await;

    let req = test::TestRequest::post()
        .uri("/mcp")
        .insert_header(("Authorization", "Bearer tok-1"))
        .set_payload("{not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["error"]["code"], -32700);
}

#[actix_rt::test]
async fn test_static_mode_has_no_oauth_endpoints() {
    let runtime = runtime(static_config()).await;
    let app = test::init_service(App::new().app_data(state(&runtime)).configure(configure)).await;

    for uri in [
        "/.well-known/oauth-protected-resource",
        "/.well-known/oauth-authorization-server",
        "/oauth/authorize",
    ] {
        let resp = test::call_service(&app, test::TestRequest::get().uri(uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{}", uri);
    }

    let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
}

// RFC 7636 appendix B
const CLIENT_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
const CLIENT_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGKSJ7TN-c";
const CLIENT_REDIRECT: &str = "http://localhost:8765/callback";
const HS_SECRET: &str = "http-transport-secret-at-least-32-bytes";

fn query_of(location: &str) -> HashMap<String, String> {
    url::Url::parse(location).unwrap().query_pairs().into_owned().collect()
}

fn location<B>(resp: &actix_web::dev::ServiceResponse<B>) -> String {
    resp.headers().get("location").unwrap().to_str().unwrap().to_string()
}

fn authorize_uri(client_id: &str, state: &str) -> String {
    format!(
        "/oauth/authorize?response_type=code&client_id={}&redirect_uri={}&state={}&code_challenge={}&code_challenge_method=S256",
        client_id,
        urlencoding::encode(CLIENT_REDIRECT),
        state,
        CLIENT_CHALLENGE
    )
}

fn upstream_jwt(subject: &str) -> String {
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &json!({
            "sub": subject,
            "iss": "https://idp.example.com",
            "aud": "mealie-mcp",
            "exp": chrono::Utc::now().timestamp() + 600,
        }),
        &jsonwebtoken::EncodingKey::from_secret(HS_SECRET.as_bytes()),
    )
    .unwrap()
}

#[actix_rt::test]
async fn test_oidc_proxy_authorization_flow() {
    let idp = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": idp.uri(),
            "authorization_endpoint": format!("{}/authorize", idp.uri()),
            "token_endpoint": format!("{}/token", idp.uri()),
            "jwks_uri": format!("{}/jwks", idp.uri()),
        })))
        .mount(&idp)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("code=upstream-code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "upstream-access",
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&idp)
        .await;

    let mut config = Config::default();
    config.downstream.base_url = "https://mealie.example.com".to_string();
    config.server.public_base_url = Some(PUBLIC_URL.to_string());
    config.auth.mode = AuthModeKind::OidcProxy;
    config.auth.oidc_proxy.discovery_url = Some(format!("{}/.well-known/openid-configuration", idp.uri()));
    config.auth.oidc_proxy.client_id = Some("mcp".to_string());
    config.auth.oidc_proxy.client_secret = Some(Secret::new("s3cret".to_string()));

    let runtime = runtime(config).await;
    let app = test::init_service(App::new().app_data(state(&runtime)).configure(configure)).await;

    // Discovery metadata points clients at the proxy endpoints
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/.well-known/oauth-authorization-server").to_request(),
    )
    .await;
    let metadata: Value = test::read_body_json(resp).await;
    assert_eq!(metadata["issuer"], PUBLIC_URL);
    assert_eq!(metadata["authorization_endpoint"], "https://mcp.example.com/oauth/authorize");
    assert_eq!(metadata["token_endpoint"], "https://mcp.example.com/oauth/token");
    assert_eq!(metadata["registration_endpoint"], "https://mcp.example.com/oauth/register");
    assert_eq!(metadata["code_challenge_methods_supported"], json!(["S256"]));

    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/.well-known/oauth-protected-resource").to_request(),
    )
    .await;
    let resource: Value = test::read_body_json(resp).await;
    assert_eq!(resource["authorization_servers"], json!([PUBLIC_URL]));

    // Client registration
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/oauth/register")
            .set_json(json!({ "redirect_uris": [CLIENT_REDIRECT], "client_name": "desktop" }))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let registration: Value = test::read_body_json(resp).await;
    let client_id = registration["client_id"].as_str().unwrap().to_string();

    // Redirect to the upstream provider with the proxy's own PKCE pair
    let resp = test::call_service(&app, test::TestRequest::get().uri(&authorize_uri(&client_id, "abc")).to_request()).await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    let upstream = location(&resp);
    assert!(upstream.starts_with(&format!("{}/authorize", idp.uri())));
    let upstream_params = query_of(&upstream);
    assert_eq!(upstream_params["client_id"], "mcp");
    assert_eq!(upstream_params["redirect_uri"], "https://mcp.example.com/oauth/callback");
    assert_eq!(upstream_params["code_challenge_method"], "S256");
    assert_ne!(upstream_params["code_challenge"], CLIENT_CHALLENGE);
    let transaction = upstream_params["state"].clone();

    // Unknown state is refused without calling upstream
    let resp = test::call_service(
        &app,
        test::TestRequest::get().uri("/oauth/callback?code=upstream-code&state=other").to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // The upstream callback sends the browser back to the client with a proxy code
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/oauth/callback?code=upstream-code&state={}", transaction))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    let back = location(&resp);
    assert!(back.starts_with(CLIENT_REDIRECT));
    let back_params = query_of(&back);
    assert_eq!(back_params["state"], "abc");
    let code = back_params["code"].clone();
    assert_ne!(code, "upstream-code");

    // A wrong verifier fails and burns the code
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/oauth/token")
            .set_form([
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", CLIENT_REDIRECT),
                ("client_id", client_id.as_str()),
                ("code_verifier", "x".repeat(43).as_str()),
            ])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let error: Value = test::read_body_json(resp).await;
    assert_eq!(error["error"], "invalid_grant");

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/oauth/token")
            .set_form([
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", CLIENT_REDIRECT),
                ("client_id", client_id.as_str()),
                ("code_verifier", CLIENT_VERIFIER),
            ])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_oidc_proxy_relays_upstream_tokens() {
    let idp = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": idp.uri(),
            "authorization_endpoint": format!("{}/authorize", idp.uri()),
            "token_endpoint": format!("{}/token", idp.uri()),
            "jwks_uri": format!("{}/jwks", idp.uri()),
        })))
        .mount(&idp)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "upstream-access",
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&idp)
        .await;

    let mut config = Config::default();
    config.downstream.base_url = "https://mealie.example.com".to_string();
    config.server.public_base_url = Some(PUBLIC_URL.to_string());
    config.auth.mode = AuthModeKind::OidcProxy;
    config.auth.oidc_proxy.discovery_url = Some(format!("{}/.well-known/openid-configuration", idp.uri()));
    config.auth.oidc_proxy.client_id = Some("mcp".to_string());
    config.auth.oidc_proxy.client_secret = Some(Secret::new("s3cret".to_string()));

    let runtime = runtime(config).await;
    let app = test::init_service(App::new().app_data(state(&runtime)).configure(configure)).await;

    let registration: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/oauth/register")
            .set_json(json!({ "redirect_uris": [CLIENT_REDIRECT] }))
            .to_request(),
    )
    .await;
    let client_id = registration["client_id"].as_str().unwrap().to_string();

    let resp = test::call_service(&app, test::TestRequest::get().uri(&authorize_uri(&client_id, "xyz")).to_request()).await;
    let transaction = query_of(&location(&resp))["state"].clone();
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/oauth/callback?code=upstream-code&state={}", transaction))
            .to_request(),
    )
    .await;
    let code = query_of(&location(&resp))["code"].clone();

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/oauth/token")
            .set_form([
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", CLIENT_REDIRECT),
                ("client_id", client_id.as_str()),
                ("code_verifier", CLIENT_VERIFIER),
            ])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("cache-control").unwrap(), "no-store");
    let tokens: Value = test::read_body_json(resp).await;
    assert_eq!(tokens["access_token"], "upstream-access");

    // Codes are single use
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/oauth/token")
            .set_form([
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("code_verifier", CLIENT_VERIFIER),
            ])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_rt::test]
async fn test_upstream_denial_is_returned_to_client() {
    let idp = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&idp)
        .await;

    let runtime = runtime(oauth_proxy_config(&idp)).await;
    let app = test::init_service(App::new().app_data(state(&runtime)).configure(configure)).await;

    let registration: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/oauth/register")
            .set_json(json!({ "redirect_uris": [CLIENT_REDIRECT] }))
            .to_request(),
    )
    .await;
    let client_id = registration["client_id"].as_str().unwrap().to_string();

    // Unregistered redirect URIs are refused
    let bad = authorize_uri(&client_id, "s").replace("localhost%3A8765", "localhost%3A9999");
    let resp = test::call_service(&app, test::TestRequest::get().uri(&bad).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = test::call_service(&app, test::TestRequest::get().uri(&authorize_uri(&client_id, "s1")).to_request()).await;
    let transaction = query_of(&location(&resp))["state"].clone();

    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/oauth/callback?error=access_denied&state={}", transaction))
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FOUND);
    let back = query_of(&location(&resp));
    assert_eq!(back["error"], "access_denied");
    assert_eq!(back["state"], "s1");
}

fn oauth_proxy_config(idp: &MockServer) -> Config {
    let mut config = Config::default();
    config.downstream.base_url = "https://mealie.example.com".to_string();
    config.server.public_base_url = Some(PUBLIC_URL.to_string());
    config.auth.mode = AuthModeKind::OAuthProxy;
    config.auth.oauth_proxy.authorization_endpoint = Some(format!("{}/authorize", idp.uri()));
    config.auth.oauth_proxy.token_endpoint = Some(format!("{}/token", idp.uri()));
    config.auth.oauth_proxy.client_id = Some("mcp".to_string());
    config.auth.oauth_proxy.client_secret = Some(Secret::new("s3cret".to_string()));
    config.auth.jwt.algorithm = "HS256".to_string();
    config.auth.jwt.signing_key = Some(Secret::new(HS_SECRET.to_string()));
    config.auth.jwt.issuer = Some("https://idp.example.com".to_string());
    config.auth.jwt.audience = Some("mealie-mcp".to_string());
    config
}

#[actix_rt::test]
async fn test_oauth_proxy_issues_and_verifies_its_own_tokens() {
    let idp = MockServer::start().await;
    let first = upstream_jwt("alice");
    let second = upstream_jwt("alice");
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": first,
            "token_type": "Bearer",
            "expires_in": 600,
            "refresh_token": "upstream-refresh",
        })))
        .expect(1)
        .mount(&idp)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=upstream-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": second,
            "token_type": "Bearer",
            "expires_in": 600,
        })))
        .expect(1)
        .mount(&idp)
        .await;

    let runtime = runtime(oauth_proxy_config(&idp)).await;
    let app = test::init_service(App::new().app_data(state(&runtime)).configure(configure)).await;

    let registration: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/oauth/register")
            .set_json(json!({ "redirect_uris": [CLIENT_REDIRECT] }))
            .to_request(),
    )
    .await;
    let client_id = registration["client_id"].as_str().unwrap().to_string();

    let resp = test::call_service(&app, test::TestRequest::get().uri(&authorize_uri(&client_id, "st")).to_request()).await;
    let transaction = query_of(&location(&resp))["state"].clone();
    let resp = test::call_service(
        &app,
        test::TestRequest::get()
            .uri(&format!("/oauth/callback?code=upstream-code&state={}", transaction))
            .to_request(),
    )
    .await;
    let code = query_of(&location(&resp))["code"].clone();

    let tokens: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/oauth/token")
            .set_form([
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", CLIENT_REDIRECT),
                ("client_id", client_id.as_str()),
                ("code_verifier", CLIENT_VERIFIER),
            ])
            .to_request(),
    )
    .await;
    let access = tokens["access_token"].as_str().unwrap().to_string();
    let refresh = tokens["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(access, first);
    assert_ne!(refresh, "upstream-refresh");
    assert_eq!(tokens["expires_in"], 600);

    let list = json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" });

    // The proxy's token is accepted
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/mcp")
            .insert_header(("Authorization", format!("Bearer {}", access)))
            .set_json(list.clone())
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    // The raw upstream token is not
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/mcp")
            .insert_header(("Authorization", format!("Bearer {}", first)))
            .set_json(list.clone())
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // Refresh goes upstream with the stored upstream refresh token
    let refreshed: Value = test::call_and_read_body_json(
        &app,
        test::TestRequest::post()
            .uri("/oauth/token")
            .set_form([("grant_type", "refresh_token"), ("refresh_token", refresh.as_str())])
            .to_request(),
    )
    .await;
    let renewed = refreshed["access_token"].as_str().unwrap().to_string();
    assert_ne!(renewed, access);

    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/mcp")
            .insert_header(("Authorization", format!("Bearer {}", renewed)))
            .set_json(list)
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::OK);

    // Refresh tokens rotate
    let resp = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/oauth/token")
            .set_form([("grant_type", "refresh_token"), ("refresh_token", refresh.as_str())])
            .to_request(),
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
