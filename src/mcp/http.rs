//! MCP over HTTP (actix-web)
//!
//! Requests are stateless: every POST to `/mcp` is verified on its own and
//! runs without an elicitation channel.

use crate::auth::{bearer_challenge, AuthMode, AuthorizationRequest, OAuthError, RegistrationRequest, TokenRequest};
use crate::error::{GatewayError, Result};
use crate::mcp::errors::McpError;
use crate::mcp::server::{McpServer, Session};
use crate::mcp::types::{McpRequest, McpResponse};
use actix_web::http::header;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared state of the HTTP transport
#[derive(Clone)]
pub struct HttpState {
    pub server: Arc<McpServer>,
    pub auth: Arc<AuthMode>,
    pub public_base_url: String,
}

impl HttpState {
    pub fn new(server: Arc<McpServer>, auth: Arc<AuthMode>, public_base_url: &str) -> Self {
        Self {
            server,
            auth,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Register the transport's routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/mcp", web::post().to(mcp_handler))
        .route(
            "/.well-known/oauth-protected-resource",
            web::get().to(protected_resource_metadata_handler),
        )
        .route(
            "/.well-known/oauth-authorization-server",
            web::get().to(authorization_server_metadata_handler),
        )
        .route("/oauth/register", web::post().to(oauth_register_handler))
        .route("/oauth/authorize", web::get().to(oauth_authorize_handler))
        .route("/oauth/callback", web::get().to(oauth_callback_handler))
        .route("/oauth/token", web::post().to(oauth_token_handler));
}

/// Run the HTTP transport until shutdown
pub async fn serve_http(state: HttpState, host: &str, port: u16) -> Result<()> {
    info!("Serving MCP over HTTP on {}:{}", host, port);
    let data = web::Data::new(state);
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(Logger::default())
            .configure(configure)
    })
    .bind((host, port))?
    .run()
    .await?;
    debug!("HTTP transport stopped");
    Ok(())
}

pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": crate::mcp::server::SERVER_NAME,
        "version": crate::VERSION,
    }))
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

fn unauthorized(state: &HttpState, error: &GatewayError) -> HttpResponse {
    HttpResponse::Unauthorized()
        .insert_header((header::WWW_AUTHENTICATE, bearer_challenge(&state.public_base_url)))
        .json(json!({
            "jsonrpc": "2.0",
            "id": Value::Null,
            "error": McpError::from(error),
        }))
}

pub async fn mcp_handler(req: HttpRequest, body: web::Bytes, state: web::Data<HttpState>) -> HttpResponse {
    let caller = match state.auth.verify(bearer_token(&req)).await {
        Ok(caller) => caller,
        Err(e) => {
            warn!(kind = e.category(), "Rejected MCP request: {}", e);
            return unauthorized(&state, &e);
        }
    };

    let request: McpRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return HttpResponse::BadRequest().json(McpResponse::error(
                Value::Null,
                McpError::parse_error(e.to_string()),
            ))
        }
    };

    let session = Session::without_elicitation(caller);
    match state.server.handle_request(request, &session).await {
        Some(response) => HttpResponse::Ok().json(response),
        None => HttpResponse::Accepted().finish(),
    }
}

pub async fn protected_resource_metadata_handler(state: web::Data<HttpState>) -> HttpResponse {
    match state.auth.protected_resource_metadata(&state.public_base_url) {
        Some(metadata) => HttpResponse::Ok().json(metadata),
        None => HttpResponse::NotFound().finish(),
    }
}

pub async fn authorization_server_metadata_handler(state: web::Data<HttpState>) -> HttpResponse {
    match state.auth.authorization_server_metadata(&state.public_base_url) {
        Some(metadata) => HttpResponse::Ok().json(metadata),
        None => HttpResponse::NotFound().finish(),
    }
}

fn oauth_error(error: &OAuthError) -> HttpResponse {
    let mut response = match error.error {
        "invalid_client" => HttpResponse::Unauthorized(),
        "server_error" => HttpResponse::InternalServerError(),
        _ => HttpResponse::BadRequest(),
    };
    response
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .json(error)
}

fn redirect(location: String) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

pub async fn oauth_register_handler(
    body: web::Json<RegistrationRequest>,
    state: web::Data<HttpState>,
) -> HttpResponse {
    let Some(proxy) = state.auth.oauth_proxy() else {
        return HttpResponse::NotFound().finish();
    };
    match proxy.register(body.into_inner()) {
        Ok(registration) => HttpResponse::Created().json(registration),
        Err(e) => oauth_error(&e),
    }
}

pub async fn oauth_authorize_handler(
    query: web::Query<AuthorizationRequest>,
    state: web::Data<HttpState>,
) -> HttpResponse {
    let Some(proxy) = state.auth.oauth_proxy() else {
        return HttpResponse::NotFound().finish();
    };
    match proxy.authorize(&query) {
        Ok(url) => redirect(url),
        Err(e) => {
            warn!(error = e.error, "Rejected authorization request: {}", e.error_description);
            oauth_error(&e)
        }
    }
}

pub async fn oauth_callback_handler(
    query: web::Query<CallbackQuery>,
    state: web::Data<HttpState>,
) -> HttpResponse {
    let Some(proxy) = state.auth.oauth_proxy() else {
        return HttpResponse::NotFound().finish();
    };
    let Some(transaction) = query.state.as_deref() else {
        return oauth_error(&OAuthError::invalid_request("state is required"));
    };

    let result = match (&query.error, query.code.as_deref()) {
        (Some(error), _) => proxy.fail(transaction, error, query.error_description.as_deref()),
        (None, Some(code)) => proxy.complete(code, transaction).await,
        (None, None) => Err(OAuthError::invalid_request("code is required")),
    };
    match result {
        Ok(location) => redirect(location),
        Err(e) => oauth_error(&e),
    }
}

pub async fn oauth_token_handler(form: web::Form<TokenRequest>, state: web::Data<HttpState>) -> HttpResponse {
    let Some(proxy) = state.auth.oauth_proxy() else {
        return HttpResponse::NotFound().finish();
    };
    match proxy.token(&form).await {
        Ok(tokens) => HttpResponse::Ok()
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .json(tokens),
        Err(e) => {
            warn!(error = e.error, "Token request failed: {}", e.error_description);
            oauth_error(&e)
        }
    }
}
