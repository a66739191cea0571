pub mod api;
pub mod auth;
pub mod backend;
pub mod cli;
pub mod rate_limit;
pub mod session;

use api::{ApiState, create_api_router};
use axum::Router;
use backend::{ApiClient, BackendClient};
use rate_limit::RateLimitConfig;
use session::SessionKeys;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use url::Url;

pub struct ServerConfig {
    /// Backend REST API base URL (e.g., "http://localhost:8000")
    pub backend_url: Url,
    /// Secret for signing session cookies
    pub session_secret: Vec<u8>,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Path the backend proxy is mounted under (e.g., "/api/proxy")
    pub proxy_prefix: String,
    /// Whether proxied backend paths get a trailing slash appended
    pub trailing_slash: bool,
    /// Extra backend paths called without a bearer token
    pub unauthenticated_paths: Vec<String>,
    /// Key rate limits on `X-Forwarded-For` (requires running behind a proxy)
    pub trust_forwarded_for: bool,
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Result<Router, url::ParseError> {
    let backend = BackendClient::new(config.backend_url.clone())?;
    let api = ApiClient::new(backend)
        .with_unauthenticated_paths(config.unauthenticated_paths.iter().cloned());

    let state = ApiState {
        api,
        keys: Arc::new(SessionKeys::new(&config.session_secret)),
        secure_cookies: config.secure_cookies,
        proxy_prefix: config.proxy_prefix.clone(),
        trailing_slash: config.trailing_slash,
    };
    let rate_limit_config = Arc::new(RateLimitConfig::new(config.trust_forwarded_for));

    Ok(create_api_router(state, rate_limit_config))
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config).map_err(std::io::Error::other)?;
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}
