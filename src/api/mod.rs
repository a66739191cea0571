//! HTTP API: session endpoints, patient data and the backend proxy.

mod auth;
mod error;
mod patients;
mod proxy;

use axum::{Router, http::HeaderValue};
use std::sync::Arc;
use tracing::{debug, error};

use crate::auth::session_cookie;
use crate::backend::{ApiClient, Credentials};
use crate::impl_has_session_state;
use crate::rate_limit::RateLimitConfig;
use crate::session::{Session, SessionKeys};

pub use error::ApiError;

/// Route prefixes owned by the built-in endpoints.
pub const RESERVED_PATHS: &[&str] = &[AUTH_PATH, PATIENTS_PATH];

const AUTH_PATH: &str = "/api/auth";
const PATIENTS_PATH: &str = "/api/patients";
pub use proxy::{backend_target, relay_response};

/// State shared by every API handler.
#[derive(Clone)]
pub struct ApiState {
    pub api: ApiClient,
    pub keys: Arc<SessionKeys>,
    pub secure_cookies: bool,
    /// Path prefix the proxy is mounted under, without trailing slash
    pub proxy_prefix: String,
    /// Force a trailing slash on proxied backend paths
    pub trailing_slash: bool,
}

impl_has_session_state!(ApiState);

/// Create the API router.
pub fn create_api_router(state: ApiState, rate_limit_config: Arc<RateLimitConfig>) -> Router {
    Router::new()
        .nest(AUTH_PATH, auth::router(state.clone(), rate_limit_config))
        .nest(PATIENTS_PATH, patients::router(state.clone()))
        .merge(proxy::router(state))
}

/// Session cookie carrying the refreshed access token, if the backend call
/// replaced the one stored in `session`.
pub(crate) async fn renewed_session_cookie(
    state: &ApiState,
    session: &Session,
    credentials: &Credentials,
) -> Option<HeaderValue> {
    let access_token = credentials.snapshot().await.access_token?;
    if access_token == session.access_token {
        return None;
    }

    debug!(username = %session.user.username, "Re-issuing session with refreshed access token");
    let renewed = session.with_access_token(access_token);
    let token = match state.keys.issue(&renewed) {
        Ok(token) => token,
        Err(e) => {
            error!(error = %e, "Failed to sign refreshed session");
            return None;
        }
    };

    HeaderValue::from_str(&session_cookie(
        &token.token,
        token.max_age,
        state.secure_cookies,
    ))
    .ok()
}
