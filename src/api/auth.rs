//! Session API endpoints.
//!
//! - POST `/login` - Exchange username and password for a session cookie
//! - GET `/session` - Current session without its tokens
//! - POST `/logout` - Clear the session cookie

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::ApiState;
use super::error::ApiError;
use crate::auth::{SessionAuth, clear_session_cookie, session_cookie};
use crate::rate_limit::{RateLimitConfig, rate_limit_login};

pub fn router(state: ApiState, rate_limit_config: Arc<RateLimitConfig>) -> Router {
    let login_router = Router::new()
        .route("/login", post(login))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            rate_limit_config,
            rate_limit_login,
        ));

    Router::new()
        .route("/session", get(current_session))
        .route("/logout", post(logout))
        .with_state(state)
        .merge(login_router)
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn login(
    State(state): State<ApiState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = body.username.trim();
    if username.is_empty() || body.password.trim().is_empty() {
        return Err(ApiError::bad_request("Username and password are required"));
    }

    let session = match state.api.backend().login(username, &body.password).await {
        Ok(Some(session)) => session,
        Ok(None) => {
            warn!(username = %username, "Login failed");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
        Err(e) => {
            error!(username = %username, error = %e, "Login request to backend failed");
            return Err(ApiError::unauthorized("Invalid credentials"));
        }
    };

    let token = state.keys.issue(&session).map_err(|e| {
        error!(error = %e, "Failed to sign session");
        ApiError::internal("Failed to create session")
    })?;
    let cookie = session_cookie(&token.token, token.max_age, state.secure_cookies);

    info!(username = %session.user.username, "Session created");
    Ok((
        StatusCode::OK,
        [(SET_COOKIE, cookie)],
        Json(session.to_safe()),
    ))
}

async fn current_session(SessionAuth(session): SessionAuth) -> impl IntoResponse {
    Json(session.to_safe())
}

async fn logout(State(state): State<ApiState>) -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [(SET_COOKIE, clear_session_cookie(state.secure_cookies))],
    )
}
