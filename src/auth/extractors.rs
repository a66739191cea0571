//! Axum extractors for the session cookie.

use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::debug;

use super::cookie::{SESSION_COOKIE_NAME, get_cookie};
use super::errors::SessionAuthError;
use super::state::HasSessionState;
use crate::session::Session;

/// Read and verify the session cookie.
pub fn session_from_parts<S>(parts: &Parts, state: &S) -> Result<Session, SessionAuthError>
where
    S: HasSessionState,
{
    let token =
        get_cookie(&parts.headers, SESSION_COOKIE_NAME).ok_or_else(SessionAuthError::missing)?;

    state.session_keys().decode(token).map_err(|e| {
        debug!(error = %e, "Rejected session cookie");
        SessionAuthError::rejected(state.secure_cookies())
    })
}

/// Extractor for endpoints that require a signed-in user.
/// Rejects with a plain-text 401.
pub struct SessionAuth(pub Session);

impl<S> FromRequestParts<S> for SessionAuth
where
    S: HasSessionState + Send + Sync,
{
    type Rejection = SessionAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        session_from_parts(parts, state).map(SessionAuth)
    }
}
