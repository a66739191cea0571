//! Authentication error types.

use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use super::cookie::clear_session_cookie;

/// Rejection for requests without a usable session.
///
/// Answers `401 Unauthorized` with a plain-text body. When the request
/// presented a session cookie that turned out to be invalid or expired, the
/// cookie is cleared as well.
#[derive(Debug)]
pub struct SessionAuthError {
    clear_cookie: bool,
    secure_cookies: bool,
}

impl SessionAuthError {
    /// No session cookie was presented.
    pub fn missing() -> Self {
        Self {
            clear_cookie: false,
            secure_cookies: false,
        }
    }

    /// A session cookie was presented but can no longer be used.
    pub fn rejected(secure_cookies: bool) -> Self {
        Self {
            clear_cookie: true,
            secure_cookies,
        }
    }
}

impl IntoResponse for SessionAuthError {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();

        if self.clear_cookie {
            if let Ok(value) = HeaderValue::from_str(&clear_session_cookie(self.secure_cookies)) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }

        response
    }
}
