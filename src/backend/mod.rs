//! Client side of the backend REST API.
//!
//! - [`BackendClient`] - login and token refresh calls, plus raw dispatch
//! - [`ApiClient`] - authenticated calls with bearer injection and 401 refresh
//! - [`transport`] - request normalization (no chunked bodies)
//! - [`Credentials`] - request-scoped token cache

mod credentials;
mod error;
mod middleware;
pub mod transport;

pub use credentials::{Credentials, TokenPair};
pub use error::{ClientError, TransportError};
pub use middleware::{ApiClient, DEFAULT_UNAUTHENTICATED_PATHS};
pub use transport::{PreparedRequest, RequestInput};

use axum::http::header::{ACCEPT, SET_COOKIE};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use url::Url;

use crate::auth::parse_token_cookies;
use crate::session::{Session, UserProfile};

/// Backend login endpoint.
pub const LOGIN_PATH: &str = "/auth/login/";

/// Backend token refresh endpoint.
pub const REFRESH_PATH: &str = "/auth/token/refresh/";

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    user: UserProfile,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    access: Option<String>,
}

/// Unauthenticated calls to the backend.
#[derive(Clone)]
pub struct BackendClient {
    base_url: Url,
    login_url: Url,
    refresh_url: Url,
    http: reqwest::Client,
}

impl BackendClient {
    /// Create a client for the backend at `base_url`. A path on the base URL
    /// is kept as a prefix for every endpoint.
    pub fn new(mut base_url: Url) -> Result<Self, url::ParseError> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let login_url = base_url.join(LOGIN_PATH.trim_start_matches('/'))?;
        let refresh_url = base_url.join(REFRESH_PATH.trim_start_matches('/'))?;

        Ok(Self {
            base_url,
            login_url,
            refresh_url,
            http: reqwest::Client::new(),
        })
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Exchange username and password for a session.
    ///
    /// Returns `Ok(None)` when the backend refuses the credentials or its
    /// response lacks the access token, refresh token or expiry. Only
    /// network-level failures are returned as errors.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Session>, reqwest::Error> {
        let response = self
            .http
            .post(self.login_url.clone())
            .header(ACCEPT, "application/json")
            .json(&LoginRequest { username, password })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Backend rejected login");
            return Ok(None);
        }

        // Repeated Set-Cookie headers are joined the way HTTP clients join them.
        let cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect::<Vec<_>>()
            .join(", ");
        let tokens = parse_token_cookies((!cookies.is_empty()).then_some(cookies.as_str()));

        let body = match response.json::<LoginResponse>().await {
            Ok(body) => body,
            Err(e) if e.is_decode() => {
                error!(error = %e, "Login response body could not be decoded");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let (Some(access_token), Some(refresh_token), Some(expires)) =
            (tokens.access_token, tokens.refresh_token, tokens.expires)
        else {
            error!(username = %username, "Token or expiry not found in login cookies");
            return Ok(None);
        };

        info!(username = %body.user.username, "Backend login succeeded");
        Ok(Some(Session {
            user: body.user,
            access_token,
            refresh_token,
            expires,
        }))
    }

    /// Obtain a new access token.
    ///
    /// HTTP-level failures map to `Ok(None)`; network-level failures are
    /// returned to the caller.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<Option<String>, reqwest::Error> {
        let response = self
            .http
            .post(self.refresh_url.clone())
            .header(ACCEPT, "application/json")
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Failed to refresh access token");
            return Ok(None);
        }

        match response.json::<RefreshResponse>().await {
            Ok(RefreshResponse {
                access: Some(access),
            }) if !access.is_empty() => {
                info!("Access token refreshed");
                Ok(Some(access))
            }
            Ok(_) => {
                warn!("Refresh response carried no access token");
                Ok(None)
            }
            Err(e) if e.is_decode() => {
                warn!(error = %e, "Refresh response could not be decoded");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Send a prepared request as-is.
    pub async fn execute(
        &self,
        request: &PreparedRequest,
    ) -> Result<reqwest::Response, reqwest::Error> {
        request.to_reqwest(&self.http).send().await
    }
}
