//! Authenticated backend calls.
//!
//! Every request leaving through [`ApiClient::send`] gets a bearer token:
//! from the credential cache, from a refresh when only a refresh token is
//! cached, or from the session. A 401 answer triggers one refresh and one
//! replay of the buffered request.

use axum::http::StatusCode;
use tracing::{debug, error, warn};
use url::Url;

use super::BackendClient;
use super::credentials::Credentials;
use super::error::ClientError;
use super::transport::{self, RequestInput};
use crate::session::SessionSource;

/// Backend paths that are called without a bearer token.
pub const DEFAULT_UNAUTHENTICATED_PATHS: &[&str] =
    &["/auth/login", "/auth/token/refresh", "/api/auth/signin"];

#[derive(Clone)]
pub struct ApiClient {
    backend: BackendClient,
    unauthenticated_paths: Vec<String>,
}

impl ApiClient {
    pub fn new(backend: BackendClient) -> Self {
        Self {
            backend,
            unauthenticated_paths: DEFAULT_UNAUTHENTICATED_PATHS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }

    /// Add backend paths that must be sent without credentials.
    #[must_use]
    pub fn with_unauthenticated_paths(mut self, paths: impl IntoIterator<Item = String>) -> Self {
        self.unauthenticated_paths.extend(paths);
        self
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    /// Whether a request to `url` gets a bearer token.
    ///
    /// An excluded path matches whole segments from the start of the path
    /// below the backend base URL, so `/auth/login` covers `/auth/login/`
    /// but not `/patients/auth/login-history/`.
    pub fn requires_auth(&self, url: &Url) -> bool {
        let path = url.path();
        let base = self.backend.base_url().path().trim_end_matches('/');
        let relative = path
            .strip_prefix(base)
            .filter(|rest| rest.starts_with('/'))
            .unwrap_or(path);

        !self
            .unauthenticated_paths
            .iter()
            .any(|excluded| matches_segments(relative, excluded))
    }

    /// Send a request with credentials attached.
    ///
    /// Fails with [`ClientError::Authentication`] when no access token can be
    /// obtained; in that case nothing is sent. Backend error statuses are
    /// returned as ordinary responses.
    pub async fn send<S: SessionSource>(
        &self,
        input: impl Into<RequestInput>,
        credentials: &Credentials,
        session: &S,
    ) -> Result<reqwest::Response, ClientError> {
        let mut request = transport::prepare(input.into(), self.backend.base_url()).await?;

        if !self.requires_auth(request.url()) {
            debug!(url = %request.url(), "Sending unauthenticated backend request");
            return Ok(self.backend.execute(&request).await?);
        }

        let mut token = self.authorize(credentials, session).await?;
        request.set_bearer(&token)?;

        loop {
            let response = self.backend.execute(&request).await?;
            if response.status() != StatusCode::UNAUTHORIZED || request.is_retried() {
                return Ok(response);
            }

            let Some(fresh) = self.refresh_rejected(credentials, &token).await else {
                return Ok(response);
            };

            debug!(url = %request.url(), "Replaying request with refreshed token");
            request.mark_retried();
            request.set_bearer(&fresh)?;
            token = fresh;
        }
    }

    /// Make sure the cache holds an access token and return it.
    async fn authorize<S: SessionSource>(
        &self,
        credentials: &Credentials,
        session: &S,
    ) -> Result<String, ClientError> {
        let mut tokens = credentials.lock().await;

        if tokens.access_token.is_none() {
            if let Some(refresh_token) = tokens.refresh_token.clone() {
                debug!("Access token missing, attempting refresh");
                match self.backend.refresh_access_token(&refresh_token).await {
                    Ok(Some(access)) => tokens.access_token = Some(access),
                    Ok(None) => {
                        error!("Failed to refresh access token");
                        return Err(ClientError::Authentication);
                    }
                    Err(e) => {
                        error!(error = %e, "Error refreshing access token");
                        return Err(ClientError::Authentication);
                    }
                }
            }
        }

        if tokens.access_token.is_none() {
            match session.current_session().await {
                Some(current)
                    if !current.access_token.is_empty() && !current.refresh_token.is_empty() =>
                {
                    tokens.access_token = Some(current.access_token);
                    tokens.refresh_token = Some(current.refresh_token);
                }
                _ => {
                    error!("Failed to retrieve session tokens");
                    return Err(ClientError::Authentication);
                }
            }
        }

        tokens.access_token.clone().ok_or(ClientError::Authentication)
    }

    /// Refresh after the backend rejected `rejected`. If another caller has
    /// already replaced that token, the replacement is reused.
    async fn refresh_rejected(&self, credentials: &Credentials, rejected: &str) -> Option<String> {
        let mut tokens = credentials.lock().await;

        if let Some(current) = tokens.access_token.as_deref() {
            if current != rejected {
                return Some(current.to_string());
            }
        }

        let refresh_token = tokens.refresh_token.clone()?;
        match self.backend.refresh_access_token(&refresh_token).await {
            Ok(Some(access)) => {
                tokens.access_token = Some(access.clone());
                Some(access)
            }
            Ok(None) => {
                warn!("Backend rejected access token and refresh failed");
                None
            }
            Err(e) => {
                error!(error = %e, "Error refreshing rejected access token");
                None
            }
        }
    }
}

fn matches_segments(path: &str, excluded: &str) -> bool {
    let excluded = excluded.trim_end_matches('/');
    if excluded.is_empty() {
        return false;
    }
    match path.strip_prefix(excluded) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
