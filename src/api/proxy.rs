//! Authenticated pass-through to the backend.
//!
//! `<prefix>/<rest>` is forwarded to `<backend>/<rest>/` with the caller's
//! bearer token attached by [`ApiClient`](crate::backend::ApiClient). The
//! backend's answer is streamed back as-is.

use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::{self, HeaderValue, header},
    response::Response,
    routing::any,
};
use tracing::{debug, warn};

use super::error::ApiError;
use super::{ApiState, renewed_session_cookie};
use crate::auth::SessionAuth;
use crate::backend::Credentials;

/// Headers that describe a single connection and are never relayed.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn router(state: ApiState) -> Router {
    let prefix = state.proxy_prefix.clone();

    Router::new()
        .route(&prefix, any(proxy))
        .route(&format!("{}/", prefix), any(proxy))
        .route(&format!("{}/{{*rest}}", prefix), any(proxy))
        .with_state(state)
}

/// Backend origin-form target for a path below the proxy prefix.
///
/// `rest` is the remainder after the prefix, possibly empty. The query string
/// is appended verbatim.
pub fn backend_target(rest: &str, query: Option<&str>, trailing_slash: bool) -> String {
    let mut target = String::with_capacity(rest.len() + 2);
    if !rest.starts_with('/') {
        target.push('/');
    }
    target.push_str(rest);
    if trailing_slash && !target.ends_with('/') {
        target.push('/');
    }

    if let Some(query) = query.filter(|q| !q.is_empty()) {
        target.push('?');
        target.push_str(query);
    }
    target
}

/// Turn a backend response into an axum response, streaming the body.
pub fn relay_response(backend: reqwest::Response) -> Response {
    let status = backend.status();
    let mut headers = backend.headers().clone();
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }

    let mut response = Response::new(Body::from_stream(backend.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

async fn proxy(
    State(state): State<ApiState>,
    SessionAuth(session): SessionAuth,
    request: Request,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();

    let rest = parts
        .uri
        .path()
        .strip_prefix(state.proxy_prefix.as_str())
        .unwrap_or_default();
    let target = backend_target(rest, parts.uri.query(), state.trailing_slash);

    let content_type = parts
        .headers
        .get(header::CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static("application/json"));

    let mut outgoing = http::Request::builder()
        .method(parts.method.clone())
        .uri(target.as_str())
        .header(header::CONTENT_TYPE, content_type);
    if let Some(accept) = parts.headers.get(header::ACCEPT) {
        outgoing = outgoing.header(header::ACCEPT, accept.clone());
    }
    let outgoing = outgoing.body(body).map_err(|e| {
        warn!(path = %target, error = %e, "Could not build proxied request");
        ApiError::bad_request("Invalid proxy path")
    })?;

    debug!(method = %parts.method, path = %target, "Proxying request to backend");

    let credentials = Credentials::new();
    let backend = state.api.send(outgoing, &credentials, &session).await?;
    if !backend.status().is_success() {
        debug!(status = %backend.status(), path = %target, "Backend returned error status");
    }

    let mut response = relay_response(backend);
    if let Some(cookie) = renewed_session_cookie(&state, &session, &credentials).await {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    Ok(response)
}
