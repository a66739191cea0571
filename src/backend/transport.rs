//! Request normalization before dispatch.
//!
//! The backend rejects `Transfer-Encoding: chunked` request bodies, so every
//! request body is read into memory first and sent with an explicit length.
//! Materializing the body also makes the request replayable after a token refresh.

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Uri, header};
use futures::StreamExt;
use url::Url;

use super::error::TransportError;

/// Upper bound on a materialized request body (16 MiB).
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Something that can be sent to the backend.
pub enum RequestInput {
    /// A bare target; sent as a plain GET without changes.
    Url(Url),
    /// A full request whose body may still be a stream.
    Request(Request<Body>),
}

impl From<Url> for RequestInput {
    fn from(url: Url) -> Self {
        Self::Url(url)
    }
}

impl From<Request<Body>> for RequestInput {
    fn from(request: Request<Body>) -> Self {
        Self::Request(request)
    }
}

/// A request with an absolute URL and a fully buffered body.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
    retried: bool,
}

impl PreparedRequest {
    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Set `Authorization: Bearer <token>`, replacing any existing value.
    pub fn set_bearer(&mut self, token: &str) -> Result<(), TransportError> {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|_| TransportError::InvalidHeader("authorization"))?;
        self.headers.insert(header::AUTHORIZATION, value);
        Ok(())
    }

    /// Whether this request has already been replayed after a refresh.
    pub(crate) fn is_retried(&self) -> bool {
        self.retried
    }

    pub(crate) fn mark_retried(&mut self) {
        self.retried = true;
    }

    /// Build the outgoing call. A buffered body always carries Content-Length.
    pub(crate) fn to_reqwest(&self, http: &reqwest::Client) -> reqwest::RequestBuilder {
        let builder = http
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone());
        match &self.body {
            Some(body) => builder.body(body.clone()),
            None => builder,
        }
    }
}

/// Normalize a request for dispatch to the backend at `base_url`.
pub async fn prepare(input: RequestInput, base_url: &Url) -> Result<PreparedRequest, TransportError> {
    match input {
        RequestInput::Url(url) => Ok(PreparedRequest {
            method: Method::GET,
            url,
            headers: HeaderMap::new(),
            body: None,
            retried: false,
        }),
        RequestInput::Request(request) => {
            let (parts, body) = request.into_parts();
            let url = resolve_target(&parts.uri, base_url)?;

            let bytes = read_body(body, &parts.headers).await?;

            let mut headers = parts.headers;
            headers.remove(header::TRANSFER_ENCODING);
            headers.remove(header::CONTENT_LENGTH);

            Ok(PreparedRequest {
                method: parts.method,
                url,
                headers,
                body: (!bytes.is_empty()).then_some(bytes),
                retried: false,
            })
        }
    }
}

/// Buffer a request body, refusing anything over [`MAX_BODY_BYTES`].
async fn read_body(body: Body, headers: &HeaderMap) -> Result<Bytes, TransportError> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > MAX_BODY_BYTES) {
        return Err(TransportError::BodyTooLarge(MAX_BODY_BYTES));
    }

    let mut buffer = Vec::with_capacity(declared.unwrap_or(0));
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| TransportError::Body(e.to_string()))?;
        if buffer.len() + chunk.len() > MAX_BODY_BYTES {
            return Err(TransportError::BodyTooLarge(MAX_BODY_BYTES));
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(Bytes::from(buffer))
}

/// Absolute http(s) URIs are used as-is; origin-form paths are resolved
/// against the backend base URL, keeping any path prefix it has.
fn resolve_target(uri: &Uri, base_url: &Url) -> Result<Url, TransportError> {
    let unsupported = || TransportError::UnsupportedInput(uri.to_string());

    if uri.scheme().is_some() {
        let url = Url::parse(&uri.to_string()).map_err(|_| unsupported())?;
        return match url.scheme() {
            "http" | "https" => Ok(url),
            _ => Err(unsupported()),
        };
    }

    if uri.authority().is_some() || !uri.path().starts_with('/') {
        return Err(unsupported());
    }

    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    Url::parse(&format!(
        "{}{}",
        base_url.as_str().trim_end_matches('/'),
        path_and_query
    ))
    .map_err(|_| unsupported())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://localhost:8000").unwrap()
    }

    #[tokio::test]
    async fn test_streamed_body_is_materialized() {
        let chunks = vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"{\"first_name\":")),
            Ok(Bytes::from_static(b"\"Ada\"}")),
        ];
        let request = Request::builder()
            .method(Method::PUT)
            .uri("/patients/patient-profiles/3/")
            .header(header::TRANSFER_ENCODING, "chunked")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-request-source", "ward-7")
            .body(Body::from_stream(futures::stream::iter(chunks)))
            .unwrap();

        let prepared = prepare(request.into(), &base()).await.unwrap();

        assert_eq!(*prepared.method(), Method::PUT);
        assert_eq!(
            prepared.url().as_str(),
            "http://localhost:8000/patients/patient-profiles/3/"
        );
        assert_eq!(
            prepared.body().map(|b| b.as_ref()),
            Some(&b"{\"first_name\":\"Ada\"}"[..])
        );
        assert!(prepared.headers().get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(prepared.headers()["content-type"], "application/json");
        assert_eq!(prepared.headers()["x-request-source"], "ward-7");
    }

    #[tokio::test]
    async fn test_empty_body_is_none() {
        let request = Request::builder()
            .uri("/patients/patient-profiles/?page=2")
            .body(Body::empty())
            .unwrap();

        let prepared = prepare(request.into(), &base()).await.unwrap();

        assert_eq!(*prepared.method(), Method::GET);
        assert_eq!(
            prepared.url().as_str(),
            "http://localhost:8000/patients/patient-profiles/?page=2"
        );
        assert!(prepared.body().is_none());
    }

    #[tokio::test]
    async fn test_base_path_prefix_kept() {
        let base = Url::parse("http://backend.internal/api/v1/").unwrap();
        let request = Request::builder()
            .uri("/patients/")
            .body(Body::empty())
            .unwrap();

        let prepared = prepare(request.into(), &base).await.unwrap();
        assert_eq!(
            prepared.url().as_str(),
            "http://backend.internal/api/v1/patients/"
        );
    }

    #[tokio::test]
    async fn test_url_passes_through() {
        let url = Url::parse("http://elsewhere.example/health?verbose=1").unwrap();

        let prepared = prepare(url.clone().into(), &base()).await.unwrap();

        assert_eq!(prepared.url(), &url);
        assert_eq!(*prepared.method(), Method::GET);
        assert!(prepared.headers().is_empty());
        assert!(prepared.body().is_none());
    }

    #[tokio::test]
    async fn test_unrecognized_targets_rejected() {
        for target in ["*", "backend.internal:443", "ftp://files.example/x"] {
            let request = Request::builder()
                .method(Method::OPTIONS)
                .uri(target)
                .body(Body::empty())
                .unwrap();

            let result = prepare(request.into(), &base()).await;
            assert!(
                matches!(result, Err(TransportError::UnsupportedInput(_))),
                "{target} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_oversized_body_rejected() {
        let chunks = vec![
            Ok::<_, std::io::Error>(Bytes::from(vec![b'a'; MAX_BODY_BYTES])),
            Ok(Bytes::from_static(b"b")),
        ];
        let request = Request::builder()
            .method(Method::POST)
            .uri("/patients/notes/")
            .body(Body::from_stream(futures::stream::iter(chunks)))
            .unwrap();

        let result = prepare(request.into(), &base()).await;
        assert!(matches!(result, Err(TransportError::BodyTooLarge(_))));
    }

    #[tokio::test]
    async fn test_declared_length_over_limit_rejected() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/patients/notes/")
            .header(header::CONTENT_LENGTH, (MAX_BODY_BYTES + 1).to_string())
            .body(Body::from("short"))
            .unwrap();

        let result = prepare(request.into(), &base()).await;
        assert!(matches!(result, Err(TransportError::BodyTooLarge(_))));
    }

    #[tokio::test]
    async fn test_body_at_limit_accepted() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/patients/notes/")
            .body(Body::from(vec![b'a'; MAX_BODY_BYTES]))
            .unwrap();

        let prepared = prepare(request.into(), &base()).await.unwrap();
        assert_eq!(prepared.body().map(|b| b.len()), Some(MAX_BODY_BYTES));
    }

    #[tokio::test]
    async fn test_set_bearer_replaces_existing() {
        let request = Request::builder()
            .uri("/x/")
            .header(header::AUTHORIZATION, "Basic Zm9vOmJhcg==")
            .body(Body::empty())
            .unwrap();
        let mut prepared = prepare(request.into(), &base()).await.unwrap();

        prepared.set_bearer("abc123").unwrap();

        assert_eq!(prepared.headers()["authorization"], "Bearer abc123");
        assert!(prepared.set_bearer("bad\ntoken").is_err());
    }
}
