//! Shared test helpers: an in-process mock of the backend REST API and
//! builders for the application under test.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::{StatusCode, header},
    response::{AppendHeaders, IntoResponse, Response},
    routing::post,
};
use carelink::ServerConfig;
use carelink::session::{Session, SessionKeys, UserProfile};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use url::Url;

pub const SESSION_SECRET: &[u8] = b"test-session-secret-that-is-long-enough";

/// Password the mock backend accepts for every user.
pub const PASSWORD: &str = "secret";

/// Access token expiry the mock backend sets for regular users.
pub const FAR_EXPIRY_COOKIE: &str = "Thu, 01 Jan 2099 00:00:00 GMT";
pub const FAR_EXPIRY_ISO: &str = "2099-01-01T00:00:00.000Z";

/// A request as seen by the mock backend.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path plus query string
    pub target: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub accept: Option<String>,
    pub content_length: Option<String>,
    pub transfer_encoding: Option<String>,
    pub body: String,
}

#[derive(Default)]
struct Inner {
    login_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    data_calls: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
    valid_tokens: Mutex<Vec<String>>,
    refreshed_token: Mutex<Option<String>>,
}

#[derive(Clone, Default)]
pub struct MockState(Arc<Inner>);

pub struct MockBackend {
    pub url: Url,
    state: MockState,
}

impl MockBackend {
    /// Start a mock backend that accepts the access token `abc123` and
    /// refreshes `xyz789` into `fresh`.
    pub async fn start() -> Self {
        let state = MockState::default();
        state.set_valid_tokens(&["abc123", "fresh"]);
        state.set_refreshed_token(Some("fresh"));

        let app = Router::new()
            .route("/auth/login/", post(login))
            .route("/auth/token/refresh/", post(refresh))
            .fallback(data)
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        Self {
            url: Url::parse(&format!("http://{}", addr)).unwrap(),
            state,
        }
    }

    pub fn set_valid_tokens(&self, tokens: &[&str]) {
        self.state.set_valid_tokens(tokens);
    }

    /// Token handed out by the refresh endpoint; `None` makes refresh fail.
    pub fn set_refreshed_token(&self, token: Option<&str>) {
        self.state.set_refreshed_token(token);
    }

    pub fn login_calls(&self) -> usize {
        self.state.0.login_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.0.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn data_calls(&self) -> usize {
        self.state.0.data_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.0.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> RecordedRequest {
        self.requests().pop().expect("backend received no data request")
    }
}

impl MockState {
    fn set_valid_tokens(&self, tokens: &[&str]) {
        *self.0.valid_tokens.lock().unwrap() = tokens.iter().map(|t| t.to_string()).collect();
    }

    fn set_refreshed_token(&self, token: Option<&str>) {
        *self.0.refreshed_token.lock().unwrap() = token.map(str::to_string);
    }
}

pub fn user_json(username: &str) -> Value {
    json!({
        "pk": 7,
        "username": username,
        "email": format!("{}@example.org", username),
        "first_name": "Jane",
        "last_name": "Doe",
        "full_name": "Jane Doe",
        "groups": ["clinician"]
    })
}

#[derive(Deserialize)]
struct LoginBody {
    username: String,
    password: String,
}

async fn login(State(state): State<MockState>, Json(body): Json<LoginBody>) -> Response {
    state.0.login_calls.fetch_add(1, Ordering::SeqCst);

    if body.password != PASSWORD {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "No active account found with the given credentials"})),
        )
            .into_response();
    }

    let user = Json(json!({ "user": user_json(&body.username) }));
    match body.username.as_str() {
        "scenario" => (
            AppendHeaders([(
                header::SET_COOKIE,
                "access_token=abc123; expires=Wed, 21 Oct 2026 07:28:00 GMT, refresh_token=xyz789"
                    .to_string(),
            )]),
            user,
        )
            .into_response(),
        "noexpiry" => (
            AppendHeaders([
                (header::SET_COOKIE, "access_token=abc123; HttpOnly; Path=/".to_string()),
                (header::SET_COOKIE, "refresh_token=xyz789; HttpOnly; Path=/".to_string()),
            ]),
            user,
        )
            .into_response(),
        _ => (
            AppendHeaders([
                (
                    header::SET_COOKIE,
                    format!(
                        "access_token=abc123; expires={}; HttpOnly; Path=/",
                        FAR_EXPIRY_COOKIE
                    ),
                ),
                (
                    header::SET_COOKIE,
                    "refresh_token=xyz789; HttpOnly; Path=/".to_string(),
                ),
            ]),
            user,
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
struct RefreshBody {
    refresh: String,
}

async fn refresh(State(state): State<MockState>, Json(body): Json<RefreshBody>) -> Response {
    state.0.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let refreshed = state.0.refreshed_token.lock().unwrap().clone();
    match refreshed {
        Some(access) if body.refresh == "xyz789" => Json(json!({ "access": access })).into_response(),
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Token is invalid or expired"})),
        )
            .into_response(),
    }
}

/// Every other backend route: records the request, checks the bearer token
/// and answers with canned patient data or an echo of the request.
async fn data(State(state): State<MockState>, request: Request) -> Response {
    state.0.data_calls.fetch_add(1, Ordering::SeqCst);

    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let get = |name: header::HeaderName| {
        parts
            .headers
            .get(name)
            .map(|v| v.to_str().unwrap().to_string())
    };

    let recorded = RecordedRequest {
        method: parts.method.to_string(),
        target: parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_default(),
        authorization: get(header::AUTHORIZATION),
        content_type: get(header::CONTENT_TYPE),
        accept: get(header::ACCEPT),
        content_length: get(header::CONTENT_LENGTH),
        transfer_encoding: get(header::TRANSFER_ENCODING),
        body: String::from_utf8_lossy(&body).to_string(),
    };
    state.0.requests.lock().unwrap().push(recorded.clone());

    let path = parts.uri.path();
    if path.starts_with("/public/") {
        return Json(json!({"public": true})).into_response();
    }

    let authorized = recorded
        .authorization
        .as_deref()
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| state.0.valid_tokens.lock().unwrap().iter().any(|t| t == token));
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Given token not valid for any token type"})),
        )
            .into_response();
    }

    match path {
        "/patients/patient-profiles/" => {
            let patients = json!([
                {"id": 1, "full_name": "Ada Lovelace", "email": "ada@example.org", "ward": "B2"},
                {"id": 2, "full_name": "Alan Turing", "email": null, "ward": "C1"}
            ]);
            if parts.uri.query() == Some("format=list") {
                Json(patients).into_response()
            } else {
                Json(json!({
                    "count": 12,
                    "next": null,
                    "previous": null,
                    "results": patients
                }))
                .into_response()
            }
        }
        "/patients/patient-profiles/1/" => Json(json!({
            "id": 1,
            "full_name": "Ada Lovelace",
            "email": "ada@example.org",
            "ward": "B2"
        }))
        .into_response(),
        p if p.starts_with("/patients/patient-profiles/") => {
            (StatusCode::NOT_FOUND, Json(json!({"detail": "Not found."}))).into_response()
        }
        _ => (
            [("x-backend", "mock")],
            Json(json!({
                "method": recorded.method,
                "target": recorded.target,
                "body": recorded.body,
            })),
        )
            .into_response(),
    }
}

/// Server configuration pointing at `backend`.
pub fn test_config(backend: &MockBackend) -> ServerConfig {
    ServerConfig {
        backend_url: backend.url.clone(),
        session_secret: SESSION_SECRET.to_vec(),
        secure_cookies: false,
        proxy_prefix: "/api/proxy".to_string(),
        trailing_slash: true,
        unauthenticated_paths: Vec::new(),
        trust_forwarded_for: false,
    }
}

pub fn create_test_app(backend: &MockBackend) -> Router {
    carelink::create_app(&test_config(backend)).unwrap()
}

pub fn test_user() -> UserProfile {
    serde_json::from_value(user_json("jdoe")).unwrap()
}

pub fn test_session(access_token: &str, refresh_token: &str) -> Session {
    Session {
        user: test_user(),
        access_token: access_token.to_string(),
        refresh_token: refresh_token.to_string(),
        expires: FAR_EXPIRY_ISO.to_string(),
    }
}

/// `Cookie` header value carrying a signed session with the given tokens.
pub fn session_cookie(access_token: &str, refresh_token: &str) -> String {
    let token = SessionKeys::new(SESSION_SECRET)
        .issue(&test_session(access_token, refresh_token))
        .unwrap();
    format!("session_token={}", token.token)
}

/// Request builder with a peer address, as the server provides via `ConnectInfo`.
pub fn request(method: &str, uri: &str) -> axum::http::request::Builder {
    axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))))
}

pub fn empty() -> Body {
    Body::empty()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// The `session_token` value from a response's `Set-Cookie` header.
pub fn session_token_from(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|v| v.strip_prefix("session_token="))
        .map(|v| v.split(';').next().unwrap_or_default().to_string())
}
