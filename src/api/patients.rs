//! Patient data endpoints.
//!
//! - GET `/` - Patient list (query string forwarded to the backend)
//! - GET `/{id}` - Single patient profile

use axum::{
    Json, Router,
    extract::{Path, RawQuery, State},
    http::header::SET_COOKIE,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, warn};
use url::Url;

use super::error::ApiError;
use super::{ApiState, relay_response, renewed_session_cookie};
use crate::auth::SessionAuth;
use crate::backend::Credentials;
use crate::session::Session;

/// Backend collection of patient profiles.
const PROFILES_PATH: &str = "patients/patient-profiles/";

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(list_patients))
        .route("/{id}", get(get_patient))
        .with_state(state)
}

/// Patient profile as served by the backend. Fields this server does not
/// use are kept and passed on unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientProfile {
    pub id: i64,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The profile collection is either paginated or a bare list.
#[derive(Deserialize)]
#[serde(untagged)]
enum PatientPage {
    Paginated {
        count: usize,
        results: Vec<PatientProfile>,
    },
    List(Vec<PatientProfile>),
}

#[derive(Debug, Serialize)]
struct PatientList {
    total: usize,
    patients: Vec<PatientProfile>,
}

impl From<PatientPage> for PatientList {
    fn from(page: PatientPage) -> Self {
        match page {
            PatientPage::Paginated { count, results } => Self {
                total: count,
                patients: results,
            },
            PatientPage::List(patients) => Self {
                total: patients.len(),
                patients,
            },
        }
    }
}

async fn list_patients(
    State(state): State<ApiState>,
    SessionAuth(session): SessionAuth,
    RawQuery(query): RawQuery,
) -> Result<Response, ApiError> {
    let mut url = profiles_url(&state, "")?;
    url.set_query(query.as_deref().filter(|q| !q.is_empty()));

    fetch::<PatientPage, PatientList>(&state, &session, url).await
}

async fn get_patient(
    State(state): State<ApiState>,
    SessionAuth(session): SessionAuth,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let url = profiles_url(&state, &format!("{}/", id))?;

    fetch::<PatientProfile, PatientProfile>(&state, &session, url).await
}

fn profiles_url(state: &ApiState, rest: &str) -> Result<Url, ApiError> {
    state
        .api
        .backend()
        .base_url()
        .join(&format!("{}{}", PROFILES_PATH, rest))
        .map_err(|e| {
            error!(error = %e, "Failed to build patient profile URL");
            ApiError::internal("Invalid backend URL")
        })
}

/// GET `url` for the session's user, decode the body as `T` and answer with
/// it converted to `R`. Backend error statuses are passed through unchanged.
async fn fetch<T, R>(state: &ApiState, session: &Session, url: Url) -> Result<Response, ApiError>
where
    T: serde::de::DeserializeOwned,
    R: From<T> + Serialize,
{
    let credentials = Credentials::new();
    let backend = state.api.send(url.clone(), &credentials, session).await?;
    let renewed = renewed_session_cookie(state, session, &credentials).await;

    let status = backend.status();
    let mut response = if status.is_success() {
        let body = backend.json::<T>().await.map_err(|e| {
            error!(url = %url, error = %e, "Unexpected backend response");
            ApiError::bad_gateway("Invalid backend response")
        })?;
        Json(R::from(body)).into_response()
    } else {
        warn!(url = %url, status = %status, "Backend returned error status");
        relay_response(backend)
    };

    if let Some(cookie) = renewed {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    Ok(response)
}
