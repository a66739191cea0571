//! Signed session tokens.
//!
//! A session binds the backend's user profile to the backend token pair and
//! the access token's expiry. It travels in an HttpOnly cookie as an HS256 JWT,
//! so the server stays stateless; the tokens inside are never handed to the
//! browser-readable [`SafeSession`] view.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Session token lifetime: 24 hours
pub const SESSION_MAX_AGE_SECS: u64 = 24 * 60 * 60;

/// User profile as returned by the backend login endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(alias = "id")]
    pub pk: i64,
    pub username: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub email: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub first_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub last_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub full_name: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// The backend sends `null` for blank profile fields.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: UserProfile,
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry, ISO-8601 UTC (`2026-10-21T07:28:00.000Z`)
    pub expires: String,
}

/// Session view that is safe to hand to client-rendered pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SafeSession {
    pub user: UserProfile,
    pub expires: String,
}

impl Session {
    /// Project the session without its tokens.
    pub fn to_safe(&self) -> SafeSession {
        SafeSession {
            user: self.user.clone(),
            expires: self.expires.clone(),
        }
    }

    /// Whether the session's `expires` timestamp has passed (or cannot be read).
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match DateTime::parse_from_rfc3339(&self.expires) {
            Ok(expires) => expires.with_timezone(&Utc) <= now,
            Err(_) => true,
        }
    }

    /// Copy of the session carrying a new access token.
    pub fn with_access_token(&self, access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            ..self.clone()
        }
    }
}

/// Anything that can hand out the current session on demand.
///
/// The request middleware asks for a session only when it has no cached
/// token, so implementations may be lazy.
pub trait SessionSource: Send + Sync {
    fn current_session(&self) -> impl Future<Output = Option<Session>> + Send;
}

impl SessionSource for Session {
    async fn current_session(&self) -> Option<Session> {
        Some(self.clone())
    }
}

impl SessionSource for Option<Session> {
    async fn current_session(&self) -> Option<Session> {
        self.clone()
    }
}

/// JWT claims wrapping a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionClaims {
    #[serde(flatten)]
    session: Session,
    /// Issued at (Unix timestamp)
    iat: u64,
    /// Expiration time (Unix timestamp)
    exp: u64,
}

/// Result of signing a session.
#[derive(Debug, Clone)]
pub struct SessionToken {
    /// The JWT token string
    pub token: String,
    /// Cookie lifetime in seconds
    pub max_age: u64,
}

/// Keys for signing and verifying session tokens.
#[derive(Clone)]
pub struct SessionKeys {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SessionKeys {
    /// Create session keys from the given secret.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Sign a session into a token valid for [`SESSION_MAX_AGE_SECS`].
    pub fn issue(&self, session: &Session) -> Result<SessionToken, SessionError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| SessionError::TimeError)?
            .as_secs();

        let claims = SessionClaims {
            session: session.clone(),
            iat: now,
            exp: now + SESSION_MAX_AGE_SECS,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(SessionError::Encoding)?;

        Ok(SessionToken {
            token,
            max_age: SESSION_MAX_AGE_SECS,
        })
    }

    /// Verify a session token and return the session it carries.
    pub fn decode(&self, token: &str) -> Result<Session, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(SessionError::Decoding)?;

        let session = token_data.claims.session;
        if session.is_expired_at(Utc::now()) {
            return Err(SessionError::Expired);
        }

        Ok(session)
    }
}

/// Errors that can occur while issuing or reading session tokens.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to encode session: {0}")]
    Encoding(jsonwebtoken::errors::Error),
    #[error("Failed to decode session: {0}")]
    Decoding(jsonwebtoken::errors::Error),
    #[error("Session has expired")]
    Expired,
    #[error("System time error")]
    TimeError,
}
