//! Request-scoped credential holder.
//!
//! Each inbound request (or session) owns its own [`Credentials`]; nothing is
//! shared process-wide. The tokens sit behind an async mutex that the request
//! middleware holds across a refresh, so concurrent callers that find the
//! cache empty wait for one refresh instead of issuing their own.

use tokio::sync::{Mutex, MutexGuard};

/// Current access/refresh token pair. Either side may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Default)]
pub struct Credentials {
    tokens: Mutex<TokenPair>,
}

impl Credentials {
    /// Empty holder; filled from the session on first use.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            tokens: Mutex::new(TokenPair {
                access_token: Some(access_token.into()),
                refresh_token: Some(refresh_token.into()),
            }),
        }
    }

    /// Holder that only knows a refresh token; the first request refreshes.
    pub fn with_refresh_token(refresh_token: impl Into<String>) -> Self {
        Self {
            tokens: Mutex::new(TokenPair {
                access_token: None,
                refresh_token: Some(refresh_token.into()),
            }),
        }
    }

    /// Copy of the current tokens.
    pub async fn snapshot(&self) -> TokenPair {
        self.tokens.lock().await.clone()
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, TokenPair> {
        self.tokens.lock().await
    }
}
