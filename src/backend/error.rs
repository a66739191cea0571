//! Errors raised while talking to the backend.

/// The request handed to the transport adapter could not be normalized.
///
/// `UnsupportedInput` and `InvalidHeader` are contract violations by the
/// caller. The body variants come from the inbound client. None are retried.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unsupported request target: {0}")]
    UnsupportedInput(String),
    #[error("request body exceeds {0} bytes")]
    BodyTooLarge(usize),
    #[error("failed to read request body: {0}")]
    Body(String),
    #[error("invalid header value for {0}")]
    InvalidHeader(&'static str),
}

/// Failure of an authenticated backend call.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No usable credentials could be obtained. Callers should send the user
    /// back to the login page instead of retrying.
    #[error("authentication error")]
    Authentication,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),
}
