//! Rate limiting for the login endpoint.
//!
//! Uses a token bucket algorithm with per-IP tracking to slow down password guessing.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::keyed::DefaultKeyedStateStore};
use std::{num::NonZeroU32, sync::Arc};
use tracing::warn;

use crate::auth::extract_client_ip;

/// Per-IP rate limiter.
pub type IpLimiter = RateLimiter<String, DefaultKeyedStateStore<String>, DefaultClock>;

/// Sustained login attempts per second and IP.
const LOGIN_PER_SEC: u32 = 1;

/// Login attempts allowed in a burst.
const LOGIN_BURST: u32 = 5;

/// Rate limiting configuration for authentication endpoints.
#[derive(Clone)]
pub struct RateLimitConfig {
    /// Per-IP limiter for login attempts (5 requests, then one per second)
    pub login: Arc<IpLimiter>,
    /// Key on the first `X-Forwarded-For` entry instead of the peer address
    pub trust_forwarded_for: bool,
}

impl RateLimitConfig {
    /// Create rate limiters with the default login quota.
    pub fn new(trust_forwarded_for: bool) -> Self {
        Self::with_login_quota(LOGIN_PER_SEC, LOGIN_BURST, trust_forwarded_for)
    }

    /// Create rate limiters with a custom login quota. Zero values are raised to one.
    pub fn with_login_quota(per_second: u32, burst: u32, trust_forwarded_for: bool) -> Self {
        let per_second = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);

        Self {
            login: Arc::new(RateLimiter::keyed(
                Quota::per_second(per_second).allow_burst(burst),
            )),
            trust_forwarded_for,
        }
    }
}

/// Middleware for rate limiting login attempts.
pub async fn rate_limit_login(
    State(config): State<Arc<RateLimitConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let ip = match extract_client_ip(&request, config.trust_forwarded_for) {
        Ok(ip) => ip,
        Err(reason) => {
            warn!(reason = %reason, "Rejecting login without client IP");
            return (StatusCode::FORBIDDEN, "Unable to determine client IP.").into_response();
        }
    };

    match config.login.check_key(&ip) {
        Ok(_) => next.run(request).await,
        Err(_) => {
            warn!(ip = %ip, "Login rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many login attempts. Please wait before trying again.",
            )
                .into_response()
        }
    }
}
