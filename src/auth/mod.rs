//! Session cookie authentication.
//!
//! The signed session cookie carries the backend token pair; extractors
//! verify it and hand the [`Session`](crate::session::Session) to handlers.
//! The login response's `Set-Cookie` header is parsed by [`parse_token_cookies`].

mod cookie;
mod errors;
mod extractors;
mod ip;
mod state;
mod token_cookies;

pub use cookie::{
    ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, SESSION_COOKIE_NAME, clear_session_cookie,
    get_cookie, session_cookie,
};
pub use errors::SessionAuthError;
pub use extractors::{SessionAuth, session_from_parts};
pub use ip::{HasHeadersAndExtensions, extract_client_ip};
pub use state::HasSessionState;
pub use token_cookies::{ParsedTokens, parse_cookie_date, parse_token_cookies};
