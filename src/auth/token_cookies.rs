//! Extraction of backend tokens from the login response's `Set-Cookie` header.
//!
//! The backend hands out its credentials as cookies:
//! `access_token=...; expires=...` and `refresh_token=...`. HTTP clients join
//! repeated `Set-Cookie` headers with `", "`, so a single string may hold several
//! cookies, each followed by its own attributes.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME};

/// Attribute names that belong to the preceding cookie rather than starting a new one.
const COOKIE_ATTRIBUTES: &[&str] = &[
    "expires",
    "max-age",
    "domain",
    "path",
    "secure",
    "httponly",
    "samesite",
    "partitioned",
    "priority",
];

/// Tokens found in a `Set-Cookie` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    /// Expiry of the access-token cookie as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
    /// `None` means the expiry is unknown, not that the cookie never expires.
    pub expires: Option<String>,
}

struct RawCookie<'a> {
    name: &'a str,
    value: &'a str,
    attributes: Vec<(&'a str, &'a str)>,
}

/// Parse access/refresh tokens and the access-token expiry from a raw `Set-Cookie` string.
pub fn parse_token_cookies(raw: Option<&str>) -> ParsedTokens {
    let Some(raw) = raw else {
        return ParsedTokens::default();
    };

    let cookies = group_cookies(raw);
    let find = |name: &str| {
        cookies
            .iter()
            .find(|c| c.name == name && !c.value.is_empty())
    };

    let access = find(ACCESS_COOKIE_NAME);
    let expires = access
        .and_then(|c| {
            c.attributes
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case("expires"))
        })
        .and_then(|(_, value)| parse_cookie_date(value))
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true));

    ParsedTokens {
        access_token: access.map(|c| c.value.to_string()),
        refresh_token: find(REFRESH_COOKIE_NAME).map(|c| c.value.to_string()),
        expires,
    }
}

/// Parse an HTTP cookie date (`Wed, 21 Oct 2026 07:28:00 GMT`, or the legacy
/// dashed form `Wed, 21-Oct-2026 07:28:00 GMT`).
pub fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%a, %d-%b-%Y %H:%M:%S GMT")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Split the header into `name=value` cookies, each with its trailing attributes.
fn group_cookies(raw: &str) -> Vec<RawCookie<'_>> {
    let mut cookies: Vec<RawCookie<'_>> = Vec::new();

    for part in raw.split(';') {
        for piece in split_joined_cookies(part) {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            let (key, value) = match piece.split_once('=') {
                Some((key, value)) => (key.trim(), value.trim()),
                None => (piece, ""),
            };

            let is_attribute = COOKIE_ATTRIBUTES
                .iter()
                .any(|attr| key.eq_ignore_ascii_case(attr));

            match cookies.last_mut() {
                Some(current) if is_attribute => current.attributes.push((key, value)),
                // An attribute with no cookie before it carries no information.
                None if is_attribute => {}
                _ => cookies.push(RawCookie {
                    name: key,
                    value,
                    attributes: Vec::new(),
                }),
            }
        }
    }

    cookies
}

/// Split on commas that separate joined `Set-Cookie` values. A comma only
/// starts a new cookie when it is followed by `name=`; the comma inside an
/// HTTP date is followed by a day number and a space.
fn split_joined_cookies(part: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;

    for (idx, _) in part.match_indices(',') {
        if starts_new_cookie(part[idx + 1..].trim_start()) {
            pieces.push(&part[start..idx]);
            start = idx + 1;
        }
    }
    pieces.push(&part[start..]);
    pieces
}

fn starts_new_cookie(rest: &str) -> bool {
    match rest.split_once('=') {
        Some((name, _)) => {
            !name.is_empty() && !name.contains(|c: char| c.is_whitespace() || c == ',')
        }
        None => false,
    }
}
