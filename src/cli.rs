//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::api::RESERVED_PATHS;
use clap::Parser;
use tracing::{error, info};
use url::Url;

const MIN_SESSION_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "carelink",
    about = "Session and proxy layer in front of the patient records API"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "3000")]
    pub port: u16,

    /// Backend REST API base URL
    #[arg(long, env = "API_URL", default_value = "http://localhost:8000")]
    pub backend_url: String,

    /// Path to file containing the session secret. Prefer using SESSION_SECRET env var instead
    #[arg(long)]
    pub session_secret_file: Option<String>,

    /// Set the Secure flag on session cookies (use when served over HTTPS)
    #[arg(long)]
    pub secure_cookies: bool,

    /// Path prefix the backend proxy is mounted under
    #[arg(long, default_value = "/api/proxy", value_parser = validate_proxy_prefix)]
    pub proxy_prefix: String,

    /// Forward proxied paths as-is instead of appending a trailing slash
    #[arg(long)]
    pub no_trailing_slash: bool,

    /// Backend path sent without a bearer token (may be repeated)
    #[arg(long = "unauthenticated-path")]
    pub unauthenticated_paths: Vec<String>,

    /// Take the client IP from X-Forwarded-For (only behind a trusted reverse proxy)
    #[arg(long)]
    pub trust_forwarded_for: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn validate_proxy_prefix(s: &str) -> Result<String, String> {
    if !s.starts_with('/') {
        return Err(format!("Proxy prefix must start with '/': {}", s));
    }

    if s.len() == 1 {
        return Err("Proxy prefix must not be '/'".to_string());
    }

    if s.ends_with('/') {
        return Err(format!("Proxy prefix must not end with '/': {}", s));
    }

    if s.chars()
        .any(|c| !c.is_ascii() || c.is_whitespace() || c == '{' || c == '}')
    {
        return Err(format!("Proxy prefix contains invalid characters: {}", s));
    }

    if let Some(reserved) = RESERVED_PATHS
        .iter()
        .find(|reserved| overlaps_route(s, reserved))
    {
        return Err(format!(
            "Proxy prefix {} overlaps the built-in route {}",
            s, reserved
        ));
    }

    Ok(s.to_string())
}

/// True when one path equals the other or sits below it.
fn overlaps_route(a: &str, b: &str) -> bool {
    let nested = |inner: &str, outer: &str| {
        inner
            .strip_prefix(outer)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    };
    nested(a, b) || nested(b, a)
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load the session secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_session_secret(session_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("SESSION_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("SESSION_SECRET") };
        secret
    } else if let Some(path) = session_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read session secret file");
                return None;
            }
        }
    } else {
        error!(
            "Session secret is required. Set SESSION_SECRET environment variable (recommended) or use --session-secret-file"
        );
        return None;
    };

    if secret.len() < MIN_SESSION_SECRET_LENGTH {
        error!(
            "Session secret is shorter than {} characters. Use a longer secret",
            MIN_SESSION_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Parse and validate the backend URL.
/// Returns None and logs an error if validation fails.
pub fn validate_backend_url(backend_url: &str) -> Option<Url> {
    let url = match Url::parse(backend_url) {
        Ok(url) => url,
        Err(e) => {
            error!(url = %backend_url, error = %e, "Invalid backend URL");
            return None;
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        error!(url = %backend_url, "Backend URL must use http or https");
        return None;
    }

    if url.query().is_some() || url.fragment().is_some() {
        error!(url = %backend_url, "Backend URL must not carry a query or fragment");
        return None;
    }

    info!(url = %url, "Using backend");
    Some(url)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: Args, backend_url: Url, session_secret: String) -> ServerConfig {
    ServerConfig {
        backend_url,
        session_secret: session_secret.into_bytes(),
        secure_cookies: args.secure_cookies,
        proxy_prefix: args.proxy_prefix,
        trailing_slash: !args.no_trailing_slash,
        unauthenticated_paths: args.unauthenticated_paths,
        trust_forwarded_for: args.trust_forwarded_for,
    }
}
