//! Structured logging setup and secret redaction for logged payloads.
//!
//! The adapter sees the harness's credentials on every call, so anything
//! that logs headers or bodies goes through [`sanitize`] first.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::config::LoggingConfig;
use crate::error::{AdapterError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

lazy_static! {
    static ref BEARER_TOKEN: Regex =
        Regex::new(r"(?i)(bearer\s+)[A-Za-z0-9._~+/=-]+").unwrap();
    static ref API_KEY: Regex = Regex::new(r"sk-[A-Za-z0-9_-]{8,}").unwrap();
}

/// Header names whose values are never logged.
const SECRET_HEADERS: [&str; 4] = ["authorization", "x-api-key", "api-key", "proxy-authorization"];

/// Initializes the global tracing subscriber.
///
/// Formats: `json`, `compact`, anything else is `pretty`. `RUST_LOG`
/// overrides the configured level.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        "compact" => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    };

    result.map_err(|e| AdapterError::Internal(format!("failed to initialise logging: {}", e)))
}

/// Replaces bearer tokens and `sk-` style API keys with placeholders.
pub fn sanitize(input: &str) -> String {
    let result = BEARER_TOKEN.replace_all(input, "${1}[REDACTED_TOKEN]");
    API_KEY
        .replace_all(&result, "[REDACTED_API_KEY]")
        .into_owned()
}

/// Value to log for a header: secret headers are masked entirely.
pub fn sanitize_header(name: &str, value: &str) -> String {
    if SECRET_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
        "[REDACTED]".to_string()
    } else {
        sanitize(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_bearer_token() {
        let output = sanitize("Authorization: Bearer abc.DEF-123_xyz");
        assert_eq!(output, "Authorization: Bearer [REDACTED_TOKEN]");
    }

    #[test]
    fn test_sanitize_api_key() {
        let output = sanitize(r#"{"api_key": "sk-proj-0123456789abcdef"}"#);
        assert!(output.contains("[REDACTED_API_KEY]"));
        assert!(!output.contains("0123456789abcdef"));
    }

    #[test]
    fn test_sanitize_leaves_plain_text() {
        assert_eq!(sanitize("task-123 finished"), "task-123 finished");
    }

    #[test]
    fn test_secret_headers_masked() {
        assert_eq!(sanitize_header("X-Api-Key", "whatever"), "[REDACTED]");
        assert_eq!(sanitize_header("content-type", "application/json"), "application/json");
    }
}
