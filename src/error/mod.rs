// Error types for the evaluation adapter
// Author: kelexine (https://github.com/kelexine)

use crate::cache::CacheMissDiagnostic;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Config parsing error: {0}")]
    ConfigParsing(#[from] config::ConfigError),

    /// Raised by the caching interceptor in test mode when a request has no stored response.
    #[error("{0}")]
    CacheMiss(Box<CacheMissDiagnostic>),

    #[error("Cache storage error: {0}")]
    Storage(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Cache export error: {0}")]
    Export(#[from] bincode::Error),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AdapterError {
    pub fn config(msg: impl Into<String>) -> Self {
        AdapterError::Config(msg.into())
    }

    /// Whether this error is a startup-time configuration failure.
    pub fn is_config(&self) -> bool {
        matches!(self, AdapterError::Config(_) | AdapterError::ConfigParsing(_))
    }
}

// Convert AdapterError to HTTP responses for Axum
impl IntoResponse for AdapterError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            AdapterError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
            AdapterError::Config(_) | AdapterError::ConfigParsing(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
            }
            AdapterError::CacheMiss(_) => (StatusCode::INTERNAL_SERVER_ERROR, "cache_miss_error"),
            AdapterError::Upstream(_) | AdapterError::Http(_) => {
                (StatusCode::BAD_GATEWAY, "upstream_error")
            }
            AdapterError::Storage(_) | AdapterError::Sqlite(_) | AdapterError::Export(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "storage_error")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "api_error"),
        };

        let mut error = json!({
            "type": error_type,
            "message": self.to_string(),
        });

        if let AdapterError::CacheMiss(diagnostic) = &self {
            error["request"] = json!(diagnostic.request);
            if let Some(closest) = &diagnostic.closest {
                error["similar_request"] = json!(closest.request);
                error["similarity_score"] = json!(closest.score);
                error["diff"] = json!(closest.diff);
            }
        }

        let body = json!({
            "type": "error",
            "error": error,
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;
