// Request and response logging interceptors
// Author: kelexine (https://github.com/kelexine)

use crate::adapter::{AdapterRequest, AdapterResponse, Interceptor, RequestOutcome};
use crate::error::Result;
use crate::utils::logging::{sanitize, sanitize_header};
use async_trait::async_trait;
use axum::http::HeaderMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

fn default_max_body_chars() -> usize {
    2000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingInterceptorConfig {
    /// Stop logging after this many calls; unlimited when unset.
    #[serde(default)]
    pub max_logged: Option<u64>,
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,
}

impl Default for LoggingInterceptorConfig {
    fn default() -> Self {
        Self {
            max_logged: None,
            max_body_chars: default_max_body_chars(),
        }
    }
}

/// Saturating budget of calls still allowed to log.
struct LogBudget {
    max: Option<u64>,
    logged: Mutex<u64>,
}

impl LogBudget {
    fn new(max: Option<u64>) -> Self {
        Self {
            max,
            logged: Mutex::new(0),
        }
    }

    fn try_take(&self) -> bool {
        let mut logged = self.logged.lock();
        if self.max.is_some_and(|max| *logged >= max) {
            return false;
        }
        *logged += 1;
        true
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}... [{} more chars]", &text[..idx], text[idx..].chars().count()),
        None => text.to_string(),
    }
}

fn format_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            let value = value.to_str().unwrap_or("<binary>");
            format!("{}: {}", name, sanitize_header(name.as_str(), value))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Log text for a body: sanitized, then truncated.
pub fn render_body(body: &str, max_chars: usize) -> String {
    truncate(&sanitize(body), max_chars)
}

pub struct RequestLoggingInterceptor {
    config: LoggingInterceptorConfig,
    budget: LogBudget,
}

impl RequestLoggingInterceptor {
    pub fn new(config: LoggingInterceptorConfig) -> Self {
        Self {
            budget: LogBudget::new(config.max_logged),
            config,
        }
    }
}

#[async_trait]
impl Interceptor for RequestLoggingInterceptor {
    fn name(&self) -> &str {
        "request_logging"
    }

    async fn intercept_request(&self, request: AdapterRequest) -> Result<RequestOutcome> {
        if self.budget.try_take() {
            info!(
                request_id = %request.ctx.request_id,
                method = %request.method,
                path = %request.path,
                headers = %format_headers(&request.headers),
                body = %render_body(&request.body.to_string(), self.config.max_body_chars),
                "Outgoing request"
            );
        }
        Ok(RequestOutcome::Continue(request))
    }
}

pub struct ResponseLoggingInterceptor {
    config: LoggingInterceptorConfig,
    budget: LogBudget,
}

impl ResponseLoggingInterceptor {
    pub fn new(config: LoggingInterceptorConfig) -> Self {
        Self {
            budget: LogBudget::new(config.max_logged),
            config,
        }
    }
}

#[async_trait]
impl Interceptor for ResponseLoggingInterceptor {
    fn name(&self) -> &str {
        "response_logging"
    }

    async fn intercept_response(&self, response: AdapterResponse) -> Result<AdapterResponse> {
        if self.budget.try_take() {
            info!(
                request_id = %response.ctx.request_id,
                status = response.status,
                cached = response.ctx.served_from_cache,
                latency_ms = response.ctx.elapsed().as_millis() as u64,
                headers = %format_headers(&response.headers),
                body = %render_body(&String::from_utf8_lossy(&response.body), self.config.max_body_chars),
                "Incoming response"
            );
        }
        Ok(response)
    }
}
