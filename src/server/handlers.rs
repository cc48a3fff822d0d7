// HTTP request handlers
// Author: kelexine (https://github.com/kelexine)

use super::routes::AppState;
use crate::adapter::{AdapterRequest, AdapterResponse, RequestContext};
use crate::error::{AdapterError, Result};
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// Active pipeline components in configured order.
    pub components: Vec<String>,
    pub uptime_seconds: u64,
    pub timestamp: String,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        components: state.pipeline.components().to_vec(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::gather_metrics(),
    )
}

fn request_id(headers: &HeaderMap) -> RequestContext {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(RequestContext::new)
        .unwrap_or_default()
}

fn parse_body(body: &Bytes) -> Result<serde_json::Value> {
    if body.is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_slice(body)
        .map_err(|e| AdapterError::InvalidRequest(format!("JSON deserialization error: {}", e)))
}

fn into_http(response: AdapterResponse) -> Result<Response> {
    let status = StatusCode::from_u16(response.status).map_err(|e| {
        AdapterError::Upstream(format!("invalid upstream status {}: {}", response.status, e))
    })?;

    let mut http = Response::new(Body::from(response.body));
    *http.status_mut() = status;
    *http.headers_mut() = response.headers;
    Ok(http)
}

/// Every harness call: run it through the pipeline and mirror the result.
pub async fn proxy_handler(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> std::result::Result<Response, AdapterError> {
    let ctx = request_id(&headers);
    let body = parse_body(&body).map_err(|e| {
        warn!(request_id = %ctx.request_id, "Rejected request: {}", e);
        e
    })?;
    debug!(request_id = %ctx.request_id, "{} {}", method, uri.path());

    let request = AdapterRequest {
        method,
        path: uri.path().to_string(),
        headers,
        body,
        ctx,
    };
    let request_id = request.ctx.request_id.clone();

    match state.pipeline.process(request).await {
        Ok(response) => into_http(response),
        Err(e) => {
            error!(request_id = %request_id, "Call failed: {}", e);
            Err(e)
        }
    }
}
