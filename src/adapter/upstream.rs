// Upstream model endpoint client
// Author: kelexine (https://github.com/kelexine)

use super::types::{AdapterRequest, AdapterResponse};
use crate::config::UpstreamConfig;
use crate::error::{AdapterError, Result};
use async_trait::async_trait;
use axum::http::{header, HeaderMap, HeaderName};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Headers that describe a single hop and must not be forwarded.
fn hop_headers() -> [HeaderName; 7] {
    [
        header::HOST,
        header::CONTENT_LENGTH,
        header::CONNECTION,
        header::TRANSFER_ENCODING,
        header::ACCEPT_ENCODING,
        header::CONTENT_ENCODING,
        header::UPGRADE,
    ]
}

/// The real model endpoint, called when no interceptor short-circuited.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn send(&self, request: &AdapterRequest) -> Result<AdapterResponse>;
}

/// Build the shared HTTP client used for upstream calls and progress reports.
///
/// No overall request timeout is set: the harness controls cancellation.
pub fn build_http_client(config: &UpstreamConfig) -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
        .pool_max_idle_per_host(32)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .tcp_nodelay(true)
        .use_rustls_tls()
        .build()
        .map_err(|e| AdapterError::Internal(format!("Failed to create HTTP client: {}", e)))
}

fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut out = headers.clone();
    for name in hop_headers() {
        out.remove(&name);
    }
    out
}

/// Forwards every call to one fixed endpoint URL.
pub struct HttpUpstream {
    client: Client,
    url: String,
}

impl HttpUpstream {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn send(&self, request: &AdapterRequest) -> Result<AdapterResponse> {
        debug!(request_id = %request.ctx.request_id, "Forwarding to {}", self.url);
        let start = Instant::now();

        let response = self
            .client
            .request(request.method.clone(), &self.url)
            .headers(forwardable(&request.headers))
            .json(&request.body)
            .send()
            .await
            .map_err(|e| {
                error!(request_id = %request.ctx.request_id, "Upstream call failed: {}", e);
                crate::metrics::record_upstream_call(0, start.elapsed().as_secs_f64());
                AdapterError::Upstream(format!("HTTP error: {}", e))
            })?;

        let status = response.status().as_u16();
        let headers = forwardable(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| AdapterError::Upstream(format!("Failed to read response body: {}", e)))?;

        crate::metrics::record_upstream_call(status, start.elapsed().as_secs_f64());
        debug!(
            request_id = %request.ctx.request_id,
            "Upstream answered HTTP {} ({} bytes)",
            status,
            body.len()
        );

        Ok(AdapterResponse {
            status,
            headers,
            body,
            ctx: request.ctx.clone(),
        })
    }
}
