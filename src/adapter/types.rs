//! Request/response envelopes that flow through the interceptor chain,
//! and the traits every pipeline component implements.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::error::Result;
use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, Method};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Per-call state shared by every interceptor that touches the call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Identifier used to correlate log lines for one call.
    pub request_id: String,
    /// Cache key of the outbound request, set once by the caching interceptor.
    pub fingerprint: Option<String>,
    /// True when the response was synthesized from the cache.
    pub served_from_cache: bool,
    /// When the adapter accepted the call.
    pub started_at: Instant,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            fingerprint: None,
            served_from_cache: false,
            started_at: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(format!("req_{}", uuid::Uuid::new_v4().simple()))
    }
}

/// An inbound harness call on its way to the model endpoint.
#[derive(Debug, Clone)]
pub struct AdapterRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
    pub ctx: RequestContext,
}

impl AdapterRequest {
    /// A POST with an empty header map, as the harness sends them.
    pub fn new(body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            path: "/v1/chat/completions".to_string(),
            headers: HeaderMap::new(),
            body,
            ctx: RequestContext::default(),
        }
    }
}

/// A model response on its way back to the harness.
#[derive(Debug, Clone)]
pub struct AdapterResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub ctx: RequestContext,
}

impl AdapterResponse {
    pub fn new(status: u16, body: impl Into<Bytes>, ctx: RequestContext) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            ctx,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// Parse the body as JSON, if it is JSON.
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }

    pub fn set_json(&mut self, value: &serde_json::Value) -> Result<()> {
        self.body = Bytes::from(serde_json::to_vec(value)?);
        Ok(())
    }
}

/// Case-insensitive header maps are stored as plain sorted string maps.
///
/// Repeated headers (e.g. `set-cookie`) are joined with `\n`, which can
/// never occur inside a header value. Values that are not valid UTF-8 are
/// stored lossily with U+FFFD replacements.
pub fn headers_to_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let text = String::from_utf8_lossy(value.as_bytes());
        map.entry(name.as_str().to_string())
            .and_modify(|joined| {
                joined.push(HEADER_VALUE_SEPARATOR);
                joined.push_str(&text);
            })
            .or_insert_with(|| text.into_owned());
    }
    map
}

pub fn map_to_headers(map: &BTreeMap<String, String>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, joined) in map {
        let Ok(name) = axum::http::HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        for value in joined.split(HEADER_VALUE_SEPARATOR) {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.append(name.clone(), value);
            }
        }
    }
    headers
}

const HEADER_VALUE_SEPARATOR: char = '\n';

/// What the request phase of an interceptor decided.
#[derive(Debug)]
pub enum RequestOutcome {
    /// Hand the (possibly modified) request to the next interceptor.
    Continue(AdapterRequest),
    /// Stop the request phase and answer with this response.
    ShortCircuit(AdapterResponse),
}

/// A request/response policy applied to every call.
#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &str;

    async fn intercept_request(&self, request: AdapterRequest) -> Result<RequestOutcome> {
        Ok(RequestOutcome::Continue(request))
    }

    async fn intercept_response(&self, response: AdapterResponse) -> Result<AdapterResponse> {
        Ok(response)
    }

    /// Called once before the adapter accepts calls.
    async fn on_start(&self) -> Result<()> {
        Ok(())
    }

    /// Called once after the last call has completed.
    async fn on_shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Shared facts handed to lifecycle hooks.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub output_dir: PathBuf,
    /// Names of every active component, interceptors first.
    pub components: Vec<String>,
}

/// A pre- or post-evaluation action run exactly once.
#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    async fn run(&self, ctx: &HookContext) -> Result<()>;
}
