// HTTP routes configuration
// Author: kelexine (https://github.com/kelexine)

use super::handlers::{health_handler, metrics_handler, proxy_handler};
use super::middleware::request_id_layers;
use crate::adapter::AdapterPipeline;
use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AdapterPipeline>,
    pub started_at: Instant,
}

pub fn create_router(pipeline: Arc<AdapterPipeline>, max_body_bytes: usize) -> Router {
    let state = AppState {
        pipeline,
        started_at: Instant::now(),
    };

    let (set_request_id, propagate_request_id) = request_id_layers();

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        // Anything else belongs to the harness and goes through the pipeline
        .fallback(proxy_handler)
        .layer(tower_http::limit::RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(propagate_request_id)
        .layer(set_request_id)
        .with_state(state)
}
