// Prometheus registry and collectors for the adapter
// Author: kelexine (https://github.com/kelexine)

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec_with_registry, register_histogram_vec_with_registry, CounterVec,
    Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    /// Adapter-local Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // PIPELINE METRICS
    // ============================================================================

    /// Calls processed by the pipeline
    pub static ref REQUESTS_TOTAL: CounterVec = register_counter_vec_with_registry!(
        Opts::new("adapter_requests_total", "Total calls processed by the adapter pipeline"),
        &["status_code", "cached"],
        REGISTRY
    ).unwrap();

    /// End-to-end pipeline latency
    pub static ref REQUEST_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        HistogramOpts::new("adapter_request_duration_seconds", "Pipeline latency in seconds")
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["cached"],
        REGISTRY
    ).unwrap();

    /// Interceptor errors swallowed in the response phase
    pub static ref INTERCEPTOR_FAILURES: CounterVec = register_counter_vec_with_registry!(
        Opts::new("adapter_interceptor_failures_total", "Response-phase interceptor failures"),
        &["interceptor"],
        REGISTRY
    ).unwrap();

    // ============================================================================
    // UPSTREAM METRICS
    // ============================================================================

    /// Calls forwarded to the model endpoint
    pub static ref UPSTREAM_CALLS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("adapter_upstream_calls_total", "Calls forwarded to the model endpoint"),
        &["status_code"],
        REGISTRY
    ).unwrap();

    /// Model endpoint latency
    pub static ref UPSTREAM_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        HistogramOpts::new("adapter_upstream_duration_seconds", "Model endpoint latency in seconds")
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        &["status_code"],
        REGISTRY
    ).unwrap();

    // ============================================================================
    // CACHE METRICS
    // ============================================================================

    /// Cache operations
    pub static ref CACHE_OPERATIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("adapter_cache_operations_total", "Total cache operations"),
        &["operation"], // operation: hit, miss, write
        REGISTRY
    ).unwrap();

    /// Saves skipped because a save limit was reached
    pub static ref CACHE_SAVES_SKIPPED: CounterVec = register_counter_vec_with_registry!(
        Opts::new("adapter_cache_saves_skipped_total", "Saves skipped at the save limit"),
        &["kind"], // kind: requests, responses
        REGISTRY
    ).unwrap();

    // ============================================================================
    // PROGRESS METRICS
    // ============================================================================

    /// Progress reports sent to the listener
    pub static ref PROGRESS_REPORTS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("adapter_progress_reports_total", "Progress reports emitted"),
        &["status"], // status: success, failure
        REGISTRY
    ).unwrap();
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
