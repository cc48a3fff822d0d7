// Metrics module for Prometheus observability
// Author: kelexine (https://github.com/kelexine)

mod registry;

pub use registry::{
    gather_metrics,
    CACHE_OPERATIONS,
    CACHE_SAVES_SKIPPED,
    INTERCEPTOR_FAILURES,
    PROGRESS_REPORTS,
    REQUESTS_TOTAL,
    REQUEST_DURATION,
    UPSTREAM_CALLS,
    UPSTREAM_DURATION,
};

/// Helper to record one call through the pipeline
pub fn record_request(status_code: u16, cached: bool, duration_secs: f64) {
    let cached = cached.to_string();
    REQUESTS_TOTAL
        .with_label_values(&[&status_code.to_string(), &cached])
        .inc();

    REQUEST_DURATION
        .with_label_values(&[&cached])
        .observe(duration_secs);
}

/// Helper to record a forwarded call
pub fn record_upstream_call(status_code: u16, duration_secs: f64) {
    let status = status_code.to_string();
    UPSTREAM_CALLS.with_label_values(&[&status]).inc();
    UPSTREAM_DURATION
        .with_label_values(&[&status])
        .observe(duration_secs);
}

pub fn record_cache_hit() {
    CACHE_OPERATIONS.with_label_values(&["hit"]).inc();
}

pub fn record_cache_miss() {
    CACHE_OPERATIONS.with_label_values(&["miss"]).inc();
}

pub fn record_cache_write() {
    CACHE_OPERATIONS.with_label_values(&["write"]).inc();
}

pub fn record_save_skipped(kind: &str) {
    CACHE_SAVES_SKIPPED.with_label_values(&[kind]).inc();
}

pub fn record_progress_report(success: bool) {
    let status = if success { "success" } else { "failure" };
    PROGRESS_REPORTS.with_label_values(&[status]).inc();
}

pub fn record_interceptor_failure(interceptor: &str) {
    INTERCEPTOR_FAILURES.with_label_values(&[interceptor]).inc();
}
