//! Batching metrics, following the teacher's Prometheus naming
//! conventions (`prometheus` + `lazy_static`), trimmed to what this
//! agent actually produces — no MCP, cache, or circuit-breaker metrics.

use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    histogram_opts, opts, register_histogram, register_int_counter, register_int_counter_vec,
    Encoder, Histogram, IntCounter, IntCounterVec, Registry, TextEncoder,
};

lazy_static! {
    pub static ref BATCH_REQUESTS_TOTAL: IntCounter = register_int_counter!(
        "batch_sidecar_requests_total",
        "Total number of requests submitted to the batcher"
    )
    .unwrap();

    pub static ref BATCH_COUNT_TOTAL: IntCounter = register_int_counter!(
        "batch_sidecar_batches_total",
        "Total number of batches formed"
    )
    .unwrap();

    pub static ref BACKEND_CALLS_TOTAL: IntCounter = register_int_counter!(
        "batch_sidecar_backend_calls_total",
        "Total number of backend calls issued (one per distinct group)"
    )
    .unwrap();

    pub static ref BATCH_SIZE: Histogram = register_histogram!(histogram_opts!(
        "batch_sidecar_batch_size",
        "Number of requests admitted per batch",
        vec![1.0, 2.0, 3.0, 5.0, 10.0, 20.0, 50.0]
    ))
    .unwrap();

    pub static ref BACKEND_REQUEST_OUTCOME: IntCounterVec = register_int_counter_vec!(
        opts!(
            "batch_sidecar_backend_request_outcome_total",
            "Backend call outcomes"
        ),
        &["backend", "operation", "outcome"]
    )
    .unwrap();

    pub static ref REGISTRY: Registry = {
        let registry = Registry::new();
        registry.register(Box::new(BATCH_REQUESTS_TOTAL.clone())).unwrap();
        registry.register(Box::new(BATCH_COUNT_TOTAL.clone())).unwrap();
        registry.register(Box::new(BACKEND_CALLS_TOTAL.clone())).unwrap();
        registry.register(Box::new(BATCH_SIZE.clone())).unwrap();
        registry.register(Box::new(BACKEND_REQUEST_OUTCOME.clone())).unwrap();
        registry
    };
}

/// Record one formed batch: its size and the number of distinct groups
/// (= backend calls) it produced.
pub fn record_batch(batch_size: usize, group_count: usize) {
    BATCH_REQUESTS_TOTAL.inc_by(batch_size as u64);
    BATCH_COUNT_TOTAL.inc();
    BACKEND_CALLS_TOTAL.inc_by(group_count as u64);
    BATCH_SIZE.observe(batch_size as f64);
}

/// Record the outcome of a single backend call for a given operation.
pub fn record_backend_outcome(backend: &str, operation: &str, success: bool) {
    let outcome = if success { "success" } else { "error" };
    BACKEND_REQUEST_OUTCOME.with_label_values(&[backend, operation, outcome]).inc();
}

/// `GET /metrics` handler shared by both agents.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (StatusCode::OK, [("Content-Type", "text/plain; version=0.0.4")], buffer),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("Content-Type", "text/plain")],
                b"failed to export metrics".to_vec(),
            )
        },
    }
}
