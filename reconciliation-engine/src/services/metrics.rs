//! Prometheus metrics for the reconciliation engine.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Counter for engine operations by name and status.
pub static ENGINE_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_engine_operations_total",
        "Total number of reconciliation engine operations",
        &["operation", "status"]
    )
    .expect("Failed to register ENGINE_OPERATIONS")
});

/// Counter for backend calls by method and status.
pub static BACKEND_CALLS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_backend_calls_total",
        "Total number of backend calls",
        &["method", "status"]
    )
    .expect("Failed to register BACKEND_CALLS")
});

/// Histogram for backend call duration by method.
pub static BACKEND_CALL_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "reconciliation_backend_call_duration_seconds",
        "Backend call duration in seconds",
        &["method"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register BACKEND_CALL_DURATION")
});

/// Counter for tax computations by outcome.
pub static TAX_COMPUTATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_tax_computations_total",
        "Total number of tax computation round-trips",
        &["status"]
    )
    .expect("Failed to register TAX_COMPUTATIONS")
});

/// Counter for lines marked reconciled, by policy.
pub static LINES_RECONCILED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "reconciliation_lines_reconciled_total",
        "Total number of reconciled lines",
        &["policy"]
    )
    .expect("Failed to register LINES_RECONCILED")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&ENGINE_OPERATIONS);
    Lazy::force(&BACKEND_CALLS);
    Lazy::force(&BACKEND_CALL_DURATION);
    Lazy::force(&TAX_COMPUTATIONS);
    Lazy::force(&LINES_RECONCILED);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record an engine operation.
pub fn record_operation(operation: &str, status: &str) {
    ENGINE_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
}

/// Record a backend call.
pub fn record_backend_call(method: &str, status: &str) {
    BACKEND_CALLS.with_label_values(&[method, status]).inc();
}

/// Record backend call duration.
pub fn record_backend_call_duration(method: &str, duration_secs: f64) {
    BACKEND_CALL_DURATION
        .with_label_values(&[method])
        .observe(duration_secs);
}

/// Record a tax computation.
pub fn record_tax_computation(status: &str) {
    TAX_COMPUTATIONS.with_label_values(&[status]).inc();
}

/// Record reconciled lines.
pub fn record_lines_reconciled(policy: &str, count: usize) {
    LINES_RECONCILED
        .with_label_values(&[policy])
        .inc_by(count as f64);
}
