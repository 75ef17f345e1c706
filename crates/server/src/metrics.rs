//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the ferry server:
//! - HTTP request metrics (latency, counts)
//! - Registered and running migrations (collected dynamically)
//! - Migration run and bulk metrics from `ferry_core::metrics`

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use tracing::warn;

use crate::state::AppState;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "ferry_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ferry_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "ferry_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Migration Metrics (collected dynamically)
// =============================================================================

pub static MIGRATIONS_REGISTERED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "ferry_migrations_registered",
        "Number of registered migrations",
    )
    .unwrap()
});

/// Steps running in this process.
pub static MIGRATIONS_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "ferry_migrations_running",
        "Number of migration steps running in this process",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Migrations
    registry
        .register(Box::new(MIGRATIONS_REGISTERED.clone()))
        .unwrap();
    registry
        .register(Box::new(MIGRATIONS_RUNNING.clone()))
        .unwrap();

    // Core metrics (runs, polls, bulk commands)
    for metric in ferry_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Update gauges from the current application state before encoding.
pub fn collect_dynamic_metrics(state: &AppState) {
    let service = state.migrations();
    let ids = service.registry().ids();
    let running = ids.iter().filter(|id| service.is_running(id)).count();

    MIGRATIONS_REGISTERED.set(ids.len() as i64);
    MIGRATIONS_RUNNING.set(running as i64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_http_and_core_metrics() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/api/v1/health", "200"])
            .inc();
        ferry_core::metrics::POLL_ITERATIONS
            .with_label_values(&["encode-test"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("ferry_http_requests_total"));
        assert!(output.contains("ferry_migration_poll_iterations_total"));
        assert!(output.contains("encode-test"));
    }
}
