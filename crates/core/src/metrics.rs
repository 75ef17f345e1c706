//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Migration runs (results, duration, polling)
//! - Bulk commands (submissions, processed records)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Migration Metrics
// =============================================================================

/// Migration step runs by result.
pub static MIGRATION_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("ferry_migration_runs_total", "Total migration step runs"),
        &["migration", "result"], // result: "completed", "shutdown", "failed"
    )
    .unwrap()
});

/// Migration step run duration in seconds.
pub static RUN_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "ferry_migration_run_duration_seconds",
            "Duration of migration step runs",
        )
        .buckets(vec![
            0.1, 0.5, 1.0, 5.0, 30.0, 60.0, 300.0, 1800.0, 3600.0, 14400.0,
        ]),
        &["migration"],
    )
    .unwrap()
});

/// Status poll iterations performed by the orchestrator.
pub static POLL_ITERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ferry_migration_poll_iterations_total",
            "Total bulk status polling iterations",
        ),
        &["migration"],
    )
    .unwrap()
});

// =============================================================================
// Bulk Metrics
// =============================================================================

/// Bulk commands submitted by action.
pub static BULK_COMMANDS_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ferry_bulk_commands_submitted_total",
            "Total bulk commands submitted",
        ),
        &["action"],
    )
    .unwrap()
});

/// Records handed to computations by action.
pub static RECORDS_PROCESSED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "ferry_bulk_records_processed_total",
            "Total records processed by bulk computations",
        ),
        &["action"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Migrations
        Box::new(MIGRATION_RUNS.clone()),
        Box::new(RUN_DURATION.clone()),
        Box::new(POLL_ITERATIONS.clone()),
        // Bulk
        Box::new(BULK_COMMANDS_SUBMITTED.clone()),
        Box::new(RECORDS_PROCESSED.clone()),
    ]
}
