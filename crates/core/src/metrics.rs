//! Prometheus metrics for core components.

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

/// Promotion attempts by result.
pub static PROMOTION_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("bumper_promotion_attempts_total", "Total promotion attempts"),
        &["result"], // "success", "failed", "no_candidate"
    )
    .unwrap()
});

/// Pipeline step failures by step name.
pub static STEP_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "bumper_pipeline_step_failures_total",
            "Total pipeline step failures",
        ),
        &["step"],
    )
    .unwrap()
});

/// Candidate tokens extracted from the upstream site.
pub static TOKENS_EXTRACTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "bumper_tokens_extracted_total",
        "Total candidate tokens inserted by extraction",
    )
    .unwrap()
});

/// Auto-reset cycles triggered by a fully drained ledger.
pub static CYCLE_RESETS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "bumper_cycle_resets_total",
        "Total automatic ledger reset cycles",
    )
    .unwrap()
});

/// Upstream requests by operation and status.
pub static UPSTREAM_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "bumper_upstream_requests_total",
            "Total upstream API requests",
        ),
        &["operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

/// Upstream request duration by operation.
pub static UPSTREAM_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "bumper_upstream_duration_seconds",
            "Duration of upstream API requests",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["operation"],
    )
    .unwrap()
});

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(PROMOTION_ATTEMPTS.clone()),
        Box::new(STEP_FAILURES.clone()),
        Box::new(TOKENS_EXTRACTED.clone()),
        Box::new(CYCLE_RESETS.clone()),
        Box::new(UPSTREAM_REQUESTS.clone()),
        Box::new(UPSTREAM_DURATION.clone()),
    ]
}
