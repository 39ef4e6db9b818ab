//! Metrics and observability utilities
//!
//! Metric descriptions and recording helpers for the `metrics` facade.
//! The gateway installs the Prometheus recorder; without a recorder every
//! helper here is a no-op.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all CiteGraph metrics
pub const METRICS_PREFIX: &str = "citegraph";

/// Buckets for bibliographic API latency (in seconds)
pub const UPSTREAM_BUCKETS: &[f64] = &[
    0.050,  // 50ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_bibliographic_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total bibliographic API requests"
    );

    describe_histogram!(
        format!("{}_bibliographic_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Bibliographic API latency in seconds"
    );

    describe_counter!(
        format!("{}_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total depth cache hits"
    );

    describe_counter!(
        format!("{}_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total depth cache misses"
    );

    describe_counter!(
        format!("{}_graph_builds_total", METRICS_PREFIX),
        Unit::Count,
        "Graph depths built from the bibliographic API"
    );

    describe_counter!(
        format!("{}_reveal_steps_total", METRICS_PREFIX),
        Unit::Count,
        "Nodes appended to the live graph"
    );

    describe_counter!(
        format!("{}_reveals_superseded_total", METRICS_PREFIX),
        Unit::Count,
        "Reveals stopped by a newer depth change"
    );

    describe_gauge!(
        format!("{}_live_graph_nodes", METRICS_PREFIX),
        Unit::Count,
        "Nodes in the live graph"
    );

    tracing::info!("Metrics registered");
}

/// Times one bibliographic API request
pub struct UpstreamTimer {
    start: Instant,
    operation: &'static str,
}

impl UpstreamTimer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }

    /// Record request completion
    pub fn finish(self, success: bool) {
        let status = if success { "success" } else { "error" };

        counter!(
            format!("{}_bibliographic_requests_total", METRICS_PREFIX),
            "operation" => self.operation,
            "status" => status
        )
        .increment(1);

        histogram!(
            format!("{}_bibliographic_duration_seconds", METRICS_PREFIX),
            "operation" => self.operation
        )
        .record(self.start.elapsed().as_secs_f64());
    }
}

/// Helper to record cache metrics
pub fn record_cache(hit: bool, cache_name: &str) {
    let name = if hit { "cache_hits_total" } else { "cache_misses_total" };
    counter!(
        format!("{}_{}", METRICS_PREFIX, name),
        "cache" => cache_name.to_string()
    )
    .increment(1);
}

/// Helper to record a depth built from the API
pub fn record_graph_build(depth: u32) {
    counter!(
        format!("{}_graph_builds_total", METRICS_PREFIX),
        "depth" => depth.to_string()
    )
    .increment(1);
}

/// Helper to record reveal progress
pub fn record_reveal(steps: usize, superseded: bool, live_nodes: usize) {
    counter!(format!("{}_reveal_steps_total", METRICS_PREFIX)).increment(steps as u64);

    if superseded {
        counter!(format!("{}_reveals_superseded_total", METRICS_PREFIX)).increment(1);
    }

    gauge!(format!("{}_live_graph_nodes", METRICS_PREFIX)).set(live_nodes as f64);
}
