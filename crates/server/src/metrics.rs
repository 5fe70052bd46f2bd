//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the appcache server:
//! - HTTP request metrics (latency, counts)
//! - Cache events seen by the server's listener
//! - Orchestrator status (collected dynamically)
//!
//! Core metrics (update cycles, fetches) are registered in the same registry.

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

use appcache_core::Status;

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
            "appcache_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("appcache_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "appcache_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// Cache Metrics
// =============================================================================

/// Cache events by type.
pub static CACHE_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("appcache_events_total", "Cache events emitted by the orchestrator"),
        &["type"],
    )
    .unwrap()
});

/// Current orchestrator status, one series per status (1 = current).
pub static CACHE_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("appcache_status", "Current orchestrator status"),
        &["status"],
    )
    .unwrap()
});

/// Resources stored so far in the running cycle.
pub static CYCLE_LOADED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "appcache_cycle_loaded",
        "Resources stored in the running update cycle",
    )
    .unwrap()
});

/// Resources the running cycle has to store.
pub static CYCLE_TOTAL: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "appcache_cycle_total",
        "Resources the running update cycle has to store",
    )
    .unwrap()
});

/// Entries held by the persistent cache.
pub static CACHE_ENTRIES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("appcache_cache_entries", "Entries held by the persistent cache").unwrap()
});

// =============================================================================
// Registration
// =============================================================================

const ALL_STATUSES: [Status; 6] = [
    Status::Uncached,
    Status::Idle,
    Status::Checking,
    Status::Downloading,
    Status::UpdateReady,
    Status::Obsolete,
];

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

    // Cache
    registry
        .register(Box::new(CACHE_EVENTS_TOTAL.clone()))
        .unwrap();
    registry.register(Box::new(CACHE_STATUS.clone())).unwrap();
    registry.register(Box::new(CYCLE_LOADED.clone())).unwrap();
    registry.register(Box::new(CYCLE_TOTAL.clone())).unwrap();
    registry.register(Box::new(CACHE_ENTRIES.clone())).unwrap();

    // Core metrics (update cycles, fetches)
    for metric in appcache_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the gauges reflect the orchestrator right now.
pub fn collect_dynamic_metrics(state: &AppState) {
    let snapshot = state.orchestrator().snapshot();
    for status in ALL_STATUSES {
        CACHE_STATUS
            .with_label_values(&[status.as_str()])
            .set(i64::from(status == snapshot.status));
    }
    CYCLE_LOADED.set(snapshot.loaded as i64);
    CYCLE_TOTAL.set(snapshot.total as i64);

    if let Ok(stats) = state.orchestrator().cache().stats() {
        CACHE_ENTRIES.set(stats.entries as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("appcache_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        appcache_core::metrics::UPDATE_CYCLES
            .with_label_values(&["no_update"])
            .inc();
        CACHE_STATUS.with_label_values(&["idle"]).set(1);
        CACHE_EVENTS_TOTAL.with_label_values(&["checking"]).inc();

        let output = encode_metrics();
        assert!(output.contains("appcache_update_cycles_total"));
        assert!(output.contains("appcache_status"));
        assert!(output.contains("appcache_events_total"));
    }
}
