//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Update cycles (results, durations, stalls)
//! - Manifest and resource fetches

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Update Cycle Metrics
// =============================================================================

/// Finished update cycles by result.
pub static UPDATE_CYCLES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("appcache_update_cycles_total", "Total finished update cycles"),
        &["result"], // "no_update", "update_ready", "obsolete", "aborted"
    )
    .unwrap()
});

/// Update cycle duration in seconds.
pub static UPDATE_CYCLE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "appcache_update_cycle_duration_seconds",
            "Duration of update cycles from manifest fetch to their final state",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0]),
        &["result"],
    )
    .unwrap()
});

/// Stalled downloads detected by the watchdog.
pub static STALL_DETECTIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "appcache_stall_detections_total",
        "Watchdog periods that passed without download progress",
    )
    .unwrap()
});

/// Completions dropped because their cycle was aborted or superseded.
pub static STALE_COMPLETIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "appcache_stale_completions_total",
        "Fetch completions dropped because their cycle is no longer live",
    )
    .unwrap()
});

// =============================================================================
// Fetch Metrics
// =============================================================================

/// Manifest fetches by result.
pub static MANIFEST_FETCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("appcache_manifest_fetches_total", "Total manifest fetches"),
        &["result"], // "fetched", "not_modified", "failed"
    )
    .unwrap()
});

/// Resource fetches by result.
pub static RESOURCE_FETCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("appcache_resource_fetches_total", "Total resource fetches"),
        &["result"], // "stored", "failed"
    )
    .unwrap()
});

/// Bytes of resource bodies written to the cache.
pub static RESOURCE_BYTES_STORED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "appcache_resource_bytes_stored_total",
        "Total bytes of resource bodies stored",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Cycles
        Box::new(UPDATE_CYCLES.clone()),
        Box::new(UPDATE_CYCLE_DURATION.clone()),
        Box::new(STALL_DETECTIONS.clone()),
        Box::new(STALE_COMPLETIONS.clone()),
        // Fetches
        Box::new(MANIFEST_FETCHES.clone()),
        Box::new(RESOURCE_FETCHES.clone()),
        Box::new(RESOURCE_BYTES_STORED.clone()),
    ]
}
