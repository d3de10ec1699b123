//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Upstream requests (per strategy and outcome)
//! - Response caches (hits and misses)
//! - Pacing (rate limiter and burst throttle waits)
//! - Resolver lookups

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Upstream Requests
// =============================================================================

/// Upstream requests by strategy and outcome.
pub static UPSTREAM_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "douban_meta_upstream_requests_total",
            "Total requests sent to the Douban upstream",
        ),
        &["strategy", "outcome"], // "success", "http_error", "transport_error", "cancelled"
    )
    .unwrap()
});

/// Upstream request duration in seconds.
pub static UPSTREAM_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "douban_meta_upstream_request_duration_seconds",
            "Duration of upstream HTTP requests",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["strategy"],
    )
    .unwrap()
});

// =============================================================================
// Caches
// =============================================================================

/// Cache lookups by cache and result.
pub static CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("douban_meta_cache_lookups_total", "Response cache lookups"),
        &["cache", "result"], // "hit", "miss"
    )
    .unwrap()
});

// =============================================================================
// Pacing
// =============================================================================

/// Waits imposed before a request went out.
pub static THROTTLE_WAITS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "douban_meta_throttle_waits_total",
            "Times a request was held back before sending",
        ),
        &["source"], // "rate_limiter", "burst"
    )
    .unwrap()
});

/// Length of completed waits in seconds.
pub static THROTTLE_WAIT_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "douban_meta_throttle_wait_seconds",
            "Time spent waiting before sending a request",
        )
        .buckets(vec![0.5, 1.0, 2.0, 3.0, 4.0, 5.0, 7.0, 10.0]),
        &["source"],
    )
    .unwrap()
});

// =============================================================================
// Resolver
// =============================================================================

/// Metadata lookups by media kind and result.
pub static LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("douban_meta_lookups_total", "Metadata lookups"),
        &["kind", "result"], // "found", "not_found", "cancelled", "error"
    )
    .unwrap()
});

/// Collectors to register with a server registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Upstream
        Box::new(UPSTREAM_REQUESTS.clone()),
        Box::new(UPSTREAM_REQUEST_DURATION.clone()),
        // Caches
        Box::new(CACHE_LOOKUPS.clone()),
        // Pacing
        Box::new(THROTTLE_WAITS.clone()),
        Box::new(THROTTLE_WAIT_SECONDS.clone()),
        // Resolver
        Box::new(LOOKUPS.clone()),
    ]
}
