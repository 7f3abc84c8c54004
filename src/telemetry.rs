//! Telemetry metric name constants.
//!
//! Consumers install their own `metrics` recorder (e.g. prometheus, statsd);
//! without a recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `querycache_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `model`: resource name of the intercepted call (e.g. "User")
//! - `strategy`: "passthrough", "auto", "explicit", or "invalid" for a rejected directive
//! - `status`: "ok" or "error"

/// Total intercepted calls.
///
/// Labels: `model`, `strategy`, `status`.
pub const QUERIES_TOTAL: &str = "querycache_queries_total";

/// Intercepted call duration in seconds, cache lookups included.
///
/// Labels: `model`, `strategy`.
pub const QUERY_DURATION_SECONDS: &str = "querycache_query_duration_seconds";

/// Explicit-cache hits.
///
/// Labels: `model`.
pub const CACHE_HITS_TOTAL: &str = "querycache_cache_hits_total";

/// Explicit-cache misses (corrupt entries included).
///
/// Labels: `model`.
pub const CACHE_MISSES_TOTAL: &str = "querycache_cache_misses_total";

/// Auto-cache calls that joined a computation already in flight.
///
/// Labels: `model`.
pub const DEDUP_JOINED_TOTAL: &str = "querycache_dedup_joined_total";

/// Cache writes that failed after a successful computation.
///
/// Labels: `model`.
pub const CACHE_WRITE_FAILURES_TOTAL: &str = "querycache_cache_write_failures_total";

/// Cached values that could not be decoded and were treated as misses.
///
/// Labels: `model`.
pub const CACHE_DECODE_FAILURES_TOTAL: &str = "querycache_cache_decode_failures_total";
