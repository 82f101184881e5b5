//! Telemetry metric name constants.
//!
//! Centralised metric names for huginn operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `huginn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider`: provider name (e.g. "gemini", "openai", "mistral")
//! - `status`: outcome: "ok", "cached" or "error"
//! - `category`: retry error category (e.g. "rate_limited")
//! - `reason`: eviction reason: "expired", "count" or "size"

/// Total chat requests handled by the facade.
///
/// Labels: `provider`, `status` ("ok" | "cached" | "error").
pub const REQUESTS_TOTAL: &str = "huginn_requests_total";

/// End-to-end request duration in seconds, including retries.
///
/// Labels: `provider`.
pub const REQUEST_DURATION_SECONDS: &str = "huginn_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `provider`, `category`.
pub const RETRIES_TOTAL: &str = "huginn_retries_total";

/// Total response cache hits.
///
/// Labels: `provider`.
pub const CACHE_HITS_TOTAL: &str = "huginn_cache_hits_total";

/// Total response cache misses (including expired entries).
///
/// Labels: `provider`.
pub const CACHE_MISSES_TOTAL: &str = "huginn_cache_misses_total";

/// Total entries removed from the response cache.
///
/// Labels: `reason` ("expired" | "count" | "size").
pub const CACHE_EVICTIONS_TOTAL: &str = "huginn_cache_evictions_total";

/// Current number of entries in the response cache.
pub const CACHE_ENTRIES: &str = "huginn_cache_entries";
