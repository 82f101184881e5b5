//! Quality-aware response cache.
//!
//! [`ResponseCache`] is a content-addressed store of previous
//! (prompt, provider, model, params, context) → response. Every entry
//! carries a heuristic [quality score](quality::score_response) and a
//! [dynamic TTL](ttl::TtlPolicy) derived from the request classification.
//!
//! # Eviction
//!
//! Runs after every [`set`](ResponseCache::set) and [`import`](ResponseCache::import):
//!
//! 1. drop every expired entry;
//! 2. if the count still exceeds `max_entries`, rank the rest by
//!    `access_count + quality_score * eviction_quality_weight` and drop the
//!    lowest fifth (or more, whatever it takes to get back under the bound);
//! 3. while the estimated size exceeds `max_size_bytes`, drop the least
//!    recently accessed 30%.
//!
//! After either call returns, `len() <= max_entries` and
//! `estimated_size_bytes() <= max_size_bytes`.
//!
//! All state sits behind a single mutex. Critical sections are short and
//! never await, so a `std::sync::Mutex` is enough.

pub mod clock;
pub mod key;
pub mod quality;
pub mod snapshot;
pub mod ttl;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::{CacheQuery, cache_key, context_digest, normalize_prompt};
pub use quality::{QualityWeights, score_response};
pub use snapshot::{CacheSnapshot, ImportStatus, SNAPSHOT_VERSION};
pub use ttl::{TtlMultipliers, TtlPolicy};

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::telemetry;
use crate::types::{Provider, ProviderParams, RequestClassification};

/// Fixed per-entry bookkeeping overhead assumed by the size estimate.
const ENTRY_OVERHEAD_BYTES: usize = 256;

/// A cached provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub response: String,
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
    pub provider: Provider,
    pub model: String,
    pub params: ProviderParams,
    pub classification: RequestClassification,
    pub access_count: u64,
    pub last_accessed_ms: u64,
    /// 0 to 10.
    pub quality_score: f32,
}

impl CacheEntry {
    /// Approximate in-memory footprint.
    pub fn estimated_size(&self) -> usize {
        self.key.len() + self.response.len() + self.model.len() + ENTRY_OVERHEAD_BYTES
    }

    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

/// Configuration for [`ResponseCache`].
///
/// ```rust
/// # use huginn::CacheConfig;
/// let config = CacheConfig::new()
///     .max_entries(1_000)
///     .max_size_bytes(10 * 1024 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether the facade consults the cache at all. Default: true.
    pub enabled: bool,
    /// Default: 500.
    pub max_entries: usize,
    /// Default: 5 MiB.
    pub max_size_bytes: usize,
    pub ttl: TtlPolicy,
    pub quality: QualityWeights,
    /// Weight of the quality score against the access count when ranking
    /// entries for count eviction. Default: 2.0.
    pub eviction_quality_weight: f64,
    /// Share of entries dropped by a count eviction pass. Default: 0.2.
    pub count_eviction_fraction: f64,
    /// Share of entries dropped per size eviction round. Default: 0.3.
    pub size_eviction_fraction: f64,
    /// On every hit, push `expires_at` to at least `now + ttl.min`.
    /// Default: false.
    pub extend_on_hit: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 500,
            max_size_bytes: 5 * 1024 * 1024,
            ttl: TtlPolicy::default(),
            quality: QualityWeights::default(),
            eviction_quality_weight: 2.0,
            count_eviction_fraction: 0.2,
            size_eviction_fraction: 0.3,
            extend_on_hit: false,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n;
        self
    }

    pub fn max_size_bytes(mut self, n: usize) -> Self {
        self.max_size_bytes = n;
        self
    }

    pub fn ttl(mut self, ttl: TtlPolicy) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn quality(mut self, weights: QualityWeights) -> Self {
        self.quality = weights;
        self
    }

    pub fn eviction_quality_weight(mut self, weight: f64) -> Self {
        self.eviction_quality_weight = weight;
        self
    }

    pub fn extend_on_hit(mut self, extend: bool) -> Self {
        self.extend_on_hit = extend;
        self
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub size_bytes: usize,
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    /// Entries removed by the count or size passes.
    pub evictions: u64,
    /// Entries removed because their TTL ran out.
    pub expirations: u64,
    /// Responses refused because they alone exceed `max_size_bytes`.
    pub rejected: u64,
}

impl CacheStats {
    /// Hits over lookups, 0 when nothing was looked up yet.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    size_bytes: usize,
    stats: CacheStats,
}

impl CacheState {
    fn insert(&mut self, entry: CacheEntry) {
        self.size_bytes += entry.estimated_size();
        if let Some(old) = self.entries.insert(entry.key.clone(), entry) {
            self.size_bytes -= old.estimated_size();
        }
    }

    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(key)?;
        self.size_bytes -= removed.estimated_size();
        Some(removed)
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.size_bytes = 0;
    }

    fn purge_expired(&mut self, now_ms: u64) -> usize {
        let expired: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.is_expired_at(now_ms))
            .map(|e| e.key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        self.stats.expirations += expired.len() as u64;
        expired.len()
    }
}

/// In-memory, quality-ranked, TTL-bounded response cache.
///
/// Shared between concurrent requests; all methods take `&self`.
pub struct ResponseCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState>,
}

impl ResponseCache {
    /// Cache on the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a live entry, bumping its access bookkeeping on hit.
    ///
    /// An expired entry is removed and reported as a miss.
    pub fn get(&self, query: &CacheQuery<'_>) -> Option<CacheEntry> {
        let key = query.key();
        let now = self.clock.now_ms();
        let provider = query.provider.as_str();
        let mut state = self.lock();

        let expired = match state.entries.get(&key) {
            None => {
                state.stats.misses += 1;
                metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "provider" => provider)
                    .increment(1);
                return None;
            }
            Some(entry) => entry.is_expired_at(now),
        };

        if expired {
            state.remove(&key);
            state.stats.expirations += 1;
            state.stats.misses += 1;
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "expired").increment(1);
            metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "provider" => provider).increment(1);
            metrics::gauge!(telemetry::CACHE_ENTRIES).set(state.entries.len() as f64);
            debug!(provider, "cache entry expired");
            return None;
        }

        let extend_to = self
            .config
            .extend_on_hit
            .then(|| now.saturating_add(self.config.ttl.min.as_millis() as u64));

        state.stats.hits += 1;
        metrics::counter!(telemetry::CACHE_HITS_TOTAL, "provider" => provider).increment(1);
        let entry = state.entries.get_mut(&key)?;
        entry.access_count += 1;
        entry.last_accessed_ms = now;
        if let Some(expires) = extend_to {
            entry.expires_at_ms = entry.expires_at_ms.max(expires);
        }
        Some(entry.clone())
    }

    /// Whether a live entry exists for `query`, without touching its
    /// access bookkeeping or the hit/miss counters.
    pub fn contains(&self, query: &CacheQuery<'_>) -> bool {
        let now = self.clock.now_ms();
        self.lock()
            .entries
            .get(&query.key())
            .is_some_and(|e| !e.is_expired_at(now))
    }

    /// Store (or overwrite) the response for `query`, then run eviction.
    ///
    /// Returns the stored entry, or `None` when the response alone exceeds
    /// `max_size_bytes` or was evicted immediately.
    pub fn set(
        &self,
        query: &CacheQuery<'_>,
        response: &str,
        classification: &RequestClassification,
        ttl_override: Option<Duration>,
    ) -> Option<CacheEntry> {
        let now = self.clock.now_ms();
        let ttl = match ttl_override {
            Some(ttl) => self.config.ttl.clamp(ttl),
            None => self.config.ttl.ttl_for(classification),
        };
        let entry = CacheEntry {
            key: query.key(),
            response: response.to_owned(),
            created_at_ms: now,
            expires_at_ms: now.saturating_add(ttl.as_millis() as u64),
            provider: query.provider,
            model: query.model.to_owned(),
            params: query.params.clone(),
            classification: classification.clone(),
            access_count: 0,
            last_accessed_ms: now,
            quality_score: score_response(response, classification, &self.config.quality),
        };

        let mut state = self.lock();
        if entry.estimated_size() > self.config.max_size_bytes {
            state.stats.rejected += 1;
            warn!(
                size = entry.estimated_size(),
                max = self.config.max_size_bytes,
                provider = %query.provider,
                "response too large to cache"
            );
            return None;
        }

        let key = entry.key.clone();
        debug!(
            provider = %query.provider,
            model = query.model,
            ttl_secs = ttl.as_secs(),
            quality = entry.quality_score,
            "caching response"
        );
        state.insert(entry);
        state.stats.sets += 1;
        self.evict(&mut state, now);
        state.entries.get(&key).cloned()
    }

    /// Remove the entry for `query`. Returns whether one existed.
    pub fn remove(&self, query: &CacheQuery<'_>) -> bool {
        self.remove_key(&query.key())
    }

    /// Remove an entry by its raw key (see [`CacheEntry::key`]).
    pub fn remove_key(&self, key: &str) -> bool {
        let mut state = self.lock();
        let removed = state.remove(key).is_some();
        metrics::gauge!(telemetry::CACHE_ENTRIES).set(state.entries.len() as f64);
        removed
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.clear();
        metrics::gauge!(telemetry::CACHE_ENTRIES).set(0.0);
    }

    /// Drop expired entries now rather than on the next `set`.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut state = self.lock();
        let purged = state.purge_expired(now);
        if purged > 0 {
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "expired")
                .increment(purged as u64);
            metrics::gauge!(telemetry::CACHE_ENTRIES).set(state.entries.len() as f64);
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn estimated_size_bytes(&self) -> usize {
        self.lock().size_bytes
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            entries: state.entries.len(),
            size_bytes: state.size_bytes,
            ..state.stats
        }
    }

    /// Serialize every live entry into a versioned JSON snapshot.
    pub fn export(&self) -> Result<Vec<u8>> {
        let now = self.clock.now_ms();
        let mut entries: Vec<CacheEntry> = self
            .lock()
            .entries
            .values()
            .filter(|e| !e.is_expired_at(now))
            .cloned()
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        let snapshot = CacheSnapshot {
            version: SNAPSHOT_VERSION,
            exported_at_ms: now,
            entries,
        };
        Ok(serde_json::to_vec(&snapshot)?)
    }

    /// Replace the cache contents with a snapshot.
    ///
    /// Never fails: an unreadable snapshot leaves the cache empty and
    /// reports [`ImportStatus::Corrupt`].
    pub fn import(&self, bytes: &[u8]) -> ImportStatus {
        let now = self.clock.now_ms();
        let mut state = self.lock();
        state.clear();

        let snapshot = match snapshot::parse_snapshot(bytes) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "discarding corrupt cache snapshot");
                metrics::gauge!(telemetry::CACHE_ENTRIES).set(0.0);
                return ImportStatus::Corrupt;
            }
        };

        for entry in snapshot.entries {
            if entry.is_expired_at(now) || entry.estimated_size() > self.config.max_size_bytes {
                continue;
            }
            state.insert(entry);
        }
        self.evict(&mut state, now);
        let entries = state.entries.len();
        debug!(entries, "cache snapshot imported");
        ImportStatus::Loaded { entries }
    }

    fn evict(&self, state: &mut CacheState, now_ms: u64) {
        let expired = state.purge_expired(now_ms);
        if expired > 0 {
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "expired")
                .increment(expired as u64);
        }

        let len = state.entries.len();
        if len > self.config.max_entries {
            let fraction = fraction_of(len, self.config.count_eviction_fraction);
            let drop = fraction.max(len - self.config.max_entries);
            let weight = self.config.eviction_quality_weight;
            let mut ranked: Vec<(f64, &str)> = state
                .entries
                .values()
                .map(|e| {
                    let score = e.access_count as f64 + f64::from(e.quality_score) * weight;
                    (score, e.key.as_str())
                })
                .collect();
            ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
            let victims: Vec<String> = ranked
                .into_iter()
                .take(drop)
                .map(|(_, k)| k.to_owned())
                .collect();
            for key in &victims {
                state.remove(key);
            }
            state.stats.evictions += victims.len() as u64;
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "count")
                .increment(victims.len() as u64);
            debug!(evicted = victims.len(), "count eviction");
        }

        while state.size_bytes > self.config.max_size_bytes && !state.entries.is_empty() {
            let drop = fraction_of(state.entries.len(), self.config.size_eviction_fraction);
            let mut by_age: Vec<(u64, &str)> = state
                .entries
                .values()
                .map(|e| (e.last_accessed_ms, e.key.as_str()))
                .collect();
            by_age.sort_by(|a, b| match a.0.cmp(&b.0) {
                Ordering::Equal => a.1.cmp(b.1),
                other => other,
            });
            let victims: Vec<String> = by_age
                .into_iter()
                .take(drop)
                .map(|(_, k)| k.to_owned())
                .collect();
            for key in &victims {
                state.remove(key);
            }
            state.stats.evictions += victims.len() as u64;
            metrics::counter!(telemetry::CACHE_EVICTIONS_TOTAL, "reason" => "size")
                .increment(victims.len() as u64);
            debug!(evicted = victims.len(), size = state.size_bytes, "size eviction");
        }

        metrics::gauge!(telemetry::CACHE_ENTRIES).set(state.entries.len() as f64);
    }
}

/// `ceil(len * fraction)`, at least 1.
fn fraction_of(len: usize, fraction: f64) -> usize {
    let n = (len as f64 * fraction.clamp(0.0, 1.0)).ceil() as usize;
    n.max(1)
}
