//! TOML configuration.
//!
//! Every tunable constant of the pipeline (cache bounds, TTL multipliers,
//! quality weights, retry policies, streaming shape) can be set from a TOML
//! file. All sections and fields are optional; anything left out keeps its
//! built-in default.
//!
//! Resolution order for [`HuginnConfig::load`]:
//! 1. Explicit path (if provided)
//! 2. `~/.huginn/config.toml`
//!
//! ```toml
//! [cache]
//! max_entries = 1000
//! base_ttl_secs = 7200
//!
//! [cache.ttl_multipliers]
//! creative = 0.1
//!
//! [retry.gemini]
//! max_retries = 5
//! initial_delay_ms = 500
//!
//! [persistence]
//! enabled = true
//! interval_secs = 300
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::cache::{CacheConfig, QualityWeights, TtlMultipliers, TtlPolicy};
use crate::device::ProfilerConfig;
use crate::optimizer::OptimizerConfig;
use crate::persistence::DEFAULT_SNAPSHOT_KEY;
use crate::providers::StreamConfig;
use crate::retry::{AdaptiveConfig, ErrorCategory, RetryPolicy};
use crate::types::Provider;
use crate::{HuginnError, Result};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HuginnConfig {
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub device: DeviceSection,
    #[serde(default)]
    pub streaming: StreamingSection,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    #[serde(default)]
    pub persistence: PersistenceSection,
}

// ============================================================================
// Cache
// ============================================================================

/// `[cache]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub enabled: bool,
    pub max_entries: usize,
    pub max_size_bytes: usize,
    pub base_ttl_secs: u64,
    pub min_ttl_secs: u64,
    pub max_ttl_secs: u64,
    pub ttl_multipliers: TtlMultipliers,
    pub quality: QualityWeights,
    pub eviction_quality_weight: f64,
    pub count_eviction_fraction: f64,
    pub size_eviction_fraction: f64,
    pub extend_on_hit: bool,
}

impl Default for CacheSection {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self {
            enabled: defaults.enabled,
            max_entries: defaults.max_entries,
            max_size_bytes: defaults.max_size_bytes,
            base_ttl_secs: defaults.ttl.base.as_secs(),
            min_ttl_secs: defaults.ttl.min.as_secs(),
            max_ttl_secs: defaults.ttl.max.as_secs(),
            ttl_multipliers: defaults.ttl.multipliers,
            quality: defaults.quality,
            eviction_quality_weight: defaults.eviction_quality_weight,
            count_eviction_fraction: defaults.count_eviction_fraction,
            size_eviction_fraction: defaults.size_eviction_fraction,
            extend_on_hit: defaults.extend_on_hit,
        }
    }
}

impl CacheSection {
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig {
            enabled: self.enabled,
            max_entries: self.max_entries,
            max_size_bytes: self.max_size_bytes,
            ttl: TtlPolicy {
                base: Duration::from_secs(self.base_ttl_secs),
                min: Duration::from_secs(self.min_ttl_secs),
                max: Duration::from_secs(self.max_ttl_secs),
                multipliers: self.ttl_multipliers.clone(),
            },
            quality: self.quality.clone(),
            eviction_quality_weight: self.eviction_quality_weight,
            count_eviction_fraction: self.count_eviction_fraction,
            size_eviction_fraction: self.size_eviction_fraction,
            extend_on_hit: self.extend_on_hit,
        }
    }
}

// ============================================================================
// Retry
// ============================================================================

/// `[retry]` with one optional sub-table per provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrySection {
    #[serde(default)]
    pub gemini: Option<RetryPolicySection>,
    #[serde(default)]
    pub openai: Option<RetryPolicySection>,
    #[serde(default)]
    pub mistral: Option<RetryPolicySection>,
    #[serde(default)]
    pub adaptive: AdaptiveSection,
}

/// Overrides applied on top of [`RetryPolicy::for_provider`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetryPolicySection {
    pub max_retries: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub max_delay_ms: Option<u64>,
    pub jitter: Option<bool>,
    pub retryable: Option<Vec<ErrorCategory>>,
    pub non_retryable: Option<Vec<ErrorCategory>>,
}

impl RetryPolicySection {
    pub fn apply(&self, mut policy: RetryPolicy) -> RetryPolicy {
        if let Some(n) = self.max_retries {
            policy.max_retries = n;
        }
        if let Some(ms) = self.initial_delay_ms {
            policy.initial_delay = Duration::from_millis(ms);
        }
        if let Some(m) = self.backoff_multiplier {
            policy.backoff_multiplier = m;
        }
        if let Some(ms) = self.max_delay_ms {
            policy.max_delay = Duration::from_millis(ms);
        }
        if let Some(jitter) = self.jitter {
            policy.jitter = jitter;
        }
        if let Some(ref categories) = self.retryable {
            policy.retryable = categories.iter().copied().collect();
        }
        if let Some(ref categories) = self.non_retryable {
            policy.non_retryable = categories.iter().copied().collect();
        }
        policy
    }
}

impl RetrySection {
    fn for_provider(&self, provider: Provider) -> Option<&RetryPolicySection> {
        match provider {
            Provider::Gemini => self.gemini.as_ref(),
            Provider::OpenAi => self.openai.as_ref(),
            Provider::Mistral => self.mistral.as_ref(),
        }
    }

    /// Effective policy for `provider`.
    pub fn policy(&self, provider: Provider) -> RetryPolicy {
        let base = RetryPolicy::for_provider(provider);
        match self.for_provider(provider) {
            Some(section) => section.apply(base),
            None => base,
        }
    }
}

/// `[retry.adaptive]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdaptiveSection {
    pub window: Option<usize>,
    pub min_samples: Option<usize>,
    pub low_success_rate: Option<f64>,
    pub high_success_rate: Option<f64>,
    pub min_initial_delay_ms: Option<u64>,
    pub history_capacity: Option<usize>,
}

impl AdaptiveSection {
    pub fn to_adaptive_config(&self) -> AdaptiveConfig {
        let mut config = AdaptiveConfig::default();
        if let Some(window) = self.window {
            config.window = window;
        }
        if let Some(n) = self.min_samples {
            config.min_samples = n;
        }
        if let Some(rate) = self.low_success_rate {
            config.low_success_rate = rate;
        }
        if let Some(rate) = self.high_success_rate {
            config.high_success_rate = rate;
        }
        if let Some(ms) = self.min_initial_delay_ms {
            config.min_initial_delay = Duration::from_millis(ms);
        }
        config
    }
}

// ============================================================================
// Device, streaming, persistence
// ============================================================================

/// `[device]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceSection {
    pub refresh_interval_secs: u64,
    pub probe_timeout_ms: u64,
}

impl Default for DeviceSection {
    fn default() -> Self {
        let defaults = ProfilerConfig::default();
        Self {
            refresh_interval_secs: defaults.refresh_interval.as_secs(),
            probe_timeout_ms: defaults.probe_timeout.as_millis() as u64,
        }
    }
}

impl DeviceSection {
    pub fn to_profiler_config(&self) -> ProfilerConfig {
        ProfilerConfig::new()
            .refresh_interval(Duration::from_secs(self.refresh_interval_secs))
            .probe_timeout(Duration::from_millis(self.probe_timeout_ms))
    }
}

/// `[streaming]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamingSection {
    pub chunk_words: usize,
    pub chunk_delay_ms: u64,
    pub buffer: usize,
}

impl Default for StreamingSection {
    fn default() -> Self {
        let defaults = StreamConfig::default();
        Self {
            chunk_words: defaults.chunk_words,
            chunk_delay_ms: defaults.chunk_delay.as_millis() as u64,
            buffer: defaults.buffer,
        }
    }
}

impl StreamingSection {
    pub fn to_stream_config(&self) -> StreamConfig {
        StreamConfig::new()
            .chunk_words(self.chunk_words)
            .chunk_delay(Duration::from_millis(self.chunk_delay_ms))
            .buffer(self.buffer)
    }
}

/// `[persistence]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceSection {
    /// Persist the cache through a [`FileSnapshotStore`](crate::FileSnapshotStore).
    pub enabled: bool,
    /// Snapshot directory. Default: `<cache_dir>/huginn`.
    pub dir: Option<PathBuf>,
    pub key: String,
    /// Periodic snapshot interval; no periodic snapshots when absent.
    pub interval_secs: Option<u64>,
}

impl Default for PersistenceSection {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: None,
            key: DEFAULT_SNAPSHOT_KEY.to_string(),
            interval_secs: None,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl HuginnConfig {
    /// Load configuration from the standard locations.
    ///
    /// Without an explicit path and without `~/.huginn/config.toml`, returns
    /// the defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| HuginnError::Configuration(format!("Failed to parse config: {e}")))
    }

    fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            HuginnError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(HuginnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".huginn").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_matches_builtin_defaults() {
        let config = HuginnConfig::from_toml_str("").unwrap();
        let cache = config.cache.to_cache_config();
        let defaults = CacheConfig::default();
        assert_eq!(cache.max_entries, defaults.max_entries);
        assert_eq!(cache.max_size_bytes, defaults.max_size_bytes);
        assert_eq!(cache.ttl, defaults.ttl);
        assert_eq!(cache.quality, defaults.quality);
        assert_eq!(config.device.to_profiler_config().refresh_interval, Duration::from_secs(1800));
        assert_eq!(config.streaming.to_stream_config(), StreamConfig::default());
        for p in Provider::ALL {
            assert_eq!(config.retry.policy(p), RetryPolicy::for_provider(p));
        }
        assert!(!config.persistence.enabled);
        assert_eq!(config.persistence.key, DEFAULT_SNAPSHOT_KEY);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = HuginnConfig::from_toml_str(
            r#"
            [cache]
            max_entries = 10

            [cache.ttl_multipliers]
            creative = 0.1

            [retry.mistral]
            max_retries = 6
            non_retryable = ["unauthorized", "unknown"]
            "#,
        )
        .unwrap();
        let cache = config.cache.to_cache_config();
        assert_eq!(cache.max_entries, 10);
        assert_eq!(cache.ttl.multipliers.creative, 0.1);
        assert_eq!(cache.ttl.multipliers.question, 2.0);

        let mistral = config.retry.policy(Provider::Mistral);
        assert_eq!(mistral.max_retries, 6);
        assert_eq!(mistral.backoff_multiplier, 1.5);
        assert!(mistral.non_retryable.contains(&ErrorCategory::Unknown));
        assert!(!mistral.non_retryable.contains(&ErrorCategory::BadRequest));
    }

    #[test]
    fn invalid_toml_is_a_configuration_error() {
        let err = HuginnConfig::from_toml_str("[cache\nmax_entries = ").unwrap_err();
        assert!(matches!(err, HuginnError::Configuration(_)));
    }

    #[test]
    fn unknown_category_is_rejected() {
        let err = HuginnConfig::from_toml_str("[retry.gemini]\nretryable = [\"sometimes\"]");
        assert!(err.is_err());
    }

    #[test]
    fn missing_explicit_path_is_an_error() {
        let err = HuginnConfig::load(Some(Path::new("/nonexistent/huginn.toml"))).unwrap_err();
        assert!(matches!(err, HuginnError::Configuration(_)));
    }
}
