//! Builder for configuring the facade.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::Huginn;
use crate::cache::{CacheConfig, Clock, ResponseCache, SystemClock};
use crate::config::HuginnConfig;
use crate::device::{DeviceProfiler, DeviceSignals, ProfilerConfig, SystemSignals};
use crate::optimizer::{OptimizerConfig, PromptOptimizer};
use crate::persistence::{DEFAULT_SNAPSHOT_KEY, FileSnapshotStore, SnapshotStore};
use crate::providers::{ProviderPort, StreamConfig};
use crate::random::{RandomSource, StdRandom};
use crate::retry::{AdaptiveConfig, DEFAULT_HISTORY_CAPACITY, RetryOrchestrator, RetryPolicy};
use crate::types::Provider;
use crate::{HuginnError, Result};

/// Builder for [`Huginn`].
///
/// Only the provider port is required; every other collaborator has a
/// production default (system clock, system device signals, OS-seeded RNG).
/// Profiler, optimizer, adaptive retry and snapshot key settings come from
/// [`config`](Self::config).
pub struct HuginnBuilder {
    provider: Option<Arc<dyn ProviderPort>>,
    cache: CacheConfig,
    clock: Arc<dyn Clock>,
    policies: HashMap<Provider, RetryPolicy>,
    adaptive: AdaptiveConfig,
    history_capacity: usize,
    random: Option<Arc<dyn RandomSource>>,
    signals: Option<Arc<dyn DeviceSignals>>,
    profiler: ProfilerConfig,
    optimizer: OptimizerConfig,
    stream: StreamConfig,
    snapshot_store: Option<Arc<dyn SnapshotStore>>,
    snapshot_key: String,
    snapshot_interval: Option<Duration>,
}

impl Default for HuginnBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HuginnBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            cache: CacheConfig::default(),
            clock: Arc::new(SystemClock),
            policies: HashMap::new(),
            adaptive: AdaptiveConfig::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            random: None,
            signals: None,
            profiler: ProfilerConfig::default(),
            optimizer: OptimizerConfig::default(),
            stream: StreamConfig::default(),
            snapshot_store: None,
            snapshot_key: DEFAULT_SNAPSHOT_KEY.to_string(),
            snapshot_interval: None,
        }
    }

    /// Set the outbound provider port (required).
    pub fn provider(mut self, port: Arc<dyn ProviderPort>) -> Self {
        self.provider = Some(port);
        self
    }

    /// Configure the response cache.
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    /// Never consult or populate the response cache.
    pub fn disable_cache(mut self) -> Self {
        self.cache.enabled = false;
        self
    }

    /// Clock for cache timestamps (tests use [`ManualClock`](crate::cache::ManualClock)).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override the retry policy for one provider.
    pub fn retry_policy(mut self, provider: Provider, policy: RetryPolicy) -> Self {
        self.policies.insert(provider, policy);
        self
    }



    /// Randomness for retry jitter.
    pub fn random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = Some(random);
        self
    }

    pub fn device_signals(mut self, signals: Arc<dyn DeviceSignals>) -> Self {
        self.signals = Some(signals);
        self
    }



    pub fn stream(mut self, config: StreamConfig) -> Self {
        self.stream = config;
        self
    }

    /// Persist the cache through `store` on [`Huginn::init`]/[`Huginn::shutdown`].
    pub fn snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshot_store = Some(store);
        self
    }


    /// Save a snapshot in the background every `interval` after `init`.
    pub fn snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self
    }

    /// Apply every section of a configuration file.
    ///
    /// Collaborators set explicitly (provider port, clock, RNG, signals,
    /// snapshot store) are left alone unless the file enables persistence
    /// and no store was set yet.
    pub fn config(mut self, config: &HuginnConfig) -> Self {
        self.cache = config.cache.to_cache_config();
        for provider in Provider::ALL {
            self.policies.insert(provider, config.retry.policy(provider));
        }
        self.adaptive = config.retry.adaptive.to_adaptive_config();
        if let Some(capacity) = config.retry.adaptive.history_capacity {
            self.history_capacity = capacity;
        }
        self.profiler = config.device.to_profiler_config();
        self.stream = config.streaming.to_stream_config();
        self.optimizer = config.optimizer.clone();

        let persistence = &config.persistence;
        if persistence.enabled {
            if self.snapshot_store.is_none() {
                let store = match &persistence.dir {
                    Some(dir) => FileSnapshotStore::new(dir.clone()),
                    None => FileSnapshotStore::default_location(),
                };
                self.snapshot_store = Some(Arc::new(store));
            }
            self.snapshot_key = persistence.key.clone();
            self.snapshot_interval = persistence.interval_secs.map(Duration::from_secs);
        }
        self
    }

    /// Build the facade.
    ///
    /// Fails with [`HuginnError::NoProvider`] when no provider port was set.
    pub fn build(self) -> Result<Huginn> {
        let provider = self.provider.ok_or(HuginnError::NoProvider)?;
        if self.snapshot_interval.is_some_and(|d| d.is_zero()) {
            return Err(HuginnError::Configuration(
                "snapshot interval must be greater than zero".to_string(),
            ));
        }

        let random = self
            .random
            .unwrap_or_else(|| Arc::new(StdRandom::default()));
        let mut retry = RetryOrchestrator::new(random)
            .with_adaptive(self.adaptive)
            .with_history_capacity(self.history_capacity);
        for (provider, policy) in self.policies {
            retry = retry.with_policy(provider, policy);
        }

        let signals = self
            .signals
            .unwrap_or_else(|| Arc::new(SystemSignals::new()));
        let cache = self
            .cache
            .enabled
            .then(|| Arc::new(ResponseCache::with_clock(self.cache.clone(), self.clock)));

        Ok(Huginn {
            provider,
            cache,
            quality: self.cache.quality,
            retry: Arc::new(retry),
            profiler: Arc::new(DeviceProfiler::new(signals, self.profiler)),
            optimizer: PromptOptimizer::new(self.optimizer),
            stream: self.stream,
            snapshots: self.snapshot_store,
            snapshot_key: self.snapshot_key,
            snapshot_interval: self.snapshot_interval,
            snapshot_task: Default::default(),
        })
    }
}
