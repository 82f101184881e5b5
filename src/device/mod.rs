//! Device capability profiling.
//!
//! [`DeviceProfiler`] turns best-effort [`DeviceSignals`] into a coarse
//! [`DeviceProfile`] used to pick sane generation defaults. The profile is an
//! immutable snapshot held behind an [`ArcSwapOption`]: refreshes replace it
//! wholesale, readers never take a lock, and a stale read during a refresh
//! is harmless.
//!
//! Network tier detection is synchronous best-effort. [`DeviceProfiler::profile`]
//! only reads the last latency recorded by the signal source and never
//! touches the network; [`DeviceProfiler::probe_network`] is a separate,
//! strictly time-bounded call the host may schedule whenever it likes.

pub mod signals;

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub use signals::{DeviceSignals, StaticSignals, SystemSignals, probe_latency};

/// Coarse network quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkTier {
    Slow,
    Medium,
    Fast,
    Unknown,
}

impl NetworkTier {
    /// Bucket a round-trip latency: under 100ms is fast, under 300ms medium.
    pub fn from_latency(latency: Option<Duration>) -> Self {
        match latency {
            None => NetworkTier::Unknown,
            Some(d) if d < Duration::from_millis(100) => NetworkTier::Fast,
            Some(d) if d < Duration::from_millis(300) => NetworkTier::Medium,
            Some(_) => NetworkTier::Slow,
        }
    }
}

/// Snapshot of the runtime's capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// 1 (weakest) to 10 (strongest).
    pub tier: u8,
    pub estimated_memory_mb: u64,
    pub network_tier: NetworkTier,
    pub supports_parallelism: bool,
}

/// Assumed memory when the host does not report any.
const FALLBACK_MEMORY_MB: u64 = 1024;

impl DeviceProfile {
    /// Low-tier profile assumed when nothing is known about the device.
    pub fn conservative() -> Self {
        Self::from_parts(None, None, NetworkTier::Unknown)
    }

    /// Compute a profile from the given signals.
    pub fn from_signals(signals: &dyn DeviceSignals) -> Self {
        Self::from_parts(
            signals.cpu_concurrency(),
            signals.memory_limit_mb(),
            NetworkTier::from_latency(signals.network_latency()),
        )
    }

    fn from_parts(cpus: Option<usize>, memory_mb: Option<u64>, network_tier: NetworkTier) -> Self {
        let cpus = cpus.unwrap_or(1).max(1);
        let memory_mb = memory_mb.unwrap_or(FALLBACK_MEMORY_MB);

        let cpu_score: u8 = match cpus {
            8.. => 4,
            4..=7 => 3,
            2..=3 => 2,
            _ => 1,
        };
        let memory_score: u8 = match memory_mb {
            8192.. => 3,
            4096..=8191 => 2,
            2048..=4095 => 1,
            _ => 0,
        };
        let network_score: u8 = match network_tier {
            NetworkTier::Fast => 3,
            NetworkTier::Medium => 2,
            NetworkTier::Unknown => 1,
            NetworkTier::Slow => 0,
        };

        Self {
            tier: (cpu_score + memory_score + network_score).clamp(1, 10),
            estimated_memory_mb: memory_mb,
            network_tier,
            supports_parallelism: cpus >= 4,
        }
    }

    /// Tier 3 and below.
    pub fn is_low_end(&self) -> bool {
        self.tier <= 3
    }

    /// Tier 8 and above.
    pub fn is_high_end(&self) -> bool {
        self.tier >= 8
    }
}

/// Configuration for [`DeviceProfiler`].
#[derive(Debug, Clone)]
pub struct ProfilerConfig {
    /// How long a computed profile stays fresh. Default: 30 minutes.
    pub refresh_interval: Duration,
    /// Upper bound for a network probe. Default: 2 seconds.
    pub probe_timeout: Duration,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30 * 60),
            probe_timeout: Duration::from_secs(2),
        }
    }
}

impl ProfilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}

struct Snapshot {
    profile: DeviceProfile,
    computed_at: Instant,
}

/// Caches a [`DeviceProfile`] and recomputes it once the refresh interval
/// has elapsed.
pub struct DeviceProfiler {
    signals: Arc<dyn DeviceSignals>,
    config: ProfilerConfig,
    current: ArcSwapOption<Snapshot>,
}

impl DeviceProfiler {
    pub fn new(signals: Arc<dyn DeviceSignals>, config: ProfilerConfig) -> Self {
        Self {
            signals,
            config,
            current: ArcSwapOption::empty(),
        }
    }

    /// Profiler over the host's own signals with default configuration.
    pub fn system() -> Self {
        Self::new(Arc::new(SystemSignals::new()), ProfilerConfig::default())
    }

    /// Current profile, recomputed first if missing or stale.
    pub fn profile(&self) -> DeviceProfile {
        match self.current.load_full() {
            Some(snapshot) if snapshot.computed_at.elapsed() < self.config.refresh_interval => {
                snapshot.profile
            }
            _ => self.refresh(),
        }
    }

    /// Whether the next [`profile`](Self::profile) call will recompute.
    pub fn is_stale(&self) -> bool {
        self.current
            .load()
            .as_ref()
            .is_none_or(|s| s.computed_at.elapsed() >= self.config.refresh_interval)
    }

    /// Recompute unconditionally and swap in the new snapshot.
    pub fn refresh(&self) -> DeviceProfile {
        let profile = DeviceProfile::from_signals(self.signals.as_ref());
        debug!(
            tier = profile.tier,
            memory_mb = profile.estimated_memory_mb,
            network = ?profile.network_tier,
            "device profile refreshed"
        );
        self.current.store(Some(Arc::new(Snapshot {
            profile,
            computed_at: Instant::now(),
        })));
        profile
    }

    /// Probe network latency against `addr` (e.g. a provider's API host on
    /// port 443), record the outcome and refresh the profile.
    ///
    /// Bounded by [`ProfilerConfig::probe_timeout`]; a failed or timed-out
    /// probe yields [`NetworkTier::Unknown`].
    pub async fn probe_network(&self, addr: &str) -> NetworkTier {
        let latency = probe_latency(addr, self.config.probe_timeout).await;
        self.signals.record_latency(latency);
        self.refresh().network_tier
    }
}
