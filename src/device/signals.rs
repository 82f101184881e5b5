//! Best-effort runtime signals feeding the device profiler.
//!
//! Every signal is optional. A source that cannot answer returns `None` and
//! the profiler substitutes a conservative default.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tracing::debug;

/// Read-only queries about the runtime environment.
pub trait DeviceSignals: Send + Sync {
    /// Number of CPU threads available to the process.
    fn cpu_concurrency(&self) -> Option<usize>;

    /// Memory available to the process, in megabytes.
    fn memory_limit_mb(&self) -> Option<u64>;

    /// Most recently observed network round-trip latency.
    fn network_latency(&self) -> Option<Duration>;

    /// Store the outcome of a network probe. `None` means the probe failed.
    ///
    /// Sources that do not track latency ignore this.
    fn record_latency(&self, _latency: Option<Duration>) {}
}

const NO_LATENCY: u64 = u64::MAX;

/// Signals read from the host operating system.
///
/// CPU concurrency comes from [`std::thread::available_parallelism`], memory
/// from the cgroup v2 limit or `/proc/meminfo` on Linux. Latency is whatever
/// the last [`record_latency`](DeviceSignals::record_latency) call stored.
pub struct SystemSignals {
    latency_ms: AtomicU64,
}

impl SystemSignals {
    pub fn new() -> Self {
        Self {
            latency_ms: AtomicU64::new(NO_LATENCY),
        }
    }
}

impl Default for SystemSignals {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceSignals for SystemSignals {
    fn cpu_concurrency(&self) -> Option<usize> {
        std::thread::available_parallelism().ok().map(|n| n.get())
    }

    fn memory_limit_mb(&self) -> Option<u64> {
        let total = meminfo_total_mb();
        match (cgroup_limit_mb(), total) {
            (Some(limit), Some(total)) => Some(limit.min(total)),
            (limit, total) => limit.or(total),
        }
    }

    fn network_latency(&self) -> Option<Duration> {
        match self.latency_ms.load(Ordering::Relaxed) {
            NO_LATENCY => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    fn record_latency(&self, latency: Option<Duration>) {
        let ms = latency.map_or(NO_LATENCY, |d| d.as_millis().min(u128::from(NO_LATENCY - 1)) as u64);
        self.latency_ms.store(ms, Ordering::Relaxed);
    }
}

fn meminfo_total_mb() -> Option<u64> {
    let content = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo_total_mb(&content)
}

fn cgroup_limit_mb() -> Option<u64> {
    let content = std::fs::read_to_string("/sys/fs/cgroup/memory.max").ok()?;
    // "max" means unlimited
    content.trim().parse::<u64>().ok().map(|bytes| bytes / (1024 * 1024))
}

fn parse_meminfo_total_mb(content: &str) -> Option<u64> {
    content
        .lines()
        .find_map(|line| line.strip_prefix("MemTotal:"))
        .and_then(|rest| rest.trim().trim_end_matches("kB").trim().parse::<u64>().ok())
        .map(|kb| kb / 1024)
}

/// Fixed signals, for tests and for hosts that know their own capabilities.
#[derive(Debug, Clone, Default)]
pub struct StaticSignals {
    pub cpus: Option<usize>,
    pub memory_mb: Option<u64>,
    pub latency: Option<Duration>,
}

impl StaticSignals {
    pub fn new(cpus: Option<usize>, memory_mb: Option<u64>, latency: Option<Duration>) -> Self {
        Self {
            cpus,
            memory_mb,
            latency,
        }
    }
}

impl DeviceSignals for StaticSignals {
    fn cpu_concurrency(&self) -> Option<usize> {
        self.cpus
    }

    fn memory_limit_mb(&self) -> Option<u64> {
        self.memory_mb
    }

    fn network_latency(&self) -> Option<Duration> {
        self.latency
    }
}

/// Time a TCP connect to `addr`, giving up after `timeout`.
///
/// Returns `None` on connection failure or timeout; never waits longer
/// than `timeout`.
pub async fn probe_latency(addr: &str, timeout: Duration) -> Option<Duration> {
    let start = Instant::now();
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => Some(start.elapsed()),
        Ok(Err(e)) => {
            debug!(addr, error = %e, "network probe failed");
            None
        }
        Err(_) => {
            debug!(addr, timeout_ms = timeout.as_millis() as u64, "network probe timed out");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_meminfo() {
        let content = "MemTotal:       16318480 kB\nMemFree:         1234 kB\n";
        assert_eq!(parse_meminfo_total_mb(content), Some(15936));
    }

    #[test]
    fn meminfo_without_total_is_none() {
        assert_eq!(parse_meminfo_total_mb("MemFree: 12 kB\n"), None);
    }

    #[test]
    fn system_latency_round_trips() {
        let signals = SystemSignals::new();
        assert_eq!(signals.network_latency(), None);
        signals.record_latency(Some(Duration::from_millis(80)));
        assert_eq!(signals.network_latency(), Some(Duration::from_millis(80)));
        signals.record_latency(None);
        assert_eq!(signals.network_latency(), None);
    }

    #[test]
    fn system_cpu_concurrency_is_reported() {
        assert!(SystemSignals::new().cpu_concurrency().unwrap_or(1) >= 1);
    }

    #[tokio::test]
    async fn probe_of_closed_port_returns_none() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        assert_eq!(probe_latency(&addr, Duration::from_millis(200)).await, None);
    }

    #[tokio::test]
    async fn probe_of_listening_port_measures_latency() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let latency = probe_latency(&addr, Duration::from_secs(2)).await;
        assert!(latency.is_some());
    }
}
