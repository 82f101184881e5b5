//! Versioned snapshot format for cache export/import.

use serde::{Deserialize, Serialize};

use super::CacheEntry;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized form of a [`ResponseCache`](super::ResponseCache).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot {
    pub version: u32,
    /// Export time, milliseconds since the Unix epoch.
    pub exported_at_ms: u64,
    pub entries: Vec<CacheEntry>,
}

/// Outcome of [`ResponseCache::import`](super::ResponseCache::import).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    /// Snapshot accepted; `entries` live entries kept after expiry and bounds.
    Loaded { entries: usize },
    /// Snapshot unreadable or of an unknown version; the cache is now empty.
    Corrupt,
}

impl ImportStatus {
    pub fn is_corrupt(&self) -> bool {
        matches!(self, ImportStatus::Corrupt)
    }
}

/// Why a snapshot was rejected.
#[derive(Debug, thiserror::Error)]
pub(crate) enum SnapshotError {
    #[error("unparseable snapshot: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported snapshot version {0}")]
    Version(u32),
}

pub(crate) fn parse_snapshot(bytes: &[u8]) -> Result<CacheSnapshot, SnapshotError> {
    let snapshot: CacheSnapshot = serde_json::from_slice(bytes)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(SnapshotError::Version(snapshot.version));
    }
    Ok(snapshot)
}
