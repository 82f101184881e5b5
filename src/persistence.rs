//! Snapshot persistence port.
//!
//! The cache is exported as opaque bytes and handed to a [`SnapshotStore`]
//! under a string key. Hosts plug in whatever durable key-value store they
//! have; [`FileSnapshotStore`] covers the common case of a local directory
//! and [`MemorySnapshotStore`] stands in for it in tests.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::warn;

use crate::{HuginnError, Result};

/// Key the facade stores its cache snapshot under.
pub const DEFAULT_SNAPSHOT_KEY: &str = "response-cache";

/// Durable key-value store for cache snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Stored bytes for `key`, or `None` if nothing was saved.
    async fn load_snapshot(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn save_snapshot(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Removing a missing key is not an error.
    async fn remove_snapshot(&self, key: &str) -> Result<()>;
}

/// In-process store.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load_snapshot(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn save_snapshot(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), bytes.to_vec());
        Ok(())
    }

    async fn remove_snapshot(&self, key: &str) -> Result<()> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

// ============================================================================
// File store
// ============================================================================

/// One file per key under a directory, written atomically via tmp + rename.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under `~/.cache/huginn` (or `./.cache/huginn` without a home).
    pub fn default_location() -> Self {
        Self::new(
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("huginn"),
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`. Anything outside `[A-Za-z0-9_-]` becomes `_`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let name = if name.is_empty() { "_".to_owned() } else { name };
        self.dir.join(format!("{name}.json"))
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load_snapshot(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read snapshot");
                Err(HuginnError::Persistence(format!(
                    "failed to read {}: {e}",
                    path.display()
                )))
            }
        }
    }

    async fn save_snapshot(&self, key: &str, bytes: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            HuginnError::Persistence(format!(
                "failed to create snapshot dir {}: {e}",
                self.dir.display()
            ))
        })?;

        // a crash mid-write leaves the previous snapshot intact
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, bytes).await.map_err(|e| {
            HuginnError::Persistence(format!(
                "failed to write snapshot {}: {e}",
                tmp_path.display()
            ))
        })?;
        tokio::fs::rename(&tmp_path, &path).await.map_err(|e| {
            HuginnError::Persistence(format!(
                "failed to rename snapshot {} → {}: {e}",
                tmp_path.display(),
                path.display()
            ))
        })
    }

    async fn remove_snapshot(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HuginnError::Persistence(format!(
                "failed to remove snapshot {}: {e}",
                path.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_sanitised() {
        let store = FileSnapshotStore::new("/tmp/x");
        assert_eq!(store.path_for("response-cache"), Path::new("/tmp/x/response-cache.json"));
        assert_eq!(store.path_for("../etc/passwd"), Path::new("/tmp/x/___etc_passwd.json"));
        assert_eq!(store.path_for(""), Path::new("/tmp/x/_.json"));
    }

    #[test]
    fn default_location_ends_in_huginn() {
        assert!(FileSnapshotStore::default_location().dir().ends_with("huginn"));
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemorySnapshotStore::new();
        assert!(store.load_snapshot("k").await.unwrap().is_none());
        store.save_snapshot("k", b"abc").await.unwrap();
        assert_eq!(store.load_snapshot("k").await.unwrap().as_deref(), Some(&b"abc"[..]));
        store.remove_snapshot("k").await.unwrap();
        store.remove_snapshot("k").await.unwrap();
        assert!(store.is_empty());
    }
}
