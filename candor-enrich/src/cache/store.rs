//! File-backed cache store
//!
//! One JSON record per key, `<dir>/<key>.json`, holding the key, the creation
//! timestamp and the payload. Writes go through a temp file and a rename so a
//! reader sees the old record or the new one, never a torn write. Concurrent
//! puts on one key race with last-writer-wins.

use super::{CacheKey, CachePolicy, Clock, SystemClock};
use candor_common::atomic_write::{is_temp_file, write_atomic};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const RECORD_EXTENSION: &str = "json";

/// On-disk record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

/// Snapshot of the store contents under the store's policy
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    /// Records that failed to decode (removed on next get or invalidation)
    pub corrupt_entries: usize,
    /// Sum of record file sizes in bytes
    pub total_bytes: u64,
}

struct StoreInner {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

/// Content-keyed TTL cache shared by every lookup adapter
///
/// Cheap to clone; clones share the directory and clock.
#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<StoreInner>,
    policy: CachePolicy,
}

enum Record {
    Missing,
    Unreadable,
    Corrupt(String),
    Present(CacheEntry),
}

impl CacheStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>, policy: CachePolicy) -> candor_common::Result<Self> {
        Self::with_clock(dir, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(
        dir: impl Into<PathBuf>,
        policy: CachePolicy,
        clock: Arc<dyn Clock>,
    ) -> candor_common::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        info!(dir = %dir.display(), ?policy, "Cache store opened");

        Ok(Self {
            inner: Arc::new(StoreInner { dir, clock }),
            policy,
        })
    }

    /// View of the same store evaluated under a different policy
    pub fn with_policy(&self, policy: CachePolicy) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            policy,
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    fn record_path(&self, key: &CacheKey) -> PathBuf {
        self.inner
            .dir
            .join(format!("{}.{}", key.as_string(), RECORD_EXTENSION))
    }

    /// Payload for `key` if present and not expired
    ///
    /// A record that cannot be decoded is deleted and reported as a miss.
    pub async fn get(&self, key: &CacheKey) -> Option<serde_json::Value> {
        let path = self.record_path(key);

        let entry = match read_record(&path).await {
            Record::Present(entry) => entry,
            Record::Missing | Record::Unreadable => return None,
            Record::Corrupt(reason) => {
                self.self_heal(&path, &reason).await;
                return None;
            }
        };

        if entry.key != key.as_string() {
            self.self_heal(&path, "record key does not match file name")
                .await;
            return None;
        }

        if self.policy.is_expired(entry.created_at, self.inner.clock.now()) {
            debug!(key = %key, created_at = %entry.created_at, "Cache entry expired");
            return None;
        }

        debug!(key = %key, "Cache hit");
        Some(entry.payload)
    }

    /// Typed [`get`](Self::get); a payload that no longer fits `T` is
    /// treated as corrupt
    pub async fn get_as<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let payload = self.get(key).await?;
        match serde_json::from_value(payload) {
            Ok(value) => Some(value),
            Err(e) => {
                self.self_heal(&self.record_path(key), &e.to_string()).await;
                None
            }
        }
    }

    /// Store `payload` under `key` stamped with the current time
    ///
    /// Best-effort: failures are logged and reported as `false`.
    pub async fn put<T: Serialize + ?Sized>(&self, key: &CacheKey, payload: &T) -> bool {
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache payload not serializable, skipping put");
                return false;
            }
        };

        let entry = CacheEntry {
            key: key.as_string(),
            created_at: self.inner.clock.now(),
            payload,
        };

        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache record encoding failed, skipping put");
                return false;
            }
        };

        let path = self.record_path(key);
        if let Err(e) = write_atomic(&path, &bytes).await {
            // Directory may have been removed underneath us; recreate once
            if tokio::fs::create_dir_all(&self.inner.dir).await.is_ok()
                && write_atomic(&path, &bytes).await.is_ok()
            {
                debug!(key = %key, "Cache put succeeded after recreating directory");
                return true;
            }
            warn!(key = %key, error = %e, "Cache put failed");
            return false;
        }

        debug!(key = %key, bytes = bytes.len(), "Cache put");
        true
    }

    /// Remove the record for `key`; returns true if one existed
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        match tokio::fs::remove_file(self.record_path(key)).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache invalidate failed");
                false
            }
        }
    }

    /// Remove every record expired under the current policy
    ///
    /// Corrupt records are removed as well and included in the count.
    pub async fn invalidate_expired(&self) -> usize {
        let now = self.inner.clock.now();
        let mut removed = 0;

        for path in self.record_paths().await {
            let remove = match read_record(&path).await {
                Record::Present(entry) => self.policy.is_expired(entry.created_at, now),
                Record::Corrupt(_) => true,
                Record::Missing | Record::Unreadable => false,
            };
            if remove && remove_quietly(&path).await {
                removed += 1;
            }
        }

        info!(removed, "Expired cache entries invalidated");
        removed
    }

    /// Remove every record regardless of age
    pub async fn clear_all(&self) -> usize {
        let mut removed = 0;
        for path in self.record_paths().await {
            if remove_quietly(&path).await {
                removed += 1;
            }
        }
        info!(removed, "Cache cleared");
        removed
    }

    pub async fn stats(&self) -> CacheStats {
        let now = self.inner.clock.now();
        let mut stats = CacheStats::default();

        for path in self.record_paths().await {
            let size = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta.len(),
                Err(_) => continue,
            };

            stats.total_entries += 1;
            stats.total_bytes += size;

            match read_record(&path).await {
                Record::Present(entry) if self.policy.is_expired(entry.created_at, now) => {
                    stats.expired_entries += 1
                }
                Record::Present(_) => stats.valid_entries += 1,
                Record::Corrupt(_) => stats.corrupt_entries += 1,
                Record::Missing | Record::Unreadable => stats.total_entries -= 1,
            }
        }

        stats
    }

    async fn self_heal(&self, path: &Path, reason: &str) {
        warn!(
            path = %path.display(),
            reason,
            "Corrupt cache record, removing"
        );
        remove_quietly(path).await;
    }

    async fn record_paths(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.inner.dir).await {
            Ok(dir) => dir,
            Err(e) => {
                warn!(dir = %self.inner.dir.display(), error = %e, "Cache directory unreadable");
                return paths;
            }
        };

        loop {
            match dir.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    if is_temp_file(&path) {
                        continue;
                    }
                    if path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION) {
                        paths.push(path);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Cache directory scan interrupted");
                    break;
                }
            }
        }

        paths
    }
}

async fn read_record(path: &Path) -> Record {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Record::Missing,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cache record unreadable");
            return Record::Unreadable;
        }
    };

    match serde_json::from_slice::<CacheEntry>(&bytes) {
        Ok(entry) => Record::Present(entry),
        Err(e) => Record::Corrupt(e.to_string()),
    }
}

async fn remove_quietly(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cache record removal failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use serde_json::json;
    use tempfile::TempDir;

    fn store_with_clock(dir: &TempDir, policy: CachePolicy) -> (CacheStore, ManualClock) {
        let clock = ManualClock::default();
        let store = CacheStore::with_clock(dir.path(), policy, Arc::new(clock.clone())).unwrap();
        (store, clock)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let dir = TempDir::new().unwrap();
        let (store, _) = store_with_clock(&dir, CachePolicy::default());
        let key = CacheKey::from_entity("github", "octocat");

        assert!(store.put(&key, &json!({"login": "octocat"})).await);
        assert_eq!(store.get(&key).await, Some(json!({"login": "octocat"})));
    }

    #[tokio::test]
    async fn test_miss_on_absent_key() {
        let dir = TempDir::new().unwrap();
        let (store, _) = store_with_clock(&dir, CachePolicy::default());
        assert_eq!(store.get(&CacheKey::from_entity("github", "nobody")).await, None);
    }

    #[tokio::test]
    async fn test_record_layout() {
        let dir = TempDir::new().unwrap();
        let (store, _) = store_with_clock(&dir, CachePolicy::default());
        let key = CacheKey::from_entity("github", "octocat");
        store.put(&key, &json!([1, 2, 3])).await;

        let path = dir.path().join(format!("{}.json", key.as_string()));
        let entry: CacheEntry = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(entry.key, key.as_string());
        assert_eq!(entry.payload, json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn test_key_mismatch_is_corruption() {
        let dir = TempDir::new().unwrap();
        let (store, _) = store_with_clock(&dir, CachePolicy::default());
        let key = CacheKey::from_entity("github", "octocat");
        let path = dir.path().join(format!("{}.json", key.as_string()));

        let foreign = CacheEntry {
            key: "github-somethingelse".to_string(),
            created_at: Utc::now(),
            payload: json!(1),
        };
        std::fs::write(&path, serde_json::to_vec(&foreign).unwrap()).unwrap();

        assert_eq!(store.get(&key).await, None);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_get_as_type_mismatch_heals() {
        let dir = TempDir::new().unwrap();
        let (store, _) = store_with_clock(&dir, CachePolicy::default());
        let key = CacheKey::from_entity("github", "octocat");
        store.put(&key, &json!("not a number")).await;

        assert_eq!(store.get_as::<u32>(&key).await, None);
        assert_eq!(store.get(&key).await, None);
    }

    #[tokio::test]
    async fn test_invalidate_single_key() {
        let dir = TempDir::new().unwrap();
        let (store, _) = store_with_clock(&dir, CachePolicy::default());
        let key = CacheKey::from_entity("github", "octocat");
        store.put(&key, &json!(1)).await;

        assert!(store.invalidate(&key).await);
        assert!(!store.invalidate(&key).await);
        assert_eq!(store.get(&key).await, None);
    }

    #[tokio::test]
    async fn test_temp_files_ignored_by_scans() {
        let dir = TempDir::new().unwrap();
        let (store, _) = store_with_clock(&dir, CachePolicy::default());
        std::fs::write(dir.path().join("github-abc.json.1234.tmp"), b"{partial").unwrap();

        assert_eq!(store.stats().await.total_entries, 0);
        assert_eq!(store.clear_all().await, 0);
    }
}
