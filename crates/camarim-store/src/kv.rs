//! # Key-Value Backends
//!
//! The synchronous, string-keyed storage primitive beneath the fallback
//! store. A backend is deliberately dumb: it stores opaque strings under
//! string keys and may be capacity-limited. Everything about blob layout
//! and parsing lives one level up in [`FallbackStore`](crate::FallbackStore).
//!
//! Two implementations are provided:
//!
//! - [`FileKv`] - one file per key under a data directory (production)
//! - [`MemoryKv`] - in-memory map with an optional byte quota (tests,
//!   fault injection)

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::{StoreError, StoreResult};

// =============================================================================
// Backend Trait
// =============================================================================

/// A synchronous, string-keyed persistent store.
///
/// Writes replace the whole value under a key; there are no partial
/// updates. Implementations may enforce a capacity limit, in which case a
/// rejected write surfaces as [`StoreError::QuotaExceeded`].
pub trait KeyValueBackend: Send + Sync {
    /// Reads the value stored under `key`, if any.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Removes the value under `key`. Removing an absent key is not an
    /// error.
    fn remove(&self, key: &str) -> StoreResult<()>;

    /// Returns true if a value exists under `key`.
    fn contains(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

// =============================================================================
// In-Memory Backend
// =============================================================================

/// In-memory backend with an optional byte quota.
///
/// The quota counts key and value bytes together, mimicking the
/// capacity-limited store this backend stands in for. Primarily a test
/// double: tests use the quota to force `QuotaExceeded` on demand.
pub struct MemoryKv {
    entries: Mutex<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryKv {
    /// Creates an unbounded in-memory backend.
    pub fn new() -> Self {
        MemoryKv {
            entries: Mutex::new(BTreeMap::new()),
            quota_bytes: None,
        }
    }

    /// Creates a backend that rejects writes once `quota_bytes` of keys
    /// and values would be stored.
    pub fn with_quota(quota_bytes: usize) -> Self {
        MemoryKv {
            entries: Mutex::new(BTreeMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    fn used_bytes(entries: &BTreeMap<String, String>) -> usize {
        entries.iter().map(|(k, v)| k.len() + v.len()).sum()
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        MemoryKv::new()
    }
}

impl KeyValueBackend for MemoryKv {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(quota) = self.quota_bytes {
            let existing = entries.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
            let after = Self::used_bytes(&entries) - existing + key.len() + value.len();
            if after > quota {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                });
            }
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

// =============================================================================
// File Backend
// =============================================================================

/// File-backed backend: one file per key under a data directory.
///
/// Values are written to a temporary sibling file and renamed into place,
/// so a reader never observes a torn value for a key.
pub struct FileKv {
    root: PathBuf,
}

impl FileKv {
    /// Creates a file backend rooted at `dir`, creating the directory if
    /// needed.
    pub fn new(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = dir.into();
        fs::create_dir_all(&root).map_err(|e| StoreError::KvIo {
            key: root.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(FileKv { root })
    }

    /// Maps a key to its on-disk path. Keys here are fixed identifiers
    /// (`camarim-*`), but arbitrary input is still flattened to a safe
    /// file name.
    fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(safe)
    }

    fn io_err(key: &str, err: std::io::Error) -> StoreError {
        StoreError::KvIo {
            key: key.to_string(),
            reason: err.to_string(),
        }
    }
}

impl KeyValueBackend for FileKv {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Self::io_err(key, e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");

        let mut file = fs::File::create(&tmp).map_err(|e| Self::io_err(key, e))?;
        file.write_all(value.as_bytes())
            .map_err(|e| Self::io_err(key, e))?;
        file.sync_all().map_err(|e| Self::io_err(key, e))?;

        fs::rename(&tmp, &path).map_err(|e| Self::io_err(key, e))
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_err(key, e)),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_kv_round_trip() {
        let kv = MemoryKv::new();
        assert_eq!(kv.get("a").unwrap(), None);

        kv.set("a", "hello").unwrap();
        assert_eq!(kv.get("a").unwrap().as_deref(), Some("hello"));
        assert!(kv.contains("a").unwrap());

        kv.remove("a").unwrap();
        assert_eq!(kv.get("a").unwrap(), None);
    }

    #[test]
    fn test_memory_kv_quota_rejects_oversized_write() {
        let kv = MemoryKv::with_quota(10);

        // "k" + "12345" = 6 bytes, fits
        kv.set("k", "12345").unwrap();

        // replacing with a value that blows the quota fails...
        let err = kv.set("k", "1234567890").unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { .. }));

        // ...and the old value is untouched
        assert_eq!(kv.get("k").unwrap().as_deref(), Some("12345"));
    }

    #[test]
    fn test_memory_kv_quota_counts_replacement_not_sum() {
        let kv = MemoryKv::with_quota(10);
        kv.set("k", "12345").unwrap();
        // same size replacement stays within quota
        kv.set("k", "54321").unwrap();
        assert_eq!(kv.get("k").unwrap().as_deref(), Some("54321"));
    }

    #[test]
    fn test_file_kv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::new(dir.path()).unwrap();

        assert_eq!(kv.get("camarim-system-data").unwrap(), None);

        kv.set("camarim-system-data", r#"{"products":[]}"#).unwrap();
        assert_eq!(
            kv.get("camarim-system-data").unwrap().as_deref(),
            Some(r#"{"products":[]}"#)
        );

        kv.remove("camarim-system-data").unwrap();
        assert_eq!(kv.get("camarim-system-data").unwrap(), None);
    }

    #[test]
    fn test_file_kv_remove_absent_key_is_ok() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::new(dir.path()).unwrap();
        kv.remove("never-written").unwrap();
    }

    #[test]
    fn test_file_kv_overwrite_replaces_whole_value() {
        let dir = tempfile::tempdir().unwrap();
        let kv = FileKv::new(dir.path()).unwrap();

        kv.set("key", "a longer first value").unwrap();
        kv.set("key", "short").unwrap();
        assert_eq!(kv.get("key").unwrap().as_deref(), Some("short"));
    }
}
