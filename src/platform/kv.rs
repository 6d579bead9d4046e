//! Synchronous key-value string persistence.
//!
//! Browser local-storage semantics: string keys and values, size-bounded,
//! writes can fail on quota. Callers treat persistence as best-effort.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Errors from the client-side persistence store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    /// The store is full; the write was rejected
    #[error("storage quota exceeded")]
    QuotaExceeded,
}

/// Local-storage-shaped persistence.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str);
}

/// In-memory key-value store with an optional byte quota.
///
/// The quota path exists so tests can exercise swallowed write failures.
pub struct MemoryKv {
    items: DashMap<String, String>,
    used_bytes: AtomicUsize,
    quota_bytes: Option<usize>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
            used_bytes: AtomicUsize::new(0),
            quota_bytes: None,
        }
    }

    /// Store that rejects writes once `quota_bytes` of values are held.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::new()
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryKv {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.get(key).map(|v| v.clone())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let old_len = self.items.get(key).map(|v| v.len()).unwrap_or(0);
        if let Some(quota) = self.quota_bytes {
            let projected = self.used_bytes.load(Ordering::Relaxed) - old_len + value.len();
            if projected > quota {
                return Err(StorageError::QuotaExceeded);
            }
        }

        self.items.insert(key.to_string(), value.to_string());
        self.used_bytes
            .fetch_add(value.len().wrapping_sub(old_len), Ordering::Relaxed);
        Ok(())
    }

    fn remove_item(&self, key: &str) {
        if let Some((_, old)) = self.items.remove(key) {
            self.used_bytes.fetch_sub(old.len(), Ordering::Relaxed);
        }
    }
}
