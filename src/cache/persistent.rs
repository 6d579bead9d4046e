//! Stale-tolerant persisted cache.
//!
//! A TTL cache over the client-side key-value store, so slow-changing data
//! (user role, permissions, onboarding status) survives page reloads. The
//! distinguishing policy is stale-on-error: when a refresh fails but an
//! expired entry is persisted, the expired data is served instead of the
//! error. Availability over freshness - a possibly-outdated role beats a
//! hard failure screen.
//!
//! Persistence writes are best-effort; a full store never blocks a read.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::platform::kv::KeyValueStore;
use crate::types::Result;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    data: Value,
    /// Epoch milliseconds; wall-clock because entries outlive the process
    timestamp: i64,
}

impl PersistedEntry {
    fn is_fresh(&self, ttl: Duration, now_ms: i64) -> bool {
        now_ms.saturating_sub(self.timestamp) <= ttl.as_millis() as i64
    }
}

/// Persisted TTL cache with stale-on-error fallback.
pub struct StaleTolerantCache {
    kv: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl StaleTolerantCache {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self {
            kv,
            prefix: "fd_cache.".to_string(),
        }
    }

    fn storage_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn read_entry(&self, key: &str) -> Option<PersistedEntry> {
        let raw = self.kv.get_item(&self.storage_key(key))?;
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                // Corrupt persisted data is treated as absent
                debug!(key, error = %e, "discarding unparseable cache entry");
                self.kv.remove_item(&self.storage_key(key));
                None
            }
        }
    }

    fn write_entry(&self, key: &str, data: &Value) {
        let entry = PersistedEntry {
            data: data.clone(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        match serde_json::to_string(&entry) {
            Ok(raw) => {
                if let Err(e) = self.kv.set_item(&self.storage_key(key), &raw) {
                    // Caching is an optimization, never a correctness
                    // dependency; quota failures are swallowed.
                    debug!(key, error = %e, "cache persist skipped");
                }
            }
            Err(e) => debug!(key, error = %e, "cache serialize skipped"),
        }
    }

    /// Return fresh persisted data, or refresh through `fetch`.
    ///
    /// - Fresh entry and `force_refresh` unset: returned without fetching.
    /// - Otherwise `fetch` runs; success persists and returns the new data.
    /// - On fetch failure an expired persisted entry, when present, is
    ///   served as a degraded-mode fallback; with nothing persisted the
    ///   error propagates unchanged.
    pub async fn fetch_with_cache<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        force_refresh: bool,
        fetch: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let persisted = self.read_entry(key);
        let now_ms = chrono::Utc::now().timestamp_millis();

        if !force_refresh {
            if let Some(entry) = &persisted {
                if entry.is_fresh(ttl, now_ms) {
                    if let Ok(data) = serde_json::from_value(entry.data.clone()) {
                        debug!(key, "persisted cache hit");
                        return Ok(data);
                    }
                }
            }
        }

        match fetch().await {
            Ok(data) => {
                if let Ok(value) = serde_json::to_value(&data) {
                    self.write_entry(key, &value);
                }
                Ok(data)
            }
            Err(e) => {
                if let Some(entry) = persisted {
                    if let Ok(data) = serde_json::from_value(entry.data) {
                        warn!(key, error = %e, "refresh failed, serving expired cache entry");
                        return Ok(data);
                    }
                }
                Err(e)
            }
        }
    }

    /// Drop the persisted entry for `key`.
    pub fn invalidate(&self, key: &str) {
        self.kv.remove_item(&self.storage_key(key));
    }
}
