//! In-memory TTL cache.
//!
//! Memoizes remote call results per cache key. Expired entries are removed
//! lazily on read and periodically by a sweep task so memory stays bounded
//! independent of read traffic. Concurrent misses on the same key coalesce
//! behind a per-key guard so one upstream call serves all racing callers.
//!
//! The cache never fails on its own behalf: factory errors in
//! [`TtlCache::get_or_set`] propagate to the caller uncached.

use dashmap::DashMap;
use regex::Regex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

struct Entry<T> {
    value: T,
    stored_at: Instant,
    ttl: Duration,
}

impl<T> Entry<T> {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() > self.ttl
    }
}

/// Cache hit/miss/eviction counters.
#[derive(Debug, Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    coalesced: AtomicU64,
}

/// Snapshot of cache statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Read-through calls that waited on another caller's in-flight fetch
    pub coalesced: u64,
}

/// Key-value store with per-entry time-to-live.
///
/// Entries are owned by the cache; readers receive clones, so mutating a
/// returned value never affects cached state.
pub struct TtlCache<T: Clone + Send + Sync + 'static> {
    entries: DashMap<String, Entry<T>>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
    stats: CacheStats,
}

impl<T: Clone + Send + Sync + 'static> TtlCache<T> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            inflight: DashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Store a value. Overwrites any existing entry unconditionally
    /// (last-writer-wins, no versioning).
    pub fn set(&self, key: &str, value: T, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Get a value, or `None` if absent or expired.
    ///
    /// Expired entries are deleted as a side effect of the read.
    pub fn get(&self, key: &str) -> Option<T> {
        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired() {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.value.clone());
            }
            drop(entry);
            self.entries.remove(key);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Get a value even if expired, without stats or eviction side effects.
    ///
    /// Opportunistic: an expired entry survives only until the next read or
    /// sweep touches it. Used by the query layer's stale-on-error policy.
    pub fn get_stale(&self, key: &str) -> Option<T> {
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Remove one entry. Returns whether anything was removed.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every key matching `pattern`. Returns the number removed.
    ///
    /// Used when a mutation affects an unknown set of derived keys, e.g.
    /// every filtered client-list cache for one tenant.
    pub fn invalidate_pattern(&self, pattern: &Regex) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, _| {
            if pattern.is_match(key) {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            debug!(pattern = %pattern, removed, "pattern invalidation");
        }
        removed
    }

    /// Read-through: return the cached value, or run `factory`, store its
    /// result, and return it.
    ///
    /// Concurrent callers racing on the same missing key wait on a per-key
    /// guard and re-check the cache once the first caller has stored, so a
    /// burst of simultaneous mounts triggers one upstream call. Factory
    /// errors propagate uncached and release the guard for the next caller.
    pub async fn get_or_set<F, Fut, E>(&self, key: &str, ttl: Duration, factory: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let guard = self
            .inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _held = guard.lock().await;

        // Another caller may have filled the slot while we waited.
        if let Some(value) = self.get(key) {
            self.stats.coalesced.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        let result = factory().await;
        if let Ok(ref value) = result {
            self.set(key, value.clone(), ttl);
        }

        drop(_held);
        // Best-effort guard cleanup; a caller arriving exactly now simply
        // creates a fresh guard and hits the populated cache.
        self.inflight.remove(key);

        result
    }

    /// Scan all entries and evict expired ones. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            if entry.is_expired() {
                removed += 1;
                false
            } else {
                true
            }
        });
        if removed > 0 {
            self.stats.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            coalesced: self.stats.coalesced.load(Ordering::Relaxed),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn a background task that sweeps expired entries every `interval`.
///
/// The handle must be aborted on application teardown; environments that
/// create and destroy many instances (tests, server rendering) leak timers
/// otherwise.
pub fn spawn_sweep_task<T: Clone + Send + Sync + 'static>(
    cache: Arc<TtlCache<T>>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let evicted = cache.sweep();
            if evicted > 0 {
                debug!(evicted, remaining = cache.len(), "cache sweep completed");
            }
        }
    })
}
