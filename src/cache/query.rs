//! Optimized query wrapper.
//!
//! Composes a remote fetch with the TTL cache, hit/miss and latency
//! accounting, optional debouncing for filter-typing paths, prefetch for
//! cache warming ahead of navigation, and the optimistic-mutation pattern
//! used by appointment updates.

use regex::Regex;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::keys::KeySpec;
use crate::cache::ttl::TtlCache;
use crate::types::Result;

// ============================================================================
// Metrics
// ============================================================================

/// Side-channel performance tracking for query paths.
#[derive(Debug, Default)]
pub struct QueryMetrics {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    fetches: AtomicU64,
    fetch_millis_total: AtomicU64,
}

/// Point-in-time view of [`QueryMetrics`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryMetricsSnapshot {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub fetches: u64,
    pub avg_fetch_ms: f64,
}

impl QueryMetrics {
    fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_fetch(&self, elapsed: Duration) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        self.fetch_millis_total
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> QueryMetricsSnapshot {
        let fetches = self.fetches.load(Ordering::Relaxed);
        let total = self.fetch_millis_total.load(Ordering::Relaxed);
        QueryMetricsSnapshot {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            fetches,
            avg_fetch_ms: if fetches == 0 {
                0.0
            } else {
                total as f64 / fetches as f64
            },
        }
    }
}

// ============================================================================
// Query state
// ============================================================================

/// Observable lifecycle of one query subscription.
///
/// Transitions: `Idle -> Loading -> (Success | Error)`. An error state
/// carries stale cached data when any is still held, so the UI can render
/// an explicit stale indicator instead of an indefinite failure.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState {
    Idle,
    Loading,
    Success {
        data: Value,
        fetched_at: DateTime<Utc>,
    },
    Error {
        message: String,
        stale: Option<Value>,
    },
}

impl QueryState {
    pub fn is_loading(&self) -> bool {
        matches!(self, QueryState::Loading)
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            QueryState::Success { data, .. } => Some(data),
            QueryState::Error { stale, .. } => stale.as_ref(),
            _ => None,
        }
    }
}

// ============================================================================
// Query client
// ============================================================================

/// Cache-composed query executor shared across feature hooks.
///
/// Constructed at startup and passed by reference; tests build their own
/// instance for isolation.
pub struct QueryClient {
    cache: Arc<TtlCache<Value>>,
    metrics: Arc<QueryMetrics>,
    /// Latest debounce token per cache key; a newer token supersedes
    /// pending calls still inside their quiet window.
    debounce_tokens: DashMap<String, Arc<AtomicU64>>,
}

impl QueryClient {
    pub fn new(cache: Arc<TtlCache<Value>>) -> Self {
        Self {
            cache,
            metrics: Arc::new(QueryMetrics::default()),
            debounce_tokens: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &Arc<TtlCache<Value>> {
        &self.cache
    }

    pub fn metrics(&self) -> QueryMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Cache-first fetch. On hit the remote call is skipped entirely; on
    /// miss the fetch runs (coalesced with concurrent misses), is timed,
    /// and its result is stored under the key's TTL.
    pub async fn fetch<F, Fut>(&self, spec: &KeySpec, fetch_fn: F) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if let Some(cached) = self.cache.get(&spec.key) {
            self.metrics.record_hit();
            debug!(key = %spec.key, "query cache hit");
            return Ok(cached);
        }
        self.metrics.record_miss();

        let metrics = self.metrics.clone();
        let key = spec.key.clone();
        self.cache
            .get_or_set(&spec.key, spec.ttl, move || async move {
                let started = Instant::now();
                let result = fetch_fn().await;
                let elapsed = started.elapsed();
                metrics.record_fetch(elapsed);
                debug!(
                    key = %key,
                    elapsed_ms = elapsed.as_millis() as u64,
                    ok = result.is_ok(),
                    "query fetched"
                );
                result
            })
            .await
    }

    /// Debounced fetch for rapid successive calls (filter typing).
    ///
    /// Waits out the quiet `window` before fetching; a newer call on the
    /// same key within the window supersedes this one, which then resolves
    /// `Ok(None)` ("no result yet"). Cache hits bypass the window.
    pub async fn fetch_debounced<F, Fut>(
        &self,
        spec: &KeySpec,
        window: Duration,
        fetch_fn: F,
    ) -> Result<Option<Value>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if let Some(cached) = self.cache.get(&spec.key) {
            self.metrics.record_hit();
            return Ok(Some(cached));
        }

        let counter = self
            .debounce_tokens
            .entry(spec.key.clone())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone();
        let token = counter.fetch_add(1, Ordering::SeqCst) + 1;

        tokio::time::sleep(window).await;

        if counter.load(Ordering::SeqCst) != token {
            debug!(key = %spec.key, "debounced call superseded");
            return Ok(None);
        }

        self.fetch(spec, fetch_fn).await.map(Some)
    }

    /// Warm the cache ahead of navigation. Fetch failures are logged and
    /// dropped; prefetching is never load-bearing.
    pub async fn prefetch<F, Fut>(&self, spec: &KeySpec, fetch_fn: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if self.cache.get_stale(&spec.key).is_some() {
            return;
        }
        if let Err(e) = self.fetch(spec, fetch_fn).await {
            debug!(key = %spec.key, error = %e, "prefetch failed");
        }
    }

    /// Run a query and drive an observable [`QueryState`] through
    /// `Loading -> Success | Error`. On error, any value still held for
    /// the key (fresh or expired) is surfaced as stale data.
    pub async fn run_watched<F, Fut>(
        &self,
        spec: &KeySpec,
        fetch_fn: F,
    ) -> watch::Receiver<QueryState>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        let (tx, rx) = watch::channel(QueryState::Loading);

        match self.fetch(spec, fetch_fn).await {
            Ok(data) => {
                let _ = tx.send(QueryState::Success {
                    data,
                    fetched_at: Utc::now(),
                });
            }
            Err(e) => {
                let stale = self.cache.get_stale(&spec.key);
                if stale.is_some() {
                    warn!(key = %spec.key, error = %e, "query failed, stale data available");
                }
                let _ = tx.send(QueryState::Error {
                    message: e.to_string(),
                    stale,
                });
            }
        }

        rx
    }

    /// Optimistic mutation against a cached list.
    ///
    /// Rewrites the cached value through `rewrite` before the mutation
    /// resolves, keeping a snapshot of the prior state. Mutation failure
    /// restores the exact snapshot (never a partial merge) and surfaces
    /// the error. Success invalidates the key - and any derived keys
    /// matching `invalidates` - so the next read refetches canonical state.
    pub async fn optimistic_update<R, Fut>(
        &self,
        spec: &KeySpec,
        rewrite: R,
        mutation: Fut,
        invalidates: Option<&Regex>,
    ) -> Result<Value>
    where
        R: FnOnce(Value) -> Value,
        Fut: Future<Output = Result<Value>>,
    {
        let snapshot = self.cache.get(&spec.key);
        if let Some(current) = snapshot.clone() {
            self.cache.set(&spec.key, rewrite(current), spec.ttl);
        }

        match mutation.await {
            Ok(confirmed) => {
                self.cache.invalidate(&spec.key);
                if let Some(pattern) = invalidates {
                    self.cache.invalidate_pattern(pattern);
                }
                Ok(confirmed)
            }
            Err(e) => {
                match snapshot {
                    Some(prior) => self.cache.set(&spec.key, prior, spec.ttl),
                    None => {
                        self.cache.invalidate(&spec.key);
                    }
                }
                warn!(key = %spec.key, error = %e, "optimistic update rolled back");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::keys;
    use crate::platform::store::StoreError;
    use crate::types::CoreError;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn client() -> QueryClient {
        QueryClient::new(Arc::new(TtlCache::new()))
    }

    fn unavailable() -> CoreError {
        CoreError::Store(StoreError::Unavailable("down".to_string()))
    }

    #[tokio::test]
    async fn test_fetch_hits_cache_second_time() {
        let client = client();
        let spec = keys::dashboard_metrics("biz-1", "week");
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let v = client
                .fetch(&spec, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(json!({"revenue": 1200}))
                })
                .await
                .unwrap();
            assert_eq!(v["revenue"], 1200);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let metrics = client.metrics();
        assert_eq!(metrics.cache_hits, 2);
        assert_eq!(metrics.cache_misses, 1);
        assert_eq!(metrics.fetches, 1);
    }

    #[tokio::test]
    async fn test_fetch_error_propagates_uncached() {
        let client = client();
        let spec = keys::service_list("biz-1");

        let err = client
            .fetch(&spec, || async { Err(unavailable()) })
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(client.cache().get(&spec.key).is_none());
    }

    #[tokio::test]
    async fn test_debounce_supersession() {
        let client = Arc::new(client());
        let spec = keys::client_list("biz-1", &json!({"q": "an"}));

        let first = {
            let client = client.clone();
            let spec = spec.clone();
            tokio::spawn(async move {
                client
                    .fetch_debounced(&spec, Duration::from_millis(50), || async {
                        Ok(json!(["stale"]))
                    })
                    .await
            })
        };

        // A second call inside the window supersedes the first
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = client
            .fetch_debounced(&spec, Duration::from_millis(20), || async {
                Ok(json!(["fresh"]))
            })
            .await
            .unwrap();

        assert_eq!(second, Some(json!(["fresh"])));
        assert_eq!(first.await.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn test_debounced_cache_hit_bypasses_window() {
        let client = client();
        let spec = keys::client_list("biz-1", &json!({"q": "an"}));
        client.cache().set(&spec.key, json!(["cached"]), spec.ttl);

        let started = Instant::now();
        let v = client
            .fetch_debounced(&spec, Duration::from_secs(5), || async {
                Ok(json!(["fetched"]))
            })
            .await
            .unwrap();
        assert_eq!(v, Some(json!(["cached"])));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_prefetch_warms_cache() {
        let client = client();
        let spec = keys::service_list("biz-1");

        client
            .prefetch(&spec, || async { Ok(json!(["cut", "color"])) })
            .await;
        assert_eq!(client.cache().get(&spec.key), Some(json!(["cut", "color"])));
    }

    #[tokio::test]
    async fn test_run_watched_success() {
        let client = client();
        let spec = keys::dashboard_metrics("biz-1", "day");

        let rx = client
            .run_watched(&spec, || async { Ok(json!({"visits": 9})) })
            .await;
        match &*rx.borrow() {
            QueryState::Success { data, .. } => assert_eq!(data["visits"], 9),
            other => panic!("unexpected state: {other:?}"),
        };
    }

    #[tokio::test]
    async fn test_run_watched_error_carries_stale() {
        let client = client();
        let spec = keys::dashboard_metrics("biz-1", "day");

        // Expired entry still physically present
        client.cache().set(&spec.key, json!({"visits": 5}), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(5)).await;

        let rx = client
            .run_watched(&spec, || async { Err(unavailable()) })
            .await;
        match &*rx.borrow() {
            QueryState::Error { stale, .. } => {
                assert_eq!(stale.as_ref().unwrap()["visits"], 5)
            }
            other => panic!("unexpected state: {other:?}"),
        };
    }

    #[tokio::test]
    async fn test_optimistic_rollback_restores_exact_snapshot() {
        let client = client();
        let spec = keys::appointment_list("biz-1", "2026-08-01", "2026-08-07");
        let original = json!([
            {"id": "A", "status": "booked"},
            {"id": "B", "status": "booked"},
            {"id": "C", "status": "booked"},
        ]);
        client.cache().set(&spec.key, original.clone(), spec.ttl);

        let err = client
            .optimistic_update(
                &spec,
                |mut list| {
                    list[1]["status"] = json!("cancelled");
                    list
                },
                async { Err(unavailable()) },
                None,
            )
            .await
            .unwrap_err();
        assert!(err.is_transient());

        // Byte-for-byte equal to the pre-mutation list
        assert_eq!(client.cache().get(&spec.key), Some(original));
    }

    #[tokio::test]
    async fn test_optimistic_success_invalidates() {
        let client = client();
        let spec = keys::appointment_list("biz-1", "2026-08-01", "2026-08-07");
        client.cache().set(&spec.key, json!([{"id": "A"}]), spec.ttl);
        client.cache().set(
            "tenant:biz-1:dashboard:week",
            json!({"visits": 3}),
            Duration::from_secs(60),
        );

        let pattern = keys::tenant_invalidation_pattern("biz-1", "dashboard");
        client
            .optimistic_update(
                &spec,
                |list| list,
                async { Ok(json!({"id": "A", "status": "done"})) },
                Some(&pattern),
            )
            .await
            .unwrap();

        assert!(client.cache().get(&spec.key).is_none());
        assert!(client.cache().get("tenant:biz-1:dashboard:week").is_none());
    }

    #[tokio::test]
    async fn test_optimistic_applies_rewrite_before_resolution() {
        let client = client();
        let spec = keys::appointment_list("biz-1", "2026-08-01", "2026-08-01");
        client
            .cache()
            .set(&spec.key, json!([{"id": "A", "status": "booked"}]), spec.ttl);

        // The mutation future observes the cache mid-flight
        let cache = client.cache().clone();
        let key = spec.key.clone();
        let observed = client
            .optimistic_update(
                &spec,
                |mut list| {
                    list[0]["status"] = json!("cancelled");
                    list
                },
                async move {
                    let mid = cache.get(&key);
                    Ok(json!({"mid": mid}))
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(observed["mid"][0]["status"], "cancelled");
    }
}
