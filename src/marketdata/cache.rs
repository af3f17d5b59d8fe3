/// TTL cache with conditional refresh and stale fallback
///
/// Reads go straight to a sharded map and never wait on a refresh. Misses take a
/// per-key async lock so only one task refreshes a given key; tasks that queued
/// behind it reuse the value it stored.
use super::types::{Fetched, MarketData, Validators};
use crate::errors::MarketDataError;
use crate::logger::{self, LogTag};
use crate::utils::retry_async;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

/// Cached value with its freshness timestamp and upstream validators
pub struct CacheEntry<T> {
    pub value: Arc<T>,
    pub fetched_at: DateTime<Utc>,
    pub validators: Validators,
    refreshed_at: Instant,
}

impl<T> Clone for CacheEntry<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            fetched_at: self.fetched_at,
            validators: self.validators.clone(),
            refreshed_at: self.refreshed_at,
        }
    }
}

impl<T> CacheEntry<T> {
    fn to_market_data(&self, degraded: bool) -> MarketData<T> {
        MarketData {
            value: Arc::clone(&self.value),
            fetched_at: self.fetched_at,
            degraded,
        }
    }
}

/// How old a cached value may be before a refresh is attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// Use the cache's TTL
    IfExpired,
    /// Tighter bound than the TTL for this call
    OlderThan(Duration),
    /// Always ask upstream (still conditional)
    Always,
}

/// Timeout and retry budget for one refresh
#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub attempts: usize,
    pub initial_delay: Duration,
}

#[derive(Default)]
struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    not_modified: AtomicU64,
    stale_serves: AtomicU64,
    refreshes: AtomicU64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub not_modified: u64,
    pub stale_serves: u64,
    pub refreshes: u64,
}

impl CacheStats {
    pub fn merge(&self, other: &CacheStats) -> CacheStats {
        CacheStats {
            entries: self.entries + other.entries,
            hits: self.hits + other.hits,
            misses: self.misses + other.misses,
            not_modified: self.not_modified + other.not_modified,
            stale_serves: self.stale_serves + other.stale_serves,
            refreshes: self.refreshes + other.refreshes,
        }
    }
}

pub struct TtlCache<K, T>
where
    K: Clone + Eq + Hash + Debug,
{
    name: &'static str,
    ttl: Duration,
    capacity: usize,
    entries: DashMap<K, CacheEntry<T>>,
    refresh_locks: DashMap<K, Arc<AsyncMutex<()>>>,
    metrics: CacheMetrics,
}

impl<K, T> TtlCache<K, T>
where
    K: Clone + Eq + Hash + Debug,
{
    pub fn new(name: &'static str, ttl: Duration, capacity: usize) -> Self {
        Self {
            name,
            ttl,
            capacity: capacity.max(1),
            entries: DashMap::new(),
            refresh_locks: DashMap::new(),
            metrics: CacheMetrics::default(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current entry regardless of age
    pub fn peek(&self, key: &K) -> Option<CacheEntry<T>> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            not_modified: self.metrics.not_modified.load(Ordering::Relaxed),
            stale_serves: self.metrics.stale_serves.load(Ordering::Relaxed),
            refreshes: self.metrics.refreshes.load(Ordering::Relaxed),
        }
    }

    fn max_age(&self, refresh: Refresh) -> Option<Duration> {
        match refresh {
            Refresh::IfExpired => Some(self.ttl),
            Refresh::OlderThan(limit) => Some(limit.min(self.ttl)),
            Refresh::Always => None,
        }
    }

    fn lookup_fresh(&self, key: &K, refresh: Refresh) -> Option<MarketData<T>> {
        let max_age = self.max_age(refresh)?;
        let entry = self.entries.get(key)?;
        if entry.refreshed_at.elapsed() <= max_age {
            Some(entry.to_market_data(false))
        } else {
            None
        }
    }

    fn refresh_lock(&self, key: &K) -> Arc<AsyncMutex<()>> {
        self.refresh_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Return a fresh value, refreshing from upstream when needed
    ///
    /// `fetch` receives the validators of the current entry (empty on first
    /// fetch). A `NotModified` answer only moves the entry's timestamps. When
    /// every attempt fails the last known value is returned with
    /// `degraded = true`; with nothing cached the error propagates.
    pub async fn get_or_refresh<F, Fut>(
        &self,
        key: &K,
        refresh: Refresh,
        policy: FetchPolicy,
        fetch: F,
    ) -> Result<MarketData<T>, MarketDataError>
    where
        F: Fn(Validators) -> Fut,
        Fut: Future<Output = Result<Fetched<T>, MarketDataError>>,
    {
        if let Some(hit) = self.lookup_fresh(key, refresh) {
            self.metrics.hits.fetch_add(1, Ordering::Relaxed);
            logger::verbose(LogTag::MarketData, &format!("{} cache hit: {:?}", self.name, key));
            return Ok(hit);
        }
        self.metrics.misses.fetch_add(1, Ordering::Relaxed);

        let requested_at = Instant::now();
        let lock = self.refresh_lock(key);
        let result = {
            let _guard = lock.lock().await;

            // Another task may have refreshed while we waited
            let refreshed_meanwhile = self
                .entries
                .get(key)
                .filter(|e| e.refreshed_at >= requested_at)
                .map(|e| e.to_market_data(false));

            match refreshed_meanwhile {
                Some(data) => Ok(data),
                None => self.refresh(key, policy, &fetch).await,
            }
        };
        result
    }

    async fn refresh<F, Fut>(
        &self,
        key: &K,
        policy: FetchPolicy,
        fetch: &F,
    ) -> Result<MarketData<T>, MarketDataError>
    where
        F: Fn(Validators) -> Fut,
        Fut: Future<Output = Result<Fetched<T>, MarketDataError>>,
    {
        let current = self.peek(key);
        let validators = current
            .as_ref()
            .map(|e| e.validators.clone())
            .unwrap_or_default();
        let name = self.name;

        self.metrics.refreshes.fetch_add(1, Ordering::Relaxed);
        let outcome = retry_async(
            |attempt| {
                let fut = fetch(validators.clone());
                async move {
                    if attempt > 1 {
                        logger::debug(
                            LogTag::MarketData,
                            &format!("{} refresh attempt {}", name, attempt),
                        );
                    }
                    match tokio::time::timeout(policy.timeout, fut).await {
                        Ok(result) => result,
                        Err(_) => Err(MarketDataError::Timeout {
                            resource: name.to_string(),
                            timeout_ms: policy.timeout.as_millis() as u64,
                        }),
                    }
                }
            },
            policy.attempts,
            policy.initial_delay,
            MarketDataError::is_retryable,
        )
        .await;

        match (outcome, current) {
            (Ok(Fetched::Fresh { value, validators }), _) => {
                let entry = CacheEntry {
                    value: Arc::new(value),
                    fetched_at: Utc::now(),
                    validators,
                    refreshed_at: Instant::now(),
                };
                let data = entry.to_market_data(false);
                self.store(key.clone(), entry);
                Ok(data)
            }
            (Ok(Fetched::NotModified), Some(mut entry)) => {
                self.metrics.not_modified.fetch_add(1, Ordering::Relaxed);
                logger::debug(LogTag::MarketData, &format!("{} not modified: {:?}", name, key));
                entry.fetched_at = Utc::now();
                entry.refreshed_at = Instant::now();
                let data = entry.to_market_data(false);
                self.store(key.clone(), entry);
                Ok(data)
            }
            (Ok(Fetched::NotModified), None) => Err(MarketDataError::Unavailable {
                resource: name.to_string(),
                reason: "upstream answered not-modified but nothing is cached".to_string(),
            }),
            (Err(err), Some(entry)) => {
                self.metrics.stale_serves.fetch_add(1, Ordering::Relaxed);
                logger::warning(
                    LogTag::MarketData,
                    &format!("{} refresh failed ({}), serving stale value for {:?}", name, err, key),
                );
                Ok(entry.to_market_data(true))
            }
            (Err(err), None) => Err(err),
        }
    }

    fn store(&self, key: K, entry: CacheEntry<T>) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            let ttl = self.ttl;
            self.entries.retain(|_, e| e.refreshed_at.elapsed() <= ttl);
            // A lock nobody holds a clone of cannot have waiters; the shard
            // guard keeps new clones out while we decide
            self.refresh_locks
                .retain(|k, lock| self.entries.contains_key(k) || Arc::strong_count(lock) > 1);
        }
        self.entries.insert(key, entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn policy() -> FetchPolicy {
        FetchPolicy {
            timeout: Duration::from_millis(200),
            attempts: 2,
            initial_delay: Duration::from_millis(1),
        }
    }

    fn fresh(value: &str, etag: &str) -> Result<Fetched<String>, MarketDataError> {
        Ok(Fetched::Fresh {
            value: value.to_string(),
            validators: Validators {
                etag: Some(etag.to_string()),
                last_modified: None,
            },
        })
    }

    fn transport_error() -> Result<Fetched<String>, MarketDataError> {
        Err(MarketDataError::Transport {
            resource: "test".to_string(),
            reason: "connection reset".to_string(),
        })
    }

    #[tokio::test]
    async fn test_hit_within_ttl_skips_upstream() {
        let cache: TtlCache<String, String> = TtlCache::new("test", Duration::from_secs(60), 16);
        let calls = AtomicUsize::new(0);
        let key = "k".to_string();

        for _ in 0..3 {
            let data = cache
                .get_or_refresh(&key, Refresh::IfExpired, policy(), |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { fresh("v1", "e1") }
                })
                .await
                .unwrap();
            assert_eq!(*data.value, "v1");
            assert!(!data.degraded);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_not_modified_refreshes_timestamp_only() {
        let cache: TtlCache<String, String> = TtlCache::new("test", Duration::from_secs(60), 16);
        let key = "k".to_string();

        let first = cache
            .get_or_refresh(&key, Refresh::IfExpired, policy(), |_| async { fresh("v1", "e1") })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;

        let seen = parking_lot::Mutex::new(Validators::default());
        let second = cache
            .get_or_refresh(&key, Refresh::Always, policy(), |validators| {
                *seen.lock() = validators;
                async { Ok(Fetched::NotModified) }
            })
            .await
            .unwrap();

        assert_eq!(seen.lock().etag.as_deref(), Some("e1"));
        assert!(Arc::ptr_eq(&first.value, &second.value));
        assert_eq!(*second.value, "v1");
        assert!(second.fetched_at > first.fetched_at);
        assert_eq!(cache.peek(&key).unwrap().validators.etag.as_deref(), Some("e1"));
        assert_eq!(cache.stats().not_modified, 1);
    }

    #[tokio::test]
    async fn test_failure_serves_stale_then_propagates_without_cache() {
        let cache: TtlCache<String, String> = TtlCache::new("test", Duration::from_secs(60), 16);
        let key = "k".to_string();

        cache
            .get_or_refresh(&key, Refresh::IfExpired, policy(), |_| async { fresh("v1", "e1") })
            .await
            .unwrap();

        let stale = cache
            .get_or_refresh(&key, Refresh::Always, policy(), |_| async { transport_error() })
            .await
            .unwrap();
        assert!(stale.degraded);
        assert_eq!(*stale.value, "v1");
        assert_eq!(cache.stats().stale_serves, 1);

        let missing = cache
            .get_or_refresh(&"other".to_string(), Refresh::IfExpired, policy(), |_| async {
                transport_error()
            })
            .await;
        assert!(matches!(missing, Err(MarketDataError::Transport { .. })));
    }

    #[tokio::test]
    async fn test_retries_transient_errors_then_succeeds() {
        let cache: TtlCache<String, String> = TtlCache::new("test", Duration::from_secs(60), 16);
        let calls = AtomicUsize::new(0);

        let data = cache
            .get_or_refresh(&"k".to_string(), Refresh::IfExpired, policy(), |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        transport_error()
                    } else {
                        fresh("v2", "e2")
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(*data.value, "v2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let cache: TtlCache<String, String> = TtlCache::new("test", Duration::from_secs(60), 16);
        let fast_policy = FetchPolicy {
            timeout: Duration::from_millis(10),
            attempts: 1,
            initial_delay: Duration::from_millis(1),
        };

        let result = cache
            .get_or_refresh(&"k".to_string(), Refresh::IfExpired, fast_policy, |_| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                fresh("late", "e")
            })
            .await;

        assert!(matches!(result, Err(MarketDataError::Timeout { timeout_ms: 10, .. })));
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_refresh() {
        let cache = Arc::new(TtlCache::<String, String>::new("test", Duration::from_secs(60), 16));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_refresh(&"k".to_string(), Refresh::IfExpired, policy(), |_| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            fresh("shared", "e")
                        }
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(*handle.await.unwrap().unwrap().value, "shared");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_lock_survives_between_refreshes() {
        let cache = Arc::new(TtlCache::<String, String>::new("test", Duration::from_secs(60), 16));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = "k".to_string();

        cache
            .get_or_refresh(&key, Refresh::IfExpired, policy(), |_| async { fresh("v1", "e1") })
            .await
            .unwrap();
        assert_eq!(cache.refresh_locks.len(), 1);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_refresh(&"k".to_string(), Refresh::Always, policy(), |_| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async {
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            fresh("v2", "e2")
                        }
                    })
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(*handle.await.unwrap().unwrap().value, "v2");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.refresh_locks.len(), 1);
    }

    #[tokio::test]
    async fn test_eviction_drops_unheld_refresh_locks() {
        let cache: TtlCache<String, String> = TtlCache::new("test", Duration::from_millis(1), 1);

        cache
            .get_or_refresh(&"old".to_string(), Refresh::IfExpired, policy(), |_| async {
                fresh("v1", "e1")
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache
            .get_or_refresh(&"new".to_string(), Refresh::IfExpired, policy(), |_| async {
                fresh("v2", "e2")
            })
            .await
            .unwrap();

        assert!(cache.peek(&"old".to_string()).is_none());
        assert!(!cache.refresh_locks.contains_key(&"old".to_string()));
        assert!(cache.refresh_locks.contains_key(&"new".to_string()));
    }
}
