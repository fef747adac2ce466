// Bounded TTL cache - time-boxed values with access-count eviction
// Author: kelexine (https://github.com/kelexine)

use crate::cache::models::{CacheEntry, CacheStats, EntryStats};
use crate::config::CacheConfig;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

type SharedFetch<V, E> = Shared<BoxFuture<'static, std::result::Result<V, Arc<E>>>>;

/// In-flight fetches are per key and per error type.
type FlightKey = (String, TypeId);

/// In-memory cache keyed by string with a per-entry TTL and a hard size cap.
///
/// When full, `set` evicts the entry with the fewest successful reads
/// (ties go to the first one met while iterating the map). This is
/// frequency based, not recency based: an old entry that is read often
/// outlives a fresh one that is never read.
///
/// Expired entries are removed lazily when read, never by a sweeper.
///
/// The handle is cheap to clone; clones share the same storage.
pub struct TtlCache<V> {
    inner: Arc<CacheInner<V>>,
}

struct CacheInner<V> {
    capacity: usize,
    default_ttl: Duration,
    state: Mutex<CacheState<V>>,
    /// (key, `TypeId` of `E`) → `SharedFetch<V, E>` for fetches still running.
    inflight: Mutex<HashMap<FlightKey, Box<dyn Any + Send + Sync>>>,
}

struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<V> Clone for TtlCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a cache holding at most `capacity` entries.
    ///
    /// A zero capacity is bumped to one; `AppConfig::validate` rejects it
    /// earlier for configured caches.
    pub fn new(capacity: usize, default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                capacity: capacity.max(1),
                default_ttl,
                state: Mutex::new(CacheState {
                    entries: HashMap::new(),
                    hits: 0,
                    misses: 0,
                    evictions: 0,
                }),
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, config.default_ttl())
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    /// Look up a fresh value. Expired entries are deleted on the way out.
    pub fn get(&self, key: &str) -> Option<V> {
        self.inner.get(key)
    }

    /// Presence check honoring TTL. Does not count as an access.
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        let state = self.inner.state.lock();
        state
            .entries
            .get(key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    /// Insert with the default TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.inner.insert(key.into(), value, self.inner.default_ttl);
    }

    /// Insert (or replace) with an explicit TTL. Access count and age
    /// start over even when the key already existed.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.inner.insert(key.into(), value, ttl);
    }

    /// Remove one key. Absent keys are ignored.
    pub fn clear(&self, key: &str) {
        let mut state = self.inner.state.lock();
        if state.entries.remove(key).is_some() {
            debug!("Cache entry cleared: {}", key);
        }
        crate::metrics::update_cache_entries(state.entries.len());
    }

    /// Drop every entry. Fetches already running still complete and
    /// populate the cache.
    pub fn clear_all(&self) {
        let mut state = self.inner.state.lock();
        state.entries.clear();
        crate::metrics::update_cache_entries(0);
        debug!("Cache cleared");
    }

    pub fn size(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Snapshot of counters and entries. Reading stats never touches
    /// access counts and never removes expired entries.
    pub fn get_stats(&self) -> CacheStats {
        let now = Instant::now();
        let state = self.inner.state.lock();
        CacheStats {
            size: state.entries.len(),
            capacity: self.inner.capacity,
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            entries: state
                .entries
                .iter()
                .map(|(key, entry)| EntryStats {
                    key: key.clone(),
                    age: entry.age(now),
                    ttl: entry.ttl,
                    access_count: entry.access_count,
                    expired: entry.is_expired(now),
                })
                .collect(),
        }
    }

    /// Serve `key` from the cache, or run `source` once and cache its
    /// successful result for `ttl` (default TTL when `None`).
    ///
    /// Concurrent callers racing on the same cold key share a single
    /// upstream call: `source` is invoked at most once until that call
    /// settles. Errors reach every waiting caller and are not cached.
    /// A panicking `source` panics its waiters but leaves the key usable
    /// for the next call.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        source: F,
    ) -> std::result::Result<V, Arc<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>> + Send + 'static,
        E: Send + Sync + 'static,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let flight_key: FlightKey = (key.to_string(), TypeId::of::<E>());

        let fetch: SharedFetch<V, E> = {
            let mut inflight = self.inner.inflight.lock();

            let pending = match inflight.get(&flight_key) {
                Some(f) => {
                    let shared = f.downcast_ref::<SharedFetch<V, E>>().cloned();
                    if shared.is_none() {
                        warn!("In-flight fetch for {} has an unexpected type, starting another", key);
                    }
                    shared
                }
                None => None,
            };

            match pending {
                Some(existing) => {
                    debug!("Joining in-flight fetch for {}", key);
                    existing
                }
                None => {
                    // A fetch may have settled between the first lookup and
                    // taking the in-flight lock.
                    if let Some(value) = self.inner.peek_fresh(key) {
                        return Ok(value);
                    }

                    debug!("Starting upstream fetch for {}", key);
                    crate::metrics::record_cache_fetch();

                    let upstream = source();
                    let inner = Arc::clone(&self.inner);
                    let owned_key = flight_key.clone();
                    let ttl = ttl.unwrap_or(self.inner.default_ttl);

                    let shared = async move {
                        // The in-flight entry must go even when the source
                        // panics, or every later caller joins a dead future.
                        let outcome = AssertUnwindSafe(upstream).catch_unwind().await;
                        {
                            let mut inflight = inner.inflight.lock();
                            if let Ok(Ok(value)) = &outcome {
                                inner.insert(owned_key.0.clone(), value.clone(), ttl);
                            }
                            inflight.remove(&owned_key);
                        }
                        match outcome {
                            Ok(result) => result.map_err(Arc::new),
                            Err(panic) => std::panic::resume_unwind(panic),
                        }
                    }
                    .boxed()
                    .shared();

                    inflight.insert(flight_key, Box::new(shared.clone()));
                    shared
                }
            }
        };

        fetch.await
    }
}

impl<V: Clone> CacheInner<V> {
    fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        match state.entries.get(key).map(|entry| entry.is_expired(now)) {
            None => {
                state.misses += 1;
                crate::metrics::record_cache_miss();
                None
            }
            Some(true) => {
                state.entries.remove(key);
                state.misses += 1;
                crate::metrics::record_cache_expired();
                crate::metrics::update_cache_entries(state.entries.len());
                debug!("Cache entry expired: {}", key);
                None
            }
            Some(false) => {
                let entry = state.entries.get_mut(key)?;
                entry.access_count += 1;
                let value = entry.data.clone();
                state.hits += 1;
                crate::metrics::record_cache_hit();
                Some(value)
            }
        }
    }

    /// Fresh value without touching counters.
    fn peek_fresh(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let state = self.state.lock();
        state
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.data.clone())
    }

    /// Evict-then-insert runs under one lock so the size cap holds even
    /// with callers on several threads.
    fn insert(&self, key: String, value: V, ttl: Duration) {
        let mut state = self.state.lock();

        if state.entries.len() >= self.capacity {
            let victim = state
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.access_count)
                .map(|(k, _)| k.clone());

            if let Some(victim) = victim {
                state.entries.remove(&victim);
                state.evictions += 1;
                crate::metrics::record_cache_eviction();
                debug!("Evicted least accessed cache entry: {}", victim);
            }
        }

        state.entries.insert(key, CacheEntry::new(value, ttl));
        crate::metrics::update_cache_entries(state.entries.len());
    }
}
