//! # TTL Memoization Cache
//!
//! Explicit, injectable replacement for decorator-style memoization.
//!
//! - [`CacheStore`] is the backing store (`get/set/invalidate/clear`);
//!   [`MemoryStore`] keeps entries in a process-wide map.
//! - [`Clock`] is injectable so staleness is deterministic in tests.
//! - [`Memoizer::get_or_fetch`] returns a fresh entry (`now - created < ttl`)
//!   without calling the fetcher; otherwise it fetches and stores.
//!
//! Check-then-populate runs under a per-key async gate, so concurrent callers
//! asking for the same key trigger exactly one fetch. A gate lives only while
//! someone holds it, and expired entries are swept whenever a value is stored.

use metrics::counter;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// `(function identity, argument tuple)` rendered as strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub namespace: &'static str,
    pub args: String,
}

impl CacheKey {
    pub fn new(namespace: &'static str, args: impl Into<String>) -> Self {
        Self {
            namespace,
            args: args.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.namespace, self.args)
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub created: Instant,
    pub ttl: Duration,
}

impl<V> CacheEntry<V> {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created) < self.ttl
    }
}

/// Source of "now" for staleness checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *lock(&self.offset) += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *lock(&self.offset)
    }
}

/// Pluggable backing store.
pub trait CacheStore<V>: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry<V>>;
    fn set(&self, key: CacheKey, entry: CacheEntry<V>);
    /// Returns `true` if an entry was removed.
    fn invalidate(&self, key: &CacheKey) -> bool;
    /// Drop every entry whose namespace matches.
    fn invalidate_namespace(&self, namespace: &str) -> usize {
        self.invalidate_matching(&|k: &CacheKey| k.namespace == namespace)
    }
    /// Drop every entry whose key satisfies `pred`.
    fn invalidate_matching(&self, pred: &dyn Fn(&CacheKey) -> bool) -> usize;
    /// Drop every entry that is no longer fresh at `now`.
    fn purge_stale(&self, now: Instant) -> usize;
    fn clear(&self);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store. Rebuilt from empty on restart.
#[derive(Debug)]
pub struct MemoryStore<V> {
    inner: Mutex<HashMap<CacheKey, CacheEntry<V>>>,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send> CacheStore<V> for MemoryStore<V> {
    fn get(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        lock(&self.inner).get(key).cloned()
    }

    fn set(&self, key: CacheKey, entry: CacheEntry<V>) {
        lock(&self.inner).insert(key, entry);
    }

    fn invalidate(&self, key: &CacheKey) -> bool {
        lock(&self.inner).remove(key).is_some()
    }

    fn invalidate_matching(&self, pred: &dyn Fn(&CacheKey) -> bool) -> usize {
        let mut map = lock(&self.inner);
        let before = map.len();
        map.retain(|k, _| !pred(k));
        before - map.len()
    }

    fn purge_stale(&self, now: Instant) -> usize {
        let mut map = lock(&self.inner);
        let before = map.len();
        map.retain(|_, e| e.is_fresh(now));
        before - map.len()
    }

    fn clear(&self) {
        lock(&self.inner).clear();
    }

    fn len(&self) -> usize {
        lock(&self.inner).len()
    }
}

/// Memoizes async fetchers over a [`CacheStore`].
pub struct Memoizer<V> {
    store: Arc<dyn CacheStore<V>>,
    clock: Arc<dyn Clock>,
    gates: Gates,
}

impl<V: Clone + Send + 'static> Memoizer<V> {
    /// In-memory store and wall clock.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    pub fn new(store: Arc<dyn CacheStore<V>>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            gates: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore<V>> {
        &self.store
    }

    /// Return the cached value for `key`, or run `fetch` and store its result.
    pub async fn get_or_fetch<F, Fut>(&self, key: CacheKey, ttl: Duration, fetch: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        self.get_or_fetch_if(key, ttl, fetch, |_| true).await
    }

    /// Like [`get_or_fetch`](Self::get_or_fetch), but only stores results for
    /// which `keep` returns `true`. Rejected results are still returned.
    pub async fn get_or_fetch_if<F, Fut, K>(
        &self,
        key: CacheKey,
        ttl: Duration,
        fetch: F,
        keep: K,
    ) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
        K: FnOnce(&V) -> bool,
    {
        if let Some(v) = self.fresh(&key) {
            counter!("cache_hits_total", "namespace" => key.namespace).increment(1);
            tracing::debug!(target: "cache", key = %key, "hit");
            return v;
        }

        let lease = self.lease(&key);
        let _guard = lease.gate.lock().await;

        // Another caller may have populated the entry while we waited.
        if let Some(v) = self.fresh(&key) {
            counter!("cache_hits_total", "namespace" => key.namespace).increment(1);
            tracing::debug!(target: "cache", key = %key, "hit after wait");
            return v;
        }

        counter!("cache_misses_total", "namespace" => key.namespace).increment(1);
        tracing::debug!(target: "cache", key = %key, ttl_secs = ttl.as_secs(), "miss");

        let value = fetch().await;
        if keep(&value) {
            let swept = self.store.purge_stale(self.clock.now());
            if swept > 0 {
                tracing::debug!(target: "cache", swept, "dropped stale entries");
            }
            self.store.set(
                key,
                CacheEntry {
                    value: value.clone(),
                    created: self.clock.now(),
                    ttl,
                },
            );
        }
        value
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.store.invalidate(key)
    }

    pub fn invalidate_namespace(&self, namespace: &str) -> usize {
        self.store.invalidate_namespace(namespace)
    }

    pub fn invalidate_matching(&self, pred: impl Fn(&CacheKey) -> bool) -> usize {
        self.store.invalidate_matching(&pred)
    }

    /// Drop expired entries without waiting for the next store.
    pub fn purge_stale(&self) -> usize {
        self.store.purge_stale(self.clock.now())
    }

    pub fn clear(&self) {
        self.store.clear();
        lock(&self.gates).clear();
    }

    fn fresh(&self, key: &CacheKey) -> Option<V> {
        let entry = self.store.get(key)?;
        entry.is_fresh(self.clock.now()).then_some(entry.value)
    }

    fn lease(&self, key: &CacheKey) -> GateLease<'_> {
        let gate = lock(&self.gates)
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        GateLease {
            gates: &self.gates,
            key: key.clone(),
            gate,
        }
    }
}

type Gates = Mutex<HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>;

/// A caller's hold on a key's gate. The last holder removes the gate from the
/// map on drop, including when the fetch future is cancelled.
struct GateLease<'a> {
    gates: &'a Gates,
    key: CacheKey,
    gate: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for GateLease<'_> {
    fn drop(&mut self) {
        let mut gates = lock(self.gates);
        // Map + this lease; a new caller would have cloned under the same lock.
        let last = gates
            .get(&self.key)
            .is_some_and(|g| Arc::ptr_eq(g, &self.gate) && Arc::strong_count(g) == 2);
        if last {
            gates.remove(&self.key);
        }
    }
}

/// Poison-tolerant lock: a panicked writer leaves the map usable.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poison) => poison.into_inner(),
    }
}
