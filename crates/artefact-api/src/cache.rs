//! # TTL Caches
//!
//! Process-local, bounded caches with a fixed time-to-live per entry. All
//! caches here are best effort: losing an entry only costs an extra remote
//! call. Expiry uses [`tokio::time::Instant`] so tests can drive it with a
//! paused clock.
//!
//! [`ResolvingCache`] wraps a [`TtlCache`] with a miss path that computes
//! the value through a supplied resolution function. Failed resolutions are
//! not cached.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Longest time-to-live any cache honours.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// Bounded map whose entries expire a fixed time after insertion.
///
/// When full, inserting first drops every expired entry and then, if still
/// full, the entry closest to expiry.
pub struct TtlCache<K, V> {
    name: &'static str,
    ttl: Duration,
    capacity: usize,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("name", &self.name)
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .field("len", &self.entries.lock().len())
            .finish()
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// An empty cache. A capacity of zero is treated as one and the TTL is
    /// capped at [`MAX_TTL`].
    pub fn new(name: &'static str, ttl: Duration, capacity: usize) -> Self {
        Self {
            name,
            ttl: ttl.min(MAX_TTL),
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The live value for `key`, if any. Expired entries are removed.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert or replace `key`, restarting its time-to-live.
    pub fn put(&self, key: K, value: V) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            entries.retain(|_, e| e.expires_at > now);
            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, e)| e.expires_at)
                    .map(|(k, _)| k.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                    tracing::debug!(cache = self.name, "cache full, evicted entry closest to expiry");
                }
            }
        }
        entries.insert(
            key,
            Entry {
                value,
                // Unrepresentable expiry: the entry is stale on arrival.
                expires_at: now.checked_add(self.ttl).unwrap_or(now),
            },
        );
    }

    pub fn remove(&self, key: &K) {
        self.entries.lock().remove(key);
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

/// A [`TtlCache`] whose miss path computes the value.
pub struct ResolvingCache<K, V> {
    inner: TtlCache<K, V>,
}

impl<K, V> std::fmt::Debug for ResolvingCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ResolvingCache").field(&self.inner).finish()
    }
}

impl<K, V> ResolvingCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(name: &'static str, ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: TtlCache::new(name, ttl, capacity),
        }
    }

    /// The cached value without resolving.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.get(key)
    }

    /// Store a value obtained some other way.
    pub fn put(&self, key: K, value: V) {
        self.inner.put(key, value);
    }

    /// The cached value, or the result of `resolve` which is then cached.
    ///
    /// The cache lock is not held while `resolve` runs, so two concurrent
    /// misses on the same key both resolve. Callers that need exactly one
    /// resolution per key serialize around this call.
    pub async fn get_or_resolve<F, Fut, E>(&self, key: K, resolve: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.inner.get(&key) {
            return Ok(value);
        }
        let value = resolve().await?;
        self.inner.put(key, value.clone());
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
