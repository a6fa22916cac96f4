//! Cache-aside TTL cache shared by the response cache and the gallery cache.
//!
//! Entries carry a sliding TTL (extended on every hit) bounded by an absolute
//! ceiling measured from insertion. Time is read only through `Clock`.
//! Expired entries are swept every `PRUNE_EVERY` inserts, so keys that are
//! never read again do not accumulate.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use crate::clock::Clock;

/// Inserts between two sweeps of expired entries.
pub const PRUNE_EVERY: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub sliding: Duration,
    pub absolute: Duration,
}

impl CachePolicy {
    pub fn new(sliding_secs: i64, absolute_secs: i64) -> Self {
        Self {
            sliding: Duration::seconds(sliding_secs),
            absolute: Duration::seconds(absolute_secs),
        }
    }
}

struct Entry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
    last_access: DateTime<Utc>,
}

impl<V> Entry<V> {
    fn is_live(&self, now: DateTime<Utc>, policy: &CachePolicy) -> bool {
        now - self.last_access < policy.sliding && now - self.inserted_at < policy.absolute
    }
}

pub struct TtlCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    policy: CachePolicy,
    clock: Arc<dyn Clock>,
    inserts: AtomicUsize,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(policy: CachePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            policy,
            clock,
            inserts: AtomicUsize::new(0),
        }
    }

    /// Live value for `key`, extending its sliding window. Expired entries are
    /// evicted on the way.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get_mut(key) {
            Some(entry) if entry.is_live(now, &self.policy) => {
                entry.last_access = now;
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: K, value: V) {
        let now = self.clock.now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                last_access: now,
            },
        );

        let inserts = self.inserts.fetch_add(1, Ordering::Relaxed) + 1;
        if inserts % PRUNE_EVERY == 0 {
            let before = entries.len();
            entries.retain(|_, entry| entry.is_live(now, &self.policy));
            tracing::debug!(evicted = before - entries.len(), "pruned expired cache entries");
        }
    }

    pub fn invalidate(&self, key: &K) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }

    pub fn invalidate_all(&self) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// ResponseCache
// =============================================================================

/// Content-addressed cache of model completions keyed by
/// `sha256(category, prompt)`.
pub struct ResponseCache {
    inner: TtlCache<String, String>,
}

impl ResponseCache {
    pub fn new(policy: CachePolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: TtlCache::new(policy, clock),
        }
    }

    pub fn key(category: &str, prompt: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(category.as_bytes());
        hasher.update([0u8]);
        hasher.update(prompt.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn get(&self, category: &str, prompt: &str) -> Option<String> {
        let hit = self.inner.get(&Self::key(category, prompt));
        tracing::debug!(category, hit = hit.is_some(), "response cache lookup");
        hit
    }

    pub fn insert(&self, category: &str, prompt: &str, response: String) {
        self.inner.insert(Self::key(category, prompt), response);
    }

    pub fn invalidate(&self, category: &str, prompt: &str) {
        self.inner.invalidate(&Self::key(category, prompt));
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
