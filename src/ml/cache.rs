//! TTL caches for remote model results.
//!
//! Importance results live for minutes, summaries for a day, and embeddings
//! are kept until evicted by capacity. Keys are content hashes so retries and
//! re-ingests of the same text never pay for a second remote call.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;
use sha2::{Digest, Sha256};

struct Entry<V> {
    value: V,
    stored_at: Instant,
}

/// Bounded LRU cache with an optional time-to-live.
pub struct TtlCache<V> {
    inner: Mutex<LruCache<String, Entry<V>>>,
    ttl: Option<Duration>,
}

impl<V: Clone> TtlCache<V> {
    /// A cache holding at most `capacity` entries; `None` ttl keeps entries
    /// until LRU eviction.
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("non-zero capacity");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut cache = self.inner.lock().expect("cache lock");

        match cache.get(key) {
            Some(entry) => {
                if let Some(ttl) = self.ttl
                    && entry.stored_at.elapsed() > ttl
                {
                    cache.pop(key);
                    return None;
                }
                Some(entry.value.clone())
            }
            None => None,
        }
    }

    pub fn insert(&self, key: String, value: V) {
        let mut cache = self.inner.lock().expect("cache lock");
        cache.put(
            key,
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock").len()
    }
}

/// Cache key for a model call: hash of the model version and the input text.
pub fn text_key(model_version: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model_version.as_bytes());
    hasher.update(b"|");
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
