//! Memoized page computations with a time-to-live.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Results keyed by the arguments that produced them. Entries older than the
/// TTL are recomputed and swept out on the next insert; a zero TTL disables
/// caching.
pub struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Arc<V>)>>,
}

impl<V> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<V>> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(key) {
            Some((stored, value)) if stored.elapsed() < self.ttl => Some(Arc::clone(value)),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: String, value: V) -> Arc<V> {
        let value = Arc::new(value);
        if self.ttl.is_zero() {
            return value;
        }
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|_, (stored, _)| stored.elapsed() < self.ttl);
            entries.insert(key, (Instant::now(), Arc::clone(&value)));
        }
        value
    }

    /// Cached value for `key`, or the result of `compute` which is stored on
    /// success.
    pub fn get_or_try_insert<E>(
        &self,
        key: String,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        if let Some(hit) = self.get(&key) {
            log::debug!("cache hit: {key}");
            return Ok(hit);
        }
        let value = compute()?;
        Ok(self.insert(key, value))
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
