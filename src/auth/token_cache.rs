//! Token-exchange result cache: TTL expiry plus LRU eviction, keyed by
//! `(subject_hash, backend_id)`.
//!
//! Grounded on the teacher's `stateful/cache.rs` (key derivation + TTL +
//! entry struct, guarded by a `parking_lot::Mutex`), extended with LRU
//! eviction over an `indexmap::IndexMap` since the spec calls out bounded
//! eviction for this cache specifically, where the teacher's base cache is
//! TTL-only.

use std::time::Instant;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::duration::Duration;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct TokenCacheKey {
    pub subject_hash: String,
    pub backend_id: String,
}

impl TokenCacheKey {
    pub fn new(subject_hash: impl Into<String>, backend_id: impl Into<String>) -> Self {
        Self { subject_hash: subject_hash.into(), backend_id: backend_id.into() }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    access_token: String,
    expires_at: Instant,
}

/// A bounded, TTL-aware cache of exchanged tokens. `capacity` is the
/// maximum number of entries kept; once exceeded the least-recently-used
/// entry is evicted (`IndexMap::shift_remove` on the first key, since
/// `get` moves a hit to the back via `move_index`).
pub struct TokenCache {
    capacity: usize,
    entries: Mutex<IndexMap<TokenCacheKey, CacheEntry>>,
}

impl TokenCache {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, entries: Mutex::new(IndexMap::new()) }
    }

    /// Returns the cached access token if present and not expired. A hit
    /// refreshes recency by moving the entry to the back of the map.
    pub fn get(&self, key: &TokenCacheKey) -> Option<String> {
        let mut entries = self.entries.lock();
        let index = entries.get_index_of(key)?;
        if entries[index].expires_at <= Instant::now() {
            entries.shift_remove(key);
            return None;
        }
        entries.move_index(index, entries.len() - 1);
        Some(entries[entries.len() - 1].access_token.clone())
    }

    /// Insert or refresh an entry, evicting the oldest entry if the cache
    /// is over capacity.
    pub fn put(&self, key: TokenCacheKey, access_token: String, ttl: Duration) {
        let mut entries = self.entries.lock();
        entries.shift_remove(&key);
        entries.insert(key, CacheEntry { access_token, expires_at: Instant::now() + ttl.as_std() });
        while entries.len() > self.capacity {
            entries.shift_remove_index(0);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_none_for_missing_key() {
        let cache = TokenCache::new(4);
        assert!(cache.get(&TokenCacheKey::new("sub", "backend")).is_none());
    }

    #[test]
    fn returns_cached_token_before_expiry() {
        let cache = TokenCache::new(4);
        let key = TokenCacheKey::new("sub", "backend");
        cache.put(key.clone(), "tok-1".to_string(), Duration::from_secs(60));
        assert_eq!(cache.get(&key), Some("tok-1".to_string()));
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let cache = TokenCache::new(4);
        let key = TokenCacheKey::new("sub", "backend");
        cache.put(key.clone(), "tok-1".to_string(), Duration::from_secs(0));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(cache.get(&key).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_least_recently_used_entry_past_capacity() {
        let cache = TokenCache::new(2);
        cache.put(TokenCacheKey::new("s1", "b"), "t1".to_string(), Duration::from_secs(60));
        cache.put(TokenCacheKey::new("s2", "b"), "t2".to_string(), Duration::from_secs(60));
        // touch s1 so it becomes most-recently-used
        cache.get(&TokenCacheKey::new("s1", "b"));
        cache.put(TokenCacheKey::new("s3", "b"), "t3".to_string(), Duration::from_secs(60));

        assert!(cache.get(&TokenCacheKey::new("s2", "b")).is_none());
        assert_eq!(cache.get(&TokenCacheKey::new("s1", "b")), Some("t1".to_string()));
        assert_eq!(cache.get(&TokenCacheKey::new("s3", "b")), Some("t3".to_string()));
    }
}
