//! A generic LRU cache, supplementing the core with the bounded-memory
//! lookup the reference's `lru.go` provides and the teacher's own
//! `cache::Cache` (`src/cache/core.rs`) independently wraps the `lru` crate
//! for. Unlike that cache, this one carries no TTL, no background eviction
//! thread, and no value-specific size accounting: it exists so the table
//! reader can keep hot decoded blocks around without coupling the cache to
//! any one key or value shape.
//!
//! Not internally synchronized; a caller wanting shared access wraps it in
//! `parking_lot::Mutex`, as the rest of this crate does for interior
//! mutability.

use lru::LruCache;
use std::borrow::Borrow;
use std::hash::Hash;
use std::num::NonZeroUsize;

/// A fixed-capacity, get-promotes-to-most-recent cache.
pub struct BlockCache<K, V> {
    inner: LruCache<K, V>,
}

impl<K: Hash + Eq + Clone, V: Clone> BlockCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to at least 1");
        BlockCache { inner: LruCache::new(cap) }
    }

    /// Looks up `key`, promoting it to most-recently-used on a hit. A miss
    /// leaves the cache unchanged.
    pub fn get<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.get(key).cloned()
    }

    /// Inserts `value` under `key`, evicting the least-recently-used entry
    /// if the cache is at capacity.
    pub fn put(&mut self, key: K, value: V) {
        self.inner.put(key, value);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.inner.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_hit_promotes_entry() {
        let mut cache: BlockCache<&str, i32> = BlockCache::new(3);
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("c", 3);
        // Touch "a" so it is no longer the least-recently-used entry.
        assert_eq!(cache.get("a"), Some(1));
        cache.put("d", 4);
        // "b" was least-recently-used and should have been evicted.
        assert_eq!(cache.get("b"), None);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.get("d"), Some(4));
    }

    #[test]
    fn get_on_miss_does_not_insert() {
        let mut cache: BlockCache<&str, i32> = BlockCache::new(2);
        assert_eq!(cache.get("missing"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut cache: BlockCache<i32, i32> = BlockCache::new(2);
        cache.put(1, 10);
        cache.put(2, 20);
        cache.put(3, 30);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.cap(), 2);
        assert_eq!(cache.get(&1), None);
    }
}
