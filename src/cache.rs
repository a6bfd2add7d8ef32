//! Bounded bucket-value cache.
//!
//! Bucketizers resolve bucket ids against the backing store on every lookup;
//! this cache fronts those lookups. Eviction is FIFO over insertion order: a
//! hash map answers lookups, a queue remembers which key to drop when the
//! capacity is reached.
//!
//! The cache is owned by exactly one bucketizer and is not thread-safe. It is
//! purely a performance layer — a miss always falls through to the store.

use std::collections::{HashMap, VecDeque};

/// Default capacity used when a bucketizer is opened without one: 64 Ki entries.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024 * 64;

/// Fixed-capacity byte-key/byte-value map with FIFO eviction.
pub struct Cache {
    map: HashMap<Vec<u8>, Vec<u8>>,
    queue: VecDeque<Vec<u8>>,
    capacity: usize,
}

impl Cache {
    /// Create a cache holding at most `capacity` entries.
    ///
    /// A capacity of 0 disables the cache entirely: `put` becomes a no-op and
    /// every lookup misses.
    pub fn new(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity.min(DEFAULT_CACHE_CAPACITY)),
            queue: VecDeque::new(),
            capacity,
        }
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Look up the value stored for `key`.
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.map.get(key).map(|v| v.as_slice())
    }

    /// Insert a key/value pair, evicting the oldest entry when full.
    ///
    /// Re-inserting an existing key updates its value without touching the
    /// eviction order.
    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        if self.capacity == 0 {
            return;
        }

        if let Some(slot) = self.map.get_mut(key) {
            *slot = value.to_vec();
            return;
        }

        if self.queue.len() == self.capacity {
            if let Some(oldest) = self.queue.pop_front() {
                self.map.remove(&oldest);
            }
        }

        self.map.insert(key.to_vec(), value.to_vec());
        self.queue.push_back(key.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_and_miss() {
        let mut cache = Cache::new(4);
        cache.put(b"k1", b"v1");
        assert_eq!(cache.get(b"k1"), Some(b"v1".as_ref()));
        assert_eq!(cache.get(b"k2"), None);
    }

    #[test]
    fn test_fifo_eviction_at_capacity() {
        let mut cache = Cache::new(3);
        cache.put(b"a", b"1");
        cache.put(b"b", b"2");
        cache.put(b"c", b"3");

        // Fourth insert evicts the oldest ("a"), not the most recent.
        cache.put(b"d", b"4");
        assert_eq!(cache.get(b"a"), None);
        assert_eq!(cache.get(b"b"), Some(b"2".as_ref()));
        assert_eq!(cache.get(b"d"), Some(b"4".as_ref()));
    }

    #[test]
    fn test_reinsert_updates_without_eviction() {
        let mut cache = Cache::new(2);
        cache.put(b"a", b"1");
        cache.put(b"b", b"2");
        cache.put(b"a", b"9");
        assert_eq!(cache.get(b"a"), Some(b"9".as_ref()));
        assert_eq!(cache.get(b"b"), Some(b"2".as_ref()));
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let mut cache = Cache::new(0);
        cache.put(b"a", b"1");
        assert_eq!(cache.get(b"a"), None);
    }
}
