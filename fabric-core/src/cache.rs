//! Bounded keyed cache (C3): a local mirror of externally-sourced keys used
//! by the Discovery Watcher and the Microservice Router's registration cache.
//!
//! An `IndexMap`-backed map, pared down from LRU-with-access-tracking to the
//! simpler add-or-update/get/delete shape needed here: O(1) lookup and a
//! documented overflow policy, not idle eviction.

use indexmap::IndexMap;
use std::hash::Hash;

/// A bounded `key -> value` map with insertion-order tracking.
///
/// Overflow policy: evict-oldest. When `add_or_update` would grow the map
/// past `capacity` with a genuinely new key, the oldest entry (by insertion
/// order, not last access — this cache does not track access) is evicted to
/// make room. `IndexMap`'s shift-removal keeps the remaining order stable.
pub struct Cache<K, V>
where
    K: Clone + Eq + Hash,
{
    entries: IndexMap<K, V>,
    capacity: usize,
}

impl<K, V> Cache<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Inserts or overwrites `key`. Overwriting an existing key never evicts.
    pub fn add_or_update(&mut self, key: K, value: V) {
        if self.entries.contains_key(&key) {
            self.entries.insert(key, value);
            return;
        }
        if self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        self.entries.insert(key, value);
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Removes `key`, returning its value if present.
    pub fn delete(&mut self, key: &K) -> Option<V> {
        self.entries.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter()
    }

    fn evict_oldest(&mut self) {
        self.entries.shift_remove_index(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_or_update_then_get() {
        let mut cache = Cache::new(4);
        cache.add_or_update("a".to_string(), 1);
        cache.add_or_update("b".to_string(), 2);
        assert_eq!(cache.get(&"a".to_string()), Some(&1));
        assert_eq!(cache.get(&"b".to_string()), Some(&2));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn update_existing_does_not_grow_or_evict() {
        let mut cache = Cache::new(2);
        cache.add_or_update("a".to_string(), 1);
        cache.add_or_update("b".to_string(), 2);
        cache.add_or_update("a".to_string(), 99);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a".to_string()), Some(&99));
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut cache = Cache::new(2);
        cache.add_or_update("a".to_string(), 1);
        cache.add_or_update("b".to_string(), 2);
        cache.add_or_update("c".to_string(), 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.get(&"b".to_string()), Some(&2));
        assert_eq!(cache.get(&"c".to_string()), Some(&3));
    }

    #[test]
    fn delete_removes_entry() {
        let mut cache = Cache::new(4);
        cache.add_or_update("a".to_string(), 1);
        assert_eq!(cache.delete(&"a".to_string()), Some(1));
        assert_eq!(cache.get(&"a".to_string()), None);
        assert_eq!(cache.delete(&"a".to_string()), None);
    }
}
