//! Generation-keyed cache of collected query results.
//!
//! Entries are addressed by the structural fingerprint of the logical query
//! and tagged with the database total generation at the time they were
//! computed. Any committed or rolled back mutation bumps the total
//! generation, so validity is a single integer comparison and no explicit
//! invalidation is needed. Capacity is bounded with LRU eviction.

use alloc::rc::Rc;
use hashbrown::HashMap;
use tracing::debug;

use crate::result::QueryResult;

struct CacheEntry {
    result: Rc<QueryResult>,
    generation: u64,
    last_access: u64,
}

/// LRU result cache. A capacity of zero disables caching.
pub struct ResultCache {
    entries: HashMap<u64, CacheEntry>,
    capacity: usize,
    /// Global access counter for LRU tracking.
    access_counter: u64,
    hits: u64,
    misses: u64,
}

impl ResultCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
            access_counter: 0,
            hits: 0,
            misses: 0,
        }
    }

    /// Returns true when the cache stores nothing.
    pub fn is_disabled(&self) -> bool {
        self.capacity == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Looks up `fingerprint`, valid only if cached at `generation`.
    ///
    /// A stale entry counts as a miss and is dropped.
    pub fn get(&mut self, fingerprint: u64, generation: u64) -> Option<Rc<QueryResult>> {
        if self.is_disabled() {
            return None;
        }
        self.access_counter += 1;
        match self.entries.get_mut(&fingerprint) {
            Some(entry) if entry.generation == generation => {
                entry.last_access = self.access_counter;
                self.hits += 1;
                debug!(fingerprint, generation, "result cache hit");
                Some(entry.result.clone())
            }
            Some(entry) => {
                debug!(
                    fingerprint,
                    cached = entry.generation,
                    current = generation,
                    "result cache entry is stale"
                );
                self.entries.remove(&fingerprint);
                self.misses += 1;
                None
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Stores `result` for `fingerprint` at `generation`, evicting the least
    /// recently used entry when full.
    pub fn insert(&mut self, fingerprint: u64, generation: u64, result: Rc<QueryResult>) {
        if self.is_disabled() {
            return;
        }
        if !self.entries.contains_key(&fingerprint) && self.entries.len() >= self.capacity {
            self.evict_lru();
        }
        self.access_counter += 1;
        self.entries.insert(
            fingerprint,
            CacheEntry {
                result,
                generation,
                last_access: self.access_counter,
            },
        );
    }

    fn evict_lru(&mut self) {
        let lru_key = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(k, _)| *k);
        if let Some(key) = lru_key {
            debug!(fingerprint = key, "result cache eviction");
            self.entries.remove(&key);
        }
    }

    /// Drops every entry and resets the statistics.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    /// Returns cache hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::ResultColumn;
    use alloc::string::String;
    use alloc::vec;
    use strata_core::{DataType, Value};

    fn result(v: i64) -> Rc<QueryResult> {
        Rc::new(QueryResult::new(
            vec![ResultColumn {
                name: String::from("v"),
                data_type: DataType::Int64,
            }],
            vec![vec![Value::Int64(v)]],
        ))
    }

    #[test]
    fn test_hit_and_miss() {
        let mut cache = ResultCache::new(4);
        assert!(cache.get(1, 0).is_none());
        cache.insert(1, 0, result(10));
        let hit = cache.get(1, 0).unwrap();
        assert_eq!(hit.value(0, 0), Some(&Value::Int64(10)));
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.hit_rate(), 0.5);
    }

    #[test]
    fn test_stale_generation_is_miss() {
        let mut cache = ResultCache::new(4);
        cache.insert(1, 3, result(10));
        assert!(cache.get(1, 4).is_none());
        assert!(cache.is_empty());
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = ResultCache::new(2);
        cache.insert(1, 0, result(1));
        cache.insert(2, 0, result(2));
        // touch 1 so 2 is the eviction victim
        assert!(cache.get(1, 0).is_some());
        cache.insert(3, 0, result(3));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(2, 0).is_none());
        assert!(cache.get(1, 0).is_some());
        assert!(cache.get(3, 0).is_some());
    }

    #[test]
    fn test_replacing_entry_does_not_evict() {
        let mut cache = ResultCache::new(2);
        cache.insert(1, 0, result(1));
        cache.insert(2, 0, result(2));
        cache.insert(2, 1, result(5));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(2, 1).unwrap().value(0, 0), Some(&Value::Int64(5)));
    }

    #[test]
    fn test_zero_capacity_disables() {
        let mut cache = ResultCache::new(0);
        cache.insert(1, 0, result(1));
        assert!(cache.is_empty());
        assert!(cache.get(1, 0).is_none());
        assert_eq!(cache.misses(), 0);
    }

    #[test]
    fn test_clear() {
        let mut cache = ResultCache::new(2);
        cache.insert(1, 0, result(1));
        cache.get(1, 0);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.hits(), 0);
    }
}
