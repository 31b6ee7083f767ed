//! Time-bounded records shared between concurrent requests.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{PoisonError, RwLock},
    time::{Duration, Instant},
};

#[derive(Debug, Clone)]
pub struct CacheRecord<T> {
    pub data: T,
    pub timestamp: Instant,
}

impl<T> CacheRecord<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            timestamp: Instant::now(),
        }
    }

    pub fn is_valid(&self, ttl: Duration) -> bool {
        self.timestamp.elapsed() < ttl
    }
}

/// Map of records that expire `ttl` after they were written.
///
/// Records are inserted and replaced whole under the write lock, so readers
/// only ever see complete values. Concurrent misses on one key are not
/// coalesced; each caller computes and the last write wins.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    records: RwLock<HashMap<K, CacheRecord<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Returns a clone of the record's data when present and not expired.
    /// An expired record found here is removed.
    pub fn get(&self, key: &K) -> Option<V> {
        {
            let records = self.records.read().unwrap_or_else(PoisonError::into_inner);
            match records.get(key) {
                Some(record) if record.is_valid(self.ttl) => return Some(record.data.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        // another writer may have refreshed the key between the two locks
        match records.get(key) {
            Some(record) if record.is_valid(self.ttl) => return Some(record.data.clone()),
            Some(_) => {}
            None => return None,
        }
        records.remove(key);
        None
    }

    /// Stores `data` under `key` and drops every expired record, so keys
    /// that are never read again do not accumulate.
    pub fn insert(&self, key: K, data: V) {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let ttl = self.ttl;
        records.retain(|_, record| record.is_valid(ttl));
        records.insert(key, CacheRecord::new(data));
    }

    /// Drops one record; returns whether it existed.
    pub fn invalidate(&self, key: &K) -> bool {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.remove(key).is_some()
    }

    /// Number of stored records. Expired ones count until the next `get` of
    /// their key or the next `insert`.
    pub fn record_count(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn returns_fresh_records() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1);
        assert_eq!(cache.get(&"a"), Some(1));
        assert_eq!(cache.get(&"b"), None);
    }

    #[test]
    fn expired_record_is_dropped_on_read() {
        let cache = TtlCache::new(Duration::ZERO);
        cache.insert("a", 1);
        assert_eq!(cache.record_count(), 1);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.record_count(), 0);
    }

    #[test]
    fn insert_drops_expired_records_of_other_keys() {
        let cache = TtlCache::new(Duration::from_millis(20));
        cache.insert("a", 1);
        cache.insert("b", 2);
        thread::sleep(Duration::from_millis(40));

        cache.insert("c", 3);
        assert_eq!(cache.record_count(), 1);
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn invalidate_removes_single_key() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("b", 2);

        assert!(cache.invalidate(&"a"));
        assert!(!cache.invalidate(&"a"));
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
    }

    #[test]
    fn insert_replaces_previous_record() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a", 1);
        cache.insert("a", 2);
        assert_eq!(cache.get(&"a"), Some(2));
        assert_eq!(cache.record_count(), 1);
    }

    #[test]
    fn concurrent_writers_leave_complete_records() {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(60)));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for _ in 0..100 {
                        cache.insert("shared", vec![i; 16]);
                        if let Some(v) = cache.get(&"shared") {
                            assert!(v.iter().all(|x| *x == v[0]));
                        }
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        let v = cache.get(&"shared").unwrap();
        assert_eq!(v.len(), 16);
    }
}
