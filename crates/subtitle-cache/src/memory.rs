//! Tier-1 in-process cache: bounded, TTL-expiring, single-mutex-guarded.
//!
//! Grounded on the same single-lock guarded-map-with-capacity-eviction
//! shape as the request-rate limiter cache in the teacher's API layer,
//! adapted here into a generic value cache with hit/miss accounting.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

struct Entry {
    value: Value,
    inserted_at: Instant,
    ttl: Duration,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

#[derive(Default)]
struct Stats {
    hits: u64,
    misses: u64,
}

/// Bounded in-process cache. LRU-by-insertion-order eviction when at
/// capacity; per-entry TTL; no TTL refresh on read.
pub struct MemoryCache {
    max_entries: usize,
    inner: Mutex<(HashMap<String, Entry>, Vec<String>, Stats)>,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            inner: Mutex::new((HashMap::new(), Vec::new(), Stats::default())),
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut guard = self.inner.lock().expect("memory cache mutex poisoned");
        let now = Instant::now();
        let (map, _order, stats) = &mut *guard;
        match map.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                stats.hits += 1;
                Some(entry.value.clone())
            }
            Some(_) => {
                map.remove(key);
                stats.misses += 1;
                None
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    /// Single-lock batch lookup; misses are simply absent from the map.
    pub fn get_many(&self, keys: &[String]) -> HashMap<String, Value> {
        let mut guard = self.inner.lock().expect("memory cache mutex poisoned");
        let now = Instant::now();
        let (map, _order, stats) = &mut *guard;
        let mut out = HashMap::new();
        for key in keys {
            match map.get(key) {
                Some(entry) if !entry.is_expired(now) => {
                    stats.hits += 1;
                    out.insert(key.clone(), entry.value.clone());
                }
                Some(_) => {
                    map.remove(key);
                    stats.misses += 1;
                }
                None => stats.misses += 1,
            }
        }
        out
    }

    pub fn set(&self, key: &str, value: Value, ttl: Duration) {
        let mut guard = self.inner.lock().expect("memory cache mutex poisoned");
        let (map, order, _stats) = &mut *guard;

        if !map.contains_key(key) {
            if order.len() >= self.max_entries {
                if let Some(oldest) = order.first().cloned() {
                    map.remove(&oldest);
                    order.remove(0);
                }
            }
            order.push(key.to_string());
        }

        map.insert(
            key.to_string(),
            Entry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut guard = self.inner.lock().expect("memory cache mutex poisoned");
        let (map, order, _stats) = &mut *guard;
        let removed = map.remove(key).is_some();
        order.retain(|k| k != key);
        removed
    }

    pub fn clear(&self) {
        let mut guard = self.inner.lock().expect("memory cache mutex poisoned");
        let (map, order, _stats) = &mut *guard;
        map.clear();
        order.clear();
    }

    pub fn size(&self) -> usize {
        self.inner.lock().expect("memory cache mutex poisoned").0.len()
    }

    /// (hits, misses)
    pub fn hit_miss(&self) -> (u64, u64) {
        let guard = self.inner.lock().expect("memory cache mutex poisoned");
        (guard.2.hits, guard.2.misses)
    }

    pub fn hit_rate(&self) -> f64 {
        let (hits, misses) = self.hit_miss();
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_then_get_hits() {
        let cache = MemoryCache::new(10);
        cache.set("a", json!("1"), Duration::from_secs(60));
        assert_eq!(cache.get("a"), Some(json!("1")));
        let (hits, misses) = cache.hit_miss();
        assert_eq!(hits, 1);
        assert_eq!(misses, 0);
    }

    #[test]
    fn missing_key_counts_as_miss() {
        let cache = MemoryCache::new(10);
        assert_eq!(cache.get("missing"), None);
        let (hits, misses) = cache.hit_miss();
        assert_eq!(hits, 0);
        assert_eq!(misses, 1);
    }

    #[test]
    fn expired_entry_is_evicted_on_read() {
        let cache = MemoryCache::new(10);
        cache.set("a", json!("1"), Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn eviction_at_capacity_drops_oldest() {
        let cache = MemoryCache::new(2);
        cache.set("a", json!(1), Duration::from_secs(60));
        cache.set("b", json!(2), Duration::from_secs(60));
        cache.set("c", json!(3), Duration::from_secs(60));
        assert_eq!(cache.size(), 2);
        assert_eq!(cache.get("a"), None);
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn get_many_returns_present_only() {
        let cache = MemoryCache::new(10);
        cache.set("a", json!(1), Duration::from_secs(60));
        let result = cache.get_many(&["a".to_string(), "missing".to_string()]);
        assert_eq!(result.len(), 1);
        assert!(result.contains_key("a"));
    }

    #[test]
    fn hit_rate_is_zero_with_no_activity() {
        let cache = MemoryCache::new(10);
        assert_eq!(cache.hit_rate(), 0.0);
    }
}
