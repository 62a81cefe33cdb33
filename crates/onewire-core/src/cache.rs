//! Property Cache: a short-TTL textual cache keyed by the
//! canonical rendered path, bounded with LRU eviction, bypassed entirely
//! by the `uncached` flag.

use crate::device::ChangeClass;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Instant,
}

/// TTL table driven by `FileType::change_class`: `static` never expires
/// within process lifetime, `stable` 15s, `volatile` 1s, `alarm` always
/// bypasses the cache.
#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub stable: Duration,
    pub volatile: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            stable: Duration::from_secs(15),
            volatile: Duration::from_secs(1),
        }
    }
}

impl CacheTtls {
    fn ttl_for(&self, change_class: ChangeClass) -> Option<Duration> {
        match change_class {
            ChangeClass::Static => Some(Duration::from_secs(u64::MAX / 2)),
            ChangeClass::Stable => Some(self.stable),
            ChangeClass::Volatile => Some(self.volatile),
            ChangeClass::Alarm | ChangeClass::Directory | ChangeClass::Subdir => None,
        }
    }
}

/// Size-bounded, LRU-evicted. `order` tracks recency so the oldest key is
/// known in O(1) without walking the map.
pub struct PropertyCache {
    entries: DashMap<String, Entry>,
    order: Mutex<VecDeque<String>>,
    capacity: usize,
    ttls: CacheTtls,
}

impl PropertyCache {
    pub fn new(capacity: usize, ttls: CacheTtls) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            capacity,
            ttls,
        }
    }

    /// Looks up `key` unless `uncached` or the change class never caches
    /// (`alarm`, `directory`, `subdir`).
    pub fn get(&self, key: &str, change_class: ChangeClass, uncached: bool) -> Option<String> {
        if uncached || self.ttls.ttl_for(change_class).is_none() {
            return None;
        }
        let entry = self.entries.get(key)?;
        if Instant::now() >= entry.expires_at {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Populates the cache after a successful read/write with the
    /// rendered new value; failures invalidate instead.
    pub fn put(&self, key: &str, value: String, change_class: ChangeClass, uncached: bool) {
        let Some(ttl) = self.ttls.ttl_for(change_class) else {
            return;
        };
        if uncached {
            return;
        }
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        let mut order = self.order.lock().expect("cache order mutex poisoned");
        order.retain(|k| k != key);
        order.push_back(key.to_string());
        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.remove(key);
        self.order.lock().expect("cache order mutex poisoned").retain(|k| k != key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alarm_class_never_caches() {
        let cache = PropertyCache::new(8, CacheTtls::default());
        cache.put("/x/alarm_prop", "1".into(), ChangeClass::Alarm, false);
        assert_eq!(cache.get("/x/alarm_prop", ChangeClass::Alarm, false), None);
    }

    #[test]
    fn uncached_flag_bypasses_lookup_and_insertion() {
        let cache = PropertyCache::new(8, CacheTtls::default());
        cache.put("/x/y", "42".into(), ChangeClass::Stable, true);
        assert_eq!(cache.get("/x/y", ChangeClass::Stable, false), None);
    }

    #[test]
    fn capacity_overflow_evicts_the_oldest_entry() {
        let cache = PropertyCache::new(2, CacheTtls::default());
        cache.put("/a", "1".into(), ChangeClass::Stable, false);
        cache.put("/b", "2".into(), ChangeClass::Stable, false);
        cache.put("/c", "3".into(), ChangeClass::Stable, false);
        assert_eq!(cache.get("/a", ChangeClass::Stable, false), None);
        assert_eq!(cache.get("/c", ChangeClass::Stable, false), Some("3".into()));
    }
}
