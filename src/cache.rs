// cache.rs — bounded LRU store of loaded panoramas keyed by source
//
// The displayed entry is pinned: it is never evicted, even when that leaves the cache one
// entry over capacity. Recency is a monotonically increasing tick (ties broken by key).

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct CacheEntry<P> {
    payload: P,
    last_used: u64,
}

#[derive(Debug, Clone)]
pub struct TextureCache<P> {
    capacity: usize,
    tick: u64,
    entries: BTreeMap<String, CacheEntry<P>>,
    displayed: Option<String>,
}

impl<P: Clone> TextureCache<P> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            tick: 0,
            entries: BTreeMap::new(),
            displayed: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn displayed(&self) -> Option<&str> {
        self.displayed.as_deref()
    }

    /// Hit refreshes recency.
    pub fn get(&mut self, key: &str) -> Option<P> {
        self.tick += 1;
        let entry = self.entries.get_mut(key)?;
        entry.last_used = self.tick;
        Some(entry.payload.clone())
    }

    /// Insert or refresh `key`. Returns the keys evicted to make room.
    /// With capacity 0 nothing is kept: the key itself comes back as evicted.
    pub fn put(&mut self, key: impl Into<String>, payload: P) -> Vec<String> {
        let key = key.into();
        if self.capacity == 0 {
            return vec![key];
        }
        self.tick += 1;
        self.entries.insert(
            key.clone(),
            CacheEntry {
                payload,
                last_used: self.tick,
            },
        );
        self.evict_as_needed(Some(&key))
    }

    /// Pin `key` as the on-screen panorama; the previous one becomes evictable.
    pub fn set_displayed(&mut self, key: Option<&str>) -> Vec<String> {
        self.displayed = key.map(str::to_owned);
        if let Some(k) = key {
            self.tick += 1;
            if let Some(e) = self.entries.get_mut(k) {
                e.last_used = self.tick;
            }
        }
        self.evict_as_needed(None)
    }

    pub fn remove(&mut self, key: &str) -> Option<P> {
        self.entries.remove(key).map(|e| e.payload)
    }

    pub fn clear(&mut self) {
        let displayed = self.displayed.clone();
        self.entries.retain(|k, _| Some(k) == displayed.as_ref());
    }

    fn evict_as_needed(&mut self, protected: Option<&str>) -> Vec<String> {
        let mut evicted = Vec::new();
        while self.entries.len() > self.capacity {
            let candidate = self
                .entries
                .iter()
                .filter(|(k, _)| {
                    Some(k.as_str()) != self.displayed.as_deref() && Some(k.as_str()) != protected
                })
                .min_by(|(ka, a), (kb, b)| a.last_used.cmp(&b.last_used).then_with(|| ka.cmp(kb)))
                .map(|(k, _)| k.clone());

            let Some(key) = candidate else {
                // only pinned entries left
                break;
            };
            log::debug!("texture cache: evicting {key}");
            self.entries.remove(&key);
            evicted.push(key);
        }
        evicted
    }
}
