use crate::resources::ResourceHandle;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::info_span;

/// What the image cache needs to know about a resident resource
pub trait Cacheable: Clone {
    /// Decoded and usable
    fn is_ready(&self) -> bool;

    /// A bare prefetch with no decoded pixels pinning memory
    fn is_request_only(&self) -> bool;

    fn is_error(&self) -> bool;

    /// Pixel area charged against the budget
    fn area(&self) -> u64;
}

impl Cacheable for ResourceHandle {
    fn is_ready(&self) -> bool {
        ResourceHandle::is_ready(self)
    }

    fn is_request_only(&self) -> bool {
        ResourceHandle::is_request_only(self)
    }

    fn is_error(&self) -> bool {
        ResourceHandle::is_error(self)
    }

    fn area(&self) -> u64 {
        ResourceHandle::area(self)
    }
}

/// Pin token; entries carrying a live reservation are never evicted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(pub u32);

/// Entry in the image cache
struct CacheItem<H> {
    handle: H,
    touch: u64,
    reservation_id: Option<ReservationId>,
}

/// Cache statistics
#[derive(Clone, Debug, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub total_loads: u64,
}

/// Key → handle table bounded by a pixel-area budget.
///
/// Every `add` truncates: entries are walked from most to least recently touched and each one
/// walked while budget remains, or that must be held, is kept and charged its area.
pub struct ImageCache<H: Cacheable = ResourceHandle> {
    items: AHashMap<String, CacheItem<H>>,
    limit: u64,
    /// Logical clock stamped into entries on add/get/reserve
    touch_counter: u64,
    stats: CacheStats,
}

impl<H: Cacheable> ImageCache<H> {
    /// Create a cache with a pixel-area budget
    pub fn new(limit: u64) -> Self {
        Self {
            items: AHashMap::new(),
            limit,
            touch_counter: 0,
            stats: CacheStats::default(),
        }
    }

    fn next_touch(&mut self) -> u64 {
        self.touch_counter += 1;
        self.touch_counter
    }

    /// Insert or overwrite `key`, then truncate
    pub fn add(&mut self, key: impl Into<String>, handle: H) {
        let touch = self.next_touch();
        self.items.insert(
            key.into(),
            CacheItem {
                handle,
                touch,
                reservation_id: None,
            },
        );
        self.stats.total_loads += 1;
        self.truncate();
    }

    /// Look up `key`, refreshing its recency
    pub fn get(&mut self, key: &str) -> Option<H> {
        let touch = self.touch_counter + 1;
        match self.items.get_mut(key) {
            Some(item) => {
                item.touch = touch;
                self.touch_counter = touch;
                self.stats.hits += 1;
                Some(item.handle.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Insert `key` if absent and pin it with `reservation_id`
    pub fn reserve(&mut self, key: impl Into<String>, handle: H, reservation_id: ReservationId) {
        let key = key.into();
        if !self.items.contains_key(&key) {
            let touch = self.next_touch();
            self.items.insert(
                key.clone(),
                CacheItem {
                    handle,
                    touch,
                    reservation_id: None,
                },
            );
        }
        if let Some(item) = self.items.get_mut(&key) {
            item.reservation_id = Some(reservation_id);
        }
    }

    /// Unpin every entry carrying `reservation_id`
    pub fn release_reservation(&mut self, reservation_id: ReservationId) {
        for item in self.items.values_mut() {
            if item.reservation_id == Some(reservation_id) {
                item.reservation_id = None;
            }
        }
    }

    fn must_be_held(item: &CacheItem<H>) -> bool {
        if item.handle.is_request_only() {
            return false;
        }
        item.reservation_id.is_some() || !item.handle.is_ready()
    }

    /// Evict by recency against the budget; returns how many entries were dropped
    pub fn truncate(&mut self) -> usize {
        let _span = info_span!("image_cache.truncate", entries = self.items.len()).entered();

        let mut order: Vec<(u64, String)> = self
            .items
            .iter()
            .map(|(key, item)| (item.touch, key.clone()))
            .collect();
        order.sort_unstable_by(|a, b| b.0.cmp(&a.0));

        let mut size_left = self.limit as i128;
        let mut evicted = 0;
        for (_, key) in order {
            let Some(item) = self.items.get(&key) else {
                continue;
            };
            if size_left > 0 || Self::must_be_held(item) {
                size_left -= item.handle.area() as i128;
            } else {
                self.items.remove(&key);
                evicted += 1;
                tracing::trace!(key = %key, "evicted from image cache");
            }
        }

        self.stats.evictions += evicted as u64;
        evicted
    }

    /// True when every resident resource that needs pixels has them
    pub fn is_ready(&self) -> bool {
        self.items
            .values()
            .all(|item| item.handle.is_request_only() || item.handle.is_ready())
    }

    /// Oldest resident handle in the error state
    pub fn error_handle(&self) -> Option<H> {
        self.items
            .values()
            .filter(|item| item.handle.is_error())
            .min_by_key(|item| item.touch)
            .map(|item| item.handle.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.contains_key(key)
    }

    /// Reservation pinning `key`, if any
    pub fn reservation(&self, key: &str) -> Option<ReservationId> {
        self.items.get(key).and_then(|item| item.reservation_id)
    }

    /// Resident keys, most recently touched first
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<(u64, &String)> = self
            .items
            .iter()
            .map(|(key, item)| (item.touch, key))
            .collect();
        keys.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        keys.into_iter().map(|(_, key)| key.clone()).collect()
    }

    /// Drop every entry, pinned or not
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Change the budget; takes effect on the next truncation
    pub fn set_limit(&mut self, limit: u64) {
        self.limit = limit;
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Pixel area of all resident entries
    pub fn memory_usage(&self) -> u64 {
        self.items.values().map(|item| item.handle.area()).sum()
    }

    /// Get memory utilization (0.0 when the budget is zero)
    pub fn utilization(&self) -> f32 {
        if self.limit == 0 {
            0.0
        } else {
            self.memory_usage() as f32 / self.limit as f32
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
