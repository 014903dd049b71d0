// Asset Pipeline Module
//
// Caching and scheduling on top of resource handles:
// - Pixel-budget image cache with reservations
// - Single-lane prefetch queue
// - Lazily swept TTL cache
// - The runtime that drives them once per frame

pub mod image_cache;
pub mod request_queue;
pub mod runtime;
pub mod ttl;

pub use image_cache::{CacheStats, Cacheable, ImageCache, ReservationId};
pub use request_queue::{RequestQueue, Requestable};
pub use runtime::{AssetRuntime, UpdateReport, EMPTY_BITMAP_KEY};
pub use ttl::{CacheEntry, CacheMap, TtlTouch};
