//! The per-game image manager.
//!
//! [`AssetRuntime`] ties the load context, image cache, request queue, TTL cache and frame clock
//! together behind the operations a game scene uses. Everything advances from
//! [`AssetRuntime::update`], called once per simulation step.
//!
//! ```
//! use asset_pipeline::assets::AssetRuntime;
//! use asset_pipeline::config::PipelineConfig;
//! use asset_pipeline::resources::ManualFetchBackend;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let backend = ManualFetchBackend::new();
//! let mut runtime = AssetRuntime::new(PipelineConfig::default(), Arc::new(backend.clone())).unwrap();
//!
//! let face = runtime.load_bitmap("img/faces/Actor1.png");
//! assert!(!runtime.is_ready());
//!
//! backend.complete_rgba("img/faces/Actor1.png", 144, 144);
//! runtime.update(Duration::from_millis(16));
//! assert!(face.is_ready());
//! assert!(runtime.is_ready());
//! ```

use crate::assets::image_cache::{ImageCache, ReservationId};
use crate::assets::request_queue::RequestQueue;
use crate::assets::ttl::{CacheEntry, CacheMap};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::resources::{
    CompletionQueue, FetchBackend, ImagePool, LoadContext, PixelDecoder, PixelSource,
    ResourceHandle, RetryCoordinator, RgbaDecoder, StallObserver, WeakResourceHandle,
};
use crate::time::FrameClock;
use std::sync::Arc;
use std::time::Duration;
use tracing::info_span;

/// Cache key of the shared 1x1 placeholder
pub const EMPTY_BITMAP_KEY: &str = "empty";

/// What one `update` call did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateReport {
    /// Fetch completions applied to live handles
    pub completions: usize,
    /// Backoff retries that became due and were fired
    pub retries: usize,
    /// TTL entries freed by a sweep
    pub expired: usize,
}

/// Image manager: cache, prefetch queue, TTL cache and retry state for one game
pub struct AssetRuntime {
    config: PipelineConfig,
    context: LoadContext,
    completions: CompletionQueue,
    image_cache: ImageCache,
    request_queue: RequestQueue,
    ttl_cache: CacheMap<WeakResourceHandle>,
    clock: FrameClock,
    default_reservation_id: ReservationId,
}

impl AssetRuntime {
    /// Create a runtime fetching through `backend` and decoding raw RGBA
    pub fn new(config: PipelineConfig, backend: Arc<dyn FetchBackend>) -> Result<Self> {
        config.validate()?;
        let retry = RetryCoordinator::new(config.retry_schedule());
        let (context, completions) =
            LoadContext::new(backend, Arc::new(RgbaDecoder), ImagePool::new(), retry);

        tracing::debug!(
            limit = config.image_cache_limit,
            retries = config.retry_schedule_ms.len(),
            "asset runtime created"
        );

        Ok(Self {
            image_cache: ImageCache::new(config.image_cache_limit),
            request_queue: RequestQueue::new(),
            ttl_cache: CacheMap::with_check_delay(config.ttl_check_delay_seconds),
            clock: FrameClock::new(),
            default_reservation_id: ReservationId(config.default_reservation_id),
            config,
            context,
            completions,
        })
    }

    /// Replace the pixel decoder. Handles created earlier keep the old one.
    pub fn with_decoder(mut self, decoder: Arc<dyn PixelDecoder>) -> Self {
        self.context.decoder = decoder;
        self
    }

    /// Replace the stall observer. Handles created earlier keep the old one.
    pub fn with_stall_observer(mut self, observer: Arc<dyn StallObserver>) -> Self {
        self.context.retry = self.context.retry.clone().with_observer(observer);
        self
    }

    /// Handle for `key`, fetching and decoding it if needed.
    ///
    /// An empty key yields the shared placeholder.
    pub fn load_bitmap(&mut self, key: &str) -> ResourceHandle {
        if key.is_empty() {
            return self.load_empty_bitmap();
        }

        match self.image_cache.get(key) {
            Some(handle) => {
                if !handle.is_ready() {
                    handle.decode();
                }
                handle
            }
            None => {
                let handle = ResourceHandle::load(self.context.clone(), key);
                self.image_cache.add(key, handle.clone());
                handle
            }
        }
    }

    /// Prefetch `key` through the request queue without decoding it.
    ///
    /// Requesting a key that is already known moves it to the head of the queue.
    pub fn request_bitmap(&mut self, key: &str) -> ResourceHandle {
        if key.is_empty() {
            return self.load_empty_bitmap();
        }

        match self.image_cache.get(key) {
            Some(handle) => {
                self.request_queue.raise_priority(key);
                handle
            }
            None => {
                let handle = ResourceHandle::request(self.context.clone(), key);
                self.image_cache.add(key, handle.clone());
                self.request_queue.enqueue(key, handle.clone());
                handle
            }
        }
    }

    /// Load `key` and pin it under `reservation_id` (or the default reservation)
    pub fn reserve_bitmap(
        &mut self,
        key: &str,
        reservation_id: Option<ReservationId>,
    ) -> ResourceHandle {
        let handle = self.load_bitmap(key);
        let reservation_id = reservation_id.unwrap_or(self.default_reservation_id);
        self.image_cache
            .reserve(handle_cache_key(key), handle.clone(), reservation_id);
        handle
    }

    /// Unpin everything reserved under `reservation_id`
    pub fn release_reservation(&mut self, reservation_id: ReservationId) {
        self.image_cache.release_reservation(reservation_id);
    }

    pub fn set_default_reservation_id(&mut self, reservation_id: ReservationId) {
        self.default_reservation_id = reservation_id;
    }

    pub fn default_reservation_id(&self) -> ReservationId {
        self.default_reservation_id
    }

    /// Shared 1x1 placeholder, ready immediately
    pub fn load_empty_bitmap(&mut self) -> ResourceHandle {
        if let Some(handle) = self.image_cache.get(EMPTY_BITMAP_KEY) {
            return handle;
        }
        let handle = ResourceHandle::synthetic(self.context.clone(), PixelSource::blank(1, 1));
        self.image_cache.add(EMPTY_BITMAP_KEY, handle.clone());
        handle
    }

    /// Drop every queued prefetch; fetches already started still complete
    pub fn clear_request(&mut self) {
        self.request_queue.clear();
    }

    /// Start over with an empty image cache
    pub fn clear(&mut self) {
        tracing::debug!(entries = self.image_cache.len(), "image cache cleared");
        self.image_cache = ImageCache::new(self.config.image_cache_limit);
    }

    /// Every cached image that is wanted for drawing has been decoded
    pub fn is_ready(&self) -> bool {
        self.image_cache.is_ready()
    }

    /// Oldest cached handle that failed for good, if any
    pub fn error_bitmap(&self) -> Option<ResourceHandle> {
        self.image_cache.error_handle()
    }

    /// Index `handle` in the TTL cache under `key`.
    ///
    /// The cache holds the handle weakly; `handle.touch()` keeps the entry fresh.
    pub fn track_ttl(
        &self,
        key: &str,
        handle: &ResourceHandle,
        ticks: u64,
        seconds: f64,
    ) -> CacheEntry<WeakResourceHandle> {
        let entry = self.ttl_cache.set_item(key, handle.downgrade());
        entry.set_time_to_live(ticks, seconds);
        handle.set_ttl_entry(Arc::new(entry.clone()));
        entry
    }

    /// Advance one tick covering `delta`
    pub fn update(&mut self, delta: Duration) -> UpdateReport {
        self.update_frames(1, delta)
    }

    /// Advance the pipeline by `ticks` ticks covering `delta`.
    ///
    /// Completions that arrived since the last call are applied first, then due retries fire,
    /// the request queue steps and the TTL cache advances.
    pub fn update_frames(&mut self, ticks: u64, delta: Duration) -> UpdateReport {
        let _span = info_span!("asset_runtime.update", ticks).entered();
        self.clock.advance(ticks, delta);

        let completions = self.completions.apply();
        let retries = self.context.retry.update(delta);
        self.request_queue.update();
        let expired = self.ttl_cache.update(ticks, delta.as_secs_f64());

        let report = UpdateReport {
            completions,
            retries,
            expired,
        };
        if report != UpdateReport::default() {
            tracing::trace!(?report, "asset runtime step");
        }
        report
    }

    /// Replay every fetch that gave up, clearing the stall
    pub fn retry(&self) {
        self.context.retry.retry();
    }

    /// Some fetch exhausted its retries and waits for `retry`
    pub fn has_stalled_loads(&self) -> bool {
        self.context.retry.exists()
    }

    pub fn is_stalled(&self) -> bool {
        self.context.retry.is_stalled()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn context(&self) -> &LoadContext {
        &self.context
    }

    pub fn image_cache(&self) -> &ImageCache {
        &self.image_cache
    }

    pub fn image_cache_mut(&mut self) -> &mut ImageCache {
        &mut self.image_cache
    }

    pub fn request_queue(&self) -> &RequestQueue {
        &self.request_queue
    }

    pub fn ttl_cache(&self) -> &CacheMap<WeakResourceHandle> {
        &self.ttl_cache
    }

    pub fn pool(&self) -> &ImagePool {
        self.context.pool()
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }
}

fn handle_cache_key(key: &str) -> &str {
    if key.is_empty() {
        EMPTY_BITMAP_KEY
    } else {
        key
    }
}
