use crate::resources::platform::PlatformImage;
use parking_lot::Mutex;
use std::sync::Arc;

/// Pool statistics
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Images constructed because the free list was empty
    pub allocated: u64,
    /// Images handed out from the free list
    pub reused: u64,
    /// Images returned by purged handles
    pub released: u64,
    /// Images currently on the free list
    pub available: usize,
}

struct PoolState {
    free: Vec<PlatformImage>,
    next_id: u64,
    stats: PoolStats,
}

/// Reuse pool for platform image objects.
///
/// Cloning shares the same free list. Constructing platform images is expensive on low-memory
/// targets, so fetches pop from here before allocating.
#[derive(Clone)]
pub struct ImagePool {
    inner: Arc<Mutex<PoolState>>,
}

impl ImagePool {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PoolState {
                free: Vec::new(),
                next_id: 1,
                stats: PoolStats::default(),
            })),
        }
    }

    /// Pop a free image or construct a new one
    pub fn acquire(&self) -> PlatformImage {
        let mut state = self.inner.lock();
        if let Some(image) = state.free.pop() {
            state.stats.reused += 1;
            return image;
        }
        let id = state.next_id;
        state.next_id += 1;
        state.stats.allocated += 1;
        PlatformImage::new(id)
    }

    /// Return an image to the free list
    pub fn release(&self, mut image: PlatformImage) {
        image.reset();
        let mut state = self.inner.lock();
        state.stats.released += 1;
        state.free.push(image);
    }

    /// Images ready for reuse
    pub fn available(&self) -> usize {
        self.inner.lock().free.len()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.lock();
        PoolStats {
            available: state.free.len(),
            ..state.stats.clone()
        }
    }

    /// Drop every pooled image
    pub fn clear(&self) {
        self.inner.lock().free.clear();
    }
}

impl Default for ImagePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_allocates_when_empty() {
        let pool = ImagePool::new();
        let a = pool.acquire();
        let b = pool.acquire();
        assert_ne!(a.id(), b.id());
        assert_eq!(pool.stats().allocated, 2);
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn test_pool_reuses_released_image() {
        let pool = ImagePool::new();
        let mut image = pool.acquire();
        let id = image.id();
        image.fill(1, 1, &[1, 2, 3, 4]);
        pool.release(image);
        assert_eq!(pool.available(), 1);

        let reused = pool.acquire();
        assert_eq!(reused.id(), id);
        assert!(reused.bytes().is_empty());

        let stats = pool.stats();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.reused, 1);
        assert_eq!(stats.released, 1);
    }

    #[test]
    fn test_pool_clones_share_free_list() {
        let pool = ImagePool::new();
        let other = pool.clone();
        other.release(pool.acquire());
        assert_eq!(pool.available(), 1);
        pool.clear();
        assert_eq!(other.available(), 0);
    }
}
