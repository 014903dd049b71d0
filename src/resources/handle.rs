//! Resource handles and their load state machine.
//!
//! A [`ResourceHandle`] is the loadable unit shared by the image cache, the request queue and
//! callers. Fetches are fire-and-forget: the backend answers through the completion channel
//! and the answer is applied on the next runtime update.
//!
//! ```text
//! None ──rekey──▶ Pending ──start_request/decode──▶ Requesting ──ok──▶ Completed ──decode──▶ Loaded
//!                    ▲                                   │                  └──prefetch only──▶ Purged
//!                    └──── Purged | Error ──decode───────┘ failed / resigned ──▶ Error
//! ```

use crate::assets::ttl::TtlTouch;
use crate::error::AssetError;
use crate::resources::context::LoadContext;
use crate::resources::platform::{
    FetchOutcome, FetchRequest, FetchResponder, PixelSource, PlatformImage,
};
use crate::resources::retry::FailureHandler;
use crate::resources::state::LoadingState;
use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;
use std::fmt;
use std::sync::{Arc, Weak};

/// One-shot callback run when a handle becomes ready
pub type LoadListener = Box<dyn FnOnce(&ResourceHandle) + Send>;

struct HandleState {
    key: String,
    state: LoadingState,
    decode_after_fetch: bool,
    listeners: SmallVec<[LoadListener; 2]>,
    dirty: bool,
    image: Option<PlatformImage>,
    pixels: Option<PixelSource>,
    width: u32,
    height: u32,
    /// Incremented per fetch; completions of older attempts are ignored
    attempt: u64,
    loader: Option<FailureHandler>,
    ttl_entry: Option<Arc<dyn TtlTouch>>,
    last_error: Option<AssetError>,
}

impl HandleState {
    fn new(key: String, state: LoadingState) -> Self {
        Self {
            key,
            state,
            decode_after_fetch: false,
            listeners: SmallVec::new(),
            dirty: false,
            image: None,
            pixels: None,
            width: 0,
            height: 0,
            attempt: 0,
            loader: None,
            ttl_entry: None,
            last_error: None,
        }
    }

    fn advance(&mut self, next: LoadingState) {
        if self.state == next {
            return;
        }
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal load transition {} -> {} for {}",
            self.state,
            next,
            self.key
        );
        tracing::trace!(key = %self.key, from = %self.state, to = %next, "load state");
        self.state = next;
    }
}

struct HandleShared {
    state: Mutex<HandleState>,
    context: LoadContext,
}

/// Shared handle to one loadable resource
#[derive(Clone)]
pub struct ResourceHandle {
    shared: Arc<HandleShared>,
}

/// Non-owning handle, as held by the TTL cache and by in-flight fetches
#[derive(Clone)]
pub struct WeakResourceHandle {
    shared: Weak<HandleShared>,
}

impl WeakResourceHandle {
    pub fn upgrade(&self) -> Option<ResourceHandle> {
        self.shared.upgrade().map(|shared| ResourceHandle { shared })
    }
}

impl fmt::Debug for WeakResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(handle) => write!(f, "WeakResourceHandle({handle:?})"),
            None => f.write_str("WeakResourceHandle(<dropped>)"),
        }
    }
}

impl ResourceHandle {
    fn with_state(context: LoadContext, state: HandleState) -> Self {
        Self {
            shared: Arc::new(HandleShared {
                state: Mutex::new(state),
                context,
            }),
        }
    }

    /// Start fetching `key` immediately and decode it once it arrives
    pub fn load(context: LoadContext, key: impl Into<String>) -> Self {
        let mut state = HandleState::new(key.into(), LoadingState::Pending);
        state.decode_after_fetch = true;
        let handle = Self::with_state(context, state);
        handle.request_image();
        handle
    }

    /// Keyed handle that waits for `start_request` or `decode`
    pub fn request(context: LoadContext, key: impl Into<String>) -> Self {
        Self::with_state(context, HandleState::new(key.into(), LoadingState::Pending))
    }

    /// Already-usable handle around locally produced pixels
    pub fn synthetic(context: LoadContext, pixels: PixelSource) -> Self {
        let mut state = HandleState::new(String::new(), LoadingState::None);
        state.width = pixels.width;
        state.height = pixels.height;
        state.pixels = Some(pixels);
        Self::with_state(context, state)
    }

    fn lock(&self) -> MutexGuard<'_, HandleState> {
        self.shared.state.lock()
    }

    pub fn downgrade(&self) -> WeakResourceHandle {
        WeakResourceHandle {
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Whether both handles refer to the same resource
    pub fn ptr_eq(&self, other: &ResourceHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn key(&self) -> String {
        self.lock().key.clone()
    }

    pub fn state(&self) -> LoadingState {
        self.lock().state
    }

    pub fn is_ready(&self) -> bool {
        self.lock().state.is_ready()
    }

    pub fn is_error(&self) -> bool {
        self.lock().state == LoadingState::Error
    }

    /// Fetched (or being fetched) without anything waiting on its pixels
    pub fn is_request_only(&self) -> bool {
        let state = self.lock();
        !(state.decode_after_fetch || state.state.is_ready())
    }

    /// No longer `Pending` or `Requesting`
    pub fn is_request_ready(&self) -> bool {
        self.lock().state.is_request_ready()
    }

    pub fn decode_after_fetch(&self) -> bool {
        self.lock().decode_after_fetch
    }

    pub fn width(&self) -> u32 {
        self.lock().width
    }

    pub fn height(&self) -> u32 {
        self.lock().height
    }

    /// Pixel area counted against the image cache budget
    pub fn area(&self) -> u64 {
        let state = self.lock();
        state.width as u64 * state.height as u64
    }

    /// Decoded pixels, once loaded
    pub fn pixels(&self) -> Option<PixelSource> {
        self.lock().pixels.clone()
    }

    /// Most recent fetch or decode error
    pub fn last_error(&self) -> Option<AssetError> {
        self.lock().last_error.clone()
    }

    /// Fetch attempts issued so far, retries included
    pub fn attempts(&self) -> u64 {
        self.lock().attempt
    }

    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    /// Flag pixels as changed since the last texture refresh
    pub fn mark_dirty(&self) {
        self.lock().dirty = true;
    }

    /// Read and clear the dirty flag
    pub fn take_dirty(&self) -> bool {
        std::mem::take(&mut self.lock().dirty)
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Run `listener` once the handle is ready, or right away if it already is
    pub fn add_load_listener<F>(&self, listener: F)
    where
        F: FnOnce(&ResourceHandle) + Send + 'static,
    {
        let mut state = self.lock();
        if state.state.is_ready() {
            drop(state);
            listener(self);
        } else {
            state.listeners.push(Box::new(listener));
        }
    }

    /// Give a synthetic handle a key so it can be fetched. Returns false unless in `None`.
    pub fn rekey(&self, key: impl Into<String>) -> bool {
        let mut state = self.lock();
        if state.state != LoadingState::None {
            tracing::warn!(key = %state.key, state = %state.state, "rekey ignored");
            return false;
        }
        state.key = key.into();
        state.pixels = None;
        state.advance(LoadingState::Pending);
        true
    }

    /// Kick off a queued prefetch. Only acts while `Pending`.
    pub fn start_request(&self) {
        let mut state = self.lock();
        if state.state != LoadingState::Pending {
            return;
        }
        state.decode_after_fetch = false;
        drop(state);
        self.request_image();
    }

    /// Ask for decoded pixels, fetching again when needed
    pub fn decode(&self) {
        let mut state = self.lock();
        match state.state {
            LoadingState::Completed => {
                state.decode_after_fetch = true;
                drop(state);
                self.finish_decode();
            }
            LoadingState::Requesting => {
                state.decode_after_fetch = true;
                if state.loader.is_none() {
                    let loader = self.create_loader(&state.key);
                    state.loader = Some(loader);
                }
            }
            LoadingState::Pending | LoadingState::Purged | LoadingState::Error => {
                state.decode_after_fetch = true;
                drop(state);
                self.request_image();
            }
            LoadingState::Loaded | LoadingState::None => {}
        }
    }

    /// Keep the attached TTL entry alive
    pub fn touch(&self) {
        let entry = self.lock().ttl_entry.clone();
        if let Some(entry) = entry {
            entry.touch();
        }
    }

    /// Attach the TTL entry `touch` forwards to
    pub fn set_ttl_entry(&self, entry: Arc<dyn TtlTouch>) {
        self.lock().ttl_entry = Some(entry);
    }

    pub fn has_ttl_entry(&self) -> bool {
        self.lock().ttl_entry.is_some()
    }

    fn create_loader(&self, key: &str) -> FailureHandler {
        let retry_target = self.downgrade();
        let resign_target = self.downgrade();
        self.shared.context.retry.create_loader(
            key,
            Arc::new(move || {
                if let Some(handle) = retry_target.upgrade() {
                    if !handle.is_ready() {
                        handle.request_image();
                    }
                }
            }),
            Some(Arc::new(move || {
                if let Some(handle) = resign_target.upgrade() {
                    handle.resign();
                }
            })),
            None,
        )
    }

    fn request_image(&self) {
        let context = &self.shared.context;
        let image = context.pool.acquire();
        let (key, attempt, previous) = {
            let mut state = self.lock();
            if state.decode_after_fetch && state.loader.is_none() {
                let loader = self.create_loader(&state.key);
                state.loader = Some(loader);
            }
            state.attempt += 1;
            state.advance(LoadingState::Requesting);
            (state.key.clone(), state.attempt, state.image.take())
        };
        if let Some(previous) = previous {
            context.pool.release(previous);
        }

        tracing::debug!(key = %key, attempt, "fetch started");
        let responder = FetchResponder::new(self.downgrade(), attempt, context.completions.clone());
        context.backend.begin(FetchRequest::new(key, image, responder));
    }

    fn resign(&self) {
        let mut state = self.lock();
        tracing::warn!(key = %state.key, "giving up on fetch");
        state.last_error = Some(AssetError::ExhaustedRetries {
            key: state.key.clone(),
        });
        state.advance(LoadingState::Error);
    }

    /// Apply the answer of fetch `attempt`
    pub(crate) fn finish_fetch(&self, attempt: u64, outcome: FetchOutcome) {
        let context = &self.shared.context;
        let mut state = self.lock();
        if attempt != state.attempt || state.state != LoadingState::Requesting {
            tracing::trace!(key = %state.key, attempt, "stale fetch completion ignored");
            drop(state);
            if let FetchOutcome::Fetched(image) = outcome {
                context.pool.release(image);
            }
            return;
        }

        match outcome {
            FetchOutcome::Fetched(image) => {
                state.width = image.width();
                state.height = image.height();
                state.image = Some(image);
                state.last_error = None;
                state.advance(LoadingState::Completed);

                if state.decode_after_fetch {
                    drop(state);
                    self.finish_decode();
                } else {
                    let image = state.image.take();
                    state.advance(LoadingState::Purged);
                    tracing::debug!(key = %state.key, "prefetch purged");
                    drop(state);
                    if let Some(image) = image {
                        context.pool.release(image);
                    }
                }
            }
            FetchOutcome::Failed(error) => {
                tracing::debug!(key = %state.key, %error, "fetch failed");
                state.last_error = Some(error);
                match state.loader.clone() {
                    Some(loader) => {
                        drop(state);
                        loader.fail();
                    }
                    None => state.advance(LoadingState::Error),
                }
            }
        }
    }

    /// `Completed -> Loaded`, draining listeners; decode errors end in `Error`
    fn finish_decode(&self) {
        let (key, image) = {
            let mut state = self.lock();
            if state.state != LoadingState::Completed {
                return;
            }
            (state.key.clone(), state.image.take())
        };

        let decoded = match &image {
            Some(image) => self.shared.context.decoder.decode(&key, image),
            None => Err(AssetError::DecodeFailure {
                key: key.clone(),
                reason: "no platform image attached".to_string(),
            }),
        };

        let listeners = {
            let mut state = self.lock();
            state.image = image;
            match decoded {
                Ok(pixels) => {
                    state.width = pixels.width;
                    state.height = pixels.height;
                    state.pixels = Some(pixels);
                    state.dirty = false;
                    state.advance(LoadingState::Loaded);
                    std::mem::take(&mut state.listeners)
                }
                Err(error) => {
                    tracing::warn!(key = %key, %error, "decode failed");
                    state.last_error = Some(error);
                    state.advance(LoadingState::Error);
                    return;
                }
            }
        };

        for listener in listeners {
            listener(self);
        }
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ResourceHandle")
            .field("key", &state.key)
            .field("state", &state.state)
            .field("decode_after_fetch", &state.decode_after_fetch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::context::CompletionQueue;
    use crate::resources::platform::{ManualFetchBackend, RgbaDecoder};
    use crate::resources::pool::ImagePool;
    use crate::resources::retry::RetryCoordinator;
    use std::time::Duration;

    fn setup() -> (LoadContext, CompletionQueue, ManualFetchBackend) {
        let backend = ManualFetchBackend::new();
        let retry = RetryCoordinator::new(vec![Duration::from_millis(100)]);
        let (context, queue) = LoadContext::new(
            Arc::new(backend.clone()),
            Arc::new(RgbaDecoder),
            ImagePool::new(),
            retry,
        );
        (context, queue, backend)
    }

    #[test]
    fn test_load_decodes_and_drains_listeners_once() {
        let (context, queue, backend) = setup();
        let handle = ResourceHandle::load(context, "img/a.png");
        assert_eq!(handle.state(), LoadingState::Requesting);

        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            handle.add_load_listener(move |_| order.lock().push(i));
        }
        assert_eq!(handle.listener_count(), 3);

        assert!(backend.complete_rgba("img/a.png", 4, 2));
        // Nothing happens until completions are applied
        assert_eq!(handle.state(), LoadingState::Requesting);
        assert_eq!(queue.apply(), 1);

        assert_eq!(handle.state(), LoadingState::Loaded);
        assert_eq!(handle.area(), 8);
        assert!(!handle.is_dirty());
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert_eq!(handle.listener_count(), 0);
    }

    #[test]
    fn test_listener_on_ready_handle_runs_synchronously() {
        let (context, _queue, _backend) = setup();
        let handle = ResourceHandle::synthetic(context, PixelSource::blank(1, 1));
        let called = Arc::new(Mutex::new(false));
        let flag = called.clone();
        handle.add_load_listener(move |_| *flag.lock() = true);
        assert!(*called.lock());
    }

    #[test]
    fn test_prefetch_purges_into_pool() {
        let (context, queue, backend) = setup();
        let pool = context.pool().clone();
        let handle = ResourceHandle::request(context, "img/b.png");
        assert_eq!(handle.state(), LoadingState::Pending);
        assert!(handle.is_request_only());

        handle.start_request();
        handle.start_request();
        assert_eq!(backend.start_count("img/b.png"), 1);

        backend.complete_rgba("img/b.png", 2, 2);
        queue.apply();
        assert_eq!(handle.state(), LoadingState::Purged);
        assert!(handle.is_request_only());
        assert!(handle.is_request_ready());
        assert_eq!(pool.available(), 1);

        // Decoding a purged handle fetches again, reusing the pooled image
        handle.decode();
        assert_eq!(handle.state(), LoadingState::Requesting);
        assert!(!handle.is_request_only());
        assert_eq!(pool.stats().reused, 1);
        backend.complete_rgba("img/b.png", 2, 2);
        queue.apply();
        assert!(handle.is_ready());
    }

    #[test]
    fn test_prefetch_failure_is_terminal_without_loader() {
        let (context, queue, backend) = setup();
        let handle = ResourceHandle::request(context.clone(), "img/c.png");
        handle.start_request();
        backend.fail("img/c.png");
        queue.apply();

        assert!(handle.is_error());
        assert!(matches!(
            handle.last_error(),
            Some(AssetError::TransientFetchFailure { .. })
        ));
        assert_eq!(context.retry().pending_retries(), 0);
    }

    #[test]
    fn test_decode_while_requesting_attaches_retry() {
        let (context, queue, backend) = setup();
        let handle = ResourceHandle::request(context.clone(), "img/d.png");
        handle.start_request();
        handle.decode();
        assert_eq!(handle.state(), LoadingState::Requesting);

        backend.fail("img/d.png");
        queue.apply();
        assert_eq!(handle.state(), LoadingState::Requesting);
        assert_eq!(context.retry().pending_retries(), 1);

        context.retry().update(Duration::from_millis(100));
        assert_eq!(backend.start_count("img/d.png"), 2);
        backend.complete_rgba("img/d.png", 1, 1);
        queue.apply();
        assert_eq!(handle.state(), LoadingState::Loaded);
    }

    #[test]
    fn test_stale_completion_ignored() {
        let (context, queue, backend) = setup();
        let handle = ResourceHandle::load(context.clone(), "img/e.png");
        backend.fail("img/e.png");
        queue.apply();
        context.retry().update(Duration::from_millis(100));
        assert_eq!(handle.attempts(), 2);

        // Only the second request is pending; a duplicate answer cannot resurrect attempt 1
        handle.finish_fetch(
            1,
            FetchOutcome::Failed(AssetError::TransientFetchFailure {
                key: "img/e.png".to_string(),
                reason: "duplicate".to_string(),
            }),
        );
        assert_eq!(handle.state(), LoadingState::Requesting);
        assert!(backend.complete_rgba("img/e.png", 1, 1));
        queue.apply();
        assert!(handle.is_ready());
    }

    #[test]
    fn test_decode_failure_folds_into_error() {
        let (context, queue, backend) = setup();
        let handle = ResourceHandle::load(context, "img/f.png");
        backend.complete("img/f.png", 4, 4, &[1, 2, 3]);
        queue.apply();
        assert!(handle.is_error());
        assert!(matches!(
            handle.last_error(),
            Some(AssetError::DecodeFailure { .. })
        ));
    }

    #[test]
    fn test_synthetic_rekey() {
        let (context, _queue, _backend) = setup();
        let handle = ResourceHandle::synthetic(context, PixelSource::blank(2, 3));
        assert_eq!(handle.state(), LoadingState::None);
        assert!(handle.is_ready());
        assert_eq!(handle.area(), 6);
        handle.start_request();
        assert_eq!(handle.state(), LoadingState::None);

        assert!(handle.rekey("img/g.png"));
        assert_eq!(handle.state(), LoadingState::Pending);
        assert!(!handle.rekey("img/h.png"));
        assert_eq!(handle.key(), "img/g.png");
    }

    #[test]
    fn test_dirty_flag() {
        let (context, _queue, _backend) = setup();
        let handle = ResourceHandle::synthetic(context, PixelSource::blank(1, 1));
        handle.mark_dirty();
        assert!(handle.take_dirty());
        assert!(!handle.is_dirty());
    }
}
