use crate::resources::platform::{FetchBackend, FetchCompletion, FetchOutcome, PixelDecoder};
use crate::resources::pool::ImagePool;
use crate::resources::retry::RetryCoordinator;
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::Arc;

/// Everything a handle needs to fetch and decode itself.
///
/// Cloning shares the backend, decoder, image pool, retry coordinator and completion channel.
#[derive(Clone)]
pub struct LoadContext {
    pub(crate) backend: Arc<dyn FetchBackend>,
    pub(crate) decoder: Arc<dyn PixelDecoder>,
    pub(crate) pool: ImagePool,
    pub(crate) retry: RetryCoordinator,
    pub(crate) completions: Sender<FetchCompletion>,
}

impl LoadContext {
    /// Create a context and the queue its fetch completions arrive on
    pub fn new(
        backend: Arc<dyn FetchBackend>,
        decoder: Arc<dyn PixelDecoder>,
        pool: ImagePool,
        retry: RetryCoordinator,
    ) -> (Self, CompletionQueue) {
        let (sender, receiver) = unbounded();
        let queue = CompletionQueue {
            receiver,
            pool: pool.clone(),
        };
        let context = Self {
            backend,
            decoder,
            pool,
            retry,
            completions: sender,
        };
        (context, queue)
    }

    pub fn pool(&self) -> &ImagePool {
        &self.pool
    }

    pub fn retry(&self) -> &RetryCoordinator {
        &self.retry
    }
}

/// Receiving end of the fetch completion channel
pub struct CompletionQueue {
    receiver: Receiver<FetchCompletion>,
    pool: ImagePool,
}

impl CompletionQueue {
    /// Apply every completion that arrived before this call.
    ///
    /// Returns how many reached a live handle. Completions for dropped handles hand their
    /// platform image straight back to the pool.
    pub fn apply(&self) -> usize {
        let batch: Vec<FetchCompletion> = self.receiver.try_iter().collect();
        let mut applied = 0;
        for completion in batch {
            match completion.handle.upgrade() {
                Some(handle) => {
                    handle.finish_fetch(completion.attempt, completion.outcome);
                    applied += 1;
                }
                None => {
                    if let FetchOutcome::Fetched(image) = completion.outcome {
                        self.pool.release(image);
                    }
                }
            }
        }
        applied
    }

    /// Completions waiting to be applied
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
