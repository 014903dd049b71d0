//! Platform collaborators: the network fetch and the pixel decoder.
//!
//! A [`FetchBackend`] receives a [`FetchRequest`] carrying a pooled [`PlatformImage`] and
//! answers it whenever the platform finishes, from any thread. Answers travel over a channel
//! and are applied by the runtime on its next `update`, never from inside `begin`.

use crate::error::{AssetError, Result};
use crate::resources::handle::WeakResourceHandle;
use crossbeam::channel::Sender;
use parking_lot::Mutex;
use std::sync::Arc;

/// Platform image object: the reusable container a fetch writes its bytes into.
///
/// Pooled through [`ImagePool`](crate::resources::ImagePool); it carries no identity beyond
/// its allocation id.
#[derive(Debug)]
pub struct PlatformImage {
    id: u64,
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

impl PlatformImage {
    pub(crate) fn new(id: u64) -> Self {
        Self {
            id,
            bytes: Vec::new(),
            width: 0,
            height: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Store fetched content, reusing the existing allocation
    pub fn fill(&mut self, width: u32, height: u32, bytes: &[u8]) {
        self.bytes.clear();
        self.bytes.extend_from_slice(bytes);
        self.width = width;
        self.height = height;
    }

    /// Drop content but keep capacity
    pub(crate) fn reset(&mut self) {
        self.bytes.clear();
        self.width = 0;
        self.height = 0;
    }
}

/// Decoded, GPU-uploadable pixels
#[derive(Clone, Debug, PartialEq)]
pub struct PixelSource {
    pub width: u32,
    pub height: u32,
    pub pixels: Arc<[u8]>,
}

impl PixelSource {
    /// Opaque black RGBA pixels
    pub fn blank(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize * 4;
        Self {
            width,
            height,
            pixels: vec![0u8; len].into(),
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Turns fetched bytes into pixels
pub trait PixelDecoder: Send + Sync {
    fn decode(&self, key: &str, image: &PlatformImage) -> Result<PixelSource>;
}

/// Decoder for raw RGBA8 payloads
#[derive(Clone, Copy, Debug, Default)]
pub struct RgbaDecoder;

impl PixelDecoder for RgbaDecoder {
    fn decode(&self, key: &str, image: &PlatformImage) -> Result<PixelSource> {
        let expected = image.width() as usize * image.height() as usize * 4;
        if image.bytes().len() != expected {
            return Err(AssetError::DecodeFailure {
                key: key.to_string(),
                reason: format!(
                    "expected {expected} bytes for {}x{} RGBA, got {}",
                    image.width(),
                    image.height(),
                    image.bytes().len()
                ),
            });
        }
        Ok(PixelSource {
            width: image.width(),
            height: image.height(),
            pixels: image.bytes().into(),
        })
    }
}

/// Result of one fetch attempt
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(PlatformImage),
    Failed(AssetError),
}

/// Message applied by the runtime on its next update
pub(crate) struct FetchCompletion {
    pub handle: WeakResourceHandle,
    pub attempt: u64,
    pub outcome: FetchOutcome,
}

/// Answer channel of one fetch attempt
pub(crate) struct FetchResponder {
    handle: WeakResourceHandle,
    attempt: u64,
    sender: Sender<FetchCompletion>,
}

impl FetchResponder {
    pub(crate) fn new(
        handle: WeakResourceHandle,
        attempt: u64,
        sender: Sender<FetchCompletion>,
    ) -> Self {
        Self {
            handle,
            attempt,
            sender,
        }
    }

    fn send(self, outcome: FetchOutcome) {
        let completion = FetchCompletion {
            handle: self.handle,
            attempt: self.attempt,
            outcome,
        };
        // A closed channel means the runtime is gone; nobody is left to observe the result.
        if self.sender.send(completion).is_err() {
            tracing::debug!("fetch completion dropped, runtime no longer running");
        }
    }
}

/// One in-flight fetch handed to a [`FetchBackend`]
pub struct FetchRequest {
    key: String,
    image: PlatformImage,
    responder: FetchResponder,
}

impl FetchRequest {
    pub(crate) fn new(key: String, image: PlatformImage, responder: FetchResponder) -> Self {
        Self {
            key,
            image,
            responder,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Report success with the fetched content
    pub fn succeed(mut self, width: u32, height: u32, bytes: &[u8]) {
        self.image.fill(width, height, bytes);
        self.responder.send(FetchOutcome::Fetched(self.image));
    }

    /// Report failure; the retry path decides what happens next
    pub fn fail(self, reason: impl Into<String>) {
        let error = AssetError::TransientFetchFailure {
            key: self.key,
            reason: reason.into(),
        };
        self.responder.send(FetchOutcome::Failed(error));
    }
}

/// Network lane of the platform
pub trait FetchBackend: Send + Sync {
    /// Start fetching; must not block on the result
    fn begin(&self, request: FetchRequest);
}

/// In-memory backend whose requests are answered explicitly by the host.
///
/// Useful for tools, headless runs and tests: every `begin` is parked until
/// [`complete`](ManualFetchBackend::complete) or [`fail`](ManualFetchBackend::fail) is called.
#[derive(Clone, Default)]
pub struct ManualFetchBackend {
    pending: Arc<Mutex<Vec<FetchRequest>>>,
    history: Arc<Mutex<Vec<String>>>,
}

impl ManualFetchBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently waiting for an answer, oldest first
    pub fn pending_keys(&self) -> Vec<String> {
        self.pending.lock().iter().map(|r| r.key.clone()).collect()
    }

    /// Every key ever passed to `begin`, in order
    pub fn started_keys(&self) -> Vec<String> {
        self.history.lock().clone()
    }

    /// How many times `key` was started
    pub fn start_count(&self, key: &str) -> usize {
        self.history.lock().iter().filter(|k| *k == key).count()
    }

    fn take(&self, key: &str) -> Option<FetchRequest> {
        let mut pending = self.pending.lock();
        let index = pending.iter().position(|r| r.key == key)?;
        Some(pending.remove(index))
    }

    /// Answer the oldest request for `key`; false when none is pending
    pub fn complete(&self, key: &str, width: u32, height: u32, bytes: &[u8]) -> bool {
        match self.take(key) {
            Some(request) => {
                request.succeed(width, height, bytes);
                true
            }
            None => false,
        }
    }

    /// Answer with a zeroed RGBA payload of the given size
    pub fn complete_rgba(&self, key: &str, width: u32, height: u32) -> bool {
        let bytes = vec![0u8; width as usize * height as usize * 4];
        self.complete(key, width, height, &bytes)
    }

    /// Fail the oldest request for `key`; false when none is pending
    pub fn fail(&self, key: &str) -> bool {
        match self.take(key) {
            Some(request) => {
                request.fail("connection reset");
                true
            }
            None => false,
        }
    }

    /// Fail everything in flight, returning how many requests were answered
    pub fn fail_all(&self) -> usize {
        let drained: Vec<FetchRequest> = self.pending.lock().drain(..).collect();
        let count = drained.len();
        for request in drained {
            request.fail("connection reset");
        }
        count
    }
}

impl FetchBackend for ManualFetchBackend {
    fn begin(&self, request: FetchRequest) {
        self.history.lock().push(request.key.clone());
        self.pending.lock().push(request);
    }
}
