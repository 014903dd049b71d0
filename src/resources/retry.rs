//! Retry coordination for network-backed resources.
//!
//! [`RetryCoordinator::create_loader`] wraps a fetch attempt in a [`FailureHandler`] that
//! replays it along a fixed backoff table. Once the table is exhausted the resource resigns
//! and a replayer is parked in the coordinator; the first parked replayer raises the global
//! stall, and [`RetryCoordinator::retry`] replays everything at once.
//!
//! ```
//! use asset_pipeline::resources::RetryCoordinator;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let coordinator = RetryCoordinator::default();
//! let attempts = Arc::new(AtomicUsize::new(0));
//! let counter = attempts.clone();
//! let loader = coordinator.create_loader(
//!     "img/title.png",
//!     Arc::new(move || { counter.fetch_add(1, Ordering::SeqCst); }),
//!     None,
//!     None,
//! );
//!
//! loader.fail();
//! coordinator.update(Duration::from_millis(500));
//! assert_eq!(attempts.load(Ordering::SeqCst), 1);
//! ```

use parking_lot::Mutex;
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

/// Re-attempts a fetch from scratch
pub type RetryMethod = Arc<dyn Fn() + Send + Sync>;

/// Gives a resource up after the last retry failed
pub type ResignMethod = Arc<dyn Fn() + Send + Sync>;

/// Rendering-layer hook for the global stall.
///
/// While stalled the host should show a persistent error overlay with a retry affordance and
/// stop advancing gameplay, but keep calling the pipeline's `update`.
pub trait StallObserver: Send + Sync {
    /// First resource exhausted its retries
    fn loading_stalled(&self, url: &str);

    /// `retry` was invoked and every stalled resource is being replayed
    fn loading_resumed(&self);
}

/// Stall observer that only logs
#[derive(Clone, Copy, Debug, Default)]
pub struct LogStallObserver;

impl StallObserver for LogStallObserver {
    fn loading_stalled(&self, url: &str) {
        tracing::error!(url, "loading stalled, waiting for retry");
    }

    fn loading_resumed(&self) {
        tracing::info!("loading resumed");
    }
}

struct ScheduledRetry {
    due: Duration,
    seq: u64,
    method: RetryMethod,
}

impl PartialEq for ScheduledRetry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for ScheduledRetry {}

impl PartialOrd for ScheduledRetry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledRetry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

struct Replayer {
    url: String,
    retry_count: Arc<AtomicUsize>,
    method: RetryMethod,
}

impl Replayer {
    fn replay(self) {
        tracing::debug!(url = %self.url, "replaying stalled fetch");
        self.retry_count.store(0, AtomicOrdering::SeqCst);
        (self.method)();
    }
}

struct RetryState {
    now: Duration,
    next_seq: u64,
    timers: BinaryHeap<Reverse<ScheduledRetry>>,
    replayers: Vec<Replayer>,
    stalled: bool,
}

/// Process-wide retry state: backoff timers and the replayer registry.
///
/// Cloning shares the same state.
#[derive(Clone)]
pub struct RetryCoordinator {
    inner: Arc<Mutex<RetryState>>,
    schedule: Arc<[Duration]>,
    observer: Arc<dyn StallObserver>,
}

impl RetryCoordinator {
    /// Create a coordinator whose loaders default to `schedule`
    pub fn new(schedule: Vec<Duration>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RetryState {
                now: Duration::ZERO,
                next_seq: 0,
                timers: BinaryHeap::new(),
                replayers: Vec::new(),
                stalled: false,
            })),
            schedule: schedule.into(),
            observer: Arc::new(LogStallObserver),
        }
    }

    /// Replace the stall observer
    pub fn with_observer(mut self, observer: Arc<dyn StallObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn default_schedule(&self) -> &[Duration] {
        &self.schedule
    }

    /// Build the failure handler for one resource.
    ///
    /// `retry` re-attempts the fetch; `resign` runs once the table is exhausted. An empty `url`
    /// never registers a replayer. `schedule` overrides the coordinator default.
    pub fn create_loader(
        &self,
        url: impl Into<String>,
        retry: RetryMethod,
        resign: Option<ResignMethod>,
        schedule: Option<Vec<Duration>>,
    ) -> FailureHandler {
        FailureHandler {
            url: url.into(),
            retry,
            resign,
            schedule: schedule.map(Into::into).unwrap_or_else(|| self.schedule.clone()),
            retry_count: Arc::new(AtomicUsize::new(0)),
            coordinator: self.clone(),
        }
    }

    /// Whether any resource is waiting for a manual retry
    pub fn exists(&self) -> bool {
        !self.inner.lock().replayers.is_empty()
    }

    pub fn is_stalled(&self) -> bool {
        self.inner.lock().stalled
    }

    /// Number of parked replayers
    pub fn stalled_count(&self) -> usize {
        self.inner.lock().replayers.len()
    }

    /// Backoff retries scheduled but not yet due
    pub fn pending_retries(&self) -> usize {
        self.inner.lock().timers.len()
    }

    /// Clear the stall and replay every parked fetch from the start of its table
    pub fn retry(&self) {
        let replayers = {
            let mut state = self.inner.lock();
            if state.replayers.is_empty() {
                return;
            }
            state.stalled = false;
            std::mem::take(&mut state.replayers)
        };

        tracing::info!(count = replayers.len(), "retrying stalled fetches");
        self.observer.loading_resumed();
        for replayer in replayers {
            replayer.replay();
        }
    }

    /// Advance the backoff clock and run every retry that became due, in due order.
    ///
    /// Returns the number of retries fired.
    pub fn update(&self, delta: Duration) -> usize {
        let due = {
            let mut state = self.inner.lock();
            state.now += delta;
            let now = state.now;
            let mut due = Vec::new();
            while state
                .timers
                .peek()
                .is_some_and(|Reverse(timer)| timer.due <= now)
            {
                if let Some(Reverse(timer)) = state.timers.pop() {
                    due.push(timer.method);
                }
            }
            due
        };

        let fired = due.len();
        for method in due {
            method();
        }
        fired
    }

    fn schedule_retry(&self, delay: Duration, method: RetryMethod) {
        let mut state = self.inner.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let due = state.now + delay;
        state.timers.push(Reverse(ScheduledRetry { due, seq, method }));
    }

    fn park(&self, replayer: Replayer) {
        let url = replayer.url.clone();
        let first = {
            let mut state = self.inner.lock();
            state.replayers.push(replayer);
            let first = !state.stalled;
            state.stalled = true;
            first
        };

        if first {
            self.observer.loading_stalled(&url);
        }
    }
}

impl Default for RetryCoordinator {
    fn default() -> Self {
        Self::new(
            crate::config::DEFAULT_RETRY_SCHEDULE_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        )
    }
}

/// Failure handler for one resource, produced by [`RetryCoordinator::create_loader`]
#[derive(Clone)]
pub struct FailureHandler {
    url: String,
    retry: RetryMethod,
    resign: Option<ResignMethod>,
    schedule: Arc<[Duration]>,
    retry_count: Arc<AtomicUsize>,
    coordinator: RetryCoordinator,
}

impl FailureHandler {
    /// Handle one failed attempt: schedule the next retry or give up and park a replayer
    pub fn fail(&self) {
        let count = self.retry_count.load(AtomicOrdering::SeqCst);
        if let Some(delay) = self.schedule.get(count) {
            tracing::debug!(url = %self.url, attempt = count + 1, ?delay, "scheduling retry");
            self.coordinator.schedule_retry(*delay, self.retry.clone());
            self.retry_count.store(count + 1, AtomicOrdering::SeqCst);
            return;
        }

        tracing::warn!(url = %self.url, retries = count, "retries exhausted");
        if let Some(resign) = &self.resign {
            resign();
        }
        if !self.url.is_empty() {
            self.coordinator.park(Replayer {
                url: self.url.clone(),
                retry_count: self.retry_count.clone(),
                method: self.retry.clone(),
            });
        }
    }

    /// Retries used so far in the current round
    pub fn retry_count(&self) -> usize {
        self.retry_count.load(AtomicOrdering::SeqCst)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}
