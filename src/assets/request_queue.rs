use crate::resources::ResourceHandle;
use std::collections::VecDeque;

/// What the request queue needs from a queued resource
pub trait Requestable {
    /// Finished with the network, successfully or not
    fn is_request_ready(&self) -> bool;

    /// Start fetching; must be idempotent once started
    fn start_request(&self);
}

impl Requestable for ResourceHandle {
    fn is_request_ready(&self) -> bool {
        ResourceHandle::is_request_ready(self)
    }

    fn start_request(&self) {
        ResourceHandle::start_request(self)
    }
}

/// Single-lane FIFO of resources awaiting fetch.
///
/// At most one queue-managed fetch is in flight per queue: once an entry is started it stays the
/// active one until it is request-ready, even if another key is raised ahead of it. Run several
/// queues for overlapping fetches.
pub struct RequestQueue<H: Requestable = ResourceHandle> {
    queue: VecDeque<(String, H)>,
    /// Key of the entry this queue started and is waiting on
    in_flight: Option<String>,
}

impl<H: Requestable> RequestQueue<H> {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            in_flight: None,
        }
    }

    /// Append to the tail
    pub fn enqueue(&mut self, key: impl Into<String>, handle: H) {
        self.queue.push_back((key.into(), handle));
    }

    /// The started entry if it is still queued, otherwise the head
    fn active_index(&self) -> Option<usize> {
        let started = self
            .in_flight
            .as_ref()
            .and_then(|key| self.queue.iter().position(|(k, _)| k == key));
        match started {
            Some(index) => Some(index),
            None if self.queue.is_empty() => None,
            None => Some(0),
        }
    }

    /// Advance the lane by one step
    pub fn update(&mut self) {
        let Some(index) = self.active_index() else {
            self.in_flight = None;
            return;
        };

        let (_, active) = &self.queue[index];
        if active.is_request_ready() {
            if let Some((key, _)) = self.queue.remove(index) {
                tracing::trace!(key = %key, "request queue entry finished");
            }
            self.in_flight = None;
            if let Some((key, next)) = self.queue.front() {
                next.start_request();
                self.in_flight = Some(key.clone());
            }
        } else {
            active.start_request();
            self.in_flight = Some(self.queue[index].0.clone());
        }
    }

    /// Move `key` to the head, keeping everything else in order.
    ///
    /// An entry already in flight stays active; the raised key starts once it finishes.
    pub fn raise_priority(&mut self, key: &str) {
        let Some(index) = self.queue.iter().position(|(k, _)| k == key) else {
            return;
        };
        if index == 0 {
            return;
        }
        if let Some(entry) = self.queue.remove(index) {
            self.queue.push_front(entry);
        }
    }

    /// Key of the entry currently being fetched for this queue
    pub fn in_flight(&self) -> Option<&str> {
        self.in_flight.as_deref()
    }

    /// Drop every queued entry
    pub fn clear(&mut self) {
        self.queue.clear();
        self.in_flight = None;
    }

    /// Queued keys, head first
    pub fn keys(&self) -> Vec<&str> {
        self.queue.iter().map(|(k, _)| k.as_str()).collect()
    }

    pub fn head(&self) -> Option<&H> {
        self.queue.front().map(|(_, h)| h)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.queue.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<H: Requestable> Default for RequestQueue<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Clone)]
    struct FakeRequest {
        done: Rc<Cell<bool>>,
        starts: Rc<Cell<u32>>,
    }

    impl FakeRequest {
        fn new() -> Self {
            Self {
                done: Rc::new(Cell::new(false)),
                starts: Rc::new(Cell::new(0)),
            }
        }
    }

    impl Requestable for FakeRequest {
        fn is_request_ready(&self) -> bool {
            self.done.get()
        }

        fn start_request(&self) {
            self.starts.set(self.starts.get() + 1);
        }
    }

    #[test]
    fn test_update_on_empty_queue() {
        let mut queue: RequestQueue<FakeRequest> = RequestQueue::new();
        queue.update();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_head_is_restarted_until_ready() {
        let mut queue = RequestQueue::new();
        let x = FakeRequest::new();
        let y = FakeRequest::new();
        queue.enqueue("x", x.clone());
        queue.enqueue("y", y.clone());

        queue.update();
        queue.update();
        assert_eq!(x.starts.get(), 2);
        assert_eq!(y.starts.get(), 0);

        x.done.set(true);
        queue.update();
        assert_eq!(queue.keys(), vec!["y"]);
        assert_eq!(y.starts.get(), 1);
    }

    #[test]
    fn test_raise_priority_permutes_only() {
        let mut queue = RequestQueue::new();
        for key in ["a", "b", "c", "d"] {
            queue.enqueue(key, FakeRequest::new());
        }
        queue.raise_priority("c");
        assert_eq!(queue.keys(), vec!["c", "a", "b", "d"]);

        queue.raise_priority("missing");
        queue.raise_priority("c");
        assert_eq!(queue.keys(), vec!["c", "a", "b", "d"]);
        assert_eq!(queue.len(), 4);
    }

    #[test]
    fn test_raised_key_waits_for_started_entry() {
        let mut queue = RequestQueue::new();
        let x = FakeRequest::new();
        let y = FakeRequest::new();
        let z = FakeRequest::new();
        queue.enqueue("x", x.clone());
        queue.enqueue("y", y.clone());
        queue.enqueue("z", z.clone());

        queue.update();
        assert_eq!(queue.in_flight(), Some("x"));
        queue.raise_priority("z");
        assert_eq!(queue.keys(), vec!["z", "x", "y"]);

        queue.update();
        queue.update();
        assert_eq!(x.starts.get(), 3);
        assert_eq!(z.starts.get(), 0);

        x.done.set(true);
        queue.update();
        assert_eq!(queue.keys(), vec!["z", "y"]);
        assert_eq!(queue.in_flight(), Some("z"));
        assert_eq!(z.starts.get(), 1);
        assert_eq!(y.starts.get(), 0);
    }

    #[test]
    fn test_clear() {
        let mut queue = RequestQueue::new();
        queue.enqueue("a", FakeRequest::new());
        assert!(queue.contains("a"));
        queue.update();
        queue.clear();
        assert!(queue.head().is_none());
        assert!(queue.in_flight().is_none());
    }
}
