use asset_pipeline::prelude::*;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const FRAME: Duration = Duration::from_millis(16);

/// Records every distinct state a handle passes through between steps
struct StateLog {
    handle: ResourceHandle,
    seen: Vec<LoadingState>,
}

impl StateLog {
    fn new(handle: ResourceHandle) -> Self {
        let seen = vec![handle.state()];
        Self { handle, seen }
    }

    fn observe(&mut self) {
        let state = self.handle.state();
        if self.seen.last() != Some(&state) {
            self.seen.push(state);
        }
    }

    fn assert_legal(&self) {
        for pair in self.seen.windows(2) {
            assert!(
                pair[0].can_advance_to(pair[1]),
                "illegal transition {} -> {} in {:?}",
                pair[0],
                pair[1],
                self.seen
            );
        }
    }
}

fn runtime(schedule: Vec<u64>) -> (AssetRuntime, ManualFetchBackend) {
    let backend = ManualFetchBackend::new();
    let config = PipelineConfig::default().with_retry_schedule_ms(schedule);
    let runtime = AssetRuntime::new(config, Arc::new(backend.clone())).unwrap();
    (runtime, backend)
}

#[test]
fn test_load_path_is_legal() {
    let (mut runtime, backend) = runtime(vec![10, 20]);
    let mut log = StateLog::new(runtime.load_bitmap("img/a.png"));

    backend.fail("img/a.png");
    runtime.update(FRAME);
    log.observe();
    backend.complete_rgba("img/a.png", 3, 3);
    runtime.update(FRAME);
    log.observe();

    log.assert_legal();
    assert_eq!(log.seen, vec![LoadingState::Requesting, LoadingState::Loaded]);
}

#[test]
fn test_prefetch_then_decode_path_is_legal() {
    let (mut runtime, backend) = runtime(vec![10]);
    let handle = runtime.request_bitmap("img/b.png");
    let mut log = StateLog::new(handle.clone());

    runtime.update(FRAME);
    log.observe();
    backend.complete_rgba("img/b.png", 2, 2);
    runtime.update(FRAME);
    log.observe();

    runtime.load_bitmap("img/b.png");
    log.observe();
    backend.complete_rgba("img/b.png", 2, 2);
    runtime.update(FRAME);
    log.observe();

    log.assert_legal();
    assert_eq!(
        log.seen,
        vec![
            LoadingState::Pending,
            LoadingState::Requesting,
            LoadingState::Purged,
            LoadingState::Requesting,
            LoadingState::Loaded,
        ]
    );
}

#[test]
fn test_error_then_manual_retry_is_legal() {
    let (mut runtime, backend) = runtime(Vec::new());
    let mut log = StateLog::new(runtime.load_bitmap("img/c.png"));

    backend.fail("img/c.png");
    runtime.update(FRAME);
    log.observe();
    assert!(runtime.is_stalled());

    runtime.retry();
    log.observe();
    backend.complete_rgba("img/c.png", 1, 1);
    runtime.update(FRAME);
    log.observe();

    log.assert_legal();
    assert_eq!(
        log.seen,
        vec![
            LoadingState::Requesting,
            LoadingState::Error,
            LoadingState::Requesting,
            LoadingState::Loaded,
        ]
    );
}

#[test]
fn test_listeners_fire_once_in_order() {
    let (mut runtime, backend) = runtime(vec![10]);
    let handle = runtime.load_bitmap("img/d.png");
    let calls = Arc::new(Mutex::new(Vec::new()));
    for tag in ["first", "second"] {
        let calls = calls.clone();
        handle.add_load_listener(move |h| calls.lock().push((tag, h.width())));
    }

    backend.complete_rgba("img/d.png", 5, 1);
    runtime.update(FRAME);
    runtime.update(FRAME);
    assert_eq!(*calls.lock(), vec![("first", 5), ("second", 5)]);

    // Late listeners run right away
    let late = calls.clone();
    handle.add_load_listener(move |_| late.lock().push(("late", 0)));
    assert_eq!(calls.lock().len(), 3);
}

#[test]
fn test_decode_failure_is_terminal_until_decoded_again() {
    let (mut runtime, backend) = runtime(vec![10]);
    let handle = runtime.load_bitmap("img/e.png");
    backend.complete("img/e.png", 2, 2, &[0u8; 3]);
    runtime.update(FRAME);
    assert!(handle.is_error());
    assert!(matches!(
        handle.last_error(),
        Some(AssetError::DecodeFailure { .. })
    ));

    runtime.load_bitmap("img/e.png");
    assert_eq!(handle.state(), LoadingState::Requesting);
    backend.complete_rgba("img/e.png", 2, 2);
    runtime.update(FRAME);
    assert!(handle.is_ready());
    assert!(handle.last_error().is_none());
}
