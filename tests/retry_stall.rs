use asset_pipeline::prelude::*;
use asset_pipeline::resources::RetryCoordinator;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct CountingObserver {
    stalled: AtomicUsize,
    resumed: AtomicUsize,
}

impl StallObserver for CountingObserver {
    fn loading_stalled(&self, _url: &str) {
        self.stalled.fetch_add(1, Ordering::SeqCst);
    }

    fn loading_resumed(&self) {
        self.resumed.fetch_add(1, Ordering::SeqCst);
    }
}

fn runtime() -> (AssetRuntime, ManualFetchBackend, Arc<CountingObserver>) {
    let backend = ManualFetchBackend::new();
    let observer = Arc::new(CountingObserver::default());
    let runtime = AssetRuntime::new(PipelineConfig::default(), Arc::new(backend.clone()))
        .unwrap()
        .with_stall_observer(observer.clone());
    (runtime, backend, observer)
}

/// Step the runtime in 100ms frames for `total`
fn run_for(runtime: &mut AssetRuntime, total: Duration) {
    let step = Duration::from_millis(100);
    let mut elapsed = Duration::ZERO;
    while elapsed < total {
        runtime.update(step);
        elapsed += step;
    }
}

#[test]
fn test_backoff_exhaustion_with_default_schedule() {
    let coordinator = RetryCoordinator::default();
    let retries = Arc::new(AtomicUsize::new(0));
    let resigns = Arc::new(AtomicUsize::new(0));
    let (r, s) = (retries.clone(), resigns.clone());
    let loader = coordinator.create_loader(
        "img/broken.png",
        Arc::new(move || {
            r.fetch_add(1, Ordering::SeqCst);
        }),
        Some(Arc::new(move || {
            s.fetch_add(1, Ordering::SeqCst);
        })),
        None,
    );

    // Every attempt fails: the initial one and each retry
    loader.fail();
    for delay in [500, 1000, 3000] {
        coordinator.update(Duration::from_millis(delay));
        loader.fail();
    }

    assert_eq!(retries.load(Ordering::SeqCst), 3);
    assert_eq!(resigns.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.stalled_count(), 1);
    assert!(coordinator.is_stalled());
}

#[test]
fn test_failing_load_stalls_then_recovers() {
    let (mut runtime, backend, observer) = runtime();
    let handle = runtime.load_bitmap("img/enemies/Bat.png");

    let mut frames = 0;
    while !handle.is_error() {
        backend.fail_all();
        run_for(&mut runtime, Duration::from_millis(100));
        frames += 1;
        assert!(frames < 100, "never gave up");
    }

    assert_eq!(backend.start_count("img/enemies/Bat.png"), 4);
    assert!(matches!(
        handle.last_error(),
        Some(AssetError::ExhaustedRetries { .. })
    ));
    assert!(runtime.is_stalled());
    assert_eq!(observer.stalled.load(Ordering::SeqCst), 1);

    runtime.retry();
    assert_eq!(observer.resumed.load(Ordering::SeqCst), 1);
    assert!(!runtime.has_stalled_loads());
    assert_eq!(backend.start_count("img/enemies/Bat.png"), 5);

    backend.complete_rgba("img/enemies/Bat.png", 8, 8);
    runtime.update(Duration::from_millis(16));
    assert!(handle.is_ready());
}

#[test]
fn test_replay_restarts_full_schedule() {
    let (mut runtime, backend, _observer) = runtime();
    let handle = runtime.load_bitmap("img/a.png");
    while !handle.is_error() {
        backend.fail_all();
        run_for(&mut runtime, Duration::from_millis(100));
    }

    runtime.retry();
    // The replayed load gets its whole backoff table again
    backend.fail_all();
    run_for(&mut runtime, Duration::from_millis(500));
    assert_eq!(handle.state(), LoadingState::Requesting);
    assert!(!runtime.is_stalled());
    assert_eq!(backend.start_count("img/a.png"), 6);
}

#[test]
fn test_one_stall_for_many_failures() {
    let (mut runtime, backend, observer) = runtime();
    let a = runtime.load_bitmap("img/a.png");
    let b = runtime.load_bitmap("img/b.png");
    while !(a.is_error() && b.is_error()) {
        backend.fail_all();
        run_for(&mut runtime, Duration::from_millis(100));
    }

    assert_eq!(observer.stalled.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.context().retry().stalled_count(), 2);

    runtime.retry();
    assert_eq!(backend.pending_keys().len(), 2);
}
