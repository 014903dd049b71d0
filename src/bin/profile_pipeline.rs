#[cfg(feature = "profiling")]
use asset_pipeline::assets::AssetRuntime;
#[cfg(feature = "profiling")]
use asset_pipeline::config::PipelineConfig;
#[cfg(feature = "profiling")]
use asset_pipeline::resources::ManualFetchBackend;
#[cfg(feature = "profiling")]
use std::sync::Arc;
#[cfg(feature = "profiling")]
use std::time::{Duration, Instant};

#[cfg(feature = "profiling")]
const FRAME: Duration = Duration::from_millis(16);

#[cfg(feature = "profiling")]
#[tracing::instrument(skip(runtime, backend))]
fn profile_load_storm(
    runtime: &mut AssetRuntime,
    backend: &ManualFetchBackend,
    count: usize,
) {
    let _span = tracing::info_span!("load_storm", count = count).entered();
    for i in 0..count {
        if i % 1_000 == 0 {
            tracing::info!("Requesting image {}/{}", i, count);
        }
        let key = format!("img/pictures/{i}.png");
        if i % 2 == 0 {
            runtime.load_bitmap(&key);
        } else {
            runtime.request_bitmap(&key);
        }
    }

    // Answer every pending fetch, failing one in ten so retries show up in the trace
    let mut frame = 0usize;
    while !runtime.is_ready() || !runtime.request_queue().is_empty() {
        for key in backend.pending_keys() {
            if frame % 10 == 0 && key.ends_with("0.png") {
                backend.fail(&key);
            } else {
                backend.complete_rgba(&key, 64, 64);
            }
        }
        runtime.update(FRAME);
        if runtime.is_stalled() {
            runtime.retry();
        }
        frame += 1;
    }
    tracing::info!(frames = frame, "load storm drained");
}

#[cfg(feature = "profiling")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _guard = asset_pipeline::profiling::init_file_tracing("trace.json")?;

    let backend = ManualFetchBackend::new();
    let config = PipelineConfig::default().with_image_cache_limit(64 * 64 * 500);
    let mut runtime = AssetRuntime::new(config, Arc::new(backend.clone()))?;

    println!("Warming up...");
    {
        let _span = tracing::info_span!("warmup").entered();
        for i in 0..100 {
            runtime.load_bitmap(&format!("img/system/{i}.png"));
        }
        for key in backend.pending_keys() {
            backend.complete_rgba(&key, 16, 16);
        }
        runtime.update(FRAME);
    }

    println!("Profiling a 10k image load storm...");
    let start = Instant::now();
    profile_load_storm(&mut runtime, &backend, 10_000);
    println!("Load storm complete in: {:?}", start.elapsed());
    println!("Cache stats: {:?}", runtime.image_cache().stats());
    println!("Pool stats: {:?}", runtime.pool().stats());
    Ok(())
}

#[cfg(not(feature = "profiling"))]
fn main() {
    println!("profile_pipeline binary requires --features profiling");
}
