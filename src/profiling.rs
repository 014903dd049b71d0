//! # Profiling Guide
//!
//! The pipeline emits `tracing` events and spans throughout: `asset_runtime.update` around
//! every frame step, `image_cache.truncate` around evictions, and debug/trace events for load
//! state changes, retries and TTL sweeps. Nothing is printed until a subscriber is installed.
//!
//! ## Basic Usage
//!
//! Enable the `profiling` feature in your Cargo.toml:
//!
//! ```toml
//! [dependencies]
//! asset_pipeline = { version = "0.1", features = ["profiling"] }
//! ```
//!
//! Then install a subscriber once at startup:
//!
//! ```ignore
//! asset_pipeline::profiling::init_tracing();
//! ```
//!
//! Filtering follows `RUST_LOG`, e.g. `RUST_LOG=asset_pipeline=debug`.
//!
//! ## Writing a trace file
//!
//! ```ignore
//! let _guard = asset_pipeline::profiling::init_file_tracing("trace.json")?;
//! // Keep the guard alive; dropping it flushes the writer.
//! ```
//!
//! ## Performance Tips
//!
//! 1. Profile in release mode for accurate metrics
//! 2. Use `RUST_LOG=trace` to see every load state transition

#[cfg(feature = "profiling")]
use std::path::Path;
#[cfg(feature = "profiling")]
use tracing_appender::non_blocking::WorkerGuard;
#[cfg(feature = "profiling")]
use tracing_subscriber::{prelude::*, EnvFilter, Registry};

#[cfg(feature = "profiling")]
fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("asset_pipeline=info"))
}

/// Install a stderr JSON subscriber filtered by `RUST_LOG`.
///
/// Returns false if a global subscriber was already set.
#[cfg(feature = "profiling")]
pub fn init_tracing() -> bool {
    let subscriber = Registry::default()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr));
    tracing::subscriber::set_global_default(subscriber).is_ok()
}

/// Install a JSON subscriber writing to `path` through a non-blocking writer
#[cfg(feature = "profiling")]
pub fn init_file_tracing(path: impl AsRef<Path>) -> std::io::Result<WorkerGuard> {
    let file = std::fs::File::create(path)?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let subscriber = Registry::default().with(env_filter()).with(
        tracing_subscriber::fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(non_blocking),
    );
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("global subscriber already installed, trace file stays empty");
    }
    Ok(guard)
}
