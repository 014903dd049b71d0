//! Simulation clock driving the pipeline.
//!
//! The pipeline never reads the wall clock. `AssetRuntime::update_frames` advances a
//! [`FrameClock`] once per simulation step with the same ticks and delta it hands to the retry
//! coordinator and the TTL cache, which each keep their own counters. The clock is a read-only
//! record of that simulated time for the host.
//!
//! ```
//! use asset_pipeline::time::FrameClock;
//! use std::time::Duration;
//!
//! let mut clock = FrameClock::new();
//! clock.advance(1, Duration::from_millis(16));
//! assert_eq!(clock.ticks(), 1);
//! ```

use std::time::Duration;

/// Monotonic tick and time counter
#[derive(Clone, Debug, Default)]
pub struct FrameClock {
    /// Time advanced by the last step
    delta: Duration,
    /// Total simulated time
    elapsed: Duration,
    /// Total simulated ticks
    ticks: u64,
    /// Number of `advance` calls
    frame_count: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by `ticks` simulation ticks covering `delta` of time
    pub fn advance(&mut self, ticks: u64, delta: Duration) {
        self.delta = delta;
        self.elapsed += delta;
        self.ticks += ticks;
        self.frame_count += 1;
    }

    pub fn delta(&self) -> Duration {
        self.delta
    }

    pub fn delta_seconds(&self) -> f64 {
        self.delta.as_secs_f64()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}
