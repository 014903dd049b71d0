//! Pipeline configuration.
//!
//! ```
//! use asset_pipeline::config::PipelineConfig;
//!
//! let config = PipelineConfig::from_json(r#"{ "image_cache_limit": 4000000 }"#).unwrap();
//! assert_eq!(config.image_cache_limit, 4_000_000);
//! assert_eq!(config.retry_schedule_ms, vec![500, 1000, 3000]);
//! ```

use crate::error::{AssetError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default pixel-area budget of the image cache
pub const DEFAULT_IMAGE_CACHE_LIMIT: u64 = 10 * 1000 * 1000;

/// Default retry delays in milliseconds
pub const DEFAULT_RETRY_SCHEDULE_MS: [u64; 3] = [500, 1000, 3000];

/// Default interval between TTL sweeps, in simulated seconds
pub const DEFAULT_TTL_CHECK_DELAY: f64 = 100.0;

/// Tunables for an [`AssetRuntime`](crate::assets::AssetRuntime)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pixel-area budget (`width * height` summed) of the image cache
    pub image_cache_limit: u64,
    /// Backoff table applied to failing fetches
    pub retry_schedule_ms: Vec<u64>,
    /// Minimum simulated seconds between two TTL sweeps
    pub ttl_check_delay_seconds: f64,
    /// Reservation used by `reserve_bitmap` when none is given
    pub default_reservation_id: u32,
}

impl PipelineConfig {
    /// Parse a config from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.image_cache_limit == 0 {
            return Err(AssetError::InvalidConfig(
                "image_cache_limit must be positive".to_string(),
            ));
        }
        if !self.ttl_check_delay_seconds.is_finite() || self.ttl_check_delay_seconds < 0.0 {
            return Err(AssetError::InvalidConfig(format!(
                "ttl_check_delay_seconds must be a finite non-negative number, got {}",
                self.ttl_check_delay_seconds
            )));
        }
        Ok(())
    }

    /// Backoff table as durations
    pub fn retry_schedule(&self) -> Vec<Duration> {
        self.retry_schedule_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    pub fn with_image_cache_limit(mut self, limit: u64) -> Self {
        self.image_cache_limit = limit;
        self
    }

    pub fn with_retry_schedule_ms(mut self, schedule: Vec<u64>) -> Self {
        self.retry_schedule_ms = schedule;
        self
    }

    pub fn with_ttl_check_delay(mut self, seconds: f64) -> Self {
        self.ttl_check_delay_seconds = seconds;
        self
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            image_cache_limit: DEFAULT_IMAGE_CACHE_LIMIT,
            retry_schedule_ms: DEFAULT_RETRY_SCHEDULE_MS.to_vec(),
            ttl_check_delay_seconds: DEFAULT_TTL_CHECK_DELAY,
            default_reservation_id: 0,
        }
    }
}
