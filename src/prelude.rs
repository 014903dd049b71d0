//! Convenient re-exports of commonly used types.
//!
//! The prelude can be imported with:
//! ```
//! use asset_pipeline::prelude::*;
//! ```

pub use crate::assets::{
    AssetRuntime, CacheEntry, CacheMap, ImageCache, RequestQueue, ReservationId,
};
pub use crate::config::PipelineConfig;
pub use crate::error::{AssetError, Result};
pub use crate::resources::{
    FetchBackend, FetchRequest, LoadingState, ManualFetchBackend, PixelDecoder, PixelSource,
    ResourceHandle, StallObserver,
};
pub use crate::time::FrameClock;
