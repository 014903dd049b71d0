pub mod context;
pub mod handle;
pub mod platform;
pub mod pool;
pub mod retry;
pub mod state;

pub use context::{CompletionQueue, LoadContext};
pub use handle::{LoadListener, ResourceHandle, WeakResourceHandle};
pub use platform::{
    FetchBackend, FetchOutcome, FetchRequest, ManualFetchBackend, PixelDecoder, PixelSource,
    PlatformImage, RgbaDecoder,
};
pub use pool::{ImagePool, PoolStats};
pub use retry::{
    FailureHandler, LogStallObserver, ResignMethod, RetryCoordinator, RetryMethod, StallObserver,
};
pub use state::LoadingState;
