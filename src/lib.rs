//! HTTP relay that turns YouTube links into MP3 audio through a third-party
//! conversion service.

pub mod config;
pub mod error;
pub mod normalize;
pub mod relay;
pub mod retry;
pub mod routes;

pub use config::{RelayConfig, ResponseMode};
pub use error::ApiError;
pub use normalize::{NormalizedVideoUrl, VideoUrlNormalizer, normalize_youtube_url};
pub use relay::{Conversion, ConversionRelay, ConversionResult, RelayError};
pub use retry::{QueueRetryPolicy, RetryLimit};
pub use routes::{AppState, build_router};
