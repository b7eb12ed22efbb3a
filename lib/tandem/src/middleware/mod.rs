//! Tower middleware layers for the tandem HTTP client.
//!
//! Every layer wraps a `Service<Request<Bytes>, Response = Response<Bytes>, Error = Error>`
//! and can be registered on [`HyperClientBuilder`](crate::HyperClientBuilder)
//! with `.layer(..)`. Composition is an onion: the first layer registered is
//! the outermost, so requests traverse layers in registration order and
//! responses come back in reverse order.
//!
//! # Available Layers
//!
//! - [`LoggingLayer`] - Logs requests/responses using `tracing`
//! - [`RetryPolicy`] - Backoff-aware retry policy for [`RetryLayer`]
//! - [`TimingLayer`] - Measures each call (log, histogram, observer callback)
//! - [`CompressionLayer`] - Gzip request bodies, decompress responses
//! - [`RateLimitLayer`] - Local token bucket, waiting or failing fast
//! - [`HeadersLayer`] - Default headers
//! - [`AuthLayer`] - Applies an [`AuthProvider`](crate::auth::AuthProvider)
//! - [`ConcurrencyLimitLayer`] - Limits concurrent requests (from tower)
//!
//! # Ordering
//!
//! ```ignore
//! use tandem::HyperClient;
//!
//! // Retry is registered before timing, so each attempt is timed separately.
//! let client = HyperClient::builder()
//!     .with_logging()
//!     .with_retry(3)
//!     .with_timing()
//!     .build();
//! ```

mod auth;
mod compression;
mod headers;
mod logging;
mod rate_limit;
mod retry;
mod timing;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{Auth, AuthLayer};
pub use compression::{Compression, CompressionLayer, DEFAULT_MIN_COMPRESS_SIZE};
pub use headers::{DefaultHeaders, HeadersLayer};
pub use logging::{LogLevel, Logging, LoggingLayer};
pub use rate_limit::{RateLimit, RateLimitLayer, RateLimitMode};
pub use retry::{DEFAULT_RETRY_STATUSES, RetryPolicy};
pub use timing::{Timing, TimingInfo, TimingLayer, TimingObserver};

// Re-export tower types for convenience
pub use tower::{Layer, ServiceBuilder};

// Re-export tower middleware layers
pub use tower::limit::ConcurrencyLimitLayer;
pub use tower::retry::RetryLayer;
