//! Rate limiting middleware using governor.
//!
//! This middleware limits the rate of outgoing requests using a token bucket
//! shared by every clone of the layer. When the bucket is empty the request
//! either waits for a token or fails immediately with [`Error::RateLimit`],
//! depending on the [`RateLimitMode`].

use std::future::Future;
use std::num::NonZeroU32;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use governor::clock::{Clock, DefaultClock};
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tower::{Layer, Service};
use tracing::debug;

use crate::{Error, Request, Response, Result};

type GovernorLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// What to do when no token is available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RateLimitMode {
    /// Wait until a token is available.
    #[default]
    Wait,
    /// Fail with [`Error::RateLimit`] carrying the time until the next token.
    FailFast,
}

/// Layer that applies rate limiting to requests.
///
/// # Example
///
/// ```ignore
/// use tandem::middleware::{RateLimitLayer, RateLimitMode};
///
/// // Allow 10 requests per second
/// let layer = RateLimitLayer::per_second(10);
///
/// // Allow 100 requests per minute, rejecting the excess
/// let layer = RateLimitLayer::per_minute(100).mode(RateLimitMode::FailFast);
/// ```
#[derive(Debug, Clone)]
pub struct RateLimitLayer {
    limiter: Arc<GovernorLimiter>,
    mode: RateLimitMode,
}

impl RateLimitLayer {
    /// Create a rate limiter allowing `count` requests per second.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn per_second(count: u32) -> Self {
        let count = NonZeroU32::new(count).expect("count must be non-zero");
        Self::with_quota(Quota::per_second(count))
    }

    /// Create a rate limiter allowing `count` requests per minute.
    ///
    /// # Panics
    ///
    /// Panics if `count` is zero.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn per_minute(count: u32) -> Self {
        let count = NonZeroU32::new(count).expect("count must be non-zero");
        Self::with_quota(Quota::per_minute(count))
    }

    /// Create a rate limiter with a custom quota.
    #[must_use]
    pub fn with_quota(quota: Quota) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            mode: RateLimitMode::default(),
        }
    }

    /// Set the behavior when the bucket is empty.
    #[must_use]
    pub const fn mode(mut self, mode: RateLimitMode) -> Self {
        self.mode = mode;
        self
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimit<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimit {
            inner,
            limiter: Arc::clone(&self.limiter),
            mode: self.mode,
        }
    }
}

/// Service that applies rate limiting to requests.
#[derive(Debug, Clone)]
pub struct RateLimit<S> {
    inner: S,
    limiter: Arc<GovernorLimiter>,
    mode: RateLimitMode,
}

impl<S> Service<Request<Bytes>> for RateLimit<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let limiter = Arc::clone(&self.limiter);
        let mode = self.mode;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            match mode {
                RateLimitMode::Wait => limiter.until_ready().await,
                RateLimitMode::FailFast => {
                    if let Err(not_until) = limiter.check() {
                        let wait = not_until.wait_time_from(DefaultClock::default().now());
                        debug!(
                            url = %request.url(),
                            wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                            "local rate limit exceeded"
                        );
                        return Err(Error::rate_limit("local rate limit exceeded", Some(wait)));
                    }
                }
            }

            inner.call(request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use tower::ServiceExt;

    use super::*;
    use crate::middleware::testing::{MockService, get};

    #[test]
    #[should_panic(expected = "count must be non-zero")]
    fn zero_count_panics() {
        let _ = RateLimitLayer::per_second(0);
    }

    #[tokio::test]
    async fn allows_burst_within_quota() {
        let mock = MockService::status(200);
        let service = RateLimitLayer::per_second(5)
            .mode(RateLimitMode::FailFast)
            .layer(mock.clone());

        for _ in 0..5 {
            let response = service
                .clone()
                .oneshot(get("https://example.com"))
                .await
                .expect("response");
            assert_eq!(response.status(), 200);
        }
        assert_eq!(mock.call_count(), 5);
    }

    #[tokio::test]
    async fn fail_fast_rejects_excess() {
        let mock = MockService::status(200);
        let service = RateLimitLayer::per_minute(1)
            .mode(RateLimitMode::FailFast)
            .layer(mock.clone());

        service
            .clone()
            .oneshot(get("https://example.com"))
            .await
            .expect("first request");
        let err = service
            .oneshot(get("https://example.com"))
            .await
            .expect_err("second request is limited");

        assert_eq!(err.code(), "rate_limit_exceeded");
        let Error::RateLimit { retry_after, .. } = err else {
            panic!("expected a rate limit error");
        };
        assert!(retry_after.is_some_and(|wait| wait > Duration::from_secs(30)));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn wait_mode_delays_excess() {
        let mock = MockService::status(200);
        let quota = Quota::with_period(Duration::from_millis(50))
            .expect("non-zero period")
            .allow_burst(NonZeroU32::MIN);
        let service = RateLimitLayer::with_quota(quota).layer(mock.clone());

        let start = Instant::now();
        for _ in 0..3 {
            service
                .clone()
                .oneshot(get("https://example.com"))
                .await
                .expect("response");
        }

        assert!(start.elapsed() >= Duration::from_millis(90));
        assert_eq!(mock.call_count(), 3);
    }

    #[test]
    fn layers_share_the_bucket() {
        let layer = RateLimitLayer::per_second(1);
        let a = layer.layer(MockService::status(200));
        let b = layer.layer(MockService::status(200));
        assert!(Arc::ptr_eq(&a.limiter, &b.limiter));
    }
}
