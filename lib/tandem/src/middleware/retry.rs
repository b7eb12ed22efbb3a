//! Retry policy for [`tower::retry::RetryLayer`].
//!
//! The policy retries transport failures (connection errors and timeouts)
//! and a configurable set of statuses. Between attempts it sleeps for
//! `backoff_factor * 2^attempt`, capped at `max_backoff`, unless the server
//! sent a `Retry-After` header, which wins.

use std::time::Duration;

use bytes::Bytes;
use tower::retry::Policy;
use tracing::debug;

use crate::{Error, Request, Response};

/// Statuses retried by default: 429 and the transient 5xx family.
pub const DEFAULT_RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Backoff-aware retry policy.
///
/// tower clones the policy for every request, so the attempt counter is
/// per request.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use tandem::middleware::{RetryLayer, RetryPolicy};
///
/// let layer = RetryLayer::new(
///     RetryPolicy::new(3)
///         .with_backoff_factor(Duration::from_millis(200))
///         .with_jitter(true),
/// );
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    attempt: u32,
    backoff_factor: Duration,
    max_backoff: Duration,
    jitter: bool,
    retry_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            attempt: 0,
            backoff_factor: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            jitter: false,
            retry_statuses: DEFAULT_RETRY_STATUSES.to_vec(),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with the given maximum number of retries.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Base delay; the n-th retry waits `factor * 2^n`.
    #[must_use]
    pub const fn with_backoff_factor(mut self, factor: Duration) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Upper bound for the computed delay.
    #[must_use]
    pub const fn with_max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff = max;
        self
    }

    /// Randomize each delay between half and the full computed value.
    #[must_use]
    pub const fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replace the set of retried statuses.
    #[must_use]
    pub fn with_retry_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retry_statuses = statuses.into_iter().collect();
        self
    }

    /// Maximum number of retries after the first attempt.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn should_retry_response(&self, response: &Response<Bytes>) -> bool {
        self.retry_statuses.contains(&response.status())
    }

    fn should_retry_error(error: &Error) -> bool {
        error.is_connection() || error.is_timeout()
    }

    /// Delay before retry number `attempt` (0-based).
    fn backoff(&self, attempt: u32) -> Duration {
        let delay = self
            .backoff_factor
            .checked_mul(2u32.saturating_pow(attempt))
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff);
        if self.jitter {
            let half = delay / 2;
            half + delay.mul_f64(fastrand::f64() / 2.0)
        } else {
            delay
        }
    }
}

impl Policy<Request<Bytes>, Response<Bytes>, Error> for RetryPolicy {
    type Future = tokio::time::Sleep;

    fn retry(
        &mut self,
        request: &mut Request<Bytes>,
        result: &mut Result<Response<Bytes>, Error>,
    ) -> Option<Self::Future> {
        if self.attempt >= self.max_retries {
            return None;
        }

        let delay = match result {
            Ok(response) if self.should_retry_response(response) => response
                .retry_after()
                .unwrap_or_else(|| self.backoff(self.attempt)),
            Err(error) if Self::should_retry_error(error) => self.backoff(self.attempt),
            _ => return None,
        };

        self.attempt += 1;
        debug!(
            method = %request.method(),
            url = %request.url(),
            attempt = self.attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "retrying request"
        );
        Some(tokio::time::sleep(delay))
    }

    fn clone_request(&mut self, request: &Request<Bytes>) -> Option<Request<Bytes>> {
        Some(request.clone())
    }
}

#[cfg(test)]
mod tests {
    use tower::retry::RetryLayer;
    use tower::{Layer, ServiceExt};

    use super::*;
    use crate::middleware::testing::{MockService, get};

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries).with_backoff_factor(Duration::from_millis(1))
    }

    #[test]
    fn default_statuses() {
        let policy = RetryPolicy::default();
        for status in DEFAULT_RETRY_STATUSES {
            assert!(policy.should_retry_response(&Response::from_status(status)));
        }
        assert!(!policy.should_retry_response(&Response::from_status(501)));
        assert!(!policy.should_retry_response(&Response::from_status(404)));
        assert!(!policy.should_retry_response(&Response::from_status(200)));
    }

    #[test]
    fn transport_errors_are_retried() {
        assert!(RetryPolicy::should_retry_error(&Error::connection("refused")));
        assert!(RetryPolicy::should_retry_error(&Error::Timeout));
        assert!(!RetryPolicy::should_retry_error(&Error::tls("bad cert")));
        assert!(!RetryPolicy::should_retry_error(&Error::invalid_request("nope")));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy::new(10)
            .with_backoff_factor(Duration::from_millis(100))
            .with_max_backoff(Duration::from_millis(500));
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(500));
        assert_eq!(policy.backoff(40), Duration::from_millis(500));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(3)
            .with_backoff_factor(Duration::from_millis(100))
            .with_jitter(true);
        for _ in 0..50 {
            let delay = policy.backoff(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(200));
        }
    }

    #[tokio::test]
    async fn succeeds_after_two_failures() {
        let mock = MockService::new(|n, _| {
            Ok(Response::from_status(if n < 3 { 503 } else { 200 }))
        });
        let service = RetryLayer::new(fast(3)).layer(mock.clone());

        let response = service.oneshot(get("https://example.com")).await.expect("response");

        assert_eq!(response.status(), 200);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn surfaces_last_response_when_exhausted() {
        let mock = MockService::status(500);
        let service = RetryLayer::new(fast(3)).layer(mock.clone());

        let response = service.oneshot(get("https://example.com")).await.expect("response");

        assert_eq!(response.status(), 500);
        assert_eq!(mock.call_count(), 4);
    }

    #[tokio::test]
    async fn surfaces_last_error_when_exhausted() {
        let mock = MockService::new(|_, _| Err(Error::connection("refused")));
        let service = RetryLayer::new(fast(2)).layer(mock.clone());

        let err = service
            .oneshot(get("https://example.com"))
            .await
            .expect_err("error");

        assert!(err.is_connection());
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn does_not_retry_client_errors() {
        let mock = MockService::status(404);
        let service = RetryLayer::new(fast(3)).layer(mock.clone());

        let response = service.oneshot(get("https://example.com")).await.expect("response");

        assert_eq!(response.status(), 404);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_header_overrides_backoff() {
        let mock = MockService::new(|n, _| {
            Ok(if n == 1 {
                Response::from_status(429).with_header("Retry-After", "7")
            } else {
                Response::from_status(200)
            })
        });
        let service = RetryLayer::new(fast(1)).layer(mock.clone());

        let start = tokio::time::Instant::now();
        let response = service.oneshot(get("https://example.com")).await.expect("response");

        assert_eq!(response.status(), 200);
        assert!(start.elapsed() >= Duration::from_secs(7));
    }
}
