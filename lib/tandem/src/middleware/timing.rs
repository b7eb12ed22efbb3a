//! Timing middleware.
//!
//! Measures the wall-clock duration of every call it wraps, logs it at debug
//! level and records it through the `metrics` facade, so any installed
//! recorder (Prometheus, `StatsD`, ...) picks it up:
//!
//! - `http_client_requests_total` (counter), labeled by method and status
//! - `http_client_request_duration_seconds` (histogram), labeled by method
//! - `http_client_requests_in_flight` (gauge)
//!
//! Registered after a retry layer it times each attempt separately.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tower::{Layer, Service};
use tracing::debug;

use crate::{Error, Method, Request, Response, Result};

const LABEL_METHOD: &str = "method";
const LABEL_STATUS: &str = "status";

const METRIC_REQUESTS_TOTAL: &str = "http_client_requests_total";
const METRIC_REQUEST_DURATION: &str = "http_client_request_duration_seconds";
const METRIC_REQUESTS_IN_FLIGHT: &str = "http_client_requests_in_flight";

/// One timed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingInfo {
    /// Request method.
    pub method: Method,
    /// Request URL.
    pub url: url::Url,
    /// Response status, `None` when the call failed.
    pub status: Option<u16>,
    /// Time spent in the wrapped service.
    pub elapsed: Duration,
}

/// Callback invoked once per completed call.
pub type TimingObserver = Arc<dyn Fn(&TimingInfo) + Send + Sync>;

/// Layer that times requests.
///
/// # Example
///
/// ```ignore
/// use tandem::middleware::TimingLayer;
///
/// let layer = TimingLayer::new().on_complete(|info| {
///     println!("{} {} took {:?}", info.method, info.url, info.elapsed);
/// });
/// ```
#[derive(Clone, Default)]
pub struct TimingLayer {
    observer: Option<TimingObserver>,
}

impl fmt::Debug for TimingLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimingLayer")
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl TimingLayer {
    /// Create a new timing layer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every completed call to `observer`.
    #[must_use]
    pub fn on_complete(mut self, observer: impl Fn(&TimingInfo) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }
}

impl<S> Layer<S> for TimingLayer {
    type Service = Timing<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Timing {
            inner,
            observer: self.observer.clone(),
        }
    }
}

/// Service that times requests.
#[derive(Clone)]
pub struct Timing<S> {
    inner: S,
    observer: Option<TimingObserver>,
}

impl<S: fmt::Debug> fmt::Debug for Timing<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timing")
            .field("inner", &self.inner)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl<S> Timing<S> {
    /// Create a new timing service wrapping the given service.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            observer: None,
        }
    }
}

impl<S> Service<Request<Bytes>> for Timing<S>
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
        let method = request.method();
        let url = request.url().clone();
        let observer = self.observer.clone();
        let mut inner = self.inner.clone();

        metrics::gauge!(METRIC_REQUESTS_IN_FLIGHT).increment(1.0);
        let start = Instant::now();

        Box::pin(async move {
            let result = inner.call(request).await;
            let elapsed = start.elapsed();

            metrics::gauge!(METRIC_REQUESTS_IN_FLIGHT).decrement(1.0);
            metrics::histogram!(METRIC_REQUEST_DURATION, LABEL_METHOD => method.as_str())
                .record(elapsed.as_secs_f64());

            let status = result.as_ref().ok().map(Response::status);
            let status_label = status.map_or_else(|| "error".to_string(), |s| s.to_string());
            metrics::counter!(
                METRIC_REQUESTS_TOTAL,
                LABEL_METHOD => method.as_str(),
                LABEL_STATUS => status_label
            )
            .increment(1);

            debug!(
                %method,
                %url,
                ?status,
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "request timed"
            );

            if let Some(observer) = observer {
                observer(&TimingInfo {
                    method,
                    url,
                    status,
                    elapsed,
                });
            }

            result
        })
    }
}
