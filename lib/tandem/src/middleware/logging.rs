//! Request/response logging middleware.
//!
//! Each call runs inside an `http_request` span. The request line and the
//! outcome are logged at info level; headers and bodies are added at debug
//! level when enabled. The middleware never changes the request or response.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use bytes::Bytes;
use tower::{Layer, Service};
use tracing::{Instrument, Level, debug, info, span, warn};

use crate::{Error, Request, Response, Result};

/// Bodies longer than this are truncated in debug logs.
const DEFAULT_MAX_BODY_LOG: usize = 1024;

/// Layer that adds request/response logging.
///
/// # Example
///
/// ```ignore
/// use tandem::middleware::LoggingLayer;
///
/// let layer = LoggingLayer::new().with_headers(true).with_body(true);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LoggingLayer {
    level: LogLevel,
    log_headers: bool,
    log_body: bool,
    max_body_len: usize,
}

impl Default for LoggingLayer {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            log_headers: false,
            log_body: false,
            max_body_len: DEFAULT_MAX_BODY_LOG,
        }
    }
}

/// Log level for the logging middleware.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Log at debug level (request/response details).
    Debug,
    /// Log at info level (summary only).
    #[default]
    Info,
}

impl LoggingLayer {
    /// Create a new logging layer with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a logging layer that logs headers and bodies at debug level.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            level: LogLevel::Debug,
            log_headers: true,
            log_body: true,
            ..Self::default()
        }
    }

    /// Include headers in the debug logs.
    #[must_use]
    pub const fn with_headers(mut self, enabled: bool) -> Self {
        self.log_headers = enabled;
        self
    }

    /// Include bodies (truncated) in the debug logs.
    #[must_use]
    pub const fn with_body(mut self, enabled: bool) -> Self {
        self.log_body = enabled;
        self
    }

    /// Truncate logged bodies to `len` bytes.
    #[must_use]
    pub const fn with_max_body_len(mut self, len: usize) -> Self {
        self.max_body_len = len;
        self
    }
}

impl<S> Layer<S> for LoggingLayer {
    type Service = Logging<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Logging {
            inner,
            settings: *self,
        }
    }
}

/// Service that logs requests and responses.
#[derive(Debug, Clone)]
pub struct Logging<S> {
    inner: S,
    settings: LoggingLayer,
}

impl<S> Logging<S> {
    /// Create a new logging service wrapping the given service.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            settings: LoggingLayer::default(),
        }
    }
}

/// Lossy, truncated rendering of a body for logs.
fn preview(body: &[u8], max_len: usize) -> String {
    let shown = body.get(..max_len).unwrap_or(body);
    let mut text = String::from_utf8_lossy(shown).into_owned();
    if shown.len() < body.len() {
        text.push_str(&format!("... ({} bytes)", body.len()));
    }
    text
}

impl<S> Service<Request<Bytes>> for Logging<S>
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
        let url = request.url().to_string();
        let settings = self.settings;

        let span = span!(Level::INFO, "http_request", %method, %url);

        let mut inner = self.inner.clone();
        Box::pin(
            async move {
                let start = Instant::now();

                match settings.level {
                    LogLevel::Debug => debug!(method = %method, url = %url, "sending request"),
                    LogLevel::Info => info!(method = %method, url = %url, "sending request"),
                }
                if settings.log_headers {
                    debug!(headers = ?request.headers(), "request headers");
                }
                if settings.log_body {
                    if let Some(body) = request.body().filter(|body| !body.is_empty()) {
                        debug!(body = %preview(body, settings.max_body_len), "request body");
                    }
                }

                let result = inner.call(request).await;

                // Saturating conversion to u64 (truncates after ~584 million years)
                let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

                match &result {
                    Ok(response) => {
                        let status = response.status();
                        if response.is_success() {
                            info!(status, elapsed_ms, "request completed");
                        } else {
                            warn!(status, elapsed_ms, "request failed with HTTP error");
                        }
                        if settings.log_headers {
                            debug!(headers = ?response.headers(), "response headers");
                        }
                        if settings.log_body && !response.body().is_empty() {
                            debug!(
                                body = %preview(response.body(), settings.max_body_len),
                                "response body"
                            );
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, elapsed_ms, "request failed");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
