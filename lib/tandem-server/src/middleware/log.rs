//! Request logging.

use futures_util::future::BoxFuture;
use tandem_core::Response;
use tracing::{debug, info, warn};

use super::Middleware;
use crate::request::{Request, RequestHead};

/// Logs every request with its status and latency.
///
/// Emits a `debug` event when the request arrives and an `info` event (or
/// `warn` for 5xx) when the response leaves.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRequest;

impl LogRequest {
    /// Create the middleware.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for LogRequest {
    fn on_request<'a>(&'a self, request: &'a mut Request) -> BoxFuture<'a, Option<Response>> {
        debug!(method = %request.method(), path = request.path(), "request received");
        Box::pin(async { None })
    }

    fn on_response<'a>(
        &'a self,
        request: &'a RequestHead,
        response: Response,
    ) -> BoxFuture<'a, Response> {
        let elapsed = request.received_at().elapsed();
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let status = response.status();
        if status >= 500 {
            warn!(
                method = %request.method(),
                path = request.path(),
                status,
                elapsed_ms,
                "request failed"
            );
        } else {
            info!(
                method = %request.method(),
                path = request.path(),
                status,
                elapsed_ms,
                "request handled"
            );
        }
        Box::pin(async move { response })
    }
}
