//! HTTP transport traits.
//!
//! - [`HttpClient`] - buffered request/response execution
//! - [`HttpClientStreaming`] - execution with a streaming response body
//!
//! Everything above the transport (auth, caching, retries) is layered on
//! top of these traits, so tests can swap in an in-memory implementation.

use std::future::Future;

use bytes::Bytes;

use crate::response::streaming::StreamingResponse;
use crate::{Request, Response, Result};

/// Core HTTP client trait.
///
/// Implementations must not turn non-2xx statuses into errors: every
/// completed exchange is returned as a [`Response`]. Errors are reserved for
/// failures below HTTP (connection, TLS, timeout).
pub trait HttpClient: Send + Sync {
    /// Execute an HTTP request and return the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange could not complete:
    /// - Network errors
    /// - TLS errors
    /// - Timeouts
    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send;
}

/// Streaming HTTP client trait.
pub trait HttpClientStreaming: HttpClient {
    /// Execute an HTTP request and return a streaming response.
    ///
    /// Unlike [`HttpClient::execute`], this method returns as soon as the
    /// status and headers arrive; the body yields chunks as they come in.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange could not start.
    fn execute_streaming(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<StreamingResponse>> + Send;
}

impl<T: HttpClient> HttpClient for std::sync::Arc<T> {
    fn execute(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<Response<Bytes>>> + Send {
        T::execute(self, request)
    }
}
