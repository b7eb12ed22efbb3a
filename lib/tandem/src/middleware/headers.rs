//! Default headers middleware.

use std::task::{Context, Poll};

use bytes::Bytes;
use tower::{Layer, Service};

use crate::{Error, Headers, Request, Response, Result};

/// Layer that adds headers to requests that do not already carry them.
///
/// # Example
///
/// ```ignore
/// use tandem::middleware::HeadersLayer;
///
/// let layer = HeadersLayer::new([("Accept", "application/json"), ("X-Client", "tandem")]);
/// ```
#[derive(Debug, Clone, Default)]
pub struct HeadersLayer {
    headers: Headers,
}

impl HeadersLayer {
    /// Create a layer from name/value pairs.
    #[must_use]
    pub fn new<K, V>(headers: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut defaults = Headers::new();
        for (name, value) in headers {
            defaults.insert(name, value);
        }
        Self { headers: defaults }
    }
}

impl<S> Layer<S> for HeadersLayer {
    type Service = DefaultHeaders<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DefaultHeaders {
            inner,
            headers: self.headers.clone(),
        }
    }
}

/// Service that fills in default headers.
#[derive(Debug, Clone)]
pub struct DefaultHeaders<S> {
    inner: S,
    headers: Headers,
}

impl<S> Service<Request<Bytes>> for DefaultHeaders<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error>,
{
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Bytes>) -> Self::Future {
        let headers = request.headers_mut();
        for (name, value) in self.headers.iter() {
            headers.insert_if_absent(name, value);
        }
        self.inner.call(request)
    }
}
