//! Authentication middleware.
//!
//! Applies an [`AuthProvider`] to every request. When the server answers
//! 401 the provider is asked to invalidate the rejected credentials; if it
//! obtained fresh ones the original request is authenticated again and sent
//! once more.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::{Layer, Service, ServiceExt};
use tracing::debug;

use crate::auth::AuthProvider;
use crate::{Error, Request, Response, Result};

/// Layer that authenticates requests with a shared provider.
#[derive(Clone)]
pub struct AuthLayer {
    provider: Arc<dyn AuthProvider>,
}

impl fmt::Debug for AuthLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthLayer").finish_non_exhaustive()
    }
}

impl AuthLayer {
    /// Create a layer around `provider`.
    #[must_use]
    pub fn new(provider: impl AuthProvider + 'static) -> Self {
        Self {
            provider: Arc::new(provider),
        }
    }

    /// Create a layer sharing an existing provider.
    #[must_use]
    pub fn from_shared(provider: Arc<dyn AuthProvider>) -> Self {
        Self { provider }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = Auth<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Auth {
            inner,
            provider: Arc::clone(&self.provider),
        }
    }
}

/// Service that authenticates requests.
#[derive(Clone)]
pub struct Auth<S> {
    inner: S,
    provider: Arc<dyn AuthProvider>,
}

impl<S: fmt::Debug> fmt::Debug for Auth<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl<S> Service<Request<Bytes>> for Auth<S>
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
        let provider = Arc::clone(&self.provider);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let authenticated = provider.apply(request.clone()).await?;
            let rejected = authenticated.clone();
            let response = inner.call(authenticated).await?;
            if response.status() != 401 || !provider.invalidate(&rejected).await? {
                return Ok(response);
            }

            debug!(url = %request.url(), "credentials rejected, resending once");
            let authenticated = provider.apply(request).await?;
            inner.ready().await?.call(authenticated).await
        })
    }
}
