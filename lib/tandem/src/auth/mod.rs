//! Authentication providers.
//!
//! An [`AuthProvider`] turns an outgoing request into an authenticated one.
//! Providers are shared (`Arc<dyn AuthProvider>`) between the
//! [`ApiClient`](crate::ApiClient) and the [`AuthLayer`](crate::middleware::AuthLayer),
//! so refreshable credentials live behind interior mutability.
//!
//! | Provider | Credential |
//! |----------|------------|
//! | [`ApiKeyAuth`] | API key in a header or query parameter |
//! | [`BearerAuth`] | static or refreshable bearer token |
//! | [`BasicAuth`] | username and password |
//! | [`OAuth2Auth`] | client-credentials token with single-flight refresh |

use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;

use crate::{Request, Result};

mod api_key;
mod basic;
mod bearer;
mod oauth2;

pub use api_key::{ApiKeyAuth, ApiKeyLocation};
pub use basic::BasicAuth;
pub use bearer::{BearerAuth, TokenSource};
pub use oauth2::{OAuth2Auth, OAuth2Config, TokenResponse};

/// Attaches credentials to outgoing requests.
pub trait AuthProvider: Send + Sync {
    /// Return the request with credentials applied.
    ///
    /// # Errors
    ///
    /// Returns an error if credentials could not be obtained.
    fn apply(&self, request: Request<Bytes>) -> BoxFuture<'_, Result<Request<Bytes>>>;

    /// Called after the server rejected `request` with 401.
    ///
    /// Returns `true` when fresh credentials are available and resending
    /// the request once is worthwhile.
    ///
    /// # Errors
    ///
    /// Returns an error if refreshing the credentials failed.
    fn invalidate<'a>(&'a self, request: &'a Request<Bytes>) -> BoxFuture<'a, Result<bool>> {
        let _ = request;
        Box::pin(async { Ok(false) })
    }
}

impl<P: AuthProvider + ?Sized> AuthProvider for Arc<P> {
    fn apply(&self, request: Request<Bytes>) -> BoxFuture<'_, Result<Request<Bytes>>> {
        (**self).apply(request)
    }

    fn invalidate<'a>(&'a self, request: &'a Request<Bytes>) -> BoxFuture<'a, Result<bool>> {
        (**self).invalidate(request)
    }
}

/// Token carried by an `Authorization: Bearer` header, if any.
pub(crate) fn bearer_token(request: &Request<Bytes>) -> Option<&str> {
    request
        .header("authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
}
