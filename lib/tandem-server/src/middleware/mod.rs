//! Server middleware.
//!
//! A [`Middleware`] has two phases. The request phase may mutate the request
//! or answer it directly; the response phase may rewrite the response on the
//! way back. For a chain `[a, b, c]` the order is:
//!
//! ```text
//! a.on_request → b.on_request → c.on_request → handler
//!                                                 ↓
//! a.on_response ← b.on_response ← c.on_response ←─┘
//! ```
//!
//! When `b` short-circuits, `c` and the handler are skipped and only
//! `a.on_response` runs.

mod auth;
mod cors;
mod log;
mod validate;

use std::fmt;

use futures_util::future::BoxFuture;
use tandem_core::Response;

pub use self::auth::{ApiKeyAuthenticator, RequireAuth, USER_KEY};
pub use self::cors::{Cors, CorsConfig};
pub use self::log::LogRequest;
pub use self::validate::ValidateJson;
use crate::request::{Request, RequestHead};

/// Two-phase request/response interceptor.
pub trait Middleware: Send + Sync + 'static {
    /// Inspect or mutate the request. Returning `Some` answers the request
    /// and skips everything downstream.
    fn on_request<'a>(&'a self, request: &'a mut Request) -> BoxFuture<'a, Option<Response>>;

    /// Inspect or rewrite the response.
    ///
    /// Only called when [`on_request`](Self::on_request) passed the request on.
    fn on_response<'a>(
        &'a self,
        request: &'a RequestHead,
        response: Response,
    ) -> BoxFuture<'a, Response> {
        let _ = request;
        Box::pin(async move { response })
    }
}

/// Middleware from a synchronous request-phase closure.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use tandem_server::{Request, middleware};
///
/// let tag_beta = middleware::from_fn(|request: &mut Request| {
///     if request.header("X-Beta").is_some() {
///         request.context_mut().insert("beta", true);
///     }
///     None
/// });
/// # let _ = tag_beta;
/// ```
pub fn from_fn<F>(f: F) -> FnMiddleware<F>
where
    F: Fn(&mut Request) -> Option<Response> + Send + Sync + 'static,
{
    FnMiddleware(f)
}

/// See [`from_fn`].
pub struct FnMiddleware<F>(F);

impl<F> fmt::Debug for FnMiddleware<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnMiddleware").finish_non_exhaustive()
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut Request) -> Option<Response> + Send + Sync + 'static,
{
    fn on_request<'a>(&'a self, request: &'a mut Request) -> BoxFuture<'a, Option<Response>> {
        let outcome = (self.0)(request);
        Box::pin(async move { outcome })
    }
}
