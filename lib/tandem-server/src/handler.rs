//! Handler trait and type erasure.
//!
//! Routes hold handlers of different concrete types in one list, so each
//! handler is erased behind [`ErasedHandler`] and shared as a
//! [`BoxedHandler`]:
//!
//! ```text
//! async fn get_user(req: Request) -> Response { … }   user code
//!        ↓ api.get("/users/{id}", get_user)
//! get_user.into_boxed_handler()                       Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(get_user))                       stored in the Route
//!        ↓
//! handler.call(req)                                   one virtual call
//! ```

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde_json::Value;
use tandem_core::{Error, Response};

use crate::request::Request;

/// Conversion of handler return values into a [`Response`].
pub trait IntoResponse {
    /// Build the response.
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response {
        self
    }
}

impl IntoResponse for Value {
    fn into_response(self) -> Response {
        Response::from_status(200).with_json(self)
    }
}

impl IntoResponse for String {
    fn into_response(self) -> Response {
        Response::from_status(200).with_text(self)
    }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response {
        Response::from_status(200).with_text(self)
    }
}

impl IntoResponse for Bytes {
    fn into_response(self) -> Response {
        Response::from_status(200)
            .with_header("Content-Type", "application/octet-stream")
            .with_body(self)
    }
}

impl IntoResponse for () {
    fn into_response(self) -> Response {
        Response::from_status(204)
    }
}

/// `(status, body)` overrides the status of `body`.
impl<T: IntoResponse> IntoResponse for (u16, T) {
    fn into_response(self) -> Response {
        let (status, body) = self;
        body.into_response().with_status(status)
    }
}

/// Errors become `{"error": …, "code": …}` with the matching status.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        Response::from_error(&self)
    }
}

impl<T, E> IntoResponse for Result<T, E>
where
    T: IntoResponse,
    E: IntoResponse,
{
    fn into_response(self) -> Response {
        match self {
            Ok(value) => value.into_response(),
            Err(error) => error.into_response(),
        }
    }
}

#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, request: Request) -> BoxFuture<'static, Response>;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route handler.
///
/// Satisfied by any `Fn(Request) -> impl Future<Output = impl IntoResponse>`,
/// which covers `async fn` items and closures returning `async move` blocks.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, request: Request) -> BoxFuture<'static, Response> {
        let fut = (self.0)(request);
        Box::pin(async move { fut.await.into_response() })
    }
}
