//! Minimal API server built on the tandem core types.
//!
//! - [`Api`] - routes plus global middleware, dispatching [`Request`]s
//! - [`Route`] and [`PathPattern`] - `{name}` path patterns, 405-over-404 matching
//! - [`Middleware`] - two-phase interceptors, with [`LogRequest`],
//!   [`RequireAuth`], [`ValidateJson`], [`Cors`] and [`ApiKeyAuthenticator`]
//!   built in
//! - [`schema`] - JSON Schema subset validation
//! - [`generate_openapi`] - OpenAPI 3.0.3 export
//! - [`serve`] - hyper adapter with graceful shutdown
//!
//! # Example
//!
//! ```no_run
//! use serde_json::json;
//! use tandem_server::{Api, LogRequest, Request, serve};
//!
//! async fn hello(request: Request) -> serde_json::Value {
//!     json!({"hello": request.query().get("name").unwrap_or("world")})
//! }
//!
//! # async fn run() -> tandem_core::Result<()> {
//! let mut api = Api::new("Hello API", "1.0.0");
//! api.add_middleware(LogRequest::new())
//!     .get("/hello", hello)
//!     .with_openapi_route("/openapi.json");
//!
//! serve(api, "127.0.0.1:8000".parse().expect("address")).await
//! # }
//! ```

mod api;
mod handler;
pub mod middleware;
pub mod openapi;
mod request;
mod router;
pub mod schema;
mod server;

pub use api::Api;
pub use handler::{BoxedHandler, ErasedHandler, Handler, IntoResponse};
pub use middleware::{
    ApiKeyAuthenticator, Cors, CorsConfig, LogRequest, Middleware, RequireAuth, ValidateJson,
};
pub use openapi::generate_openapi;
pub use request::{Body, PathParams, QueryParams, QueryValue, Request, RequestHead};
pub use router::{PathPattern, Route, RouteMatch, find_route};
pub use server::{MAX_BODY_SIZE, SHUTDOWN_GRACE, serve, serve_with_shutdown, shutdown_signal};
pub use tandem_core::{Context, Error, Headers, Method, Response, Result};
