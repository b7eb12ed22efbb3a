//! Core types and traits shared by the tandem HTTP client and server.
//!
//! - [`Method`] - HTTP method enum
//! - [`Headers`] - ordered, case-insensitive header multi-map
//! - [`Context`] - request-scoped key/value store for middleware and handlers
//! - [`Request`] and [`RequestBuilder`] - outgoing HTTP requests
//! - [`Response`] and [`StreamingResponse`] - HTTP responses
//! - [`Error`] and [`Result`] - error taxonomy
//! - [`HttpClient`] and [`HttpClientStreaming`] - transport traits
//! - [`StatusCode`] - HTTP status codes (re-exported from `http` crate)
//! - [`header`] - HTTP header names (re-exported from `http` crate)

mod body;
mod client;
mod context;
mod error;
mod headers;
mod method;
pub mod prelude;
mod request;
mod response;

pub use body::{ContentType, from_json, to_form, to_json};
pub use client::{HttpClient, HttpClientStreaming};
pub use context::Context;
pub use error::{Error, Result};
pub use headers::Headers;
pub use method::Method;
pub use request::{Request, RequestBuilder};
pub use response::streaming::{StreamingBody, StreamingResponse};
pub use response::{Response, parse_retry_after};

// Re-export http crate types for status codes and headers
pub use http::{StatusCode, header};
