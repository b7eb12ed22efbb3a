//! Async HTTP API client for Rust.
//!
//! Build a [`HyperClient`] with tower middleware (logging, retry, timing,
//! compression, rate limiting, auth), then wrap it in an [`ApiClient`] bound
//! to a base URL with optional authentication and response caching.
//!
//! # Example
//!
//! ```ignore
//! use tandem::prelude::*;
//! use tandem::auth::ApiKeyAuth;
//! use tandem::cache::MemoryCache;
//!
//! #[derive(Debug, Deserialize)]
//! pub struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! let http = HyperClient::builder()
//!     .with_retry(3)
//!     .with_timing()
//!     .build();
//!
//! let client = ApiClient::new(http, "https://api.example.com/v1")?
//!     .with_auth(ApiKeyAuth::new("secret"))
//!     .with_cache(MemoryCache::with_max_size(100));
//!
//! let users: Vec<User> = client
//!     .get("/users", RequestOptions::new())
//!     .await?
//!     .error_for_status()?
//!     .json()?;
//! ```

mod api_client;
pub mod auth;
pub mod cache;
mod client;
mod config;
mod connector;
pub mod middleware;
pub mod prelude;

// Re-export client types
pub use api_client::{ApiClient, RequestOptions, create_client, create_client_with_config};
pub use client::{BoxedService, HyperClient, HyperClientBuilder, ServiceFuture};
pub use config::{ClientConfig, ClientConfigBuilder};

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use tandem_core::{
    ContentType, Context, Error, Headers, HttpClient, HttpClientStreaming, Method, Request,
    RequestBuilder, Response, Result, StreamingBody, StreamingResponse, from_json,
    parse_retry_after, to_form, to_json,
};

// Re-export http types for status codes and headers
pub use tandem_core::{StatusCode, header};

pub use url;
