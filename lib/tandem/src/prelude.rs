//! Prelude module for convenient imports.
//!
//! ```ignore
//! use tandem::prelude::*;
//! ```

pub use crate::auth::AuthProvider;
pub use crate::cache::Cache;
pub use crate::{
    ApiClient, ClientConfig, ContentType, Error, HttpClient, HyperClient, Method, Request,
    RequestBuilder, RequestOptions, Response, Result, StatusCode, create_client, from_json,
    header, to_form, to_json,
};
pub use serde::{Deserialize, Serialize};
