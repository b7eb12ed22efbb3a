//! Prelude module for convenient imports.
//!
//! ```ignore
//! use tandem_core::prelude::*;
//! ```

pub use crate::{
    ContentType, Context, Error, Headers, HttpClient, HttpClientStreaming, Method, Request,
    RequestBuilder, Response, Result, StreamingResponse, from_json, to_form, to_json,
};
