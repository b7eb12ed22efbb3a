//! HTTP response handling.
//!
//! [`Response`] provides access to status, headers, and body with JSON/text
//! deserialization, plus a consuming builder used by server handlers:
//!
//! ```
//! use tandem_core::Response;
//! use serde_json::json;
//!
//! let response = Response::from_status(201)
//!     .with_header("Location", "/users/3")
//!     .with_json(json!({"id": "3"}));
//!
//! assert_eq!(response.status(), 201);
//! assert_eq!(response.header("content-type"), Some("application/json"));
//! ```
//!
//! For large payloads see [`streaming::StreamingResponse`].

use std::time::Duration;

use bytes::Bytes;

use crate::{ContentType, Error, Headers, Result};

// ============================================================================
// Streaming Response
// ============================================================================

/// Streaming response support.
pub mod streaming {
    use std::pin::Pin;

    use bytes::Bytes;
    use futures_core::Stream;
    use futures_util::{StreamExt, stream};

    use crate::Headers;

    /// A streaming body: chunks of bytes arriving over time.
    pub type StreamingBody = Pin<Box<dyn Stream<Item = crate::Result<Bytes>> + Send>>;

    /// HTTP response with streaming body, for large payloads.
    ///
    /// The response owns the underlying connection through its body stream:
    /// dropping it (after full iteration, an early `break`, or an error)
    /// releases the connection.
    pub struct StreamingResponse {
        status: u16,
        headers: Headers,
        body: StreamingBody,
    }

    impl std::fmt::Debug for StreamingResponse {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("StreamingResponse")
                .field("status", &self.status)
                .field("headers", &self.headers)
                .finish_non_exhaustive()
        }
    }

    impl StreamingResponse {
        /// Creates a new streaming response.
        #[must_use]
        pub fn new(status: u16, headers: Headers, body: StreamingBody) -> Self {
            Self {
                status,
                headers,
                body,
            }
        }

        /// HTTP status code.
        #[must_use]
        pub const fn status(&self) -> u16 {
            self.status
        }

        /// Response headers.
        #[must_use]
        pub fn headers(&self) -> &Headers {
            &self.headers
        }

        /// Single header value by name.
        #[must_use]
        pub fn header(&self, name: &str) -> Option<&str> {
            self.headers.get(name)
        }

        /// Status is 2xx.
        #[must_use]
        pub const fn is_success(&self) -> bool {
            self.status >= 200 && self.status < 300
        }

        /// Status is 4xx.
        #[must_use]
        pub const fn is_client_error(&self) -> bool {
            self.status >= 400 && self.status < 500
        }

        /// Status is 5xx.
        #[must_use]
        pub const fn is_server_error(&self) -> bool {
            self.status >= 500 && self.status < 600
        }

        /// Bound the whole stream by `deadline`.
        ///
        /// When the deadline passes the stream yields one [`crate::Error::Timeout`]
        /// and ends, dropping the underlying body.
        #[must_use]
        pub fn with_deadline(self, deadline: tokio::time::Instant) -> Self {
            let Self {
                status,
                headers,
                body,
            } = self;

            let bounded = stream::unfold(Some(body), move |state| async move {
                let mut body = state?;
                match tokio::time::timeout_at(deadline, body.next()).await {
                    Ok(Some(item)) => Some((item, Some(body))),
                    Ok(None) => None,
                    Err(_) => Some((Err(crate::Error::Timeout), None)),
                }
            });

            Self {
                status,
                headers,
                body: Box::pin(bounded),
            }
        }

        /// Consume into the streaming body.
        #[must_use]
        pub fn into_body(self) -> StreamingBody {
            self.body
        }

        /// Consume into a stream of text lines (without line terminators).
        ///
        /// Invalid UTF-8 is replaced, a trailing line without `\n` is still yielded.
        pub fn lines(self) -> impl Stream<Item = crate::Result<String>> + Send {
            stream::unfold(
                (self.body, Vec::<u8>::new(), false),
                |(mut body, mut buffer, mut done)| async move {
                    loop {
                        if let Some(position) = buffer.iter().position(|byte| *byte == b'\n') {
                            let line: Vec<u8> = buffer.drain(..=position).collect();
                            let text = String::from_utf8_lossy(&line)
                                .trim_end_matches(['\r', '\n'])
                                .to_string();
                            return Some((Ok(text), (body, buffer, done)));
                        }
                        if done {
                            if buffer.is_empty() {
                                return None;
                            }
                            let text = String::from_utf8_lossy(&buffer).into_owned();
                            buffer.clear();
                            return Some((Ok(text), (body, buffer, done)));
                        }
                        match body.next().await {
                            Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                            Some(Err(err)) => return Some((Err(err), (body, Vec::new(), true))),
                            None => done = true,
                        }
                    }
                },
            )
        }

        /// Buffer the entire stream into a [`Response`](super::Response).
        ///
        /// # Errors
        ///
        /// Returns an error if reading any chunk fails.
        pub async fn collect(self) -> crate::Result<super::Response<Bytes>> {
            let mut body = self.body;
            let mut collected = Vec::new();

            while let Some(chunk) = body.next().await {
                collected.extend_from_slice(&chunk?);
            }

            Ok(super::Response::new(
                self.status,
                self.headers,
                Bytes::from(collected),
            ))
        }
    }
}

// ============================================================================
// Buffered Response
// ============================================================================

/// HTTP response with status, headers, and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response<B = Bytes> {
    status: u16,
    headers: Headers,
    body: B,
}

impl<B> Response<B> {
    /// Creates a new response.
    #[must_use]
    pub fn new(status: u16, headers: Headers, body: B) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Single header value by name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Response body.
    #[must_use]
    pub const fn body(&self) -> &B {
        &self.body
    }

    /// Consume into body.
    #[must_use]
    pub fn into_body(self) -> B {
        self.body
    }

    /// Consume into (status, headers, body).
    #[must_use]
    pub fn into_parts(self) -> (u16, Headers, B) {
        (self.status, self.headers, self.body)
    }

    /// Status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Status is 3xx.
    #[must_use]
    pub const fn is_redirection(&self) -> bool {
        self.status >= 300 && self.status < 400
    }

    /// Status is 4xx.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.status >= 400 && self.status < 500
    }

    /// Status is 5xx.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        self.status >= 500 && self.status < 600
    }

    /// Delay requested by a `Retry-After` header, if present and valid.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("retry-after").and_then(parse_retry_after)
    }

    /// Transform the body with a function.
    pub fn map_body<F, B2>(self, f: F) -> Response<B2>
    where
        F: FnOnce(B) -> B2,
    {
        Response {
            status: self.status,
            headers: self.headers,
            body: f(self.body),
        }
    }
}

impl Response<Bytes> {
    /// Empty response with the given status.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        Self::new(status, Headers::new(), Bytes::new())
    }

    /// Structured error response: `{"error": <message>, "code": <tag>}`.
    #[must_use]
    pub fn from_error(error: &Error) -> Self {
        let status = error.status().unwrap_or(match error {
            Error::Timeout => 504,
            Error::Connection(_) | Error::Tls(_) => 502,
            Error::Cache(_) => 500,
            _ => 400,
        });
        let mut response = Self::from_status(status).with_json(serde_json::json!({
            "error": error.message(),
            "code": error.code(),
        }));
        if let Error::RateLimit {
            retry_after: Some(delay),
            ..
        } = error
        {
            response = response.with_header("Retry-After", delay.as_secs().to_string());
        }
        response
    }

    /// Replace the status code.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set a header, replacing previous values.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replace the body with raw bytes.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Replace the body with plain text.
    #[must_use]
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_header("Content-Type", ContentType::Text.as_str())
            .with_body(text.into())
    }

    /// Replace the body with a JSON document.
    #[must_use]
    pub fn with_json(self, value: impl Into<serde_json::Value>) -> Self {
        let value: serde_json::Value = value.into();
        self.with_header("Content-Type", ContentType::Json.as_str())
            .with_body(value.to_string())
    }

    /// Replace the body with any serializable value as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn try_with_json<T: serde::Serialize>(self, value: &T) -> Result<Self> {
        let body = crate::to_json(value)?;
        Ok(self
            .with_header("Content-Type", ContentType::Json.as_str())
            .with_body(body))
    }

    /// Deserialize the response body as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn json<T: serde::de::DeserializeOwned>(self) -> Result<T> {
        crate::from_json(&self.body)
    }

    /// Get the response body as text.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid UTF-8.
    pub fn text(self) -> std::result::Result<String, std::string::FromUtf8Error> {
        String::from_utf8(self.body.to_vec())
    }

    /// Turn a non-2xx response into the matching [`Error`].
    ///
    /// The low-level client never does this on its own; call it when the
    /// caller wants failures as errors.
    ///
    /// # Errors
    ///
    /// Returns the classified error for any status outside 200..300.
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            return Ok(self);
        }
        let retry_after = self.retry_after();
        Err(Error::from_status(self.status, Some(self.body)).with_retry_after(retry_after))
    }

    /// Like [`Response::error_for_status`] without consuming the response.
    ///
    /// # Errors
    ///
    /// Returns the classified error for any status outside 200..300.
    pub fn error_for_status_ref(&self) -> Result<&Self> {
        if self.is_success() {
            return Ok(self);
        }
        Err(Error::from_status(self.status, Some(self.body.clone()))
            .with_retry_after(self.retry_after()))
    }
}

/// Parse a `Retry-After` value: delay seconds or an HTTP date.
///
/// Dates in the past yield a zero delay.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}
