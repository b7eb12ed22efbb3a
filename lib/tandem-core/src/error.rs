//! Error taxonomy shared by the client and the server.
//!
//! HTTP failures are classified by status class ([`Error::from_status`]);
//! transport failures ([`Error::Connection`], [`Error::Tls`]) and deadlines
//! ([`Error::Timeout`]) are kept apart so callers can decide what to retry.

use std::time::Duration;

use bytes::Bytes;
use derive_more::{Display, Error, From};

/// Main error type for tandem operations.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// Missing or invalid credentials (401).
    #[display("authentication error: {message}")]
    #[from(skip)]
    Authentication {
        /// Error message.
        message: String,
        /// Response body, if available.
        #[error(not(source))]
        body: Option<Bytes>,
    },

    /// Valid credentials without the required privilege (403).
    #[display("authorization error: {message}")]
    #[from(skip)]
    Authorization {
        /// Error message.
        message: String,
        /// Response body, if available.
        #[error(not(source))]
        body: Option<Bytes>,
    },

    /// The request payload was rejected (400 or 422).
    #[display("validation error {status}: {message}")]
    #[from(skip)]
    Validation {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
        /// Response body, if available.
        #[error(not(source))]
        body: Option<Bytes>,
    },

    /// The resource does not exist (404).
    #[display("resource not found: {message}")]
    #[from(skip)]
    ResourceNotFound {
        /// Error message.
        message: String,
        /// Response body, if available.
        #[error(not(source))]
        body: Option<Bytes>,
    },

    /// A local or remote rate limit was exceeded (429).
    #[display("rate limit exceeded: {message}")]
    #[from(skip)]
    RateLimit {
        /// Error message.
        message: String,
        /// Delay requested by the server, if any.
        #[error(not(source))]
        retry_after: Option<Duration>,
        /// Response body, if available.
        #[error(not(source))]
        body: Option<Bytes>,
    },

    /// The remote server failed (5xx).
    #[display("server error {status}: {message}")]
    #[from(skip)]
    Server {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
        /// Response body, if available.
        #[error(not(source))]
        body: Option<Bytes>,
    },

    /// Any other non-2xx status.
    #[display("HTTP error {status}: {message}")]
    #[from(skip)]
    Http {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
        /// Response body, if available.
        #[error(not(source))]
        body: Option<Bytes>,
    },

    /// Network/connection errors.
    #[display("connection error: {_0}")]
    #[from(skip)]
    Connection(#[error(not(source))] String),

    /// TLS/SSL errors.
    #[display("TLS error: {_0}")]
    #[from(skip)]
    Tls(#[error(not(source))] String),

    /// The deadline elapsed before the exchange completed.
    #[display("request timeout")]
    #[from(skip)]
    Timeout,

    /// Invalid request configuration.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// Cache backend failure (only surfaced in strict cache mode).
    #[display("cache error: {_0}")]
    #[from(skip)]
    Cache(#[error(not(source))] String),

    /// JSON serialization error.
    #[display("JSON serialization error: {_0}")]
    #[from]
    JsonSerialization(serde_json::Error),

    /// JSON deserialization error with path context.
    #[display("JSON deserialization error at '{path}': {message}")]
    #[from(skip)]
    JsonDeserialization {
        /// JSON path to the error (e.g., "user.address.city").
        path: String,
        /// Error message.
        message: String,
    },

    /// Form URL-encoded serialization error.
    #[display("form serialization error: {_0}")]
    #[from]
    FormSerialization(serde_urlencoded::ser::Error),

    /// Query string serialization error.
    #[display("query serialization error: {_0}")]
    #[from]
    QuerySerialization(serde_html_form::ser::Error),

    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Classify a non-2xx status into the taxonomy.
    ///
    /// The message is taken from the `error`, `message` or `detail` field of a
    /// JSON body when present, otherwise from the canonical reason phrase.
    #[must_use]
    pub fn from_status(status: u16, body: Option<Bytes>) -> Self {
        let message = body
            .as_deref()
            .and_then(message_from_body)
            .unwrap_or_else(|| reason_phrase(status));

        match status {
            401 => Self::Authentication { message, body },
            403 => Self::Authorization { message, body },
            400 | 422 => Self::Validation {
                status,
                message,
                body,
            },
            404 => Self::ResourceNotFound { message, body },
            429 => Self::RateLimit {
                message,
                retry_after: None,
                body,
            },
            500..=599 => Self::Server {
                status,
                message,
                body,
            },
            _ => Self::Http {
                status,
                message,
                body,
            },
        }
    }

    /// Create an HTTP error from status code and message.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body: None,
        }
    }

    /// Create an authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
            body: None,
        }
    }

    /// Create an authorization error.
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
            body: None,
        }
    }

    /// Create a validation error (422).
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            status: 422,
            message: message.into(),
            body: None,
        }
    }

    /// Create a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::ResourceNotFound {
            message: message.into(),
            body: None,
        }
    }

    /// Create a rate limit error.
    #[must_use]
    pub fn rate_limit(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimit {
            message: message.into(),
            retry_after,
            body: None,
        }
    }

    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a cache error.
    #[must_use]
    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache(message.into())
    }

    /// Create a JSON deserialization error with path context.
    #[must_use]
    pub fn json_deserialization(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Attach the server-provided `Retry-After` delay to a rate limit error.
    #[must_use]
    pub fn with_retry_after(self, delay: Option<Duration>) -> Self {
        match self {
            Self::RateLimit { message, body, .. } => Self::RateLimit {
                message,
                retry_after: delay,
                body,
            },
            other => other,
        }
    }

    /// Machine-readable taxonomy tag.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Authentication { .. } => "authentication_error",
            Self::Authorization { .. } => "authorization_error",
            Self::Validation { .. } => "validation_error",
            Self::ResourceNotFound { .. } => "not_found",
            Self::RateLimit { .. } => "rate_limit_exceeded",
            Self::Server { .. } => "server_error",
            Self::Http { .. } => "http_error",
            Self::Connection(_) | Self::Tls(_) => "transport_error",
            Self::Timeout => "timeout",
            Self::InvalidRequest(_) | Self::InvalidUrl(_) => "invalid_request",
            Self::Cache(_) => "cache_error",
            Self::JsonSerialization(_)
            | Self::JsonDeserialization { .. }
            | Self::FormSerialization(_)
            | Self::QuerySerialization(_) => "serialization_error",
        }
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns `true` if this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Returns `true` for failures below HTTP (connection or TLS).
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Tls(_))
    }

    /// Returns the HTTP status code associated with this error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { .. } => Some(401),
            Self::Authorization { .. } => Some(403),
            Self::ResourceNotFound { .. } => Some(404),
            Self::RateLimit { .. } => Some(429),
            Self::Validation { status, .. }
            | Self::Server { status, .. }
            | Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns `true` if this is a client error (4xx).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_some_and(|s| (400..500).contains(&s))
    }

    /// Returns `true` if this is a server error (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| (500..600).contains(&s))
    }

    /// Returns `true` if this is a 404 Not Found error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Human message without the category prefix.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Authentication { message, .. }
            | Self::Authorization { message, .. }
            | Self::Validation { message, .. }
            | Self::ResourceNotFound { message, .. }
            | Self::RateLimit { message, .. }
            | Self::Server { message, .. }
            | Self::Http { message, .. }
            | Self::Connection(message)
            | Self::Tls(message)
            | Self::InvalidRequest(message)
            | Self::Cache(message) => message.clone(),
            other => other.to_string(),
        }
    }

    /// Returns the response body if this is an HTTP error with a body.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        match self {
            Self::Authentication { body, .. }
            | Self::Authorization { body, .. }
            | Self::Validation { body, .. }
            | Self::ResourceNotFound { body, .. }
            | Self::RateLimit { body, .. }
            | Self::Server { body, .. }
            | Self::Http { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    /// Try to decode the HTTP error body as JSON.
    ///
    /// Returns `None` if there is no body or this is not an HTTP error.
    pub fn decode_body<T: serde::de::DeserializeOwned>(&self) -> Option<Result<T>> {
        self.body().map(|body| crate::from_json(body))
    }
}

fn message_from_body(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    ["error", "message", "detail"]
        .into_iter()
        .find_map(|field| value.get(field)?.as_str().map(str::to_string))
}

fn reason_phrase(status: u16) -> String {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown Status")
        .to_string()
}
