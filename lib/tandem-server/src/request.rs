//! Incoming request model.
//!
//! A server [`Request`] is decoupled from hyper: the [`serve`](crate::serve)
//! adapter buffers the body and fills in the parts, the router adds path
//! parameters, and middleware enrich the [`Context`] before the handler runs.

use std::collections::BTreeMap;
use std::time::Instant;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tandem_core::{Context, Error, Headers, Method, Result};

/// Path parameters captured by the router, keyed by parameter name.
pub type PathParams = BTreeMap<String, String>;

/// A query parameter value: a single string, or every value of a repeated key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryValue {
    /// `?name=value`
    Single(String),
    /// `?tag=a&tag=b`
    Multiple(Vec<String>),
}

impl QueryValue {
    /// First value.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::Single(value) => Some(value),
            Self::Multiple(values) => values.first().map(String::as_str),
        }
    }

    /// Every value, in order of appearance.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            Self::Single(value) => std::slice::from_ref(value),
            Self::Multiple(values) => values,
        };
        values.iter().map(String::as_str)
    }

    fn push(&mut self, value: String) {
        match self {
            Self::Single(first) => *self = Self::Multiple(vec![std::mem::take(first), value]),
            Self::Multiple(values) => values.push(value),
        }
    }
}

/// Decoded query string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParams(BTreeMap<String, QueryValue>);

impl QueryParams {
    /// Empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an `application/x-www-form-urlencoded` query string (without `?`).
    ///
    /// Repeated keys collect into [`QueryValue::Multiple`].
    pub fn parse(query: &str) -> Result<Self> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
            .map_err(|e| Error::invalid_request(format!("invalid query string: {e}")))?;
        Ok(pairs.into_iter().collect())
    }

    /// First value of `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(QueryValue::first)
    }

    /// Every value of `name`.
    pub fn get_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.0.get(name).into_iter().flat_map(QueryValue::iter)
    }

    /// Raw value of `name`.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&QueryValue> {
        self.0.get(name)
    }

    /// Add a value, turning the key into a list when it already exists.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.get_mut(&name) {
            Some(existing) => existing.push(value),
            None => {
                self.0.insert(name, QueryValue::Single(value));
            }
        }
    }

    /// Whether `name` is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the query is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over keys and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &QueryValue)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (name, value) in iter {
            params.append(name, value);
        }
        params
    }
}

/// Request payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    /// No payload.
    #[default]
    Empty,
    /// Raw bytes, either non-JSON or not yet parsed.
    Bytes(Bytes),
    /// Parsed JSON document.
    Json(Value),
}

impl Body {
    /// Whether there is no payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Bytes(bytes) => bytes.is_empty(),
            Self::Json(_) => false,
        }
    }

    /// Parsed JSON, if the body holds one.
    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Raw bytes, if the body holds unparsed data.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            Self::Empty
        } else {
            Self::Bytes(bytes)
        }
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// An incoming HTTP request.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use tandem_core::Method;
/// use tandem_server::Request;
///
/// let request = Request::new(Method::Post, "/users?notify=true")
///     .with_header("Content-Type", "application/json")
///     .with_json(json!({"name": "Ada"}));
///
/// assert_eq!(request.path(), "/users");
/// assert_eq!(request.query().get("notify"), Some("true"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    headers: Headers,
    query: QueryParams,
    path_params: PathParams,
    body: Body,
    context: Context,
    received_at: Instant,
}

impl Request {
    /// Create a request for `target`, a path with an optional query string.
    ///
    /// A query string that cannot be decoded is ignored; use
    /// [`with_query`](Self::with_query) to set parameters explicitly.
    #[must_use]
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, QueryParams::parse(query).unwrap_or_default()),
            None => (target, QueryParams::new()),
        };
        Self {
            method,
            path: if path.is_empty() { "/".to_owned() } else { path.to_owned() },
            headers: Headers::new(),
            query,
            path_params: PathParams::new(),
            body: Body::Empty,
            context: Context::new(),
            received_at: Instant::now(),
        }
    }

    /// Set a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Replace every header.
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Add a query parameter.
    #[must_use]
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.append(name, value);
        self
    }

    /// Replace every query parameter.
    #[must_use]
    pub fn with_query_params(mut self, query: QueryParams) -> Self {
        self.query = query;
        self
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body.
    #[must_use]
    pub fn with_json(self, value: impl Into<Value>) -> Self {
        self.with_body(Body::Json(value.into()))
    }

    /// Store a context value.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key, value);
        self
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Request path, without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable request headers.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// First value of a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Query parameters.
    #[must_use]
    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    /// Path parameters captured by the router.
    #[must_use]
    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    /// A single path parameter.
    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    pub(crate) fn set_path_params(&mut self, params: PathParams) {
        self.path_params = params;
    }

    /// Request body.
    #[must_use]
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Replace the body.
    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.body = body.into();
    }

    /// Take the body, leaving [`Body::Empty`].
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    /// Deserialize the body as JSON.
    ///
    /// Works on parsed bodies as well as raw bytes.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        match &self.body {
            Body::Json(value) => {
                T::deserialize(value).map_err(|e| Error::validation(e.to_string()))
            }
            Body::Bytes(bytes) => tandem_core::from_json(bytes),
            Body::Empty => Err(Error::Validation {
                status: 400,
                message: "request body is empty".to_owned(),
                body: None,
            }),
        }
    }

    /// Request-scoped context.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Mutable request-scoped context.
    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    /// When the request was received.
    #[must_use]
    pub const fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Snapshot of everything but the body, for response phases.
    #[must_use]
    pub fn head(&self) -> RequestHead {
        RequestHead {
            method: self.method,
            path: self.path.clone(),
            headers: self.headers.clone(),
            path_params: self.path_params.clone(),
            context: self.context.clone(),
            received_at: self.received_at,
        }
    }
}

/// The parts of a request that outlive the handler call.
///
/// Response phases receive the head as it was when the request phase chain
/// finished (or short-circuited).
#[derive(Debug, Clone)]
pub struct RequestHead {
    method: Method,
    path: String,
    headers: Headers,
    path_params: PathParams,
    context: Context,
    received_at: Instant,
}

impl RequestHead {
    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// First value of a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Path parameters, empty when no route matched.
    #[must_use]
    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    /// Context as seen by the last request phase.
    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// When the request was received.
    #[must_use]
    pub const fn received_at(&self) -> Instant {
        self.received_at
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn target_is_split_into_path_and_query() {
        let request = Request::new(Method::Get, "/users?name=jo&tag=a&tag=b");

        assert_eq!(request.path(), "/users");
        assert_eq!(request.query().get("name"), Some("jo"));
        assert_eq!(request.query().get_all("tag").collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(
            request.query().value("tag"),
            Some(&QueryValue::Multiple(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn empty_target_is_root() {
        assert_eq!(Request::new(Method::Get, "").path(), "/");
        assert_eq!(Request::new(Method::Get, "?x=1").path(), "/");
    }

    #[test]
    fn query_serializes_as_string_or_list() {
        let query: QueryParams = [("a", "1"), ("b", "2"), ("b", "3")].into_iter().collect();
        let value = serde_json::to_value(&query).expect("serialize");
        assert_eq!(value, json!({"a": "1", "b": ["2", "3"]}));
    }

    #[test]
    fn json_reads_parsed_and_raw_bodies() {
        #[derive(Deserialize)]
        struct User {
            name: String,
        }

        let parsed = Request::new(Method::Post, "/").with_json(json!({"name": "Ada"}));
        assert_eq!(parsed.json::<User>().expect("json").name, "Ada");

        let raw =
            Request::new(Method::Post, "/").with_body(Bytes::from_static(br#"{"name":"Bob"}"#));
        assert_eq!(raw.json::<User>().expect("json").name, "Bob");

        let empty = Request::new(Method::Post, "/");
        assert_eq!(empty.json::<User>().err().and_then(|e| e.status()), Some(400));
    }

    #[test]
    fn empty_bytes_become_empty_body() {
        assert_eq!(Body::from(Bytes::new()), Body::Empty);
        assert!(Body::from(Bytes::from_static(b"x")).as_bytes().is_some());
    }
}
