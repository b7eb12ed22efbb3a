//! Route registration and matching.
//!
//! Routes are scanned in registration order; the first route whose pattern
//! and method both match wins. A path that matches some route but none of
//! its methods yields 405 rather than 404.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use percent_encoding::percent_decode_str;
use serde_json::Value;
use tandem_core::{Error, Method, Result};

use crate::handler::{BoxedHandler, Handler};
use crate::middleware::Middleware;
use crate::request::PathParams;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A route pattern such as `/users/{id}/posts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.trim_matches('/').split('/').filter(|s| !s.is_empty())
}

impl PathPattern {
    /// Parse a pattern. `{name}` segments capture one path segment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for an empty parameter name (`{}`),
    /// unbalanced braces, braces mixed with literal text in one segment, or
    /// a parameter name used twice.
    pub fn parse(pattern: &str) -> Result<Self> {
        let mut segments = Vec::new();
        for segment in split(pattern) {
            let parsed = match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) if name.is_empty() => {
                    return Err(Error::invalid_request(format!(
                        "empty parameter name in route pattern '{pattern}'"
                    )));
                }
                Some(name) if !name.contains(['{', '}']) => {
                    if segments.contains(&Segment::Param(name.to_owned())) {
                        return Err(Error::invalid_request(format!(
                            "duplicate parameter '{name}' in route pattern '{pattern}'"
                        )));
                    }
                    Segment::Param(name.to_owned())
                }
                _ if segment.contains(['{', '}']) => {
                    return Err(Error::invalid_request(format!(
                        "malformed segment '{segment}' in route pattern '{pattern}'"
                    )));
                }
                _ => Segment::Literal(segment.to_owned()),
            };
            segments.push(parsed);
        }

        let raw = format!(
            "/{}",
            segments
                .iter()
                .map(|segment| match segment {
                    Segment::Literal(text) => text.clone(),
                    Segment::Param(name) => format!("{{{name}}}"),
                })
                .collect::<Vec<_>>()
                .join("/")
        );
        Ok(Self { raw, segments })
    }

    /// Normalized pattern text, always starting with `/` and without a
    /// trailing slash.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parameter names, in order.
    pub fn params(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match a request path, returning the decoded parameters.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<PathParams> {
        let mut params = PathParams::new();
        let mut parts = split(path);
        for segment in &self.segments {
            let part = parts.next()?;
            match segment {
                Segment::Literal(text) => {
                    if text != part {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = percent_decode_str(part).decode_utf8_lossy().into_owned();
                    params.insert(name.clone(), value);
                }
            }
        }
        parts.next().is_none().then_some(params)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A registered endpoint: pattern, methods, route middleware, handler and
/// documentation metadata.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use tandem_core::Method;
/// use tandem_server::{Request, RequireAuth, Route};
///
/// async fn delete_user(request: Request) -> serde_json::Value {
///     json!({"deleted": request.path_param("id")})
/// }
///
/// let route = Route::new("/users/{id}", [Method::Delete], delete_user)?
///     .middleware(RequireAuth::new().role("admin"))
///     .summary("Delete a user")
///     .tag("users");
/// # Ok::<(), tandem_core::Error>(())
/// ```
#[derive(Clone)]
pub struct Route {
    pattern: PathPattern,
    methods: Vec<Method>,
    middleware: Vec<Arc<dyn Middleware>>,
    handler: BoxedHandler,
    summary: Option<String>,
    description: Option<String>,
    tags: Vec<String>,
    request_schema: Option<Value>,
    response_schemas: BTreeMap<u16, Value>,
}

impl Route {
    /// Create a route.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] when the pattern is malformed or no
    /// method is given.
    pub fn new(
        pattern: &str,
        methods: impl IntoIterator<Item = Method>,
        handler: impl Handler,
    ) -> Result<Self> {
        let pattern = PathPattern::parse(pattern)?;
        let mut unique = Vec::new();
        for method in methods {
            if !unique.contains(&method) {
                unique.push(method);
            }
        }
        if unique.is_empty() {
            return Err(Error::invalid_request(format!(
                "route '{pattern}' has no method"
            )));
        }
        Ok(Self {
            pattern,
            methods: unique,
            middleware: Vec::new(),
            handler: handler.into_boxed_handler(),
            summary: None,
            description: None,
            tags: Vec::new(),
            request_schema: None,
            response_schemas: BTreeMap::new(),
        })
    }

    /// Append route-scoped middleware, run after the global chain.
    #[must_use]
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// One-line summary for the API document.
    #[must_use]
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    /// Longer description for the API document.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a grouping tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Document the JSON request body.
    #[must_use]
    pub fn request_schema(mut self, schema: Value) -> Self {
        self.request_schema = Some(schema);
        self
    }

    /// Document the JSON response body for `status`.
    #[must_use]
    pub fn response_schema(mut self, status: u16, schema: Value) -> Self {
        self.response_schemas.insert(status, schema);
        self
    }

    /// Route pattern.
    #[must_use]
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    /// Accepted methods.
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Whether the route accepts `method`.
    #[must_use]
    pub fn allows(&self, method: Method) -> bool {
        self.methods.contains(&method)
    }

    /// Route-scoped middleware, in order.
    #[must_use]
    pub fn route_middleware(&self) -> &[Arc<dyn Middleware>] {
        &self.middleware
    }

    pub(crate) fn handler(&self) -> &BoxedHandler {
        &self.handler
    }

    /// Summary, if documented.
    #[must_use]
    pub fn summary_text(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Description, if documented.
    #[must_use]
    pub fn description_text(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Tags.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Request body schema, if documented.
    #[must_use]
    pub fn request_body_schema(&self) -> Option<&Value> {
        self.request_schema.as_ref()
    }

    /// Response schemas by status.
    #[must_use]
    pub fn response_schemas(&self) -> &BTreeMap<u16, Value> {
        &self.response_schemas
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern.as_str())
            .field("methods", &self.methods)
            .field("middleware", &self.middleware.len())
            .field("summary", &self.summary)
            .finish_non_exhaustive()
    }
}

/// Outcome of a route lookup.
#[derive(Debug)]
pub enum RouteMatch<'a> {
    /// A route accepts the path and method.
    Found(&'a Route, PathParams),
    /// Some routes accept the path, none the method.
    MethodNotAllowed(Vec<Method>),
    /// No route accepts the path.
    NotFound,
}

/// Find the route for `method` and `path` among `routes`.
#[must_use]
pub fn find_route<'a>(routes: &'a [Route], method: Method, path: &str) -> RouteMatch<'a> {
    let mut allowed = Vec::new();
    for route in routes {
        let Some(params) = route.pattern.matches(path) else {
            continue;
        };
        if route.allows(method) {
            return RouteMatch::Found(route, params);
        }
        for &method in &route.methods {
            if !allowed.contains(&method) {
                allowed.push(method);
            }
        }
    }

    if allowed.is_empty() {
        RouteMatch::NotFound
    } else {
        RouteMatch::MethodNotAllowed(allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;

    async fn ok(_: Request) -> &'static str {
        "ok"
    }

    fn route(pattern: &str, methods: &[Method]) -> Route {
        Route::new(pattern, methods.iter().copied(), ok).expect("valid route")
    }

    #[test]
    fn pattern_normalization() {
        assert_eq!(PathPattern::parse("users/{id}/").expect("parse").as_str(), "/users/{id}");
        assert_eq!(PathPattern::parse("/").expect("parse").as_str(), "/");
    }

    #[test]
    fn malformed_patterns_are_rejected() {
        for pattern in ["/users/{}", "/users/{id", "/users/id}", "/a{b}", "/{id}/{id}"] {
            let err = PathPattern::parse(pattern).expect_err(pattern);
            assert_eq!(err.code(), "invalid_request", "{pattern}");
        }
    }

    #[test]
    fn params_are_captured_and_decoded() {
        let pattern = PathPattern::parse("/files/{dir}/{name}").expect("parse");
        let params = pattern.matches("/files/my%20docs/a.txt").expect("match");

        assert_eq!(params.get("dir").map(String::as_str), Some("my docs"));
        assert_eq!(params.get("name").map(String::as_str), Some("a.txt"));
        assert_eq!(pattern.params().collect::<Vec<_>>(), ["dir", "name"]);
    }

    #[test]
    fn trailing_slash_is_insignificant() {
        let pattern = PathPattern::parse("/users").expect("parse");
        assert!(pattern.matches("/users/").is_some());
        assert!(pattern.matches("/users").is_some());
    }

    #[test]
    fn segment_counts_must_agree() {
        let pattern = PathPattern::parse("/users/{id}").expect("parse");
        assert!(pattern.matches("/users").is_none());
        assert!(pattern.matches("/users/1/posts").is_none());
        assert!(pattern.matches("/accounts/1").is_none());
    }

    #[test]
    fn first_registered_route_wins() {
        let routes = [
            route("/users/me", &[Method::Get]),
            route("/users/{id}", &[Method::Get]),
        ];

        let RouteMatch::Found(found, params) = find_route(&routes, Method::Get, "/users/me") else {
            panic!("expected a match");
        };
        assert_eq!(found.pattern().as_str(), "/users/me");
        assert!(params.is_empty());
    }

    #[test]
    fn method_mismatch_is_reported_with_allowed_methods() {
        let routes = [
            route("/users/{id}", &[Method::Get]),
            route("/users/{id}", &[Method::Put, Method::Get]),
            route("/users", &[Method::Post]),
        ];

        let RouteMatch::MethodNotAllowed(allowed) = find_route(&routes, Method::Delete, "/users/7")
        else {
            panic!("expected 405");
        };
        assert_eq!(allowed, [Method::Get, Method::Put]);
        assert!(matches!(find_route(&routes, Method::Get, "/unknown"), RouteMatch::NotFound));
    }

    #[test]
    fn route_without_methods_is_rejected() {
        assert!(Route::new("/", [], ok).is_err());
    }
}
