//! Cross-origin resource sharing.

use std::time::Duration;

use futures_util::future::BoxFuture;
use tandem_core::{Headers, Method, Response};

use super::Middleware;
use crate::request::{Request, RequestHead};

/// CORS policy.
#[derive(Debug, Clone)]
pub struct CorsConfig {
    allow_origins: Vec<String>,
    allow_methods: Vec<Method>,
    allow_headers: Vec<String>,
    expose_headers: Vec<String>,
    allow_credentials: bool,
    max_age: Option<Duration>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_owned()],
            allow_methods: vec![
                Method::Get,
                Method::Post,
                Method::Put,
                Method::Delete,
                Method::Patch,
                Method::Options,
            ],
            allow_headers: vec![
                "Content-Type".to_owned(),
                "Authorization".to_owned(),
                "X-API-Key".to_owned(),
            ],
            expose_headers: Vec::new(),
            allow_credentials: false,
            max_age: Some(Duration::from_secs(86_400)),
        }
    }
}

impl CorsConfig {
    /// Permissive policy: any origin, common methods and headers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Only allow the listed origins (`*` allows any).
    #[must_use]
    pub fn allow_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_origins = origins.into_iter().map(Into::into).collect();
        self
    }

    /// Methods announced to preflight requests.
    #[must_use]
    pub fn allow_methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.allow_methods = methods.into_iter().collect();
        self
    }

    /// Request headers announced to preflight requests.
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Response headers readable by the browser.
    #[must_use]
    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expose_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Allow cookies and credentials. The origin is then echoed, never `*`.
    #[must_use]
    pub const fn allow_credentials(mut self, allow: bool) -> Self {
        self.allow_credentials = allow;
        self
    }

    /// How long browsers may cache preflight results.
    #[must_use]
    pub const fn max_age(mut self, max_age: Option<Duration>) -> Self {
        self.max_age = max_age;
        self
    }

    /// Value for `Access-Control-Allow-Origin`, `None` when `origin` is not
    /// allowed.
    fn allowed_origin(&self, origin: Option<&str>) -> Option<String> {
        let any = self.allow_origins.iter().any(|allowed| allowed == "*");
        match origin {
            Some(origin) if self.allow_credentials && any => Some(origin.to_owned()),
            _ if any => Some("*".to_owned()),
            Some(origin) if self.allow_origins.iter().any(|allowed| allowed == origin) => {
                Some(origin.to_owned())
            }
            _ => None,
        }
    }

    fn apply(&self, origin: Option<&str>, headers: &mut Headers) {
        let Some(allowed) = self.allowed_origin(origin) else {
            return;
        };
        if allowed != "*" {
            headers.append("Vary", "Origin");
        }
        headers.insert("Access-Control-Allow-Origin", allowed);
        if self.allow_credentials {
            headers.insert("Access-Control-Allow-Credentials", "true");
        }
        if !self.expose_headers.is_empty() {
            headers.insert("Access-Control-Expose-Headers", self.expose_headers.join(", "));
        }
    }

    fn preflight(&self, origin: Option<&str>) -> Response {
        let mut headers = Headers::new();
        self.apply(origin, &mut headers);
        if headers.contains("Access-Control-Allow-Origin") {
            let methods: Vec<&str> = self.allow_methods.iter().map(Method::as_str).collect();
            headers.insert("Access-Control-Allow-Methods", methods.join(", "));
            headers.insert("Access-Control-Allow-Headers", self.allow_headers.join(", "));
            if let Some(max_age) = self.max_age {
                headers.insert("Access-Control-Max-Age", max_age.as_secs().to_string());
            }
        }
        Response::new(204, headers, bytes::Bytes::new())
    }
}

/// CORS middleware.
///
/// `OPTIONS` requests are answered with 204 and the preflight headers; every
/// other response gets `Access-Control-Allow-Origin` and friends when the
/// origin is allowed.
///
/// # Example
///
/// ```
/// use tandem_server::{Cors, CorsConfig};
///
/// let cors = Cors::new(CorsConfig::new().allow_origins(["https://app.example.com"]));
/// # let _ = cors;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Cors {
    config: CorsConfig,
}

impl Cors {
    /// Apply `config`.
    #[must_use]
    pub fn new(config: CorsConfig) -> Self {
        Self { config }
    }

    /// Any origin, default methods and headers.
    #[must_use]
    pub fn permissive() -> Self {
        Self::default()
    }
}

impl Middleware for Cors {
    fn on_request<'a>(&'a self, request: &'a mut Request) -> BoxFuture<'a, Option<Response>> {
        let outcome = (request.method() == Method::Options)
            .then(|| self.config.preflight(request.header("Origin")));
        Box::pin(async move { outcome })
    }

    fn on_response<'a>(
        &'a self,
        request: &'a RequestHead,
        response: Response,
    ) -> BoxFuture<'a, Response> {
        let (status, mut headers, body) = response.into_parts();
        self.config.apply(request.header("Origin"), &mut headers);
        Box::pin(async move { Response::new(status, headers, body) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn preflight_short_circuits() {
        let cors = Cors::permissive();
        let mut request = Request::new(Method::Options, "/users")
            .with_header("Origin", "https://app.example.com")
            .with_header("Access-Control-Request-Method", "POST");

        let response = cors.on_request(&mut request).await.expect("preflight");
        assert_eq!(response.status(), 204);
        assert_eq!(response.header("access-control-allow-origin"), Some("*"));
        assert_eq!(
            response.header("access-control-allow-methods"),
            Some("GET, POST, PUT, DELETE, PATCH, OPTIONS")
        );
        assert_eq!(response.header("access-control-max-age"), Some("86400"));
    }

    #[tokio::test]
    async fn listed_origin_is_echoed() {
        let cors = Cors::new(CorsConfig::new().allow_origins(["https://a.example"]));
        let head = Request::new(Method::Get, "/")
            .with_header("Origin", "https://a.example")
            .head();

        let response = cors.on_response(&head, Response::from_status(200)).await;
        assert_eq!(response.header("access-control-allow-origin"), Some("https://a.example"));
        assert_eq!(response.header("vary"), Some("Origin"));
    }

    #[tokio::test]
    async fn unlisted_origin_gets_no_headers() {
        let cors = Cors::new(CorsConfig::new().allow_origins(["https://a.example"]));
        let mut request =
            Request::new(Method::Options, "/").with_header("Origin", "https://evil.example");

        let response = cors.on_request(&mut request).await.expect("preflight");
        assert_eq!(response.status(), 204);
        assert!(response.header("access-control-allow-origin").is_none());
        assert!(response.header("access-control-allow-methods").is_none());
    }

    #[test]
    fn credentials_echo_instead_of_wildcard() {
        let config = CorsConfig::new().allow_credentials(true);
        assert_eq!(
            config.allowed_origin(Some("https://x.example")).as_deref(),
            Some("https://x.example")
        );
        assert_eq!(config.allowed_origin(None).as_deref(), Some("*"));
    }
}
