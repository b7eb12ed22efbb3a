//! The [`Api`]: routes plus global middleware.

use std::fmt;
use std::sync::Arc;

use serde_json::json;
use tandem_core::{Method, Response};
use tracing::{debug, trace};

use crate::handler::Handler;
use crate::middleware::Middleware;
use crate::openapi;
use crate::request::{Request, RequestHead};
use crate::router::{Route, RouteMatch, find_route};

/// An HTTP API: global middleware, routes and metadata.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use tandem_core::Method;
/// use tandem_server::{Api, LogRequest, Request};
///
/// async fn get_user(request: Request) -> serde_json::Value {
///     json!({"id": request.path_param("id")})
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut api = Api::new("Users", "1.0.0");
/// api.add_middleware(LogRequest::new()).get("/users/{id}", get_user);
///
/// let response = api.handle_request(Request::new(Method::Get, "/users/42")).await;
/// assert_eq!(response.status(), 200);
/// # }
/// ```
pub struct Api {
    name: String,
    version: String,
    description: Option<String>,
    middleware: Vec<Arc<dyn Middleware>>,
    routes: Vec<Route>,
    openapi_path: Option<String>,
}

impl Api {
    /// Create an empty API.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: None,
            middleware: Vec::new(),
            routes: Vec::new(),
            openapi_path: None,
        }
    }

    /// Describe the API in the generated document.
    pub fn description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = Some(description.into());
        self
    }

    /// Append global middleware. Global middleware run before routing, in
    /// registration order.
    pub fn add_middleware(&mut self, middleware: impl Middleware) -> &mut Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Register a route.
    pub fn route(&mut self, route: Route) -> &mut Self {
        debug!(pattern = %route.pattern(), methods = ?route.methods(), "route registered");
        self.routes.push(route);
        self
    }

    /// Register a handler for `method` on `pattern`.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is malformed; use [`Route::new`] to handle the error.
    #[allow(clippy::expect_used)]
    pub fn handle(&mut self, method: Method, pattern: &str, handler: impl Handler) -> &mut Self {
        let route = Route::new(pattern, [method], handler).expect("invalid route pattern");
        self.route(route)
    }

    /// Register a `GET` handler.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is malformed.
    pub fn get(&mut self, pattern: &str, handler: impl Handler) -> &mut Self {
        self.handle(Method::Get, pattern, handler)
    }

    /// Register a `POST` handler.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is malformed.
    pub fn post(&mut self, pattern: &str, handler: impl Handler) -> &mut Self {
        self.handle(Method::Post, pattern, handler)
    }

    /// Register a `PUT` handler.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is malformed.
    pub fn put(&mut self, pattern: &str, handler: impl Handler) -> &mut Self {
        self.handle(Method::Put, pattern, handler)
    }

    /// Register a `DELETE` handler.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is malformed.
    pub fn delete(&mut self, pattern: &str, handler: impl Handler) -> &mut Self {
        self.handle(Method::Delete, pattern, handler)
    }

    /// Register a `PATCH` handler.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is malformed.
    pub fn patch(&mut self, pattern: &str, handler: impl Handler) -> &mut Self {
        self.handle(Method::Patch, pattern, handler)
    }

    /// Serve the OpenAPI document at `path` with `GET`.
    ///
    /// The document is generated per request, so routes registered later are
    /// included. The path goes through the global middleware like any route.
    pub fn with_openapi_route(&mut self, path: impl Into<String>) -> &mut Self {
        self.openapi_path = Some(path.into());
        self
    }

    /// API name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// API version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// API description.
    #[must_use]
    pub fn description_text(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Registered routes, in registration order.
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Global middleware, in order.
    #[must_use]
    pub fn global_middleware(&self) -> &[Arc<dyn Middleware>] {
        &self.middleware
    }

    /// Run a request through the middleware chains and the matching handler.
    ///
    /// Never fails: routing misses become 404 or 405 responses.
    pub async fn handle_request(&self, mut request: Request) -> Response {
        let mut entered: Vec<&Arc<dyn Middleware>> = Vec::with_capacity(self.middleware.len());

        for middleware in &self.middleware {
            if let Some(response) = middleware.on_request(&mut request).await {
                return unwind(&entered, &request.head(), response).await;
            }
            entered.push(middleware);
        }

        if let Some(path) = &self.openapi_path {
            if request.method() == Method::Get && trim(request.path()) == trim(path) {
                let document = openapi::generate_openapi(self);
                let response = Response::from_status(200).with_json(document);
                return unwind(&entered, &request.head(), response).await;
            }
        }

        let route = match find_route(&self.routes, request.method(), request.path()) {
            RouteMatch::Found(route, params) => {
                request.set_path_params(params);
                route
            }
            RouteMatch::MethodNotAllowed(allowed) => {
                let response = method_not_allowed(request.method(), &allowed);
                return unwind(&entered, &request.head(), response).await;
            }
            RouteMatch::NotFound => {
                let response = Response::from_status(404).with_json(json!({
                    "error": format!("No route for {}", request.path()),
                    "code": "not_found",
                }));
                return unwind(&entered, &request.head(), response).await;
            }
        };
        trace!(pattern = %route.pattern(), "route matched");

        for middleware in route.route_middleware() {
            if let Some(response) = middleware.on_request(&mut request).await {
                return unwind(&entered, &request.head(), response).await;
            }
            entered.push(middleware);
        }

        let head = request.head();
        let response = route.handler().call(request).await;
        unwind(&entered, &head, response).await
    }
}

fn trim(path: &str) -> &str {
    path.trim_end_matches('/')
}

fn method_not_allowed(method: Method, allowed: &[Method]) -> Response {
    let allow: Vec<&str> = allowed.iter().map(Method::as_str).collect();
    Response::from_status(405)
        .with_json(json!({
            "error": format!("Method {method} not allowed"),
            "code": "method_not_allowed",
        }))
        .with_header("Allow", allow.join(", "))
}

async fn unwind(
    entered: &[&Arc<dyn Middleware>],
    head: &RequestHead,
    mut response: Response,
) -> Response {
    for middleware in entered.iter().rev() {
        response = middleware.on_response(head, response).await;
    }
    response
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("middleware", &self.middleware.len())
            .field("routes", &self.routes)
            .field("openapi_path", &self.openapi_path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    async fn user(request: Request) -> Value {
        json!({"id": request.path_param("id")})
    }

    fn users_api() -> Api {
        let mut api = Api::new("Users", "1.0.0");
        api.get("/users/{id}", user);
        api
    }

    #[tokio::test]
    async fn path_param_reaches_handler() {
        let response = users_api()
            .handle_request(Request::new(Method::Get, "/users/42"))
            .await;

        assert_eq!(response.status(), 200);
        assert_eq!(response.json::<Value>().expect("json"), json!({"id": "42"}));
    }

    #[tokio::test]
    async fn wrong_method_is_405_with_allow() {
        let response = users_api()
            .handle_request(Request::new(Method::Post, "/users/42"))
            .await;

        assert_eq!(response.status(), 405);
        assert_eq!(response.header("allow"), Some("GET"));
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let response = users_api()
            .handle_request(Request::new(Method::Get, "/unknown"))
            .await;

        assert_eq!(response.status(), 404);
        assert_eq!(response.json::<Value>().expect("json")["code"], "not_found");
    }

    #[tokio::test]
    async fn openapi_route_is_served() {
        let mut api = users_api();
        api.with_openapi_route("/openapi.json");

        let response = api.handle_request(Request::new(Method::Get, "/openapi.json/")).await;
        assert_eq!(response.status(), 200);
        let document: Value = response.json().expect("json");
        assert_eq!(document["openapi"], "3.0.3");
        assert!(document["paths"].get("/openapi.json").is_none());
    }

    #[test]
    #[should_panic(expected = "invalid route pattern")]
    fn convenience_builders_panic_on_bad_pattern() {
        Api::new("x", "1").get("/users/{}", user);
    }
}
