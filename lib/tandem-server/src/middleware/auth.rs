//! Authentication middleware.
//!
//! [`ApiKeyAuthenticator`] establishes a principal under the `user` context
//! key; [`RequireAuth`] gates a route on that principal.

use std::collections::HashMap;
use std::fmt;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tandem_core::{Error, Response};
use tracing::debug;

use super::Middleware;
use crate::request::Request;

/// Context key holding the authenticated principal.
pub const USER_KEY: &str = "user";

/// Rejects requests without an authenticated principal.
///
/// Answers 401 when the context has no `user`, and 403 when a role is
/// required and `user.role` differs.
///
/// # Example
///
/// ```
/// use tandem_server::RequireAuth;
///
/// let any_user = RequireAuth::new();
/// let admins_only = RequireAuth::new().role("admin");
/// # let _ = (any_user, admins_only);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequireAuth {
    role: Option<String>,
}

impl RequireAuth {
    /// Require any authenticated principal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Additionally require `user.role` to equal `role`.
    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    fn check(&self, request: &Request) -> Option<Response> {
        let context = request.context();
        if context.get(USER_KEY).is_none_or(Value::is_null) {
            return Some(Response::from_error(&Error::authentication("Authentication required")));
        }
        let role = self.role.as_deref()?;
        let granted = context
            .lookup("user.role")
            .and_then(Value::as_str)
            .is_some_and(|actual| actual == role);
        (!granted).then(|| {
            Response::from_error(&Error::authorization(format!("{role} role required")))
        })
    }
}

impl Middleware for RequireAuth {
    fn on_request<'a>(&'a self, request: &'a mut Request) -> BoxFuture<'a, Option<Response>> {
        let outcome = self.check(request);
        if let Some(response) = &outcome {
            debug!(path = request.path(), status = response.status(), "access denied");
        }
        Box::pin(async move { outcome })
    }
}

/// Maps API keys to principals.
///
/// A known key stores its principal under `user` in the context. Unknown or
/// missing keys pass through unauthenticated, leaving the decision to
/// [`RequireAuth`].
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use tandem_server::ApiKeyAuthenticator;
///
/// let authenticator = ApiKeyAuthenticator::new()
///     .key("secret-api-key", json!({"id": "admin", "role": "admin"}));
/// # let _ = authenticator;
/// ```
#[derive(Clone)]
pub struct ApiKeyAuthenticator {
    header: String,
    keys: HashMap<String, Value>,
}

impl Default for ApiKeyAuthenticator {
    fn default() -> Self {
        Self {
            header: "X-API-Key".to_owned(),
            keys: HashMap::new(),
        }
    }
}

impl ApiKeyAuthenticator {
    /// Read keys from `X-API-Key`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read keys from another header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>) -> Self {
        self.header = name.into();
        self
    }

    /// Register a key and its principal.
    #[must_use]
    pub fn key(mut self, key: impl Into<String>, principal: impl Into<Value>) -> Self {
        self.keys.insert(key.into(), principal.into());
        self
    }
}

impl fmt::Debug for ApiKeyAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKeyAuthenticator")
            .field("header", &self.header)
            .field("keys", &self.keys.len())
            .finish()
    }
}

impl Middleware for ApiKeyAuthenticator {
    fn on_request<'a>(&'a self, request: &'a mut Request) -> BoxFuture<'a, Option<Response>> {
        let principal = request
            .header(&self.header)
            .and_then(|key| self.keys.get(key))
            .cloned();
        if let Some(principal) = principal {
            request.context_mut().insert(USER_KEY, principal);
        }
        Box::pin(async { None })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tandem_core::Method;

    use super::*;

    async fn run(middleware: &impl Middleware, request: &mut Request) -> Option<Response> {
        middleware.on_request(request).await
    }

    #[tokio::test]
    async fn missing_principal_is_unauthorized() {
        let mut request = Request::new(Method::Delete, "/users/1");
        let response = run(&RequireAuth::new(), &mut request).await.expect("rejected");

        assert_eq!(response.status(), 401);
        let body: Value = response.json().expect("json");
        assert_eq!(
            body,
            json!({"error": "Authentication required", "code": "authentication_error"})
        );
    }

    #[tokio::test]
    async fn principal_passes() {
        let mut request =
            Request::new(Method::Delete, "/users/1").with_context("user", json!({"role": "admin"}));
        assert!(run(&RequireAuth::new(), &mut request).await.is_none());
        assert!(run(&RequireAuth::new().role("admin"), &mut request).await.is_none());
    }

    #[tokio::test]
    async fn wrong_role_is_forbidden() {
        let mut request = Request::new(Method::Delete, "/users/1")
            .with_context("user", json!({"role": "reader"}));
        let response = run(&RequireAuth::new().role("admin"), &mut request)
            .await
            .expect("rejected");

        assert_eq!(response.status(), 403);
        let body: Value = response.json().expect("json");
        assert_eq!(body["code"], "authorization_error");
    }

    #[tokio::test]
    async fn known_key_sets_principal() {
        let authenticator = ApiKeyAuthenticator::new().key("k1", json!({"id": "svc"}));

        let mut known = Request::new(Method::Get, "/").with_header("x-api-key", "k1");
        assert!(run(&authenticator, &mut known).await.is_none());
        assert_eq!(known.context().lookup("user.id"), Some(&json!("svc")));

        let mut unknown = Request::new(Method::Get, "/").with_header("X-API-Key", "nope");
        assert!(run(&authenticator, &mut unknown).await.is_none());
        assert!(!unknown.context().contains(USER_KEY));
    }

    #[tokio::test]
    async fn custom_header() {
        let authenticator = ApiKeyAuthenticator::new()
            .header("X-Token")
            .key("t", json!({"id": "bot"}));
        let mut request = Request::new(Method::Get, "/").with_header("X-Token", "t");

        run(&authenticator, &mut request).await;
        assert!(request.context().contains(USER_KEY));
    }
}
