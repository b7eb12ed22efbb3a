//! HTTP Basic authentication.

use std::sync::Arc;

use base64::Engine;
use bytes::Bytes;
use futures_util::future::BoxFuture;

use super::AuthProvider;
use crate::{Request, Result};

/// HTTP Basic authentication: `Authorization: Basic <base64(user:pass)>`.
#[derive(Clone)]
pub struct BasicAuth {
    /// Precomputed header value.
    header_value: Arc<str>,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth").finish_non_exhaustive()
    }
}

impl BasicAuth {
    /// Create a provider from a username and password.
    pub fn new(username: impl AsRef<str>, password: impl AsRef<str>) -> Self {
        let credentials = format!("{}:{}", username.as_ref(), password.as_ref());
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        Self {
            header_value: Arc::from(format!("Basic {encoded}")),
        }
    }
}

impl AuthProvider for BasicAuth {
    fn apply(&self, mut request: Request<Bytes>) -> BoxFuture<'_, Result<Request<Bytes>>> {
        request
            .headers_mut()
            .insert("Authorization", self.header_value.as_ref());
        Box::pin(async move { Ok(request) })
    }
}

#[cfg(test)]
mod tests {
    use tandem_core::Method;

    use super::*;

    #[tokio::test]
    async fn encodes_credentials() {
        let url = url::Url::parse("https://example.com").expect("valid url");
        let request = Request::builder(Method::Get, url).build();

        let request = BasicAuth::new("user", "pass")
            .apply(request)
            .await
            .expect("apply");

        // "user:pass" in base64 is "dXNlcjpwYXNz"
        assert_eq!(request.header("authorization"), Some("Basic dXNlcjpwYXNz"));
    }

    #[tokio::test]
    async fn replaces_existing_authorization() {
        let url = url::Url::parse("https://example.com").expect("valid url");
        let request = Request::builder(Method::Get, url)
            .header("Authorization", "Bearer stale")
            .build();

        let request = BasicAuth::new("a", "b").apply(request).await.expect("apply");
        assert_eq!(request.headers().get_all("authorization").count(), 1);
    }
}
