//! OAuth2 client-credentials provider.
//!
//! Tokens are fetched lazily and cached until shortly before expiry. A refresh
//! is single-flight: concurrent callers wait on the same token request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

use super::{AuthProvider, bearer_token};
use crate::{Error, HttpClient, Method, Request, Result};

/// Settings for the OAuth2 client-credentials flow.
#[derive(Clone)]
pub struct OAuth2Config {
    /// Token endpoint.
    pub token_url: Url,
    /// Client identifier.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Requested scopes, sent space-separated.
    pub scopes: Vec<String>,
    /// Tokens are renewed this long before they expire.
    pub leeway: Duration,
}

impl std::fmt::Debug for OAuth2Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Config")
            .field("token_url", &self.token_url.as_str())
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("leeway", &self.leeway)
            .finish_non_exhaustive()
    }
}

impl OAuth2Config {
    /// Create a configuration with no scopes and a 30 second leeway.
    #[must_use]
    pub fn new(
        token_url: Url,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            token_url,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes: Vec::new(),
            leeway: Duration::from_secs(30),
        }
    }

    /// Request these scopes.
    #[must_use]
    pub fn with_scopes<S: Into<String>>(mut self, scopes: impl IntoIterator<Item = S>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Renew tokens this long before they expire.
    #[must_use]
    pub const fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }
}

/// Token endpoint response (RFC 6749 section 5.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The access token.
    pub access_token: String,
    /// Token type, usually `Bearer`.
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Token for the `refresh_token` grant.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Granted scopes.
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Default)]
struct TokenState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<Instant>,
}

impl TokenState {
    fn valid_token(&self, leeway: Duration) -> Option<&str> {
        let fresh = self
            .expires_at
            .is_none_or(|expires_at| Instant::now() + leeway < expires_at);
        if fresh {
            self.access_token.as_deref()
        } else {
            None
        }
    }
}

/// OAuth2 client-credentials authentication.
///
/// The token is acquired lazily on first use and kept until it is about to
/// expire. Renewal is single-flight: the token state sits behind an async
/// mutex held for the whole fetch, so concurrent callers queue up and reuse
/// the token the first one obtained.
pub struct OAuth2Auth<C> {
    client: C,
    config: OAuth2Config,
    state: Mutex<TokenState>,
    generation: AtomicU64,
}

impl<C> std::fmt::Debug for OAuth2Auth<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Auth")
            .field("config", &self.config)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<C: HttpClient> OAuth2Auth<C> {
    /// Create a provider fetching tokens through `client`.
    #[must_use]
    pub fn new(client: C, config: OAuth2Config) -> Self {
        Self {
            client,
            config,
            state: Mutex::new(TokenState::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Number of tokens obtained so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Current access token, fetching one if missing or about to expire.
    ///
    /// # Errors
    ///
    /// Returns an error if the token endpoint fails.
    pub async fn access_token(&self) -> Result<String> {
        let mut state = self.state.lock().await;
        if let Some(token) = state.valid_token(self.config.leeway) {
            return Ok(token.to_string());
        }
        self.fetch_locked(&mut state).await
    }

    /// Force a new token.
    ///
    /// Callers that queued behind an in-flight refresh get its token instead
    /// of triggering another fetch.
    ///
    /// # Errors
    ///
    /// Returns an error if the token endpoint fails.
    pub async fn refresh(&self) -> Result<String> {
        let observed = self.generation();
        let mut state = self.state.lock().await;
        if self.generation() != observed {
            if let Some(token) = &state.access_token {
                return Ok(token.clone());
            }
        }
        self.fetch_locked(&mut state).await
    }

    async fn fetch_locked(&self, state: &mut TokenState) -> Result<String> {
        let token = match state.refresh_token.take() {
            Some(refresh_token) => match self.refresh_grant(&refresh_token).await {
                Ok(token) => token,
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        "refresh_token grant failed, falling back to client credentials"
                    );
                    self.client_credentials_grant().await?
                }
            },
            None => self.client_credentials_grant().await?,
        };

        state.expires_at = token
            .expires_in
            .map(|seconds| Instant::now() + Duration::from_secs(seconds));
        state.refresh_token = token.refresh_token;
        state.access_token = Some(token.access_token.clone());

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::info!(
            token_url = %self.config.token_url,
            generation,
            expires_in = ?token.expires_in,
            "obtained OAuth2 access token"
        );

        Ok(token.access_token)
    }

    async fn client_credentials_grant(&self) -> Result<TokenResponse> {
        let mut form = vec![
            ("grant_type", "client_credentials".to_string()),
            ("client_id", self.config.client_id.clone()),
            ("client_secret", self.config.client_secret.clone()),
        ];
        if !self.config.scopes.is_empty() {
            form.push(("scope", self.config.scopes.join(" ")));
        }
        self.request_token(&form).await
    }

    async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenResponse> {
        let form = [
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
            ("client_id", self.config.client_id.clone()),
            ("client_secret", self.config.client_secret.clone()),
        ];
        self.request_token(&form).await
    }

    async fn request_token(&self, form: &[(&str, String)]) -> Result<TokenResponse> {
        let request = Request::builder(Method::Post, self.config.token_url.clone())
            .header("Accept", "application/json")
            .form(&form)?
            .build();

        let response = self.client.execute(request).await?;
        if !response.is_success() {
            let status = response.status();
            return Err(Error::Authentication {
                message: format!("token endpoint returned {status}"),
                body: Some(response.into_body()),
            });
        }
        response.json()
    }
}

impl<C: HttpClient> AuthProvider for OAuth2Auth<C> {
    fn apply(&self, mut request: Request<Bytes>) -> BoxFuture<'_, Result<Request<Bytes>>> {
        Box::pin(async move {
            let token = self.access_token().await?;
            request
                .headers_mut()
                .insert("Authorization", format!("Bearer {token}"));
            Ok(request)
        })
    }

    fn invalidate<'a>(&'a self, request: &'a Request<Bytes>) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let rejected = bearer_token(request);
            let mut state = self.state.lock().await;
            match state.access_token.as_deref() {
                Some(current) if Some(current) != rejected => Ok(true),
                _ => {
                    self.fetch_locked(&mut state).await?;
                    Ok(true)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;

    use serde_json::json;
    use tandem_core::Response;

    use super::*;

    /// Token endpoint double issuing `tok-1`, `tok-2`, ...
    #[derive(Clone, Default)]
    struct TokenEndpoint {
        calls: Arc<AtomicU32>,
        bodies: Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl HttpClient for TokenEndpoint {
        async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let body = request
                .body()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            self.bodies
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(body);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(Response::from_status(200).with_json(json!({
                "access_token": format!("tok-{n}"),
                "token_type": "Bearer",
                "expires_in": 60,
            })))
        }
    }

    fn config() -> OAuth2Config {
        let url = Url::parse("https://auth.example.com/token").expect("valid url");
        OAuth2Config::new(url, "client", "secret")
            .with_scopes(["read", "write"])
            .with_leeway(Duration::from_secs(10))
    }

    fn request() -> Request<Bytes> {
        let url = Url::parse("https://api.example.com/data").expect("valid url");
        Request::builder(Method::Get, url).build()
    }

    #[tokio::test]
    async fn lazily_fetches_with_client_credentials() {
        let endpoint = TokenEndpoint::default();
        let auth = OAuth2Auth::new(endpoint.clone(), config());
        assert_eq!(auth.generation(), 0);

        let request = auth.apply(request()).await.expect("apply");
        assert_eq!(request.header("authorization"), Some("Bearer tok-1"));

        let bodies = endpoint.bodies.lock().expect("lock").clone();
        assert_eq!(
            bodies,
            ["grant_type=client_credentials&client_id=client&client_secret=secret&scope=read+write"]
        );
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_fetch() {
        let endpoint = TokenEndpoint::default();
        let auth = Arc::new(OAuth2Auth::new(endpoint.clone(), config()));

        let tokens =
            futures_util::future::join_all((0..8).map(|_| auth.access_token())).await;

        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
        assert!(tokens.iter().all(|t| t.as_deref().ok() == Some("tok-1")));
    }

    #[tokio::test]
    async fn concurrent_refreshes_are_single_flight() {
        let endpoint = TokenEndpoint::default();
        let auth = OAuth2Auth::new(endpoint.clone(), config());
        auth.access_token().await.expect("token");

        let (a, b) = tokio::join!(auth.refresh(), auth.refresh());
        assert_eq!(a.expect("refresh"), "tok-2");
        assert_eq!(b.expect("refresh"), "tok-2");
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn renews_before_expiry() {
        let endpoint = TokenEndpoint::default();
        let auth = OAuth2Auth::new(endpoint.clone(), config());

        assert_eq!(auth.access_token().await.expect("token"), "tok-1");
        tokio::time::advance(Duration::from_secs(40)).await;
        assert_eq!(auth.access_token().await.expect("token"), "tok-1");
        // 60s lifetime minus 10s leeway
        tokio::time::advance(Duration::from_secs(15)).await;
        assert_eq!(auth.access_token().await.expect("token"), "tok-2");
    }

    #[tokio::test]
    async fn invalidate_only_refreshes_the_current_token() {
        let endpoint = TokenEndpoint::default();
        let auth = OAuth2Auth::new(endpoint.clone(), config());

        let rejected = auth.apply(request()).await.expect("apply");
        assert!(auth.invalidate(&rejected).await.expect("invalidate"));
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 2);

        // The same stale request again: token already rotated, no fetch.
        assert!(auth.invalidate(&rejected).await.expect("invalidate"));
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn endpoint_failure_is_authentication_error() {
        #[derive(Clone)]
        struct Denied;

        impl HttpClient for Denied {
            async fn execute(&self, _request: Request<Bytes>) -> Result<Response<Bytes>> {
                Ok(Response::from_status(401).with_json(json!({"error": "invalid_client"})))
            }
        }

        let auth = OAuth2Auth::new(Denied, config());
        let err = auth.access_token().await.expect_err("denied");
        assert_eq!(err.code(), "authentication_error");
    }
}
