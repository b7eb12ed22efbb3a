//! High-level API client.
//!
//! [`ApiClient`] combines any [`HttpClient`] with a base URL, an optional
//! [`AuthProvider`] and an optional response [`Cache`]. Middleware (retry,
//! logging, rate limiting) belongs to the transport, usually a
//! [`HyperClient`] built with [`HyperClientBuilder`](crate::HyperClientBuilder).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::auth::AuthProvider;
use crate::cache::{self, Cache, CacheControl};
use crate::middleware::RetryPolicy;
use crate::{
    ClientConfig, Error, Headers, HttpClient, HttpClientStreaming, HyperClient, HyperClientBuilder,
    Method, Request, Response, Result, StreamingResponse,
};

/// Per-call options for [`ApiClient`] requests.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use tandem::RequestOptions;
///
/// let options = RequestOptions::new()
///     .query("category", "electronics")
///     .header("X-Request-Id", "42")
///     .timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    query: Vec<(String, String)>,
    json: Option<serde_json::Value>,
    body: Option<(Bytes, String)>,
    headers: Headers,
    timeout: Option<Duration>,
    no_cache: bool,
}

impl RequestOptions {
    /// Empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a query parameter.
    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    /// Send `value` as a JSON body.
    #[must_use]
    pub fn json(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.json = Some(value.into());
        self.body = None;
        self
    }

    /// Send any serializable value as a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be represented as JSON.
    pub fn try_json<T: Serialize + ?Sized>(self, value: &T) -> Result<Self> {
        Ok(self.json(serde_json::to_value(value)?))
    }

    /// Send raw bytes with the given content type.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        self.body = Some((body.into(), content_type.into()));
        self.json = None;
        self
    }

    /// Set a header, replacing previous values.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Deadline for the whole call, retries and token refreshes included.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Bypass the cache for this call, neither reading nor populating it.
    #[must_use]
    pub const fn no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }
}

/// HTTP client bound to a base URL.
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use tandem::auth::ApiKeyAuth;
/// use tandem::cache::MemoryCache;
/// use tandem::{ApiClient, HyperClient, RequestOptions};
///
/// let http = HyperClient::builder().with_retry(3).build();
/// let client = ApiClient::new(http, "https://api.example.com/v1")?
///     .with_auth(ApiKeyAuth::new("secret"))
///     .with_cache(MemoryCache::with_max_size(100));
///
/// let users: Vec<User> = client
///     .get("/users", RequestOptions::new())
///     .await?
///     .error_for_status()?
///     .json()?;
/// ```
pub struct ApiClient<C> {
    client: C,
    base_url: Url,
    auth: Option<Arc<dyn AuthProvider>>,
    cache: Option<Arc<dyn Cache>>,
    cache_headers: Vec<String>,
    config: ClientConfig,
}

impl<C: fmt::Debug> fmt::Debug for ApiClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("client", &self.client)
            .field("base_url", &self.base_url.as_str())
            .field("auth", &self.auth.is_some())
            .field("cache", &self.cache.is_some())
            .field("cache_headers", &self.cache_headers)
            .field("config", &self.config)
            .finish()
    }
}

impl<C: Clone> Clone for ApiClient<C> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            auth: self.auth.clone(),
            cache: self.cache.clone(),
            cache_headers: self.cache_headers.clone(),
            config: self.config.clone(),
        }
    }
}

impl<C> ApiClient<C> {
    /// Create a new API client with the given base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed.
    pub fn new(client: C, base_url: impl AsRef<str>) -> Result<Self> {
        Ok(Self::with_url(client, Url::parse(base_url.as_ref())?))
    }

    /// Create a new API client with a pre-parsed URL.
    #[must_use]
    pub fn with_url(client: C, mut base_url: Url) -> Self {
        base_url.set_query(None);
        base_url.set_fragment(None);
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            client,
            base_url,
            auth: None,
            cache: None,
            cache_headers: Vec::new(),
            config: ClientConfig::default(),
        }
    }

    /// Authenticate every request with `provider`.
    #[must_use]
    pub fn with_auth(mut self, provider: impl AuthProvider + 'static) -> Self {
        self.auth = Some(Arc::new(provider));
        self
    }

    /// Authenticate with a provider shared with other clients or layers.
    #[must_use]
    pub fn with_shared_auth(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(provider);
        self
    }

    /// Cache successful GET responses in `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: impl Cache + 'static) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    /// Request headers that take part in the cache key (e.g. `Accept-Language`).
    #[must_use]
    pub fn with_cache_headers<S: Into<String>>(
        mut self,
        headers: impl IntoIterator<Item = S>,
    ) -> Self {
        self.cache_headers = headers.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the configuration (timeout, cache TTL, strict cache).
    #[must_use]
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Base URL, always ending with `/`.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get a reference to the inner HTTP client.
    #[must_use]
    pub fn inner(&self) -> &C {
        &self.client
    }

    /// Consume the wrapper and return the inner HTTP client.
    #[must_use]
    pub fn into_inner(self) -> C {
        self.client
    }

    /// Resolve `path` against the base URL.
    ///
    /// Absolute `http(s)` URLs are used as-is. A leading `/` is joined onto
    /// the base path instead of replacing it, so with a base of
    /// `https://api.example.com/v1` both `users` and `/users` resolve to
    /// `https://api.example.com/v1/users`.
    ///
    /// # Errors
    ///
    /// Returns an error if the result is not a valid URL.
    pub fn url(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(Url::parse(path)?);
        }
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    fn build_request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<(Request<Bytes>, Duration, bool)> {
        let RequestOptions {
            query,
            json,
            body,
            headers,
            timeout,
            no_cache,
        } = options;

        let mut builder = Request::builder(method, self.url(path)?).query_pairs(query);
        if let Some(value) = json {
            builder = builder.json(&value)?;
        } else if let Some((bytes, content_type)) = body {
            builder = builder.header("Content-Type", content_type).body(bytes);
        }
        let mut request = builder.build();
        for (name, value) in headers.iter() {
            request.headers_mut().insert(name, value);
        }

        Ok((request, timeout.unwrap_or(self.config.timeout), no_cache))
    }
}

impl<C: HttpClient> ApiClient<C> {
    /// Send a GET request.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails; non-2xx statuses are returned
    /// as responses.
    pub async fn get(&self, path: &str, options: RequestOptions) -> Result<Response<Bytes>> {
        self.request(Method::Get, path, options).await
    }

    /// Send a POST request.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails.
    pub async fn post(&self, path: &str, options: RequestOptions) -> Result<Response<Bytes>> {
        self.request(Method::Post, path, options).await
    }

    /// Send a PUT request.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails.
    pub async fn put(&self, path: &str, options: RequestOptions) -> Result<Response<Bytes>> {
        self.request(Method::Put, path, options).await
    }

    /// Send a DELETE request.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails.
    pub async fn delete(&self, path: &str, options: RequestOptions) -> Result<Response<Bytes>> {
        self.request(Method::Delete, path, options).await
    }

    /// Send a PATCH request.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails.
    pub async fn patch(&self, path: &str, options: RequestOptions) -> Result<Response<Bytes>> {
        self.request(Method::Patch, path, options).await
    }

    /// Send a request with any method.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, credentials cannot be
    /// obtained, the transport fails or the deadline elapses
    /// ([`Error::Timeout`]).
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<Response<Bytes>> {
        let (request, timeout, no_cache) = self.build_request(method, path, options)?;
        tokio::time::timeout(timeout, self.dispatch(request, no_cache))
            .await
            .map_err(|_| Error::Timeout)?
    }

    /// Send a prepared request through auth and cache under the configured timeout.
    ///
    /// # Errors
    ///
    /// See [`ApiClient::request`].
    pub async fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        tokio::time::timeout(self.config.timeout, self.dispatch(request, false))
            .await
            .map_err(|_| Error::Timeout)?
    }

    async fn dispatch(&self, request: Request<Bytes>, no_cache: bool) -> Result<Response<Bytes>> {
        let cached = match &self.cache {
            Some(cache) if request.method() == Method::Get && !no_cache => {
                Some((Arc::clone(cache), cache::cache_key(&request, &self.cache_headers)))
            }
            _ => None,
        };

        if let Some((cache, key)) = &cached {
            if let Some(hit) = self.cache_lookup(cache.as_ref(), key).await? {
                debug!(%key, "cache hit");
                return Ok(hit);
            }
        }

        let response = self.send_authenticated(request).await?;

        if let Some((cache, key)) = &cached {
            if response.is_success() {
                self.cache_store(cache.as_ref(), key, &response).await?;
            }
        }

        Ok(response)
    }

    async fn authenticate(&self, request: Request<Bytes>) -> Result<Request<Bytes>> {
        match &self.auth {
            Some(provider) => provider.apply(request).await,
            None => Ok(request),
        }
    }

    async fn send_authenticated(&self, request: Request<Bytes>) -> Result<Response<Bytes>> {
        let Some(provider) = &self.auth else {
            return self.client.execute(request).await;
        };

        let authenticated = provider.apply(request.clone()).await?;
        let rejected = authenticated.clone();
        let response = self.client.execute(authenticated).await?;
        if response.status() != 401 || !provider.invalidate(&rejected).await? {
            return Ok(response);
        }

        debug!(url = %request.url(), "credentials rejected, resending once");
        let authenticated = provider.apply(request).await?;
        self.client.execute(authenticated).await
    }

    async fn cache_lookup(&self, cache: &dyn Cache, key: &str) -> Result<Option<Response<Bytes>>> {
        let result = match cache.get(key).await {
            Ok(Some(bytes)) => cache::decode_response(&bytes).map(Some),
            Ok(None) => Ok(None),
            Err(err) => Err(err),
        };
        match result {
            Err(err) if !self.config.strict_cache => {
                warn!(%key, error = %err, "cache read failed, treating as miss");
                Ok(None)
            }
            other => other.map_err(into_cache_error),
        }
    }

    async fn cache_store(
        &self,
        cache: &dyn Cache,
        key: &str,
        response: &Response<Bytes>,
    ) -> Result<()> {
        let control = CacheControl::from_response(response);
        if !control.is_storable() {
            debug!(%key, "response not storable");
            return Ok(());
        }
        let ttl = control.ttl(self.config.cache_ttl);

        let result = match cache::encode_response(response) {
            Ok(bytes) => cache.set(key, bytes, ttl).await,
            Err(err) => Err(err),
        };
        match result {
            Err(err) if !self.config.strict_cache => {
                warn!(%key, error = %err, "cache write failed, ignoring");
                Ok(())
            }
            other => other.map_err(into_cache_error),
        }
    }
}

impl<C: HttpClientStreaming> ApiClient<C> {
    /// Send a request and stream the response body.
    ///
    /// The per-call deadline covers the whole exchange: waiting for the
    /// headers and reading the body. Caching does not apply to streams.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange could not start before the deadline.
    pub async fn stream(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<StreamingResponse> {
        let (request, timeout, _) = self.build_request(method, path, options)?;
        let deadline = tokio::time::Instant::now() + timeout;

        let start = async {
            let authenticated = self.authenticate(request.clone()).await?;
            let rejected = authenticated.clone();
            let response = self.client.execute_streaming(authenticated).await?;
            if response.status() == 401 {
                if let Some(provider) = &self.auth {
                    if provider.invalidate(&rejected).await? {
                        drop(response);
                        let authenticated = provider.apply(request).await?;
                        return self.client.execute_streaming(authenticated).await;
                    }
                }
            }
            Ok(response)
        };

        let response = tokio::time::timeout_at(deadline, start)
            .await
            .map_err(|_| Error::Timeout)??;
        Ok(response.with_deadline(deadline))
    }
}

fn into_cache_error(err: Error) -> Error {
    match err {
        Error::Cache(_) => err,
        other => Error::cache(other.to_string()),
    }
}

/// Client with logging and retries from the default [`ClientConfig`],
/// bound to `base_url`.
///
/// # Errors
///
/// Returns an error if the URL cannot be parsed.
pub fn create_client(base_url: impl AsRef<str>) -> Result<ApiClient<HyperClient>> {
    create_client_with_config(base_url, ClientConfig::default())
}

/// Like [`create_client`] with explicit configuration.
///
/// # Errors
///
/// Returns an error if the URL cannot be parsed.
pub fn create_client_with_config(
    base_url: impl AsRef<str>,
    config: ClientConfig,
) -> Result<ApiClient<HyperClient>> {
    let http = default_stack(&config).build();
    Ok(ApiClient::new(http, base_url)?.with_config(config))
}

/// Logging outermost, then retries, so one log line covers every attempt.
fn default_stack(config: &ClientConfig) -> HyperClientBuilder {
    let retry = RetryPolicy::new(config.max_retries).with_backoff_factor(config.backoff_factor);
    HyperClient::builder()
        .config(config.clone())
        .with_logging()
        .with_retry_policy(retry)
}
