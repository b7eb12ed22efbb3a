//! Client configuration types.

use std::time::Duration;

/// Configuration for the HTTP client and [`ApiClient`](crate::ApiClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout duration.
    pub timeout: Duration,
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Maximum idle connections per host.
    pub pool_idle_per_host: usize,
    /// Idle connection timeout.
    pub pool_idle_timeout: Duration,
    /// Retries applied by [`create_client`](crate::create_client).
    pub max_retries: u32,
    /// Base delay of the exponential backoff between retries.
    pub backoff_factor: Duration,
    /// TTL for cached responses without a `max-age` directive.
    pub cache_ttl: Option<Duration>,
    /// Surface cache backend failures instead of degrading to a miss.
    pub strict_cache: bool,
    /// `User-Agent` sent when the request has none.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool_idle_per_host: 32,
            pool_idle_timeout: Duration::from_secs(90),
            max_retries: 3,
            backoff_factor: Duration::from_millis(500),
            cache_ttl: Some(Duration::from_secs(300)),
            strict_cache: false,
            user_agent: concat!("tandem/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder {
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    pool_idle_per_host: Option<usize>,
    pool_idle_timeout: Option<Duration>,
    max_retries: Option<u32>,
    backoff_factor: Option<Duration>,
    cache_ttl: Option<Option<Duration>>,
    strict_cache: Option<bool>,
    user_agent: Option<String>,
}

impl ClientConfigBuilder {
    /// Set the request timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the maximum idle connections per host.
    #[must_use]
    pub const fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.pool_idle_per_host = Some(count);
        self
    }

    /// Set the idle connection timeout.
    #[must_use]
    pub const fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Set the number of retries after the first attempt.
    #[must_use]
    pub const fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Set the base backoff delay (doubled on each retry).
    #[must_use]
    pub const fn backoff_factor(mut self, factor: Duration) -> Self {
        self.backoff_factor = Some(factor);
        self
    }

    /// Set the default cache TTL; `None` keeps entries until evicted.
    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Propagate cache failures as [`Error::Cache`](crate::Error::Cache).
    #[must_use]
    pub const fn strict_cache(mut self, strict: bool) -> Self {
        self.strict_cache = Some(strict);
        self
    }

    /// Set the default `User-Agent`.
    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> ClientConfig {
        let defaults = ClientConfig::default();
        ClientConfig {
            timeout: self.timeout.unwrap_or(defaults.timeout),
            connect_timeout: self.connect_timeout.unwrap_or(defaults.connect_timeout),
            pool_idle_per_host: self
                .pool_idle_per_host
                .unwrap_or(defaults.pool_idle_per_host),
            pool_idle_timeout: self.pool_idle_timeout.unwrap_or(defaults.pool_idle_timeout),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            backoff_factor: self.backoff_factor.unwrap_or(defaults.backoff_factor),
            cache_ttl: self.cache_ttl.unwrap_or(defaults.cache_ttl),
            strict_cache: self.strict_cache.unwrap_or(defaults.strict_cache),
            user_agent: self.user_agent.unwrap_or(defaults.user_agent),
        }
    }
}
