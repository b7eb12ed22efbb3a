//! API key injected as a header or a query parameter.

use bytes::Bytes;
use futures_util::future::BoxFuture;

use super::AuthProvider;
use crate::{Request, Result};

/// Default header carrying the key.
const DEFAULT_HEADER: &str = "X-API-Key";

/// Where the API key is placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiKeyLocation {
    /// Request header with the given name.
    Header(String),
    /// Query parameter with the given name.
    Query(String),
}

/// API key authentication.
///
/// ```
/// use tandem::auth::ApiKeyAuth;
///
/// let in_header = ApiKeyAuth::new("k-123");
/// let in_query = ApiKeyAuth::query("api_key", "k-123");
/// ```
#[derive(Clone)]
pub struct ApiKeyAuth {
    key: String,
    location: ApiKeyLocation,
}

impl std::fmt::Debug for ApiKeyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuth")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl ApiKeyAuth {
    /// Send the key in the `X-API-Key` header.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self::header(DEFAULT_HEADER, key)
    }

    /// Send the key in a custom header.
    #[must_use]
    pub fn header(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            location: ApiKeyLocation::Header(name.into()),
        }
    }

    /// Send the key as a query parameter.
    #[must_use]
    pub fn query(param: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            location: ApiKeyLocation::Query(param.into()),
        }
    }

    /// Where the key is placed.
    #[must_use]
    pub fn location(&self) -> &ApiKeyLocation {
        &self.location
    }
}

impl AuthProvider for ApiKeyAuth {
    fn apply(&self, mut request: Request<Bytes>) -> BoxFuture<'_, Result<Request<Bytes>>> {
        match &self.location {
            ApiKeyLocation::Header(name) => {
                request.headers_mut().insert(name.as_str(), self.key.as_str());
            }
            ApiKeyLocation::Query(param) => {
                request
                    .url_mut()
                    .query_pairs_mut()
                    .append_pair(param, &self.key);
            }
        }
        Box::pin(async move { Ok(request) })
    }
}
