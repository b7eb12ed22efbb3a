//! Bearer tokens, either static or fetched from a [`TokenSource`](super::TokenSource).

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use tokio::sync::Mutex;

use super::{AuthProvider, bearer_token};
use crate::{Request, Result};

/// Async callback producing a fresh bearer token.
pub type TokenSource = Arc<dyn Fn() -> BoxFuture<'static, Result<String>> + Send + Sync>;

enum Credential {
    Static(String),
    Refreshable {
        source: TokenSource,
        current: Mutex<Option<String>>,
    },
}

/// Bearer token authentication: `Authorization: Bearer <token>`.
///
/// The token is either fixed, or obtained from a [`TokenSource`] on first
/// use and fetched again when the server rejects it.
///
/// ```
/// use tandem::auth::BearerAuth;
///
/// let fixed = BearerAuth::new("t-123");
/// let rotating = BearerAuth::refreshable(|| async { Ok("t-456".to_string()) });
/// ```
#[derive(Clone)]
pub struct BearerAuth {
    credential: Arc<Credential>,
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match *self.credential {
            Credential::Static(_) => "static",
            Credential::Refreshable { .. } => "refreshable",
        };
        f.debug_struct("BearerAuth")
            .field("kind", &kind)
            .finish_non_exhaustive()
    }
}

impl BearerAuth {
    /// Fixed token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            credential: Arc::new(Credential::Static(token.into())),
        }
    }

    /// Token produced by `source`, cached until rejected.
    #[must_use]
    pub fn from_source(source: TokenSource) -> Self {
        Self {
            credential: Arc::new(Credential::Refreshable {
                source,
                current: Mutex::new(None),
            }),
        }
    }

    /// Token produced by an async closure, cached until rejected.
    #[must_use]
    pub fn refreshable<F, Fut>(fetch: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        let source: TokenSource =
            Arc::new(move || -> BoxFuture<'static, Result<String>> { Box::pin(fetch()) });
        Self::from_source(source)
    }

    async fn token(&self) -> Result<String> {
        match &*self.credential {
            Credential::Static(token) => Ok(token.clone()),
            Credential::Refreshable { source, current } => {
                let mut current = current.lock().await;
                if let Some(token) = current.as_ref() {
                    return Ok(token.clone());
                }
                let token = source().await?;
                *current = Some(token.clone());
                Ok(token)
            }
        }
    }
}

impl AuthProvider for BearerAuth {
    fn apply(&self, mut request: Request<Bytes>) -> BoxFuture<'_, Result<Request<Bytes>>> {
        Box::pin(async move {
            let token = self.token().await?;
            request
                .headers_mut()
                .insert("Authorization", format!("Bearer {token}"));
            Ok(request)
        })
    }

    fn invalidate<'a>(&'a self, request: &'a Request<Bytes>) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let Credential::Refreshable { source, current } = &*self.credential else {
                return Ok(false);
            };

            let rejected = bearer_token(request);
            let mut current = current.lock().await;
            if current.is_some() && current.as_deref() != rejected {
                // Someone else already replaced the rejected token.
                return Ok(true);
            }

            tracing::debug!("bearer token rejected, fetching a new one");
            let token = source().await?;
            let changed = Some(token.as_str()) != rejected;
            *current = Some(token);
            Ok(changed)
        })
    }
}
