//! Adapter from an external key-value store to [`Cache`](super::Cache).

use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;

use super::Cache;
use crate::Result;

/// Minimal interface of a remote key-value store (Redis, Memcached, ...).
///
/// Implementations translate backend failures into [`crate::Error::Cache`].
pub trait KeyValueStore: Send + Sync {
    /// Value under `key`, `None` when absent or expired.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>>>;

    /// Store `value`, expiring after `ttl` when given.
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> BoxFuture<'a, Result<()>>;

    /// Remove `key`.
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Remove every key starting with `prefix`.
    fn delete_prefix<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<()>>;
}

/// [`Cache`] backed by a remote [`KeyValueStore`].
///
/// Keys are namespaced with a prefix so several clients can share a store,
/// and [`Cache::clear`] only removes this namespace.
#[derive(Debug, Clone)]
pub struct RemoteCache<S> {
    store: S,
    prefix: String,
}

impl<S: KeyValueStore> RemoteCache<S> {
    /// Default namespace prefix.
    pub const DEFAULT_PREFIX: &'static str = "tandem:";

    /// Wrap `store` using [`RemoteCache::DEFAULT_PREFIX`].
    #[must_use]
    pub fn new(store: S) -> Self {
        Self::with_prefix(store, Self::DEFAULT_PREFIX)
    }

    /// Wrap `store` with a custom namespace prefix.
    #[must_use]
    pub fn with_prefix(store: S, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// The wrapped store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

impl<S: KeyValueStore> Cache for RemoteCache<S> {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>>> {
        Box::pin(async move { self.store.get(&self.namespaced(key)).await })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.store.set(&self.namespaced(key), value, ttl).await })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.store.delete(&self.namespaced(key)).await })
    }

    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        self.store.delete_prefix(&self.prefix)
    }
}
