//! In-process LRU cache.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use lru::LruCache;
use tokio::time::Instant;

use super::Cache;
use crate::Result;

struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// In-process cache with least-recently-used eviction.
///
/// ```
/// use tandem::cache::MemoryCache;
///
/// let bounded = MemoryCache::with_max_size(100);
/// let unbounded = MemoryCache::new();
/// ```
pub struct MemoryCache {
    entries: Mutex<LruCache<String, Entry>>,
    default_ttl: Option<Duration>,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("len", &self.len())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCache {
    /// Unbounded cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(LruCache::unbounded()),
            default_ttl: None,
        }
    }

    /// Cache holding at most `max_size` entries; `0` means unbounded.
    #[must_use]
    pub fn with_max_size(max_size: usize) -> Self {
        let entries = NonZeroUsize::new(max_size).map_or_else(LruCache::unbounded, LruCache::new);
        Self {
            entries: Mutex::new(entries),
            default_ttl: None,
        }
    }

    /// TTL applied when `set` is called without one.
    #[must_use]
    pub const fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Number of stored entries, expired ones included until touched.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// No entries stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn get_sync(&self, key: &str) -> Option<Bytes> {
        let mut entries = self.lock();
        let now = Instant::now();
        if entries.peek(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.pop(key);
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }
}

impl Cache for MemoryCache {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>>> {
        let value = self.get_sync(key);
        Box::pin(async move { Ok(value) })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> BoxFuture<'a, Result<()>> {
        let expires_at = ttl.or(self.default_ttl).map(|ttl| Instant::now() + ttl);
        self.lock()
            .put(key.to_string(), Entry { value, expires_at });
        Box::pin(async { Ok(()) })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        self.lock().pop(key);
        Box::pin(async { Ok(()) })
    }

    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        self.lock().clear();
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("k").await.expect("get"), None);

        cache.set("k", Bytes::from("v"), None).await.expect("set");
        assert_eq!(cache.get("k").await.expect("get"), Some(Bytes::from("v")));

        cache.delete("k").await.expect("delete");
        assert_eq!(cache.get("k").await.expect("get"), None);
        cache.delete("k").await.expect("deleting twice is fine");
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_absent() {
        let cache = MemoryCache::new().with_default_ttl(Duration::from_secs(10));
        cache.set("short", Bytes::from("a"), Some(Duration::from_secs(1))).await.expect("set");
        cache.set("default", Bytes::from("b"), None).await.expect("set");

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("short").await.expect("get"), None);
        assert_eq!(cache.get("default").await.expect("get"), Some(Bytes::from("b")));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(cache.get("default").await.expect("get"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn evicts_least_recently_used() {
        let cache = MemoryCache::with_max_size(2);
        cache.set("a", Bytes::from("1"), None).await.expect("set");
        cache.set("b", Bytes::from("2"), None).await.expect("set");
        // Touch "a" so "b" becomes the eviction candidate.
        assert!(cache.get("a").await.expect("get").is_some());
        cache.set("c", Bytes::from("3"), None).await.expect("set");

        assert!(cache.get("a").await.expect("get").is_some());
        assert!(cache.get("b").await.expect("get").is_none());
        assert!(cache.get("c").await.expect("get").is_some());
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let cache = MemoryCache::with_max_size(0);
        cache.set("a", Bytes::from("1"), None).await.expect("set");
        cache.set("b", Bytes::from("2"), None).await.expect("set");
        cache.clear().await.expect("clear");
        assert!(cache.is_empty());
    }
}
