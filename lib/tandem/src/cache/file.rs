//! Cache persisted as one file per entry.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{Cache, hex};
use crate::{Error, Result};

/// On-disk record.
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    /// Unix milliseconds, `None` for no expiry.
    expires_at: Option<i64>,
    /// Base64 value.
    value: String,
}

/// Cache storing one file per key under a directory.
///
/// File names are the SHA-256 of the key, so any key is a valid name.
/// Writes go to a temporary file which is then renamed over the target, so
/// readers never observe a half-written entry. Unreadable files count as
/// misses and are removed.
#[derive(Debug, Clone)]
pub struct FileCache {
    directory: PathBuf,
    default_ttl: Option<Duration>,
}

impl FileCache {
    /// Cache rooted at `directory`, created if missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cache`] if the directory cannot be created.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory).map_err(|e| io_error(&directory, &e))?;
        Ok(Self {
            directory,
            default_ttl: None,
        })
    }

    /// TTL applied when `set` is called without one.
    #[must_use]
    pub const fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Directory holding the entries.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.directory.join(hex(&Sha256::digest(key.as_bytes())))
    }

    async fn read(&self, key: &str) -> Result<Option<Bytes>> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path, &e)),
        };

        let decoded = serde_json::from_slice::<StoredEntry>(&raw)
            .ok()
            .and_then(|entry| {
                let value = base64::engine::general_purpose::STANDARD
                    .decode(entry.value)
                    .ok()?;
                Some((entry.expires_at, value))
            });

        match decoded {
            Some((expires_at, value)) => {
                if expires_at.is_some_and(|at| chrono::Utc::now().timestamp_millis() >= at) {
                    remove_quietly(&path).await;
                    return Ok(None);
                }
                Ok(Some(Bytes::from(value)))
            }
            None => {
                tracing::warn!(path = %path.display(), "removing corrupt cache file");
                remove_quietly(&path).await;
                Ok(None)
            }
        }
    }

    async fn write(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.or(self.default_ttl).map(|ttl| {
            let millis = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
            chrono::Utc::now().timestamp_millis().saturating_add(millis)
        });
        let entry = StoredEntry {
            expires_at,
            value: base64::engine::general_purpose::STANDARD.encode(value),
        };
        let contents = serde_json::to_vec(&entry)?;

        let path = self.path_for(key);
        let temporary = path.with_extension(format!("{:016x}.tmp", fastrand::u64(..)));
        tokio::fs::write(&temporary, contents)
            .await
            .map_err(|e| io_error(&temporary, &e))?;
        if let Err(e) = tokio::fs::rename(&temporary, &path).await {
            remove_quietly(&temporary).await;
            return Err(io_error(&path, &e));
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, &e)),
        }
    }

    async fn remove_all(&self) -> Result<()> {
        let mut entries = tokio::fs::read_dir(&self.directory)
            .await
            .map_err(|e| io_error(&self.directory, &e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_error(&self.directory, &e))?
        {
            let name = entry.file_name();
            let owned = name.to_str().is_some_and(|name| {
                let stem = name.split('.').next().unwrap_or_default();
                stem.len() == 64 && stem.bytes().all(|b| b.is_ascii_hexdigit())
            });
            if owned {
                remove_quietly(&entry.path()).await;
            }
        }
        Ok(())
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            tracing::debug!(path = %path.display(), error = %e, "failed to remove cache file");
        }
    }
}

fn io_error(path: &Path, err: &std::io::Error) -> Error {
    Error::cache(format!("{}: {err}", path.display()))
}

impl Cache for FileCache {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>>> {
        Box::pin(self.read(key))
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.write(key, &value, ttl).await })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.remove(key))
    }

    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.remove_all())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileCache::new(dir.path()).expect("cache");

        assert_eq!(cache.get("GET https://x/a").await.expect("get"), None);
        cache
            .set("GET https://x/a", Bytes::from("payload"), None)
            .await
            .expect("set");
        assert_eq!(
            cache.get("GET https://x/a").await.expect("get"),
            Some(Bytes::from("payload"))
        );

        cache.delete("GET https://x/a").await.expect("delete");
        assert_eq!(cache.get("GET https://x/a").await.expect("get"), None);
    }

    #[tokio::test]
    async fn survives_a_new_instance() {
        let dir = tempfile::tempdir().expect("tempdir");
        FileCache::new(dir.path())
            .expect("cache")
            .set("k", Bytes::from("v"), Some(Duration::from_secs(3600)))
            .await
            .expect("set");

        let reopened = FileCache::new(dir.path()).expect("cache");
        assert_eq!(reopened.get("k").await.expect("get"), Some(Bytes::from("v")));
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss_and_removed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileCache::new(dir.path()).expect("cache");
        cache
            .set("k", Bytes::from("v"), Some(Duration::ZERO))
            .await
            .expect("set");

        assert_eq!(cache.get("k").await.expect("get"), None);
        assert!(!cache.path_for("k").exists());
    }

    #[tokio::test]
    async fn sub_second_ttl_is_honored() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileCache::new(dir.path()).expect("cache");
        cache
            .set("k", Bytes::from("v"), Some(Duration::from_millis(900)))
            .await
            .expect("set");
        assert_eq!(cache.get("k").await.expect("get"), Some(Bytes::from("v")));

        cache
            .set("short", Bytes::from("v"), Some(Duration::from_millis(200)))
            .await
            .expect("set");
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(cache.get("short").await.expect("get"), None);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileCache::new(dir.path()).expect("cache");
        std::fs::write(cache.path_for("k"), b"garbage").expect("write");

        assert_eq!(cache.get("k").await.expect("get"), None);
        assert!(!cache.path_for("k").exists());
    }

    #[tokio::test]
    async fn clear_only_touches_cache_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = FileCache::new(dir.path()).expect("cache");
        cache.set("a", Bytes::from("1"), None).await.expect("set");
        cache.set("b", Bytes::from("2"), None).await.expect("set");
        let foreign = dir.path().join("README");
        std::fs::write(&foreign, b"keep me").expect("write");

        cache.clear().await.expect("clear");

        assert_eq!(cache.get("a").await.expect("get"), None);
        assert_eq!(cache.get("b").await.expect("get"), None);
        assert!(foreign.exists());
    }
}
