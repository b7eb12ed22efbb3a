//! Response caching.
//!
//! The [`Cache`] trait is a byte store with optional per-entry TTL. Three
//! backends ship with the crate:
//!
//! - [`MemoryCache`] - in-process LRU map
//! - [`FileCache`] - one file per key in a directory
//! - [`RemoteCache`] - adapter over any [`KeyValueStore`]
//!
//! [`ApiClient`](crate::ApiClient) stores whole responses in the cache using
//! [`encode_response`], keyed by [`cache_key`].

use std::time::Duration;

use base64::Engine;
use bytes::Bytes;
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Error, Headers, Request, Response, Result};

mod file;
mod memory;
mod remote;

pub use file::FileCache;
pub use memory::MemoryCache;
pub use remote::{KeyValueStore, RemoteCache};

/// Byte store with optional TTL.
///
/// Expired entries behave exactly like absent ones. Implementations must be
/// safe to share between tasks.
pub trait Cache: Send + Sync {
    /// Value stored under `key`, if present and not expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails; an absent key is `Ok(None)`.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>>>;

    /// Store `value` under `key`; `None` TTL means no expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> BoxFuture<'a, Result<()>>;

    /// Remove `key`; removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Remove every entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn clear(&self) -> BoxFuture<'_, Result<()>>;
}

impl<T: Cache + ?Sized> Cache for std::sync::Arc<T> {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Bytes>>> {
        (**self).get(key)
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> BoxFuture<'a, Result<()>> {
        (**self).set(key, value, ttl)
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        (**self).delete(key)
    }

    fn clear(&self) -> BoxFuture<'_, Result<()>> {
        (**self).clear()
    }
}

// ============================================================================
// Cache keys
// ============================================================================

/// Deterministic key for a request.
///
/// Format: `METHOD <normalized url>` followed by `#<sha256>` of the selected
/// headers when any of them is present. The URL is normalized by sorting its
/// query pairs and dropping the fragment, so `?b=2&a=1` and `?a=1&b=2` share
/// an entry. Header names are matched case-insensitively.
#[must_use]
pub fn cache_key<B>(request: &Request<B>, relevant_headers: &[String]) -> String {
    let mut url = request.url().clone();
    url.set_fragment(None);

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    if pairs.is_empty() {
        url.set_query(None);
    } else {
        pairs.sort();
        url.query_pairs_mut().clear().extend_pairs(&pairs);
    }

    let mut key = format!("{} {url}", request.method());

    let mut selected: Vec<(String, &str)> = relevant_headers
        .iter()
        .filter_map(|name| {
            let name = name.to_ascii_lowercase();
            request.header(&name).map(|value| (name, value))
        })
        .collect();
    if !selected.is_empty() {
        selected.sort_unstable();
        let mut hasher = Sha256::new();
        for (name, value) in selected {
            hasher.update(name.as_bytes());
            hasher.update(b":");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        key.push('#');
        key.push_str(&hex(&hasher.finalize()));
    }

    key
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

// ============================================================================
// Response envelope
// ============================================================================

#[derive(Serialize, Deserialize)]
struct Envelope {
    status: u16,
    headers: Headers,
    body: String,
}

/// Serialize a response for storage: JSON `{status, headers, body}` with a base64 body.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn encode_response(response: &Response<Bytes>) -> Result<Bytes> {
    let envelope = Envelope {
        status: response.status(),
        headers: response.headers().clone(),
        body: base64::engine::general_purpose::STANDARD.encode(response.body()),
    };
    crate::to_json(&envelope)
}

/// Inverse of [`encode_response`].
///
/// # Errors
///
/// Returns [`Error::Cache`] if the bytes are not a valid envelope.
pub fn decode_response(bytes: &[u8]) -> Result<Response<Bytes>> {
    let envelope: Envelope = crate::from_json(bytes)
        .map_err(|e| Error::cache(format!("corrupt cached response: {e}")))?;
    let body = base64::engine::general_purpose::STANDARD
        .decode(envelope.body)
        .map_err(|e| Error::cache(format!("corrupt cached body: {e}")))?;
    Ok(Response::new(
        envelope.status,
        envelope.headers,
        Bytes::from(body),
    ))
}

// ============================================================================
// Cache-Control
// ============================================================================

/// The `Cache-Control` directives relevant to a client-side cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheControl {
    /// `no-store`
    pub no_store: bool,
    /// `no-cache`
    pub no_cache: bool,
    /// `private`
    pub private: bool,
    /// `max-age=<seconds>`
    pub max_age: Option<Duration>,
}

impl CacheControl {
    /// Parse a `Cache-Control` header value. Unknown directives are ignored.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let mut control = Self::default();
        for directive in value.split(',') {
            let directive = directive.trim();
            let (name, argument) = directive
                .split_once('=')
                .map_or((directive, None), |(name, arg)| {
                    (name.trim(), Some(arg.trim().trim_matches('"')))
                });
            match name.to_ascii_lowercase().as_str() {
                "no-store" => control.no_store = true,
                "no-cache" => control.no_cache = true,
                "private" => control.private = true,
                "max-age" => {
                    control.max_age = argument
                        .and_then(|seconds| seconds.parse::<u64>().ok())
                        .map(Duration::from_secs);
                }
                _ => {}
            }
        }
        control
    }

    /// Directives of a response, default when the header is absent.
    #[must_use]
    pub fn from_response<B>(response: &Response<B>) -> Self {
        response
            .header("cache-control")
            .map(Self::parse)
            .unwrap_or_default()
    }

    /// The response may be stored at all.
    #[must_use]
    pub const fn is_storable(&self) -> bool {
        !(self.no_store || self.no_cache || self.private)
    }

    /// TTL to store with: `max-age` when present, otherwise `default`.
    #[must_use]
    pub fn ttl(&self, default: Option<Duration>) -> Option<Duration> {
        self.max_age.or(default)
    }
}

#[cfg(test)]
mod tests {
    use tandem_core::Method;

    use super::*;

    fn get(url: &str) -> Request<Bytes> {
        Request::builder(Method::Get, url::Url::parse(url).expect("valid url")).build()
    }

    #[test]
    fn key_sorts_query_and_drops_fragment() {
        let a = cache_key(&get("https://API.example.com/items?b=2&a=1#top"), &[]);
        let b = cache_key(&get("https://api.example.com/items?a=1&b=2"), &[]);
        assert_eq!(a, b);
        assert_eq!(a, "GET https://api.example.com/items?a=1&b=2");
    }

    #[test]
    fn key_without_query_has_no_question_mark() {
        assert_eq!(
            cache_key(&get("https://api.example.com/items?"), &[]),
            "GET https://api.example.com/items"
        );
    }

    #[test]
    fn key_differs_by_method() {
        let url = url::Url::parse("https://api.example.com/items").expect("valid url");
        let head = Request::<Bytes>::builder(Method::Head, url).build();
        assert_ne!(
            cache_key(&head, &[]),
            cache_key(&get("https://api.example.com/items"), &[])
        );
    }

    #[test]
    fn key_includes_relevant_headers_only() {
        let relevant = vec!["Accept-Language".to_string()];
        let url = url::Url::parse("https://api.example.com/items").expect("valid url");

        let fr = Request::<Bytes>::builder(Method::Get, url.clone())
            .header("accept-language", "fr")
            .header("X-Trace", "1")
            .build();
        let fr_other_trace = Request::<Bytes>::builder(Method::Get, url.clone())
            .header("Accept-Language", "fr")
            .header("X-Trace", "2")
            .build();
        let en = Request::<Bytes>::builder(Method::Get, url)
            .header("Accept-Language", "en")
            .build();

        assert_eq!(cache_key(&fr, &relevant), cache_key(&fr_other_trace, &relevant));
        assert_ne!(cache_key(&fr, &relevant), cache_key(&en, &relevant));
        assert!(cache_key(&fr, &relevant).contains('#'));
    }

    #[test]
    fn envelope_preserves_response() {
        let response = Response::from_status(203)
            .with_header("ETag", "\"v1\"")
            .with_body(Bytes::from_static(&[0, 159, 146, 150]));

        let encoded = encode_response(&response).expect("encode");
        let decoded = decode_response(&encoded).expect("decode");
        assert_eq!(decoded, response);
    }

    #[test]
    fn corrupt_envelope_is_cache_error() {
        let err = decode_response(b"{not json").expect_err("corrupt");
        assert_eq!(err.code(), "cache_error");
    }

    #[test]
    fn cache_control_directives() {
        let control = CacheControl::parse("public, max-age=\"120\"");
        assert!(control.is_storable());
        assert_eq!(control.max_age, Some(Duration::from_secs(120)));
        assert_eq!(control.ttl(None), Some(Duration::from_secs(120)));

        assert!(!CacheControl::parse("no-store").is_storable());
        assert!(!CacheControl::parse("No-Cache").is_storable());
        assert!(!CacheControl::parse("private, max-age=60").is_storable());

        let default = Some(Duration::from_secs(5));
        assert_eq!(CacheControl::default().ttl(default), default);
    }
}
