//! Ordered, case-insensitive header multi-map.

use serde::{Deserialize, Serialize};

/// HTTP headers.
///
/// Keeps insertion order and the original spelling of names, while lookups
/// ignore ASCII case. A name may carry several values.
///
/// # Example
///
/// ```
/// use tandem_core::Headers;
///
/// let mut headers = Headers::new();
/// headers.insert("Content-Type", "application/json");
/// headers.append("Set-Cookie", "a=1");
/// headers.append("set-cookie", "b=2");
///
/// assert_eq!(headers.get("content-type"), Some("application/json"));
/// assert_eq!(headers.get_all("SET-COOKIE").collect::<Vec<_>>(), ["a=1", "b=2"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Empty header map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Number of header lines (a name with two values counts twice).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No header at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First value for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Every value for `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether `name` is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace every value of `name` with `value`.
    ///
    /// The first occurrence keeps its position; when absent the header is appended.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some(index) => {
                if let Some(entry) = self.entries.get_mut(index) {
                    entry.1 = value;
                }
                let mut seen = 0_usize;
                self.entries.retain(|(key, _)| {
                    if key.eq_ignore_ascii_case(&name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.entries.push((name, value)),
        }
    }

    /// Insert only when `name` is not already present.
    pub fn insert_if_absent(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if !self.contains(&name) {
            self.entries.push((name, value.into()));
        }
    }

    /// Add a value without touching existing ones.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Remove every value of `name`, returning the first one.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        let mut removed = None;
        self.entries.retain(|(key, value)| {
            if key.eq_ignore_ascii_case(name) {
                if removed.is_none() {
                    removed = Some(value.clone());
                }
                false
            } else {
                true
            }
        });
        removed
    }

    /// Iterate over `(name, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Add every pair of `other`, replacing values of the same name.
    pub fn extend(&mut self, other: impl IntoIterator<Item = (String, String)>) {
        for (name, value) in other {
            self.insert(name, value);
        }
    }

    /// Convert to an `http::HeaderMap`, skipping names or values that are not valid.
    #[must_use]
    pub fn to_header_map(&self) -> http::HeaderMap {
        let mut map = http::HeaderMap::with_capacity(self.entries.len());
        for (name, value) in &self.entries {
            if let (Ok(name), Ok(value)) = (
                http::HeaderName::from_bytes(name.as_bytes()),
                http::HeaderValue::from_str(value),
            ) {
                map.append(name, value);
            }
        }
        map
    }
}

impl From<&http::HeaderMap> for Headers {
    fn from(map: &http::HeaderMap) -> Self {
        let entries = map
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();
        Self { entries }
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

impl IntoIterator for Headers {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_case_insensitive() {
        let mut headers = Headers::new();
        headers.insert("X-Request-Id", "abc");
        assert_eq!(headers.get("x-request-id"), Some("abc"));
        assert!(headers.contains("X-REQUEST-ID"));
    }

    #[test]
    fn insert_replaces_all_values_in_place() {
        let mut headers: Headers = [("Accept", "a"), ("Vary", "x"), ("accept", "b")]
            .into_iter()
            .collect();
        headers.insert("ACCEPT", "c");

        let pairs: Vec<_> = headers.iter().collect();
        assert_eq!(pairs, [("Accept", "c"), ("Vary", "x")]);
    }

    #[test]
    fn append_keeps_order() {
        let mut headers = Headers::new();
        headers.append("Link", "1");
        headers.append("Other", "x");
        headers.append("link", "2");
        assert_eq!(headers.get_all("LINK").collect::<Vec<_>>(), ["1", "2"]);
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn remove_returns_first_value() {
        let mut headers: Headers = [("A", "1"), ("a", "2"), ("B", "3")].into_iter().collect();
        assert_eq!(headers.remove("a"), Some("1".to_string()));
        assert!(!headers.contains("A"));
        assert_eq!(headers.remove("missing"), None);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn insert_if_absent_does_not_override() {
        let mut headers = Headers::new();
        headers.insert("User-Agent", "custom");
        headers.insert_if_absent("user-agent", "default");
        headers.insert_if_absent("Accept", "*/*");
        assert_eq!(headers.get("User-Agent"), Some("custom"));
        assert_eq!(headers.get("Accept"), Some("*/*"));
    }

    #[test]
    fn header_map_round_trip_skips_invalid_entries() {
        let headers: Headers = [("Content-Type", "text/plain"), ("bad name", "x")]
            .into_iter()
            .collect();
        let map = headers.to_header_map();
        assert_eq!(map.len(), 1);

        let back = Headers::from(&map);
        assert_eq!(back.get("content-type"), Some("text/plain"));
    }
}
