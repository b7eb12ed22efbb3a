//! Media types and the serde codecs used for message bodies.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::{Error, Result};

/// Media types the client and the server produce or inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// `application/json`, also matched by `+json` suffixes on parse.
    Json,
    /// `application/x-www-form-urlencoded`
    FormUrlEncoded,
    /// `text/plain; charset=utf-8`
    Text,
    /// `application/octet-stream`
    OctetStream,
}

impl ContentType {
    /// Header value to send.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::FormUrlEncoded => "application/x-www-form-urlencoded",
            Self::Text => "text/plain; charset=utf-8",
            Self::OctetStream => "application/octet-stream",
        }
    }

    /// Classify a `Content-Type` header value, ignoring parameters and case.
    ///
    /// `application/problem+json` and friends count as [`ContentType::Json`].
    /// Unknown media types yield `None`.
    #[must_use]
    pub fn from_header(value: &str) -> Option<Self> {
        let essence = value.split(';').next().unwrap_or_default().trim();
        let essence = essence.to_ascii_lowercase();
        let (kind, subtype) = essence.split_once('/')?;
        match (kind, subtype) {
            ("application", "json") => Some(Self::Json),
            (_, sub) if sub.ends_with("+json") => Some(Self::Json),
            ("application", "x-www-form-urlencoded") => Some(Self::FormUrlEncoded),
            ("text", "plain") => Some(Self::Text),
            ("application", "octet-stream") => Some(Self::OctetStream),
            _ => None,
        }
    }

    /// `true` when `value` names a JSON media type.
    #[must_use]
    pub fn is_json(value: &str) -> bool {
        Self::from_header(value) == Some(Self::Json)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_header(s)
            .ok_or_else(|| Error::invalid_request(format!("unsupported media type: {s}")))
    }
}

/// Encode `value` as a JSON body.
///
/// # Errors
///
/// Fails when `value` cannot be represented as JSON, for instance a map
/// with non-string keys.
pub fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    let encoded = serde_json::to_vec(value)?;
    Ok(Bytes::from(encoded))
}

/// Encode `value` as an `application/x-www-form-urlencoded` body.
///
/// Sequences become repeated keys: `tag=a&tag=b`.
///
/// # Errors
///
/// Fails for values that are not flat structs or maps.
pub fn to_form<T: serde::Serialize + ?Sized>(value: &T) -> Result<Bytes> {
    let encoded = serde_html_form::to_string(value)?;
    Ok(Bytes::from(encoded))
}

/// Decode a JSON body.
///
/// Failures report where in the document decoding stopped, as a dotted
/// path such as `users[0].email`.
///
/// # Errors
///
/// Returns [`Error::JsonDeserialization`] for malformed JSON or a shape
/// mismatch.
pub fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut deserializer = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|err| {
        Error::json_deserialization(err.path().to_string(), err.inner().to_string())
    })
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[test]
    fn classifies_header_values() {
        assert_eq!(
            ContentType::from_header("Application/JSON; charset=utf-8"),
            Some(ContentType::Json)
        );
        assert_eq!(
            ContentType::from_header("application/problem+json"),
            Some(ContentType::Json)
        );
        assert_eq!(ContentType::from_header("text/plain"), Some(ContentType::Text));
        assert_eq!(ContentType::from_header("text/html"), None);
        assert_eq!(ContentType::from_header("garbage"), None);
        assert!(!ContentType::is_json("application/jsonp"));
    }

    #[test]
    fn parses_from_str() {
        let parsed: ContentType = "application/x-www-form-urlencoded".parse().expect("known type");
        assert_eq!(parsed, ContentType::FormUrlEncoded);
        assert!("image/png".parse::<ContentType>().is_err());
    }

    #[test]
    fn form_repeats_sequence_keys() {
        #[derive(Serialize)]
        struct NewUser<'a> {
            name: &'a str,
            tag: Vec<&'a str>,
        }

        let body = to_form(&NewUser {
            name: "Jane Smith",
            tag: vec!["admin", "ops"],
        })
        .expect("form");
        assert_eq!(body.as_ref(), b"name=Jane+Smith&tag=admin&tag=ops");
    }

    #[test]
    fn json_errors_carry_the_path() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct User {
            id: String,
            email: String,
        }

        let err = from_json::<Vec<User>>(br#"[{"id": "1", "email": "a@b.c"}, {"id": "2"}]"#)
            .expect_err("missing email");
        assert_path(&err, "1");
        assert!(err.to_string().contains("email"), "{err}");
    }

    #[test]
    fn malformed_json_is_a_deserialization_error() {
        let err = from_json::<serde_json::Value>(b"{not json").expect_err("syntax");
        assert!(matches!(err, Error::JsonDeserialization { .. }), "{err:?}");
    }

    fn assert_path(err: &Error, expected: &str) {
        match err {
            Error::JsonDeserialization { path, .. } => assert!(path.contains(expected), "{path}"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
