//! Compression middleware.
//!
//! Outbound, request bodies of at least `min_size` bytes are gzip-compressed
//! and `Accept-Encoding` is advertised when the caller did not set it.
//! Inbound, bodies encoded with gzip, deflate, br (brotli) or zstd are
//! decoded, `Content-Encoding` is dropped and `Content-Length` is fixed.

use std::future::Future;
use std::io::{Read, Write};
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::{Layer, Service};
use tracing::trace;

use crate::{Error, Request, Response, Result};

/// Request bodies smaller than this are sent as-is.
pub const DEFAULT_MIN_COMPRESS_SIZE: usize = 1024;

const ACCEPT_ENCODING: &str = "gzip, deflate, br, zstd";

/// Layer that compresses requests and decompresses responses.
///
/// # Example
///
/// ```ignore
/// use tandem::middleware::CompressionLayer;
///
/// // Compress any body of 4 KiB or more
/// let layer = CompressionLayer::new().min_size(4096);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CompressionLayer {
    min_size: usize,
    compress_requests: bool,
}

impl Default for CompressionLayer {
    fn default() -> Self {
        Self {
            min_size: DEFAULT_MIN_COMPRESS_SIZE,
            compress_requests: true,
        }
    }
}

impl CompressionLayer {
    /// Create a new compression layer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Smallest request body that gets compressed.
    #[must_use]
    pub const fn min_size(mut self, bytes: usize) -> Self {
        self.min_size = bytes;
        self
    }

    /// Only decompress responses; never touch request bodies.
    #[must_use]
    pub const fn decompress_only(mut self) -> Self {
        self.compress_requests = false;
        self
    }
}

impl<S> Layer<S> for CompressionLayer {
    type Service = Compression<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Compression {
            inner,
            settings: *self,
        }
    }
}

/// Service that compresses requests and decompresses responses.
#[derive(Debug, Clone)]
pub struct Compression<S> {
    inner: S,
    settings: CompressionLayer,
}

impl<S> Compression<S> {
    /// Create a new compression service wrapping the given service.
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            settings: CompressionLayer::default(),
        }
    }
}

fn gzip(body: &[u8]) -> Result<Bytes> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder
        .write_all(body)
        .and_then(|()| encoder.finish())
        .map(Bytes::from)
        .map_err(|e| Error::invalid_request(format!("gzip compression failed: {e}")))
}

fn read_all(mut reader: impl Read, encoding: &str) -> Result<Bytes> {
    let mut decoded = Vec::new();
    reader
        .read_to_end(&mut decoded)
        .map_err(|e| Error::invalid_request(format!("{encoding} decompression failed: {e}")))?;
    Ok(Bytes::from(decoded))
}

/// Decode one content coding. `None` for codings this layer does not know.
fn decompress(encoding: &str, body: &Bytes) -> Option<Result<Bytes>> {
    let decoded = match encoding {
        "gzip" | "x-gzip" => read_all(flate2::read::GzDecoder::new(body.as_ref()), "gzip"),
        "deflate" => read_all(flate2::read::ZlibDecoder::new(body.as_ref()), "deflate"),
        "br" => read_all(brotli::Decompressor::new(body.as_ref(), 4096), "brotli"),
        "zstd" => zstd::decode_all(body.as_ref())
            .map(Bytes::from)
            .map_err(|e| Error::invalid_request(format!("zstd decompression failed: {e}"))),
        "identity" | "" => Ok(body.clone()),
        _ => return None,
    };
    Some(decoded)
}

/// Undo every coding listed in `Content-Encoding`, last applied first.
fn decode_response(response: Response<Bytes>) -> Result<Response<Bytes>> {
    let Some(header) = response.header("content-encoding") else {
        return Ok(response);
    };
    let codings: Vec<String> = header
        .split(',')
        .map(|coding| coding.trim().to_ascii_lowercase())
        .collect();

    let mut body = response.body().clone();
    for coding in codings.iter().rev() {
        match decompress(coding, &body) {
            Some(decoded) => body = decoded?,
            // Leave the response untouched for the caller to deal with.
            None => return Ok(response),
        }
    }

    let (status, mut headers, _) = response.into_parts();
    headers.remove("content-encoding");
    headers.insert("content-length", body.len().to_string());
    Ok(Response::new(status, headers, body))
}

impl<S> Service<Request<Bytes>> for Compression<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<Bytes>) -> Self::Future {
        let settings = self.settings;
        let mut inner = self.inner.clone();

        Box::pin(async move {
            request
                .headers_mut()
                .insert_if_absent("accept-encoding", ACCEPT_ENCODING);

            let compressible = settings.compress_requests
                && !request.headers().contains("content-encoding")
                && request.body().is_some_and(|body| body.len() >= settings.min_size);
            if compressible {
                if let Some(body) = request.body() {
                    let compressed = gzip(body)?;
                    trace!(
                        original = body.len(),
                        compressed = compressed.len(),
                        "compressed request body"
                    );
                    let headers = request.headers_mut();
                    headers.insert("content-encoding", "gzip");
                    headers.insert("content-length", compressed.len().to_string());
                    request.set_body(Some(compressed));
                }
            }

            let response = inner.call(request).await?;
            decode_response(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use tower::ServiceExt;

    use super::*;
    use crate::Method;
    use crate::middleware::testing::{MockService, get};

    fn gunzip(body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        flate2::read::GzDecoder::new(body)
            .read_to_end(&mut out)
            .expect("gunzip");
        out
    }

    fn post(body: &'static [u8]) -> Request<Bytes> {
        let url = url::Url::parse("https://example.com/upload").expect("valid url");
        Request::builder(Method::Post, url)
            .body(Bytes::from_static(body))
            .build()
    }

    #[test]
    fn identity_and_missing_header_are_untouched() {
        let response = Response::from_status(200).with_body("plain");
        assert_eq!(decode_response(response.clone()).expect("decode"), response);

        let identity = response.with_header("Content-Encoding", "identity");
        let decoded = decode_response(identity).expect("decode");
        assert_eq!(decoded.body().as_ref(), b"plain");
        assert_eq!(decoded.header("content-encoding"), None);
    }

    #[test]
    fn unknown_coding_is_left_alone() {
        let response = Response::from_status(200)
            .with_header("Content-Encoding", "compress")
            .with_body("???");
        assert_eq!(decode_response(response.clone()).expect("decode"), response);
    }

    #[test]
    fn decodes_every_supported_coding() {
        let original = b"hello world hello world";

        let gz = gzip(original).expect("gzip");

        let mut zlib = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        zlib.write_all(original).expect("write");
        let deflate = zlib.finish().expect("finish");

        let mut br = Vec::new();
        let params = brotli::enc::BrotliEncoderParams::default();
        brotli::BrotliCompress(&mut original.as_ref(), &mut br, &params).expect("compress");

        let zst = zstd::encode_all(original.as_ref(), 3).expect("compress");

        for (coding, body) in [
            ("gzip", gz.to_vec()),
            ("deflate", deflate),
            ("br", br),
            ("zstd", zst),
        ] {
            let response = Response::from_status(200)
                .with_header("Content-Encoding", coding)
                .with_body(body);
            let decoded = decode_response(response).expect(coding);
            assert_eq!(decoded.body().as_ref(), original, "{coding}");
            assert_eq!(decoded.header("content-length"), Some("23"));
            assert_eq!(decoded.header("content-encoding"), None);
        }
    }

    #[test]
    fn stacked_codings_are_undone_in_reverse() {
        let inner = gzip(b"layered").expect("gzip");
        let outer = zstd::encode_all(inner.as_ref(), 3).expect("compress");
        let response = Response::from_status(200)
            .with_header("Content-Encoding", "gzip, zstd")
            .with_body(outer);

        let decoded = decode_response(response).expect("decode");
        assert_eq!(decoded.body().as_ref(), b"layered");
    }

    #[test]
    fn corrupt_body_is_an_error() {
        let response = Response::from_status(200)
            .with_header("Content-Encoding", "gzip")
            .with_body("not gzip at all");
        assert!(decode_response(response).is_err());
    }

    #[tokio::test]
    async fn advertises_accept_encoding() {
        let mock = MockService::status(200);
        let service = CompressionLayer::new().layer(mock.clone());

        service.oneshot(get("https://example.com")).await.expect("response");

        assert_eq!(mock.requests()[0].header("accept-encoding"), Some(ACCEPT_ENCODING));
    }

    #[tokio::test]
    async fn keeps_caller_accept_encoding() {
        let mock = MockService::status(200);
        let service = CompressionLayer::new().layer(mock.clone());
        let url = url::Url::parse("https://example.com").expect("valid url");
        let request = Request::builder(Method::Get, url)
            .header("Accept-Encoding", "identity")
            .build();

        service.oneshot(request).await.expect("response");

        assert_eq!(mock.requests()[0].header("accept-encoding"), Some("identity"));
    }

    #[tokio::test]
    async fn compresses_large_bodies_only() {
        let mock = MockService::status(200);
        let service = CompressionLayer::new().min_size(8).layer(mock.clone());

        service.clone().oneshot(post(b"tiny")).await.expect("response");
        service
            .oneshot(post(b"large enough payload"))
            .await
            .expect("response");

        let seen = mock.requests();
        assert_eq!(seen[0].header("content-encoding"), None);
        assert_eq!(seen[0].body().map(|b| b.to_vec()), Some(b"tiny".to_vec()));

        assert_eq!(seen[1].header("content-encoding"), Some("gzip"));
        let sent = seen[1].body().expect("body");
        assert_eq!(gunzip(sent), b"large enough payload");
    }

    #[tokio::test]
    async fn decompress_only_leaves_bodies() {
        let mock = MockService::status(200);
        let service = CompressionLayer::new()
            .min_size(1)
            .decompress_only()
            .layer(mock.clone());

        service.oneshot(post(b"payload")).await.expect("response");

        assert_eq!(mock.requests()[0].header("content-encoding"), None);
    }
}
