//! Middleware integration tests against wiremock.

use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use assert2::{check, let_assert};
use bytes::Bytes;
use tandem::middleware::{
    CompressionLayer, RateLimitLayer, RateLimitMode, RetryLayer, RetryPolicy, TimingInfo,
    TimingLayer,
};
use tandem::tower::{Layer, Service};
use tandem::{Error, HttpClient, HyperClient, Method, Request, Response, Result};
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn get(server: &MockServer, route: &str) -> Request<Bytes> {
    let url = url::Url::parse(&format!("{}{route}", server.uri())).expect("url");
    Request::builder(Method::Get, url).build()
}

fn quick_retry(max_retries: u32) -> RetryLayer<RetryPolicy> {
    RetryLayer::new(RetryPolicy::new(max_retries).with_backoff_factor(Duration::from_millis(1)))
}

/// Appends `>name` on the way out and `<name` on the way back.
#[derive(Clone)]
struct Trace {
    name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl<S> Layer<S> for Trace {
    type Service = Traced<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Traced {
            inner,
            trace: self.clone(),
        }
    }
}

#[derive(Clone)]
struct Traced<S> {
    inner: S,
    trace: Trace,
}

impl<S> Service<Request<Bytes>> for Traced<S>
where
    S: Service<Request<Bytes>, Response = Response<Bytes>, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response<Bytes>>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let trace = self.trace.clone();
        let mut inner = self.inner.clone();
        Box::pin(async move {
            trace.log.lock().expect("lock").push(format!(">{}", trace.name));
            let result = inner.call(request).await;
            trace.log.lock().expect("lock").push(format!("<{}", trace.name));
            result
        })
    }
}

#[tokio::test]
async fn layers_run_in_registration_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let log = Arc::new(Mutex::new(Vec::new()));
    let tag = |name| Trace {
        name,
        log: Arc::clone(&log),
    };
    let client = HyperClient::builder()
        .layer(tag("a"))
        .layer(tag("b"))
        .layer(tag("c"))
        .build();

    client.execute(get(&server, "/")).await.expect("response");

    let log = log.lock().expect("lock").clone();
    check!(log == [">a", ">b", ">c", "<c", "<b", "<a"]);
}

#[tokio::test]
async fn bearer_auth_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/secure"))
        .and(header("Authorization", "Bearer my-token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = HyperClient::builder().with_bearer_auth("my-token").build();

    let response = client.execute(get(&server, "/secure")).await.expect("response");
    check!(response.status() == 200);
}

#[tokio::test]
async fn basic_auth_header() {
    let server = MockServer::start().await;
    // base64("user:pass")
    Mock::given(method("GET"))
        .and(header("Authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = HyperClient::builder().with_basic_auth("user", "pass").build();

    let response = client.execute(get(&server, "/")).await.expect("response");
    check!(response.status() == 200);
}

#[tokio::test]
async fn default_headers_do_not_override() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("X-Client", "tandem-tests"))
        .and(header("Accept", "text/csv"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = HyperClient::builder()
        .with_default_headers([("X-Client", "tandem-tests"), ("Accept", "application/json")])
        .build();
    let url = url::Url::parse(&server.uri()).expect("url");
    let request = Request::builder(Method::Get, url)
        .header("Accept", "text/csv")
        .build();

    let response = client.execute(request).await.expect("response");
    check!(response.status() == 200);
}

#[tokio::test]
async fn retry_on_server_error_until_exhausted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/error"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = HyperClient::builder().with(quick_retry(2)).build();

    let response = client.execute(get(&server, "/error")).await.expect("response");
    check!(response.status() == 503);
}

#[tokio::test]
async fn no_retry_on_client_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let client = HyperClient::builder().with(quick_retry(3)).build();

    let response = client.execute(get(&server, "/missing")).await.expect("response");
    check!(response.status() == 404);
}

#[tokio::test]
async fn timing_inside_retry_sees_every_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let seen: Arc<Mutex<Vec<TimingInfo>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let client = HyperClient::builder()
        .with(quick_retry(3))
        .with(TimingLayer::new().on_complete(move |info| {
            sink.lock().expect("lock").push(info.clone());
        }))
        .build();

    let response = client.execute(get(&server, "/")).await.expect("response");
    check!(response.status() == 200);

    let statuses: Vec<Option<u16>> = seen.lock().expect("lock").iter().map(|i| i.status).collect();
    check!(statuses == [Some(502), Some(502), Some(200)]);
}

#[tokio::test]
async fn compression_decodes_gzip_responses() {
    let server = MockServer::start().await;
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(b"{\"compressed\":true}").expect("write");
    let gzipped = encoder.finish().expect("finish");

    Mock::given(method("GET"))
        .and(header_exists("accept-encoding"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Encoding", "gzip")
                .set_body_raw(gzipped, "application/json"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = HyperClient::builder().with(CompressionLayer::new()).build();

    let response = client.execute(get(&server, "/")).await.expect("response");

    check!(response.header("content-encoding").is_none());
    let body: serde_json::Value = response.json().expect("json");
    check!(body == serde_json::json!({"compressed": true}));
}

#[tokio::test]
async fn compression_gzips_large_request_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("Content-Encoding", "gzip"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let client = HyperClient::builder()
        .with(CompressionLayer::new().min_size(16))
        .build();
    let url = url::Url::parse(&server.uri()).expect("url");
    let request = Request::builder(Method::Post, url)
        .body(Bytes::from(vec![b'x'; 4096]))
        .build();

    let response = client.execute(request).await.expect("response");
    check!(response.status() == 202);
}

#[tokio::test]
async fn rate_limit_fail_fast() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let client = HyperClient::builder()
        .with(RateLimitLayer::per_minute(2).mode(RateLimitMode::FailFast))
        .build();

    for _ in 0..2 {
        client.execute(get(&server, "/")).await.expect("within quota");
    }
    let result = client.execute(get(&server, "/")).await;

    let_assert!(Err(Error::RateLimit { retry_after: Some(_), .. }) = result);
}

#[tokio::test]
async fn concurrency_limit_still_serves_all_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(20)))
        .expect(6)
        .mount(&server)
        .await;

    let client = HyperClient::builder().with_concurrency_limit(2).build();

    let results =
        futures_util::future::join_all((0..6).map(|_| client.execute(get(&server, "/")))).await;

    for result in results {
        check!(result.expect("response").status() == 200);
    }
}
