//! Service doubles shared by the middleware unit tests.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use tower::Service;

use crate::{Error, Method, Request, Response, Result};

type Reply = Arc<dyn Fn(u32, &Request<Bytes>) -> Result<Response<Bytes>> + Send + Sync>;

/// Records every request it receives and answers through a closure taking
/// the 1-based call number.
#[derive(Clone)]
pub(crate) struct MockService {
    reply: Reply,
    calls: Arc<AtomicU32>,
    seen: Arc<Mutex<Vec<Request<Bytes>>>>,
}

impl MockService {
    pub(crate) fn new(
        reply: impl Fn(u32, &Request<Bytes>) -> Result<Response<Bytes>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            reply: Arc::new(reply),
            calls: Arc::new(AtomicU32::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn status(status: u16) -> Self {
        Self::new(move |_, _| Ok(Response::from_status(status)))
    }

    pub(crate) fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn requests(&self) -> Vec<Request<Bytes>> {
        self.seen.lock().expect("lock").clone()
    }
}

impl Service<Request<Bytes>> for MockService {
    type Response = Response<Bytes>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request<Bytes>) -> Self::Future {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let result = (self.reply)(n, &request);
        self.seen.lock().expect("lock").push(request);
        Box::pin(async move { result })
    }
}

pub(crate) fn get(url: &str) -> Request<Bytes> {
    Request::builder(Method::Get, url::Url::parse(url).expect("valid url")).build()
}
