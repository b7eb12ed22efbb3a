//! hyper adapter and graceful shutdown.
//!
//! On shutdown the listener stops accepting, every connection is asked to
//! close once its in-flight request is answered, and [`serve`] returns when
//! they are all gone (or after [`SHUTDOWN_GRACE`]).

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tandem_core::{ContentType, Error, Headers, Method, Response, Result};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::api::Api;
use crate::request::{Body, QueryParams, Request};

/// Largest request body accepted, in bytes.
pub const MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// How long open connections get to finish after the shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Bind `addr` and serve `api` until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns [`Error::Connection`] when the address cannot be bound.
pub async fn serve(api: Api, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::connection(format!("cannot bind {addr}: {e}")))?;
    serve_with_shutdown(api, listener, shutdown_signal()).await
}

/// Serve `api` on an already bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Currently infallible once the listener is bound; accept errors are
/// logged and skipped.
pub async fn serve_with_shutdown<F>(api: Api, listener: TcpListener, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    let api = Arc::new(api);
    match listener.local_addr() {
        Ok(addr) => info!(%addr, name = api.name(), version = api.version(), "listening"),
        Err(e) => warn!("cannot read local address: {e}"),
    }

    let builder = ConnBuilder::new(TokioExecutor::new());
    let graceful = GracefulShutdown::new();
    let mut tasks = tokio::task::JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            () = &mut shutdown => {
                info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                break;
            }

            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let api = Arc::clone(&api);
                let io = TokioIo::new(stream);

                let svc = service_fn(move |req| {
                    let api = Arc::clone(&api);
                    async move { dispatch(&api, req).await }
                });
                let connection = graceful.watch(builder.serve_connection(io, svc).into_owned());

                tasks.spawn(async move {
                    if let Err(e) = connection.await {
                        warn!(%peer, "connection error: {e}");
                    }
                });
            }

            Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
        }
    }

    if tokio::time::timeout(SHUTDOWN_GRACE, graceful.shutdown()).await.is_err() {
        warn!(remaining = tasks.len(), "grace period elapsed, aborting connections");
        tasks.abort_all();
    }
    while tasks.join_next().await.is_some() {}

    info!("server stopped");
    Ok(())
}

async fn dispatch(
    api: &Api,
    req: hyper::Request<Incoming>,
) -> std::result::Result<hyper::Response<Full<Bytes>>, Infallible> {
    let response = match into_request(req).await {
        Ok(request) => api.handle_request(request).await,
        Err(response) => response,
    };
    Ok(into_hyper(response))
}

/// Buffer the body and convert to a [`Request`]; failures are answered directly.
async fn into_request(req: hyper::Request<Incoming>) -> std::result::Result<Request, Response> {
    let (parts, incoming) = req.into_parts();

    let Ok(method) = Method::try_from(parts.method.clone()) else {
        return Err(Response::from_status(501).with_json(serde_json::json!({
            "error": format!("Method {} not supported", parts.method),
            "code": "not_implemented",
        })));
    };

    let mut headers = Headers::new();
    for (name, value) in &parts.headers {
        match value.to_str() {
            Ok(value) => headers.append(name.as_str(), value),
            Err(_) => warn!(header = name.as_str(), "dropping non-ASCII header value"),
        }
    }

    let query = match parts.uri.query() {
        Some(query) => QueryParams::parse(query).map_err(|e| Response::from_error(&e))?,
        None => QueryParams::new(),
    };

    let bytes = match Limited::new(incoming, MAX_BODY_SIZE).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!("cannot read request body: {e}");
            return Err(Response::from_status(413).with_json(serde_json::json!({
                "error": "Request body too large or unreadable",
                "code": "payload_too_large",
            })));
        }
    };

    let is_json = headers
        .get("content-type")
        .is_some_and(ContentType::is_json);
    let body = if is_json && !bytes.is_empty() {
        // Unparseable JSON stays raw so validation can report it.
        serde_json::from_slice(&bytes).map_or_else(|_| Body::Bytes(bytes), Body::Json)
    } else {
        Body::from(bytes)
    };

    Ok(Request::new(method, parts.uri.path())
        .with_headers(headers)
        .with_query_params(query)
        .with_body(body))
}

fn into_hyper(response: Response) -> hyper::Response<Full<Bytes>> {
    let (status, headers, body) = response.into_parts();
    let mut builder = hyper::Response::builder().status(status);
    for (name, value) in headers.iter() {
        builder = builder.header(name, value);
    }
    builder.body(Full::new(body)).unwrap_or_else(|e| {
        error!("invalid response: {e}");
        let mut fallback = hyper::Response::new(Full::new(Bytes::new()));
        *fallback.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = sigterm => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_headers_are_copied() {
        let response = Response::from_status(201)
            .with_header("Location", "/users/3")
            .with_text("created");

        let converted = into_hyper(response);
        assert_eq!(converted.status(), 201);
        assert_eq!(converted.headers()["location"], "/users/3");
        assert_eq!(converted.headers()["content-type"], "text/plain; charset=utf-8");
    }

    #[test]
    fn invalid_status_falls_back_to_500() {
        let converted = into_hyper(Response::from_status(1000));
        assert_eq!(converted.status(), 500);
    }
}
