//! Hyper HTTP adapter.
//!
//! Thin shim between the wire and the router: accept connections, translate
//! each hyper request into a `Router::handle` call, translate the result
//! back. All routing semantics live in the router; this module only moves
//! bytes.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::StatusCode;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use crate::http::{Headers, Method, Response};
use crate::router::Router;

/// Serve a router forever on `addr`.
pub async fn serve(router: Arc<Router>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    log::info!("listening on http://{}", addr);

    loop {
        let (stream, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                log::warn!("accept failed: {}", err);
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let router = Arc::clone(&router);

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let router = Arc::clone(&router);
                async move { handle_hyper_request(req, router).await }
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                log::debug!("connection error: {}", err);
            }
        });
    }
}

async fn handle_hyper_request(
    req: hyper::Request<Incoming>,
    router: Arc<Router>,
) -> Result<hyper::Response<Full<Bytes>>, hyper::Error> {
    let method = Method::parse(req.method().as_str());
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let mut headers = Headers::new();
    for (name, value) in req.headers() {
        if let Ok(value) = value.to_str() {
            headers.insert(name.as_str().to_string(), value.to_string());
        }
    }

    let body_bytes = req.into_body().collect().await?.to_bytes();
    let body = String::from_utf8_lossy(&body_bytes).into_owned();

    // Methods the router has no notion of fall straight through to the 404
    let response = match method {
        Some(method) => router.handle(method, &path, headers, &body),
        None => Response::not_found(),
    };

    Ok(to_hyper_response(response))
}

fn to_hyper_response(response: Response) -> hyper::Response<Full<Bytes>> {
    let mut builder = hyper::Response::builder().status(
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
    );
    for (name, value) in &response.headers {
        builder = builder.header(name, value);
    }
    builder
        .body(Full::new(Bytes::from(response.body)))
        .unwrap_or_else(|_| {
            hyper::Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::new(Bytes::new()))
                .expect("static response")
        })
}
