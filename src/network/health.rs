use std::convert::Infallible;
use std::net::{SocketAddr, TcpListener};

use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::AddrIncoming;
use hyper::server::Builder;
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, StatusCode};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::raft::{metrics, Raft};

/// Serves the liveness probe on `addr` until `shutdown` fires.
///
/// `GET /healthz` answers `200 ok`. When a Raft handle is given, `GET
/// /status` reports its role and term as JSON and `GET /metrics` exposes
/// the consensus counters.
pub async fn serve_health(
    addr: SocketAddr,
    raft: Option<Raft>,
    shutdown: CancellationToken,
) -> Result<(), hyper::Error> {
    let builder = hyper::Server::try_bind(&addr)?;
    info!("Health endpoint listening on {addr}");
    run(builder, raft, shutdown).await
}

/// Same as [`serve_health`] on an already bound listener.
pub async fn serve_health_on(
    listener: TcpListener,
    raft: Option<Raft>,
    shutdown: CancellationToken,
) -> Result<(), hyper::Error> {
    if let Err(e) = listener.set_nonblocking(true) {
        warn!("Could not make health listener non-blocking: {e}");
    }
    run(hyper::Server::from_tcp(listener)?, raft, shutdown).await
}

async fn run(
    builder: Builder<AddrIncoming>,
    raft: Option<Raft>,
    shutdown: CancellationToken,
) -> Result<(), hyper::Error> {
    let make_svc = make_service_fn(move |_conn| {
        let raft = raft.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                let raft = raft.clone();
                async move { handle(req, raft).await }
            }))
        }
    });

    builder
        .serve(make_svc)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

fn reply(status: StatusCode, content_type: &'static str, body: String) -> Response<Body> {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

async fn handle(req: Request<Body>, raft: Option<Raft>) -> Result<Response<Body>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (method, path.as_str(), raft) {
        (Method::GET, "/healthz", _) => reply(StatusCode::OK, "text/plain", "ok".to_string()),
        (Method::GET, "/status", Some(raft)) => {
            let status = raft.status().await;
            match serde_json::to_string(&status) {
                Ok(body) => reply(StatusCode::OK, "application/json", body),
                Err(e) => reply(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "application/json",
                    format!("{{\"error\":\"{e}\"}}"),
                ),
            }
        }
        (Method::GET, "/metrics", Some(_)) => reply(
            StatusCode::OK,
            "text/plain; version=0.0.4",
            metrics::render(),
        ),
        _ => reply(StatusCode::NOT_FOUND, "text/plain", "not found".to_string()),
    };
    Ok(response)
}
