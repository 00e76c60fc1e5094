use anyhow::{Context, Result};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{self, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::engine::FleetEngine;

/// Read-only HTTP view of the engine: liveness, readiness and the snapshot.
#[derive(Clone)]
pub struct StatusServer {
    engine: Arc<FleetEngine>,
}

impl StatusServer {
    pub fn new(engine: Arc<FleetEngine>) -> Self {
        Self { engine }
    }

    pub async fn serve(self, port: u16, ready_signal: tokio::sync::oneshot::Sender<()>) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind status server on {}", addr))?;

        info!(
            port = port,
            address = %addr,
            readiness_endpoint = format!("http://0.0.0.0:{}/readyz", port),
            instances_endpoint = format!("http://0.0.0.0:{}/instances", port),
            "Status server started"
        );

        let _ = ready_signal.send(());

        loop {
            let (stream, peer_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    continue;
                }
            };

            let io = TokioIo::new(stream);
            let server = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let server = server.clone();
                    async move { Ok::<_, Infallible>(server.route(req.method(), req.uri().path())) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!(peer = %peer_addr, error = %e, "Error serving connection");
                }
            });
        }
    }

    fn route(&self, method: &Method, path: &str) -> Response<Full<Bytes>> {
        debug!(method = %method, path = %path, "Received status request");

        if method != Method::GET {
            return respond(StatusCode::METHOD_NOT_ALLOWED, "method not allowed");
        }

        match path {
            "/healthz" | "/health" => respond(StatusCode::OK, "ok"),
            "/readyz" | "/ready" => {
                if self.engine.has_data() {
                    respond(StatusCode::OK, "ready")
                } else {
                    respond(StatusCode::SERVICE_UNAVAILABLE, "not ready")
                }
            }
            "/instances" => self.instances(),
            _ => respond(StatusCode::NOT_FOUND, "Not Found"),
        }
    }

    fn instances(&self) -> Response<Full<Bytes>> {
        let snapshot = self.engine.snapshot();
        match serde_json::to_vec(&snapshot.instances) {
            Ok(json) => {
                let mut response = respond(StatusCode::OK, json);
                response.headers_mut().insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                response
            }
            Err(e) => {
                error!(error = %e, "Failed to serialize fleet snapshot");
                respond(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

fn respond(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}
