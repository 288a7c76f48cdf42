//! Loopback HTTP listener for the browser extension
//!
//! Routes:
//! - `GET /`, `POST /`: decode a change notification and queue it on every
//!   registered session (`200 ok`, or `400` with the decode error)
//! - `GET /status`: `{"sessions": n, "port": p}`
//!
//! The listener is bound up front so a busy port is reported to the caller
//! instead of surfacing inside the serve loop.

use crate::error::BindError;
use crate::registry::SessionRegistry;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, RawQuery, State};
use axum::http::{Method as HttpMethod, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use bridge_core::{decode, Method};
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::service::TowerToHyperService;
use serde_json::{json, Value};
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Default header read timeout
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Loopback address for a port
pub fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

#[derive(Clone)]
struct AppState {
    registry: SessionRegistry,
    port: u16,
}

/// Build the request router
///
/// `port` is only reported by `/status`.
pub fn router(registry: SessionRegistry, port: u16) -> Router {
    Router::new()
        .route("/", get(ingest).post(ingest))
        .route("/status", get(status))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(AppState { registry, port })
}

async fn ingest(
    State(state): State<AppState>,
    method: HttpMethod,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> (StatusCode, String) {
    match decode(&Method::from(method.as_str()), query.as_deref(), &body) {
        Ok(event) => {
            let delivered = state.registry.dispatch(&event);
            debug!(
                "Queued {} event for {} session(s)",
                if event.is_reload() { "reload" } else { "change" },
                delivered
            );
            (StatusCode::OK, "ok".to_string())
        }
        Err(e) => {
            debug!("Rejected request: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "sessions": state.registry.len(),
        "port": state.port,
    }))
}

/// Bound ingestion listener
pub struct IngestionServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: SessionRegistry,
    read_timeout: Duration,
}

impl IngestionServer {
    /// Bind the listener; fails once if the port is taken
    pub async fn bind(addr: SocketAddr, registry: SessionRegistry) -> Result<Self, BindError> {
        let listener = TcpListener::bind(addr).await.map_err(|e| match e.kind() {
            io::ErrorKind::AddrInUse => BindError::AddressInUse(addr),
            _ => BindError::Other(e),
        })?;
        let local_addr = listener.local_addr()?;
        info!("Listening on {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
            registry,
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    /// Set the per-connection header read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Accept connections until `shutdown` completes
    ///
    /// Connections already accepted finish on their own tasks.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send) {
        let app = router(self.registry.clone(), self.local_addr.port());
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                },
            };

            let service = TowerToHyperService::new(app.clone());
            let read_timeout = self.read_timeout;
            tokio::spawn(async move {
                let conn = http1::Builder::new()
                    .timer(TokioTimer::new())
                    .header_read_timeout(read_timeout)
                    .serve_connection(TokioIo::new(stream), service);
                if let Err(e) = conn.await {
                    debug!("Connection from {} ended: {}", peer, e);
                }
            });
        }

        info!("Listener on {} stopped", self.local_addr);
    }
}
