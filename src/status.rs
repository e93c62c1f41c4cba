//! Local HTTP status surface.
//!
//! Provides:
//! - `GET /` and `GET /health` - liveness plus a session table snapshot
//! - anything else - 404
//!
//! Read-only: handlers only take registry snapshots and counter reads.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

use crate::error::{Error, Result};
use crate::server::{SessionRegistry, SessionSnapshot};
use crate::sink::{SinkDispatcher, SinkStats};

/// Shared state for the status handlers.
#[derive(Clone)]
struct StatusState {
    registry: Arc<SessionRegistry>,
    sink: Arc<SinkDispatcher>,
    started: Instant,
}

/// Status response body.
#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    active_sessions: usize,
    sessions: Vec<SessionSnapshot>,
    sink: SinkStats,
}

/// Status HTTP server.
pub struct StatusServer {
    listener: TcpListener,
    state: StatusState,
    shutdown_tx: broadcast::Sender<()>,
}

impl StatusServer {
    pub async fn bind(
        addr: SocketAddr,
        registry: Arc<SessionRegistry>,
        sink: Arc<SinkDispatcher>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| Error::Bind {
            addr,
            reason: e.to_string(),
        })?;
        let (shutdown_tx, _) = broadcast::channel(1);

        info!(addr = %addr, "status server bound");

        Ok(Self {
            listener,
            state: StatusState {
                registry,
                sink,
                started: Instant::now(),
            },
            shutdown_tx,
        })
    }

    /// Actual bound address (tests bind port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle to stop the server after `run` has consumed it.
    pub fn shutdown_trigger(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Serve until the shutdown trigger fires.
    pub async fn run(self) -> Result<()> {
        let app = Router::new()
            .route("/", get(status_handler))
            .route("/health", get(status_handler))
            .fallback(not_found)
            .with_state(self.state);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

async fn status_handler(State(state): State<StatusState>) -> impl IntoResponse {
    let sessions = state.registry.snapshot();

    Json(StatusResponse {
        status: "ok",
        version: crate::VERSION,
        uptime_seconds: state.started.elapsed().as_secs(),
        active_sessions: sessions.len(),
        sessions,
        sink: state.sink.stats(),
    })
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "not found")
}
