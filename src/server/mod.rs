//! Device-facing TCP server.
//!
//! This module contains:
//! - The accept loop and per-connection task lifecycle
//! - The per-connection protocol engine
//! - The session registry

mod registry;
mod session;

pub use registry::{SessionEntry, SessionRegistry, SessionSnapshot};
pub use session::Connection;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::sink::SinkDispatcher;

/// TCP supervisor: accepts device connections and spawns one isolated task
/// per connection. Connection faults never propagate past their own task.
pub struct Server {
    listener: TcpListener,
    registry: Arc<SessionRegistry>,
    sink: Arc<SinkDispatcher>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind the device listener. Bind failure is fatal for the process.
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

        info!(addr = %addr, "device listener bound");

        Ok(Self {
            listener,
            registry,
            sink,
            shutdown_tx,
        })
    }

    /// Actual bound address (tests bind port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop. Returns cleanly once [`shutdown`](Self::shutdown) fires.
    pub async fn run(&self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => self.spawn_connection(stream, peer),
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("acceptor stopping");
                    return Ok(());
                }
            }
        }
    }

    /// Signal the acceptor and every connection task to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        // ACK latency matters to the device's sliding window.
        if let Err(e) = stream.set_nodelay(true) {
            debug!(peer = %peer, error = %e, "set_nodelay failed");
        }

        let entry = self.registry.insert(peer);
        let registry = Arc::clone(&self.registry);
        let sink = Arc::clone(&self.sink);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            let id = entry.id;
            debug!(session = %id, peer = %peer, "connection opened");

            // The connection observes shutdown itself, at a frame boundary,
            // so pending ACK writes always flush before the socket drops.
            let mut conn = Connection::new(stream, peer, Arc::clone(&entry), sink);
            let outcome = conn.run(&mut shutdown_rx).await;

            entry.mark_closed();
            registry.remove(id);
            log_close(&entry, peer, &outcome);
        });
    }
}

fn log_close(entry: &SessionEntry, peer: SocketAddr, outcome: &Result<()>) {
    let id = entry.id;
    let imei = entry.imei().map(|imei| imei.as_str().to_owned());
    let imei = imei.as_deref().unwrap_or("-");

    match outcome {
        Ok(()) => {
            info!(
                session = %id,
                peer = %peer,
                imei,
                packets = entry.packets_received(),
                bytes = entry.bytes_received(),
                "connection closed"
            );
        }
        Err(e) if e.is_benign_close() => {
            info!(session = %id, peer = %peer, imei, "idle timeout, closing");
        }
        Err(e) => {
            warn!(session = %id, peer = %peer, imei, error = %e, "connection fault, closing");
        }
    }
}
