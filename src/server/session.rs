//! Per-connection protocol engine: frame reader, state machine, ACKs.
//!
//! One task owns one socket and one read buffer; nothing here is shared
//! except the registry entry (counters) and the sink handle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{ConnectionError, Result};
use crate::normalize;
use crate::protocol::{decode, Decoded, Frame, LOGIN_ACK};
use crate::sink::{Batch, SinkDispatcher};
use crate::types::{Imei, SessionState};
use crate::{IDLE_TIMEOUT, MAX_READ_BUFFER};

use super::registry::SessionEntry;

/// Bound on a single ACK write; a device that stops draining its socket for
/// this long is gone.
const WRITE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    buf: BytesMut,
    state: SessionState,
    imei: Option<Imei>,
    last_data_at: Instant,
    entry: Arc<SessionEntry>,
    sink: Arc<SinkDispatcher>,
}

impl Connection {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        entry: Arc<SessionEntry>,
        sink: Arc<SinkDispatcher>,
    ) -> Self {
        Self {
            stream,
            peer,
            buf: BytesMut::with_capacity(4096),
            state: SessionState::Unauthenticated,
            imei: None,
            last_data_at: Instant::now(),
            entry,
            sink,
        }
    }

    /// Drive the connection until EOF, fault, socket error, idle timeout,
    /// or shutdown.
    pub async fn run(&mut self, shutdown: &mut broadcast::Receiver<()>) -> Result<()> {
        loop {
            // Shutdown is observed only here, between frames. Any ACK write
            // has completed before control returns to the read point, so a
            // shutdown never truncates a partial write; the write timeout
            // bounds how long a stuck device can hold that up.
            let read = tokio::select! {
                read = timeout(IDLE_TIMEOUT, self.stream.read_buf(&mut self.buf)) => read,
                _ = shutdown.recv() => return Ok(()),
            };

            let n = match read {
                Err(_) => return Err(ConnectionError::IdleTimeout.into()),
                Ok(Err(e)) => return Err(ConnectionError::Socket(e.to_string()).into()),
                // Clean EOF from the device.
                Ok(Ok(0)) => return Ok(()),
                Ok(Ok(n)) => n,
            };

            self.last_data_at = Instant::now();
            self.entry.record_bytes(n as u64);

            if self.buf.len() > MAX_READ_BUFFER {
                return Err(ConnectionError::BufferOverflow(self.buf.len()).into());
            }

            self.drain_frames().await?;
        }
    }

    /// Framing loop: lift complete frames off the buffer until the decoder
    /// needs more bytes. Consumed bytes are released by advancing the
    /// cursor; the tail is never copied.
    async fn drain_frames(&mut self) -> Result<()> {
        while !self.buf.is_empty() {
            match decode(self.state, &self.buf)? {
                Decoded::Incomplete => break,
                Decoded::Consumed(frame, n) => {
                    self.buf.advance(n);
                    self.on_frame(frame).await?;
                }
            }
        }
        Ok(())
    }

    /// State machine transition for one complete frame.
    async fn on_frame(&mut self, frame: Frame) -> Result<()> {
        match (self.state, frame) {
            (SessionState::Unauthenticated, Frame::Login(imei)) => self.on_login(imei).await,
            (SessionState::Authenticated, Frame::Avl(records)) => self.on_avl(records).await,
            (SessionState::Unauthenticated, Frame::Avl(_)) => {
                Err(ConnectionError::UnexpectedAvl.into())
            }
            (SessionState::Authenticated, Frame::Login(_)) => {
                Err(ConnectionError::UnexpectedLogin.into())
            }
            // The read loop stops before the session reaches Closed.
            (SessionState::Closed, _) => Ok(()),
        }
    }

    async fn on_login(&mut self, imei: Imei) -> Result<()> {
        // ACK first: the device treats the session as open once this byte
        // arrives, so it must precede any further processing on our side.
        self.write(&[LOGIN_ACK]).await?;

        self.state = SessionState::Authenticated;
        self.imei = Some(imei.clone());
        self.entry.set_authenticated(imei.clone());
        self.entry.record_packet();

        info!(
            session = %self.entry.id,
            peer = %self.peer,
            imei = %imei,
            "device authenticated"
        );
        Ok(())
    }

    async fn on_avl(&mut self, records: Vec<crate::protocol::AvlRecord>) -> Result<()> {
        let count = records.len() as u32;

        // Authenticated implies a known IMEI.
        let imei = self
            .imei
            .as_ref()
            .ok_or(ConnectionError::UnexpectedAvl)?
            .as_str()
            .to_owned();

        // Hand the batch to the dispatcher before ACKing; the ACK promises
        // queueing, not sink delivery.
        self.sink.enqueue(Batch {
            imei,
            records: normalize::normalize_batch(&records),
        });

        self.write(&count.to_be_bytes()).await?;
        self.entry.record_packet();

        debug!(session = %self.entry.id, records = count, "frame accepted");
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        match timeout(WRITE_TIMEOUT, self.stream.write_all(bytes)).await {
            Err(_) => Err(ConnectionError::Socket("ACK write timed out".into()).into()),
            Ok(Err(e)) => Err(ConnectionError::Socket(e.to_string()).into()),
            Ok(Ok(())) => Ok(()),
        }
    }

    /// Idle time since the last byte arrived.
    pub fn idle_time(&self) -> std::time::Duration {
        self.last_data_at.elapsed()
    }
}
