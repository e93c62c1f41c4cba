//! Error types for the gateway.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the gateway.
#[derive(Error, Debug)]
pub enum Error {
    // Wire decoding errors
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    // Per-connection lifecycle errors
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    // Downstream delivery errors
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("bind failed on {addr}: {reason}")]
    Bind { addr: SocketAddr, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // General errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Decoder faults. Every variant is fatal for its connection: the stream has
/// no framing delimiter, so resynchronizing after a malformed frame is not
/// safe.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("bad login frame: {0}")]
    BadLogin(String),

    #[error("bad preamble")]
    BadPreamble,

    #[error("bad data field length: {0}")]
    BadLength(u32),

    #[error("unknown codec id: {0:#04x}")]
    BadCodec(u8),

    #[error("bad record count: {0}")]
    BadRecordCount(String),

    #[error("CRC mismatch: computed {computed:#06x}, wire {wire:#06x}")]
    BadCrc { computed: u16, wire: u16 },
}

/// Session-level faults raised outside the decoder.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("AVL frame before login")]
    UnexpectedAvl,

    #[error("second login on an authenticated session")]
    UnexpectedLogin,

    #[error("read buffer overflow: {0} bytes")]
    BufferOverflow(usize),

    #[error("idle timeout")]
    IdleTimeout,

    #[error("socket error: {0}")]
    Socket(String),
}

/// Downstream delivery errors. The device has already been ACKed by the time
/// any of these occur; the batch is logged and dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("sink returned HTTP {0}")]
    Status(u16),

    #[error("sink request failed: {0}")]
    Request(String),
}

impl Error {
    /// Check if this is an expected end-of-life for a connection rather than
    /// a protocol violation. Expected closes log at info level.
    pub fn is_benign_close(&self) -> bool {
        matches!(self, Error::Connection(ConnectionError::IdleTimeout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_error_display() {
        let e = FrameError::BadCodec(0x0C);
        assert_eq!(e.to_string(), "unknown codec id: 0x0c");

        let e = FrameError::BadCrc {
            computed: 0xBB3D,
            wire: 0xBB3C,
        };
        assert!(e.to_string().contains("0xbb3d"));
    }

    #[test]
    fn idle_timeout_is_benign() {
        assert!(Error::from(ConnectionError::IdleTimeout).is_benign_close());
        assert!(!Error::from(ConnectionError::UnexpectedAvl).is_benign_close());
        assert!(!Error::from(FrameError::BadPreamble).is_benign_close());
    }
}
