//! Core types used throughout the gateway.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// 15-digit decimal device identifier. The IMEI doubles as the
/// authentication token and the logical session key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Imei(String);

impl Imei {
    /// Wire length of an IMEI in a login frame.
    pub const LEN: usize = 15;

    /// Parse the IMEI bytes of a login frame.
    pub fn from_wire(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() != Self::LEN {
            return Err(FrameError::BadLogin(format!(
                "IMEI length {} != {}",
                bytes.len(),
                Self::LEN
            )));
        }
        if !bytes.iter().all(u8::is_ascii_digit) {
            return Err(FrameError::BadLogin("IMEI contains non-digit bytes".into()));
        }
        // Validated ASCII digits above.
        Ok(Self(String::from_utf8_lossy(bytes).into_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Imei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Imei {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wire(s.as_bytes())
    }
}

/// Unique identifier for an accepted connection. Monotonic within the
/// process; identity across restarts is the IMEI, not this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Allocate the next session id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session state as seen by the protocol engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Connection accepted, login frame not yet seen.
    Unauthenticated,
    /// IMEI accepted and ACKed; AVL frames are expected.
    Authenticated,
    /// Connection torn down (fault, socket error, timeout, or EOF).
    Closed,
}
