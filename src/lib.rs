//! # AVL Gateway
//!
//! TCP ingest gateway for vehicle telematics devices speaking the Teltonika
//! Codec 8 / 8E binary protocol.
//!
//! ## Architecture
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Connection Supervisor                   │
//! │   accept loop · one task per device · idle timeout          │
//! ├─────────────────────────────────────────────────────────────┤
//! │   Frame Reader  →  Codec 8/8E Decoder  →  State Machine     │
//! │   (per-session buffer, framing loop, ACK discipline)        │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │       Record Normalizer      │       Session Registry       │
//! ├──────────────────────────────┤   (snapshots → status HTTP)  │
//! │        Sink Dispatcher       │                              │
//! │  (bounded queue → Fleet API) │                              │
//! └──────────────────────────────┴──────────────────────────────┘
//!
//! Devices authenticate with a 15-digit IMEI, stream binary AVL frames, and
//! receive a record-count ACK per accepted frame. Normalized batches go to
//! the Fleet API over HTTP, fire-and-forget.

#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]                  // ASCII diagrams in docs
#![allow(clippy::cast_possible_truncation)]      // Counted lengths fit their fields
#![allow(clippy::cast_possible_wrap)]            // Intentional for wire integers
#![allow(clippy::cast_sign_loss)]                // Intentional for wire integers
#![allow(clippy::unreadable_literal)]            // Hex wire constants

pub mod config;
pub mod error;
pub mod normalize;
pub mod protocol;
pub mod server;
pub mod sink;
pub mod status;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};

use std::time::Duration;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Per-session read buffer cap; exceeding it closes the connection.
pub const MAX_READ_BUFFER: usize = 64 * 1024;

/// Idle read timeout for device connections; resets on any byte received.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Default device-facing TCP port.
pub const DEFAULT_TCP_PORT: u16 = 5000;

/// Default status HTTP port.
pub const DEFAULT_STATUS_PORT: u16 = 3000;
