//! Teltonika Codec 8 / 8E wire protocol.
//!
//! Two frame kinds travel device → server:
//!
//! ```text
//! Login   ┌────────────┬──────────────────────────┐
//!         │ Length (2) │ IMEI, ASCII digits (15)  │
//!         └────────────┴──────────────────────────┘
//!
//! AVL     ┌──────────────┬────────────┬─────────────────────┬─────────┐
//!         │ Preamble (4) │ Length (4) │ Data Field (length) │ CRC (4) │
//!         └──────────────┴────────────┴─────────────────────┴─────────┘
//!
//! Data    ┌───────────┬───────────┬─────────────┬───────────┐
//! Field   │ Codec (1) │ Count (1) │ Records (…) │ Count (1) │
//!         └───────────┴───────────┴─────────────┴───────────┘
//! ```
//!
//! The CRC is CRC-16/IBM over the data field, stored big-endian in the low
//! half of a u32. Server → device traffic is two ACK shapes only: one byte
//! `0x01` after a login, and a big-endian u32 record count after each
//! accepted AVL frame.

mod crc;
mod decoder;
mod record;

pub use crc::crc16_ibm;
pub use decoder::{decode, Decoded, Frame};
pub use record::{AvlRecord, GpsElement, IoElements};

/// AVL frame preamble: four zero bytes.
pub const PREAMBLE: [u8; 4] = [0u8; 4];

/// Codec 8 identifier.
pub const CODEC_8: u8 = 0x08;

/// Codec 8 Extended identifier.
pub const CODEC_8E: u8 = 0x8E;

/// Largest data field accepted in an AVL frame.
pub const MAX_DATA_FIELD: u32 = 65_528;

/// Byte written to the device after an accepted login.
pub const LOGIN_ACK: u8 = 0x01;
