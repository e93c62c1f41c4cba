//! Codec 8 / 8E frame decoder.
//!
//! A pure function over the front of the read buffer and the session's
//! current state. The frame reader calls it in a loop, advancing its cursor
//! by the consumed length after every complete frame.

use byteorder::{BigEndian, ByteOrder};

use crate::error::FrameError;
use crate::types::{Imei, SessionState};

use super::record::{AvlRecord, GpsElement, IoElements};
use super::{crc16_ibm, CODEC_8, CODEC_8E, MAX_DATA_FIELD, PREAMBLE};

/// A complete frame lifted off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// IMEI login handshake.
    Login(Imei),
    /// AVL data frame with its decoded records, in wire order.
    Avl(Vec<AvlRecord>),
}

/// Outcome of a decode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// One whole frame, consuming `n` bytes from the front of the buffer.
    Consumed(Frame, usize),
    /// The buffer does not yet hold a complete frame.
    Incomplete,
}

/// Try to lift one frame off the front of `buf`.
///
/// `Incomplete` means the caller must read more bytes before retrying. An
/// error is a protocol fault and is fatal for the connection; the caller
/// must not retry on the same stream.
pub fn decode(state: SessionState, buf: &[u8]) -> Result<Decoded, FrameError> {
    match state {
        SessionState::Unauthenticated => decode_login(buf),
        SessionState::Authenticated => decode_avl(buf),
        // A closed session never reaches the decoder.
        SessionState::Closed => Ok(Decoded::Incomplete),
    }
}

fn decode_login(buf: &[u8]) -> Result<Decoded, FrameError> {
    if buf.len() < 2 {
        return Ok(Decoded::Incomplete);
    }
    let len = BigEndian::read_u16(&buf[..2]) as usize;
    if len != Imei::LEN {
        return Err(FrameError::BadLogin(format!("declared IMEI length {len}")));
    }
    if buf.len() < 2 + len {
        return Ok(Decoded::Incomplete);
    }
    let imei = Imei::from_wire(&buf[2..2 + len])?;
    Ok(Decoded::Consumed(Frame::Login(imei), 2 + len))
}

fn decode_avl(buf: &[u8]) -> Result<Decoded, FrameError> {
    if buf.len() < 8 {
        return Ok(Decoded::Incomplete);
    }
    if buf[..4] != PREAMBLE {
        return Err(FrameError::BadPreamble);
    }
    let declared = BigEndian::read_u32(&buf[4..8]);
    if declared == 0 || declared > MAX_DATA_FIELD {
        return Err(FrameError::BadLength(declared));
    }
    let data_len = declared as usize;
    let total = 8 + data_len + 4;
    if buf.len() < total {
        return Ok(Decoded::Incomplete);
    }

    let data = &buf[8..8 + data_len];
    let records = decode_data_field(data)?;

    // Wire CRC is a big-endian u32 with the checksum in the low 16 bits.
    let wire = BigEndian::read_u32(&buf[8 + data_len..total]) as u16;
    let computed = crc16_ibm(data);
    if wire != computed {
        return Err(FrameError::BadCrc { computed, wire });
    }

    Ok(Decoded::Consumed(Frame::Avl(records), total))
}

/// Decode the whole data field: codec id, leading count, records, trailing
/// count. The cursor must land exactly on the end of the field.
fn decode_data_field(data: &[u8]) -> Result<Vec<AvlRecord>, FrameError> {
    let mut r = Reader::new(data);

    let codec = r.u8().ok_or_else(short)?;
    let wide = match codec {
        CODEC_8 => false,
        CODEC_8E => true,
        other => return Err(FrameError::BadCodec(other)),
    };

    let leading = r.u8().ok_or_else(short)?;
    let mut records = Vec::with_capacity(usize::from(leading));
    for _ in 0..leading {
        records.push(decode_record(&mut r, wide)?);
    }

    let trailing = r.u8().ok_or_else(short)?;
    if trailing != leading {
        return Err(FrameError::BadRecordCount(format!(
            "leading {leading}, trailing {trailing}"
        )));
    }
    if !r.is_empty() {
        return Err(FrameError::BadRecordCount(format!(
            "{} bytes past the trailing count",
            r.remaining()
        )));
    }

    Ok(records)
}

fn decode_record(r: &mut Reader<'_>, wide: bool) -> Result<AvlRecord, FrameError> {
    let timestamp_ms = r.u64().ok_or_else(short)?;
    let priority = r.u8().ok_or_else(short)?;

    let gps = GpsElement {
        longitude: r.i32().ok_or_else(short)?,
        latitude: r.i32().ok_or_else(short)?,
        altitude: r.i16().ok_or_else(short)?,
        angle: r.u16().ok_or_else(short)?,
        satellites: r.u8().ok_or_else(short)?,
        speed: r.u16().ok_or_else(short)?,
    };

    let event_io_id = r.id(wide).ok_or_else(short)?;
    // Total element count; informational, the block counts are authoritative.
    let _total = r.id(wide).ok_or_else(short)?;

    let mut io = IoElements::default();

    let n = r.id(wide).ok_or_else(short)?;
    for _ in 0..n {
        let id = r.id(wide).ok_or_else(short)?;
        let v = r.u8().ok_or_else(short)?;
        io.one_byte.push((id, v));
    }

    let n = r.id(wide).ok_or_else(short)?;
    for _ in 0..n {
        let id = r.id(wide).ok_or_else(short)?;
        let v = r.u16().ok_or_else(short)?;
        io.two_byte.push((id, v));
    }

    let n = r.id(wide).ok_or_else(short)?;
    for _ in 0..n {
        let id = r.id(wide).ok_or_else(short)?;
        let v = r.u32().ok_or_else(short)?;
        io.four_byte.push((id, v));
    }

    let n = r.id(wide).ok_or_else(short)?;
    for _ in 0..n {
        let id = r.id(wide).ok_or_else(short)?;
        let v = r.u64().ok_or_else(short)?;
        io.eight_byte.push((id, v));
    }

    if wide {
        let n = r.u16().ok_or_else(short)?;
        for _ in 0..n {
            let id = r.u16().ok_or_else(short)?;
            let len = r.u16().ok_or_else(short)? as usize;
            let bytes = r.bytes(len).ok_or_else(short)?.to_vec();
            io.variable.push((id, bytes));
        }
    }

    Ok(AvlRecord {
        timestamp_ms,
        priority,
        gps,
        event_io_id,
        io,
    })
}

fn short() -> FrameError {
    FrameError::BadRecordCount("records overrun the data field".into())
}

/// Bounds-checked cursor over the data field.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.remaining() < n {
            return None;
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Some(out)
    }

    fn u8(&mut self) -> Option<u8> {
        self.bytes(1).map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.bytes(2).map(BigEndian::read_u16)
    }

    fn i16(&mut self) -> Option<i16> {
        self.u16().map(|v| v as i16)
    }

    fn u32(&mut self) -> Option<u32> {
        self.bytes(4).map(BigEndian::read_u32)
    }

    fn i32(&mut self) -> Option<i32> {
        self.u32().map(|v| v as i32)
    }

    fn u64(&mut self) -> Option<u64> {
        self.bytes(8).map(BigEndian::read_u64)
    }

    /// Id or count field: one byte for Codec 8, two for Codec 8E.
    fn id(&mut self, wide: bool) -> Option<u16> {
        if wide {
            self.u16()
        } else {
            self.u8().map(u16::from)
        }
    }
}
