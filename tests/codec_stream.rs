//! Decoder stream properties: round trips, byte-chunking invariance, and
//! fault behavior over realistic multi-frame streams.

mod common;

use bytes::{Buf, BytesMut};

use avl_gateway::error::FrameError;
use avl_gateway::protocol::{decode, AvlRecord, Decoded, Frame, CODEC_8, CODEC_8E};
use avl_gateway::types::SessionState;

use common::{avl_frame, bare_record, login_frame, telemetry_record};

/// Replays the frame reader: append chunks to a buffer, drain complete
/// frames, and track the auth state transition the session engine makes.
struct Harness {
    buf: BytesMut,
    state: SessionState,
    frames: Vec<Frame>,
    fault: Option<FrameError>,
}

impl Harness {
    fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            state: SessionState::Unauthenticated,
            frames: Vec::new(),
            fault: None,
        }
    }

    fn feed(&mut self, chunk: &[u8]) {
        if self.fault.is_some() {
            return;
        }
        self.buf.extend_from_slice(chunk);
        while !self.buf.is_empty() {
            match decode(self.state, &self.buf) {
                Ok(Decoded::Incomplete) => break,
                Ok(Decoded::Consumed(frame, n)) => {
                    self.buf.advance(n);
                    if matches!(frame, Frame::Login(_)) {
                        self.state = SessionState::Authenticated;
                    }
                    self.frames.push(frame);
                }
                Err(e) => {
                    self.fault = Some(e);
                    return;
                }
            }
        }
    }
}

fn run_chunked(stream: &[u8], chunk: usize) -> Harness {
    let mut harness = Harness::new();
    for piece in stream.chunks(chunk) {
        harness.feed(piece);
    }
    harness
}

#[test]
fn codec8_round_trip() {
    let records = vec![telemetry_record(1_560_160_000_000, 104_523, true)];
    let wire = avl_frame(CODEC_8, &records);

    match decode(SessionState::Authenticated, &wire).unwrap() {
        Decoded::Consumed(Frame::Avl(decoded), n) => {
            assert_eq!(n, wire.len());
            assert_eq!(decoded, records);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn codec8e_round_trip_with_variable_elements() {
    let mut record = telemetry_record(1_560_160_000_000, 104_523, false);
    record.io.two_byte.push((66, 12_400));
    record.io.eight_byte.push((16, 9_876_543_210));
    record.io.variable.push((10_358, vec![0xDE, 0xAD, 0xBE, 0xEF]));
    let records = vec![record, bare_record(1_560_160_001_000)];

    let wire = avl_frame(CODEC_8E, &records);
    match decode(SessionState::Authenticated, &wire).unwrap() {
        Decoded::Consumed(Frame::Avl(decoded), n) => {
            assert_eq!(n, wire.len());
            assert_eq!(decoded, records);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

/// The whole session stream decodes identically no matter how the bytes are
/// chunked on arrival.
#[test]
fn chunking_invariance() {
    let mut stream = login_frame("356307042441013");
    stream.extend_from_slice(&avl_frame(
        CODEC_8,
        &[telemetry_record(1, 100, true), bare_record(2)],
    ));
    stream.extend_from_slice(&avl_frame(CODEC_8E, &[bare_record(3)]));

    let whole = run_chunked(&stream, stream.len());
    assert!(whole.fault.is_none());
    assert_eq!(whole.frames.len(), 3);

    for chunk in [1, 2, 3, 5, 7, 16] {
        let split = run_chunked(&stream, chunk);
        assert_eq!(split.frames, whole.frames, "chunk size {chunk}");
        assert!(split.fault.is_none(), "chunk size {chunk}");
        assert!(split.buf.is_empty(), "chunk size {chunk}");
    }
}

/// Faults surface at the same point regardless of chunking.
#[test]
fn chunking_invariance_with_fault() {
    let mut stream = login_frame("356307042441013");
    stream.extend_from_slice(&avl_frame(CODEC_8, &[bare_record(1)]));
    let last = stream.len() - 1;
    stream[last] ^= 0x01; // flip a CRC bit
    stream.extend_from_slice(&avl_frame(CODEC_8, &[bare_record(2)]));

    let whole = run_chunked(&stream, stream.len());
    let split = run_chunked(&stream, 1);

    for harness in [&whole, &split] {
        assert_eq!(harness.frames.len(), 1, "only the login survives");
        assert!(matches!(harness.fault, Some(FrameError::BadCrc { .. })));
    }
}

#[test]
fn back_to_back_frames_in_one_chunk() {
    let mut stream = login_frame("356307042441013");
    stream.extend_from_slice(&avl_frame(CODEC_8, &[bare_record(1)]));
    stream.extend_from_slice(&avl_frame(CODEC_8, &[bare_record(2), bare_record(3)]));

    let mut harness = Harness::new();
    harness.feed(&stream);

    assert!(harness.fault.is_none());
    assert_eq!(harness.frames.len(), 3);
    match (&harness.frames[1], &harness.frames[2]) {
        (Frame::Avl(first), Frame::Avl(second)) => {
            assert_eq!(first.len(), 1);
            assert_eq!(second.len(), 2);
        }
        other => panic!("unexpected frames: {other:?}"),
    }
}

#[test]
fn empty_feed_is_a_no_op() {
    let mut harness = Harness::new();
    harness.feed(&[]);
    assert!(harness.frames.is_empty());
    assert!(harness.fault.is_none());
}

#[test]
fn max_record_count_round_trip() {
    let records: Vec<AvlRecord> = (0..255u64).map(bare_record).collect();
    let wire = avl_frame(CODEC_8, &records);

    match decode(SessionState::Authenticated, &wire).unwrap() {
        Decoded::Consumed(Frame::Avl(decoded), _) => {
            assert_eq!(decoded.len(), 255);
            assert_eq!(decoded, records);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}
