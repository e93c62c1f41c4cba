//! Frame builders shared by the integration tests. The gateway only ever
//! decodes; encoding lives here so tests can synthesize device traffic.

#![allow(dead_code)]

use avl_gateway::protocol::{crc16_ibm, AvlRecord, GpsElement, IoElements, CODEC_8E, PREAMBLE};

/// Encode an IMEI login frame: u16 length prefix + ASCII digits.
pub fn login_frame(imei: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + imei.len());
    out.extend_from_slice(&(imei.len() as u16).to_be_bytes());
    out.extend_from_slice(imei.as_bytes());
    out
}

/// Encode a complete AVL frame: preamble, length, data field, CRC.
pub fn avl_frame(codec: u8, records: &[AvlRecord]) -> Vec<u8> {
    let wide = codec == CODEC_8E;

    let mut data = vec![codec, records.len() as u8];
    for record in records {
        encode_record(record, wide, &mut data);
    }
    data.push(records.len() as u8);

    let mut out = Vec::with_capacity(12 + data.len());
    out.extend_from_slice(&PREAMBLE);
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&u32::from(crc16_ibm(&data)).to_be_bytes());
    out
}

/// A record with a plausible fix and no I/O elements.
pub fn bare_record(timestamp_ms: u64) -> AvlRecord {
    AvlRecord {
        timestamp_ms,
        priority: 1,
        gps: GpsElement {
            longitude: 252_420_832,
            latitude: 546_482_904,
            altitude: 118,
            angle: 251,
            satellites: 9,
            speed: 63,
        },
        event_io_id: 0,
        io: IoElements::default(),
    }
}

/// A record carrying odometer (199) and ignition (239) I/O elements.
pub fn telemetry_record(timestamp_ms: u64, odometer: u32, ignition_on: bool) -> AvlRecord {
    let mut record = bare_record(timestamp_ms);
    record.event_io_id = 239;
    record.io.one_byte.push((239, u8::from(ignition_on)));
    record.io.four_byte.push((199, odometer));
    record
}

fn put_id(out: &mut Vec<u8>, wide: bool, id: u16) {
    if wide {
        out.extend_from_slice(&id.to_be_bytes());
    } else {
        out.push(id as u8);
    }
}

fn encode_record(record: &AvlRecord, wide: bool, out: &mut Vec<u8>) {
    out.extend_from_slice(&record.timestamp_ms.to_be_bytes());
    out.push(record.priority);

    out.extend_from_slice(&record.gps.longitude.to_be_bytes());
    out.extend_from_slice(&record.gps.latitude.to_be_bytes());
    out.extend_from_slice(&record.gps.altitude.to_be_bytes());
    out.extend_from_slice(&record.gps.angle.to_be_bytes());
    out.push(record.gps.satellites);
    out.extend_from_slice(&record.gps.speed.to_be_bytes());

    put_id(out, wide, record.event_io_id);
    put_id(out, wide, record.io.len() as u16);

    put_id(out, wide, record.io.one_byte.len() as u16);
    for &(id, v) in &record.io.one_byte {
        put_id(out, wide, id);
        out.push(v);
    }

    put_id(out, wide, record.io.two_byte.len() as u16);
    for &(id, v) in &record.io.two_byte {
        put_id(out, wide, id);
        out.extend_from_slice(&v.to_be_bytes());
    }

    put_id(out, wide, record.io.four_byte.len() as u16);
    for &(id, v) in &record.io.four_byte {
        put_id(out, wide, id);
        out.extend_from_slice(&v.to_be_bytes());
    }

    put_id(out, wide, record.io.eight_byte.len() as u16);
    for &(id, v) in &record.io.eight_byte {
        put_id(out, wide, id);
        out.extend_from_slice(&v.to_be_bytes());
    }

    if wide {
        out.extend_from_slice(&(record.io.variable.len() as u16).to_be_bytes());
        for (id, bytes) in &record.io.variable {
            out.extend_from_slice(&id.to_be_bytes());
            out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
            out.extend_from_slice(bytes);
        }
    }
}
