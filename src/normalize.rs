//! Projection of decoded AVL records onto the Fleet API schema.

use serde::Serialize;

use crate::protocol::AvlRecord;

/// Teltonika I/O element id: total odometer.
pub const IO_ODOMETER: u16 = 199;

/// Teltonika I/O element id: ignition state.
pub const IO_IGNITION: u16 = 239;

/// One outbound position record as the Fleet API consumes it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    /// Unix milliseconds.
    pub timestamp: u64,
    /// Degrees.
    pub latitude: f64,
    /// Degrees.
    pub longitude: f64,
    /// km/h.
    pub speed: u16,
    pub angle: Option<u16>,
    pub altitude: Option<i16>,
    pub satellites: Option<u8>,
    pub odometer: Option<u64>,
    /// true iff I/O 239 = 1, false iff 0, null for anything else or absent.
    pub ignition: Option<bool>,
}

impl NormalizedRecord {
    /// Project one decoded record. Deterministic: same record in, same
    /// projection out.
    pub fn from_avl(rec: &AvlRecord) -> Self {
        let ignition = rec.io.get(IO_IGNITION).and_then(|v| match v {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        });

        Self {
            timestamp: rec.timestamp_ms,
            latitude: f64::from(rec.gps.latitude) / 1e7,
            longitude: f64::from(rec.gps.longitude) / 1e7,
            speed: rec.gps.speed,
            angle: Some(rec.gps.angle),
            altitude: Some(rec.gps.altitude),
            satellites: Some(rec.gps.satellites),
            odometer: rec.io.get(IO_ODOMETER),
            ignition,
        }
    }
}

/// Normalize a whole batch, preserving arrival order.
pub fn normalize_batch(records: &[AvlRecord]) -> Vec<NormalizedRecord> {
    records.iter().map(NormalizedRecord::from_avl).collect()
}
