//! Decoded AVL record types.

/// GPS element of an AVL record. Coordinates are raw device integers,
/// degrees × 10⁷; the normalizer converts to floating point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GpsElement {
    pub longitude: i32,
    pub latitude: i32,
    /// Meters above sea level.
    pub altitude: i16,
    /// Heading, 0–359 degrees.
    pub angle: u16,
    pub satellites: u8,
    /// km/h.
    pub speed: u16,
}

/// I/O elements of an AVL record, grouped by value width as they appear on
/// the wire. Ids are widened to u16 so Codec 8 and 8E share one shape.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IoElements {
    pub one_byte: Vec<(u16, u8)>,
    pub two_byte: Vec<(u16, u16)>,
    pub four_byte: Vec<(u16, u32)>,
    pub eight_byte: Vec<(u16, u64)>,
    /// Codec 8E variable-width elements.
    pub variable: Vec<(u16, Vec<u8>)>,
}

impl IoElements {
    /// Look up a fixed-width element by id, value widened to u64. Devices do
    /// not repeat an id across blocks; the first hit wins if one does.
    pub fn get(&self, id: u16) -> Option<u64> {
        self.one_byte
            .iter()
            .find(|(i, _)| *i == id)
            .map(|(_, v)| u64::from(*v))
            .or_else(|| {
                self.two_byte
                    .iter()
                    .find(|(i, _)| *i == id)
                    .map(|(_, v)| u64::from(*v))
            })
            .or_else(|| {
                self.four_byte
                    .iter()
                    .find(|(i, _)| *i == id)
                    .map(|(_, v)| u64::from(*v))
            })
            .or_else(|| {
                self.eight_byte
                    .iter()
                    .find(|(i, _)| *i == id)
                    .map(|(_, v)| *v)
            })
    }

    /// Total number of elements across all blocks.
    pub fn len(&self) -> usize {
        self.one_byte.len()
            + self.two_byte.len()
            + self.four_byte.len()
            + self.eight_byte.len()
            + self.variable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One decoded position fix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvlRecord {
    /// Unix milliseconds.
    pub timestamp_ms: u64,
    pub priority: u8,
    pub gps: GpsElement,
    /// I/O id that triggered the record, 0 for periodic records.
    pub event_io_id: u16,
    pub io: IoElements,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_lookup_across_widths() {
        let io = IoElements {
            one_byte: vec![(239, 1)],
            two_byte: vec![(66, 12_000)],
            four_byte: vec![(199, 104_523)],
            eight_byte: vec![(16, 9_876_543_210)],
            variable: vec![],
        };

        assert_eq!(io.get(239), Some(1));
        assert_eq!(io.get(66), Some(12_000));
        assert_eq!(io.get(199), Some(104_523));
        assert_eq!(io.get(16), Some(9_876_543_210));
        assert_eq!(io.get(240), None);
        assert_eq!(io.len(), 4);
    }
}
