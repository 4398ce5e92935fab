// Ogg packet and lacing
//
// A packet of N bytes is laced as N / 255 values of 255 followed by one
// terminating value N % 255. An exact multiple of 255 therefore ends with a 0.

use serde::Serialize;

use crate::ogg::OGG_LACING_CONTINUE;

/// Logical codec packet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Packet {
    #[serde(skip)]
    pub payload: Vec<u8>,
    pub bos: bool,
    pub eos: bool,
    pub granule_position: i64,
    pub packet_sequence: u64,
}

impl Packet {
    /// Create a packet carrying `payload`, no flags and granule 0
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Packet {
            payload: payload.into(),
            ..Default::default()
        }
    }

    /// Set the granule position
    pub fn with_granule(mut self, granule_position: i64) -> Self {
        self.granule_position = granule_position;
        self
    }

    /// Mark as the last packet of its logical stream
    pub fn with_eos(mut self) -> Self {
        self.eos = true;
        self
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Number of lacing values this packet occupies
    pub fn segment_count(&self) -> usize {
        lacing_count(self.payload.len())
    }
}

/// Number of lacing values needed for `len` bytes
pub fn lacing_count(len: usize) -> usize {
    len / OGG_LACING_CONTINUE as usize + 1
}

/// Lacing values for a packet of `len` bytes
pub fn lacing_values(len: usize) -> Vec<u8> {
    let full = len / OGG_LACING_CONTINUE as usize;
    let mut values = vec![OGG_LACING_CONTINUE; full];
    values.push((len % OGG_LACING_CONTINUE as usize) as u8);
    values
}
