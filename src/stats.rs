// Decode counters
//
// Recoverable corruption never interrupts decoding; these counters are how a
// caller notices it happened.

use serde::Serialize;

use crate::error::Corruption;

/// Sync scanner counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub pages: u64,
    pub bytes_consumed: u64,
    pub bytes_skipped: u64,
    pub checksum_failures: u64,
    pub malformed: u64,
}

/// Per logical stream counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub pages: u64,
    pub packets: u64,
    pub sequence_gaps: u64,
    pub sequence_repeats: u64,
    pub inconsistent_continuations: u64,
    pub dropped_bytes: u64,
}

impl StreamStats {
    /// Account for a stream-level corruption event
    pub(crate) fn record(&mut self, corruption: &Corruption) {
        match corruption {
            Corruption::SequenceGap { .. } => self.sequence_gaps += 1,
            Corruption::SequenceRepeat { .. } => self.sequence_repeats += 1,
            Corruption::InconsistentContinuation { dropped_bytes, .. } => {
                self.inconsistent_continuations += 1;
                self.dropped_bytes += *dropped_bytes as u64;
            }
            Corruption::TruncatedPacket { dropped_bytes, .. } => {
                self.dropped_bytes += *dropped_bytes as u64;
            }
            Corruption::MalformedCapture { .. }
            | Corruption::TrailingBytes { .. }
            | Corruption::UnterminatedStream { .. }
            | Corruption::ChecksumMismatch { .. } => {}
        }
    }

    /// Whether any loss or inconsistency was observed
    pub fn is_clean(&self) -> bool {
        self.sequence_gaps == 0
            && self.sequence_repeats == 0
            && self.inconsistent_continuations == 0
            && self.dropped_bytes == 0
    }
}

impl SyncStats {
    pub fn is_clean(&self) -> bool {
        self.bytes_skipped == 0 && self.checksum_failures == 0 && self.malformed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ContinuationFault;

    #[test]
    fn test_record_stream_corruption() {
        let mut stats = StreamStats::default();
        assert!(stats.is_clean());

        stats.record(&Corruption::SequenceGap {
            serial_number: 1,
            expected: 2,
            found: 4,
        });
        stats.record(&Corruption::InconsistentContinuation {
            serial_number: 1,
            sequence_number: 4,
            fault: ContinuationFault::MissingContinuation,
            dropped_bytes: 255,
        });

        assert_eq!(stats.sequence_gaps, 1);
        assert_eq!(stats.inconsistent_continuations, 1);
        assert_eq!(stats.dropped_bytes, 255);
        assert!(!stats.is_clean());
    }
}
