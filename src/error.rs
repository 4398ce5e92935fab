//! Error and corruption types.
//!
//! Two families:
//!
//! - [`OggError`] is fatal for the per-stream state it is raised on (submit
//!   after eos, serial number reuse, pages for a closed stream). The session
//!   that owns the stream keeps working.
//! - [`Corruption`] is recoverable. The scanner and demultiplexer hand these
//!   back as events and keep going; they are never returned as `Err`.

use serde::Serialize;
use thiserror::Error;

/// Fatal framing errors
#[derive(Debug, Error)]
pub enum OggError {
    #[error("stream {serial:#010x} is closed")]
    StreamClosed { serial: u32 },

    #[error("serial number {serial:#010x} is already in use")]
    SerialCollision { serial: u32 },

    #[error("no open stream with serial number {serial:#010x}")]
    UnknownStream { serial: u32 },

    #[error("stream {serial:#010x} has not emitted its eos page")]
    StreamNotFinished { serial: u32 },

    #[error("page for stream {found:#010x} handed to stream {expected:#010x}")]
    SerialMismatch { expected: u32, found: u32 },

    #[error("invalid page for stream {serial:#010x}: {reason}")]
    InvalidPage { serial: u32, reason: MalformedReason },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OggError>;

/// Why a candidate page failed structural parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum MalformedReason {
    /// Version byte is not 0
    UnsupportedVersion(u8),
    /// Segment count of 0
    EmptySegmentTable,
    /// More than 255 lacing values
    TooManySegments(usize),
    /// Body length differs from the sum of the segment table
    BodyLengthMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedReason::UnsupportedVersion(v) => write!(f, "unsupported version {}", v),
            MalformedReason::EmptySegmentTable => write!(f, "empty segment table"),
            MalformedReason::TooManySegments(n) => write!(f, "{} segments, at most 255", n),
            MalformedReason::BodyLengthMismatch { expected, actual } => write!(
                f,
                "segment table describes {} body byte(s), body has {}",
                expected, actual
            ),
        }
    }
}

/// Which side of the continuation contract was broken
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationFault {
    /// Page is flagged continued but nothing was carried over
    UnexpectedContinuation,
    /// A partial packet was carried over but the page is not flagged continued
    MissingContinuation,
}

/// Recoverable corruption observed while decoding
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Corruption {
    #[error("malformed page candidate ({reason}), skipped {skipped} byte(s)")]
    MalformedCapture {
        reason: MalformedReason,
        skipped: usize,
    },

    #[error("{bytes} trailing byte(s) at end of input do not form a page")]
    TrailingBytes { bytes: usize },

    #[error(
        "checksum mismatch on page {sequence_number} of stream {serial_number:#010x}: \
         stored {stored:#010x}, computed {computed:#010x}"
    )]
    ChecksumMismatch {
        serial_number: u32,
        sequence_number: u32,
        stored: u32,
        computed: u32,
    },

    #[error("stream {serial_number:#010x}: expected page {expected}, got {found}")]
    SequenceGap {
        serial_number: u32,
        expected: u32,
        found: u32,
    },

    #[error("stream {serial_number:#010x}: page {found} repeated (last was {last})")]
    SequenceRepeat {
        serial_number: u32,
        last: u32,
        found: u32,
    },

    #[error(
        "stream {serial_number:#010x}: inconsistent continuation on page {sequence_number} \
         ({fault:?}), dropped {dropped_bytes} byte(s)"
    )]
    InconsistentContinuation {
        serial_number: u32,
        sequence_number: u32,
        fault: ContinuationFault,
        dropped_bytes: usize,
    },

    #[error("stream {serial_number:#010x}: unterminated packet of {dropped_bytes} byte(s) abandoned")]
    TruncatedPacket {
        serial_number: u32,
        dropped_bytes: usize,
    },

    #[error("stream {serial_number:#010x}: input ended before its eos page")]
    UnterminatedStream { serial_number: u32 },
}

impl Corruption {
    /// Serial number of the affected stream, when the corruption is stream-level
    pub fn serial_number(&self) -> Option<u32> {
        match self {
            Corruption::MalformedCapture { .. } | Corruption::TrailingBytes { .. } => None,
            Corruption::ChecksumMismatch { serial_number, .. }
            | Corruption::SequenceGap { serial_number, .. }
            | Corruption::SequenceRepeat { serial_number, .. }
            | Corruption::InconsistentContinuation { serial_number, .. }
            | Corruption::TruncatedPacket { serial_number, .. }
            | Corruption::UnterminatedStream { serial_number } => Some(*serial_number),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = OggError::StreamClosed { serial: 0x1234 };
        assert_eq!(err.to_string(), "stream 0x00001234 is closed");

        let err = OggError::SerialCollision { serial: 7 };
        assert!(err.to_string().contains("already in use"));

        let err = OggError::InvalidPage {
            serial: 1,
            reason: MalformedReason::BodyLengthMismatch {
                expected: 10,
                actual: 3,
            },
        };
        assert_eq!(
            err.to_string(),
            "invalid page for stream 0x00000001: segment table describes 10 body byte(s), body has 3"
        );
    }

    #[test]
    fn test_corruption_serial_number() {
        let c = Corruption::MalformedCapture {
            reason: MalformedReason::EmptySegmentTable,
            skipped: 1,
        };
        assert_eq!(c.serial_number(), None);

        let c = Corruption::SequenceGap {
            serial_number: 42,
            expected: 3,
            found: 5,
        };
        assert_eq!(c.serial_number(), Some(42));
    }

    #[test]
    fn test_corruption_serializes_with_type_tag() {
        let c = Corruption::TruncatedPacket {
            serial_number: 9,
            dropped_bytes: 510,
        };
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["type"], "truncated_packet");
        assert_eq!(json["dropped_bytes"], 510);
    }
}
