use serde::Serialize;

use crate::error::{MalformedReason, OggError, Result};
use crate::ogg::{
    crc, OGG_CRC_OFFSET, OGG_HEADER_SIZE, OGG_HEADER_TYPE_BOS, OGG_HEADER_TYPE_CONTINUATION,
    OGG_HEADER_TYPE_EOS, OGG_LACING_CONTINUE, OGG_MAX_SEGMENTS, OGG_SIGNATURE, OGG_VERSION,
};

/// OGG Page
///
/// Fields are public for inspection. Pages built by hand should go through
/// [`Page::new`], which checks the segment table against the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub header_type: u8,
    pub granule_position: i64,
    pub serial_number: u32,
    pub sequence_number: u32,
    pub checksum: u32,
    pub segment_table: Vec<u8>,
    pub body: Vec<u8>,
}

/// Header summary of a page, without the body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub serial_number: u32,
    pub sequence_number: u32,
    pub granule_position: i64,
    pub continued: bool,
    pub bos: bool,
    pub eos: bool,
    pub segments: usize,
    pub body_len: usize,
    pub packets: usize,
    pub checksum: u32,
}

/// Result of parsing a page candidate at the start of a buffer
#[derive(Debug)]
pub(crate) enum ParseOutcome {
    /// Valid page occupying the first `len` bytes
    Complete { page: Page, len: usize },
    /// Buffer ends before the page does
    Incomplete,
    /// Structurally invalid header
    Malformed(MalformedReason),
    /// Complete candidate whose checksum does not match
    BadChecksum {
        serial_number: u32,
        sequence_number: u32,
        stored: u32,
        computed: u32,
    },
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(raw)
}

fn le_i64(bytes: &[u8]) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    i64::from_le_bytes(raw)
}

impl Page {
    /// Build a page and fill in its checksum.
    ///
    /// Fails unless the table holds between 1 and 255 entries and the body
    /// length equals the sum of the table.
    pub fn new(
        serial_number: u32,
        sequence_number: u32,
        header_type: u8,
        granule_position: i64,
        segment_table: Vec<u8>,
        body: Vec<u8>,
    ) -> Result<Self> {
        let page = Self::from_parts(
            serial_number,
            sequence_number,
            header_type,
            granule_position,
            segment_table,
            body,
        );
        page.validate()?;
        Ok(page)
    }

    /// Build a page whose layout the caller already guarantees
    pub(crate) fn from_parts(
        serial_number: u32,
        sequence_number: u32,
        header_type: u8,
        granule_position: i64,
        segment_table: Vec<u8>,
        body: Vec<u8>,
    ) -> Self {
        let mut page = Page {
            header_type,
            granule_position,
            serial_number,
            sequence_number,
            checksum: 0,
            segment_table,
            body,
        };
        page.checksum = page.compute_checksum();
        page
    }

    /// Check the segment table against the body
    pub fn validate(&self) -> Result<()> {
        let reason = if self.segment_table.is_empty() {
            MalformedReason::EmptySegmentTable
        } else if self.segment_table.len() > OGG_MAX_SEGMENTS {
            MalformedReason::TooManySegments(self.segment_table.len())
        } else {
            let expected = self.segment_table.iter().map(|&x| x as usize).sum();
            if expected == self.body.len() {
                return Ok(());
            }
            MalformedReason::BodyLengthMismatch {
                expected,
                actual: self.body.len(),
            }
        };
        Err(OggError::InvalidPage {
            serial: self.serial_number,
            reason,
        })
    }

    /// Parse one page from the start of `buf`
    pub(crate) fn parse(buf: &[u8]) -> ParseOutcome {
        if buf.len() < OGG_HEADER_SIZE {
            return ParseOutcome::Incomplete;
        }
        debug_assert_eq!(&buf[0..4], OGG_SIGNATURE);

        let version = buf[4];
        if version != OGG_VERSION {
            return ParseOutcome::Malformed(MalformedReason::UnsupportedVersion(version));
        }

        let segment_count = buf[26] as usize;
        if segment_count == 0 {
            return ParseOutcome::Malformed(MalformedReason::EmptySegmentTable);
        }

        let header_len = OGG_HEADER_SIZE + segment_count;
        if buf.len() < header_len {
            return ParseOutcome::Incomplete;
        }

        let segment_table = &buf[OGG_HEADER_SIZE..header_len];
        let body_len: usize = segment_table.iter().map(|&x| x as usize).sum();
        let len = header_len + body_len;
        if buf.len() < len {
            return ParseOutcome::Incomplete;
        }

        let serial_number = le_u32(&buf[14..18]);
        let sequence_number = le_u32(&buf[18..22]);
        let stored = le_u32(&buf[OGG_CRC_OFFSET..OGG_CRC_OFFSET + 4]);
        let computed = Self::checksum_of(&buf[..len]);
        if stored != computed {
            return ParseOutcome::BadChecksum {
                serial_number,
                sequence_number,
                stored,
                computed,
            };
        }

        let page = Page {
            header_type: buf[5],
            granule_position: le_i64(&buf[6..14]),
            serial_number,
            sequence_number,
            checksum: stored,
            segment_table: segment_table.to_vec(),
            body: buf[header_len..len].to_vec(),
        };
        ParseOutcome::Complete { page, len }
    }

    /// Checksum of raw page bytes, computed with the checksum field zeroed
    fn checksum_of(raw: &[u8]) -> u32 {
        let mut crc = crc::update(0, &raw[..OGG_CRC_OFFSET]);
        crc = crc::update(crc, &[0u8; 4]);
        crc::update(crc, &raw[OGG_CRC_OFFSET + 4..])
    }

    /// Check the stored checksum of a complete serialized page
    pub fn verify(raw: &[u8]) -> bool {
        if raw.len() < OGG_HEADER_SIZE || &raw[0..4] != OGG_SIGNATURE {
            return false;
        }
        let stored = le_u32(&raw[OGG_CRC_OFFSET..OGG_CRC_OFFSET + 4]);
        Self::checksum_of(raw) == stored
    }

    /// Checksum over this page's header (checksum field zeroed) and body
    pub fn compute_checksum(&self) -> u32 {
        let mut header = Vec::with_capacity(self.header_len());
        self.write_header(&mut header, 0);
        crc::update(crc::checksum(&header), &self.body)
    }

    fn write_header(&self, out: &mut Vec<u8>, checksum: u32) {
        out.extend_from_slice(OGG_SIGNATURE);
        out.push(OGG_VERSION);
        out.push(self.header_type);
        out.extend_from_slice(&self.granule_position.to_le_bytes());
        out.extend_from_slice(&self.serial_number.to_le_bytes());
        out.extend_from_slice(&self.sequence_number.to_le_bytes());
        out.extend_from_slice(&checksum.to_le_bytes());
        out.push(self.segment_table.len() as u8);
        out.extend_from_slice(&self.segment_table);
    }

    /// Serialize header and body.
    ///
    /// The segment count byte is only meaningful for pages that pass
    /// [`Page::validate`]; [`PageWriter`](crate::io::PageWriter) checks this
    /// before writing.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        self.write_header(&mut out, self.checksum);
        out.extend_from_slice(&self.body);
        out
    }

    /// Header length including the segment table
    pub fn header_len(&self) -> usize {
        OGG_HEADER_SIZE + self.segment_table.len()
    }

    /// Total serialized length
    pub fn len(&self) -> usize {
        self.header_len() + self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segment_table.is_empty()
    }

    /// Check if this page starts with the tail of a packet from the previous page
    pub fn is_continued(&self) -> bool {
        self.header_type & OGG_HEADER_TYPE_CONTINUATION != 0
    }

    /// Check if this is the beginning of a stream
    pub fn is_bos(&self) -> bool {
        self.header_type & OGG_HEADER_TYPE_BOS != 0
    }

    /// Check if this is the end of a stream
    pub fn is_eos(&self) -> bool {
        self.header_type & OGG_HEADER_TYPE_EOS != 0
    }

    /// Number of packets that terminate on this page
    pub fn packet_count(&self) -> usize {
        self.segment_table
            .iter()
            .filter(|&&v| v < OGG_LACING_CONTINUE)
            .count()
    }

    /// Whether the last packet on the page continues on the next one
    pub fn ends_with_partial(&self) -> bool {
        self.segment_table.last() == Some(&OGG_LACING_CONTINUE)
    }

    pub fn info(&self) -> PageInfo {
        PageInfo {
            serial_number: self.serial_number,
            sequence_number: self.sequence_number,
            granule_position: self.granule_position,
            continued: self.is_continued(),
            bos: self.is_bos(),
            eos: self.is_eos(),
            segments: self.segment_table.len(),
            body_len: self.body.len(),
            packets: self.packet_count(),
            checksum: self.checksum,
        }
    }
}
