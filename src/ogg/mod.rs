// Ogg physical bitstream framing
//
// OGG Page Layout:
// - Capture Pattern: "OggS" (4 bytes)
// - Version: 0 (1 byte)
// - Header Type: 1=continued, 2=bos, 4=eos (1 byte)
// - Granule Position (8 bytes, LE)
// - Bitstream Serial Number (4 bytes, LE)
// - Page Sequence Number (4 bytes, LE)
// - CRC Checksum (4 bytes, LE)
// - Number of Page Segments (1 byte)
// - Segment Table (variable)
// - Body (sum of the segment table)
//
// Decode: bytes -> SyncScanner -> Page -> Demultiplexer -> packets
// Encode: packets -> StreamMuxer -> Page -> Encoder output

pub mod crc;
pub mod decoder;
pub mod demux;
pub mod encoder;
pub mod mux;
pub mod packet;
pub mod page;
pub mod sync;

pub use decoder::{DecodeEvent, Decoder, Events};
pub use demux::{DemuxEvent, Demultiplexer, StreamDecodeState, StreamEvent};
pub use encoder::{Encoder, StreamHandle};
pub use mux::StreamMuxer;
pub use packet::{lacing_values, Packet};
pub use page::{Page, PageInfo};
pub use sync::{Scan, SyncScanner};

/// OGG capture pattern
pub const OGG_SIGNATURE: &[u8; 4] = b"OggS";

/// Only stream structure version defined by the format
pub const OGG_VERSION: u8 = 0;

/// Page continues a packet begun on the previous page
pub const OGG_HEADER_TYPE_CONTINUATION: u8 = 0x01;
/// Beginning of Stream
pub const OGG_HEADER_TYPE_BOS: u8 = 0x02;
/// End of Stream
pub const OGG_HEADER_TYPE_EOS: u8 = 0x04;

/// Fixed header size, before the segment table
pub const OGG_HEADER_SIZE: usize = 27;

/// Byte offset of the checksum field inside the header
pub(crate) const OGG_CRC_OFFSET: usize = 22;

/// Segment table capacity
pub const OGG_MAX_SEGMENTS: usize = 255;

/// Largest lacing value; a segment of this size continues its packet
pub const OGG_LACING_CONTINUE: u8 = 255;

/// Largest possible page: full header, full segment table, 255 * 255 body bytes
pub const OGG_MAX_PAGE_SIZE: usize =
    OGG_HEADER_SIZE + OGG_MAX_SEGMENTS + OGG_MAX_SEGMENTS * OGG_LACING_CONTINUE as usize;
