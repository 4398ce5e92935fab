//! Oggframe - Ogg bitstream framing
//!
//! Splits a byte stream into checksum-verified pages, reassembles the packets
//! of every multiplexed logical stream, and performs the inverse: packs
//! packets into pages and interleaves the pages of several streams into one
//! output. Codec payloads are opaque.
//!
//! ```
//! use oggframe::{Decoder, DecodeEvent, Encoder, Packet};
//!
//! let mut encoder = Encoder::new();
//! let stream = encoder.open_stream(None)?;
//! encoder.submit(stream, Packet::new(b"hello".to_vec()).with_eos())?;
//! encoder.flush_all(stream)?;
//!
//! let mut decoder = Decoder::new();
//! decoder.feed(&encoder.drain_bytes());
//! let payloads: Vec<Vec<u8>> = decoder
//!     .events()
//!     .filter_map(|event| match event {
//!         DecodeEvent::Packet { packet, .. } => Some(packet.payload),
//!         _ => None,
//!     })
//!     .collect();
//! assert_eq!(payloads, vec![b"hello".to_vec()]);
//! # Ok::<(), oggframe::OggError>(())
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod ogg;
pub mod stats;

pub use config::{MuxConfig, ReaderConfig};
pub use error::{ContinuationFault, Corruption, MalformedReason, OggError, Result};
pub use io::{DecodeReader, PageReader, PageWriter};
pub use ogg::{
    DecodeEvent, Decoder, Demultiplexer, Encoder, Packet, Page, PageInfo, Scan, StreamHandle,
    StreamMuxer, SyncScanner,
};
pub use stats::{StreamStats, SyncStats};
