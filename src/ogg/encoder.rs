// Multi-stream encoder
//
// Owns one StreamMuxer per serial number and appends every page they emit to
// a single output queue, in the order the caller asked for them. No
// interleaving policy is applied here.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rand::Rng;
use tracing::debug;

use crate::config::MuxConfig;
use crate::error::{OggError, Result};
use crate::ogg::mux::StreamMuxer;
use crate::ogg::packet::Packet;
use crate::ogg::page::Page;

/// Handle to a logical stream opened on an [`Encoder`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamHandle(u32);

impl StreamHandle {
    pub fn serial_number(self) -> u32 {
        self.0
    }
}

/// Physical stream encoder
#[derive(Debug, Default)]
pub struct Encoder {
    config: MuxConfig,
    streams: BTreeMap<u32, StreamMuxer>,
    // every serial number ever opened on this physical stream
    used_serials: BTreeSet<u32>,
    output: VecDeque<Vec<u8>>,
    pages_emitted: u64,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encoder whose streams all use `config`
    pub fn with_config(config: MuxConfig) -> Self {
        Encoder {
            config,
            ..Default::default()
        }
    }

    /// Open a logical stream. Without a serial number a random non-zero one
    /// is picked that no other stream of this encoder has used.
    pub fn open_stream(&mut self, serial_number: Option<u32>) -> Result<StreamHandle> {
        let serial = match serial_number {
            Some(serial) if self.used_serials.contains(&serial) => {
                return Err(OggError::SerialCollision { serial });
            }
            Some(serial) => serial,
            None => {
                let mut rng = rand::thread_rng();
                loop {
                    let candidate = rng.gen_range(1..=u32::MAX);
                    if !self.used_serials.contains(&candidate) {
                        break candidate;
                    }
                }
            }
        };

        self.used_serials.insert(serial);
        self.streams
            .insert(serial, StreamMuxer::with_config(serial, self.config.clone()));
        debug!(serial, random = serial_number.is_none(), "output stream opened");
        Ok(StreamHandle(serial))
    }

    fn stream_mut(&mut self, handle: StreamHandle) -> Result<&mut StreamMuxer> {
        self.streams
            .get_mut(&handle.0)
            .ok_or(OggError::UnknownStream { serial: handle.0 })
    }

    pub fn stream(&self, handle: StreamHandle) -> Option<&StreamMuxer> {
        self.streams.get(&handle.0)
    }

    /// Queue a packet on one stream
    pub fn submit(&mut self, handle: StreamHandle, packet: Packet) -> Result<()> {
        self.stream_mut(handle)?.submit(packet)
    }

    fn push(&mut self, page: Page) {
        self.pages_emitted += 1;
        self.output.push_back(page.to_bytes());
    }

    /// Ask one stream for a page if it has a full one; returns whether a page
    /// was appended to the output
    pub fn pageout(&mut self, handle: StreamHandle) -> Result<bool> {
        match self.stream_mut(handle)?.pageout() {
            Some(page) => {
                self.push(page);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Force one page out of a stream; returns whether a page was appended
    pub fn flush(&mut self, handle: StreamHandle) -> Result<bool> {
        match self.stream_mut(handle)?.flush() {
            Some(page) => {
                self.push(page);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Flush a stream until nothing is pending; returns the page count
    pub fn flush_all(&mut self, handle: StreamHandle) -> Result<usize> {
        let pages = self.stream_mut(handle)?.flush_all();
        let count = pages.len();
        for page in pages {
            self.push(page);
        }
        Ok(count)
    }

    /// Take all completed pages, oldest first
    pub fn drain(&mut self) -> Vec<Vec<u8>> {
        self.output.drain(..).collect()
    }

    /// Take all completed pages as one byte sequence
    pub fn drain_bytes(&mut self) -> Vec<u8> {
        self.output.drain(..).flatten().collect()
    }

    /// Pages produced but not drained yet
    pub fn pending_pages(&self) -> usize {
        self.output.len()
    }

    /// Total pages produced so far
    pub fn pages_emitted(&self) -> u64 {
        self.pages_emitted
    }

    /// Drop a stream whose eos page has been emitted, or one that never
    /// received a packet. Its serial number stays reserved for this physical
    /// stream.
    pub fn release(&mut self, handle: StreamHandle) -> Result<()> {
        let stream = self
            .streams
            .get(&handle.0)
            .ok_or(OggError::UnknownStream { serial: handle.0 })?;
        if !stream.is_finished() && !stream.is_unused() {
            return Err(OggError::StreamNotFinished { serial: handle.0 });
        }
        self.streams.remove(&handle.0);
        debug!(serial = handle.0, "output stream released");
        Ok(())
    }

    /// True once at least one stream was opened and every stream still held
    /// has emitted its eos page. Streams that never got a packet count until
    /// they are released.
    pub fn is_finished(&self) -> bool {
        !self.used_serials.is_empty() && self.streams.values().all(StreamMuxer::is_finished)
    }
}
