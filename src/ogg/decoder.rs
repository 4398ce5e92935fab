// Pull-based decoding session
//
// Chains a SyncScanner into a Demultiplexer. Bytes go in with `feed`, events
// come out of `events()` until the buffered input is exhausted; feeding more
// bytes and iterating again resumes where the session left off.

use std::collections::VecDeque;

use tracing::{debug, warn};

use crate::error::{Corruption, OggError};
use crate::ogg::demux::{DemuxEvent, Demultiplexer};
use crate::ogg::packet::Packet;
use crate::ogg::page::{Page, PageInfo};
use crate::ogg::sync::{Scan, SyncScanner};
use crate::stats::{StreamStats, SyncStats};

/// Everything a decoding session reports
#[derive(Debug)]
pub enum DecodeEvent {
    /// First page of a serial number; precedes that page's `Page` event
    StreamOpened { serial_number: u32 },
    /// A checksum-valid page was accepted by its stream
    Page(PageInfo),
    Packet { serial_number: u32, packet: Packet },
    Corrupt(Corruption),
    StreamEnded { serial_number: u32 },
    /// A page was refused by its stream; other streams are unaffected
    StreamError { serial_number: u32, error: OggError },
}

impl From<DemuxEvent> for DecodeEvent {
    fn from(event: DemuxEvent) -> Self {
        match event {
            DemuxEvent::StreamOpened { serial_number } => DecodeEvent::StreamOpened { serial_number },
            DemuxEvent::Packet {
                serial_number,
                packet,
            } => DecodeEvent::Packet {
                serial_number,
                packet,
            },
            DemuxEvent::Corrupt(corruption) => DecodeEvent::Corrupt(corruption),
            DemuxEvent::StreamEnded { serial_number } => DecodeEvent::StreamEnded { serial_number },
        }
    }
}

/// Decoding session over one physical stream
#[derive(Debug, Default)]
pub struct Decoder {
    scanner: SyncScanner,
    demux: Demultiplexer,
    queue: VecDeque<DecodeEvent>,
    finished: bool,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append input bytes. Bytes fed after `finish` start a new physical
    /// stream section with the existing stream states.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.finished = false;
        self.scanner.feed(bytes);
    }

    /// Events available from the bytes fed so far
    pub fn events(&mut self) -> Events<'_> {
        Events { decoder: self }
    }

    /// Next event, or `None` when more input is needed
    pub fn next_event(&mut self) -> Option<DecodeEvent> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(event);
            }
            match self.scanner.next_page() {
                Scan::NeedMoreData => return None,
                Scan::Corrupt(corruption) => return Some(DecodeEvent::Corrupt(corruption)),
                Scan::Page(page) => self.route(page),
            }
        }
    }

    fn route(&mut self, page: Page) {
        let serial_number = page.serial_number;
        match self.demux.accept_page(&page) {
            Ok(events) => {
                let mut page_event = Some(DecodeEvent::Page(page.info()));
                for event in events {
                    if !matches!(event, DemuxEvent::StreamOpened { .. }) {
                        if let Some(info) = page_event.take() {
                            self.queue.push_back(info);
                        }
                    }
                    self.queue.push_back(event.into());
                }
                if let Some(info) = page_event {
                    self.queue.push_back(info);
                }
            }
            Err(error) => {
                warn!(serial = serial_number, %error, "page refused");
                self.queue
                    .push_back(DecodeEvent::StreamError { serial_number, error });
            }
        }
    }

    /// End of input. Decodes any complete pages still buffered, including
    /// pages stuck behind a candidate the input cut short, then reports
    /// trailing bytes and unterminated packets. The returned events include
    /// everything not yet taken from `events()`.
    pub fn finish(&mut self) -> Vec<DecodeEvent> {
        let mut events: Vec<DecodeEvent> = self.events().collect();
        if self.finished {
            return events;
        }
        self.finished = true;

        self.scanner.finish();
        events.extend(self.events());
        events.extend(self.demux.finish().into_iter().map(DecodeEvent::Corrupt));
        debug!(
            pages = self.scanner.stats().pages,
            streams = self.demux.serial_numbers().count(),
            "decoding finished"
        );
        events
    }

    pub fn sync_stats(&self) -> SyncStats {
        self.scanner.stats()
    }

    /// Counters of one logical stream
    pub fn stream_stats(&self, serial_number: u32) -> Option<StreamStats> {
        self.demux.stream(serial_number).map(|state| state.stats())
    }

    pub fn demux(&self) -> &Demultiplexer {
        &self.demux
    }

    /// Drop the decode state of a stream, e.g. after its `StreamEnded`
    pub fn evict(&mut self, serial_number: u32) -> bool {
        self.demux.evict(serial_number).is_some()
    }
}

/// Lazy iterator over decode events; ends when input runs out
pub struct Events<'a> {
    decoder: &'a mut Decoder,
}

impl Iterator for Events<'_> {
    type Item = DecodeEvent;

    fn next(&mut self) -> Option<DecodeEvent> {
        self.decoder.next_event()
    }
}
