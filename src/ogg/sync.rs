// Page synchronization over an unbounded byte stream
//
// Bytes are appended with `feed`; `next_page` extracts checksum-valid pages
// from the front of the buffer. A rejected candidate always consumes at least
// one byte, so corrupt input can never stall the scanner.

use tracing::{debug, trace, warn};

use crate::error::Corruption;
use crate::ogg::page::{Page, ParseOutcome};
use crate::ogg::OGG_SIGNATURE;
use crate::stats::SyncStats;

/// Outcome of one `next_page` call
#[derive(Debug)]
pub enum Scan {
    /// A complete, checksum-valid page
    Page(Page),
    /// The buffer holds no complete page yet
    NeedMoreData,
    /// A page candidate was rejected and skipped; call again
    Corrupt(Corruption),
}

/// Sync state for one decoding session
#[derive(Debug, Default)]
pub struct SyncScanner {
    buffer: Vec<u8>,
    cursor: usize,
    // no more input will arrive; incomplete candidates are skipped
    at_end: bool,
    // bytes dropped since end of input and not yet reported
    unusable: usize,
    stats: SyncStats,
}

impl SyncScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append incoming bytes. Feeding after `finish` resumes normal scanning.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.at_end = false;
        if self.cursor > 0 {
            self.buffer.drain(..self.cursor);
            self.cursor = 0;
        }
        self.buffer.extend_from_slice(bytes);
        trace!(fed = bytes.len(), buffered = self.buffer.len(), "sync feed");
    }

    /// Bytes buffered but not yet consumed
    pub fn buffered(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    pub fn stats(&self) -> SyncStats {
        self.stats
    }

    /// Drop all buffered bytes; counters are kept
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
        self.at_end = false;
        self.unusable = 0;
    }

    /// Mark the end of input.
    ///
    /// From here on a candidate that can no longer complete is skipped one
    /// byte at a time, so pages buffered behind it are still found. Keep
    /// calling `next_page` until it returns `NeedMoreData`; the dropped spans
    /// come back as `TrailingBytes`.
    pub fn finish(&mut self) {
        self.at_end = true;
    }

    /// Whether `finish` was called since the last `feed`
    pub fn at_end(&self) -> bool {
        self.at_end
    }

    fn skip(&mut self, n: usize) {
        self.cursor += n;
        self.stats.bytes_skipped += n as u64;
    }

    /// Skip bytes that can never become part of a page
    fn drop_unusable(&mut self, n: usize) {
        self.skip(n);
        self.unusable += n;
    }

    fn take_unusable(&mut self) -> Option<Corruption> {
        if self.unusable == 0 {
            return None;
        }
        let corruption = Corruption::TrailingBytes {
            bytes: std::mem::take(&mut self.unusable),
        };
        warn!(%corruption, "input ended inside a page");
        Some(corruption)
    }

    /// Extract the next page, if one is complete
    pub fn next_page(&mut self) -> Scan {
        loop {
            let pending = &self.buffer[self.cursor..];
            match find_capture(pending) {
                Some(0) => {}
                Some(pos) => {
                    debug!(skipped = pos, "resynchronized on capture pattern");
                    if self.at_end {
                        self.drop_unusable(pos);
                    } else {
                        self.skip(pos);
                    }
                    continue;
                }
                None if self.at_end => {
                    let discard = pending.len();
                    self.drop_unusable(discard);
                    self.buffer.clear();
                    self.cursor = 0;
                    return match self.take_unusable() {
                        Some(corruption) => Scan::Corrupt(corruption),
                        None => Scan::NeedMoreData,
                    };
                }
                None => {
                    let keep = capture_prefix_suffix(pending);
                    let discard = pending.len() - keep;
                    if discard > 0 {
                        debug!(skipped = discard, "no capture pattern in buffer");
                        self.skip(discard);
                    }
                    return Scan::NeedMoreData;
                }
            }

            match Page::parse(&self.buffer[self.cursor..]) {
                ParseOutcome::Incomplete if self.at_end => {
                    debug!("candidate cut short by end of input");
                    self.drop_unusable(1);
                }
                ParseOutcome::Incomplete => return Scan::NeedMoreData,
                ParseOutcome::Complete { .. } if self.unusable > 0 => {
                    // report the dropped span before the page behind it
                    if let Some(corruption) = self.take_unusable() {
                        return Scan::Corrupt(corruption);
                    }
                }
                ParseOutcome::Complete { page, len } => {
                    self.cursor += len;
                    self.stats.pages += 1;
                    self.stats.bytes_consumed += len as u64;
                    if self.cursor == self.buffer.len() {
                        self.buffer.clear();
                        self.cursor = 0;
                    }
                    debug!(
                        serial = page.serial_number,
                        sequence = page.sequence_number,
                        len,
                        "page extracted"
                    );
                    return Scan::Page(page);
                }
                ParseOutcome::Malformed(reason) => {
                    self.skip(1);
                    self.stats.malformed += 1;
                    let corruption = Corruption::MalformedCapture { reason, skipped: 1 };
                    warn!(%corruption, "rejected page candidate");
                    return Scan::Corrupt(corruption);
                }
                ParseOutcome::BadChecksum {
                    serial_number,
                    sequence_number,
                    stored,
                    computed,
                } => {
                    self.skip(1);
                    self.stats.checksum_failures += 1;
                    let corruption = Corruption::ChecksumMismatch {
                        serial_number,
                        sequence_number,
                        stored,
                        computed,
                    };
                    warn!(%corruption, "rejected page candidate");
                    return Scan::Corrupt(corruption);
                }
            }
        }
    }
}

fn find_capture(buf: &[u8]) -> Option<usize> {
    buf.windows(OGG_SIGNATURE.len())
        .position(|w| w == OGG_SIGNATURE)
}

/// Length of the longest buffer suffix that could begin a capture pattern
fn capture_prefix_suffix(buf: &[u8]) -> usize {
    let max = buf.len().min(OGG_SIGNATURE.len() - 1);
    (1..=max)
        .rev()
        .find(|&k| buf[buf.len() - k..] == OGG_SIGNATURE[..k])
        .unwrap_or(0)
}
