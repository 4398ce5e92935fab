// Byte source and sink adapters
//
// The framing core never touches IO. These wrappers pump a `Read` into the
// sync scanner or decoder in fixed-size chunks and drain encoder output into
// a `Write`.

use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};

use tracing::{debug, trace};

use crate::config::ReaderConfig;
use crate::error::Result;
use crate::ogg::decoder::{DecodeEvent, Decoder};
use crate::ogg::encoder::Encoder;
use crate::ogg::page::Page;
use crate::ogg::sync::{Scan, SyncScanner};
use crate::stats::SyncStats;

fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    loop {
        match reader.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Iterator over the checksum-valid pages of a byte source.
///
/// Corrupt candidates are skipped; see [`PageReader::stats`] for how many.
pub struct PageReader<R> {
    reader: R,
    scanner: SyncScanner,
    chunk: Vec<u8>,
    eof: bool,
}

impl<R: Read> PageReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, ReaderConfig::default())
    }

    pub fn with_config(reader: R, config: ReaderConfig) -> Self {
        PageReader {
            reader,
            scanner: SyncScanner::new(),
            chunk: vec![0; config.chunk_size.max(1)],
            eof: false,
        }
    }

    pub fn stats(&self) -> SyncStats {
        self.scanner.stats()
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: Read> Iterator for PageReader<R> {
    type Item = Result<Page>;

    fn next(&mut self) -> Option<Result<Page>> {
        loop {
            match self.scanner.next_page() {
                Scan::Page(page) => return Some(Ok(page)),
                Scan::Corrupt(_) => continue,
                Scan::NeedMoreData if self.eof => {
                    if self.scanner.at_end() {
                        return None;
                    }
                    self.scanner.finish();
                }
                Scan::NeedMoreData => match read_chunk(&mut self.reader, &mut self.chunk) {
                    Ok(0) => self.eof = true,
                    Ok(n) => {
                        trace!(read = n, "page reader chunk");
                        self.scanner.feed(&self.chunk[..n]);
                    }
                    Err(e) => return Some(Err(e)),
                },
            }
        }
    }
}

/// Iterator over the decode events of a byte source.
///
/// End-of-input events from [`Decoder::finish`] are yielded last.
pub struct DecodeReader<R> {
    reader: R,
    decoder: Decoder,
    chunk: Vec<u8>,
    tail: Option<VecDeque<DecodeEvent>>,
}

impl<R: Read> DecodeReader<R> {
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, ReaderConfig::default())
    }

    pub fn with_config(reader: R, config: ReaderConfig) -> Self {
        DecodeReader {
            reader,
            decoder: Decoder::new(),
            chunk: vec![0; config.chunk_size.max(1)],
            tail: None,
        }
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }
}

impl<R: Read> Iterator for DecodeReader<R> {
    type Item = Result<DecodeEvent>;

    fn next(&mut self) -> Option<Result<DecodeEvent>> {
        loop {
            if let Some(tail) = self.tail.as_mut() {
                return tail.pop_front().map(Ok);
            }
            if let Some(event) = self.decoder.next_event() {
                return Some(Ok(event));
            }
            match read_chunk(&mut self.reader, &mut self.chunk) {
                Ok(0) => {
                    debug!("decode reader reached end of input");
                    self.tail = Some(self.decoder.finish().into());
                }
                Ok(n) => self.decoder.feed(&self.chunk[..n]),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Sink for encoded pages
pub struct PageWriter<W> {
    writer: W,
    pages_written: u64,
    bytes_written: u64,
}

impl<W: Write> PageWriter<W> {
    pub fn new(writer: W) -> Self {
        PageWriter {
            writer,
            pages_written: 0,
            bytes_written: 0,
        }
    }

    /// Write one page; pages failing [`Page::validate`] are refused
    pub fn write_page(&mut self, page: &Page) -> Result<()> {
        page.validate()?;
        self.write_raw(&page.to_bytes())
    }

    /// Write one already serialized page
    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes)?;
        self.pages_written += 1;
        self.bytes_written += bytes.len() as u64;
        Ok(())
    }

    /// Write every page the encoder has completed; returns the page count
    pub fn write_from(&mut self, encoder: &mut Encoder) -> Result<usize> {
        let pages = encoder.drain();
        for page in &pages {
            self.write_raw(page)?;
        }
        Ok(pages.len())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn pages_written(&self) -> u64 {
        self.pages_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
