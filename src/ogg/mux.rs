// Stream multiplexer: packets of one logical stream into pages
//
// Packets are laid out whole. A packet is only split when it cannot fit on a
// page by itself, at the 255-segment boundary; the remainder opens the next
// page with the continued flag set.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::config::MuxConfig;
use crate::error::{OggError, Result};
use crate::ogg::packet::{lacing_count, lacing_values, Packet};
use crate::ogg::page::Page;
use crate::ogg::{
    OGG_HEADER_TYPE_BOS, OGG_HEADER_TYPE_CONTINUATION, OGG_HEADER_TYPE_EOS, OGG_LACING_CONTINUE,
    OGG_MAX_SEGMENTS,
};

#[derive(Debug)]
struct PendingPacket {
    payload: Vec<u8>,
    granule_position: i64,
    eos: bool,
    // bytes already placed on earlier pages
    offset: usize,
}

impl PendingPacket {
    fn remaining(&self) -> &[u8] {
        &self.payload[self.offset..]
    }

    fn remaining_segments(&self) -> usize {
        lacing_count(self.payload.len() - self.offset)
    }
}

/// Encode state for one logical stream
#[derive(Debug)]
pub struct StreamMuxer {
    serial_number: u32,
    config: MuxConfig,
    queue: VecDeque<PendingPacket>,
    queued_segments: usize,
    queued_bytes: usize,
    sequence: u32,
    packets_submitted: u64,
    bos_emitted: bool,
    eos_queued: bool,
    eos_emitted: bool,
}

impl StreamMuxer {
    pub fn new(serial_number: u32) -> Self {
        Self::with_config(serial_number, MuxConfig::default())
    }

    pub fn with_config(serial_number: u32, config: MuxConfig) -> Self {
        StreamMuxer {
            serial_number,
            config,
            queue: VecDeque::new(),
            queued_segments: 0,
            queued_bytes: 0,
            sequence: 0,
            packets_submitted: 0,
            bos_emitted: false,
            eos_queued: false,
            eos_emitted: false,
        }
    }

    pub fn serial_number(&self) -> u32 {
        self.serial_number
    }

    /// Sequence number the next page will carry
    pub fn next_sequence(&self) -> u32 {
        self.sequence
    }

    /// Packets not yet completely placed on a page
    pub fn pending_packets(&self) -> usize {
        self.queue.len()
    }

    /// Lacing values still waiting for a page
    pub fn pending_segments(&self) -> usize {
        self.queued_segments
    }

    /// True once the page carrying the eos packet has been emitted.
    ///
    /// A stream only emits pages for packets, so closing a stream with nothing
    /// left to say takes an empty eos packet: `Packet::new(vec![]).with_eos()`.
    pub fn is_finished(&self) -> bool {
        self.eos_emitted
    }

    /// True while no packet has been submitted
    pub fn is_unused(&self) -> bool {
        self.packets_submitted == 0
    }

    /// Queue a packet. Fails once the stream's eos packet has been submitted.
    pub fn submit(&mut self, packet: Packet) -> Result<()> {
        if self.eos_queued {
            return Err(OggError::StreamClosed {
                serial: self.serial_number,
            });
        }

        self.queued_segments += packet.segment_count();
        self.queued_bytes += packet.payload.len();
        self.packets_submitted += 1;
        if packet.eos {
            self.eos_queued = true;
        }
        trace!(
            serial = self.serial_number,
            packet = self.packets_submitted - 1,
            len = packet.payload.len(),
            eos = packet.eos,
            "packet queued"
        );

        self.queue.push_back(PendingPacket {
            payload: packet.payload,
            granule_position: packet.granule_position,
            eos: packet.eos,
            offset: 0,
        });
        Ok(())
    }

    fn is_ready(&self) -> bool {
        if self.queue.is_empty() {
            return false;
        }
        if self.eos_queued || self.queued_segments >= OGG_MAX_SEGMENTS {
            return true;
        }
        if !self.bos_emitted && self.config.isolate_first_packet {
            return true;
        }
        self.config
            .page_body_target
            .map_or(false, |target| self.queued_bytes >= target)
    }

    /// Emit one page if enough is pending to fill it
    pub fn pageout(&mut self) -> Option<Page> {
        if self.is_ready() {
            self.assemble()
        } else {
            None
        }
    }

    /// Emit one page with whatever is pending
    pub fn flush(&mut self) -> Option<Page> {
        self.assemble()
    }

    /// Flush until nothing is pending
    pub fn flush_all(&mut self) -> Vec<Page> {
        std::iter::from_fn(|| self.flush()).collect()
    }

    fn assemble(&mut self) -> Option<Page> {
        let continued = self.queue.front()?.offset > 0;
        let first_page = !self.bos_emitted;

        let mut segment_table = Vec::new();
        let mut body = Vec::new();
        let mut granule_position = 0;
        let mut eos = false;

        while let Some(front) = self.queue.front_mut() {
            let space = OGG_MAX_SEGMENTS - segment_table.len();
            let needed = front.remaining_segments();

            if needed <= space {
                let rest = front.remaining();
                segment_table.extend(lacing_values(rest.len()));
                body.extend_from_slice(rest);
                self.queued_segments -= needed;
                self.queued_bytes -= rest.len();
                granule_position = front.granule_position;
                let packet_eos = front.eos;
                self.queue.pop_front();

                if packet_eos {
                    eos = true;
                    break;
                }
                if first_page && self.config.isolate_first_packet {
                    break;
                }
                if let Some(target) = self.config.page_body_target {
                    if body.len() >= target {
                        break;
                    }
                }
            } else if segment_table.is_empty() {
                // too large for any page: fill this one and carry the rest
                let take = space * OGG_LACING_CONTINUE as usize;
                body.extend_from_slice(&front.remaining()[..take]);
                segment_table.extend(std::iter::repeat(OGG_LACING_CONTINUE).take(space));
                front.offset += take;
                self.queued_segments -= space;
                self.queued_bytes -= take;
                granule_position = front.granule_position;
                break;
            } else {
                break;
            }
        }

        let mut header_type = 0;
        if continued {
            header_type |= OGG_HEADER_TYPE_CONTINUATION;
        }
        if first_page {
            header_type |= OGG_HEADER_TYPE_BOS;
        }
        if eos {
            header_type |= OGG_HEADER_TYPE_EOS;
        }

        let page = Page::from_parts(
            self.serial_number,
            self.sequence,
            header_type,
            granule_position,
            segment_table,
            body,
        );
        self.sequence = self.sequence.wrapping_add(1);
        self.bos_emitted = true;
        if eos {
            self.eos_emitted = true;
        }
        debug!(
            serial = self.serial_number,
            sequence = page.sequence_number,
            segments = page.segment_table.len(),
            body = page.body.len(),
            continued,
            bos = first_page,
            eos,
            "page emitted"
        );
        Some(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed() -> MuxConfig {
        MuxConfig {
            isolate_first_packet: false,
            page_body_target: None,
        }
    }

    #[test]
    fn test_single_eos_packet_pages_out() {
        let mut mux = StreamMuxer::new(77);
        mux.submit(Packet::new(b"test".to_vec()).with_eos()).unwrap();
        let page = mux.pageout().unwrap();
        assert!(page.is_bos());
        assert!(page.is_eos());
        assert!(!page.is_continued());
        assert_eq!(page.serial_number, 77);
        assert_eq!(page.sequence_number, 0);
        assert_eq!(page.segment_table, vec![4]);
        assert!(mux.is_finished());
        assert!(mux.pageout().is_none());
    }

    #[test]
    fn test_lacing_of_spanning_packets() {
        let mut mux = StreamMuxer::with_config(1, packed());
        mux.submit(Packet::new(vec![1u8; 600])).unwrap();
        assert_eq!(mux.flush().unwrap().segment_table, vec![255, 255, 90]);

        mux.submit(Packet::new(vec![2u8; 510])).unwrap();
        assert_eq!(mux.flush().unwrap().segment_table, vec![255, 255, 0]);
    }

    #[test]
    fn test_first_packet_isolated_on_bos_page() {
        let mut mux = StreamMuxer::new(1);
        for i in 0..3u8 {
            mux.submit(Packet::new(vec![i; 10]).with_granule(i as i64)).unwrap();
        }
        let bos = mux.pageout().unwrap();
        assert!(bos.is_bos());
        assert_eq!(bos.segment_table, vec![10]);
        assert_eq!(bos.granule_position, 0);
        assert!(mux.pageout().is_none());

        let rest = mux.flush().unwrap();
        assert!(!rest.is_bos());
        assert_eq!(rest.sequence_number, 1);
        assert_eq!(rest.segment_table, vec![10, 10]);
        assert_eq!(rest.granule_position, 2);
        assert!(mux.flush().is_none());
    }

    #[test]
    fn test_full_segment_table_pages_out() {
        let mut mux = StreamMuxer::with_config(1, packed());
        for _ in 0..300 {
            mux.submit(Packet::new(vec![0u8; 1])).unwrap();
        }
        let page = mux.pageout().unwrap();
        assert_eq!(page.segment_table.len(), 255);
        assert_eq!(page.packet_count(), 255);
        assert_eq!(mux.pending_packets(), 45);
        assert!(mux.pageout().is_none());
        assert_eq!(mux.flush().unwrap().segment_table.len(), 45);
    }

    #[test]
    fn test_packet_that_does_not_fit_waits_for_next_page() {
        let mut mux = StreamMuxer::with_config(1, packed());
        for _ in 0..127 {
            mux.submit(Packet::new(vec![0u8; 300])).unwrap();
        }
        assert!(mux.pageout().is_none());
        mux.submit(Packet::new(vec![0u8; 600])).unwrap();

        let page = mux.pageout().unwrap();
        assert_eq!(page.segment_table.len(), 254);
        assert_eq!(page.packet_count(), 127);
        assert!(!page.ends_with_partial());
        assert_eq!(mux.pending_packets(), 1);

        let last = mux.flush().unwrap();
        assert!(!last.is_continued());
        assert_eq!(last.segment_table, vec![255, 255, 90]);
    }

    #[test]
    fn test_oversized_packet_continues_across_pages() {
        let mut mux = StreamMuxer::with_config(1, packed());
        mux.submit(Packet::new(vec![3u8; 70_000]).with_granule(99).with_eos())
            .unwrap();

        let first = mux.pageout().unwrap();
        assert_eq!(first.segment_table.len(), 255);
        assert!(first.ends_with_partial());
        assert_eq!(first.body.len(), 65_025);
        assert_eq!(first.granule_position, 99);
        assert!(!first.is_eos());

        let second = mux.pageout().unwrap();
        assert!(second.is_continued());
        assert!(second.is_eos());
        assert_eq!(second.segment_table.len(), 20);
        assert_eq!(second.segment_table.last(), Some(&130));
        assert_eq!(second.body.len(), 4_975);
        assert!(mux.is_finished());
    }

    #[test]
    fn test_submit_after_eos_fails() {
        let mut mux = StreamMuxer::new(5);
        mux.submit(Packet::new(vec![1]).with_eos()).unwrap();
        let err = mux.submit(Packet::new(vec![2])).unwrap_err();
        assert!(matches!(err, OggError::StreamClosed { serial: 5 }));

        mux.flush_all();
        assert!(mux.is_finished());
        assert!(mux.submit(Packet::new(vec![3])).is_err());
    }

    #[test]
    fn test_empty_eos_packet_closes_stream() {
        let mut mux = StreamMuxer::new(6);
        assert!(mux.is_unused());
        assert!(mux.flush().is_none());

        mux.submit(Packet::new(Vec::new()).with_eos()).unwrap();
        assert!(!mux.is_unused());
        let page = mux.pageout().unwrap();
        assert!(page.is_bos() && page.is_eos());
        assert_eq!(page.segment_table, vec![0]);
        assert!(page.body.is_empty());
        assert!(mux.is_finished());
    }

    #[test]
    fn test_body_target_bounds_page_size() {
        let config = MuxConfig {
            isolate_first_packet: false,
            page_body_target: Some(1000),
        };
        let mut mux = StreamMuxer::with_config(1, config);
        mux.submit(Packet::new(vec![0u8; 400])).unwrap();
        mux.submit(Packet::new(vec![0u8; 400])).unwrap();
        assert!(mux.pageout().is_none());
        mux.submit(Packet::new(vec![0u8; 400])).unwrap();
        assert_eq!(mux.pageout().unwrap().body.len(), 1200);
    }

    #[test]
    fn test_sequence_numbers_and_checksums() {
        let mut mux = StreamMuxer::with_config(9, packed());
        let mut pages = Vec::new();
        for i in 0..4 {
            mux.submit(Packet::new(vec![i as u8; 20])).unwrap();
            pages.extend(mux.flush());
        }
        for (i, page) in pages.iter().enumerate() {
            assert_eq!(page.sequence_number, i as u32);
            assert!(Page::verify(&page.to_bytes()));
        }
        assert!(pages[0].is_bos());
        assert!(pages[1..].iter().all(|p| !p.is_bos()));
    }
}
