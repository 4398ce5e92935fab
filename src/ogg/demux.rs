// Logical stream demultiplexing
//
// `StreamDecodeState` reassembles packets for one serial number.
// `Demultiplexer` routes pages of a physical stream to those states.

use std::collections::BTreeMap;

use tracing::{debug, trace, warn};

use crate::error::{ContinuationFault, Corruption, OggError, Result};
use crate::ogg::packet::Packet;
use crate::ogg::page::Page;
use crate::ogg::OGG_LACING_CONTINUE;
use crate::stats::StreamStats;

/// Output of one page for a single logical stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Packet(Packet),
    Corrupt(Corruption),
}

/// Output of one page for the physical stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemuxEvent {
    /// First page of a serial number was seen
    StreamOpened { serial_number: u32 },
    Packet { serial_number: u32, packet: Packet },
    Corrupt(Corruption),
    /// The stream's eos page was accepted
    StreamEnded { serial_number: u32 },
}

/// Decode state for one logical stream
#[derive(Debug)]
pub struct StreamDecodeState {
    serial_number: u32,
    partial: Vec<u8>,
    // leading segments of following pages belong to a packet already lost
    discarding: bool,
    last_sequence: Option<u32>,
    bos_seen: bool,
    eos_seen: bool,
    // UnterminatedStream already reported by a previous finish
    unterminated_reported: bool,
    packet_sequence: u64,
    stats: StreamStats,
}

/// Segment count and byte length of the continuation run opening a page
fn leading_run(page: &Page) -> (usize, usize) {
    let mut bytes = 0;
    for (i, &lacing) in page.segment_table.iter().enumerate() {
        bytes += lacing as usize;
        if lacing < OGG_LACING_CONTINUE {
            return (i + 1, bytes);
        }
    }
    (page.segment_table.len(), bytes)
}

impl StreamDecodeState {
    pub fn new(serial_number: u32) -> Self {
        StreamDecodeState {
            serial_number,
            partial: Vec::new(),
            discarding: false,
            last_sequence: None,
            bos_seen: false,
            eos_seen: false,
            unterminated_reported: false,
            packet_sequence: 0,
            stats: StreamStats::default(),
        }
    }

    pub fn serial_number(&self) -> u32 {
        self.serial_number
    }

    /// True once the eos page has been accepted
    pub fn is_closed(&self) -> bool {
        self.eos_seen
    }

    pub fn bos_seen(&self) -> bool {
        self.bos_seen
    }

    /// Whether any page was accepted yet
    pub fn has_pages(&self) -> bool {
        self.last_sequence.is_some()
    }

    /// Bytes of an unterminated packet carried to the next page
    pub fn partial_len(&self) -> usize {
        self.partial.len()
    }

    pub fn stats(&self) -> StreamStats {
        self.stats
    }

    fn report(&mut self, events: &mut Vec<StreamEvent>, corruption: Corruption) {
        warn!(%corruption, "stream corruption");
        self.stats.record(&corruption);
        events.push(StreamEvent::Corrupt(corruption));
    }

    /// Feed one page of this stream, returning packets it completes and any
    /// corruption noticed on the way
    pub fn accept_page(&mut self, page: &Page) -> Result<Vec<StreamEvent>> {
        page.validate()?;
        if page.serial_number != self.serial_number {
            return Err(OggError::SerialMismatch {
                expected: self.serial_number,
                found: page.serial_number,
            });
        }
        if self.eos_seen {
            return Err(OggError::StreamClosed {
                serial: self.serial_number,
            });
        }

        let mut events = Vec::new();
        let sequence = page.sequence_number;
        let mut discontinuity = false;

        if let Some(last) = self.last_sequence {
            let expected = last.wrapping_add(1);
            if sequence != expected {
                discontinuity = true;
                let ahead = sequence.wrapping_sub(last);
                let corruption = if ahead == 0 || ahead > u32::MAX / 2 {
                    Corruption::SequenceRepeat {
                        serial_number: self.serial_number,
                        last,
                        found: sequence,
                    }
                } else {
                    Corruption::SequenceGap {
                        serial_number: self.serial_number,
                        expected,
                        found: sequence,
                    }
                };
                self.report(&mut events, corruption);
            }
        }

        // Decide whether the continuation run opening this page is usable.
        let (lead_segments, lead_bytes) = leading_run(page);
        let mut skip = (0, 0);
        if discontinuity {
            self.stats.dropped_bytes += self.partial.len() as u64;
            self.partial.clear();
            if page.is_continued() {
                self.stats.dropped_bytes += lead_bytes as u64;
                skip = (lead_segments, lead_bytes);
            }
        } else if page.is_continued() {
            if self.discarding {
                self.stats.dropped_bytes += lead_bytes as u64;
                skip = (lead_segments, lead_bytes);
            } else if self.partial.is_empty() {
                skip = (lead_segments, lead_bytes);
                self.report(
                    &mut events,
                    Corruption::InconsistentContinuation {
                        serial_number: self.serial_number,
                        sequence_number: sequence,
                        fault: ContinuationFault::UnexpectedContinuation,
                        dropped_bytes: lead_bytes,
                    },
                );
            }
        } else if !self.partial.is_empty() {
            let dropped_bytes = self.partial.len();
            self.partial.clear();
            self.report(
                &mut events,
                Corruption::InconsistentContinuation {
                    serial_number: self.serial_number,
                    sequence_number: sequence,
                    fault: ContinuationFault::MissingContinuation,
                    dropped_bytes,
                },
            );
        }
        self.discarding = skip.0 > 0 && skip.0 == page.segment_table.len() && page.ends_with_partial();

        self.last_sequence = Some(sequence);
        self.stats.pages += 1;
        if page.is_bos() {
            self.bos_seen = true;
        }

        let last_terminator = page
            .segment_table
            .iter()
            .rposition(|&v| v < OGG_LACING_CONTINUE);
        let mut offset = skip.1;
        for (i, &lacing) in page.segment_table.iter().enumerate().skip(skip.0) {
            let end = offset + lacing as usize;
            self.partial.extend_from_slice(&page.body[offset..end]);
            offset = end;
            if lacing == OGG_LACING_CONTINUE {
                continue;
            }

            let packet = Packet {
                payload: std::mem::take(&mut self.partial),
                bos: self.bos_seen && self.packet_sequence == 0,
                eos: page.is_eos() && Some(i) == last_terminator,
                granule_position: page.granule_position,
                packet_sequence: self.packet_sequence,
            };
            trace!(
                serial = self.serial_number,
                packet_sequence = packet.packet_sequence,
                len = packet.payload.len(),
                "packet reassembled"
            );
            self.packet_sequence += 1;
            self.stats.packets += 1;
            events.push(StreamEvent::Packet(packet));
        }

        if page.is_eos() {
            self.eos_seen = true;
            self.discarding = false;
            if let Some(corruption) = self.finish() {
                self.report(&mut events, corruption);
            }
            debug!(
                serial = self.serial_number,
                packets = self.packet_sequence,
                "stream ended"
            );
        }

        Ok(events)
    }

    /// Abandon a packet left unterminated at end of input
    pub fn finish(&mut self) -> Option<Corruption> {
        if self.partial.is_empty() {
            return None;
        }
        let dropped_bytes = self.partial.len();
        self.partial.clear();
        Some(Corruption::TruncatedPacket {
            serial_number: self.serial_number,
            dropped_bytes,
        })
    }
}

/// Routes pages of a physical stream to per-serial decode states
#[derive(Debug, Default)]
pub struct Demultiplexer {
    streams: BTreeMap<u32, StreamDecodeState>,
}

impl Demultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one page to its logical stream
    pub fn accept_page(&mut self, page: &Page) -> Result<Vec<DemuxEvent>> {
        page.validate()?;
        let serial_number = page.serial_number;
        let mut events = Vec::new();

        if let Some(state) = self.streams.get(&serial_number) {
            if state.is_closed() {
                return Err(OggError::StreamClosed {
                    serial: serial_number,
                });
            }
            if page.is_bos() && state.has_pages() {
                return Err(OggError::SerialCollision {
                    serial: serial_number,
                });
            }
        } else {
            debug!(serial = serial_number, bos = page.is_bos(), "stream opened");
            events.push(DemuxEvent::StreamOpened { serial_number });
        }
        let state = self
            .streams
            .entry(serial_number)
            .or_insert_with(|| StreamDecodeState::new(serial_number));

        for event in state.accept_page(page)? {
            events.push(match event {
                StreamEvent::Packet(packet) => DemuxEvent::Packet {
                    serial_number,
                    packet,
                },
                StreamEvent::Corrupt(corruption) => DemuxEvent::Corrupt(corruption),
            });
        }
        if state.is_closed() {
            events.push(DemuxEvent::StreamEnded { serial_number });
        }
        Ok(events)
    }

    pub fn stream(&self, serial_number: u32) -> Option<&StreamDecodeState> {
        self.streams.get(&serial_number)
    }

    /// Serial numbers with decode state, in ascending order
    pub fn serial_numbers(&self) -> impl Iterator<Item = u32> + '_ {
        self.streams.keys().copied()
    }

    /// Drop the state of one stream
    pub fn evict(&mut self, serial_number: u32) -> Option<StreamDecodeState> {
        let state = self.streams.remove(&serial_number);
        if state.is_some() {
            debug!(serial = serial_number, "stream evicted");
        }
        state
    }

    /// Decode states in serial number order
    pub fn streams(&self) -> impl Iterator<Item = &StreamDecodeState> + '_ {
        self.streams.values()
    }

    /// End of input: abandon unterminated packets and report every stream
    /// that never saw its eos page. A stream is reported unterminated once,
    /// however often `finish` is called.
    pub fn finish(&mut self) -> Vec<Corruption> {
        let mut abandoned = Vec::new();
        for state in self.streams.values_mut().filter(|s| !s.is_closed()) {
            if let Some(corruption) = state.finish() {
                warn!(%corruption, "stream corruption");
                state.stats.record(&corruption);
                abandoned.push(corruption);
            }
            if state.unterminated_reported {
                continue;
            }
            state.unterminated_reported = true;
            let corruption = Corruption::UnterminatedStream {
                serial_number: state.serial_number,
            };
            warn!(%corruption, "stream corruption");
            abandoned.push(corruption);
        }
        abandoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ogg::{OGG_HEADER_TYPE_BOS, OGG_HEADER_TYPE_CONTINUATION, OGG_HEADER_TYPE_EOS};

    fn page(serial: u32, sequence: u32, header_type: u8, table: Vec<u8>) -> Page {
        let len: usize = table.iter().map(|&x| x as usize).sum();
        let body = (0..len).map(|i| (i % 251) as u8).collect();
        Page::new(serial, sequence, header_type, sequence as i64 * 10, table, body).unwrap()
    }

    fn packets(events: &[StreamEvent]) -> Vec<&Packet> {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Packet(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    fn corruptions(events: &[StreamEvent]) -> Vec<&Corruption> {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Corrupt(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_single_page_packets() {
        let mut state = StreamDecodeState::new(1);
        let events = state
            .accept_page(&page(1, 0, OGG_HEADER_TYPE_BOS, vec![3, 255, 0, 10]))
            .unwrap();
        let out = packets(&events);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].payload.len(), 3);
        assert_eq!(out[1].payload.len(), 255);
        assert_eq!(out[2].payload.len(), 10);
        assert!(out[0].bos);
        assert!(!out[1].bos);
        assert_eq!(
            out.iter().map(|p| p.packet_sequence).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(out.iter().all(|p| p.granule_position == 0));
    }

    #[test]
    fn test_packet_spanning_pages() {
        let mut state = StreamDecodeState::new(1);
        let first = state
            .accept_page(&page(1, 0, OGG_HEADER_TYPE_BOS, vec![255, 255]))
            .unwrap();
        assert!(first.is_empty());
        assert_eq!(state.partial_len(), 510);

        let second = state
            .accept_page(&page(1, 1, OGG_HEADER_TYPE_CONTINUATION, vec![90]))
            .unwrap();
        let out = packets(&second);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload.len(), 600);
        assert!(out[0].bos);
        assert_eq!(out[0].granule_position, 10);
    }

    #[test]
    fn test_eos_closes_stream() {
        let mut state = StreamDecodeState::new(1);
        state
            .accept_page(&page(1, 0, OGG_HEADER_TYPE_BOS, vec![1]))
            .unwrap();
        let events = state
            .accept_page(&page(1, 1, OGG_HEADER_TYPE_EOS, vec![2, 3]))
            .unwrap();
        let out = packets(&events);
        assert!(!out[0].eos);
        assert!(out[1].eos);
        assert!(state.is_closed());

        let err = state
            .accept_page(&page(1, 2, 0, vec![1]))
            .unwrap_err();
        assert!(matches!(err, OggError::StreamClosed { serial: 1 }));
    }

    #[test]
    fn test_sequence_gap_drops_partial_and_continues() {
        let mut state = StreamDecodeState::new(1);
        state
            .accept_page(&page(1, 0, OGG_HEADER_TYPE_BOS, vec![4, 255]))
            .unwrap();
        let events = state
            .accept_page(&page(1, 2, OGG_HEADER_TYPE_CONTINUATION, vec![20, 5]))
            .unwrap();

        assert!(matches!(
            corruptions(&events)[0],
            Corruption::SequenceGap { expected: 1, found: 2, .. }
        ));
        let out = packets(&events);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload.len(), 5);
        assert_eq!(state.stats().sequence_gaps, 1);
        assert_eq!(state.stats().dropped_bytes, 255 + 20);
    }

    #[test]
    fn test_sequence_repeat_reported() {
        let mut state = StreamDecodeState::new(1);
        state
            .accept_page(&page(1, 0, OGG_HEADER_TYPE_BOS, vec![4]))
            .unwrap();
        state.accept_page(&page(1, 1, 0, vec![4])).unwrap();
        let events = state.accept_page(&page(1, 1, 0, vec![4])).unwrap();
        assert!(matches!(
            corruptions(&events)[0],
            Corruption::SequenceRepeat { last: 1, found: 1, .. }
        ));
        assert_eq!(packets(&events).len(), 1);
    }

    #[test]
    fn test_unexpected_continuation() {
        let mut state = StreamDecodeState::new(1);
        state
            .accept_page(&page(1, 0, OGG_HEADER_TYPE_BOS, vec![4]))
            .unwrap();
        let events = state
            .accept_page(&page(1, 1, OGG_HEADER_TYPE_CONTINUATION, vec![255, 7, 9]))
            .unwrap();
        match corruptions(&events)[0] {
            Corruption::InconsistentContinuation {
                fault,
                dropped_bytes,
                ..
            } => {
                assert_eq!(*fault, ContinuationFault::UnexpectedContinuation);
                assert_eq!(*dropped_bytes, 262);
            }
            other => panic!("unexpected {:?}", other),
        }
        let out = packets(&events);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload.len(), 9);
    }

    #[test]
    fn test_missing_continuation() {
        let mut state = StreamDecodeState::new(1);
        state
            .accept_page(&page(1, 0, OGG_HEADER_TYPE_BOS, vec![4, 255]))
            .unwrap();
        let events = state.accept_page(&page(1, 1, 0, vec![6])).unwrap();
        match corruptions(&events)[0] {
            Corruption::InconsistentContinuation {
                fault,
                dropped_bytes,
                ..
            } => {
                assert_eq!(*fault, ContinuationFault::MissingContinuation);
                assert_eq!(*dropped_bytes, 255);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(packets(&events)[0].payload.len(), 6);
    }

    #[test]
    fn test_lost_giant_packet_is_discarded_silently() {
        let mut state = StreamDecodeState::new(1);
        state
            .accept_page(&page(1, 0, OGG_HEADER_TYPE_BOS, vec![255]))
            .unwrap();
        // page 1 lost
        let events = state
            .accept_page(&page(1, 2, OGG_HEADER_TYPE_CONTINUATION, vec![255, 255]))
            .unwrap();
        assert_eq!(corruptions(&events).len(), 1);
        let events = state
            .accept_page(&page(1, 3, OGG_HEADER_TYPE_CONTINUATION, vec![10, 11]))
            .unwrap();
        assert!(corruptions(&events).is_empty());
        assert_eq!(packets(&events)[0].payload.len(), 11);
    }

    #[test]
    fn test_finish_reports_truncated_packet() {
        let mut state = StreamDecodeState::new(1);
        state
            .accept_page(&page(1, 0, OGG_HEADER_TYPE_BOS, vec![255]))
            .unwrap();
        assert_eq!(
            state.finish(),
            Some(Corruption::TruncatedPacket {
                serial_number: 1,
                dropped_bytes: 255
            })
        );
        assert_eq!(state.finish(), None);
    }

    #[test]
    fn test_body_shorter_than_table_is_refused() {
        let mut bad = page(1, 0, OGG_HEADER_TYPE_BOS, vec![10]);
        bad.body.truncate(3);

        let mut state = StreamDecodeState::new(1);
        assert!(matches!(
            state.accept_page(&bad).unwrap_err(),
            OggError::InvalidPage { serial: 1, .. }
        ));
        assert!(!state.has_pages());

        let mut demux = Demultiplexer::new();
        assert!(demux.accept_page(&bad).is_err());
        assert_eq!(demux.streams().count(), 0);
    }

    #[test]
    fn test_wrong_serial_rejected() {
        let mut state = StreamDecodeState::new(1);
        let err = state.accept_page(&page(2, 0, 0, vec![1])).unwrap_err();
        assert!(matches!(
            err,
            OggError::SerialMismatch {
                expected: 1,
                found: 2
            }
        ));
    }

    #[test]
    fn test_demultiplexer_routes_streams() {
        let mut demux = Demultiplexer::new();
        let a = demux
            .accept_page(&page(10, 0, OGG_HEADER_TYPE_BOS, vec![1]))
            .unwrap();
        let b = demux
            .accept_page(&page(20, 0, OGG_HEADER_TYPE_BOS, vec![2]))
            .unwrap();
        assert_eq!(a[0], DemuxEvent::StreamOpened { serial_number: 10 });
        assert_eq!(b[0], DemuxEvent::StreamOpened { serial_number: 20 });
        assert_eq!(demux.serial_numbers().collect::<Vec<_>>(), vec![10, 20]);

        let end = demux
            .accept_page(&page(10, 1, OGG_HEADER_TYPE_EOS, vec![3]))
            .unwrap();
        assert!(matches!(end.last(), Some(DemuxEvent::StreamEnded { serial_number: 10 })));

        let err = demux.accept_page(&page(10, 2, 0, vec![1])).unwrap_err();
        assert!(matches!(err, OggError::StreamClosed { serial: 10 }));

        // stream 20 is unaffected
        assert!(demux.accept_page(&page(20, 1, 0, vec![1])).is_ok());
    }

    #[test]
    fn test_demultiplexer_serial_collision() {
        let mut demux = Demultiplexer::new();
        demux
            .accept_page(&page(10, 0, OGG_HEADER_TYPE_BOS, vec![1]))
            .unwrap();
        let err = demux
            .accept_page(&page(10, 0, OGG_HEADER_TYPE_BOS, vec![1]))
            .unwrap_err();
        assert!(matches!(err, OggError::SerialCollision { serial: 10 }));
    }

    #[test]
    fn test_demultiplexer_evict_and_finish() {
        let mut demux = Demultiplexer::new();
        demux
            .accept_page(&page(10, 0, OGG_HEADER_TYPE_BOS, vec![255]))
            .unwrap();
        demux
            .accept_page(&page(11, 0, OGG_HEADER_TYPE_BOS, vec![255]))
            .unwrap();
        assert!(demux.evict(11).is_some());
        assert!(demux.evict(11).is_none());

        let abandoned = demux.finish();
        assert_eq!(
            abandoned,
            vec![
                Corruption::TruncatedPacket {
                    serial_number: 10,
                    dropped_bytes: 255,
                },
                Corruption::UnterminatedStream { serial_number: 10 },
            ]
        );
        assert_eq!(demux.stream(10).map(|s| s.stats().dropped_bytes), Some(255));
        assert_eq!(demux.streams().count(), 1);
    }

    #[test]
    fn test_unterminated_stream_reported_once() {
        let mut demux = Demultiplexer::new();
        demux
            .accept_page(&page(10, 0, OGG_HEADER_TYPE_BOS, vec![4]))
            .unwrap();
        assert_eq!(
            demux.finish(),
            vec![Corruption::UnterminatedStream { serial_number: 10 }]
        );

        demux.accept_page(&page(10, 1, 0, vec![255])).unwrap();
        demux
            .accept_page(&page(20, 0, OGG_HEADER_TYPE_BOS, vec![1]))
            .unwrap();
        assert_eq!(
            demux.finish(),
            vec![
                Corruption::TruncatedPacket {
                    serial_number: 10,
                    dropped_bytes: 255,
                },
                Corruption::UnterminatedStream { serial_number: 20 },
            ]
        );
        assert!(demux.finish().is_empty());
    }
}
