//! Transport stream demultiplexer front end.
//!
//! Accepts arbitrarily sized chunks of a transport stream, recovers packet
//! alignment, and routes each packet through the [`FilterRegistry`].

use std::sync::Arc;

use bytes::BytesMut;
use memchr::memchr_iter;
use tracing::{debug, trace, warn};

use crate::packet::{PACKET_SIZE, PID_NULL, SYNC_BYTE, TsPacket};
use crate::registry::FilterRegistry;

/// Counters kept across the life of a demultiplexer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DemuxStats {
    /// Packets parsed from the input.
    pub packets: u64,
    /// Packets taken by a registered consumer.
    pub delivered: u64,
    /// Stuffing packets skipped.
    pub null_packets: u64,
    /// Packets skipped for the transport error indicator.
    pub transport_errors: u64,
    /// Times packet alignment was lost and re-acquired.
    pub sync_losses: u64,
    /// Junk bytes discarded while searching for alignment.
    pub resync_bytes_dropped: u64,
}

/// Splits a transport stream into packets and feeds the filter registry.
///
/// Input arrives in chunks of any size; a partial packet is carried over
/// to the next call. The registry is shared behind an [`Arc`] so filters
/// can be added and removed from other threads while data flows.
pub struct Demuxer {
    carry: BytesMut,
    registry: Arc<FilterRegistry>,
    pcr_seen: bool,
    stats: DemuxStats,
    disposed: bool,
}

impl Default for Demuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Demuxer {
    pub fn new() -> Self {
        Demuxer {
            carry: BytesMut::new(),
            registry: Arc::new(FilterRegistry::new()),
            pcr_seen: false,
            stats: DemuxStats::default(),
            disposed: false,
        }
    }

    /// The shared filter registry.
    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    /// Deliver every packet on `pid` untouched.
    pub fn set_raw_filter(&self, pid: u16, handler: crate::RawHandler) -> crate::Result<()> {
        self.registry.set_raw_filter(pid, handler)
    }

    /// Deliver each complete SI/PSI section reassembled on `pid`.
    pub fn set_section_filter(
        &self,
        pid: u16,
        handler: crate::SectionHandler,
    ) -> crate::Result<()> {
        self.registry.set_section_filter(pid, handler)
    }

    /// Deliver each complete PES unit of `kind` reconstructed on `pid`.
    pub fn set_stream_filter(
        &self,
        pid: u16,
        kind: crate::StreamKind,
        small_buffer: bool,
        handler: crate::StreamHandler,
    ) -> crate::Result<()> {
        self.registry.set_stream_filter(pid, kind, small_buffer, handler)
    }

    /// Remove the consumer on `pid`. Returns whether one was present.
    pub fn remove_filter(&self, pid: u16) -> bool {
        self.registry.clear_filter(pid)
    }

    /// Remove every consumer, as when retuning to another multiplex.
    pub fn clear_filters(&self) {
        self.registry.clear_all();
    }

    pub fn stats(&self) -> DemuxStats {
        self.stats
    }

    /// Whether a program clock reference has been observed yet.
    pub fn pcr_seen(&self) -> bool {
        self.pcr_seen
    }

    /// Feed a chunk of transport stream data.
    ///
    /// Packet boundaries need not align with chunk boundaries; splitting
    /// the same stream into different chunks produces identical delivery.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.disposed {
            return;
        }
        self.carry.extend_from_slice(chunk);

        while self.carry.len() >= PACKET_SIZE {
            if self.carry[0] != SYNC_BYTE {
                if !self.resync() {
                    break;
                }
                if self.carry.len() < PACKET_SIZE {
                    break;
                }
            }
            let raw = self.carry.split_to(PACKET_SIZE).freeze();
            match TsPacket::parse(raw) {
                Ok(packet) => self.process(&packet),
                Err(err) => {
                    // Unreachable with sync and size already checked, but
                    // never let one packet wedge the stream.
                    warn!(%err, "packet rejected");
                    self.stats.sync_losses += 1;
                }
            }
        }
    }

    /// Drop bytes until a byte 0x47 recurs one packet later (or the buffer
    /// ends before that). Returns whether a candidate was found.
    fn resync(&mut self) -> bool {
        let found = memchr_iter(SYNC_BYTE, &self.carry).find(|&pos| {
            pos + PACKET_SIZE >= self.carry.len() || self.carry[pos + PACKET_SIZE] == SYNC_BYTE
        });
        self.stats.sync_losses += 1;
        match found {
            Some(pos) => {
                debug!(dropped = pos, "sync re-acquired");
                self.stats.resync_bytes_dropped += pos as u64;
                let _ = self.carry.split_to(pos);
                true
            }
            None => {
                debug!(dropped = self.carry.len(), "no sync in buffer");
                self.stats.resync_bytes_dropped += self.carry.len() as u64;
                self.carry.clear();
                false
            }
        }
    }

    fn process(&mut self, packet: &TsPacket) {
        self.stats.packets += 1;
        if packet.transport_error_indicator {
            self.stats.transport_errors += 1;
            return;
        }
        // Only the video PID's clock drives subtitle gating.
        if !self.pcr_seen
            && packet.pcr().is_some()
            && self.registry.is_video_pid(packet.pid)
        {
            trace!(pid = packet.pid, "first clock reference");
            self.pcr_seen = true;
        }
        if packet.pid == PID_NULL {
            self.stats.null_packets += 1;
            return;
        }
        if self.registry.deliver(packet, self.pcr_seen) {
            self.stats.delivered += 1;
        }
    }

    /// Drop the carried partial packet and all per-PID reassembly state.
    /// Registered filters and counters survive.
    pub fn reset(&mut self) {
        self.carry.clear();
        self.pcr_seen = false;
        self.registry.reset();
    }

    /// Tear down: clears all filters and ignores further input. Safe to
    /// call more than once.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.carry.clear();
        self.registry.clear_all();
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamKind;
    use bytes::Bytes;
    use parking_lot::Mutex;

    fn packet(pid: u16, cc: u8, pusi: bool, payload: &[u8]) -> Vec<u8> {
        assert!(payload.len() <= 184);
        let mut raw = vec![0xFFu8; PACKET_SIZE];
        raw[0] = SYNC_BYTE;
        raw[1] = (pid >> 8) as u8 | if pusi { 0x40 } else { 0x00 };
        raw[2] = pid as u8;
        raw[3] = 0x10 | cc;
        raw[4..4 + payload.len()].copy_from_slice(payload);
        raw
    }

    // PES payloads are padded with adaptation field stuffing so the
    // packet carries exactly the given bytes.
    fn es_packet(pid: u16, cc: u8, pusi: bool, payload: &[u8]) -> Vec<u8> {
        assert!(payload.len() <= 184);
        let mut raw = vec![0u8; PACKET_SIZE];
        raw[0] = SYNC_BYTE;
        raw[1] = (pid >> 8) as u8 | if pusi { 0x40 } else { 0x00 };
        raw[2] = pid as u8;
        if payload.len() == 184 {
            raw[3] = 0x10 | cc;
            raw[4..].copy_from_slice(payload);
        } else {
            raw[3] = 0x30 | cc;
            let af_len = 183 - payload.len();
            raw[4] = af_len as u8;
            if af_len > 0 {
                raw[5] = 0x00;
                raw[6..5 + af_len].fill(0xFF);
            }
            raw[5 + af_len..].copy_from_slice(payload);
        }
        raw
    }

    fn pcr_packet(pid: u16, cc: u8) -> Vec<u8> {
        let mut raw = vec![0xFFu8; PACKET_SIZE];
        raw[0] = SYNC_BYTE;
        raw[1] = (pid >> 8) as u8;
        raw[2] = pid as u8;
        raw[3] = 0x20 | cc;
        raw[4] = 183;
        raw[5] = 0x10;
        raw[6..12].copy_from_slice(&[0x00, 0x00, 0x00, 0x00, 0xFE, 0x00]);
        raw
    }

    fn section_packet(pid: u16, cc: u8, section: &[u8]) -> Vec<u8> {
        let mut payload = vec![0u8];
        payload.extend_from_slice(section);
        packet(pid, cc, true, &payload)
    }

    fn collected() -> (Arc<Mutex<Vec<Bytes>>>, Box<dyn FnMut(Bytes) + Send>) {
        let store = Arc::new(Mutex::new(Vec::new()));
        let sink = store.clone();
        (store, Box::new(move |b| sink.lock().push(b)))
    }

    #[test]
    fn raw_filter_sees_whole_packets() {
        let mut demux = Demuxer::new();
        let (store, handler) = collected();
        demux.registry().set_raw_filter(0x100, handler).unwrap();
        demux.push(&packet(0x100, 0, false, &[1]));
        demux.push(&packet(0x200, 0, false, &[2]));
        let got = store.lock();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].len(), PACKET_SIZE);
        assert_eq!(demux.stats().delivered, 1);
        assert_eq!(demux.stats().packets, 2);
    }

    #[test]
    fn chunk_boundaries_do_not_matter() {
        let mut stream = Vec::new();
        for cc in 0..5u8 {
            stream.extend_from_slice(&packet(0x30, cc, false, &[cc]));
        }

        let run = |chunk_len: usize| {
            let mut demux = Demuxer::new();
            let (store, handler) = collected();
            demux.registry().set_raw_filter(0x30, handler).unwrap();
            for chunk in stream.chunks(chunk_len) {
                demux.push(chunk);
            }
            let got = store.lock().clone();
            got
        };

        let whole = run(stream.len());
        assert_eq!(whole.len(), 5);
        for chunk_len in [1, 7, 187, 188, 189, 500] {
            assert_eq!(run(chunk_len), whole);
        }
    }

    #[test]
    fn resyncs_after_junk() {
        let mut demux = Demuxer::new();
        let (store, handler) = collected();
        demux.registry().set_raw_filter(0x30, handler).unwrap();
        let mut stream = vec![0x12, 0x47, 0x99, 0x00]; // decoy sync inside junk
        stream.extend_from_slice(&packet(0x30, 0, false, &[1]));
        stream.extend_from_slice(&packet(0x30, 1, false, &[2]));
        demux.push(&stream);
        assert_eq!(store.lock().len(), 2);
        assert_eq!(demux.stats().resync_bytes_dropped, 4);
        assert!(demux.stats().sync_losses >= 1);
    }

    #[test]
    fn null_packets_are_ignored() {
        let mut demux = Demuxer::new();
        demux.push(&packet(PID_NULL, 0, false, &[0xAA]));
        assert_eq!(demux.stats().null_packets, 1);
        assert_eq!(demux.stats().delivered, 0);
    }

    #[test]
    fn transport_errors_are_skipped() {
        let mut demux = Demuxer::new();
        let (store, handler) = collected();
        demux.registry().set_raw_filter(0x30, handler).unwrap();
        let mut bad = packet(0x30, 0, false, &[]);
        bad[1] |= 0x80;
        demux.push(&bad);
        assert!(store.lock().is_empty());
        assert_eq!(demux.stats().transport_errors, 1);
    }

    #[test]
    fn section_filter_delivers_sdt() {
        use dvb_si::{ServiceDescriptionSection, Table};

        let sdt = ServiceDescriptionSection {
            table_id: dvb_si::TABLE_ID_SDT_ACTUAL,
            transport_stream_id: 1,
            version: 0,
            current_next: true,
            section_number: 0,
            last_section_number: 0,
            original_network_id: 1,
            services: vec![],
        };
        let raw = sdt.encode().unwrap();

        let mut demux = Demuxer::new();
        let (store, handler) = collected();
        demux.registry().set_section_filter(0x11, handler).unwrap();
        demux.push(&section_packet(0x11, 0, &raw));

        let got = store.lock();
        assert_eq!(got.len(), 1);
        match Table::parse(got[0].clone()).unwrap() {
            Table::ServiceDescription(parsed) => assert_eq!(parsed, sdt),
            other => panic!("wrong table: {other:?}"),
        }
    }

    #[test]
    fn subtitle_stream_gated_on_video_pcr() {
        let mut demux = Demuxer::new();
        let (store, handler) = collected();
        demux
            .set_stream_filter(0x41, StreamKind::Video, false, Box::new(|_| {}))
            .unwrap();
        demux
            .set_stream_filter(0x40, StreamKind::Subtitle, true, handler)
            .unwrap();

        let unit = [0x00, 0x00, 0x01, 0xBD, 0x01];
        demux.push(&es_packet(0x40, 0, true, &unit));
        // A clock reference on the subtitle PID itself does not ungate.
        demux.push(&pcr_packet(0x40, 0));
        assert!(!demux.pcr_seen());
        demux.push(&pcr_packet(0x41, 0));
        assert!(demux.pcr_seen());
        demux.push(&es_packet(0x40, 1, true, &unit));
        demux.push(&es_packet(0x40, 2, true, &unit));

        // Only the unit begun after the clock reference comes out.
        let got = store.lock();
        assert_eq!(got.len(), 1);
        assert_eq!(&got[0][..], &unit);
        assert_eq!(demux.registry().stream_stats(0x40).unwrap().suppressed, 1);
    }

    #[test]
    fn audio_stream_reconstructed_across_packets() {
        let mut demux = Demuxer::new();
        let (store, handler) = collected();
        demux
            .set_stream_filter(0x50, StreamKind::Audio, false, handler)
            .unwrap();

        let mut unit = vec![0x00, 0x00, 0x01, 0xC0];
        unit.extend((0..250).map(|i| i as u8));
        demux.push(&es_packet(0x50, 0, true, &unit[..184]));
        demux.push(&es_packet(0x50, 1, false, &unit[184..]));
        demux.push(&es_packet(0x50, 2, true, &[0x00, 0x00, 0x01, 0xC0]));

        let got = store.lock();
        assert_eq!(got.len(), 1);
        assert_eq!(&got[0][..], &unit[..]);
    }

    #[test]
    fn dispose_is_idempotent_and_final() {
        let mut demux = Demuxer::new();
        let (store, handler) = collected();
        demux.registry().set_raw_filter(0x30, handler).unwrap();
        demux.dispose();
        demux.dispose();
        assert!(demux.is_disposed());
        demux.push(&packet(0x30, 0, false, &[]));
        assert!(store.lock().is_empty());
        assert_eq!(demux.stats().packets, 0);
    }
}
