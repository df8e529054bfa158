//! Elementary stream reconstruction: collects transport packet payloads
//! into whole PES packets, one per payload unit.

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::packet::{ContinuityStatus, ContinuityTracker};

/// PES packets start with this code, followed by the stream id.
pub const PES_START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

/// Cap on a collected unit, against a lost unit start.
const MAX_UNIT_SIZE: usize = 1024 * 1024;

/// The kinds of elementary stream this demultiplexer reconstructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// MPEG audio, stream ids 0xC0..=0xDF.
    Audio,
    /// MPEG video, stream ids 0xE0..=0xEF. The video PID is also where
    /// the clock reference that gates subtitles is observed.
    Video,
    /// DVB subtitles ride private_stream_1, exactly 0xBD.
    Subtitle,
}

impl StreamKind {
    /// Whether a PES stream id belongs to this kind of stream.
    pub fn accepts(self, stream_id: u8) -> bool {
        match self {
            StreamKind::Audio => (0xC0..=0xDF).contains(&stream_id),
            StreamKind::Video => (0xE0..=0xEF).contains(&stream_id),
            StreamKind::Subtitle => stream_id == 0xBD,
        }
    }
}

/// Counters kept across the life of one stream filter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EsStats {
    /// Transport packets fed to this assembler.
    pub packets: u64,
    /// Complete units handed to the consumer.
    pub units: u64,
    /// Payload bytes handed to the consumer.
    pub bytes: u64,
    /// Retransmitted packets skipped by continuity counter.
    pub duplicates: u64,
    /// Continuity gaps observed, each at least one packet lost.
    pub discontinuities: u64,
    /// Subtitle units dropped for arriving before any clock reference.
    pub suppressed: u64,
    /// Collected units dropped for a bad start code or stream id.
    pub invalid: u64,
    pub min_unit_len: u64,
    pub max_unit_len: u64,
}

/// Per-PID PES reassembly state machine.
///
/// Idle until a payload unit start arrives with an acceptable PES prefix,
/// then collecting until the next unit start closes the unit.
#[derive(Debug)]
pub struct EsAssembler {
    kind: StreamKind,
    buffer: BytesMut,
    collecting: bool,
    tracker: ContinuityTracker,
    stats: EsStats,
}

impl EsAssembler {
    /// `small_buffer` sizes the initial accumulation buffer only; it does
    /// not bound the units collected.
    pub fn new(kind: StreamKind, small_buffer: bool) -> Self {
        let capacity = if small_buffer { 512 } else { 4096 };
        EsAssembler {
            kind,
            buffer: BytesMut::with_capacity(capacity),
            collecting: false,
            tracker: ContinuityTracker::default(),
            stats: EsStats::default(),
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn stats(&self) -> EsStats {
        self.stats
    }

    /// Feed one transport packet's worth of stream data.
    ///
    /// `payload` is `None` for adaptation-only packets, which still carry a
    /// continuity counter that must not advance. Returns the unit the
    /// packet completed, if any.
    pub fn push(
        &mut self,
        payload: Option<&[u8]>,
        unit_start: bool,
        cc: u8,
        pcr_seen: bool,
    ) -> Option<Bytes> {
        self.stats.packets += 1;
        match self.tracker.check(cc, payload.is_some()) {
            ContinuityStatus::Duplicate => {
                self.stats.duplicates += 1;
                trace!(cc, "duplicate packet skipped");
                return None;
            }
            ContinuityStatus::Discontinuity { expected, actual } => {
                self.stats.discontinuities += 1;
                debug!(expected, actual, "continuity gap in stream");
            }
            ContinuityStatus::Initial | ContinuityStatus::Ok => {}
        }
        let payload = payload?;

        if unit_start {
            let completed = self.close_unit();
            self.open_unit(payload, pcr_seen);
            return completed;
        }

        if self.collecting {
            if self.buffer.len() + payload.len() > MAX_UNIT_SIZE {
                debug!(len = self.buffer.len(), "unit exceeds size cap, dropped");
                self.buffer.clear();
                self.collecting = false;
                return None;
            }
            self.buffer.extend_from_slice(payload);
        }
        None
    }

    /// Close the unit in progress, validating its PES prefix.
    fn close_unit(&mut self) -> Option<Bytes> {
        if !self.collecting {
            return None;
        }
        self.collecting = false;
        let unit = self.buffer.split().freeze();
        if unit.len() < 4
            || unit[..3] != PES_START_CODE
            || !self.kind.accepts(unit[3])
        {
            self.stats.invalid += 1;
            return None;
        }
        self.stats.units += 1;
        self.stats.bytes += unit.len() as u64;
        let len = unit.len() as u64;
        if self.stats.min_unit_len == 0 || len < self.stats.min_unit_len {
            self.stats.min_unit_len = len;
        }
        if len > self.stats.max_unit_len {
            self.stats.max_unit_len = len;
        }
        Some(unit)
    }

    /// Start collecting a new unit from a unit-start payload.
    ///
    /// Subtitle data arriving before the first clock reference cannot be
    /// presented on time, so it is dropped here rather than buffered.
    fn open_unit(&mut self, payload: &[u8], pcr_seen: bool) {
        self.buffer.clear();
        if self.kind == StreamKind::Subtitle && !pcr_seen {
            self.stats.suppressed += 1;
            self.collecting = false;
            return;
        }
        // A unit start whose prefix is already wrong goes straight back to
        // idle instead of collecting bytes that can never form a unit.
        if payload.len() >= 4 && (payload[..3] != PES_START_CODE || !self.kind.accepts(payload[3]))
        {
            self.collecting = false;
            return;
        }
        self.buffer.extend_from_slice(payload);
        self.collecting = true;
    }

    /// Drop collection state. Stats survive, counters restart.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.collecting = false;
        self.tracker.reset();
    }
}
