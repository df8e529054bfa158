//! PID filter registry: routes demultiplexed packets to consumers.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

use crate::packet::{PID_MAX, TsPacket};
use crate::section::SectionAssembler;
use crate::stream::{EsAssembler, EsStats, StreamKind};
use crate::{DemuxError, Result};

/// Consumer of whole 188-byte packets.
pub type RawHandler = Box<dyn FnMut(Bytes) + Send>;
/// Consumer of complete, reassembled SI/PSI sections.
pub type SectionHandler = Box<dyn FnMut(Bytes) + Send>;
/// Consumer of complete PES units.
pub type StreamHandler = Box<dyn FnMut(Bytes) + Send>;

enum Consumer {
    Raw(RawHandler),
    Section {
        assembler: SectionAssembler,
        handler: SectionHandler,
    },
    Stream {
        assembler: EsAssembler,
        handler: StreamHandler,
    },
}

/// Thread-safe map of PID to consumer.
///
/// At most one consumer per PID; registering again replaces the previous
/// consumer along with its reassembly state.
#[derive(Default)]
pub struct FilterRegistry {
    filters: Mutex<HashMap<u16, Consumer>>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_pid(pid: u16) -> Result<()> {
        if pid > PID_MAX {
            return Err(DemuxError::PidOutOfRange(pid));
        }
        Ok(())
    }

    /// Deliver every packet on `pid` untouched.
    pub fn set_raw_filter(&self, pid: u16, handler: RawHandler) -> Result<()> {
        Self::check_pid(pid)?;
        self.filters.lock().insert(pid, Consumer::Raw(handler));
        Ok(())
    }

    /// Reassemble SI/PSI sections on `pid` and deliver each complete one.
    pub fn set_section_filter(&self, pid: u16, handler: SectionHandler) -> Result<()> {
        Self::check_pid(pid)?;
        self.filters.lock().insert(
            pid,
            Consumer::Section {
                assembler: SectionAssembler::new(),
                handler,
            },
        );
        Ok(())
    }

    /// Reconstruct PES units of `kind` on `pid` and deliver each complete
    /// one. `small_buffer` sizes the initial accumulation buffer.
    pub fn set_stream_filter(
        &self,
        pid: u16,
        kind: StreamKind,
        small_buffer: bool,
        handler: StreamHandler,
    ) -> Result<()> {
        Self::check_pid(pid)?;
        self.filters.lock().insert(
            pid,
            Consumer::Stream {
                assembler: EsAssembler::new(kind, small_buffer),
                handler,
            },
        );
        Ok(())
    }

    /// Whether `pid` carries a video stream filter. The demultiplexer
    /// watches these PIDs for the clock reference that gates subtitles.
    pub(crate) fn is_video_pid(&self, pid: u16) -> bool {
        matches!(
            self.filters.lock().get(&pid),
            Some(Consumer::Stream { assembler, .. }) if assembler.kind() == StreamKind::Video
        )
    }

    /// Remove the consumer on `pid`. Returns whether one was present.
    pub fn clear_filter(&self, pid: u16) -> bool {
        self.filters.lock().remove(&pid).is_some()
    }

    pub fn clear_all(&self) {
        self.filters.lock().clear();
    }

    pub fn has_filter(&self, pid: u16) -> bool {
        self.filters.lock().contains_key(&pid)
    }

    /// Reconstruction counters of the stream filter on `pid`, if one is set.
    pub fn stream_stats(&self, pid: u16) -> Option<EsStats> {
        match self.filters.lock().get(&pid) {
            Some(Consumer::Stream { assembler, .. }) => Some(assembler.stats()),
            _ => None,
        }
    }

    /// Route one packet. Returns whether a consumer took it.
    pub(crate) fn deliver(&self, packet: &TsPacket, pcr_seen: bool) -> bool {
        let mut filters = self.filters.lock();
        let Some(consumer) = filters.get_mut(&packet.pid) else {
            return false;
        };
        match consumer {
            Consumer::Raw(handler) => handler(packet.raw().clone()),
            Consumer::Section { assembler, handler } => {
                if let Some(payload) = packet.payload() {
                    for section in assembler.push(&payload, packet.payload_unit_start_indicator) {
                        handler(section);
                    }
                }
            }
            Consumer::Stream { assembler, handler } => {
                let payload = packet.payload();
                if let Some(unit) = assembler.push(
                    payload.as_deref(),
                    packet.payload_unit_start_indicator,
                    packet.continuity_counter,
                    pcr_seen,
                ) {
                    handler(unit);
                }
            }
        }
        true
    }

    /// Drop all reassembly state but keep the registered consumers.
    pub(crate) fn reset(&self) {
        let mut filters = self.filters.lock();
        for consumer in filters.values_mut() {
            match consumer {
                Consumer::Raw(_) => {}
                Consumer::Section { assembler, .. } => assembler.reset(),
                Consumer::Stream { assembler, .. } => assembler.reset(),
            }
        }
        debug!(filters = filters.len(), "reassembly state cleared");
    }
}
