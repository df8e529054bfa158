//! Transport packet layer: the fixed 188-byte packet view and the
//! continuity counter rules shared by the payload assemblers.

use bytes::{Buf, Bytes};

use crate::{DemuxError, Result};

/// Size of a transport packet on the wire.
pub const PACKET_SIZE: usize = 188;
/// First byte of every transport packet.
pub const SYNC_BYTE: u8 = 0x47;
/// Null packets carry stuffing only and are never delivered.
pub const PID_NULL: u16 = 0x1FFF;
/// Highest PID a filter may be registered on.
pub const PID_MAX: u16 = 0x1FFE;

/// Zero-copy view over one 188-byte transport packet.
#[derive(Debug, Clone)]
pub struct TsPacket {
    data: Bytes,
    pub transport_error_indicator: bool,
    pub payload_unit_start_indicator: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub scrambling_control: u8,
    pub adaptation_field_control: u8,
    pub continuity_counter: u8,
    payload_offset: Option<usize>,
}

impl TsPacket {
    /// Parse a transport packet from exactly 188 bytes.
    pub fn parse(data: Bytes) -> Result<Self> {
        if data.len() != PACKET_SIZE {
            return Err(DemuxError::InvalidPacketSize(data.len()));
        }
        let mut reader = &data[..];
        let sync_byte = reader.get_u8();
        if sync_byte != SYNC_BYTE {
            return Err(DemuxError::InvalidSyncByte(sync_byte));
        }
        let byte1 = reader.get_u8();
        let byte2 = reader.get_u8();
        let byte3 = reader.get_u8();
        let transport_error_indicator = (byte1 & 0x80) != 0;
        let payload_unit_start_indicator = (byte1 & 0x40) != 0;
        let transport_priority = (byte1 & 0x20) != 0;
        let pid = ((byte1 as u16 & 0x1F) << 8) | byte2 as u16;
        let scrambling_control = (byte3 >> 6) & 0x03;
        let adaptation_field_control = (byte3 >> 4) & 0x03;
        let continuity_counter = byte3 & 0x0F;

        let mut offset = 4;
        if adaptation_field_control == 0x02 || adaptation_field_control == 0x03 {
            offset += 1 + data[offset] as usize;
        }
        let payload_offset = ((adaptation_field_control == 0x01
            || adaptation_field_control == 0x03)
            && offset < data.len())
        .then_some(offset);

        Ok(TsPacket {
            data,
            transport_error_indicator,
            payload_unit_start_indicator,
            transport_priority,
            pid,
            scrambling_control,
            adaptation_field_control,
            continuity_counter,
            payload_offset,
        })
    }

    /// Whether the packet carries payload bytes at all.
    #[inline]
    pub fn has_payload(&self) -> bool {
        self.payload_offset.is_some()
    }

    /// Payload bytes, after any adaptation field.
    #[inline]
    pub fn payload(&self) -> Option<Bytes> {
        self.payload_offset.map(|offset| self.data.slice(offset..))
    }

    /// The raw 188 bytes.
    #[inline]
    pub fn raw(&self) -> &Bytes {
        &self.data
    }

    /// Program clock reference from the adaptation field, in 90 kHz base
    /// units plus the 27 MHz extension, if the PCR flag is set.
    pub fn pcr(&self) -> Option<u64> {
        if self.adaptation_field_control != 0x02 && self.adaptation_field_control != 0x03 {
            return None;
        }
        let field_len = self.data[4] as usize;
        if field_len < 7 || 5 + field_len > self.data.len() {
            return None;
        }
        let flags = self.data[5];
        if flags & 0x10 == 0 {
            return None;
        }
        let b = &self.data[6..12];
        let base = ((b[0] as u64) << 25)
            | ((b[1] as u64) << 17)
            | ((b[2] as u64) << 9)
            | ((b[3] as u64) << 1)
            | ((b[4] as u64) >> 7);
        let ext = (((b[4] & 0x01) as u64) << 8) | b[5] as u64;
        Some(base * 300 + ext)
    }
}

/// Outcome of checking a packet's continuity counter against its PID's
/// previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuityStatus {
    /// First packet seen on this PID.
    Initial,
    /// Counter advanced as expected, or was legally unchanged.
    Ok,
    /// Same counter with payload: a retransmitted packet.
    Duplicate,
    /// Counter jumped: at least one packet was lost.
    Discontinuity { expected: u8, actual: u8 },
}

/// Per-PID continuity counter tracker.
///
/// The counter increments modulo 16 on packets that carry payload and must
/// not change on adaptation-only packets.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContinuityTracker {
    last: u8,
    seen: bool,
}

impl ContinuityTracker {
    pub fn check(&mut self, cc: u8, has_payload: bool) -> ContinuityStatus {
        if !self.seen {
            self.seen = true;
            self.last = cc;
            return ContinuityStatus::Initial;
        }
        if !has_payload {
            // Adaptation-only packets repeat the previous counter.
            return if cc == self.last {
                ContinuityStatus::Ok
            } else {
                ContinuityStatus::Discontinuity {
                    expected: self.last,
                    actual: cc,
                }
            };
        }
        let expected = (self.last + 1) & 0x0F;
        if cc == expected {
            self.last = cc;
            ContinuityStatus::Ok
        } else if cc == self.last {
            ContinuityStatus::Duplicate
        } else {
            self.last = cc;
            ContinuityStatus::Discontinuity { expected, actual: cc }
        }
    }

    pub fn reset(&mut self) {
        self.seen = false;
    }
}
