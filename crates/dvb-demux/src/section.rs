//! PSI/SI section reassembly from transport packet payloads.

use bytes::{Bytes, BytesMut};
use tracing::trace;

/// Longest legal section body per the 12-bit length field.
const MAX_SECTION_LENGTH: usize = 0x0FFF;
/// Cap on buffered bytes per PID, against runaway garbage.
const MAX_BUFFER_SIZE: usize = 16 * 1024;

/// Reassembles complete sections for one PID.
///
/// Sections may span packets and several short sections may share one
/// packet. The payload_unit_start_indicator packet carries a pointer field
/// giving the offset of the first section start; bytes before it belong to
/// the section begun in earlier packets.
#[derive(Debug, Default)]
pub struct SectionAssembler {
    buffer: BytesMut,
    started: bool,
}

impl SectionAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one packet's payload. Returns every section completed by it.
    pub fn push(&mut self, payload: &[u8], unit_start: bool) -> Vec<Bytes> {
        let mut sections = Vec::new();
        if payload.is_empty() {
            return sections;
        }

        if unit_start {
            let pointer_field = payload[0] as usize;
            let pointer_end = 1 + pointer_field;
            if pointer_end > payload.len() {
                trace!(pointer_field, "pointer field runs past the payload");
                self.buffer.clear();
                self.started = false;
                return sections;
            }
            // Tail of a section begun in earlier packets.
            if pointer_field > 0 && self.started {
                self.append(&payload[1..pointer_end], &mut sections);
            }
            self.buffer.clear();
            self.started = true;
            self.append(&payload[pointer_end..], &mut sections);
        } else if self.started {
            self.append(payload, &mut sections);
        }
        // Without a unit start seen yet there is no framing to trust.

        sections
    }

    fn append(&mut self, data: &[u8], sections: &mut Vec<Bytes>) {
        if data.is_empty() {
            return;
        }
        self.buffer.extend_from_slice(data);
        if self.buffer.len() > MAX_BUFFER_SIZE {
            self.buffer.clear();
            self.started = false;
            return;
        }

        loop {
            let stuffing = self.buffer.iter().take_while(|&&b| b == 0xFF).count();
            if stuffing > 0 {
                let _ = self.buffer.split_to(stuffing);
            }
            if self.buffer.len() < 3 {
                break;
            }
            let section_length = (((self.buffer[1] as usize) & 0x0F) << 8) | self.buffer[2] as usize;
            if section_length > MAX_SECTION_LENGTH {
                let _ = self.buffer.split_to(1);
                continue;
            }
            let section_size = 3 + section_length;
            if self.buffer.len() < section_size {
                break;
            }
            sections.push(self.buffer.split_to(section_size).freeze());
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
        self.started = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(table_id: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![table_id, 0x30 | ((body.len() >> 8) as u8), body.len() as u8];
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn single_section_with_pointer() {
        let mut asm = SectionAssembler::new();
        let sec = section(0x70, &[1, 2, 3, 4, 5]);
        let mut payload = vec![0u8]; // pointer field
        payload.extend_from_slice(&sec);
        let out = asm.push(&payload, true);
        assert_eq!(out, vec![Bytes::from(sec)]);
    }

    #[test]
    fn section_spanning_packets() {
        let mut asm = SectionAssembler::new();
        let body: Vec<u8> = (0..200).map(|i| i as u8).collect();
        let sec = section(0x42, &body);
        let mut first = vec![0u8];
        first.extend_from_slice(&sec[..150]);
        assert!(asm.push(&first, true).is_empty());
        let out = asm.push(&sec[150..], false);
        assert_eq!(out, vec![Bytes::from(sec)]);
    }

    #[test]
    fn pointer_field_closes_previous_section() {
        let mut asm = SectionAssembler::new();
        let old = section(0x70, &[9, 9, 9]);
        let new = section(0x73, &[8, 8]);
        let mut first = vec![0u8];
        first.extend_from_slice(&old[..4]);
        assert!(asm.push(&first, true).is_empty());
        let mut second = vec![(old.len() - 4) as u8];
        second.extend_from_slice(&old[4..]);
        second.extend_from_slice(&new);
        let out = asm.push(&second, true);
        assert_eq!(out, vec![Bytes::from(old), Bytes::from(new)]);
    }

    #[test]
    fn stuffing_between_sections_skipped() {
        let mut asm = SectionAssembler::new();
        let a = section(0x70, &[1]);
        let b = section(0x70, &[2]);
        let mut payload = vec![0u8];
        payload.extend_from_slice(&a);
        payload.extend_from_slice(&[0xFF; 7]);
        payload.extend_from_slice(&b);
        let out = asm.push(&payload, true);
        assert_eq!(out, vec![Bytes::from(a), Bytes::from(b)]);
    }

    #[test]
    fn mid_stream_join_waits_for_unit_start() {
        let mut asm = SectionAssembler::new();
        assert!(asm.push(&[0x12, 0x34, 0x56], false).is_empty());
        let sec = section(0x70, &[7]);
        let mut payload = vec![0u8];
        payload.extend_from_slice(&sec);
        assert_eq!(asm.push(&payload, true), vec![Bytes::from(sec)]);
    }
}
