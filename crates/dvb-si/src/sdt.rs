//! Service Description Table (SDT): the services carried by a transport
//! stream, each with a descriptor loop. Long section form, CRC'd.

use bytes::Bytes;

use crate::builder::SectionBuilder;
use crate::crc32::{crc32, section_crc_ok};
use crate::descriptor::{Descriptor, parse_descriptor_loop};
use crate::section::{SectionHeader, SyntaxHeader};
use crate::{Result, SiError};

/// SDT describing the actual (own) transport stream.
pub const TABLE_ID_SDT_ACTUAL: u8 = 0x42;
/// SDT describing another transport stream.
pub const TABLE_ID_SDT_OTHER: u8 = 0x46;

/// One entry of the SDT service loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdtService {
    pub service_id: u16,
    pub eit_schedule: bool,
    pub eit_present_following: bool,
    pub running_status: u8,
    pub free_ca: bool,
    pub descriptors: Vec<Descriptor>,
}

/// Service Description Table section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptionSection {
    pub table_id: u8,
    pub transport_stream_id: u16,
    pub version: u8,
    pub current_next: bool,
    pub section_number: u8,
    pub last_section_number: u8,
    pub original_network_id: u16,
    pub services: Vec<SdtService>,
}

impl ServiceDescriptionSection {
    /// Syntax header + original_network_id + reserved byte.
    const LOOP_START: usize = 11;

    pub fn handles(table_id: u8) -> bool {
        table_id == TABLE_ID_SDT_ACTUAL || table_id == TABLE_ID_SDT_OTHER
    }

    /// Decode a complete raw SDT section, CRC included.
    pub fn parse(data: Bytes) -> Result<Self> {
        let header = SectionHeader::parse(&data)?;
        if !Self::handles(header.table_id) {
            return Err(SiError::UnexpectedTableId {
                expected: TABLE_ID_SDT_ACTUAL,
                actual: header.table_id,
            });
        }
        let malformed = |reason| SiError::MalformedSection {
            table_id: header.table_id,
            reason,
        };
        if header.total_len() < Self::LOOP_START + 4 {
            return Err(malformed("too short for the SDT fixed part and CRC"));
        }
        if !section_crc_ok(&data) {
            let total = header.total_len();
            let stored = u32::from_be_bytes([
                data[total - 4],
                data[total - 3],
                data[total - 2],
                data[total - 1],
            ]);
            return Err(SiError::CrcMismatch {
                stored,
                computed: crc32(&data[..total - 4]),
            });
        }
        let syntax = SyntaxHeader::parse(header.table_id, &data)?;
        let original_network_id = u16::from_be_bytes([data[8], data[9]]);

        let mut services = Vec::new();
        let loop_end = header.total_len() - 4;
        let mut offset = Self::LOOP_START;
        while offset < loop_end {
            if offset + 5 > loop_end {
                return Err(malformed("service loop ends in a fragment"));
            }
            let service_id = u16::from_be_bytes([data[offset], data[offset + 1]]);
            let flags = data[offset + 2];
            let status_byte = data[offset + 3];
            let descriptors_len =
                (((status_byte & 0x0F) as usize) << 8) | data[offset + 4] as usize;
            let descriptors_end = offset + 5 + descriptors_len;
            if descriptors_end > loop_end {
                return Err(malformed("service descriptor loop overruns the section"));
            }
            services.push(SdtService {
                service_id,
                eit_schedule: flags & 0x02 != 0,
                eit_present_following: flags & 0x01 != 0,
                running_status: status_byte >> 5,
                free_ca: status_byte & 0x10 != 0,
                descriptors: parse_descriptor_loop(data.slice(offset + 5..descriptors_end))?,
            });
            offset = descriptors_end;
        }

        Ok(ServiceDescriptionSection {
            table_id: header.table_id,
            transport_stream_id: syntax.table_id_extension,
            version: syntax.version,
            current_next: syntax.current_next,
            section_number: syntax.section_number,
            last_section_number: syntax.last_section_number,
            original_network_id,
            services,
        })
    }

    /// Encode as a complete raw section with a valid CRC.
    ///
    /// Suitable for synthesizing a minimal SDT to announce services to a
    /// downstream device.
    pub fn encode(&self) -> Result<Bytes> {
        let mut b = SectionBuilder::new();
        b.put_u8(self.table_id);
        let section_len = b.reserve_length12();
        b.put_u16(self.transport_stream_id);
        b.put_u8(0xC0 | (self.version << 1) | self.current_next as u8);
        b.put_u8(self.section_number);
        b.put_u8(self.last_section_number);
        b.put_u16(self.original_network_id);
        b.put_u8(0xFF); // reserved_future_use
        for service in &self.services {
            b.put_u16(service.service_id);
            b.put_u8(
                0xFC | (service.eit_schedule as u8) << 1 | service.eit_present_following as u8,
            );
            let loop_len = b.reserve_length12();
            for descriptor in &service.descriptors {
                descriptor.put(&mut b)?;
            }
            b.patch_length12(
                loop_len,
                (service.running_status << 5) | (service.free_ca as u8) << 4,
            );
        }
        b.put_u32(0); // CRC placeholder, counted by section_length
        b.patch_length12(section_len, 0xB0);
        b.patch_crc32();
        Ok(b.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ServiceDescriptor;

    fn sample() -> ServiceDescriptionSection {
        ServiceDescriptionSection {
            table_id: TABLE_ID_SDT_ACTUAL,
            transport_stream_id: 1,
            version: 0,
            current_next: true,
            section_number: 0,
            last_section_number: 0,
            original_network_id: 1,
            services: vec![SdtService {
                service_id: 2,
                eit_schedule: false,
                eit_present_following: true,
                running_status: 4,
                free_ca: false,
                descriptors: vec![Descriptor::Service(ServiceDescriptor {
                    service_type: 0x01,
                    provider: "Proxy".into(),
                    name: "Service Two".into(),
                })],
            }],
        }
    }

    #[test]
    fn round_trip() {
        let sdt = sample();
        let raw = sdt.encode().unwrap();
        assert_eq!(raw[0], TABLE_ID_SDT_ACTUAL);
        assert!(section_crc_ok(&raw));
        assert_eq!(ServiceDescriptionSection::parse(raw).unwrap(), sdt);
    }

    #[test]
    fn multiple_services_round_trip() {
        let mut sdt = sample();
        sdt.services.push(SdtService {
            service_id: 3,
            eit_schedule: true,
            eit_present_following: false,
            running_status: 1,
            free_ca: true,
            descriptors: vec![],
        });
        let raw = sdt.encode().unwrap();
        assert_eq!(ServiceDescriptionSection::parse(raw).unwrap(), sdt);
    }

    #[test]
    fn other_transport_stream_table_id() {
        let mut sdt = sample();
        sdt.table_id = TABLE_ID_SDT_OTHER;
        let raw = sdt.encode().unwrap();
        let parsed = ServiceDescriptionSection::parse(raw).unwrap();
        assert_eq!(parsed.table_id, TABLE_ID_SDT_OTHER);
    }

    #[test]
    fn service_loop_overrun_rejected() {
        let raw = sample().encode().unwrap();
        let mut bad = raw.to_vec();
        // Inflate the first service's descriptor loop length beyond the
        // section end, then refresh the CRC.
        bad[15] = bad[15].wrapping_add(0x40);
        let body_end = bad.len() - 4;
        let crc = crc32(&bad[..body_end]).to_be_bytes();
        bad[body_end..].copy_from_slice(&crc);
        assert!(matches!(
            ServiceDescriptionSection::parse(Bytes::from(bad)),
            Err(SiError::MalformedSection { .. })
        ));
    }

    #[test]
    fn crc_is_enforced() {
        let mut raw = sample().encode().unwrap().to_vec();
        raw[5] ^= 0x01;
        assert!(matches!(
            ServiceDescriptionSection::parse(Bytes::from(raw)),
            Err(SiError::CrcMismatch { .. })
        ));
    }
}
