//! Time Offset Table (TOT): UTC timestamp plus a descriptor loop, CRC'd.

use bytes::Bytes;
use chrono::NaiveDateTime;

use crate::builder::SectionBuilder;
use crate::crc32::{crc32, section_crc_ok};
use crate::descriptor::{Descriptor, parse_descriptor_loop};
use crate::section::SectionHeader;
use crate::time::{decode_mjd_utc, encode_mjd_utc};
use crate::{Result, SiError};

pub const TABLE_ID_TOT: u8 = 0x73;

/// Time Offset Table: current UTC time plus local-time-offset descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeOffsetSection {
    pub utc: NaiveDateTime,
    pub descriptors: Vec<Descriptor>,
}

impl TimeOffsetSection {
    /// 5-byte timestamp + 2-byte loop-length field.
    const FIXED_BODY: usize = 7;

    pub fn handles(table_id: u8) -> bool {
        table_id == TABLE_ID_TOT
    }

    /// Decode a complete raw TOT section, CRC included.
    pub fn parse(data: Bytes) -> Result<Self> {
        let malformed = |reason| SiError::MalformedSection {
            table_id: TABLE_ID_TOT,
            reason,
        };
        let header = SectionHeader::parse(&data)?;
        if header.table_id != TABLE_ID_TOT {
            return Err(SiError::UnexpectedTableId {
                expected: TABLE_ID_TOT,
                actual: header.table_id,
            });
        }
        if (header.section_length as usize) < Self::FIXED_BODY + 4 {
            return Err(malformed("too short for timestamp, loop length and CRC"));
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

        let timestamp = [data[3], data[4], data[5], data[6], data[7]];
        let loop_len = (((data[8] & 0x0F) as usize) << 8) | data[9] as usize;
        // The declared loop must fill the body exactly, up to the CRC.
        if Self::FIXED_BODY + loop_len + 4 != header.section_length as usize {
            return Err(malformed("descriptor loop length disagrees with the body"));
        }
        let descriptors = parse_descriptor_loop(data.slice(10..10 + loop_len))?;
        Ok(TimeOffsetSection {
            utc: decode_mjd_utc(&timestamp)?,
            descriptors,
        })
    }

    /// Encode as a complete raw section with a valid CRC.
    pub fn encode(&self) -> Result<Bytes> {
        let mut b = SectionBuilder::new();
        b.put_u8(TABLE_ID_TOT);
        let section_len = b.reserve_length12();
        b.put_bytes(&encode_mjd_utc(self.utc)?);
        let loop_len = b.reserve_length12();
        for descriptor in &self.descriptors {
            descriptor.put(&mut b)?;
        }
        b.patch_length12(loop_len, 0xF0);
        b.put_u32(0); // CRC placeholder, counted by section_length
        b.patch_length12(section_len, 0x70);
        b.patch_crc32();
        Ok(b.finish())
    }
}
