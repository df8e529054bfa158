//! Time and Date Table (TDT): a single UTC timestamp, no CRC.

use bytes::Bytes;
use chrono::NaiveDateTime;

use crate::builder::SectionBuilder;
use crate::section::SectionHeader;
use crate::time::{decode_mjd_utc, encode_mjd_utc};
use crate::{Result, SiError};

pub const TABLE_ID_TDT: u8 = 0x70;

/// Time and Date Table: the current UTC time of the broadcast network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeDateSection {
    pub utc: NaiveDateTime,
}

impl TimeDateSection {
    pub fn handles(table_id: u8) -> bool {
        table_id == TABLE_ID_TDT
    }

    /// Decode a complete raw TDT section.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let header = SectionHeader::parse(data)?;
        if header.table_id != TABLE_ID_TDT {
            return Err(SiError::UnexpectedTableId {
                expected: TABLE_ID_TDT,
                actual: header.table_id,
            });
        }
        if header.section_length != 5 {
            return Err(SiError::MalformedSection {
                table_id: TABLE_ID_TDT,
                reason: "body must be exactly the 5-byte UTC timestamp",
            });
        }
        let raw = [data[3], data[4], data[5], data[6], data[7]];
        Ok(TimeDateSection {
            utc: decode_mjd_utc(&raw)?,
        })
    }

    /// Encode as a complete raw section.
    pub fn encode(&self) -> Result<Bytes> {
        let mut b = SectionBuilder::new();
        b.put_u8(TABLE_ID_TDT);
        let length = b.reserve_length12();
        b.put_bytes(&encode_mjd_utc(self.utc)?);
        b.patch_length12(length, 0x70);
        Ok(b.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 8, 31)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn round_trip() {
        let tdt = TimeDateSection { utc: noon() };
        let raw = tdt.encode().unwrap();
        assert_eq!(raw.len(), 8);
        assert_eq!(raw[0], TABLE_ID_TDT);
        assert_eq!(TimeDateSection::parse(&raw).unwrap(), tdt);
    }

    #[test]
    fn handles_only_its_table_id() {
        assert!(TimeDateSection::handles(0x70));
        assert!(!TimeDateSection::handles(0x73));
    }

    #[test]
    fn wrong_table_id_rejected() {
        let mut raw = TimeDateSection { utc: noon() }.encode().unwrap().to_vec();
        raw[0] = 0x73;
        assert_eq!(
            TimeDateSection::parse(&raw),
            Err(SiError::UnexpectedTableId {
                expected: 0x70,
                actual: 0x73
            })
        );
    }

    #[test]
    fn oversized_body_rejected() {
        // A 6-byte body with a consistent section_length is still not a TDT
        let raw = [0x70, 0x70, 0x06, 0xC0, 0x79, 0x12, 0x45, 0x00, 0xFF];
        assert!(matches!(
            TimeDateSection::parse(&raw),
            Err(SiError::MalformedSection { .. })
        ));
    }
}
