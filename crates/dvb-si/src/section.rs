//! Common SI section framing.
//!
//! Every section starts with `table_id`, a syntax-indicator bit and a
//! 12-bit `section_length` counting the bytes that follow the 3-byte
//! header. Tables with the long (syntax) form add a 5-byte header with
//! versioning and section numbering.

use crate::{Result, SiError};

/// The 3-byte header common to all sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    pub table_id: u8,
    pub syntax_indicator: bool,
    pub section_length: u16,
}

impl SectionHeader {
    /// Parse the common header and validate that `section_length` matches
    /// the actual byte count exactly.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 3 {
            return Err(SiError::SectionTooShort {
                expected: 3,
                actual: data.len(),
            });
        }
        let table_id = data[0];
        let section_length = (((data[1] & 0x0F) as u16) << 8) | data[2] as u16;
        if data.len() != 3 + section_length as usize {
            return Err(SiError::MalformedSection {
                table_id,
                reason: "section_length disagrees with the actual byte count",
            });
        }
        Ok(SectionHeader {
            table_id,
            syntax_indicator: data[1] & 0x80 != 0,
            section_length,
        })
    }

    /// Total section size including the 3 header bytes.
    pub fn total_len(&self) -> usize {
        3 + self.section_length as usize
    }
}

/// The 5-byte extension present in long-form (syntax) sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntaxHeader {
    /// table_id_extension: transport_stream_id for the SDT.
    pub table_id_extension: u16,
    pub version: u8,
    pub current_next: bool,
    pub section_number: u8,
    pub last_section_number: u8,
}

impl SyntaxHeader {
    /// Parse from the 5 bytes following the common header (`data[3..8]`).
    pub fn parse(table_id: u8, data: &[u8]) -> Result<Self> {
        if data.len() < 8 {
            return Err(SiError::MalformedSection {
                table_id,
                reason: "too short for the long section form",
            });
        }
        Ok(SyntaxHeader {
            table_id_extension: u16::from_be_bytes([data[3], data[4]]),
            version: (data[5] >> 1) & 0x1F,
            current_next: data[5] & 0x01 != 0,
            section_number: data[6],
            last_section_number: data[7],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_exact_length_match() {
        let data = [0x42, 0x80, 0x02, 0xAA, 0xBB];
        let header = SectionHeader::parse(&data).unwrap();
        assert_eq!(header.table_id, 0x42);
        assert!(header.syntax_indicator);
        assert_eq!(header.section_length, 2);
        assert_eq!(header.total_len(), 5);
    }

    #[test]
    fn header_rejects_length_mismatch() {
        // Declares 4 bytes but carries 2
        let data = [0x42, 0x80, 0x04, 0xAA, 0xBB];
        assert!(matches!(
            SectionHeader::parse(&data),
            Err(SiError::MalformedSection { table_id: 0x42, .. })
        ));
    }

    #[test]
    fn header_rejects_truncated_input() {
        assert!(matches!(
            SectionHeader::parse(&[0x42, 0x80]),
            Err(SiError::SectionTooShort { .. })
        ));
    }

    #[test]
    fn syntax_header_fields() {
        let data = [0x42, 0x80, 0x05, 0x12, 0x34, 0xC3, 0x01, 0x02];
        let syntax = SyntaxHeader::parse(0x42, &data).unwrap();
        assert_eq!(syntax.table_id_extension, 0x1234);
        assert_eq!(syntax.version, 1);
        assert!(syntax.current_next);
        assert_eq!(syntax.section_number, 1);
        assert_eq!(syntax.last_section_number, 2);
    }
}
