//! CRC-32/MPEG-2 as used by PSI/SI section trailers.
//!
//! Polynomial 0x04C11DB7, initial value all-ones, no bit reflection and no
//! final XOR. Distinct from the zlib CRC-32.

const POLY: u32 = 0x04C1_1DB7;

/// Compute the CRC-32/MPEG-2 of a byte slice.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = u32::MAX;
    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Check a full section (trailing 4-byte CRC included).
///
/// The CRC of a section concatenated with its own checksum is zero.
pub fn section_crc_ok(section: &[u8]) -> bool {
    section.len() >= 4 && crc32(section) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // CRC-32/MPEG-2 of "123456789"
        assert_eq!(crc32(b"123456789"), 0x0376_E6E7);
    }

    #[test]
    fn empty_input_is_init_value() {
        assert_eq!(crc32(b""), 0xFFFF_FFFF);
    }

    #[test]
    fn appended_crc_validates() {
        let body = b"section body bytes";
        let mut section = body.to_vec();
        section.extend_from_slice(&crc32(body).to_be_bytes());
        assert!(section_crc_ok(&section));
    }

    #[test]
    fn corrupted_section_fails() {
        let body = b"section body bytes";
        let mut section = body.to_vec();
        section.extend_from_slice(&crc32(body).to_be_bytes());
        section[3] ^= 0x01;
        assert!(!section_crc_ok(&section));
    }

    #[test]
    fn too_short_is_invalid() {
        assert!(!section_crc_ok(&[0x00, 0x01]));
    }
}
