//! Append-only section construction buffer.
//!
//! Length fields in SI sections count bytes that follow them, so they can
//! only be produced with a two-pass discipline: reserve a placeholder,
//! write the bounded content, then patch the placeholder from the current
//! write position. The builder performs no validation; field order is the
//! caller's responsibility.

use bytes::{BufMut, Bytes, BytesMut};

use crate::crc32::crc32;

/// Language code substituted when the caller supplies an empty one.
const DEFAULT_LANGUAGE: &[u8; 3] = b"eng";

/// Growable byte buffer for encoding one SI section.
#[derive(Debug, Default)]
pub struct SectionBuilder {
    buf: BytesMut,
}

impl SectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    /// Append a 16-bit value, big-endian.
    pub fn put_u16(&mut self, value: u16) {
        self.buf.put_u16(value);
    }

    pub fn put_u32(&mut self, value: u32) {
        self.buf.put_u32(value);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.put_slice(bytes);
    }

    /// Append an ISO 639 language code as exactly 3 bytes.
    ///
    /// Shorter codes are space-padded, longer ones truncated, and an empty
    /// code becomes `eng`.
    pub fn put_language_code(&mut self, code: &str) {
        if code.is_empty() {
            self.buf.put_slice(DEFAULT_LANGUAGE);
            return;
        }
        let mut out = [b' '; 3];
        for (slot, byte) in out.iter_mut().zip(code.bytes()) {
            *slot = byte;
        }
        self.buf.put_slice(&out);
    }

    /// Reserve a one-byte length slot; returns its position for patching.
    pub fn reserve_length(&mut self) -> usize {
        let pos = self.buf.len();
        self.buf.put_u8(0);
        pos
    }

    /// Patch a one-byte slot with the number of bytes written after it.
    pub fn patch_length(&mut self, pos: usize) {
        self.buf[pos] = (self.buf.len() - pos - 1) as u8;
    }

    /// Reserve a two-byte slot for a 12-bit length field.
    pub fn reserve_length12(&mut self) -> usize {
        let pos = self.buf.len();
        self.buf.put_u16(0);
        pos
    }

    /// Patch a 12-bit length slot with the byte count written after it.
    ///
    /// `high_bits` supplies the syntax/reserved bits of the first byte; its
    /// low nibble must be zero.
    pub fn patch_length12(&mut self, pos: usize, high_bits: u8) {
        let len = self.buf.len() - pos - 2;
        self.buf[pos] = high_bits | ((len >> 8) as u8 & 0x0F);
        self.buf[pos + 1] = len as u8;
    }

    /// Overwrite the trailing 4 placeholder bytes with the CRC-32/MPEG-2 of
    /// everything before them.
    ///
    /// The caller appends the placeholder (so that patched length fields
    /// already count it) and calls this last.
    pub fn patch_crc32(&mut self) {
        let body_end = self.buf.len() - 4;
        let crc = crc32(&self.buf[..body_end]);
        self.buf[body_end..].copy_from_slice(&crc.to_be_bytes());
    }

    /// Finish and yield the immutable byte sequence.
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc32::section_crc_ok;

    #[test]
    fn scalar_appends() {
        let mut b = SectionBuilder::new();
        b.put_u8(0xAB);
        b.put_u16(0x1234);
        b.put_bytes(&[1, 2, 3]);
        assert_eq!(&b.finish()[..], &[0xAB, 0x12, 0x34, 1, 2, 3]);
    }

    #[test]
    fn language_code_normalization() {
        let mut b = SectionBuilder::new();
        b.put_language_code("deu");
        b.put_language_code("de");
        b.put_language_code("german");
        b.put_language_code("");
        assert_eq!(&b.finish()[..], b"deude gereng");
    }

    #[test]
    fn length_patch_counts_following_bytes() {
        let mut b = SectionBuilder::new();
        b.put_u8(0x40);
        let pos = b.reserve_length();
        b.put_bytes(b"name");
        b.patch_length(pos);
        assert_eq!(&b.finish()[..], &[0x40, 4, b'n', b'a', b'm', b'e']);
    }

    #[test]
    fn nested_length_patches() {
        // Outer loop containing one descriptor whose length is also patched.
        let mut b = SectionBuilder::new();
        let outer = b.reserve_length();
        b.put_u8(0x6B);
        let inner = b.reserve_length();
        b.put_u8(0x01);
        b.patch_length(inner);
        b.patch_length(outer);
        assert_eq!(&b.finish()[..], &[3, 0x6B, 1, 0x01]);
    }

    #[test]
    fn length12_patch_keeps_high_bits() {
        let mut b = SectionBuilder::new();
        let pos = b.reserve_length12();
        b.put_bytes(&[0u8; 0x123]);
        b.patch_length12(pos, 0xF0);
        let out = b.finish();
        assert_eq!(out[0], 0xF1);
        assert_eq!(out[1], 0x23);
    }

    #[test]
    fn crc_patch_validates() {
        let mut b = SectionBuilder::new();
        b.put_bytes(b"content");
        b.put_u32(0);
        b.patch_crc32();
        assert!(section_crc_ok(&b.finish()));
    }

    #[test]
    fn empty_builder() {
        let b = SectionBuilder::new();
        assert!(b.is_empty());
        assert_eq!(b.len(), 0);
    }
}
