use thiserror::Error;

/// Errors for SI section and descriptor decoding.
///
/// Malformed broadcast bytes are an expected condition, so every variant
/// keeps enough identity (table id, descriptor tag) for the caller to know
/// *what* failed without the decoded object existing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SiError {
    #[error("section too short: expected at least {expected} bytes, got {actual}")]
    SectionTooShort { expected: usize, actual: usize },

    #[error("table id 0x{actual:02X} where 0x{expected:02X} was required")]
    UnexpectedTableId { expected: u8, actual: u8 },

    #[error("no decoder for table id 0x{0:02X}")]
    UnhandledTableId(u8),

    #[error("table 0x{table_id:02X}: {reason}")]
    MalformedSection { table_id: u8, reason: &'static str },

    #[error("descriptor 0x{tag:02X}: {reason}")]
    MalformedDescriptor { tag: u8, reason: &'static str },

    #[error("descriptor loop ends in a {remaining}-byte fragment")]
    TruncatedDescriptorLoop { remaining: usize },

    #[error("CRC-32 mismatch: stored 0x{stored:08X}, computed 0x{computed:08X}")]
    CrcMismatch { stored: u32, computed: u32 },

    #[error("invalid BCD digit in byte 0x{0:02X}")]
    InvalidBcd(u8),

    #[error("MJD/UTC timestamp out of representable range")]
    TimeOutOfRange,
}
