use thiserror::Error;

/// Errors surfaced by the demultiplexer API.
///
/// Malformed transport data never raises one of these: corrupt packets are
/// skipped, counted in [`DemuxStats`](crate::DemuxStats), and the parser
/// resynchronizes. Errors are reserved for misuse of the API itself.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DemuxError {
    #[error("PID {0:#06x} is outside the filterable range 0x0000..=0x1FFE")]
    PidOutOfRange(u16),

    #[error("invalid packet size: expected 188 bytes, got {0}")]
    InvalidPacketSize(usize),

    #[error("invalid sync byte: expected 0x47, got {0:#04x}")]
    InvalidSyncByte(u8),
}
