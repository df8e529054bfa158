//! MPEG-2 transport stream demultiplexer
//!
//! Feeds arbitrarily chunked transport stream data through a PID filter
//! registry: raw packet taps, SI/PSI section reassembly, and PES unit
//! reconstruction for audio and DVB subtitle streams. Corrupt input is
//! skipped and counted rather than raised; the parser resynchronizes on
//! the 0x47 sync byte within one packet of junk.

pub mod demuxer;
pub mod error;
pub mod packet;
pub mod registry;
pub mod section;
pub mod stream;

pub use demuxer::{DemuxStats, Demuxer};
pub use error::DemuxError;
pub use packet::{
    ContinuityStatus, ContinuityTracker, PACKET_SIZE, PID_MAX, PID_NULL, SYNC_BYTE, TsPacket,
};
pub use registry::{FilterRegistry, RawHandler, SectionHandler, StreamHandler};
pub use section::SectionAssembler;
pub use stream::{EsAssembler, EsStats, PES_START_CODE, StreamKind};

/// Result type for demultiplexer operations
pub type Result<T> = std::result::Result<T, DemuxError>;
