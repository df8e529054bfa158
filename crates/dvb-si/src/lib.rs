//! DVB Service Information (SI) section and descriptor codec
//!
//! This crate decodes and encodes SI sections (TDT, TOT, SDT) and the
//! descriptors nested inside them, per ETSI EN 300 468 and ISO 13818-1.
//! Decoding validates structure and declared lengths and returns an error
//! carrying the table id or descriptor tag of whatever failed; encoding
//! builds standard-compliant raw sections through [`SectionBuilder`].

pub mod builder;
pub mod crc32;
pub mod descriptor;
pub mod error;
pub mod section;
pub mod sdt;
pub mod table;
pub mod tdt;
pub mod time;
pub mod tot;

pub use builder::SectionBuilder;
pub use crc32::{crc32, section_crc_ok};
pub use descriptor::{
    AncillaryDataDescriptor, Cell, CellListDescriptor, Descriptor, DescriptorIterator,
    DescriptorRef, LocalTimeOffsetDescriptor, LocalTimeOffsetEntry, NetworkNameDescriptor,
    ServiceDescriptor, ServiceListDescriptor, ServiceListEntry, Subcell,
    TerrestrialDeliveryDescriptor,
};
pub use error::SiError;
pub use section::{SectionHeader, SyntaxHeader};
pub use sdt::{SdtService, ServiceDescriptionSection, TABLE_ID_SDT_ACTUAL, TABLE_ID_SDT_OTHER};
pub use table::Table;
pub use tdt::{TABLE_ID_TDT, TimeDateSection};
pub use time::{decode_mjd_utc, encode_mjd_utc};
pub use tot::{TABLE_ID_TOT, TimeOffsetSection};

/// Result type for SI codec operations
pub type Result<T> = std::result::Result<T, SiError>;
