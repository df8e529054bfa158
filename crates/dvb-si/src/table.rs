//! Dispatch over the SI table ids this crate decodes.

use bytes::Bytes;

use crate::sdt::ServiceDescriptionSection;
use crate::tdt::TimeDateSection;
use crate::tot::TimeOffsetSection;
use crate::{Result, SiError};

/// A decoded SI section of any supported kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Table {
    TimeDate(TimeDateSection),
    TimeOffset(TimeOffsetSection),
    ServiceDescription(ServiceDescriptionSection),
}

impl Table {
    /// Whether [`Table::parse`] can decode sections with this table id.
    pub fn handles(table_id: u8) -> bool {
        TimeDateSection::handles(table_id)
            || TimeOffsetSection::handles(table_id)
            || ServiceDescriptionSection::handles(table_id)
    }

    /// Decode a complete raw section, dispatching on its table id.
    pub fn parse(data: Bytes) -> Result<Self> {
        let table_id = *data.first().ok_or(SiError::SectionTooShort {
            expected: 3,
            actual: 0,
        })?;
        if TimeDateSection::handles(table_id) {
            Ok(Table::TimeDate(TimeDateSection::parse(&data)?))
        } else if TimeOffsetSection::handles(table_id) {
            Ok(Table::TimeOffset(TimeOffsetSection::parse(data)?))
        } else if ServiceDescriptionSection::handles(table_id) {
            Ok(Table::ServiceDescription(ServiceDescriptionSection::parse(
                data,
            )?))
        } else {
            Err(SiError::UnhandledTableId(table_id))
        }
    }

    pub fn table_id(&self) -> u8 {
        match self {
            Table::TimeDate(_) => crate::tdt::TABLE_ID_TDT,
            Table::TimeOffset(_) => crate::tot::TABLE_ID_TOT,
            Table::ServiceDescription(sdt) => sdt.table_id,
        }
    }

    /// Re-encode as a raw section.
    pub fn encode(&self) -> Result<Bytes> {
        match self {
            Table::TimeDate(tdt) => tdt.encode(),
            Table::TimeOffset(tot) => tot.encode(),
            Table::ServiceDescription(sdt) => sdt.encode(),
        }
    }
}
