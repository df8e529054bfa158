//! Descriptor codec: the tag + length + payload units nested in SI tables.
//!
//! The raw layer ([`DescriptorRef`], [`DescriptorIterator`]) walks a
//! descriptor loop without interpreting payloads. The typed layer
//! ([`Descriptor`]) is a closed enum with one arm per handled tag; decoding
//! validates the declared length against what the payload shape requires
//! before trusting any field, and encoding appends the same layout through
//! a [`SectionBuilder`].

use bytes::{Buf, Bytes};
use chrono::NaiveDateTime;

use crate::builder::SectionBuilder;
use crate::time::{decode_mjd_utc, encode_mjd_utc};
use crate::{Result, SiError};

/// network_name_descriptor (EN 300 468 6.2.27)
pub const TAG_NETWORK_NAME: u8 = 0x40;
/// service_list_descriptor (EN 300 468 6.2.35)
pub const TAG_SERVICE_LIST: u8 = 0x41;
/// service_descriptor (EN 300 468 6.2.33)
pub const TAG_SERVICE: u8 = 0x48;
/// local_time_offset_descriptor (EN 300 468 6.2.20)
pub const TAG_LOCAL_TIME_OFFSET: u8 = 0x58;
/// terrestrial_delivery_system_descriptor (EN 300 468 6.2.13.4)
pub const TAG_TERRESTRIAL_DELIVERY: u8 = 0x5A;
/// ancillary_data_descriptor (EN 300 468 6.2.2)
pub const TAG_ANCILLARY_DATA: u8 = 0x6B;
/// cell_list_descriptor (EN 300 468 6.2.7)
pub const TAG_CELL_LIST: u8 = 0x6C;

/// Raw descriptor reference: tag plus untouched payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorRef {
    pub tag: u8,
    pub data: Bytes,
}

/// Iterator over a `[tag][length][payload]` descriptor loop.
///
/// A trailing fragment shorter than the 2-byte header, or a declared length
/// overrunning the loop, yields an error and ends iteration; the containing
/// table treats that as whole-section invalidity.
#[derive(Debug, Clone)]
pub struct DescriptorIterator {
    data: Bytes,
}

impl DescriptorIterator {
    pub fn new(data: Bytes) -> Self {
        DescriptorIterator { data }
    }
}

impl Iterator for DescriptorIterator {
    type Item = Result<DescriptorRef>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        if self.data.len() < 2 {
            let remaining = self.data.len();
            self.data.clear();
            return Some(Err(SiError::TruncatedDescriptorLoop { remaining }));
        }
        let tag = self.data[0];
        let length = self.data[1] as usize;
        self.data.advance(2);
        if self.data.len() < length {
            self.data.clear();
            return Some(Err(SiError::MalformedDescriptor {
                tag,
                reason: "declared length overruns the descriptor loop",
            }));
        }
        let data = self.data.split_to(length);
        Some(Ok(DescriptorRef { tag, data }))
    }
}

/// Decode every descriptor in a loop, failing on the first malformed one.
pub fn parse_descriptor_loop(data: Bytes) -> Result<Vec<Descriptor>> {
    DescriptorIterator::new(data)
        .map(|raw| raw.and_then(Descriptor::parse))
        .collect()
}

/// Strip an optional character-table marker and decode as DVB default Latin.
fn decode_text(data: &[u8]) -> String {
    let body = match data.first() {
        // 0x10 selects an ISO 8859 part via two more bytes
        Some(0x10) => data.get(3..).unwrap_or(&[]),
        Some(&b) if b < 0x20 => &data[1..],
        _ => data,
    };
    body.iter().map(|&b| b as char).collect()
}

/// Append text in the DVB default Latin table (no marker byte).
fn encode_text(text: &str, b: &mut SectionBuilder) {
    for ch in text.chars() {
        b.put_u8(if (ch as u32) < 0x100 { ch as u8 } else { b'?' });
    }
}

/// network_name_descriptor: the delivery network's human-readable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkNameDescriptor {
    pub name: String,
}

impl NetworkNameDescriptor {
    fn parse(data: &[u8]) -> Result<Self> {
        Ok(NetworkNameDescriptor {
            name: decode_text(data),
        })
    }

    fn put_payload(&self, b: &mut SectionBuilder) {
        encode_text(&self.name, b);
    }
}

/// One (service_id, service_type) record of a service_list_descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceListEntry {
    pub service_id: u16,
    pub service_type: u8,
}

/// service_list_descriptor: fixed 3-byte records until the length runs out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceListDescriptor {
    pub services: Vec<ServiceListEntry>,
}

impl ServiceListDescriptor {
    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() % 3 != 0 {
            return Err(SiError::MalformedDescriptor {
                tag: TAG_SERVICE_LIST,
                reason: "length is not a multiple of 3",
            });
        }
        let services = data
            .chunks_exact(3)
            .map(|rec| ServiceListEntry {
                service_id: u16::from_be_bytes([rec[0], rec[1]]),
                service_type: rec[2],
            })
            .collect();
        Ok(ServiceListDescriptor { services })
    }

    fn put_payload(&self, b: &mut SectionBuilder) {
        for entry in &self.services {
            b.put_u16(entry.service_id);
            b.put_u8(entry.service_type);
        }
    }
}

/// service_descriptor: service type plus provider and service names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub service_type: u8,
    pub provider: String,
    pub name: String,
}

impl ServiceDescriptor {
    fn parse(data: &[u8]) -> Result<Self> {
        let malformed = |reason| SiError::MalformedDescriptor {
            tag: TAG_SERVICE,
            reason,
        };
        if data.len() < 3 {
            return Err(malformed("shorter than the 3-byte minimum"));
        }
        let service_type = data[0];
        let provider_len = data[1] as usize;
        let name_len_pos = 2 + provider_len;
        if name_len_pos >= data.len() {
            return Err(malformed("provider name overruns the payload"));
        }
        let name_len = data[name_len_pos] as usize;
        let end = name_len_pos + 1 + name_len;
        if end > data.len() {
            return Err(malformed("service name overruns the payload"));
        }
        Ok(ServiceDescriptor {
            service_type,
            provider: decode_text(&data[2..name_len_pos]),
            name: decode_text(&data[name_len_pos + 1..end]),
        })
    }

    fn put_payload(&self, b: &mut SectionBuilder) {
        b.put_u8(self.service_type);
        let provider_len = b.reserve_length();
        encode_text(&self.provider, b);
        b.patch_length(provider_len);
        let name_len = b.reserve_length();
        encode_text(&self.name, b);
        b.patch_length(name_len);
    }
}

/// One region record of a local_time_offset_descriptor (13 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalTimeOffsetEntry {
    pub country_code: [u8; 3],
    pub region_id: u8,
    pub offset_negative: bool,
    /// Current offset from UTC in minutes.
    pub offset_minutes: u32,
    pub time_of_change: NaiveDateTime,
    /// Offset in minutes that applies after `time_of_change`.
    pub next_offset_minutes: u32,
}

/// local_time_offset_descriptor: per-country DST change information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTimeOffsetDescriptor {
    pub entries: Vec<LocalTimeOffsetEntry>,
}

fn bcd_minutes(hh: u8, mm: u8) -> Result<u32> {
    let digits = |byte: u8| -> Result<u32> {
        let (hi, lo) = (byte >> 4, byte & 0x0F);
        if hi > 9 || lo > 9 {
            return Err(SiError::InvalidBcd(byte));
        }
        Ok((hi * 10 + lo) as u32)
    };
    Ok(digits(hh)? * 60 + digits(mm)?)
}

fn minutes_to_bcd(minutes: u32) -> [u8; 2] {
    let (hh, mm) = (minutes / 60, minutes % 60);
    [
        (((hh / 10) << 4) | (hh % 10)) as u8,
        (((mm / 10) << 4) | (mm % 10)) as u8,
    ]
}

impl LocalTimeOffsetDescriptor {
    const ENTRY_LEN: usize = 13;

    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() % Self::ENTRY_LEN != 0 {
            return Err(SiError::MalformedDescriptor {
                tag: TAG_LOCAL_TIME_OFFSET,
                reason: "length is not a multiple of 13",
            });
        }
        let mut entries = Vec::with_capacity(data.len() / Self::ENTRY_LEN);
        for rec in data.chunks_exact(Self::ENTRY_LEN) {
            let change = [rec[6], rec[7], rec[8], rec[9], rec[10]];
            entries.push(LocalTimeOffsetEntry {
                country_code: [rec[0], rec[1], rec[2]],
                region_id: rec[3] >> 2,
                offset_negative: rec[3] & 0x01 != 0,
                offset_minutes: bcd_minutes(rec[4], rec[5])?,
                time_of_change: decode_mjd_utc(&change)?,
                next_offset_minutes: bcd_minutes(rec[11], rec[12])?,
            });
        }
        Ok(LocalTimeOffsetDescriptor { entries })
    }

    fn put_payload(&self, b: &mut SectionBuilder) -> Result<()> {
        for entry in &self.entries {
            b.put_bytes(&entry.country_code);
            b.put_u8((entry.region_id << 2) | 0x02 | entry.offset_negative as u8);
            b.put_bytes(&minutes_to_bcd(entry.offset_minutes));
            b.put_bytes(&encode_mjd_utc(entry.time_of_change)?);
            b.put_bytes(&minutes_to_bcd(entry.next_offset_minutes));
        }
        Ok(())
    }
}

/// terrestrial_delivery_system_descriptor: fixed 11-byte DVB-T tuning set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerrestrialDeliveryDescriptor {
    /// Centre frequency in kHz (the wire value is in units of 10 Hz).
    pub centre_frequency_khz: u32,
    /// 3-bit bandwidth code (0 = 8 MHz, 1 = 7 MHz, 2 = 6 MHz, 3 = 5 MHz)
    pub bandwidth: u8,
    pub priority: bool,
    pub time_slicing: bool,
    pub mpe_fec: bool,
    pub constellation: u8,
    pub hierarchy: u8,
    pub code_rate_hp: u8,
    pub code_rate_lp: u8,
    pub guard_interval: u8,
    pub transmission_mode: u8,
    pub other_frequency: bool,
}

impl TerrestrialDeliveryDescriptor {
    const LEN: usize = 11;

    /// Centre frequency in Hz.
    pub fn centre_frequency_hz(&self) -> u64 {
        self.centre_frequency_khz as u64 * 1_000
    }

    fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::LEN {
            return Err(SiError::MalformedDescriptor {
                tag: TAG_TERRESTRIAL_DELIVERY,
                reason: "shorter than the fixed 11-byte layout",
            });
        }
        let raw_frequency = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        Ok(TerrestrialDeliveryDescriptor {
            centre_frequency_khz: raw_frequency / 100,
            bandwidth: data[4] >> 5,
            priority: data[4] & 0x10 != 0,
            time_slicing: data[4] & 0x08 != 0,
            mpe_fec: data[4] & 0x04 != 0,
            constellation: data[5] >> 6,
            hierarchy: (data[5] >> 3) & 0x07,
            code_rate_hp: data[5] & 0x07,
            code_rate_lp: data[6] >> 5,
            guard_interval: (data[6] >> 3) & 0x03,
            transmission_mode: (data[6] >> 1) & 0x03,
            other_frequency: data[6] & 0x01 != 0,
        })
    }

    fn put_payload(&self, b: &mut SectionBuilder) {
        b.put_u32(self.centre_frequency_khz * 100);
        b.put_u8(
            (self.bandwidth << 5)
                | (self.priority as u8) << 4
                | (self.time_slicing as u8) << 3
                | (self.mpe_fec as u8) << 2
                | 0x03,
        );
        b.put_u8((self.constellation << 6) | (self.hierarchy << 3) | self.code_rate_hp);
        b.put_u8(
            (self.code_rate_lp << 5)
                | (self.guard_interval << 3)
                | (self.transmission_mode << 1)
                | self.other_frequency as u8,
        );
        b.put_u32(0xFFFF_FFFF);
    }
}

/// ancillary_data_descriptor: one identifier byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AncillaryDataDescriptor {
    pub identifier: u8,
}

impl AncillaryDataDescriptor {
    fn parse(data: &[u8]) -> Result<Self> {
        match data.first() {
            Some(&identifier) => Ok(AncillaryDataDescriptor { identifier }),
            None => Err(SiError::MalformedDescriptor {
                tag: TAG_ANCILLARY_DATA,
                reason: "empty payload",
            }),
        }
    }

    fn put_payload(&self, b: &mut SectionBuilder) {
        b.put_u8(self.identifier);
    }
}

/// Subcell record inside a cell_list_descriptor (8 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subcell {
    pub cell_id_extension: u8,
    pub latitude: u16,
    pub longitude: u16,
    pub extent_latitude: u16,
    pub extent_longitude: u16,
}

/// One cell of a cell_list_descriptor: 10 fixed bytes plus a subcell loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub cell_id: u16,
    pub latitude: u16,
    pub longitude: u16,
    pub extent_latitude: u16,
    pub extent_longitude: u16,
    pub subcells: Vec<Subcell>,
}

/// cell_list_descriptor: variable-length cells, each self-describing its
/// subcell loop length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellListDescriptor {
    pub cells: Vec<Cell>,
}

/// Split a 3-byte pair of 12-bit extents.
fn split_extents(raw: &[u8]) -> (u16, u16) {
    let lat = ((raw[0] as u16) << 4) | (raw[1] as u16 >> 4);
    let lon = ((raw[1] as u16 & 0x0F) << 8) | raw[2] as u16;
    (lat, lon)
}

fn put_extents(lat: u16, lon: u16, b: &mut SectionBuilder) {
    b.put_u8((lat >> 4) as u8);
    b.put_u8(((lat as u8 & 0x0F) << 4) | ((lon >> 8) as u8 & 0x0F));
    b.put_u8(lon as u8);
}

impl CellListDescriptor {
    const CELL_FIXED_LEN: usize = 10;
    const SUBCELL_LEN: usize = 8;

    fn parse(data: &[u8]) -> Result<Self> {
        let malformed = |reason| SiError::MalformedDescriptor {
            tag: TAG_CELL_LIST,
            reason,
        };
        let mut cells = Vec::new();
        let mut rest = data;
        while !rest.is_empty() {
            if rest.len() < Self::CELL_FIXED_LEN {
                return Err(malformed("trailing fragment shorter than a cell header"));
            }
            let subcell_loop_len = rest[9] as usize;
            let cell_end = Self::CELL_FIXED_LEN + subcell_loop_len;
            if subcell_loop_len % Self::SUBCELL_LEN != 0 || cell_end > rest.len() {
                return Err(malformed("subcell loop length is inconsistent"));
            }
            let (extent_latitude, extent_longitude) = split_extents(&rest[6..9]);
            let subcells = rest[Self::CELL_FIXED_LEN..cell_end]
                .chunks_exact(Self::SUBCELL_LEN)
                .map(|sub| {
                    let (extent_latitude, extent_longitude) = split_extents(&sub[5..8]);
                    Subcell {
                        cell_id_extension: sub[0],
                        latitude: u16::from_be_bytes([sub[1], sub[2]]),
                        longitude: u16::from_be_bytes([sub[3], sub[4]]),
                        extent_latitude,
                        extent_longitude,
                    }
                })
                .collect();
            cells.push(Cell {
                cell_id: u16::from_be_bytes([rest[0], rest[1]]),
                latitude: u16::from_be_bytes([rest[2], rest[3]]),
                longitude: u16::from_be_bytes([rest[4], rest[5]]),
                extent_latitude,
                extent_longitude,
                subcells,
            });
            rest = &rest[cell_end..];
        }
        Ok(CellListDescriptor { cells })
    }

    fn put_payload(&self, b: &mut SectionBuilder) {
        for cell in &self.cells {
            b.put_u16(cell.cell_id);
            b.put_u16(cell.latitude);
            b.put_u16(cell.longitude);
            put_extents(cell.extent_latitude, cell.extent_longitude, b);
            b.put_u8((cell.subcells.len() * Self::SUBCELL_LEN) as u8);
            for sub in &cell.subcells {
                b.put_u8(sub.cell_id_extension);
                b.put_u16(sub.latitude);
                b.put_u16(sub.longitude);
                put_extents(sub.extent_latitude, sub.extent_longitude, b);
            }
        }
    }
}

/// Typed descriptor: closed enumeration over the handled tags.
///
/// Tags without a dedicated arm decode to [`Descriptor::Other`] with the
/// payload kept verbatim, so re-encoding preserves them byte-exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Descriptor {
    NetworkName(NetworkNameDescriptor),
    ServiceList(ServiceListDescriptor),
    Service(ServiceDescriptor),
    LocalTimeOffset(LocalTimeOffsetDescriptor),
    TerrestrialDelivery(TerrestrialDeliveryDescriptor),
    AncillaryData(AncillaryDataDescriptor),
    CellList(CellListDescriptor),
    Other(DescriptorRef),
}

impl Descriptor {
    /// Decode a raw descriptor into its typed form.
    pub fn parse(raw: DescriptorRef) -> Result<Self> {
        let data = &raw.data[..];
        Ok(match raw.tag {
            TAG_NETWORK_NAME => Descriptor::NetworkName(NetworkNameDescriptor::parse(data)?),
            TAG_SERVICE_LIST => Descriptor::ServiceList(ServiceListDescriptor::parse(data)?),
            TAG_SERVICE => Descriptor::Service(ServiceDescriptor::parse(data)?),
            TAG_LOCAL_TIME_OFFSET => {
                Descriptor::LocalTimeOffset(LocalTimeOffsetDescriptor::parse(data)?)
            }
            TAG_TERRESTRIAL_DELIVERY => {
                Descriptor::TerrestrialDelivery(TerrestrialDeliveryDescriptor::parse(data)?)
            }
            TAG_ANCILLARY_DATA => Descriptor::AncillaryData(AncillaryDataDescriptor::parse(data)?),
            TAG_CELL_LIST => Descriptor::CellList(CellListDescriptor::parse(data)?),
            _ => Descriptor::Other(raw),
        })
    }

    /// The descriptor tag byte.
    pub fn tag(&self) -> u8 {
        match self {
            Descriptor::NetworkName(_) => TAG_NETWORK_NAME,
            Descriptor::ServiceList(_) => TAG_SERVICE_LIST,
            Descriptor::Service(_) => TAG_SERVICE,
            Descriptor::LocalTimeOffset(_) => TAG_LOCAL_TIME_OFFSET,
            Descriptor::TerrestrialDelivery(_) => TAG_TERRESTRIAL_DELIVERY,
            Descriptor::AncillaryData(_) => TAG_ANCILLARY_DATA,
            Descriptor::CellList(_) => TAG_CELL_LIST,
            Descriptor::Other(raw) => raw.tag,
        }
    }

    /// Append this descriptor (tag, length, payload) to a builder.
    pub fn put(&self, b: &mut SectionBuilder) -> Result<()> {
        b.put_u8(self.tag());
        let length = b.reserve_length();
        match self {
            Descriptor::NetworkName(d) => d.put_payload(b),
            Descriptor::ServiceList(d) => d.put_payload(b),
            Descriptor::Service(d) => d.put_payload(b),
            Descriptor::LocalTimeOffset(d) => d.put_payload(b)?,
            Descriptor::TerrestrialDelivery(d) => d.put_payload(b),
            Descriptor::AncillaryData(d) => d.put_payload(b),
            Descriptor::CellList(d) => d.put_payload(b),
            Descriptor::Other(raw) => b.put_bytes(&raw.data),
        }
        b.patch_length(length);
        Ok(())
    }
}
