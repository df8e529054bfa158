//! MJD/BCD UTC timestamp codec (EN 300 468 Annex C).
//!
//! TDT, TOT and the local-time-offset descriptor carry wall-clock time as
//! a 16-bit Modified Julian Date followed by three BCD bytes (hh mm ss).

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::{Result, SiError};

fn bcd(byte: u8) -> Result<u32> {
    let hi = byte >> 4;
    let lo = byte & 0x0F;
    if hi > 9 || lo > 9 {
        return Err(SiError::InvalidBcd(byte));
    }
    Ok((hi * 10 + lo) as u32)
}

fn to_bcd(value: u32) -> u8 {
    debug_assert!(value < 100);
    (((value / 10) << 4) | (value % 10)) as u8
}

/// Decode a 5-byte MJD + BCD timestamp into a UTC date-time.
pub fn decode_mjd_utc(raw: &[u8; 5]) -> Result<NaiveDateTime> {
    let mjd = ((raw[0] as u32) << 8) | raw[1] as u32;

    // Annex C inverse formulas.
    let y1 = ((mjd as f64 - 15_078.2) / 365.25) as i32;
    let m1 = ((mjd as f64 - 14_956.1 - (y1 as f64 * 365.25).floor()) / 30.6001) as i32;
    let day = mjd as i32 - 14_956 - (y1 as f64 * 365.25).floor() as i32
        - (m1 as f64 * 30.6001).floor() as i32;
    let k = if m1 == 14 || m1 == 15 { 1 } else { 0 };
    let year = y1 + k + 1900;
    let month = m1 - 1 - k * 12;

    let hour = bcd(raw[2])?;
    let minute = bcd(raw[3])?;
    let second = bcd(raw[4])?;

    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .and_then(|d| d.and_hms_opt(hour, minute, second))
        .ok_or(SiError::TimeOutOfRange)
}

/// Encode a UTC date-time as 5 bytes of MJD + BCD.
///
/// The MJD field is 16 bits, which covers 1858-11-17 through 2038-04-22.
pub fn encode_mjd_utc(utc: NaiveDateTime) -> Result<[u8; 5]> {
    let year = utc.year() - 1900;
    let month = utc.month() as i32;
    let day = utc.day() as i32;

    let l = if month == 1 || month == 2 { 1 } else { 0 };
    let mjd = 14_956
        + day
        + ((year - l) as f64 * 365.25) as i32
        + (((month + 1 + l * 12) as f64) * 30.6001) as i32;
    if !(0..=0xFFFF).contains(&mjd) {
        return Err(SiError::TimeOutOfRange);
    }

    Ok([
        (mjd >> 8) as u8,
        mjd as u8,
        to_bcd(utc.hour()),
        to_bcd(utc.minute()),
        to_bcd(utc.second()),
    ])
}
