//! Constants and small building blocks shared by the descriptor and record grammars

use chrono::{NaiveDate, NaiveDateTime};
use strata_core::{Builder, Endian, Field, FieldType, Grammar, Result, Step, Value};
use winnow::{prelude::*, token::take, PResult};

/// Logical sector size
pub const SECTOR: u64 = 2048;

/// Bytes of the system area that precedes the first volume descriptor
pub const SYSTEM_AREA: u64 = 16 * SECTOR;

/// Standard identifier of every volume descriptor, after the type byte
pub const STANDARD_ID: &[u8; 5] = b"CD001";

/// Type byte and identifier of the primary volume descriptor
pub const MAGIC: &[u8; 6] = b"\x01CD001";

pub const VOLUME_BOOT_RECORD: u64 = 0;
pub const VOLUME_PRIMARY: u64 = 1;
pub const VOLUME_SUPPLEMENTARY: u64 = 2;
pub const VOLUME_PARTITION: u64 = 3;
pub const VOLUME_TERMINATOR: u64 = 255;

pub const VOLUME_NAMES: &[(u64, &str)] = &[
    (VOLUME_BOOT_RECORD, "Boot Record"),
    (VOLUME_PRIMARY, "Primary Volume Descriptor"),
    (VOLUME_SUPPLEMENTARY, "Supplementary Volume Descriptor"),
    (VOLUME_PARTITION, "Volume Partition Descriptor"),
    (VOLUME_TERMINATOR, "Volume Descriptor Set Terminator"),
];

/// `file_flags` bit of directories
pub const FLAG_DIRECTORY: u64 = 0x02;

/// Joliet extension level, announced by the escape sequences of a supplementary descriptor
#[derive(Debug, Copy, Clone, PartialEq, Eq, derive_more::Display)]
pub enum JolietLevel {
    #[display("Joliet level 1")]
    Level1,
    #[display("Joliet level 2")]
    Level2,
    #[display("Joliet level 3")]
    Level3,
}

impl JolietLevel {
    /// Level announced by `escape`, if it announces one
    pub fn detect(escape: &[u8]) -> Option<Self> {
        match escape.get(..3)? {
            [0x25, 0x2F, 0x40] => Some(Self::Level1),
            [0x25, 0x2F, 0x43] => Some(Self::Level2),
            [0x25, 0x2F, 0x45] => Some(Self::Level3),
            _ => None,
        }
    }
}

/// Produce an integer recorded twice, little endian then big endian, `width` bits each
///
/// The little endian half is the value; a big endian half that disagrees is kept as a warning.
pub fn add_both_endian(cx: &mut Builder<'_>, name: &str, width: u32) -> Result<u64> {
    let address = cx.address();
    let value = cx.stream().read_bits(address, width, Endian::Little)?;
    let mirror = cx
        .stream()
        .read_bits(address + u64::from(width), width, Endian::Big)?;
    let field = Field::new(
        cx.stream().clone(),
        name,
        address,
        u64::from(width) * 2,
        FieldType::Integer,
        Value::UInt(value),
    );
    cx.add_field(field)?;
    if mirror != value {
        cx.warn(format!(
            "`{name}` is {value} little endian but {mirror} big endian"
        ));
    }
    Ok(value)
}

/// Produce a big endian integer inside a little endian structure
pub fn add_big_endian(cx: &mut Builder<'_>, name: &str, width: u32) -> Result<u64> {
    let value = cx.stream().read_bits(cx.address(), width, Endian::Big)?;
    let field = Field::new(
        cx.stream().clone(),
        name,
        cx.address(),
        width.into(),
        FieldType::Integer,
        Value::UInt(value),
    );
    cx.add_field(field)?;
    Ok(value)
}

/// Seven byte date and time of directory records: years since 1900, month, day, hour, minute,
/// second and the offset from GMT in 15 minute steps
pub struct DirTime;

impl Grammar for DirTime {
    fn step(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
        let year = cx.add_uint("year", 8)?;
        let month = cx.add_uint("month", 8)?;
        let day = cx.add_uint("day", 8)?;
        let hour = cx.add_uint("hour", 8)?;
        let minute = cx.add_uint("minute", 8)?;
        let second = cx.add_uint("second", 8)?;
        cx.add_int("offset", 8)?;

        let timestamp = NaiveDate::from_ymd_opt(1900 + year as i32, month as u32, day as u32)
            .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32));
        if let Some(timestamp) = timestamp {
            cx.set_value(Value::Timestamp(timestamp));
        }
        Ok(Step::Done)
    }
}

fn digits(count: usize) -> impl FnMut(&mut &[u8]) -> PResult<u32> {
    move |input: &mut &[u8]| {
        take(count)
            .verify(|chunk: &[u8]| chunk.iter().all(u8::is_ascii_digit))
            .map(|chunk: &[u8]| {
                chunk
                    .iter()
                    .fold(0, |acc, digit| acc * 10 + u32::from(digit - b'0'))
            })
            .parse_next(input)
    }
}

fn long_timestamp(input: &mut &[u8]) -> PResult<NaiveDateTime> {
    (
        digits(4),
        digits(2),
        digits(2),
        digits(2),
        digits(2),
        digits(2),
        digits(2),
    )
        .verify_map(|(year, month, day, hour, minute, second, hundredths)| {
            NaiveDate::from_ymd_opt(year as i32, month, day)?.and_hms_milli_opt(
                hour,
                minute,
                second,
                hundredths * 10,
            )
        })
        .parse_next(input)
}

/// Parse the digits of a 17-byte descriptor timestamp, `YYYYMMDDHHMMSScc`
///
/// ```
/// use strata_iso::types::parse_long_timestamp;
///
/// let ts = parse_long_timestamp(b"2024031512304400\x00").unwrap();
/// assert_eq!(ts.to_string(), "2024-03-15 12:30:44");
/// // unset dates are all zeros
/// assert!(parse_long_timestamp(b"0000000000000000\x00").is_none());
/// ```
pub fn parse_long_timestamp(bytes: &[u8]) -> Option<NaiveDateTime> {
    long_timestamp.parse_next(&mut &bytes[..]).ok()
}

/// Produce a 17-byte timestamp: a timestamp value when the digits form a date, the text
/// otherwise
pub fn add_long_timestamp(cx: &mut Builder<'_>, name: &str) -> Result<Option<NaiveDateTime>> {
    let bytes = cx.peek_bytes(17)?;
    let timestamp = parse_long_timestamp(bytes);
    let offset = i32::from(bytes[16] as i8) * 15;
    let value = match timestamp {
        Some(timestamp) => Value::Timestamp(timestamp),
        None => Value::Text(
            String::from_utf8_lossy(&bytes[..16])
                .trim_matches(|c: char| c == ' ' || c == '\0')
                .to_owned(),
        ),
    };
    let field = Field::new(
        cx.stream().clone(),
        name,
        cx.address(),
        17 * 8,
        FieldType::Timestamp,
        value,
    )
    .with_description(format!("GMT offset {offset:+} minutes"));
    cx.add_field(field)?;
    Ok(timestamp)
}
