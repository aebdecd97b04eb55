//! Leaf nodes of a field tree

use chrono::NaiveDateTime;
use std::{borrow::Cow, fmt};

use crate::{
    error::{Error, Result},
    stream::BitStream,
};

/// Decoded value of a field
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Value {
    /// Single flag bit
    Bool(bool),
    /// Unsigned integer
    UInt(u64),
    /// Signed integer
    Int(i64),
    /// Decoded text
    Text(String),
    /// Calendar date and time
    Timestamp(NaiveDateTime),
    /// Opaque byte range of the given length; the bytes stay in the stream
    Raw(u64),
}

impl Value {
    /// Integer value, if this is a non-negative integer or a flag
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt(value) => Some(*value),
            Self::Int(value) => u64::try_from(*value).ok(),
            Self::Bool(value) => Some(u64::from(*value)),
            _ => None,
        }
    }

    /// Flag value; integers count as set when non-zero
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            Self::UInt(value) => Some(*value != 0),
            _ => None,
        }
    }

    /// Text value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Timestamp value
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::UInt(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => write!(f, "{value:?}"),
            Self::Timestamp(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S")),
            Self::Raw(len) => write!(f, "<{len} bytes>"),
        }
    }
}

/// Kind of field, as reported in trees and JSON output
#[derive(Debug, Copy, Clone, PartialEq, Eq, derive_more::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FieldType {
    /// One bit flag
    #[display("bit")]
    Bit,
    /// Sub-byte or odd-width integer
    #[display("bits")]
    Bits,
    /// Integer of whole bytes
    #[display("integer")]
    Integer,
    /// Integer with named values
    #[display("enum")]
    Enum,
    /// Fixed-length text
    #[display("string")]
    String,
    /// Date and time
    #[display("timestamp")]
    Timestamp,
    /// Uninterpreted bytes
    #[display("raw")]
    Raw,
    /// Bytes that carry no information
    #[display("padding")]
    Padding,
}

/// How an integer field is rendered for humans
#[derive(Debug, Copy, Clone)]
pub enum Render {
    /// Plain decimal
    Decimal,
    /// `0x`-prefixed hexadecimal, zero padded to the field width
    Hex,
    /// Byte count with a binary unit
    FileSize,
    /// Lookup table of named values
    Names(&'static [(u64, &'static str)]),
    /// `major.minor` packed as `major * 10 + minor`
    Version,
}

impl Render {
    /// Human readable rendering of `value` for a field of `width` bits
    pub fn apply(self, value: u64, width: u32) -> Option<String> {
        match self {
            Self::Decimal => None,
            Self::Hex => Some(format!("{value:#0w$x}", w = (width as usize).div_ceil(4) + 2)),
            Self::FileSize => Some(human_size(value)),
            Self::Names(names) => Some(
                names
                    .iter()
                    .find(|(key, _)| *key == value)
                    .map(|(_, name)| (*name).to_owned())
                    .unwrap_or_else(|| format!("unknown ({value:#x})")),
            ),
            Self::Version => Some(format!("{}.{}", value / 10, value % 10)),
        }
    }
}

/// Render a byte count the way file managers do
pub fn human_size(size: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if size < 1024 {
        return format!("{size} bytes");
    }
    let mut scaled = size as f64 / 1024.0;
    let mut unit = UNITS[0];
    for next in &UNITS[1..] {
        if scaled < 1024.0 {
            break;
        }
        scaled /= 1024.0;
        unit = next;
    }
    format!("{scaled:.1} {unit}")
}

/// Text encodings understood by string fields
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Charset {
    /// 7-bit ASCII; other bytes decode as U+FFFD
    Ascii,
    /// ISO-8859-15
    Latin9,
    /// UTF-8, decoded lossily
    Utf8,
    /// UCS-2/UTF-16 big-endian, decoded lossily
    Utf16Be,
}

impl Charset {
    /// Decode `bytes` to a string
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Self::Ascii => bytes
                .iter()
                .map(|&b| if b.is_ascii() { char::from(b) } else { char::REPLACEMENT_CHARACTER })
                .collect(),
            Self::Latin9 => bytes.iter().map(|&b| latin9(b)).collect(),
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Utf16Be => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                widestring::U16Str::from_slice(&units).to_string_lossy()
            }
        }
    }
}

fn latin9(byte: u8) -> char {
    match byte {
        0xA4 => '\u{20AC}',
        0xA6 => '\u{0160}',
        0xA8 => '\u{0161}',
        0xB4 => '\u{017D}',
        0xB8 => '\u{017E}',
        0xBC => '\u{0152}',
        0xBD => '\u{0153}',
        0xBE => '\u{0178}',
        other => char::from(other),
    }
}

/// A typed, addressed leaf value
///
/// Raw and padding fields never copy their bytes; [`Field::bytes`] borrows them from the stream.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Field {
    name: String,
    address: u64,
    size: u64,
    field_type: FieldType,
    value: Value,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    display: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    description: Option<Cow<'static, str>>,
    #[cfg_attr(feature = "serde", serde(skip))]
    stream: BitStream,
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("address", &self.address)
            .field("size", &self.size)
            .field("type", &self.field_type)
            .field("value", &self.value)
            .finish()
    }
}

impl Field {
    /// Create a field covering `size` bits at absolute bit `address` of `stream`
    pub fn new(
        stream: BitStream,
        name: impl Into<String>,
        address: u64,
        size: u64,
        field_type: FieldType,
        value: Value,
    ) -> Self {
        Self {
            name: name.into(),
            address,
            size,
            field_type,
            value,
            display: None,
            description: None,
            stream,
        }
    }

    /// Attach a human readable rendering
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    /// Attach a description
    pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Name, unique within the parent field set
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn rename(&mut self, name: String) {
        self.name = name;
    }

    /// Absolute bit address
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Size in bits
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Kind of field
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Decoded value
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Rendering for humans; falls back to the value itself
    pub fn display(&self) -> String {
        self.display
            .clone()
            .unwrap_or_else(|| self.value.to_string())
    }

    /// Description, if the grammar gave one
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The bytes this field covers
    pub fn bytes(&self) -> Result<&[u8]> {
        self.stream.read_aligned(self.address, self.size)
    }

    /// Integer value or [`Error::WrongType`]
    pub fn uint(&self) -> Result<u64> {
        self.value.as_u64().ok_or_else(|| Error::WrongType {
            path: self.name.clone(),
            expected: "an integer",
        })
    }
}
