//! Random access over an immutable byte buffer, addressed in bits.
//!
//! A [`BitStream`] is a cheap handle: cloning it shares the underlying buffer, so every field and
//! field set in a tree can keep its own copy without copying data. All addresses are in bits from
//! the start of the buffer.
//!
//! Within a byte, little-endian reads consume bits starting at the least significant bit and
//! big-endian reads start at the most significant bit. For byte-aligned reads whose width is a
//! multiple of 8 this matches the usual byte order of the same name.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::{fmt, io::Read, sync::Arc};

use crate::error::{Error, Result};

/// Bit and byte order used by integer reads
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, derive_more::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Endian {
    /// Least significant bit and byte first
    #[default]
    #[display("little-endian")]
    Little,
    /// Most significant bit and byte first
    #[display("big-endian")]
    Big,
}

/// Shared, read-only input for a field tree
#[derive(Clone)]
pub struct BitStream {
    data: Arc<[u8]>,
}

impl fmt::Debug for BitStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitStream({} bytes)", self.data.len())
    }
}

impl From<Vec<u8>> for BitStream {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl From<&[u8]> for BitStream {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

impl BitStream {
    /// Wrap an in-memory buffer
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }

    /// Read everything from `reader` into a new stream
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(Self::new(data))
    }

    /// Length of the input in bytes
    pub fn len_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    /// Length of the input in bits
    pub fn len_bits(&self) -> u64 {
        self.len_bytes() * 8
    }

    /// Whether the input holds no bytes at all
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The whole buffer
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Make sure `width` bits starting at `address` lie inside the input
    pub fn ensure(&self, address: u64, width: u64) -> Result<()> {
        let available = self.len_bits();
        match address.checked_add(width) {
            Some(end) if end <= available => Ok(()),
            _ => Err(Error::Truncated {
                address,
                width,
                available,
            }),
        }
    }

    /// Read an unsigned integer of `width` bits (1 to 64) at bit `address`
    pub fn read_bits(&self, address: u64, width: u32, endian: Endian) -> Result<u64> {
        if width == 0 || width > 64 {
            return Err(Error::InvalidWidth(width));
        }
        self.ensure(address, u64::from(width))?;

        if address % 8 == 0 && width % 8 == 0 {
            let start = (address / 8) as usize;
            let count = (width / 8) as usize;
            let bytes = &self.data[start..start + count];
            return Ok(match endian {
                Endian::Little => LittleEndian::read_uint(bytes, count),
                Endian::Big => BigEndian::read_uint(bytes, count),
            });
        }

        let mut value = 0u64;
        for i in 0..u64::from(width) {
            let position = address + i;
            let byte = self.data[(position / 8) as usize];
            match endian {
                Endian::Little => {
                    let bit = (byte >> (position % 8)) & 1;
                    value |= u64::from(bit) << i;
                }
                Endian::Big => {
                    let bit = (byte >> (7 - position % 8)) & 1;
                    value = (value << 1) | u64::from(bit);
                }
            }
        }
        Ok(value)
    }

    /// Read a two's complement integer of `width` bits at bit `address`
    pub fn read_signed(&self, address: u64, width: u32, endian: Endian) -> Result<i64> {
        let raw = self.read_bits(address, width, endian)?;
        let shift = 64 - width;
        Ok(((raw << shift) as i64) >> shift)
    }

    /// Borrow `len` bytes starting at byte `offset`
    pub fn read_bytes(&self, offset: u64, len: u64) -> Result<&[u8]> {
        self.ensure(offset.saturating_mul(8), len.saturating_mul(8))?;
        let start = offset as usize;
        Ok(&self.data[start..start + len as usize])
    }

    /// Borrow the bytes covering `width` bits at `address`; both must be byte aligned
    pub fn read_aligned(&self, address: u64, width: u64) -> Result<&[u8]> {
        if address % 8 != 0 {
            return Err(Error::Unaligned(address));
        }
        if width % 8 != 0 {
            return Err(Error::Unaligned(address + width));
        }
        self.read_bytes(address / 8, width / 8)
    }

    /// Find the first byte-aligned occurrence of `pattern` that lies completely inside the bit
    /// range `from..to`, returning its bit address
    pub fn search(&self, pattern: &[u8], from: u64, to: u64) -> Option<u64> {
        if pattern.is_empty() {
            return None;
        }
        let start = from.div_ceil(8).min(self.len_bytes());
        let end = (to / 8).min(self.len_bytes());
        if start >= end {
            return None;
        }
        let haystack = &self.data[start as usize..end as usize];
        memchr::memmem::find(haystack, pattern).map(|position| (start + position as u64) * 8)
    }
}
