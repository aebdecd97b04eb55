//! Grammar of a single block
//!
//! A block is produced in three steps: the common head (`crc16`, `block_type`, `flags`,
//! `block_size`), the type specific header after which the total size of the block is
//! declared, and finally leftover header bytes plus the body.
//!
//! Blocks without packed data that set `has_added_size` store a 32-bit `added_size` right after
//! `block_size`; that many bytes follow the header. The old recovery record is the exception: its
//! `total_size` sits in that position and is the added size.

use chrono::NaiveDateTime;
use crc::{Crc, CRC_32_ISO_HDLC};
use strata_core::{
    field::human_size, Builder, Charset, Error, Field, FieldSet, FieldType, Grammar, Render,
    Result, Step, Value,
};

use crate::types::{
    dos_datetime, BlockKind, BLOCK_NAMES, COMPRESSION_NAMES, DICTIONARY_NAMES, MARKER_CRC,
    OS_MSDOS, OS_NAMES, OS_WIN32,
};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Head,
    Header,
    Rest,
}

/// Grammar of one archive block
#[derive(Debug)]
pub struct Block {
    kind: BlockKind,
    stage: Stage,
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

impl Block {
    pub fn new() -> Self {
        Self {
            kind: BlockKind::Unknown(0),
            stage: Stage::Head,
        }
    }

    fn head(&mut self, cx: &mut Builder<'_>) -> Result<()> {
        cx.add_hex("crc16", 16)?;
        let tag = cx.add_enum("block_type", 8, BLOCK_NAMES)?;
        self.kind = BlockKind::from(tag as u8);
        cx.set_name(self.kind.field_name());
        cx.describe(self.kind.label());
        if let BlockKind::Unknown(tag) = self.kind {
            cx.warn(format!("unknown block type {tag:#04x}"));
        }

        let flags = match self.kind {
            BlockKind::ArchiveMain => cx.child("flags", ArchiveFlags),
            BlockKind::File | BlockKind::NewService => cx.child("flags", FileFlags),
            BlockKind::ArchiveEnd => cx.child("flags", EndFlags),
            _ => cx.child("flags", BlockFlags),
        };
        cx.add_set(flags.with_size(16))?;
        cx.add_uint_with("block_size", 16, Render::FileSize)?;
        Ok(())
    }

    fn header(&mut self, cx: &mut Builder<'_>) -> Result<()> {
        if !self.kind.has_packed_data()
            && self.kind != BlockKind::Recovery
            && cx.flag_or_false("flags/has_added_size")?
        {
            cx.add_uint_with("added_size", 32, Render::FileSize)?;
        }
        match self.kind {
            BlockKind::ArchiveMain => {
                cx.add_padding("reserved[]", 2)?;
                cx.add_padding("reserved[]", 4)?;
            }
            BlockKind::File | BlockKind::OldService | BlockKind::NewService => {
                file_header(cx, self.kind == BlockKind::File)?;
            }
            BlockKind::Comment => {
                cx.add_uint_with("total_size", 16, Render::FileSize)?;
                cx.add_uint_with("uncompressed_size", 16, Render::FileSize)?;
                cx.add_uint("required_version", 8)?;
                cx.add_uint("packing_method", 8)?;
                cx.add_hex("comment_crc16", 16)?;
            }
            BlockKind::AuthInfo => {
                cx.add_uint_with("total_size", 16, Render::FileSize)?;
                cx.add_hex("version", 8)?;
                cx.add_hex("method", 8)?;
                cx.add_hex("av_version", 8)?;
                cx.add_hex("av_crc", 32)?;
            }
            BlockKind::Recovery => {
                cx.add_uint_with("total_size", 32, Render::FileSize)?;
                cx.add_hex("version", 8)?;
                cx.add_uint("rec_sectors", 16)?;
                cx.add_uint("total_blocks", 32)?;
                cx.add_raw("mark", 8)?;
            }
            BlockKind::Signature => {
                add_dos_time(cx, "creation_time")?;
                cx.add_uint_with("arc_name_size", 16, Render::FileSize)?;
                cx.add_uint_with("user_name_size", 16, Render::FileSize)?;
            }
            BlockKind::Marker | BlockKind::ArchiveEnd | BlockKind::Unknown(_) => {}
        }
        Ok(())
    }

    /// Header size plus whatever follows the header, in bytes
    fn total_size(&self, cx: &mut Builder<'_>) -> Result<u64> {
        let header = cx.uint("block_size")?;
        let extra = if self.kind.has_packed_data() {
            packed_size(cx)?
        } else {
            self.added_size(cx)?
        };
        header
            .checked_add(extra)
            .ok_or_else(|| Error::structure(cx.name(), "block size overflows"))
    }

    fn added_size(&self, cx: &mut Builder<'_>) -> Result<u64> {
        if cx.contains("added_size")? {
            cx.uint("added_size")
        } else if self.kind == BlockKind::Recovery && cx.flag_or_false("flags/has_added_size")? {
            cx.uint("total_size")
        } else {
            Ok(0)
        }
    }

    fn rest(&mut self, cx: &mut Builder<'_>) -> Result<()> {
        let header = cx.uint("block_size")? * 8;
        if header > cx.offset() {
            cx.add_raw("unknown", (header - cx.offset()) / 8)?;
        }

        match self.kind {
            kind if kind.has_packed_data() => {
                let packed = packed_size(cx)?;
                cx.add_raw("compressed_data", packed)?;
            }
            BlockKind::Comment | BlockKind::AuthInfo => {
                let total = cx.uint("total_size")?;
                let name = if self.kind == BlockKind::Comment {
                    "comment_data"
                } else {
                    "av_info_data"
                };
                cx.add_raw(name, total.saturating_sub(cx.offset() / 8))?;
            }
            _ => {}
        }
        if let Some(left) = cx.remaining() {
            cx.add_raw("body", left / 8)?;
        }
        Ok(())
    }
}

impl Grammar for Block {
    fn step(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
        match self.stage {
            Stage::Head => {
                self.head(cx)?;
                self.stage = Stage::Header;
                Ok(Step::Continue)
            }
            Stage::Header => {
                self.header(cx)?;
                let bits = self
                    .total_size(cx)?
                    .checked_mul(8)
                    .ok_or_else(|| Error::structure(cx.name(), "block size overflows"))?;
                cx.set_size(bits)?;
                if self.kind == BlockKind::File {
                    let name = if cx.contains("filename")? {
                        cx.value("filename")?.as_str().unwrap_or_default().to_owned()
                    } else {
                        String::new()
                    };
                    let packed = packed_size(cx)?;
                    cx.describe(format!("File entry: {name} ({})", human_size(packed)));
                }
                self.stage = Stage::Rest;
                Ok(Step::Continue)
            }
            Stage::Rest => {
                self.rest(cx)?;
                Ok(Step::Done)
            }
        }
    }
}

/// `compressed_size` widened by the high dword stored in `large_size`
fn packed_size(cx: &mut Builder<'_>) -> Result<u64> {
    let mut packed = cx.uint("compressed_size")?;
    if cx.flag_or_false("flags/is_large")? {
        packed |= (cx.uint("large_size")? & 0xFFFF_FFFF) << 32;
    }
    Ok(packed)
}

fn file_header(cx: &mut Builder<'_>, is_file: bool) -> Result<()> {
    cx.add_uint_with("compressed_size", 32, Render::FileSize)?;
    cx.add_uint_with("uncompressed_size", 32, Render::FileSize)?;
    let host_os = cx.add_enum("host_os", 8, OS_NAMES)?;
    cx.add_hex("crc32", 32)?;
    add_dos_time(cx, "ftime")?;
    cx.add_uint_with("version", 8, Render::Version)?;
    cx.add_enum("method", 8, COMPRESSION_NAMES)?;
    let name_len = cx.add_uint("filename_length", 16)?;
    if host_os == OS_MSDOS || host_os == OS_WIN32 {
        let attributes = cx.child("file_attr", DosAttributes).with_size(32);
        cx.add_set(attributes)?;
    } else {
        cx.add_hex("file_attr", 32)?;
    }
    if cx.flag_or_false("flags/is_large")? {
        cx.add_uint_with("large_size", 64, Render::FileSize)?;
    }
    if name_len > 0 {
        let unicode = cx.flag_or_false("flags/is_unicode")?;
        add_filename(cx, name_len, unicode)?;
    }
    if is_file {
        if cx.flag_or_false("flags/has_salt")? {
            cx.add_raw("salt", 8)?;
        }
        if cx.flag_or_false("flags/has_ext_time")? {
            let times = cx.child("extra_time", ExtTime);
            cx.add_set(times)?;
        }
    }
    Ok(())
}

/// Unicode names store a plain name, a NUL and an encoded wide name; only the plain part
/// is decoded then
fn add_filename(cx: &mut Builder<'_>, len: u64, unicode: bool) -> Result<()> {
    let bytes = cx.peek_bytes(len)?;
    let name = match (unicode, bytes.iter().position(|&b| b == 0)) {
        (true, Some(nul)) => Charset::Latin9.decode(&bytes[..nul]),
        (true, None) => Charset::Utf8.decode(bytes),
        (false, _) => Charset::Latin9.decode(bytes),
    };
    let field = Field::new(
        cx.stream().clone(),
        "filename",
        cx.address(),
        len * 8,
        FieldType::String,
        Value::Text(name),
    );
    cx.add_field(field)
}

/// Produce a 32-bit MS-DOS timestamp; values that are not a valid date stay integers
pub(crate) fn add_dos_time(cx: &mut Builder<'_>, name: &str) -> Result<Option<NaiveDateTime>> {
    let raw = cx.peek(32)?;
    let timestamp = dos_datetime(raw as u32);
    let field = match timestamp {
        Some(ts) => Field::new(
            cx.stream().clone(),
            name,
            cx.address(),
            32,
            FieldType::Timestamp,
            Value::Timestamp(ts),
        ),
        None => Field::new(
            cx.stream().clone(),
            name,
            cx.address(),
            32,
            FieldType::Timestamp,
            Value::UInt(raw),
        )
        .with_display(format!("invalid MS-DOS timestamp {raw:#010x}")),
    };
    cx.add_field(field)?;
    Ok(timestamp)
}

/// Whether the stored `crc16` matches the low half of the CRC-32 of the header
///
/// The marker block carries a fixed value instead of a checksum.
pub fn crc_matches(block: &mut FieldSet) -> Result<bool> {
    let stored = block.uint("crc16")?;
    if BlockKind::from(block.uint("block_type")? as u8) == BlockKind::Marker {
        return Ok(stored == u64::from(MARKER_CRC));
    }
    let header = block.uint("block_size")?;
    let bytes = block
        .stream()
        .read_bytes(block.address() / 8 + 2, header.saturating_sub(2))?;
    Ok(u64::from(CRC32.checksum(bytes) & 0xFFFF) == stored)
}

struct ArchiveFlags;

impl Grammar for ArchiveFlags {
    fn step(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
        cx.add_bit("vol")?;
        cx.add_bit("has_comment")?;
        cx.add_bit("is_locked")?;
        cx.add_bit("is_solid")?;
        cx.add_bit("new_numbering")?;
        cx.add_bit("has_auth_information")?;
        cx.add_bit("has_recovery_record")?;
        cx.add_bit("is_encrypted")?;
        cx.add_bit("is_first_vol")?;
        cx.add_bits("internal", 7)?;
        Ok(Step::Done)
    }
}

struct FileFlags;

impl Grammar for FileFlags {
    fn step(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
        cx.add_bit("continued_from")?;
        cx.add_bit("continued_in")?;
        cx.add_bit("is_encrypted")?;
        cx.add_bit("has_comment")?;
        cx.add_bit("is_solid")?;
        let dictionary = cx.peek(3)?;
        let field = Field::new(
            cx.stream().clone(),
            "dictionary_size",
            cx.address(),
            3,
            FieldType::Enum,
            Value::UInt(dictionary),
        );
        let display = Render::Names(DICTIONARY_NAMES).apply(dictionary, 3);
        cx.add_field(match display {
            Some(display) => field.with_display(display),
            None => field,
        })?;
        cx.add_bit("is_large")?;
        cx.add_bit("is_unicode")?;
        cx.add_bit("has_salt")?;
        cx.add_bit("uses_file_version")?;
        cx.add_bit("has_ext_time")?;
        cx.add_bits("reserved", 2)?;
        cx.add_bit("has_ext_flags")?;
        Ok(Step::Done)
    }
}

struct EndFlags;

impl Grammar for EndFlags {
    fn step(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
        cx.add_bit("has_next_vol")?;
        cx.add_bit("has_data_crc")?;
        cx.add_bit("rev_space")?;
        cx.add_bit("has_vol_number")?;
        cx.add_bits("unused[]", 10)?;
        cx.add_bit("is_ignorable")?;
        cx.add_bit("has_added_size")?;
        Ok(Step::Done)
    }
}

struct BlockFlags;

impl Grammar for BlockFlags {
    fn step(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
        cx.add_bits("unused[]", 14)?;
        cx.add_bit("is_ignorable")?;
        cx.add_bit("has_added_size")?;
        Ok(Step::Done)
    }
}

/// MS-DOS file attributes
struct DosAttributes;

const DOS_ATTRIBUTES: [&str; 15] = [
    "read_only",
    "hidden",
    "system",
    "volume",
    "directory",
    "archive",
    "device",
    "normal",
    "temporary",
    "sparse",
    "reparse_point",
    "compressed",
    "offline",
    "not_indexed",
    "encrypted",
];

impl Grammar for DosAttributes {
    fn step(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
        let raw = cx.peek(32)?;
        let mut set = Vec::new();
        for name in DOS_ATTRIBUTES {
            if cx.add_bit(name)? {
                set.push(name);
            }
        }
        cx.add_bits("reserved", 17)?;
        cx.set_value(Value::UInt(raw));
        if !set.is_empty() {
            cx.describe(set.join(", "));
        }
        Ok(Step::Done)
    }
}

/// Extended modification, creation, access and archive times
struct ExtTime;

impl Grammar for ExtTime {
    fn step(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
        let flags = cx.add_hex("time_flags", 16)?;
        for index in 0..4 {
            let rmode = flags >> ((3 - index) * 4);
            if rmode & 8 == 0 {
                continue;
            }
            // the modification time lives in the header already
            if index > 0 {
                add_dos_time(cx, "dos_time[]")?;
            }
            if rmode & 3 > 0 {
                cx.add_raw("remainder[]", rmode & 3)?;
            }
        }
        Ok(Step::Done)
    }
}
