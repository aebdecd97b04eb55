//! Volume descriptors: one sector each, starting right after the system area

use strata_core::{Builder, Charset, Error, Grammar, Result, Step};
use tracing::debug;

use crate::{
    record::DirRecord,
    types::{
        add_big_endian, add_both_endian, add_long_timestamp, JolietLevel, SECTOR, STANDARD_ID,
        VOLUME_BOOT_RECORD, VOLUME_NAMES, VOLUME_PARTITION, VOLUME_PRIMARY,
        VOLUME_SUPPLEMENTARY, VOLUME_TERMINATOR,
    },
};

/// Bytes of a descriptor after its type, identifier and version
const CONTENT_SIZE: u64 = SECTOR - 7;

/// A volume descriptor: type, standard identifier, version and the type specific content
pub struct Volume;

impl Grammar for Volume {
    fn step(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
        let kind = cx.add_enum("type", 8, VOLUME_NAMES)?;
        let id = cx.peek_bytes(5)?.to_vec();
        cx.add_raw("id", 5)?;
        if id != STANDARD_ID {
            return Err(Error::structure(
                cx.name(),
                "Invalid ISO 9660 volume signature",
            ));
        }
        cx.add_uint("version", 8)?;

        let content = match kind {
            VOLUME_BOOT_RECORD => cx.child("content", BootRecord),
            VOLUME_PRIMARY => cx.child("content", Descriptor::primary()),
            VOLUME_SUPPLEMENTARY => cx.child("content", Descriptor::supplementary()),
            VOLUME_PARTITION => cx.child("content", VolumePartition),
            VOLUME_TERMINATOR => cx.child("content", Terminator),
            _ => {
                cx.add_raw("raw_content", CONTENT_SIZE)?;
                return Ok(Step::Done);
            }
        };
        cx.add_set(content.with_size(CONTENT_SIZE * 8))?;
        Ok(Step::Done)
    }
}

/// Primary and supplementary volume descriptors share one layout
///
/// Supplementary descriptors announcing Joliet store their identifiers as UCS-2.
pub struct Descriptor {
    supplementary: bool,
}

impl Descriptor {
    pub fn primary() -> Self {
        Self {
            supplementary: false,
        }
    }

    pub fn supplementary() -> Self {
        Self {
            supplementary: true,
        }
    }
}

impl Grammar for Descriptor {
    fn type_name(&self) -> &'static str {
        if self.supplementary {
            "SupplementaryVolumeDescriptor"
        } else {
            "PrimaryVolumeDescriptor"
        }
    }

    fn step(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
        let joliet = if self.supplementary {
            // the escape sequences follow the identifiers, 81 bytes into the content
            let escape = cx.stream().read_bytes(cx.address() / 8 + 81, 3)?;
            JolietLevel::detect(escape)
        } else {
            None
        };
        let charset = match joliet {
            Some(level) => {
                debug!(%level, "supplementary descriptor");
                cx.describe(level.to_string());
                Charset::Utf16Be
            }
            None => Charset::Ascii,
        };

        if self.supplementary {
            cx.add_hex("flags", 8)?;
        } else {
            cx.add_padding("unused[]", 1)?;
        }
        cx.add_padded_string("system_id", 32, charset)?;
        cx.add_padded_string("volume_id", 32, charset)?;
        cx.add_padding("unused[]", 8)?;
        add_both_endian(cx, "volume_space_size", 32)?;
        if self.supplementary {
            cx.add_raw("escape_sequences", 32)?;
        } else {
            cx.add_padding("unused[]", 32)?;
        }
        add_both_endian(cx, "volume_set_size", 16)?;
        add_both_endian(cx, "volume_seq_number", 16)?;
        add_both_endian(cx, "logical_block_size", 16)?;
        add_both_endian(cx, "path_table_size", 32)?;
        cx.add_uint("type_l_path_table", 32)?;
        cx.add_uint("opt_type_l_path_table", 32)?;
        add_big_endian(cx, "type_m_path_table", 32)?;
        add_big_endian(cx, "opt_type_m_path_table", 32)?;

        let root = cx.child("root_directory_record", DirRecord::new());
        cx.add_set(root)?;

        cx.add_padded_string("vol_set_id", 128, charset)?;
        cx.add_padded_string("publisher", 128, charset)?;
        cx.add_padded_string("data_preparer", 128, charset)?;
        cx.add_padded_string("application", 128, charset)?;
        cx.add_padded_string("copyright", 37, charset)?;
        cx.add_padded_string("abstract", 37, charset)?;
        cx.add_padded_string("biographic", 37, charset)?;
        add_long_timestamp(cx, "creation_ts")?;
        add_long_timestamp(cx, "modification_ts")?;
        add_long_timestamp(cx, "expiration_ts")?;
        add_long_timestamp(cx, "effective_ts")?;
        cx.add_uint("struct_ver", 8)?;
        cx.add_padding("unused[]", 1)?;
        cx.add_raw("app_use", 512)?;
        cx.add_padding("unused[]", 653)?;
        Ok(Step::Done)
    }
}

pub struct BootRecord;

impl Grammar for BootRecord {
    fn step(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
        cx.add_padded_string("sys_id", 31, Charset::Ascii)?;
        cx.add_padded_string("boot_id", 31, Charset::Ascii)?;
        cx.add_raw("system_use", 1979)?;
        Ok(Step::Done)
    }
}

pub struct VolumePartition;

impl Grammar for VolumePartition {
    fn step(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
        cx.add_padding("unused[]", 1)?;
        cx.add_padded_string("system_id", 32, Charset::Ascii)?;
        cx.add_padded_string("volume_id", 32, Charset::Ascii)?;
        add_both_endian(cx, "volume_partition_location", 32)?;
        add_both_endian(cx, "volume_partition_size", 32)?;
        cx.add_padding("unused[]", 1960)?;
        Ok(Step::Done)
    }
}

pub struct Terminator;

impl Grammar for Terminator {
    fn step(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
        cx.add_padding("null", CONTENT_SIZE)?;
        Ok(Step::Done)
    }
}
