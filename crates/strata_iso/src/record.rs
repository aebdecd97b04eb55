//! Directory records and the System Use Sharing Protocol entries that follow their names

use strata_core::{Builder, Charset, Error, Grammar, Result, Step, Value};

use crate::types::{add_both_endian, add_long_timestamp, DirTime};

/// Bytes of a directory record before its name
pub const RECORD_FIXED_SIZE: u64 = 33;

/// A directory record: where an extent lives, how large it is, its flags and its name
///
/// The fixed part is produced on the first pull together with the declared size; the system use
/// entries after the name come one per pull.
#[derive(Debug, Default)]
pub struct DirRecord {
    header_done: bool,
}

impl DirRecord {
    pub fn new() -> Self {
        Self::default()
    }

    fn header(cx: &mut Builder<'_>) -> Result<()> {
        let length = cx.add_uint("rec_length", 8)?;
        if length == 0 {
            return Err(Error::structure(cx.name(), "directory record of length 0"));
        }
        cx.set_size(length * 8)?;
        cx.add_uint("xa_length", 8)?;
        add_both_endian(cx, "extent_loc", 32)?;
        add_both_endian(cx, "size", 32)?;
        let time = cx.child("recording_time", DirTime).with_size(7 * 8);
        cx.add_set(time)?;
        let flags = cx.child("file_flags", FileFlags).with_size(8);
        cx.add_set(flags)?;
        cx.add_uint("file_unit_size", 8)?;
        cx.add_uint("interleave_gap", 8)?;
        add_both_endian(cx, "volume_sequence_number", 16)?;

        let name_length = cx.add_uint("name_length", 8)?;
        if name_length == 1 {
            // `\0` for the directory itself, `\1` for its parent
            cx.add_padding("unused[]", 1)?;
        } else {
            cx.add_string("filename", name_length, Charset::Ascii)?;
        }
        if name_length % 2 == 0 {
            cx.add_padding("unused[]", 1)?;
        }
        Ok(())
    }
}

impl Grammar for DirRecord {
    fn step(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
        if !self.header_done {
            self.header_done = true;
            Self::header(cx)?;
            return Ok(Step::Continue);
        }

        let Some(remaining) = cx.remaining().filter(|bits| *bits > 0) else {
            return Ok(Step::Done);
        };
        if cx.peek_bytes(1)?[0].is_ascii_uppercase() {
            let entry = cx.child("system_use_entry[]", SystemUseEntry);
            cx.add_set(entry)?;
            Ok(Step::Continue)
        } else {
            cx.add_padding("unused[]", remaining / 8)?;
            Ok(Step::Done)
        }
    }
}

/// `file_flags` of a directory record
pub struct FileFlags;

impl Grammar for FileFlags {
    fn step(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
        let raw = cx.peek(8)?;
        cx.add_bit("hidden")?;
        cx.add_bit("directory")?;
        cx.add_bit("associated")?;
        cx.add_bit("record")?;
        cx.add_bit("protection")?;
        cx.add_bits("reserved", 2)?;
        cx.add_bit("multi_extent")?;
        cx.set_value(Value::UInt(raw));
        Ok(Step::Done)
    }
}

/// Two-letter signature of a system use entry
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SuspTag {
    /// Continuation area
    Ce,
    /// Padding
    Pd,
    /// Sharing protocol indicator
    Sp,
    /// Sharing protocol terminator
    St,
    /// Extensions reference
    Er,
    /// Extension selector
    Es,
    /// Rock Ridge extensions in use
    Rr,
    /// POSIX file attributes
    Px,
    /// POSIX device number
    Pn,
    /// Symbolic link
    Sl,
    /// Alternate name
    Nm,
    /// Child link
    Cl,
    /// Parent link
    Pl,
    /// Relocated directory
    Re,
    /// Time stamps
    Tf,
    /// Sparse file
    Sf,
    /// Known extension whose layout is not decoded: Apple, Amiga, zisofs, mkisofs XA
    Opaque,
    Unknown,
}

impl From<&str> for SuspTag {
    fn from(sig: &str) -> Self {
        match sig {
            "CE" => Self::Ce,
            "PD" => Self::Pd,
            "SP" => Self::Sp,
            "ST" => Self::St,
            "ER" => Self::Er,
            "ES" => Self::Es,
            "RR" => Self::Rr,
            "PX" => Self::Px,
            "PN" => Self::Pn,
            "SL" => Self::Sl,
            "NM" => Self::Nm,
            "CL" => Self::Cl,
            "PL" => Self::Pl,
            "RE" => Self::Re,
            "TF" => Self::Tf,
            "SF" => Self::Sf,
            "AA" | "AB" | "AS" | "ZF" | "XA" => Self::Opaque,
            _ => Self::Unknown,
        }
    }
}

/// `flags` bit of an `NM` entry whose name continues in the next `NM` entry
pub const NM_CONTINUE: u64 = 0x01;

/// `flags` bit of a `TF` entry recorded with 17-byte timestamps
pub const TF_LONG_FORM: u64 = 0x80;

/// Names of the `TF` timestamps, in the order of their flag bits
pub const TF_TIMESTAMPS: [&str; 7] = [
    "creation",
    "modify",
    "access",
    "attributes",
    "backup",
    "expiration",
    "effective",
];

/// One SUSP or Rock Ridge entry: signature, length, version and a tag specific body
pub struct SystemUseEntry;

impl Grammar for SystemUseEntry {
    fn step(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
        let sig = cx.add_string("sig", 2, Charset::Ascii)?;
        let length = cx.add_uint("len_sue", 8)?;
        cx.add_uint("version", 8)?;
        cx.set_size(length * 8)?;
        cx.describe(format!("System use entry {sig}"));
        let body = length.saturating_sub(4);

        match SuspTag::from(sig.as_str()) {
            SuspTag::Ce => {
                add_both_endian(cx, "block_location", 32)?;
                add_both_endian(cx, "offset", 32)?;
                add_both_endian(cx, "length_cont_area", 32)?;
            }
            SuspTag::Pd => cx.add_padding("padding[]", body)?,
            SuspTag::Sp => {
                cx.add_raw("check_bytes", 2)?;
                cx.add_uint("len_skp", 8)?;
            }
            SuspTag::St | SuspTag::Re => {}
            SuspTag::Er => {
                let len_id = cx.add_uint("len_id", 8)?;
                let len_des = cx.add_uint("len_des", 8)?;
                let len_src = cx.add_uint("len_src", 8)?;
                cx.add_uint("ext_ver", 8)?;
                cx.add_string("ext_id", len_id, Charset::Ascii)?;
                if len_des > 0 {
                    cx.add_string("ext_des", len_des, Charset::Ascii)?;
                }
                cx.add_string("ext_src", len_src, Charset::Ascii)?;
            }
            SuspTag::Es => {
                cx.add_uint("ext_seq", 8)?;
            }
            SuspTag::Rr => cx.add_raw("flags", 1)?,
            SuspTag::Px => {
                add_both_endian(cx, "file_mode", 32)?;
                add_both_endian(cx, "links", 32)?;
                add_both_endian(cx, "uid", 32)?;
                add_both_endian(cx, "gid", 32)?;
                if length > 36 {
                    add_both_endian(cx, "serial", 32)?;
                }
            }
            SuspTag::Pn => {
                add_both_endian(cx, "dev_t_high", 32)?;
                add_both_endian(cx, "dev_t_low", 32)?;
            }
            SuspTag::Sl => {
                cx.add_hex("flags", 8)?;
                while !cx.eof() {
                    let component = cx.child("component[]", ComponentRecord);
                    cx.add_set(component)?;
                }
            }
            SuspTag::Nm => {
                cx.add_hex("flags", 8)?;
                let len = body.saturating_sub(1);
                if len > 0 {
                    let name = cx.add_string("name_content", len, Charset::Utf8)?;
                    cx.set_value(Value::Text(name));
                }
            }
            SuspTag::Cl => {
                add_both_endian(cx, "child_loc", 32)?;
            }
            SuspTag::Pl => {
                add_both_endian(cx, "parent_loc", 32)?;
            }
            SuspTag::Tf => {
                let flags = cx.add_hex("flags", 8)?;
                while !cx.eof() {
                    if flags & TF_LONG_FORM != 0 {
                        add_long_timestamp(cx, "timestamp[]")?;
                    } else {
                        let timestamp = cx.child("timestamp[]", DirTime).with_size(7 * 8);
                        cx.add_set(timestamp)?;
                    }
                }
            }
            SuspTag::Sf => {
                add_both_endian(cx, "size_high", 32)?;
                add_both_endian(cx, "size_low", 32)?;
                cx.add_uint("table_depth", 8)?;
            }
            SuspTag::Opaque | SuspTag::Unknown => {
                cx.warn(format!("system use entry {sig} is not implemented"));
                cx.add_raw("unknown", body)?;
            }
        }
        Ok(Step::Done)
    }
}

/// One path component of an `SL` entry
pub struct ComponentRecord;

impl Grammar for ComponentRecord {
    fn step(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
        cx.add_hex("component_flags", 8)?;
        let len = cx.add_uint("component_len", 8)?;
        if len > 0 {
            let content = cx.add_string("component_content", len, Charset::Utf8)?;
            cx.set_value(Value::Text(content));
        }
        Ok(Step::Done)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use strata_core::{BitStream, FieldSet};

    fn record(bytes: Vec<u8>) -> FieldSet {
        FieldSet::root(BitStream::new(bytes), DirRecord::new())
    }

    fn head(length: u8, name: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0; RECORD_FIXED_SIZE as usize];
        bytes[0] = length;
        bytes[32] = name.len() as u8;
        bytes.extend_from_slice(name);
        bytes
    }

    #[test]
    fn self_reference_has_no_filename() -> Result<()> {
        let mut root = record(head(34, b"\0"));
        root.materialize_all()?;
        assert!(!root.contains("filename")?);
        assert_eq!(root.find("unused[0]").and_then(|n| n.size()), Some(8));
        assert_eq!(root.size(), Some(34 * 8));
        Ok(())
    }

    #[test]
    fn even_names_are_padded() -> Result<()> {
        let mut bytes = head(48, b"ABCDEFGHIJKL");
        bytes.push(0);
        bytes.extend_from_slice(&[0; 2]);
        let mut root = record(bytes);
        root.materialize_all()?;
        assert_eq!(root.text("filename")?, "ABCDEFGHIJKL");
        assert_eq!(root.find("unused[0]").and_then(|n| n.size()), Some(8));
        // two trailing bytes that are not an entry
        assert_eq!(root.find("unused[1]").and_then(|n| n.size()), Some(16));
        Ok(())
    }

    #[test]
    fn zero_length_is_rejected() {
        let mut root = record(head(0, b"A"));
        assert!(matches!(
            root.materialize(),
            Err(Error::Structure { .. })
        ));
    }

    #[test]
    fn symbolic_link_components() -> Result<()> {
        let mut bytes = head(0, b"L");
        bytes.extend_from_slice(b"SL\x0f\x01\x00");
        bytes.extend_from_slice(b"\x00\x03usr\x00\x03bin");
        bytes[0] = bytes.len() as u8;
        let mut root = record(bytes);
        root.materialize_all()?;

        let entry = root.set("system_use_entry[0]")?.unwrap();
        assert_eq!(entry.text("component[0]/component_content")?, "usr");
        assert_eq!(entry.text("component[1]/component_content")?, "bin");
        assert!(entry.warnings().is_empty());
        Ok(())
    }

    #[test]
    fn susp_tags() {
        assert_eq!(SuspTag::from("NM"), SuspTag::Nm);
        assert_eq!(SuspTag::from("ZF"), SuspTag::Opaque);
        assert_eq!(SuspTag::from("QQ"), SuspTag::Unknown);
    }
}
