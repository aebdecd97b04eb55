//! This library walks the blocks of **RAR** archives, from version 1.5 to 4.x, into a lazy
//! field tree.
//!
//! # Archive Format
//!
//! An archive is a sequence of blocks. The 7-byte signature `Rar!\x1A\x07\x00` is itself the
//! first block, the marker. RAR 1.4 (`RE~^`) and RAR 5.0 (`Rar!\x1A\x07\x01\x00`) archives are
//! recognized but not modeled.
//!
//! ## Block Head
//!
//! Every block starts with the same 7 bytes, little endian:
//!
//! | Offset (bytes) | Field      | Description                                              |
//! |----------------|------------|----------------------------------------------------------|
//! | 0x0000         | CRC16      | 2 bytes: low half of the CRC-32 of the header after this |
//! | 0x0002         | Type       | 1 byte: block type                                       |
//! | 0x0003         | Flags      | 2 bytes: common and type specific flags                  |
//! | 0x0005         | Size       | 2 bytes: size of the header, head included               |
//!
//! - **Flags**: `0x8000` means a 4-byte `added_size` follows the head and that many bytes follow
//!   the header. `0x4000` means a reader that does not know the block may skip it. File and
//!   service blocks give `0x8000` another meaning; their data size lives in the header instead.
//!
//! ## Block Types
//!
//! | Type   | Name in tree       | Content                                         |
//! |--------|--------------------|-------------------------------------------------|
//! | `0x72` | `marker`           | the signature                                   |
//! | `0x73` | `archive_start`    | archive flags: volume, solid, locked, ...       |
//! | `0x74` | `file[]`           | file header, then the packed file data          |
//! | `0x75` | `comment[]`        | old style archive comment                       |
//! | `0x76` | `av_info[]`        | old style authenticity information              |
//! | `0x77` | `sub_block[]`      | old style service block                         |
//! | `0x78` | `recovery[]`       | old style recovery record                       |
//! | `0x79` | `signature`        | archive authenticity signature                  |
//! | `0x7A` | `new_sub_block[]`  | service block in the file layout (`CMT`, `RR`)  |
//! | `0x7B` | `archive_end`      | end of archive                                  |
//! | other  | `block[]`          | unknown, kept as opaque bytes with a warning    |
//!
//! ## File Header
//!
//! | Offset (bytes) | Field             | Description                                        |
//! |----------------|-------------------|----------------------------------------------------|
//! | 0x0007         | Packed size       | 4 bytes: low dword of the packed data size         |
//! | 0x000B         | Unpacked size     | 4 bytes: low dword of the file size                |
//! | 0x000F         | Host OS           | 1 byte: 0 MS-DOS, 1 OS/2, 2 Win32, 3 Unix          |
//! | 0x0010         | File CRC          | 4 bytes: CRC-32 of the unpacked file               |
//! | 0x0014         | Time              | 4 bytes: MS-DOS date and time                      |
//! | 0x0018         | Version           | 1 byte: version needed to extract, `10 * major + minor` |
//! | 0x0019         | Method            | 1 byte: `0x30` store to `0x35` best                |
//! | 0x001A         | Name size         | 2 bytes                                            |
//! | 0x001C         | Attributes        | 4 bytes: host specific file attributes             |
//!
//! Large files (flag `0x0100`) follow with 8 bytes holding the high dwords of both sizes. Then
//! come the name, an optional 8-byte salt and optional extended times.
//!
//! # Usage
//!
//! ```
//! use strata_rar::RarArchive;
//!
//! // marker, then an archive main header with no flags
//! let bytes = b"Rar!\x1a\x07\x00\x00\x00\x73\x00\x00\x0d\x00\x00\x00\x00\x00\x00\x00".to_vec();
//! let mut archive = RarArchive::new(bytes.into())?;
//! assert_eq!(archive.blocks()?.len(), 2);
//! assert!(!archive.info()?.is_solid);
//! # Ok::<(), strata_rar::Error>(())
//! ```

use strata_core::{FormatDescriptor, Magic};

pub mod block;
pub mod error;
pub mod read;
pub mod types;

pub use block::{crc_matches, Block};
pub use error::{Error, Result};
pub use read::{content_size, ArchiveInfo, RarArchive, RarEntry, RarFile};
pub use types::RarVariant;

/// Registry entry for RAR archives
pub const FORMAT: FormatDescriptor = FormatDescriptor {
    id: "rar",
    category: "archive",
    description: "Roshal archive (RAR)",
    extensions: &["rar"],
    mime: &["application/x-rar-compressed"],
    magic: &[
        Magic {
            pattern: b"RE~^",
            bit_offset: 0,
        },
        Magic {
            pattern: b"Rar!\x1a\x07\x00",
            bit_offset: 0,
        },
        Magic {
            pattern: b"Rar!\x1a\x07\x01",
            bit_offset: 0,
        },
        Magic {
            pattern: b"Rar!\x1a\x07\x02",
            bit_offset: 0,
        },
    ],
    min_size_bits: 7 * 8,
    validate: read::validate,
    parse: read::parse_root,
};
