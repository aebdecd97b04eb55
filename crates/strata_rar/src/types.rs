//! Constants, name tables and fixed-size records of the RAR block format

use binrw::{BinRead, BinWrite};
use chrono::{NaiveDate, NaiveDateTime};

/// Marker block of RAR 1.5 to 4.x archives; doubles as the file signature
pub const MARKER: [u8; 7] = *b"Rar!\x1a\x07\x00";

/// Common prefix of every `Rar!` signature
pub const SIGNATURE_PREFIX: [u8; 6] = *b"Rar!\x1a\x07";

/// Signature of RAR 1.4 archives
pub const SIGNATURE_14: [u8; 4] = *b"RE~^";

/// A complete archive end block as written by RAR 3.x and later
pub const END_OF_ARCHIVE: [u8; 7] = [0xC4, 0x3D, 0x7B, 0x00, 0x40, 0x07, 0x00];

/// Stored `crc16` of the marker block
pub const MARKER_CRC: u16 = 0x6152;

/// Host OS values whose file attributes follow the MS-DOS layout
pub const OS_MSDOS: u64 = 0;
pub const OS_WIN32: u64 = 2;

/// The head shared by every block
///
/// ```
/// use binrw::BinRead;
/// use strata_rar::types::{BlockHead, MARKER};
///
/// let head = BlockHead::read(&mut std::io::Cursor::new(MARKER))?;
/// assert_eq!(head.block_type, 0x72);
/// assert_eq!(head.block_size, 7);
/// # Ok::<(), binrw::Error>(())
/// ```
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[brw(little)]
pub struct BlockHead {
    pub crc16: u16,
    pub block_type: u8,
    pub flags: u16,
    pub block_size: u16,
}

/// Format generation, told apart by the signature
#[derive(Debug, Copy, Clone, PartialEq, Eq, derive_more::Display)]
pub enum RarVariant {
    #[display("RAR 1.4")]
    Rar14,
    #[display("RAR 1.5")]
    Rar15,
    #[display("RAR 5.0")]
    Rar50,
    #[display("RAR (future version)")]
    Future,
}

impl RarVariant {
    /// Variant whose signature starts `bytes`
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&SIGNATURE_14) {
            return Some(Self::Rar14);
        }
        if !bytes.starts_with(&SIGNATURE_PREFIX) {
            return None;
        }
        match bytes.get(SIGNATURE_PREFIX.len()) {
            Some(0x00) => Some(Self::Rar15),
            Some(0x01) => Some(Self::Rar50),
            Some(0x02) => Some(Self::Future),
            _ => None,
        }
    }

    /// Length of the signature in bytes
    pub fn signature_len(self) -> u64 {
        match self {
            Self::Rar14 => 4,
            Self::Rar15 | Self::Future => 7,
            Self::Rar50 => 8,
        }
    }
}

/// Block types of the 1.5 format
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Marker,
    ArchiveMain,
    File,
    Comment,
    AuthInfo,
    OldService,
    Recovery,
    Signature,
    NewService,
    ArchiveEnd,
    Unknown(u8),
}

impl From<u8> for BlockKind {
    fn from(tag: u8) -> Self {
        match tag {
            0x72 => Self::Marker,
            0x73 => Self::ArchiveMain,
            0x74 => Self::File,
            0x75 => Self::Comment,
            0x76 => Self::AuthInfo,
            0x77 => Self::OldService,
            0x78 => Self::Recovery,
            0x79 => Self::Signature,
            0x7A => Self::NewService,
            0x7B => Self::ArchiveEnd,
            other => Self::Unknown(other),
        }
    }
}

impl BlockKind {
    /// Name given to the block set
    pub fn field_name(self) -> &'static str {
        match self {
            Self::Marker => "marker",
            Self::ArchiveMain => "archive_start",
            Self::File => "file[]",
            Self::Comment => "comment[]",
            Self::AuthInfo => "av_info[]",
            Self::OldService => "sub_block[]",
            Self::Recovery => "recovery[]",
            Self::Signature => "signature",
            Self::NewService => "new_sub_block[]",
            Self::ArchiveEnd => "archive_end",
            Self::Unknown(_) => "block[]",
        }
    }

    /// Whether the header carries the file layout and is followed by packed data
    pub fn has_packed_data(self) -> bool {
        matches!(self, Self::File | Self::OldService | Self::NewService)
    }

    /// Short description of the block
    pub fn label(self) -> &'static str {
        match self {
            Self::Marker => "Archive marker",
            Self::ArchiveMain => "Archive main header",
            Self::File => "File entry",
            Self::Comment => "Comment",
            Self::AuthInfo => "Authenticity information",
            Self::OldService => "Service block",
            Self::Recovery => "Recovery record",
            Self::Signature => "Archive signature",
            Self::NewService => "Service block",
            Self::ArchiveEnd => "End of archive",
            Self::Unknown(_) => "Unknown block",
        }
    }
}

pub const BLOCK_NAMES: &[(u64, &str)] = &[
    (0x72, "Marker"),
    (0x73, "Archive header"),
    (0x74, "File header"),
    (0x75, "Comment header"),
    (0x76, "Extra info"),
    (0x77, "Subblock"),
    (0x78, "Recovery record"),
    (0x79, "Archive authenticity"),
    (0x7A, "New-format subblock"),
    (0x7B, "Archive end"),
];

pub const COMPRESSION_NAMES: &[(u64, &str)] = &[
    (0x30, "Storing"),
    (0x31, "Fastest compression"),
    (0x32, "Fast compression"),
    (0x33, "Normal compression"),
    (0x34, "Good compression"),
    (0x35, "Best compression"),
];

pub const OS_NAMES: &[(u64, &str)] = &[
    (0, "MS DOS"),
    (1, "OS/2"),
    (2, "Win32"),
    (3, "Unix"),
    (4, "Mac OS"),
    (5, "BeOS"),
];

/// Dictionary size of a file entry; 7 marks a directory
pub const DICTIONARY_NAMES: &[(u64, &str)] = &[
    (0, "Dictionary size 64 KiB"),
    (1, "Dictionary size 128 KiB"),
    (2, "Dictionary size 256 KiB"),
    (3, "Dictionary size 512 KiB"),
    (4, "Dictionary size 1 MiB"),
    (5, "Dictionary size 2 MiB"),
    (6, "Dictionary size 4 MiB"),
    (7, "File is a directory"),
];

/// `dictionary_size` value of directory entries
pub const DICTIONARY_DIRECTORY: u64 = 7;

/// Decode a packed MS-DOS date and time, date in the high word
///
/// ```
/// use strata_rar::types::dos_datetime;
///
/// let ts = dos_datetime(0x586F_63D6).unwrap();
/// assert_eq!(ts.to_string(), "2024-03-15 12:30:44");
/// assert!(dos_datetime(0).is_none());
/// ```
pub fn dos_datetime(raw: u32) -> Option<NaiveDateTime> {
    let date = raw >> 16;
    let time = raw & 0xFFFF;
    NaiveDate::from_ymd_opt(1980 + (date >> 9) as i32, (date >> 5) & 0xF, date & 0x1F)?
        .and_hms_opt(time >> 11, (time >> 5) & 0x3F, (time & 0x1F) * 2)
}
