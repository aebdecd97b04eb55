//! This library lays out **ISO 9660** images, with the Joliet and Rock Ridge extensions, as a
//! lazy field tree.
//!
//! # Image Format
//!
//! An image is a sequence of 2048-byte sectors. The first 16 form the system area and are not
//! interpreted. The volume descriptors follow, one per sector, until a set terminator.
//!
//! ## Volume Descriptor
//!
//! | Offset (bytes) | Field      | Description                                          |
//! |----------------|------------|------------------------------------------------------|
//! | 0x0000         | Type       | 1 byte: 0 boot, 1 primary, 2 supplementary, 3 partition, 255 terminator |
//! | 0x0001         | Identifier | 5 bytes: always `CD001`                              |
//! | 0x0006         | Version    | 1 byte                                               |
//! | 0x0007         | Content    | 2041 bytes, by type                                  |
//!
//! Most integers of a descriptor are recorded twice, little endian then big endian. The little
//! endian half is decoded; a big endian half that disagrees is reported as a warning.
//!
//! A supplementary descriptor whose escape sequences read `%/@`, `%/C` or `%/E` is a Joliet
//! descriptor; its identifiers are UCS-2, big endian.
//!
//! ## Directory Record
//!
//! | Offset (bytes) | Field           | Description                                     |
//! |----------------|-----------------|-------------------------------------------------|
//! | 0x0000         | Length          | 1 byte: size of the record; 0 pads to the next sector |
//! | 0x0001         | XA length       | 1 byte: size of the extended attribute record   |
//! | 0x0002         | Extent          | 4+4 bytes: first sector of the file             |
//! | 0x000A         | Size            | 4+4 bytes: size of the file in bytes            |
//! | 0x0012         | Recording time  | 7 bytes: year since 1900, month, day, hour, minute, second, GMT offset |
//! | 0x0019         | Flags           | 1 byte: `0x02` marks directories                |
//! | 0x001A         | Unit size       | 1 byte                                          |
//! | 0x001B         | Interleave gap  | 1 byte                                          |
//! | 0x001C         | Volume sequence | 2+2 bytes                                       |
//! | 0x0020         | Name length     | 1 byte: 1 for the `.` and `..` records          |
//! | 0x0021         | Name            | `NAME.EXT;1`, padded to an even offset          |
//!
//! The rest of the record holds System Use Sharing Protocol entries: a two letter signature,
//! a length and a version, then a body. Rock Ridge stores its POSIX attributes (`PX`), alternate
//! names (`NM`), symbolic links (`SL`) and timestamps (`TF`) there.
//!
//! Directory extents can be stored anywhere on the image. They are located with a pre-scan
//! (see [`discovery`]) and their records are parsed in increasing offset order as
//! `records[0]`, `records[1]`, ...
//!
//! # Usage
//!
//! ```no_run
//! use strata_core::BitStream;
//! use strata_iso::IsoImage;
//!
//! let stream = BitStream::from_reader(std::fs::File::open("disc.iso")?)?;
//! let mut image = IsoImage::new(stream)?;
//! println!("{}", image.volume_info()?.volume_id);
//! for entry in image.entries()? {
//!     println!("{} {}", entry.size, entry.path);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use strata_core::{FormatDescriptor, Magic};

pub mod discovery;
pub mod error;
pub mod read;
pub mod record;
pub mod types;
pub mod volume;

pub use discovery::Discovery;
pub use error::{Error, Result};
pub use read::{Iso9660, IsoEntry, IsoImage, VolumeInfo};
pub use types::JolietLevel;

/// Registry entry for ISO 9660 images
pub const FORMAT: FormatDescriptor = FormatDescriptor {
    id: "iso9660",
    category: "file_system",
    description: "ISO 9660 file system",
    extensions: &["iso", "img", "bin"],
    mime: &["application/x-iso9660-image"],
    magic: &[Magic {
        pattern: types::MAGIC,
        bit_offset: types::SYSTEM_AREA * 8,
    }],
    min_size_bits: (types::SYSTEM_AREA + 6) * 8,
    validate: read::validate,
    parse: read::parse_root,
};
