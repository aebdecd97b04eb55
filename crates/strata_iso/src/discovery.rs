//! Finding every directory record before any of them is parsed
//!
//! Directories may be recorded anywhere on the image, in any order, and can point back at each
//! other. The field tree only grows forward, so the records are located first by reading a few
//! bytes at computed offsets, then parsed in increasing offset order.

use binrw::BinRead;
use std::{
    collections::{BTreeMap, BTreeSet},
    io::Cursor,
};
use strata_core::BitStream;
use tracing::{debug, trace};

use crate::types::{FLAG_DIRECTORY, SECTOR};

/// The part of a directory record the pre-scan needs
#[derive(BinRead, Debug, Clone, Copy, PartialEq, Eq)]
#[br(little)]
pub struct RecordHead {
    pub length: u8,
    pub xa_length: u8,
    /// Sector of the extent; the big endian copy is skipped
    pub extent: u32,
    #[br(pad_before = 4)]
    pub size: u32,
    #[br(pad_before = 11)]
    pub flags: u8,
}

impl RecordHead {
    /// Bytes read for each record
    pub const SIZE: u64 = 26;

    pub fn is_directory(&self) -> bool {
        u64::from(self.flags) & FLAG_DIRECTORY != 0
    }
}

/// Where the directories and their records are
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// Byte offset of the root directory
    pub root: u64,
    /// Byte offset of each directory extent and its length; every directory is expanded once
    pub directories: BTreeMap<u64, u64>,
    /// Byte offset of every directory record found
    pub records: BTreeSet<u64>,
    /// Record offsets of each directory, keyed by the directory's byte offset, in directory order
    pub listing: BTreeMap<u64, Vec<u64>>,
    /// Problems met along the way; the walk goes on without the affected directory
    pub warnings: Vec<String>,
}

impl Discovery {
    /// Walk the tree below the root directory, `root_len` bytes at byte `root_offset`
    ///
    /// ```
    /// use strata_core::BitStream;
    /// use strata_iso::discovery::Discovery;
    ///
    /// // a directory that is nothing but sector padding
    /// let stream = BitStream::new(vec![0u8; 4096]);
    /// let found = Discovery::run(&stream, 2048, 2048, 8);
    /// assert_eq!(found.directories.len(), 1);
    /// assert!(found.records.is_empty());
    /// ```
    pub fn run(stream: &BitStream, root_offset: u64, root_len: u64, max_depth: usize) -> Self {
        let mut discovery = Self {
            root: root_offset,
            ..Self::default()
        };
        discovery.directories.insert(root_offset, root_len);
        discovery.walk(stream, root_offset, root_len, 0, max_depth);
        debug!(
            directories = discovery.directories.len(),
            records = discovery.records.len(),
            "directory tree discovered"
        );
        discovery
    }

    fn walk(&mut self, stream: &BitStream, start: u64, length: u64, depth: usize, max_depth: usize) {
        let mut offset = start;
        let mut read = 0;
        let mut listing = Vec::new();

        while read < length {
            let record_length = match stream.read_bytes(offset, 1) {
                Ok(bytes) => u64::from(bytes[0]),
                Err(err) => {
                    self.warnings
                        .push(format!("directory at byte {start} is cut short: {err}"));
                    break;
                }
            };
            if record_length == 0 {
                // nothing else fits in this sector
                let skip = SECTOR - offset % SECTOR;
                trace!(offset, skip, "skipping to the next sector");
                offset += skip;
                read += skip;
                continue;
            }

            let head = match stream
                .read_bytes(offset, RecordHead::SIZE)
                .map_err(|err| err.to_string())
                .and_then(|bytes| {
                    RecordHead::read(&mut Cursor::new(bytes)).map_err(|err| err.to_string())
                }) {
                Ok(head) => head,
                Err(err) => {
                    self.warnings
                        .push(format!("record at byte {offset} cannot be read: {err}"));
                    break;
                }
            };

            self.records.insert(offset);
            listing.push(offset);

            if head.is_directory() {
                let target = u64::from(head.extent) * SECTOR;
                let size = u64::from(head.size);
                if !self.directories.contains_key(&target) {
                    if depth >= max_depth {
                        self.warnings.push(format!(
                            "directory at byte {target} is deeper than {max_depth} levels"
                        ));
                    } else if target.saturating_add(size) > stream.len_bytes() {
                        self.warnings.push(format!(
                            "directory at byte {target} ends past the end of the image"
                        ));
                    } else {
                        self.directories.insert(target, size);
                        self.walk(stream, target, size, depth + 1, max_depth);
                    }
                }
            }

            offset += record_length;
            read += record_length;
        }

        self.listing.insert(start, listing);
    }
}
