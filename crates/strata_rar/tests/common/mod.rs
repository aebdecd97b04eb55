#![allow(dead_code)]

use binrw::BinWrite;
use crc::{Crc, CRC_32_ISO_HDLC};
use std::io::{Cursor, Write};
use strata_core::{BitStream, FieldSet, Node};
use strata_rar::types::{BlockHead, MARKER};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// 2024-03-15 12:30:44
pub const DOS_TIME: u32 = 0x586F_63D6;

#[derive(BinWrite)]
#[bw(little)]
struct FileHead {
    compressed_size: u32,
    uncompressed_size: u32,
    host_os: u8,
    crc32: u32,
    ftime: u32,
    version: u8,
    method: u8,
    filename_length: u16,
    file_attr: u32,
}

/// Header fields of a file or service block
pub struct Entry<'a> {
    pub name: &'a [u8],
    pub data: &'a [u8],
    pub flags: u16,
    pub host_os: u8,
    pub uncompressed_size: u32,
    pub large_size: Option<u64>,
    /// Bytes written after the name: salt, extended times
    pub extra: &'a [u8],
}

impl Default for Entry<'_> {
    fn default() -> Self {
        Self {
            name: b"",
            data: b"",
            flags: 0x8000,
            host_os: 2,
            uncompressed_size: 0,
            large_size: None,
            extra: b"",
        }
    }
}

/// Builds archives block by block with valid header checksums
pub struct Fixture {
    bytes: Vec<u8>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_stub(b"")
    }

    pub fn with_stub(stub: &[u8]) -> Self {
        let mut bytes = stub.to_vec();
        bytes.extend_from_slice(&MARKER);
        Self { bytes }
    }

    pub fn main(self, flags: u16) -> Self {
        self.block(0x73, flags, &[0; 6], b"")
    }

    pub fn file(self, entry: Entry<'_>) -> Self {
        self.entry(0x74, entry)
    }

    pub fn service(self, name: &str) -> Self {
        self.entry(
            0x7A,
            Entry {
                name: name.as_bytes(),
                ..Default::default()
            },
        )
    }

    /// A 0x77 service block with the file header layout
    pub fn old_service(self, name: &str, data: &[u8]) -> Self {
        self.entry(
            0x77,
            Entry {
                name: name.as_bytes(),
                data,
                ..Default::default()
            },
        )
    }

        pub fn unknown(self, tag: u8, body: &[u8]) -> Self {
        let added = (body.len() as u32).to_le_bytes();
        self.block(tag, 0x8000, &added, body)
    }

    pub fn end(self) -> Self {
        self.block(0x7B, 0x4000, b"", b"")
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }

    pub fn stream(self) -> BitStream {
        BitStream::new(self.bytes)
    }

    fn entry(self, tag: u8, entry: Entry<'_>) -> Self {
        let head = FileHead {
            compressed_size: entry.data.len() as u32,
            uncompressed_size: entry.uncompressed_size,
            host_os: entry.host_os,
            crc32: CRC32.checksum(entry.data),
            ftime: DOS_TIME,
            version: 29,
            method: 0x30,
            filename_length: entry.name.len() as u16,
            file_attr: 0x20,
        };
        let mut header = Cursor::new(Vec::new());
        head.write(&mut header).unwrap();
        if let Some(large) = entry.large_size {
            header.write_all(&large.to_le_bytes()).unwrap();
        }
        header.write_all(entry.name).unwrap();
        header.write_all(entry.extra).unwrap();
        self.block(tag, entry.flags, &header.into_inner(), entry.data)
    }

    /// Any block: `header` follows `block_size` and counts towards it, `body` does not
    pub fn block(mut self, block_type: u8, flags: u16, header: &[u8], body: &[u8]) -> Self {
        let head = BlockHead {
            crc16: 0,
            block_type,
            flags,
            block_size: (7 + header.len()) as u16,
        };
        let mut block = Cursor::new(Vec::new());
        head.write(&mut block).unwrap();
        block.write_all(header).unwrap();
        let mut block = block.into_inner();
        let crc = CRC32.checksum(&block[2..]) as u16;
        block[..2].copy_from_slice(&crc.to_le_bytes());

        self.bytes.extend_from_slice(&block);
        self.bytes.extend_from_slice(body);
        self
    }
}

/// Bytes of the field at `path`
pub fn bytes_at(set: &mut FieldSet, path: &str) -> Vec<u8> {
    let field = set
        .field(path)
        .unwrap()
        .and_then(Node::as_field)
        .unwrap_or_else(|| panic!("no field at {path}"));
    field.bytes().unwrap().to_vec()
}

/// Children start where their predecessor ended and fill the set
pub fn assert_contiguous(set: &FieldSet) {
    let mut expected = set.address();
    for node in set.iter() {
        assert_eq!(node.address(), expected, "{} is misplaced", node.name());
        expected += node.size().unwrap_or_default();
    }
    assert_eq!(Some(expected - set.address()), set.size());
}
