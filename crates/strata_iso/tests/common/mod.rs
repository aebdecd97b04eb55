#![allow(dead_code)]

use binrw::BinWrite;
use std::io::Cursor;
use strata_core::{BitStream, FieldSet};

pub const SECTOR: usize = 2048;

/// 2024-03-15 12:30:44, GMT
pub const RECORDED: [u8; 7] = [124, 3, 15, 12, 30, 44, 0];

/// 2023-01-02 03:04:05, GMT
pub const TOUCHED: [u8; 7] = [123, 1, 2, 3, 4, 5, 0];

#[derive(BinWrite)]
#[bw(little)]
struct RecordHead {
    length: u8,
    xa_length: u8,
    extent: u32,
    #[bw(big)]
    extent_mirror: u32,
    size: u32,
    #[bw(big)]
    size_mirror: u32,
    recorded: [u8; 7],
    flags: u8,
    unit_size: u8,
    interleave_gap: u8,
    sequence: u16,
    #[bw(big)]
    sequence_mirror: u16,
    name_length: u8,
}

#[derive(BinWrite)]
#[bw(little)]
struct DescriptorHead {
    kind: u8,
    id: [u8; 5],
    version: u8,
}

/// A directory record to write into a directory extent
pub struct Record<'a> {
    pub name: &'a [u8],
    pub extent: u32,
    pub size: u32,
    pub flags: u8,
    pub system_use: Vec<u8>,
}

impl Default for Record<'_> {
    fn default() -> Self {
        Self {
            name: b"\0",
            extent: 0,
            size: 0,
            flags: 0,
            system_use: Vec::new(),
        }
    }
}

impl<'a> Record<'a> {
    pub fn directory(name: &'a [u8], extent: u32) -> Self {
        Self {
            name,
            extent,
            size: SECTOR as u32,
            flags: 0x02,
            ..Default::default()
        }
    }

    pub fn file(name: &'a [u8], extent: u32, size: u32) -> Self {
        Self {
            name,
            extent,
            size,
            ..Default::default()
        }
    }

    pub fn with_system_use(mut self, entry: Vec<u8>) -> Self {
        self.system_use.extend(entry);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let pad = usize::from(self.name.len() % 2 == 0);
        let length = 33 + self.name.len() + pad + self.system_use.len();
        let head = RecordHead {
            length: length as u8,
            xa_length: 0,
            extent: self.extent,
            extent_mirror: self.extent,
            size: self.size,
            size_mirror: self.size,
            recorded: RECORDED,
            flags: self.flags,
            unit_size: 0,
            interleave_gap: 0,
            sequence: 1,
            sequence_mirror: 1,
            name_length: self.name.len() as u8,
        };
        let mut bytes = Cursor::new(Vec::new());
        head.write(&mut bytes).unwrap();
        let mut bytes = bytes.into_inner();
        bytes.extend_from_slice(self.name);
        bytes.resize(bytes.len() + pad, 0);
        bytes.extend_from_slice(&self.system_use);
        assert_eq!(bytes.len(), length);
        bytes
    }
}

/// A system use entry with the given signature and body
pub fn susp(sig: &str, body: &[u8]) -> Vec<u8> {
    let mut bytes = sig.as_bytes().to_vec();
    bytes.push((4 + body.len()) as u8);
    bytes.push(1);
    bytes.extend_from_slice(body);
    bytes
}

/// Rock Ridge alternate name
pub fn nm(flags: u8, name: &str) -> Vec<u8> {
    let mut body = vec![flags];
    body.extend_from_slice(name.as_bytes());
    susp("NM", &body)
}

/// Rock Ridge timestamps in the 7-byte form
pub fn tf(flags: u8, times: &[[u8; 7]]) -> Vec<u8> {
    let mut body = vec![flags];
    times.iter().for_each(|time| body.extend_from_slice(time));
    susp("TF", &body)
}

/// Rock Ridge timestamps in the 17-byte form
pub fn tf_long(flags: u8, times: &[&[u8; 17]]) -> Vec<u8> {
    let mut body = vec![flags | 0x80];
    times.iter().for_each(|time| body.extend_from_slice(*time));
    susp("TF", &body)
}

fn both32(value: u32) -> Vec<u8> {
    let mut bytes = value.to_le_bytes().to_vec();
    bytes.extend_from_slice(&value.to_be_bytes());
    bytes
}

fn both16(value: u16) -> Vec<u8> {
    let mut bytes = value.to_le_bytes().to_vec();
    bytes.extend_from_slice(&value.to_be_bytes());
    bytes
}

fn padded(text: &str, len: usize) -> Vec<u8> {
    let mut bytes = text.as_bytes().to_vec();
    bytes.resize(len, b' ');
    bytes
}

/// Builds images sector by sector
pub struct Image {
    bytes: Vec<u8>,
}

impl Image {
    pub fn new(sectors: usize) -> Self {
        Self {
            bytes: vec![0; sectors * SECTOR],
        }
    }

    pub fn write(mut self, offset: usize, bytes: &[u8]) -> Self {
        self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
        self
    }

    /// Descriptor type, identifier and version only
    pub fn volume(self, sector: usize, kind: u8) -> Self {
        let head = DescriptorHead {
            kind,
            id: *b"CD001",
            version: 1,
        };
        let mut bytes = Cursor::new(Vec::new());
        head.write(&mut bytes).unwrap();
        self.write(sector * SECTOR, &bytes.into_inner())
    }

    pub fn terminator(self, sector: usize) -> Self {
        self.volume(sector, 255)
    }

    pub fn primary(self, sector: usize, root_extent: u32) -> Self {
        let sectors = (self.bytes.len() / SECTOR) as u32;
        let base = sector * SECTOR;
        self.volume(sector, 1)
            .write(base + 8, &padded("LINUX", 32))
            .write(base + 40, &padded("SAMPLE", 32))
            .write(base + 80, &both32(sectors))
            .write(base + 120, &both16(1))
            .write(base + 124, &both16(1))
            .write(base + 128, &both16(SECTOR as u16))
            .write(base + 156, &Record::directory(b"\0", root_extent).build())
            .write(base + 190, &padded("", 128))
            .write(base + 318, &padded("STRATA", 128))
            .write(base + 446, &padded("", 128))
            .write(base + 574, &padded("MKISOFS", 128))
            .write(base + 702, &padded("", 37 * 3))
            .write(base + 813, b"2024031512304400\x00")
            .write(base + 830, b"0000000000000000\x00")
            .write(base + 847, b"0000000000000000\x00")
            .write(base + 864, b"0000000000000000\x00")
            .write(base + 881, &[1])
    }

    /// A supplementary descriptor with the given escape sequences and a UCS-2 volume identifier
    pub fn supplementary(self, sector: usize, escape: &[u8], volume_id: &str, root_extent: u32) -> Self {
        let base = sector * SECTOR;
        let mut id: Vec<u8> = volume_id.encode_utf16().flat_map(u16::to_be_bytes).collect();
        id.resize(32, 0);
        self.volume(sector, 2)
            .write(base + 40, &id)
            .write(base + 88, escape)
            .write(base + 156, &Record::directory(b"\0", root_extent).build())
    }

    /// Records written back to back from the start of `sector`
    pub fn directory(self, sector: usize, records: &[Record<'_>]) -> Self {
        let bytes: Vec<u8> = records.iter().flat_map(Record::build).collect();
        self.write(sector * SECTOR, &bytes)
    }

    pub fn build(self) -> Vec<u8> {
        self.bytes
    }

    pub fn stream(self) -> BitStream {
        BitStream::new(self.bytes)
    }
}

/// 23 sectors: primary descriptor at 16, terminator at 17, the root directory at 20 with a
/// Rock Ridge named file and a subdirectory at 21 holding one more file, file data at 22
pub fn sample() -> Image {
    sample_with(Image::new(23).primary(16, 20).terminator(17))
}

/// [`sample`] directories written into `image`
pub fn sample_with(image: Image) -> Image {
    image
        .directory(
            20,
            &[
                Record::directory(b"\0", 20),
                Record::directory(b"\x01", 20),
                Record::file(b"README.TXT;1", 22, 5)
                    .with_system_use(nm(0, "readme.txt"))
                    .with_system_use(tf(0x02, &[TOUCHED])),
                Record::directory(b"SUBDIR", 21),
            ],
        )
        .directory(
            21,
            &[
                Record::directory(b"\0", 21),
                Record::directory(b"\x01", 20),
                Record::file(b"NESTED.TXT;1", 22, 5),
            ],
        )
        .write(22 * SECTOR, b"hello")
}

/// Names of the children of `set`, in order
pub fn names(set: &FieldSet) -> Vec<String> {
    set.iter().map(|node| node.name().to_owned()).collect()
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
