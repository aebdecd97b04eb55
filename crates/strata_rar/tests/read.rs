mod common;

use common::{assert_contiguous, bytes_at, Entry, Fixture, DOS_TIME};
use pretty_assertions::assert_eq;
use strata_core::{BitStream, FieldSet, FormatRegistry, Node, ParseOptions};
use strata_rar::{
    crc_matches,
    types::{dos_datetime, END_OF_ARCHIVE, MARKER},
    Block, Error, RarArchive, RarVariant, Result, FORMAT,
};
use tracing_test::traced_test;

fn block_names(archive: &mut RarArchive) -> Result<Vec<String>> {
    Ok(archive
        .blocks()?
        .iter()
        .map(|block| block.name().to_owned())
        .collect())
}

#[traced_test]
#[test]
fn walks_every_block() -> Result<()> {
    let stream = Fixture::new()
        .main(0)
        .file(Entry {
            name: b"hello.txt",
            data: b"hello world",
            uncompressed_size: 11,
            ..Default::default()
        })
        .end()
        .stream();
    let mut archive = RarArchive::new(stream)?;

    assert_eq!(
        block_names(&mut archive)?,
        ["marker", "archive_start", "file[0]", "archive_end"]
    );
    let root = archive.root();
    assert_contiguous(root);
    assert_eq!(bytes_at(root, "file[0]/compressed_data"), b"hello world");

    let file = root.set("file[0]")?.unwrap();
    assert_eq!(file.description(), Some("File entry: hello.txt (11 bytes)"));
    assert_eq!(file.display("host_os")?, "Win32");
    assert_eq!(file.size(), Some((7 + 25 + 9 + 11) * 8));
    file.materialize()?;
    assert_contiguous(file);
    Ok(())
}

#[traced_test]
#[test]
fn summarizes_entries() -> Result<()> {
    let stream = Fixture::new()
        .main(0)
        .file(Entry {
            name: b"docs",
            flags: 0x8000 | 0x00E0,
            ..Default::default()
        })
        .file(Entry {
            name: b"docs/a.txt",
            data: b"abc",
            uncompressed_size: 3,
            ..Default::default()
        })
        .file(Entry {
            name: b"docs/b.txt",
            data: b"defg",
            uncompressed_size: 9,
            ..Default::default()
        })
        .end()
        .stream();

    let entries = RarArchive::new(stream.clone())?.entries()?;
    assert_eq!(entries.len(), 3);
    assert!(entries[0].is_directory);
    assert_eq!(entries[0].filename, "docs");

    let file = &entries[2];
    assert_eq!(file.filename, "docs/b.txt");
    assert_eq!((file.size, file.compressed_size), (9, 4));
    assert_eq!(file.modified, dos_datetime(DOS_TIME));
    assert_eq!(file.host_os, "Win32");
    assert_eq!(file.version, "2.9");
    assert_eq!(file.method, "Storing");
    assert!(!file.is_directory);
    assert!(!file.is_encrypted);

    let options = ParseOptions::builder().max_entries(2).build();
    let limited = RarArchive::with_options(stream, options)?.entries()?;
    assert_eq!(limited.len(), 2);
    Ok(())
}

#[traced_test]
#[test]
fn large_files_declare_64_bit_sizes() -> Result<()> {
    let bytes = Fixture::new()
        .file(Entry {
            name: b"big.bin",
            data: b"12345",
            flags: 0x8000 | 0x0100,
            large_size: Some((7 << 32) | 1),
            ..Default::default()
        })
        .build();
    let stream = BitStream::new(bytes);

    let address = MARKER.len() as u64 * 8;
    let mut block = FieldSet::new(stream.clone(), "block", address, Block::new());
    assert_eq!(block.uint("large_size")?, (7 << 32) | 1);
    let header = 7 + 25 + 8 + 7;
    assert_eq!(block.size(), Some((header + 5 + (1 << 32)) * 8));

    // far larger than the input, so the walk keeps it as raw bytes
    let mut archive = RarArchive::new(stream)?;
    assert_eq!(block_names(&mut archive)?, ["marker"]);
    let root = archive.root();
    assert_eq!(
        root.find("raw[0]").map(|raw| (raw.address(), raw.size())),
        Some((7 * 8, Some((header + 5) * 8)))
    );
    assert_eq!(root.warnings().len(), 1);
    assert!(logs_contain("keeping the rest as raw bytes"));
    Ok(())
}

#[traced_test]
#[test]
fn unknown_blocks_keep_their_added_data() -> Result<()> {
    let stream = Fixture::new()
        .main(0)
        .unknown(0x7C, b"abcdef")
        .end()
        .stream();
    let mut archive = RarArchive::new(stream)?;
    assert_eq!(
        block_names(&mut archive)?,
        ["marker", "archive_start", "block[0]", "archive_end"]
    );

    let block = archive.root().set("block[0]")?.unwrap();
    assert_eq!(block.uint("added_size")?, 6);
    assert!(block.flag("flags/has_added_size")?);
    assert_eq!(block.size(), Some((11 + 6) * 8));
    assert_eq!(bytes_at(block, "body"), b"abcdef");
    block.materialize()?;
    assert_contiguous(block);
    assert_eq!(block.warnings(), ["unknown block type 0x7c"]);
    Ok(())
}

#[traced_test]
#[test]
fn truncated_headers_stop_the_walk() -> Result<()> {
    let bytes = Fixture::new()
        .main(0)
        .file(Entry {
            name: b"cut.txt",
            data: b"data",
            ..Default::default()
        })
        .build();
    let cut = BitStream::new(bytes[..7 + 13 + 10].to_vec());

    let strict = ParseOptions::builder().strict(true).build();
    let err = RarArchive::with_options(cut.clone(), strict)?
        .blocks()
        .map(|blocks| blocks.len())
        .unwrap_err();
    assert!(matches!(err, Error::Parse(ref inner) if inner.is_truncated()));

    let mut tolerant = RarArchive::new(cut)?;
    assert_eq!(block_names(&mut tolerant)?, ["marker", "archive_start"]);
    assert!(tolerant.root().failure().is_some());
    Ok(())
}

#[traced_test]
#[test]
fn locates_archives_behind_a_stub() -> Result<()> {
    let mut stub = b"MZ".to_vec();
    // a stray signature without a main header after it
    stub.extend_from_slice(&MARKER);
    stub.extend_from_slice(&[0xFF; 7]);
    stub.resize(100, 0);
    let stream = Fixture::with_stub(&stub).main(0).end().stream();

    assert!(matches!(
        RarArchive::new(stream.clone()),
        Err(Error::InvalidArchive)
    ));
    let near = ParseOptions::builder().search_limit(50).build();
    assert!(matches!(
        RarArchive::locate(stream.clone(), near),
        Err(Error::InvalidArchive)
    ));

    let mut archive = RarArchive::locate(stream, ParseOptions::default())?;
    assert_eq!(
        block_names(&mut archive)?,
        ["marker", "archive_start", "archive_end"]
    );
    let root = archive.root();
    assert_eq!(root.find("sfx_stub").and_then(Node::size), Some(800));
    assert_eq!(root.find("marker").map(Node::address), Some(800));
    assert_contiguous(root);
    Ok(())
}

#[traced_test]
#[test]
fn content_size_stops_at_the_end_block() -> Result<()> {
    let archive_len = Fixture::new().main(0).raw(&END_OF_ARCHIVE).build().len() as u64;
    let stream = Fixture::new()
        .main(0)
        .raw(&END_OF_ARCHIVE)
        .raw(b"trailing")
        .stream();

    assert_eq!(RarArchive::new(stream)?.content_size(), Some(archive_len));
    let bare = Fixture::new().main(0).stream();
    assert_eq!(RarArchive::new(bare)?.content_size(), None);
    Ok(())
}

#[traced_test]
#[test]
fn header_checksums() -> Result<()> {
    let mut bytes = Fixture::new()
        .main(0)
        .file(Entry {
            name: b"a",
            data: b"x",
            ..Default::default()
        })
        .end()
        .build();

    let mut archive = RarArchive::new(BitStream::new(bytes.clone()))?;
    for block in archive.blocks()? {
        assert!(crc_matches(block)?, "{}", block.name());
    }

    // a reserved byte of the main header
    bytes[7 + 8] ^= 0xFF;
    let mut corrupt = RarArchive::new(BitStream::new(bytes))?;
    let main = corrupt.root().set("archive_start")?.unwrap();
    assert!(!crc_matches(main)?);
    Ok(())
}

#[traced_test]
#[test]
fn newer_variants_are_recognized_not_modeled() -> Result<()> {
    let mut bytes = b"Rar!\x1a\x07\x01\x00".to_vec();
    bytes.extend_from_slice(&[0; 16]);

    assert!(matches!(
        RarArchive::new(BitStream::new(bytes.clone())),
        Err(Error::UnsupportedVariant(RarVariant::Rar50))
    ));

    let registry = FormatRegistry::new().with(FORMAT);
    let (format, mut root) = registry.parse(BitStream::new(bytes), &ParseOptions::default())?;
    assert_eq!(format.id, "rar");
    root.materialize()?;
    assert_eq!(root.find("signature").and_then(Node::size), Some(64));
    assert_eq!(root.find("raw[0]").and_then(Node::size), Some(128));
    assert!(logs_contain("RAR 5.0 archives are not modeled"));

    let other = BitStream::new(b"PK\x03\x04 not a rar archive".to_vec());
    assert_eq!(FORMAT.check(&other), Err("no signature matched".to_owned()));
    Ok(())
}

#[traced_test]
#[test]
fn unicode_names_and_extended_times() -> Result<()> {
    // time_flags 0x8A00: a creation time with two extra bytes of precision
    let mut extra = vec![0x00, 0x8A];
    extra.extend_from_slice(&DOS_TIME.to_le_bytes());
    extra.extend_from_slice(&[0x11, 0x22]);
    let stream = Fixture::new()
        .main(0)
        .file(Entry {
            name: b"plain\0\x01\x02",
            data: b"z",
            flags: 0x8000 | 0x1000 | 0x0200,
            extra: &extra,
            ..Default::default()
        })
        .end()
        .stream();
    let mut archive = RarArchive::new(stream)?;

    let file = archive.root().set("file[0]")?.unwrap();
    assert_eq!(file.text("filename")?, "plain");
    assert_eq!(
        file.value("extra_time/dos_time[0]")?.as_timestamp(),
        dos_datetime(DOS_TIME)
    );
    assert_eq!(bytes_at(file, "extra_time/remainder[0]"), [0x11, 0x22]);
    assert_eq!(bytes_at(file, "compressed_data"), b"z");
    assert_eq!(file.description(), Some("File entry: plain (1 bytes)"));
    Ok(())
}

#[traced_test]
#[test]
fn archive_info_and_service_blocks() -> Result<()> {
    let stream = Fixture::new()
        .main(0x0001 | 0x0008 | 0x0100)
        .service("CMT")
        .service("XYZ")
        .end()
        .stream();
    let info = RarArchive::new(stream)?.info()?;

    assert_eq!(info.variant, RarVariant::Rar15);
    assert!(info.is_volume && info.is_solid && info.is_first_volume);
    assert!(!info.is_locked);
    assert!(info.has_comment);
    assert_eq!(info.services, ["CMT", "XYZ"]);
    assert!(logs_contain("archive comments are not extracted"));
    assert!(logs_contain("unknown service block"));
    Ok(())
}

#[traced_test]
#[test]
fn overflowing_block_sizes_are_rejected() -> Result<()> {
    let stream = Fixture::new()
        .main(0)
        .file(Entry {
            name: b"huge",
            data: b"x",
            flags: 0x8000 | 0x0100,
            large_size: Some(u64::MAX),
            ..Default::default()
        })
        .end()
        .stream();

    let strict = ParseOptions::builder().strict(true).build();
    let err = RarArchive::with_options(stream.clone(), strict)?
        .blocks()
        .map(|blocks| blocks.len())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Parse(strata_core::Error::Structure { ref reason, .. }) if reason == "block size overflows"
    ));

    let mut tolerant = RarArchive::new(stream)?;
    assert_eq!(block_names(&mut tolerant)?, ["marker", "archive_start"]);
    let failure = tolerant.root().failure().map(str::to_owned);
    assert!(failure.is_some_and(|reason| reason.ends_with("block size overflows")));
    Ok(())
}

#[traced_test]
#[test]
fn recovery_records_span_their_data() -> Result<()> {
    let mut header = 4u32.to_le_bytes().to_vec();
    header.push(1);
    header.extend_from_slice(&2u16.to_le_bytes());
    header.extend_from_slice(&3u32.to_le_bytes());
    header.extend_from_slice(b"Protect+");
    let stream = Fixture::new()
        .main(0x0040)
        .block(0x78, 0x8000, &header, b"RRRR")
        .end()
        .stream();
    let mut archive = RarArchive::new(stream)?;
    assert_eq!(
        block_names(&mut archive)?,
        ["marker", "archive_start", "recovery[0]", "archive_end"]
    );

    let recovery = archive.root().set("recovery[0]")?.unwrap();
    assert_eq!(recovery.uint("block_size")?, 26);
    assert_eq!(recovery.uint("total_size")?, 4);
    assert!(!recovery.contains("added_size")?);
    assert_eq!(recovery.size(), Some((26 + 4) * 8));
    assert_eq!(bytes_at(recovery, "mark"), b"Protect+");
    assert_eq!(bytes_at(recovery, "body"), b"RRRR");
    recovery.materialize()?;
    assert_contiguous(recovery);
    Ok(())
}

#[traced_test]
#[test]
fn legacy_blocks() -> Result<()> {
    // comment: added size 5, total size 19 + 5, unpacked 9, version 2.0, stored, crc
    let mut comment = 5u32.to_le_bytes().to_vec();
    comment.extend_from_slice(&24u16.to_le_bytes());
    comment.extend_from_slice(&9u16.to_le_bytes());
    comment.extend_from_slice(&[20, 0x30, 0xAA, 0xBB]);
    // authenticity information without an added size
    let mut auth = 16u16.to_le_bytes().to_vec();
    auth.extend_from_slice(&[1, 2, 3]);
    auth.extend_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
    // signature with three added bytes
    let mut signature = 3u32.to_le_bytes().to_vec();
    signature.extend_from_slice(&DOS_TIME.to_le_bytes());
    signature.extend_from_slice(&4u16.to_le_bytes());
    signature.extend_from_slice(&5u16.to_le_bytes());

    let stream = Fixture::new()
        .main(0)
        .block(0x75, 0x8000, &comment, b"hello")
        .block(0x76, 0, &auth, b"")
        .old_service("ACL", b"acl")
        .block(0x79, 0x8000, &signature, b"SIG")
        .end()
        .stream();
    let mut archive = RarArchive::new(stream)?;
    assert_eq!(
        block_names(&mut archive)?,
        [
            "marker",
            "archive_start",
            "comment[0]",
            "av_info[0]",
            "sub_block[0]",
            "signature",
            "archive_end"
        ]
    );
    let root = archive.root();
    assert_contiguous(root);

    let comment = root.set("comment[0]")?.unwrap();
    assert_eq!(comment.uint("added_size")?, 5);
    assert_eq!(comment.uint("uncompressed_size")?, 9);
    assert_eq!(comment.size(), Some(24 * 8));
    assert_eq!(bytes_at(comment, "comment_data"), b"hello");
    assert!(!comment.contains("body")?);

    let auth = root.set("av_info[0]")?.unwrap();
    assert_eq!(auth.uint("av_crc")?, 0xDEAD_BEEF);
    assert_eq!(auth.size(), Some(16 * 8));
    assert!(!auth.contains("av_info_data")?);

    let service = root.set("sub_block[0]")?.unwrap();
    assert_eq!(service.description(), Some("Service block"));
    assert_eq!(service.text("filename")?, "ACL");
    assert_eq!(bytes_at(service, "compressed_data"), b"acl");

    let signature = root.set("signature")?.unwrap();
    assert_eq!(
        signature.value("creation_time")?.as_timestamp(),
        dos_datetime(DOS_TIME)
    );
    assert_eq!(signature.uint("user_name_size")?, 5);
    assert_eq!(bytes_at(signature, "body"), b"SIG");
    Ok(())
}

#[traced_test]
#[test]
fn leftover_header_bytes_are_kept() -> Result<()> {
    let stream = Fixture::new()
        .main(0)
        .file(Entry {
            name: b"a.txt",
            data: b"abc",
            extra: b"\x01\x02\x03",
            ..Default::default()
        })
        .stream();
    let mut archive = RarArchive::new(stream)?;
    let file = archive.root().set("file[0]")?.unwrap();
    assert_eq!(bytes_at(file, "unknown"), [1, 2, 3]);
    assert_eq!(bytes_at(file, "compressed_data"), b"abc");
    file.materialize()?;
    assert_contiguous(file);
    Ok(())
}

#[traced_test]
#[test]
fn archives_may_end_without_an_end_block() -> Result<()> {
    let data = b"0123456789";
    let stream = Fixture::new()
        .main(0)
        .file(Entry {
            name: b"data.bin",
            data,
            ..Default::default()
        })
        .stream();
    let mut archive = RarArchive::new(stream)?;

    assert_eq!(
        block_names(&mut archive)?,
        ["marker", "archive_start", "file[0]"]
    );
    let root = archive.root();
    assert!(root.is_complete());
    assert_eq!(root.len(), 3);
    let file = root.set("file[0]")?.unwrap();
    assert_eq!(
        file.find("compressed_data").and_then(Node::size),
        Some(data.len() as u64 * 8)
    );
    Ok(())
}

#[traced_test]
#[test]
fn unknown_blocks_cover_every_byte() -> Result<()> {
    let mut header = 6u32.to_le_bytes().to_vec();
    header.extend_from_slice(b"xyz");
    let bytes = Fixture::new()
        .main(0)
        .block(0x7C, 0x8000, &header, b"abcdef")
        .build();
    let start = MARKER.len() + 13;
    let mut archive = RarArchive::new(BitStream::new(bytes.clone()))?;

    let block = archive.root().set("block[0]")?.unwrap();
    assert_eq!(block.uint("block_size")?, 14);
    block.materialize()?;
    let names: Vec<_> = block.iter().map(|node| node.name().to_owned()).collect();
    assert_eq!(
        names,
        ["crc16", "block_type", "flags", "block_size", "added_size", "unknown", "body"]
    );
    assert_eq!(bytes_at(block, "unknown"), b"xyz");

    let mut covered = Vec::new();
    for node in block.iter() {
        let len = node.size().unwrap_or_default() / 8;
        covered.extend_from_slice(block.stream().read_bytes(node.address() / 8, len)?);
    }
    assert_eq!(covered, &bytes[start..]);
    Ok(())
}

#[traced_test]
#[test]
fn service_blocks_without_a_name_are_skipped() -> Result<()> {
    let stream = Fixture::new()
        .main(0)
        .service("")
        .service("RR")
        .end()
        .stream();
    let info = RarArchive::new(stream)?.info()?;
    assert!(info.has_main_header);
    assert!(info.has_recovery_record);
    assert_eq!(info.services, ["RR"]);
    assert!(logs_contain("skipping service block without a name"));
    Ok(())
}

#[traced_test]
#[test]
fn archives_without_a_main_header() -> Result<()> {
    let stream = Fixture::new()
        .file(Entry {
            name: b"beos.txt",
            data: b"b",
            host_os: 5,
            ..Default::default()
        })
        .end()
        .stream();
    let mut archive = RarArchive::new(stream)?;

    let info = archive.info()?;
    assert!(!info.has_main_header);
    assert!(!info.is_solid && !info.is_volume);
    assert!(info.services.is_empty());
    assert!(logs_contain("archive has no main header"));

    let entries = archive.entries()?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].host_os, "BeOS");
    Ok(())
}
