//! Walking an archive and summarizing what it holds

use binrw::BinRead;
use chrono::NaiveDateTime;
use std::io::Cursor;
use strata_core::{BitStream, Builder, FieldSet, Grammar, Node, ParseOptions, Step};
use tracing::{debug, instrument, warn};

use crate::{
    block::Block,
    error::{Error, Result},
    types::{
        BlockHead, RarVariant, DICTIONARY_DIRECTORY, END_OF_ARCHIVE, MARKER, SIGNATURE_PREFIX,
    },
};

/// Root grammar: an optional self-extractor stub, then one block after another
#[derive(Debug)]
pub struct RarFile {
    variant: RarVariant,
    start: u64,
    started: bool,
}

impl RarFile {
    /// Archive of `variant` whose signature starts at byte `start`
    pub fn new(variant: RarVariant, start: u64) -> Self {
        Self {
            variant,
            start,
            started: false,
        }
    }
}

impl Grammar for RarFile {
    fn step(&mut self, cx: &mut Builder<'_>) -> strata_core::Result<Step> {
        if !self.started {
            self.started = true;
            cx.add_raw("sfx_stub", self.start)?;
            if self.variant != RarVariant::Rar15 {
                cx.add_raw("signature", self.variant.signature_len())?;
                cx.warn(format!(
                    "{} archives are not modeled; keeping the content as raw bytes",
                    self.variant
                ));
                return Ok(Step::Done);
            }
        }
        if cx.eof() {
            return Ok(Step::Done);
        }
        let block = cx.child("block[]", Block::new());
        cx.add_set(block)?;
        Ok(Step::Continue)
    }
}

/// Signature check used by the format registry
pub fn validate(stream: &BitStream) -> core::result::Result<(), String> {
    RarVariant::detect(stream.as_slice())
        .map(drop)
        .ok_or_else(|| "Invalid magic".to_owned())
}

/// Root constructor used by the format registry
pub fn parse_root(stream: BitStream, _options: &ParseOptions) -> strata_core::Result<FieldSet> {
    let variant = RarVariant::detect(stream.as_slice())
        .ok_or_else(|| strata_core::Error::structure("root", "Invalid magic"))?;
    Ok(FieldSet::root(stream, RarFile::new(variant, 0)))
}

/// Offset just past the first archive end block, in bytes
///
/// Data appended after an archive is not part of it; this is where it starts.
pub fn content_size(stream: &BitStream) -> Option<u64> {
    stream
        .search(&END_OF_ARCHIVE, 0, stream.len_bits())
        .map(|address| address / 8 + END_OF_ARCHIVE.len() as u64)
}

/// Archive wide properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub variant: RarVariant,
    /// Whether an archive main header was found; the archive flags are all unset without one
    pub has_main_header: bool,
    pub is_volume: bool,
    pub is_first_volume: bool,
    pub is_solid: bool,
    pub is_locked: bool,
    pub has_comment: bool,
    pub has_recovery_record: bool,
    pub has_auth_information: bool,
    pub has_encrypted_headers: bool,
    /// Names of the service blocks, such as `CMT` or `RR`
    pub services: Vec<String>,
}

/// One file or directory stored in the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RarEntry {
    pub filename: String,
    pub size: u64,
    pub compressed_size: u64,
    pub modified: Option<NaiveDateTime>,
    pub host_os: String,
    pub version: String,
    pub method: String,
    pub crc32: u32,
    pub is_directory: bool,
    pub is_encrypted: bool,
}

impl RarEntry {
    /// Summarize a `file[]` block
    pub fn from_block(block: &mut FieldSet) -> Result<Self> {
        let filename = if block.contains("filename")? {
            block.text("filename")?
        } else {
            String::new()
        };
        let mut size = block.uint("uncompressed_size")?;
        let mut compressed_size = block.uint("compressed_size")?;
        if block.flag("flags/is_large")? {
            let large = block.uint("large_size")?;
            compressed_size |= (large & 0xFFFF_FFFF) << 32;
            size |= (large >> 32) << 32;
        }
        Ok(Self {
            filename,
            size,
            compressed_size,
            modified: block.value("ftime")?.as_timestamp(),
            host_os: block.display("host_os")?,
            version: block.display("version")?,
            method: block.display("method")?,
            crc32: block.uint("crc32")? as u32,
            is_directory: block.uint("flags/dictionary_size")? == DICTIONARY_DIRECTORY,
            is_encrypted: block.flag("flags/is_encrypted")?,
        })
    }
}

/// A RAR archive
///
/// ```
/// use strata_rar::RarArchive;
///
/// let err = RarArchive::new(b"not an archive".to_vec().into()).unwrap_err();
/// assert!(matches!(err, strata_rar::Error::InvalidArchive));
/// ```
#[derive(Debug)]
pub struct RarArchive {
    root: FieldSet,
    variant: RarVariant,
    options: ParseOptions,
}

impl RarArchive {
    /// Open an archive that starts at the beginning of `stream`
    pub fn new(stream: BitStream) -> Result<Self> {
        Self::with_options(stream, ParseOptions::default())
    }

    /// [`RarArchive::new`] with explicit options
    #[instrument(skip_all, err, fields(size = stream.len_bytes()))]
    pub fn with_options(stream: BitStream, options: ParseOptions) -> Result<Self> {
        let variant = RarVariant::detect(stream.as_slice()).ok_or(Error::InvalidArchive)?;
        Self::open(stream, variant, 0, options)
    }

    /// Find an archive embedded in `stream`, such as one behind a self-extractor stub
    ///
    /// Only the first [`ParseOptions::search_limit`] bytes are searched. A 1.5 signature is
    /// accepted when an archive main header follows it.
    #[instrument(skip_all, err, fields(size = stream.len_bytes()))]
    pub fn locate(stream: BitStream, options: ParseOptions) -> Result<Self> {
        let limit = options
            .search_limit
            .saturating_add(MARKER.len() as u64 + 1)
            .saturating_mul(8);
        let mut from = 0;
        while let Some(address) = stream.search(&SIGNATURE_PREFIX, from, limit) {
            let offset = address / 8;
            let candidate = &stream.as_slice()[offset as usize..];
            match RarVariant::detect(candidate) {
                Some(RarVariant::Rar15) if follows_main_header(candidate) => {
                    debug!(offset, "found archive marker");
                    return Self::open(stream, RarVariant::Rar15, offset, options);
                }
                Some(RarVariant::Rar15) | None => {}
                Some(variant) => return Err(Error::UnsupportedVariant(variant)),
            }
            from = address + 8;
        }
        Err(Error::InvalidArchive)
    }

    fn open(
        stream: BitStream,
        variant: RarVariant,
        start: u64,
        options: ParseOptions,
    ) -> Result<Self> {
        if variant != RarVariant::Rar15 {
            return Err(Error::UnsupportedVariant(variant));
        }
        Ok(Self {
            root: FieldSet::root(stream, RarFile::new(variant, start)),
            variant,
            options,
        })
    }

    pub fn variant(&self) -> RarVariant {
        self.variant
    }

    /// Root of the field tree
    pub fn root(&mut self) -> &mut FieldSet {
        &mut self.root
    }

    pub fn into_root(self) -> FieldSet {
        self.root
    }

    /// See [`content_size`]
    pub fn content_size(&self) -> Option<u64> {
        content_size(self.root.stream())
    }

    /// Parse every block; malformed trailing data is tolerated unless the options are strict
    fn walk(&mut self) -> Result<()> {
        if self.options.strict {
            self.root.materialize()?;
        } else {
            self.root.materialize_tolerant();
        }
        Ok(())
    }

    /// Every block, in archive order
    pub fn blocks(&mut self) -> Result<Vec<&mut FieldSet>> {
        self.walk()?;
        Ok(self
            .root
            .iter_mut()
            .filter_map(Node::as_set_mut)
            .collect())
    }

    /// Archive wide flags and the names of the service blocks
    ///
    /// An archive without a main header reports every flag unset; service blocks without a
    /// name are skipped. Both are logged.
    pub fn info(&mut self) -> Result<ArchiveInfo> {
        self.walk()?;
        let mut info = ArchiveInfo {
            variant: self.variant,
            has_main_header: false,
            is_volume: false,
            is_first_volume: false,
            is_solid: false,
            is_locked: false,
            has_comment: false,
            has_recovery_record: false,
            has_auth_information: false,
            has_encrypted_headers: false,
            services: Vec::new(),
        };

        // the walk is over, so a missing main header will not show up later
        let main = if self.root.find("archive_start").is_some() {
            self.root.set("archive_start")?
        } else {
            None
        };
        match main {
            Some(main) => {
                info.has_main_header = true;
                info.is_volume = main.flag("flags/vol")?;
                info.is_first_volume = main.flag("flags/is_first_vol")?;
                info.is_solid = main.flag("flags/is_solid")?;
                info.is_locked = main.flag("flags/is_locked")?;
                info.has_comment = main.flag("flags/has_comment")?;
                info.has_recovery_record = main.flag("flags/has_recovery_record")?;
                info.has_auth_information = main.flag("flags/has_auth_information")?;
                info.has_encrypted_headers = main.flag("flags/is_encrypted")?;
            }
            None => warn!("archive has no main header"),
        }

        for node in self.root.elements_mut("new_sub_block") {
            let Some(block) = node.as_set_mut() else {
                continue;
            };
            if !block.contains("filename")? {
                warn!(block = block.name(), "skipping service block without a name");
                continue;
            }
            let name = block.text("filename")?;
            match name.as_str() {
                "CMT" => {
                    info.has_comment = true;
                    warn!("archive comments are not extracted");
                }
                "AV" => info.has_auth_information = true,
                "RR" => info.has_recovery_record = true,
                other => warn!(name = other, "unknown service block"),
            }
            info.services.push(name);
        }
        Ok(info)
    }

    /// Files and directories, at most [`ParseOptions::max_entries`] of them
    ///
    /// Entries whose header cannot be summarized are skipped with a warning unless the options
    /// are strict.
    pub fn entries(&mut self) -> Result<Vec<RarEntry>> {
        let limit = self.options.max_entries;
        let strict = self.options.strict;
        if let Err(err) = self.root.array("file", limit).map(drop) {
            if strict {
                return Err(err.into());
            }
            warn!("stopped listing entries: {err}");
        }

        let mut entries = Vec::new();
        let files = self.root.elements_mut("file");
        for node in files.into_iter().take(limit.unwrap_or(usize::MAX)) {
            let Some(block) = node.as_set_mut() else {
                continue;
            };
            match RarEntry::from_block(block) {
                Ok(entry) => entries.push(entry),
                Err(err) if strict => return Err(err),
                Err(err) => warn!(block = block.name(), "skipping malformed entry: {err}"),
            }
        }
        Ok(entries)
    }
}

fn follows_main_header(candidate: &[u8]) -> bool {
    let Some(rest) = candidate.get(MARKER.len()..) else {
        return false;
    };
    BlockHead::read(&mut Cursor::new(rest)).is_ok_and(|head| head.block_type == 0x73)
}
