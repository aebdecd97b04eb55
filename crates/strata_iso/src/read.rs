//! Laying out an image and summarizing its volume and files

use chrono::NaiveDateTime;
use std::collections::{HashMap, HashSet};
use strata_core::{BitStream, Builder, FieldSet, Grammar, Node, ParseOptions, Step, Value};
use tracing::{instrument, warn};

use crate::{
    discovery::Discovery,
    error::{Error, Result},
    record::{DirRecord, NM_CONTINUE, TF_TIMESTAMPS},
    types::{
        JolietLevel, MAGIC, SECTOR, SYSTEM_AREA, VOLUME_PRIMARY, VOLUME_SUPPLEMENTARY,
        VOLUME_TERMINATOR,
    },
    volume::Volume,
};

/// Path of the root directory record inside a primary volume descriptor
const ROOT_RECORD: &str = "content/root_directory_record";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    SystemArea,
    Volumes,
    Records,
    End,
}

/// Root grammar: system area, volume descriptors up to the terminator, then every directory
/// record in increasing offset order
pub struct Iso9660 {
    options: ParseOptions,
    stage: Stage,
    primary: Option<String>,
    records: Vec<u64>,
    next: usize,
}

impl Iso9660 {
    pub fn new(options: ParseOptions) -> Self {
        Self {
            options,
            stage: Stage::SystemArea,
            primary: None,
            records: Vec::new(),
            next: 0,
        }
    }

    fn volume(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
        if cx.eof() {
            return Err(strata_core::Error::structure(
                cx.name(),
                "volume descriptor set has no terminator",
            )
            .into());
        }
        let volume = cx.child("volume[]", Volume).with_size(SECTOR * 8);
        let name = cx.add_set(volume)?.name().to_owned();
        let kind = cx.uint(&format!("{name}/type"))?;

        if kind == VOLUME_PRIMARY && self.primary.is_none() {
            self.primary = Some(name);
        }
        if kind != VOLUME_TERMINATOR {
            return Ok(Step::Continue);
        }

        let Some(primary) = self.primary.clone() else {
            return Err(Error::MissingPrimaryVolume);
        };
        let extent = cx.uint(&format!("{primary}/{ROOT_RECORD}/extent_loc"))?;
        let length = cx.uint(&format!("{primary}/{ROOT_RECORD}/size"))?;
        let discovery = Discovery::run(
            cx.stream(),
            extent * SECTOR,
            length,
            self.options.max_depth,
        );
        for warning in &discovery.warnings {
            cx.warn(warning.clone());
        }
        self.records = discovery.records.into_iter().collect();
        self.stage = Stage::Records;
        Ok(Step::Continue)
    }

    fn record(&mut self, cx: &mut Builder<'_>) -> Result<Step> {
        let Some(&offset) = self.records.get(self.next) else {
            self.stage = Stage::End;
            return Ok(Step::Continue);
        };
        self.next += 1;

        let position = cx.address() / 8;
        if offset < position {
            cx.warn(format!(
                "directory record at byte {offset} overlaps the previous record"
            ));
            return Ok(Step::Continue);
        }
        cx.seek_byte(offset, "padding[]")?;
        let record = cx.child("records[]", DirRecord::new());
        cx.add_set(record)?;
        Ok(Step::Continue)
    }
}

impl Grammar for Iso9660 {
    fn step(&mut self, cx: &mut Builder<'_>) -> strata_core::Result<Step> {
        let step = match self.stage {
            Stage::SystemArea => {
                cx.seek_byte(SYSTEM_AREA, "padding[]")?;
                self.stage = Stage::Volumes;
                Ok(Step::Continue)
            }
            Stage::Volumes => self.volume(cx),
            Stage::Records => self.record(cx),
            Stage::End => {
                if let Some(bits) = cx.remaining() {
                    cx.add_raw("end", bits / 8)?;
                }
                Ok(Step::Done)
            }
        };
        step.map_err(|err| match err {
            Error::Parse(err) => err,
            other => strata_core::Error::structure(cx.name(), other.to_string()),
        })
    }
}

/// Signature check used by the format registry
pub fn validate(stream: &BitStream) -> core::result::Result<(), String> {
    match stream.read_bytes(SYSTEM_AREA, MAGIC.len() as u64) {
        Ok(bytes) if bytes == MAGIC => Ok(()),
        _ => Err("Invalid signature".to_owned()),
    }
}

/// Root constructor used by the format registry
pub fn parse_root(stream: BitStream, options: &ParseOptions) -> strata_core::Result<FieldSet> {
    Ok(FieldSet::root(stream, Iso9660::new(*options)))
}

/// Identification of the volume, from the primary descriptor and the Joliet descriptor if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    pub system_id: String,
    pub volume_id: String,
    pub publisher: String,
    pub preparer: String,
    pub application: String,
    pub copyright: String,
    /// Size of the volume in logical blocks
    pub volume_space_size: u64,
    pub logical_block_size: u64,
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
    pub joliet: Option<JolietLevel>,
    /// Volume identifier of the Joliet descriptor, decoded from UCS-2
    pub joliet_volume_id: Option<String>,
}

/// One file or directory reachable from the root directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoEntry {
    /// Slash separated, relative to the root
    pub path: String,
    pub size: u64,
    pub is_directory: bool,
    /// Recording time of the directory record
    pub recorded: Option<NaiveDateTime>,
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
    pub accessed: Option<NaiveDateTime>,
}

/// What a single directory record says about its file
#[derive(Debug, Default)]
struct RecordSummary {
    name: Option<String>,
    extent: u64,
    size: u64,
    is_directory: bool,
    recorded: Option<NaiveDateTime>,
    created: Option<NaiveDateTime>,
    modified: Option<NaiveDateTime>,
    accessed: Option<NaiveDateTime>,
}

impl RecordSummary {
    fn from_record(record: &mut FieldSet) -> Result<Self> {
        record.materialize_all()?;
        let mut summary = Self {
            extent: record.uint("extent_loc")? * SECTOR,
            size: record.uint("size")?,
            is_directory: record.flag("file_flags/directory")?,
            recorded: record
                .node("recording_time")?
                .and_then(|node| node.value())
                .and_then(Value::as_timestamp),
            ..Self::default()
        };

        let identifier = if record.contains("filename")? {
            Some(record.text("filename")?)
        } else {
            None
        };

        let mut alternate: Option<String> = None;
        let mut continued = true;
        for entry in record.iter_mut().filter_map(Node::as_set_mut) {
            if !entry.name().starts_with("system_use_entry[") {
                continue;
            }
            match entry.text("sig")?.as_str() {
                "NM" if continued => {
                    let flags = entry.uint("flags")?;
                    let fragment = if entry.contains("name_content")? {
                        entry.text("name_content")?
                    } else {
                        String::new()
                    };
                    alternate.get_or_insert_with(String::new).push_str(&fragment);
                    continued = flags & NM_CONTINUE != 0;
                }
                "TF" => summary.timestamps(entry)?,
                _ => {}
            }
        }

        summary.name = alternate.filter(|name| !name.is_empty()).or_else(|| {
            identifier.map(|name| match name.split_once(';') {
                Some((base, _version)) => base.trim_end_matches('.').to_owned(),
                None => name,
            })
        });
        Ok(summary)
    }

    /// Assign the timestamps of a `TF` entry; they are recorded in the order of their flag bits
    fn timestamps(&mut self, entry: &mut FieldSet) -> Result<()> {
        let flags = entry.uint("flags")?;
        let present = TF_TIMESTAMPS
            .iter()
            .enumerate()
            .filter(|(bit, _)| flags & (1 << bit) != 0)
            .map(|(_, name)| *name);
        for (index, name) in present.enumerate() {
            let value = entry
                .node(&format!("timestamp[{index}]"))?
                .and_then(|node| node.value())
                .and_then(Value::as_timestamp);
            match name {
                "creation" => self.created = value,
                "modify" => self.modified = value,
                "access" => self.accessed = value,
                _ => {}
            }
        }
        Ok(())
    }
}

/// An ISO 9660 image
///
/// ```
/// use strata_iso::IsoImage;
///
/// let err = IsoImage::new(vec![0u8; 40_000].into()).unwrap_err();
/// assert!(matches!(err, strata_iso::Error::InvalidImage));
/// ```
#[derive(Debug)]
pub struct IsoImage {
    root: FieldSet,
    options: ParseOptions,
}

impl IsoImage {
    pub fn new(stream: BitStream) -> Result<Self> {
        Self::with_options(stream, ParseOptions::default())
    }

    /// [`IsoImage::new`] with explicit options
    #[instrument(skip_all, err, fields(size = stream.len_bytes()))]
    pub fn with_options(stream: BitStream, options: ParseOptions) -> Result<Self> {
        validate(&stream).map_err(|_| Error::InvalidImage)?;
        Ok(Self {
            root: FieldSet::root(stream, Iso9660::new(options)),
            options,
        })
    }

    /// Root of the field tree
    pub fn root(&mut self) -> &mut FieldSet {
        &mut self.root
    }

    pub fn into_root(self) -> FieldSet {
        self.root
    }

    /// Name of the first volume descriptor of `kind`
    fn volume(&mut self, kind: u64) -> Result<Option<String>> {
        let mut index = 0;
        while let Some(volume) = self.root.set(&format!("volume[{index}]"))? {
            let found = volume.uint("type")?;
            if found == kind {
                return Ok(Some(volume.name().to_owned()));
            }
            if found == VOLUME_TERMINATOR {
                break;
            }
            index += 1;
        }
        Ok(None)
    }

    /// Identification of the volume
    pub fn volume_info(&mut self) -> Result<VolumeInfo> {
        let primary = self
            .volume(VOLUME_PRIMARY)?
            .ok_or(Error::MissingPrimaryVolume)?;
        let pvd = self
            .root
            .set(&format!("{primary}/content"))?
            .ok_or(Error::MissingPrimaryVolume)?;
        let mut info = VolumeInfo {
            system_id: pvd.text("system_id")?,
            volume_id: pvd.text("volume_id")?,
            publisher: pvd.text("publisher")?,
            preparer: pvd.text("data_preparer")?,
            application: pvd.text("application")?,
            copyright: pvd.text("copyright")?,
            volume_space_size: pvd.uint("volume_space_size")?,
            logical_block_size: pvd.uint("logical_block_size")?,
            created: pvd.value("creation_ts")?.as_timestamp(),
            modified: pvd.value("modification_ts")?.as_timestamp(),
            joliet: None,
            joliet_volume_id: None,
        };

        if let Some(supplementary) = self.volume(VOLUME_SUPPLEMENTARY)? {
            let svd = self
                .root
                .set(&format!("{supplementary}/content"))?
                .ok_or_else(|| Error::CustomError("supplementary descriptor has no content".into()))?;
            let escape = svd
                .node("escape_sequences")?
                .and_then(|node| node.as_field())
                .map(|field| field.bytes())
                .transpose()?
                .and_then(JolietLevel::detect);
            if escape.is_some() {
                info.joliet = escape;
                info.joliet_volume_id = Some(svd.text("volume_id")?);
            }
        }
        Ok(info)
    }

    /// Locate every directory and directory record, without building fields for them
    pub fn discover(&mut self) -> Result<Discovery> {
        let primary = self
            .volume(VOLUME_PRIMARY)?
            .ok_or(Error::MissingPrimaryVolume)?;
        let extent = self.root.uint(&format!("{primary}/{ROOT_RECORD}/extent_loc"))?;
        let length = self.root.uint(&format!("{primary}/{ROOT_RECORD}/size"))?;
        Ok(Discovery::run(
            self.root.stream(),
            extent * SECTOR,
            length,
            self.options.max_depth,
        ))
    }

    /// Every directory record, in increasing offset order
    pub fn records(&mut self) -> Result<Vec<&mut FieldSet>> {
        if self.options.strict {
            self.root.materialize()?;
        } else {
            self.root.materialize_tolerant();
        }
        Ok(self
            .root
            .elements_mut("records")
            .into_iter()
            .filter_map(Node::as_set_mut)
            .collect())
    }

    /// Files and directories below the root, at most [`ParseOptions::max_entries`] of them
    ///
    /// A directory lists its own entries before those of its subdirectories.
    ///
    /// Rock Ridge alternate names and timestamps are preferred over the ISO 9660 ones.
    pub fn entries(&mut self) -> Result<Vec<IsoEntry>> {
        let discovery = self.discover()?;
        let strict = self.options.strict;
        let limit = self.options.max_entries.unwrap_or(usize::MAX);

        let mut summaries = HashMap::new();
        for record in self.records()? {
            let offset = record.address() / 8;
            match RecordSummary::from_record(record) {
                Ok(summary) => {
                    summaries.insert(offset, summary);
                }
                Err(err) if strict => return Err(err),
                Err(err) => warn!(offset, "skipping malformed directory record: {err}"),
            }
        }

        let root = discovery.root;
        let mut entries = Vec::new();
        let mut visited = HashSet::from([root]);
        let mut pending = vec![(root, String::new())];

        while let Some((directory, prefix)) = pending.pop() {
            let Some(listing) = discovery.listing.get(&directory) else {
                continue;
            };
            let mut subdirectories = Vec::new();
            for offset in listing {
                let Some(summary) = summaries.get(offset) else {
                    continue;
                };
                // `.` and `..` have no name
                let Some(name) = &summary.name else {
                    continue;
                };
                if entries.len() >= limit {
                    return Ok(entries);
                }
                let path = if prefix.is_empty() {
                    name.clone()
                } else {
                    format!("{prefix}/{name}")
                };
                if summary.is_directory && visited.insert(summary.extent) {
                    subdirectories.push((summary.extent, path.clone()));
                }
                entries.push(IsoEntry {
                    path,
                    size: summary.size,
                    is_directory: summary.is_directory,
                    recorded: summary.recorded,
                    created: summary.created,
                    modified: summary.modified,
                    accessed: summary.accessed,
                });
            }
            pending.extend(subdirectories.into_iter().rev());
        }
        Ok(entries)
    }
}
