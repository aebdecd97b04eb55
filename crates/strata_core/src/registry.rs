//! Format descriptors and detection
//!
//! Every format crate exports one [`FormatDescriptor`]: identity, magic signatures, a minimum
//! size, a validator that is allowed to look deeper than the magic, and a constructor for the
//! root [`FieldSet`]. A [`FormatRegistry`] holds them in priority order and hands an input to the
//! first descriptor that accepts it.

use tracing::{debug, instrument};

use crate::{
    error::{Error, Result},
    field_set::FieldSet,
    options::ParseOptions,
    stream::BitStream,
};

/// Deep check of an input; `Err` carries the reason it was rejected
pub type Validator = fn(&BitStream) -> core::result::Result<(), String>;

/// Builds the root field set of an accepted input
pub type RootParser = fn(BitStream, &ParseOptions) -> Result<FieldSet>;

/// Byte pattern expected at a fixed bit offset
#[derive(Debug, Copy, Clone)]
pub struct Magic {
    /// Expected bytes
    pub pattern: &'static [u8],
    /// Bit offset of the first byte
    pub bit_offset: u64,
}

impl Magic {
    /// Whether `stream` holds the pattern at the offset
    pub fn matches(&self, stream: &BitStream) -> bool {
        stream
            .read_aligned(self.bit_offset, self.pattern.len() as u64 * 8)
            .is_ok_and(|bytes| bytes == self.pattern)
    }
}

/// Identity and entry points of one format
#[derive(Debug, Copy, Clone)]
pub struct FormatDescriptor {
    /// Short identifier, such as `rar`
    pub id: &'static str,
    /// Category, such as `archive` or `file_system`
    pub category: &'static str,
    /// Human readable name
    pub description: &'static str,
    /// Usual file extensions, without the dot
    pub extensions: &'static [&'static str],
    /// MIME types
    pub mime: &'static [&'static str],
    /// Alternative signatures; one of them must match
    pub magic: &'static [Magic],
    /// Smallest accepted input, in bits
    pub min_size_bits: u64,
    /// Deep validation run after the magic matched
    pub validate: Validator,
    /// Root constructor
    pub parse: RootParser,
}

impl FormatDescriptor {
    /// Run the size, magic and validator checks against `stream`
    pub fn check(&self, stream: &BitStream) -> core::result::Result<(), String> {
        if stream.len_bits() < self.min_size_bits {
            return Err(format!(
                "input of {} bits is smaller than the minimum of {} bits",
                stream.len_bits(),
                self.min_size_bits
            ));
        }
        if !self.magic.is_empty() && !self.magic.iter().any(|magic| magic.matches(stream)) {
            return Err("no signature matched".into());
        }
        (self.validate)(stream)
    }

    /// Whether `path` ends with one of the extensions of this format
    pub fn matches_extension(&self, path: &str) -> bool {
        path.rsplit_once('.').is_some_and(|(_, extension)| {
            self.extensions
                .iter()
                .any(|known| known.eq_ignore_ascii_case(extension))
        })
    }
}

/// Ordered collection of formats
#[derive(Debug, Default, Clone)]
pub struct FormatRegistry {
    formats: Vec<FormatDescriptor>,
}

impl FormatRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a format; earlier registrations win ties
    pub fn register(&mut self, format: FormatDescriptor) -> &mut Self {
        self.formats.push(format);
        self
    }

    /// Builder form of [`FormatRegistry::register`]
    pub fn with(mut self, format: FormatDescriptor) -> Self {
        self.register(format);
        self
    }

    /// Registered formats in priority order
    pub fn formats(&self) -> impl Iterator<Item = &FormatDescriptor> {
        self.formats.iter()
    }

    /// Format with the given identifier
    pub fn by_id(&self, id: &str) -> Option<&FormatDescriptor> {
        self.formats.iter().find(|format| format.id == id)
    }

    /// Verdict of every registered format on `stream`
    pub fn explain(
        &self,
        stream: &BitStream,
    ) -> Vec<(&FormatDescriptor, core::result::Result<(), String>)> {
        self.formats
            .iter()
            .map(|format| (format, format.check(stream)))
            .collect()
    }

    /// First format that accepts `stream`
    pub fn detect(&self, stream: &BitStream) -> Option<&FormatDescriptor> {
        self.formats.iter().find(|format| match format.check(stream) {
            Ok(()) => true,
            Err(reason) => {
                debug!(format = format.id, "rejected: {reason}");
                false
            }
        })
    }

    /// Detect the format of `stream` and build its root field set
    #[instrument(skip_all, err, fields(size = stream.len_bytes()))]
    pub fn parse(
        &self,
        stream: BitStream,
        options: &ParseOptions,
    ) -> Result<(&FormatDescriptor, FieldSet)> {
        let format = self.detect(&stream).ok_or(Error::UnknownFormat)?;
        debug!(format = format.id, "detected");
        let root = (format.parse)(stream, options)?;
        Ok((format, root))
    }
}
