//! Knobs shared by every format parser

use bon::Builder;

/// Options for how an input should be parsed
///
/// ```
/// use strata_core::ParseOptions;
///
/// let options = ParseOptions::builder().max_entries(100).strict(true).build();
/// assert_eq!(options.max_entries, Some(100));
/// assert_eq!(options.max_depth, 64);
/// ```
#[derive(Debug, Clone, Copy, Builder)]
pub struct ParseOptions {
    /// Stop listing entries after this many
    pub max_entries: Option<usize>,

    /// How many bytes to scan when searching for an embedded signature
    #[builder(default = 1024 * 1024)]
    pub search_limit: u64,

    /// How deep nested directories are followed
    #[builder(default = 64)]
    pub max_depth: usize,

    /// Fail on the first malformed entry instead of skipping it with a warning
    #[builder(default)]
    pub strict: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}
