//! Formats known to the command line tool

use miette::{Context, IntoDiagnostic, Result};
use std::{fs::File, path::Path};
use strata_core::{BitStream, FormatRegistry};

/// Every supported format, in detection order
pub fn registry() -> FormatRegistry {
    FormatRegistry::new()
        .with(strata_rar::FORMAT)
        .with(strata_iso::FORMAT)
}

/// Read a whole file into a stream
pub fn open(path: &Path) -> Result<BitStream> {
    let file = File::open(path)
        .into_diagnostic()
        .context(format!("path: {}", path.display()))?;
    BitStream::from_reader(file)
        .into_diagnostic()
        .context(format!("reading {}", path.display()))
}
