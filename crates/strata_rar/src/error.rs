//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

use crate::types::RarVariant;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent wrapper for [`strata_core::Error`]
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] strata_core::Error),

    /// Transparent wrapper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// file is an invalid rar archive
    #[error("file is an invalid rar archive")]
    InvalidArchive,

    /// the archive uses a format generation that is only recognized, not modeled
    #[error("{0} archives are recognized but not supported")]
    #[diagnostic(help("only the RAR 1.5 to 4.x block format is walked"))]
    UnsupportedVariant(RarVariant),

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
