//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

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

    /// file is not an ISO 9660 image
    #[error("file is not an ISO 9660 image")]
    #[diagnostic(help("the volume descriptor `\\x01CD001` is expected at byte 32768"))]
    InvalidImage,

    /// the volume descriptor set has no primary volume descriptor
    #[error("image has no primary volume descriptor")]
    MissingPrimaryVolume,

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
