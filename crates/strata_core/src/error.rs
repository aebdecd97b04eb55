//! Error types that can be emitted from the field tree engine

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent wrapper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// a read ran past the end of the input
    #[error("input truncated: wanted {width} bits at bit {address}, only {available} bits available")]
    #[diagnostic(code(strata::truncated))]
    Truncated {
        /// bit address of the attempted read
        address: u64,
        /// bit width of the attempted read
        width: u64,
        /// total number of bits in the stream
        available: u64,
    },

    /// integer reads are limited to 1..=64 bits
    #[error("invalid read width of {0} bits")]
    InvalidWidth(u32),

    /// byte-level access was attempted on a bit address that is not a multiple of 8
    #[error("byte access at unaligned bit address {0}")]
    Unaligned(u64),

    /// the data contradicts the structure the grammar expects
    #[error("{path}: {reason}")]
    #[diagnostic(code(strata::structure))]
    Structure {
        /// name of the field set that rejected the data
        path: String,
        /// what was wrong
        reason: String,
    },

    /// a grammar asked for a sibling field it has not produced yet
    #[error("{path}: `{name}` was read before it was produced")]
    #[diagnostic(code(strata::forward_reference), help("produce fields before reading them back"))]
    ForwardReference {
        /// field set that is being produced
        path: String,
        /// name that was requested
        name: String,
    },

    /// production of this field set already stopped on an error
    #[error("{path}: production stopped early: {reason}")]
    #[diagnostic(code(strata::incomplete))]
    Incomplete {
        /// field set whose production failed
        path: String,
        /// message of the original failure
        reason: String,
    },

    /// a child would extend past the declared size of its parent
    #[error("{path}: `{name}` ends at bit {end}, past the declared size of {size} bits")]
    SizeExceeded {
        /// parent field set
        path: String,
        /// refused child
        name: String,
        /// end of the refused child, relative to the parent
        end: u64,
        /// declared size of the parent
        size: u64,
    },

    /// two fields with the same name were added to one field set
    #[error("{path}: duplicate field `{name}`")]
    DuplicateField {
        /// field set being produced
        path: String,
        /// name that already exists
        name: String,
    },

    /// path lookup did not resolve to a node
    #[error("field not found: {0}")]
    FieldNotFound(String),

    /// node exists but does not hold the requested kind of value
    #[error("{path}: expected {expected}")]
    WrongType {
        /// path that was looked up
        path: String,
        /// kind of value the caller asked for
        expected: &'static str,
    },

    /// no registered format accepted the input
    #[error("no registered format accepts this input")]
    #[diagnostic(code(strata::unknown_format))]
    UnknownFormat,

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

impl Error {
    /// Build a [`Error::Structure`] for the field set at `path`
    pub fn structure(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Structure {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error was caused by running out of input
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;
