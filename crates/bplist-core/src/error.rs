//! Error types for the bplist-core library.
//!
//! Structural problems in a binary property list all surface as
//! [`Error::InvalidPlist`] with the byte offset where they were detected.
//! A signature mismatch is reported separately as [`Error::NotBinary`] so the
//! top-level API can retry with a text-format parser.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bplist operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by a text-format collaborator
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error type for all bplist operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The input does not start with the `bplist0` signature
    #[error("not a binary property list: missing 'bplist0' signature")]
    NotBinary,

    /// Structural violation in a binary property list
    #[error("invalid binary plist at offset {offset}: {details}")]
    InvalidPlist {
        /// Byte offset where the problem was detected
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// The text-format fallback parser rejected the input
    #[error("invalid property list: not binary, and text parsing failed: {0}")]
    TextParse(#[source] BoxError),

    /// The text-format writer could not serialize the value
    #[error("failed to write text property list: {0}")]
    TextWrite(#[source] BoxError),

    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Failed to write output file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        /// Path to the file that failed to write
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// I/O failure on a caller-provided stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a new structural error at the given offset
    pub fn invalid(offset: usize, details: impl Into<String>) -> Self {
        Self::InvalidPlist {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new file write error
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileWrite {
            path: path.into(),
            source,
        }
    }

    /// Returns true if the input was rejected only because of its signature
    pub fn is_not_binary(&self) -> bool {
        matches!(self, Self::NotBinary)
    }

    /// Returns true if the input was read but is not a valid property list
    pub fn is_invalid(&self) -> bool {
        matches!(self, Self::InvalidPlist { .. } | Self::TextParse(_))
    }
}
