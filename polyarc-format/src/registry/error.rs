//! Registry-level errors.

use thiserror::Error;

use crate::format::FormatError;

/// Errors raised while running the bid contest.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Underlying I/O failure while buffering the read-ahead prefix.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No registered bidder recognized the stream (spec.md §4.1 point 4).
    #[error("unrecognized archive format")]
    Unrecognized,

    /// A seek bidder won the contest but failed while pre-reading its
    /// structures (e.g. a seekable ZIP winner whose central directory
    /// turned out to be malformed).
    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
