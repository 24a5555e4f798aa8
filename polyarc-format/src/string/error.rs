//! Error types for string buffer and charset conversion.

use thiserror::Error;

/// Errors raised by the string/charset core.
#[derive(Debug, Error)]
pub enum StringError {
    /// Allocation failed while growing a buffer; capacity was reset to zero.
    #[error("allocation failed while growing buffer to {requested} bytes")]
    AllocationFailed {
        /// The capacity that was requested when the failure occurred.
        requested: usize,
    },

    /// A byte sequence could not be converted under the named charset.
    #[error("charset conversion failed for {charset}: {reason}")]
    ConversionFailed {
        /// Name of the charset involved (e.g. "UTF-8", the current locale name).
        charset: String,
        /// Human-readable detail.
        reason: String,
    },

    /// An unpaired UTF-16 surrogate was encountered during decode.
    #[error("unpaired UTF-16 surrogate at index {index}")]
    UnpairedSurrogate {
        /// Index (in UTF-16 code units) of the offending surrogate.
        index: usize,
    },
}

/// Result type for string/charset operations.
pub type StringResult<T> = Result<T, StringError>;
