//! Error types for the filter chain.

use thiserror::Error;

/// Errors raised while building or driving a filter chain.
#[derive(Debug, Error)]
pub enum FilterError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A filter recognized its framing but does not implement decoding.
    ///
    /// This mirrors libarchive shipping a filter bidder for a format it
    /// was not compiled with codec support for: the bid contest still
    /// works, the stream just can't be opened.
    #[error("filter '{0}' recognized but not supported by this build")]
    Unsupported(&'static str),

    /// Deflate/zlib stream error.
    #[error("deflate error: {0}")]
    Deflate(String),

    /// A transient condition; the same call may be retried.
    #[error("transient filter condition: {0}")]
    Retry(String),
}

/// Result type for filter operations.
pub type FilterResult<T> = Result<T, FilterError>;
