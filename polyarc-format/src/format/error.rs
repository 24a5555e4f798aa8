//! Format-layer errors and the severity ladder (spec.md §7).

use thiserror::Error;

/// The six-way severity ladder every format/filter operation resolves to.
/// Carried as an explicit value rather than encoded in the error variant
/// alone, so callers (notably the handle state machine in `polyarc`) can
/// switch on it without matching every concrete error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadSeverity {
    /// Success; proceed.
    Ok,
    /// Data recovered but with lost fidelity. Same operation returns Ok
    /// next call; handle state is unchanged.
    Warn,
    /// Transient filter-level condition; caller may retry the same call.
    Retry,
    /// Current entry/operation cannot proceed, but the handle is usable
    /// for the next entry.
    Failed,
    /// Natural end; terminal for the direction.
    Eof,
    /// Handle is wedged. Only `close`/`free` are legal afterward.
    Fatal,
}

/// Errors raised while parsing or producing a format's container stream.
#[derive(Debug, Error)]
pub enum FormatError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No registered bidder recognized the stream.
    #[error("unrecognized archive format")]
    Unrecognized,

    /// The container is structurally invalid in a way readers cannot
    /// recover from (bad signature, truncated fixed header, sentinel
    /// folder index presented on single-volume input, ...).
    #[error("malformed {format} container: {reason}")]
    Malformed {
        /// Format name (`"zip"`, `"cab"`, `"rar"`).
        format: &'static str,
        /// Human-readable detail.
        reason: String,
    },

    /// A compression/coding method is recognized but not implemented
    /// (e.g. CAB Quantum/LZX, RAR PPMd).
    ///
    /// `fatal` distinguishes the ZIP length-at-end case (spec.md §4.2:
    /// an unsupported method with sizes known only from the trailing
    /// descriptor makes the entry unskippable) from the ordinary
    /// known-size case, which only warns and skips.
    #[error("{format} method {method} not supported")]
    UnsupportedMethod {
        /// Format name.
        format: &'static str,
        /// Method identifier as the wire format names it.
        method: String,
        /// Whether this occurrence is unrecoverable for the handle.
        fatal: bool,
    },

    /// Password-protected or otherwise encrypted entry.
    #[error("encryption not supported")]
    Encrypted,

    /// A multi-volume archive or continuation record was presented where
    /// only single-volume input is supported.
    #[error("{format} multi-volume archives are not supported: {reason}")]
    MultiVolume {
        /// Format name.
        format: &'static str,
        /// Human-readable detail.
        reason: String,
    },

    /// CRC or other checksum mismatch (non-fatal by default).
    #[error("checksum mismatch in {context}: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// Where the mismatch was found (e.g. `"zip entry helloworld.txt"`).
        context: String,
        /// Declared checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// Declared and observed sizes disagree at end-of-entry.
    #[error("size mismatch in {context}: expected {expected}, got {actual}")]
    SizeMismatch {
        /// Where the mismatch was found.
        context: String,
        /// Declared size.
        expected: u64,
        /// Observed size.
        actual: u64,
    },

    /// Charset conversion failure surfaced from [`crate::string`].
    #[error(transparent)]
    String(#[from] crate::string::StringError),

    /// A filter-chain failure surfaced from [`crate::iostream`].
    #[error(transparent)]
    Filter(#[from] crate::iostream::FilterError),
}

impl FormatError {
    /// The severity this error resolves to per spec.md §7's mapping table.
    pub fn severity(&self) -> ReadSeverity {
        match self {
            FormatError::Unrecognized => ReadSeverity::Fatal,
            FormatError::Encrypted => ReadSeverity::Fatal,
            FormatError::Malformed { .. } => ReadSeverity::Fatal,
            FormatError::MultiVolume { .. } => ReadSeverity::Warn,
            FormatError::UnsupportedMethod { fatal, .. } => {
                if *fatal {
                    ReadSeverity::Fatal
                } else {
                    ReadSeverity::Warn
                }
            }
            FormatError::ChecksumMismatch { .. } => ReadSeverity::Warn,
            FormatError::SizeMismatch { .. } => ReadSeverity::Warn,
            FormatError::String(_) => ReadSeverity::Warn,
            FormatError::Filter(crate::iostream::FilterError::Retry(_)) => ReadSeverity::Retry,
            FormatError::Filter(_) => ReadSeverity::Fatal,
            FormatError::Io(_) => ReadSeverity::Fatal,
        }
    }
}

/// Result type for format operations.
pub type FormatResult<T> = Result<T, FormatError>;
