//! Errors raised while walking or restoring a disk tree (spec.md §4.6).

use thiserror::Error;

/// The severity a disk-walker operation resolves to, mirroring
/// [`polyarc_format::ReadSeverity`] one layer up (spec.md §7): ascent
/// failures are fatal to the whole traversal, descent failures only drop
/// the one subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskSeverity {
    /// Proceed normally.
    Ok,
    /// The current entry/subtree is skipped; traversal continues.
    Failed,
    /// Traversal cannot continue safely.
    Fatal,
}

/// Errors raised by [`crate::tree::DiskWalker`].
#[derive(Debug, Error)]
pub enum DiskError {
    /// Underlying I/O failure (stat, open, chdir, ...).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Opening a directory stream failed (spec.md §4.6: "if that fails,
    /// ascend and pop, return `TREE_ERROR_DIR`"). Non-fatal.
    #[error("could not open directory {path}: {source}")]
    OpenDir {
        /// Path that failed to open.
        path: std::path::PathBuf,
        /// Underlying cause.
        #[source]
        source: std::io::Error,
    },

    /// Ascending out of a directory (chdir `..` or fchdir to the parent)
    /// failed. Fatal: the walker can no longer trust its notion of the
    /// current working directory.
    #[error("could not ascend out of {path}: {source}")]
    Ascend {
        /// Directory the walker was ascending out of.
        path: std::path::PathBuf,
        /// Underlying cause.
        #[source]
        source: std::io::Error,
    },
}

impl DiskError {
    /// The severity this error resolves to.
    pub fn severity(&self) -> DiskSeverity {
        match self {
            DiskError::Io(_) | DiskError::OpenDir { .. } => DiskSeverity::Failed,
            DiskError::Ascend { .. } => DiskSeverity::Fatal,
        }
    }
}

/// Result type for disk-walker operations.
pub type DiskResult<T> = Result<T, DiskError>;
