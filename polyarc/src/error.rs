//! The handle-level error type and severity ladder (spec.md §7).

use thiserror::Error;

/// The six-way severity ladder from spec.md §7, shared by every layer
/// this crate composes. `Retry`/`Warn`/`Failed` don't latch the handle;
/// `Fatal` does (spec.md §7 "Propagation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Success; proceed.
    Ok,
    /// Data recovered but with lost fidelity; same call returns Ok next
    /// time, handle state is unchanged.
    Warn,
    /// Transient filter-level condition; caller may retry the same call.
    Retry,
    /// Current entry/operation cannot proceed; handle is usable for the
    /// next entry.
    Failed,
    /// Natural end; terminal for the direction.
    Eof,
    /// Handle is wedged; only `close`/`free` are legal afterward.
    Fatal,
}

/// Errors surfaced by [`crate::handle::ArchiveReader`] /
/// [`crate::handle::ArchiveWriter`].
#[derive(Debug, Error)]
pub enum HandleError {
    /// The requested operation is not legal in the handle's current
    /// lifecycle state (spec.md §6's state machine).
    #[error("operation '{op}' is not legal in state {state:?}")]
    IllegalState {
        /// Name of the attempted operation.
        op: &'static str,
        /// The state the handle was in.
        state: crate::handle::HandleState,
    },

    /// No registered bidder recognized the stream (spec.md §4.1 point 4).
    #[error("unrecognized archive format")]
    Unrecognized,

    /// Propagated from the format/filter layer.
    #[error(transparent)]
    Format(#[from] polyarc_format::format::FormatError),

    /// Propagated from the filter-chain layer.
    #[error(transparent)]
    Filter(#[from] polyarc_format::iostream::FilterError),

    /// Propagated from the registry's bid contest.
    #[error(transparent)]
    Registry(#[from] polyarc_format::registry::RegistryError),

    /// Propagated from the disk source/sink.
    #[error(transparent)]
    Disk(#[from] polyarc_disk::DiskError),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Charset conversion failure surfaced while decoding an entry path.
    #[error(transparent)]
    String(#[from] polyarc_format::string::StringError),
}

impl HandleError {
    /// The severity this error resolves to.
    pub fn severity(&self) -> Severity {
        match self {
            HandleError::IllegalState { .. } => Severity::Fatal,
            HandleError::Unrecognized => Severity::Fatal,
            HandleError::Format(e) => match e.severity() {
                polyarc_format::ReadSeverity::Ok => Severity::Ok,
                polyarc_format::ReadSeverity::Warn => Severity::Warn,
                polyarc_format::ReadSeverity::Retry => Severity::Retry,
                polyarc_format::ReadSeverity::Failed => Severity::Failed,
                polyarc_format::ReadSeverity::Eof => Severity::Eof,
                polyarc_format::ReadSeverity::Fatal => Severity::Fatal,
            },
            HandleError::Filter(_) | HandleError::Registry(_) | HandleError::Io(_) => {
                Severity::Fatal
            }
            HandleError::String(_) => Severity::Warn,
            HandleError::Disk(e) => match e.severity() {
                polyarc_disk::DiskSeverity::Ok => Severity::Ok,
                polyarc_disk::DiskSeverity::Failed => Severity::Failed,
                polyarc_disk::DiskSeverity::Fatal => Severity::Fatal,
            },
        }
    }
}

/// Result type for handle operations.
pub type HandleResult<T> = Result<T, HandleError>;
