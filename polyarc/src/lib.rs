//! The public archive handle for the polyarc engine.
//!
//! This crate is the top layer described in spec.md §3/§6: a handle that
//! wraps the format bid contest and filter chain from `polyarc-format`
//! and the disk tree walker from `polyarc-disk` behind one lifecycle
//! state machine, plus the entry matcher from spec.md §4.7.
//!
//! - [`handle`] — [`handle::ArchiveReader`], [`handle::ArchiveWriter`],
//!   [`handle::DiskSource`], [`handle::DiskSink`].
//! - [`matcher`] — time/name predicate combinators.
//! - [`error`] — the handle-level error type and severity ladder.

#![warn(missing_docs)]

pub mod error;
pub mod handle;
pub mod matcher;

pub use error::{HandleError, HandleResult, Severity};
pub use handle::{ArchiveReader, ArchiveWriter, DiskSink, DiskSource, HandleState};
pub use matcher::{Matcher, NamePredicate};

pub use polyarc_disk::{DiskWalkerOptions, SymlinkMode};
pub use polyarc_format::{Entry, FileType, Timestamp};
