//! Layer 3': the chdir-based disk tree walker for the polyarc archive
//! engine (spec.md §3 "Tree entry"/"Filesystem record", §4.6, §5).
//!
//! This crate is the "read-from-disk" source's traversal core: three-visit
//! ordering (regular / post-descent / post-ascent), opt-in descent,
//! symlink modes L/P/H, filesystem-boundary identity, and atime
//! restoration. It produces the same [`polyarc_format::Entry`] value the
//! format codecs do, so the public handle in `polyarc` can treat a disk
//! source and an archive reader uniformly.

#![warn(missing_docs)]

pub mod entry;
pub mod error;
pub mod fsid;
pub mod platform;
pub mod tree;

pub use error::{DiskError, DiskResult, DiskSeverity};
pub use platform::{has_nodump_attr, restore_times};
pub use tree::{DiskWalker, DiskWalkerOptions, SymlinkMode, VisitKind};
