//! The format-neutral entry data model (spec.md §3 "Entry").

use crate::string::MultiString;

/// What kind of filesystem object an [`Entry`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// A regular file with a byte payload.
    Regular,
    /// A directory; size is ignored by writers.
    Directory,
    /// A symbolic link; the target is in [`Entry::link_target`].
    Symlink,
    /// A reference to an already-seen entry's content
    /// ([`Entry::hardlink_target`] names it).
    HardlinkReference,
    /// Character-special device.
    CharDevice,
    /// Block-special device.
    BlockDevice,
    /// Named pipe (FIFO).
    Fifo,
    /// Unix domain socket.
    Socket,
}

/// A timestamp with tri-state fidelity: a field can be entirely unset
/// (`None` at the `Entry` level), seconds-only, or seconds-plus-nanos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// Seconds since the Unix epoch.
    pub seconds: i64,
    /// Sub-second nanoseconds, if the source format carried that
    /// precision. `None` means "seconds only".
    pub nanos: Option<u32>,
}

impl Timestamp {
    /// Construct a seconds-only timestamp.
    pub fn from_seconds(seconds: i64) -> Self {
        Self {
            seconds,
            nanos: None,
        }
    }

    /// Construct a full-precision timestamp.
    pub fn new(seconds: i64, nanos: u32) -> Self {
        Self {
            seconds,
            nanos: Some(nanos),
        }
    }

    /// Total nanoseconds since the epoch, for strict ordering comparisons
    /// (spec.md §4.7's matcher predicates operate at this granularity).
    pub fn as_nanos(&self) -> i128 {
        i128::from(self.seconds) * 1_000_000_000 + i128::from(self.nanos.unwrap_or(0))
    }
}

/// A single archived object: path, type, ownership, timestamps, and
/// (for regular files) an associated data stream accessed separately
/// through the codec's data-read operations.
#[derive(Debug, Default)]
pub struct Entry {
    /// Archive-internal path.
    pub path: MultiString,
    /// Path on disk, when the entry originated from (or is destined for)
    /// a disk source/sink.
    pub source_path: Option<std::path::PathBuf>,
    /// Object kind.
    pub filetype: Option<FileType>,
    /// POSIX-style permission and type bits.
    pub mode: u16,
    /// Owning user id.
    pub uid: u32,
    /// Owning group id.
    pub gid: u32,
    /// Owning user name, if known.
    pub uname: Option<MultiString>,
    /// Owning group name, if known.
    pub gname: Option<MultiString>,
    /// Byte size of the payload (regular files only).
    pub size: u64,
    /// Modification time.
    pub mtime: Option<Timestamp>,
    /// Access time.
    pub atime: Option<Timestamp>,
    /// Inode-change time.
    pub ctime: Option<Timestamp>,
    /// Creation time, where the source format/platform records one.
    pub birthtime: Option<Timestamp>,
    /// Hard link count.
    pub nlink: u64,
    /// Device id of the filesystem the entry resides on.
    pub dev: u64,
    /// Inode number.
    pub ino: u64,
    /// Device id encoded by the entry itself (for device-special files).
    pub rdev: u64,
    /// Symlink target, for [`FileType::Symlink`] entries.
    pub link_target: Option<MultiString>,
    /// Path of the entry this one hardlinks to, for
    /// [`FileType::HardlinkReference`] entries.
    pub hardlink_target: Option<MultiString>,
    /// Set on read when the codec detected the entry's payload is
    /// encrypted (read-side only; writers never set this).
    pub encrypted: bool,
}

impl Entry {
    /// A blank entry with no fields populated, as returned before the
    /// first successful `next_header`.
    pub fn new() -> Self {
        Self::default()
    }

    /// True unless `filetype` is [`FileType::Regular`] and `size` is
    /// nonzero is meaningless (spec.md §3's invariant: "if filetype is
    /// not regular, size is either 0 or ignored").
    pub fn size_is_meaningful(&self) -> bool {
        matches!(self.filetype, Some(FileType::Regular))
    }
}
