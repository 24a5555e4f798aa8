//! Layer 5: the public archive handle (spec.md §3 "Archive handle",
//! §6 "Public handle API").
//!
//! Four concrete handles share the lifecycle state machine described in
//! spec.md §6 (`NEW -> HEADER -> DATA -> ... -> CLOSED`):
//! [`ArchiveReader`] (format codecs via the bid contest),
//! [`ArchiveWriter`] (currently backed by the ZIP writer),
//! [`DiskSource`] (the tree walker as a header/data producer), and
//! [`DiskSink`] (restore-to-disk). None of them implement a shared Rust
//! trait for the state machine itself — spec.md §9 treats the format
//! registry as the right place for dynamic dispatch (a capability-set
//! vector), not the handle, which has exactly one concrete shape per
//! construction path (`new_reader`/`new_writer`/`new_disk_source`/
//! `new_disk_sink`) and never needs to swap shapes at runtime.

use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use polyarc_disk::{DiskWalker, DiskWalkerOptions, SymlinkMode, VisitKind};
use polyarc_format::format::zip::{WriteMethod, ZipWriter};
use polyarc_format::iostream::FilterBidder;
use polyarc_format::registry::{Bidder, ReadSeek};
use polyarc_format::string::CharsetConverter;
use polyarc_format::{Entry, FileType, FormatReader, FormatRegistry};

/// The raw, not-yet-format-identified source an `ArchiveReader` was opened
/// on. `File` and `Memory` are naturally seek-capable (spec.md §4.2
/// "Bidding — seekable": the seekable ZIP reader needs random access to
/// the end-of-central-directory record), so [`ArchiveReader::ensure_format_selected`]
/// tries the seek-aware contest first when one of those variants is
/// underneath; `Reader` wraps an arbitrary caller-supplied `Read` that
/// only ever goes through the forward-scan contest.
enum RawInput {
    File(File),
    Memory(Cursor<Vec<u8>>),
    Reader(Box<dyn Read + Send>),
}

impl RawInput {
    fn as_read_seek(&mut self) -> Option<&mut dyn ReadSeek> {
        match self {
            RawInput::File(f) => Some(f),
            RawInput::Memory(c) => Some(c),
            RawInput::Reader(_) => None,
        }
    }
}

impl Read for RawInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            RawInput::File(f) => f.read(buf),
            RawInput::Memory(c) => c.read(buf),
            RawInput::Reader(r) => r.read(buf),
        }
    }
}

fn peek_prefix(source: &mut dyn ReadSeek, len: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    let mut total = 0;
    while total < buf.len() {
        let n = source.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    buf.truncate(total);
    source.seek(SeekFrom::Start(0))?;
    Ok(buf)
}

use crate::error::{HandleError, HandleResult};
use crate::matcher::Matcher;

/// The lifecycle state every handle in this crate moves through
/// (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Just constructed; registration calls are legal, I/O calls are not.
    New,
    /// Opened; a header read is expected next.
    Header,
    /// A header was read; data reads refer to that entry's payload.
    Data,
    /// Natural end of the archive/tree.
    Eof,
    /// Unrecoverable; only `close`/`free` are legal.
    Fatal,
    /// Closed; no operation is legal except a second `free`.
    Closed,
}

fn require(state: HandleState, allowed: &[HandleState], op: &'static str) -> HandleResult<()> {
    if allowed.contains(&state) {
        Ok(())
    } else {
        Err(HandleError::IllegalState { op, state })
    }
}

/// Reads entries out of a registered-format archive stream (spec.md
/// §4.1-§4.5 combined behind the handle described in §6).
pub struct ArchiveReader {
    state: HandleState,
    registry: FormatRegistry,
    filter_bidders: Vec<Box<dyn FilterBidder>>,
    raw: Option<RawInput>,
    source: Option<Box<dyn Read + Send>>,
    format: Option<Box<dyn FormatReader>>,
    matcher: Option<Matcher>,
    conv: CharsetConverter,
    current_path: String,
}

impl ArchiveReader {
    /// A reader in state [`HandleState::New`] with the full default
    /// format/filter bidder set registered (spec.md §6:
    /// `support_format_*`/`support_filter_*` are legal in `NEW`, so a
    /// caller may still add or replace bidders before `open_*`).
    pub fn new() -> Self {
        let mut registry = FormatRegistry::new();
        for bidder in polyarc_format::default_format_bidders() {
            registry.register(bidder);
        }
        for bidder in polyarc_format::default_seek_bidders() {
            registry.register_seekable(bidder);
        }
        Self {
            state: HandleState::New,
            registry,
            filter_bidders: polyarc_format::default_filter_bidders(),
            raw: None,
            source: None,
            format: None,
            matcher: None,
            conv: CharsetConverter::default(),
            current_path: String::new(),
        }
    }

    /// Register an additional format bidder. Legal only in
    /// [`HandleState::New`].
    pub fn support_format(&mut self, bidder: Box<dyn Bidder>) -> HandleResult<()> {
        require(self.state, &[HandleState::New], "support_format")?;
        self.registry.register(bidder);
        Ok(())
    }

    /// Register an additional filter bidder. Legal only in
    /// [`HandleState::New`].
    pub fn support_filter(&mut self, bidder: Box<dyn FilterBidder>) -> HandleResult<()> {
        require(self.state, &[HandleState::New], "support_filter")?;
        self.filter_bidders.push(bidder);
        Ok(())
    }

    /// Install a matcher; excluded entries are silently skipped by
    /// [`ArchiveReader::next_header`].
    pub fn set_matcher(&mut self, matcher: Matcher) -> HandleResult<()> {
        require(self.state, &[HandleState::New], "set_matcher")?;
        self.matcher = Some(matcher);
        Ok(())
    }

    fn open_source(&mut self, source: RawInput) -> HandleResult<()> {
        require(self.state, &[HandleState::New], "open")?;
        self.raw = Some(source);
        self.state = HandleState::Header;
        Ok(())
    }

    /// Open a file by path (spec.md §6 `open_filename`).
    pub fn open_filename(&mut self, path: impl AsRef<Path>) -> HandleResult<()> {
        let file = File::open(path)?;
        self.open_source(RawInput::File(file))
    }

    /// Open an in-memory buffer (spec.md §6 `open_memory`).
    pub fn open_memory(&mut self, buf: Vec<u8>) -> HandleResult<()> {
        self.open_source(RawInput::Memory(Cursor::new(buf)))
    }

    /// Open an arbitrary caller-supplied `Read` (spec.md §6's
    /// `open`/callback-contract family, minus the raw fd/callback
    /// triple — any `Read + Send` satisfies the same contract in Rust).
    /// Unlike `open_filename`/`open_memory`, this source is never tried
    /// against the seek-capable bid contest since an arbitrary `Read`
    /// offers no random access.
    pub fn open_reader(&mut self, reader: impl Read + Send + 'static) -> HandleResult<()> {
        self.open_source(RawInput::Reader(Box::new(reader)))
    }

    /// Try the seek-capable bid contest on a naturally seek-capable raw
    /// source, ahead of the ordinary forward-scan path (spec.md §4.2
    /// "Bidding — seekable"). Declines (returning `Ok(false)`) whenever a
    /// byte-level filter claims the prefix first, since a filter's
    /// decoded output no longer maps to the raw source's offsets.
    fn try_seekable(&mut self, raw: &mut RawInput) -> HandleResult<bool> {
        let Some(seekable) = raw.as_read_seek() else {
            return Ok(false);
        };
        let prefix = peek_prefix(seekable, polyarc_format::iostream::BID_PREFIX_LEN)?;
        let filter_claimed = self.filter_bidders.iter().any(|b| b.bid(&prefix).is_some());
        if filter_claimed {
            return Ok(false);
        }
        match self.registry.contest_seekable(seekable) {
            Ok(format_reader) => {
                debug!(format = format_reader.name(), "seekable format bid won");
                self.format = Some(format_reader);
                Ok(true)
            }
            Err(e) => {
                debug!(error = %e, "seekable contest declined, falling back to forward scan");
                seekable.seek(SeekFrom::Start(0))?;
                Ok(false)
            }
        }
    }

    fn ensure_format_selected(&mut self) -> HandleResult<()> {
        if self.format.is_some() {
            return Ok(());
        }
        let mut raw = self.raw.take().expect("Header state implies a source");

        if self.try_seekable(&mut raw)? {
            self.source = Some(Box::new(raw));
            return Ok(());
        }

        let boxed: Box<dyn Read + Send> = Box::new(raw);
        let (decoded, filters) = polyarc_format::iostream::push_filters(boxed, &self.filter_bidders)?;
        debug!(filters = ?filters.iter().map(|f| f.name).collect::<Vec<_>>(), "filter chain");

        let mut peekable = decoded;
        let (format_reader, prefix) = self.registry.contest(&mut *peekable)?;
        debug!(format = format_reader.name(), "format bid won");
        let chained: Box<dyn Read + Send> = Box::new(Cursor::new(prefix).chain(peekable));
        self.source = Some(chained);
        self.format = Some(format_reader);
        Ok(())
    }

    /// Parse the next entry header (spec.md §6 `next_header`):
    /// `HEADER`/`DATA` -> (skipping unread payload) -> `HEADER` ->
    /// `DATA` on success, `EOF`/`FATAL` on end/error. Entries excluded by
    /// an installed [`Matcher`] are skipped transparently.
    pub fn next_header(&mut self) -> HandleResult<Option<Entry>> {
        require(
            self.state,
            &[HandleState::Header, HandleState::Data],
            "next_header",
        )?;

        loop {
            if let Err(e) = self.ensure_format_selected() {
                self.state = HandleState::Fatal;
                return Err(e);
            }
            let format = self.format.as_mut().unwrap();
            let source = self.source.as_mut().unwrap();

            match format.next_header(source.as_mut()) {
                Ok(Some(mut entry)) => {
                    let path = entry.path.as_utf8(&mut self.conv)?.to_string();
                    self.current_path = path.clone();
                    if let Some(matcher) = &self.matcher {
                        if matcher.excludes(&entry, &path) {
                            format.read_data_skip(source.as_mut())?;
                            continue;
                        }
                    }
                    self.state = HandleState::Data;
                    return Ok(Some(entry));
                }
                Ok(None) => {
                    self.state = HandleState::Eof;
                    return Ok(None);
                }
                Err(e) => {
                    let severity = e.severity();
                    if severity == polyarc_format::ReadSeverity::Fatal {
                        self.state = HandleState::Fatal;
                    }
                    return Err(e.into());
                }
            }
        }
    }

    /// Read the next chunk of the current entry's payload (spec.md §6
    /// `read_data`).
    pub fn read_data(&mut self, buf: &mut [u8]) -> HandleResult<usize> {
        require(self.state, &[HandleState::Data], "read_data")?;
        let format = self
            .format
            .as_mut()
            .expect("Data state implies a selected format");
        let source = self.source.as_mut().unwrap();
        match format.read_data(source.as_mut(), buf) {
            Ok(n) => Ok(n),
            Err(e) => {
                if e.severity() == polyarc_format::ReadSeverity::Fatal {
                    self.state = HandleState::Fatal;
                }
                Err(e.into())
            }
        }
    }

    /// Skip the remainder of the current entry's payload (spec.md §6
    /// `read_data_skip`): `DATA` -> `HEADER`.
    pub fn read_data_skip(&mut self) -> HandleResult<()> {
        require(self.state, &[HandleState::Data], "read_data_skip")?;
        let format = self.format.as_mut().unwrap();
        let source = self.source.as_mut().unwrap();
        format.read_data_skip(source.as_mut())?;
        self.state = HandleState::Header;
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> HandleState {
        self.state
    }

    /// The path of the entry most recently returned by `next_header`.
    pub fn current_path(&self) -> &str {
        &self.current_path
    }

    /// Close the handle (spec.md §6 `close`): any state -> `CLOSED`.
    pub fn close(&mut self) -> HandleResult<()> {
        self.state = HandleState::Closed;
        Ok(())
    }
}

impl Default for ArchiveReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes entries into a ZIP archive (spec.md §4.3, §6).
pub struct ArchiveWriter<W: Write> {
    state: HandleState,
    writer: Option<ZipWriter<W>>,
}

impl<W: Write> ArchiveWriter<W> {
    /// A writer in state [`HandleState::New`].
    pub fn new() -> Self {
        Self {
            state: HandleState::New,
            writer: None,
        }
    }

    /// Open the underlying sink (spec.md §6 `open_*`): `NEW` -> `HEADER`.
    pub fn open(&mut self, sink: W) -> HandleResult<()> {
        require(self.state, &[HandleState::New], "open")?;
        self.writer = Some(ZipWriter::new(sink));
        self.state = HandleState::Header;
        Ok(())
    }

    /// Write one entry's header and payload in a single call (the ZIP
    /// writer's per-entry API from spec.md §4.3 doesn't need the
    /// separate `write_header`/`write_data` pair since the whole body is
    /// available up front for every caller in this crate's scope).
    #[allow(clippy::too_many_arguments)]
    pub fn write_entry(
        &mut self,
        name: &str,
        mode: u16,
        mtime_unix: i64,
        uid: u32,
        gid: u32,
        method: WriteMethod,
        body: &[u8],
        is_directory: bool,
    ) -> HandleResult<()> {
        require(
            self.state,
            &[HandleState::Header, HandleState::Data],
            "write_entry",
        )?;
        let writer = self.writer.as_mut().unwrap();
        writer.write_entry(name, mode, mtime_unix, uid, gid, method, body, is_directory)?;
        self.state = HandleState::Header;
        Ok(())
    }

    /// Finalize the central directory, close the handle, and hand back
    /// the underlying sink (`None` if no `open` ever succeeded).
    pub fn close(&mut self) -> HandleResult<Option<W>> {
        let sink = match self.writer.take() {
            Some(writer) => Some(writer.finish()?),
            None => None,
        };
        self.state = HandleState::Closed;
        Ok(sink)
    }
}

impl<W: Write> Default for ArchiveWriter<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads entries from a directory tree (spec.md §4.6, §6): wraps
/// [`DiskWalker`] behind the same header/data lifecycle, transparently
/// calling `descend()` for every directory unless a [`Matcher`] excludes
/// it first.
pub struct DiskSource {
    state: HandleState,
    walker: Option<DiskWalker>,
    matcher: Option<Matcher>,
    conv: CharsetConverter,
    pending_read: Option<(File, u64)>,
    restore_atime: bool,
    pending_restore: Option<(PathBuf, polyarc_format::Timestamp, polyarc_format::Timestamp)>,
}

impl DiskSource {
    /// A disk source in state [`HandleState::New`].
    pub fn new() -> Self {
        Self {
            state: HandleState::New,
            walker: None,
            matcher: None,
            conv: CharsetConverter::default(),
            pending_read: None,
            restore_atime: false,
            pending_restore: None,
        }
    }

    /// Install a matcher; excluded entries are skipped, and descent into
    /// an excluded directory is suppressed.
    pub fn set_matcher(&mut self, matcher: Matcher) -> HandleResult<()> {
        require(self.state, &[HandleState::New], "set_matcher")?;
        self.matcher = Some(matcher);
        Ok(())
    }

    /// Root the walk at `path` (spec.md §6 `open_filename` analog for a
    /// disk source): `NEW` -> `HEADER`.
    pub fn open(
        &mut self,
        path: impl AsRef<Path>,
        mode: SymlinkMode,
        options: DiskWalkerOptions,
    ) -> HandleResult<()> {
        require(self.state, &[HandleState::New], "open")?;
        self.restore_atime = options.restore_atime;
        self.walker = Some(DiskWalker::new(path, mode, options)?);
        self.state = HandleState::Header;
        Ok(())
    }

    /// Parse the next visit as an entry header, auto-descending into
    /// directories that pass the installed matcher (spec.md §4.6:
    /// "descend is opt-in"; this handle makes that choice on the
    /// caller's behalf the way a full recursive-archive-from-disk
    /// front-end would).
    pub fn next_header(&mut self) -> HandleResult<Option<Entry>> {
        self.finish_pending_restore();
        require(
            self.state,
            &[HandleState::Header, HandleState::Data],
            "next_header",
        )?;
        let walker = self.walker.as_mut().unwrap();

        loop {
            match walker.next() {
                Ok(Some((kind, entry))) => {
                    if kind != VisitKind::Regular {
                        continue;
                    }
                    let mut entry = entry;
                    let path = entry.path.as_utf8(&mut self.conv)?.to_string();
                    let is_dir = matches!(entry.filetype, Some(FileType::Directory));
                    let excluded = self
                        .matcher
                        .as_ref()
                        .is_some_and(|m| m.excludes(&entry, &path));
                    if is_dir && !excluded {
                        walker.descend()?;
                    }
                    if excluded {
                        continue;
                    }
                    if matches!(entry.filetype, Some(FileType::Regular)) {
                        if let Some(source_path) = &entry.source_path {
                            if let Ok(file) = File::open(source_path) {
                                self.pending_read = Some((file, entry.size));
                                if self.restore_atime && entry.size > 0 {
                                    if let (Some(atime), Some(mtime)) = (entry.atime, entry.mtime)
                                    {
                                        self.pending_restore =
                                            Some((source_path.clone(), atime, mtime));
                                    }
                                }
                            }
                        }
                    }
                    self.state = HandleState::Data;
                    return Ok(Some(entry));
                }
                Ok(None) => {
                    self.state = HandleState::Eof;
                    return Ok(None);
                }
                Err(e) => {
                    let fatal = e.severity() == polyarc_disk::DiskSeverity::Fatal;
                    if fatal {
                        self.state = HandleState::Fatal;
                        return Err(e.into());
                    }
                    warn!(error = %e, "non-fatal disk traversal error, continuing");
                    continue;
                }
            }
        }
    }

    /// Read the current regular-file entry's bytes off disk. Restores
    /// atime (when enabled) as soon as the read reaches end of file
    /// (spec.md §4.6 "Atime restoration").
    pub fn read_data(&mut self, buf: &mut [u8]) -> HandleResult<usize> {
        require(self.state, &[HandleState::Data], "read_data")?;
        let n = match &mut self.pending_read {
            Some((file, _)) => file.read(buf)?,
            None => 0,
        };
        if n == 0 {
            self.finish_pending_restore();
        }
        Ok(n)
    }

    /// Skip the remainder of the current entry (directories and
    /// already-fully-read files are no-ops). Restores atime immediately,
    /// since the rest of the payload will never be read.
    pub fn read_data_skip(&mut self) -> HandleResult<()> {
        require(self.state, &[HandleState::Data], "read_data_skip")?;
        self.pending_read = None;
        self.finish_pending_restore();
        self.state = HandleState::Header;
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> HandleState {
        self.state
    }

    /// Restore the initial working directory and close the handle
    /// (spec.md §8 testable property 4).
    pub fn close(&mut self) -> HandleResult<()> {
        self.finish_pending_restore();
        if let Some(walker) = self.walker.as_mut() {
            walker.close()?;
        }
        self.state = HandleState::Closed;
        Ok(())
    }

    fn finish_pending_restore(&mut self) {
        if let Some((path, atime, mtime)) = self.pending_restore.take() {
            if let Err(e) = polyarc_disk::restore_times(&path, atime, mtime) {
                warn!(path = %path.display(), error = %e, "atime restoration failed");
            }
        }
    }
}

impl Default for DiskSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Restores entries to disk (spec.md §6's disk-sink collaborator):
/// creates directories, regular files, and symlinks from a stream of
/// entries paired with their data.
pub struct DiskSink {
    state: HandleState,
    root: PathBuf,
}

impl DiskSink {
    /// A disk sink in state [`HandleState::New`], rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            state: HandleState::New,
            root: root.into(),
        }
    }

    /// `NEW` -> `HEADER`: ensure the root directory exists.
    pub fn open(&mut self) -> HandleResult<()> {
        require(self.state, &[HandleState::New], "open")?;
        std::fs::create_dir_all(&self.root)?;
        self.state = HandleState::Header;
        Ok(())
    }

    /// Materialize one entry under the sink's root. Directories are
    /// created (and any missing ancestors with them); regular files are
    /// written from `data`; symlinks are recreated pointing at their
    /// recorded target.
    pub fn write_entry(&mut self, entry: &mut Entry, path: &str, data: &[u8]) -> HandleResult<()> {
        require(
            self.state,
            &[HandleState::Header, HandleState::Data],
            "write_entry",
        )?;
        let target = self.root.join(path);
        match entry.filetype {
            Some(FileType::Directory) => {
                std::fs::create_dir_all(&target)?;
            }
            Some(FileType::Symlink) => {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                #[cfg(unix)]
                if let Some(link_target) = &mut entry.link_target {
                    let mut conv = CharsetConverter::default();
                    let dest = link_target.as_utf8(&mut conv)?.to_string();
                    let _ = std::fs::remove_file(&target);
                    std::os::unix::fs::symlink(dest, &target)?;
                };
            }
            _ => {
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut file = File::create(&target)?;
                file.write_all(data)?;
            }
        }
        self.state = HandleState::Header;
        Ok(())
    }

    /// Close the handle.
    pub fn close(&mut self) -> HandleResult<()> {
        self.state = HandleState::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn illegal_state_transitions_are_rejected() {
        let mut reader = ArchiveReader::new();
        let err = reader.read_data(&mut [0u8; 4]).unwrap_err();
        assert!(matches!(
            err,
            HandleError::IllegalState {
                op: "read_data",
                state: HandleState::New
            }
        ));
    }

    #[test]
    fn unrecognized_stream_reports_registry_error() {
        let mut reader = ArchiveReader::new();
        reader.open_memory(b"not an archive".to_vec()).unwrap();
        let err = reader.next_header().unwrap_err();
        assert_eq!(reader.state(), HandleState::Fatal);
        assert!(matches!(err, HandleError::Registry(_)));
    }

    #[test]
    fn disk_source_to_sink_recreates_a_regular_file() {
        let src_dir = tempfile::tempdir().unwrap();
        let dst_dir = tempfile::tempdir().unwrap();
        std::fs::write(src_dir.path().join("a.txt"), b"payload").unwrap();

        let mut source = DiskSource::new();
        source
            .open(src_dir.path(), SymlinkMode::Physical, DiskWalkerOptions::default())
            .unwrap();

        let mut sink = DiskSink::new(dst_dir.path());
        sink.open().unwrap();

        let mut copied_file = false;
        while let Some(mut entry) = source.next_header().unwrap() {
            let mut data = Vec::new();
            let mut buf = [0u8; 16];
            loop {
                let n = source.read_data(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                data.extend_from_slice(&buf[..n]);
            }
            if matches!(entry.filetype, Some(FileType::Regular)) {
                sink.write_entry(&mut entry, "a.txt", &data).unwrap();
                copied_file = true;
            }
        }
        source.close().unwrap();
        sink.close().unwrap();

        assert!(copied_file);
        assert_eq!(
            std::fs::read(dst_dir.path().join("a.txt")).unwrap(),
            b"payload"
        );
    }

    #[test]
    fn archive_writer_rejects_write_entry_before_open() {
        let mut writer: ArchiveWriter<Cursor<Vec<u8>>> = ArchiveWriter::new();
        let err = writer
            .write_entry("x", 0o644, 0, 0, 0, WriteMethod::Stored, b"", false)
            .unwrap_err();
        assert!(matches!(
            err,
            HandleError::IllegalState {
                op: "write_entry",
                ..
            }
        ));
    }
}
