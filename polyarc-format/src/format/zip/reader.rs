//! ZIP streamable reader (spec.md §4.2). The seekable variant lives in
//! this same module ([`ZipSeekableBidder`]/[`ZipSeekableReader`]): it
//! bids through [`crate::registry::SeekBidder`] rather than the
//! prefix-only [`crate::registry::Bidder`] contract, since its signal
//! (the end-of-central-directory record) sits at end-of-file, not in a
//! forward-scan prefix.

use std::io::{Cursor, ErrorKind, Read, Seek, SeekFrom};

use binrw::{BinRead, BinWrite};
use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;
use flate2::{Decompress, FlushDecompress, Status};
use tracing::warn;

use crate::format::entry::{Entry, FileType};
use crate::format::error::{FormatError, FormatResult};
use crate::format::FormatReader;
use crate::registry::{Bid, ReadSeek, SeekBidder};
use crate::string::MultiString;

use super::central_directory::{CentralDirectoryEntry, EndOfCentralDirectory};
use super::extra::{parse_extras, Zip64SentinelHint};
use super::local_header::{LocalHeader, LOCAL_HEADER_FIXED_LEN, LOCAL_HEADER_SIGNATURE};
use super::{
    CENTRAL_DIRECTORY_SIGNATURE, DATA_DESCRIPTOR_SIGNATURE, END_OF_CENTRAL_DIRECTORY_SIGNATURE,
    SPLIT_ARCHIVE_SENTINEL,
};

const NAME: &str = "zip";

/// Prefix-only bidder for the streamable ZIP reader (spec.md §4.2
/// "Bidding — streamable": 30 on `50 4B {01 02 | 03 04 | 05 06 | 00 00}`).
/// The seekable variant bids separately through [`ZipSeekableBidder`],
/// since its signature lives at end-of-file rather than in a forward-scan
/// prefix.
#[derive(Debug, Default)]
pub struct ZipBidder;

impl crate::registry::Bidder for ZipBidder {
    fn name(&self) -> &'static str {
        NAME
    }

    fn bid(&self, prefix: &[u8], _best_so_far: Option<Bid>) -> Option<Bid> {
        if prefix.len() < 4 || prefix[0] != 0x50 || prefix[1] != 0x4B {
            return None;
        }
        matches!(
            (prefix[2], prefix[3]),
            (0x01, 0x02) | (0x03, 0x04) | (0x05, 0x06) | (0x00, 0x00)
        )
        .then_some(Bid(30))
    }

    fn init_reader(&self) -> Box<dyn FormatReader> {
        Box::new(ZipStreamableReader::new())
    }
}

/// Seek-capable bidder for the ZIP reader (spec.md §4.2 "Bidding —
/// seekable"): seeks to 22 bytes before end-of-file, matches the
/// end-of-central-directory signature and single-volume indicator, and
/// bids 32 — one above [`ZipBidder`]'s 30, so a seek-capable source
/// always prefers the seekable reader.
#[derive(Debug, Default)]
pub struct ZipSeekableBidder;

impl SeekBidder for ZipSeekableBidder {
    fn name(&self) -> &'static str {
        NAME
    }

    fn bid(&self, source: &mut dyn ReadSeek) -> std::io::Result<Option<Bid>> {
        Ok(EndOfCentralDirectory::locate(source)?.map(|_| Bid(32)))
    }

    fn init_reader(&self, source: &mut dyn ReadSeek) -> FormatResult<Box<dyn FormatReader>> {
        let eocd = EndOfCentralDirectory::locate(source)?.ok_or_else(|| FormatError::Malformed {
            format: NAME,
            reason: "end-of-central-directory record not found".into(),
        })?;

        source.seek(SeekFrom::Start(u64::from(eocd.cd_offset)))?;
        let mut cd_buf = vec![0u8; eocd.cd_size as usize];
        source.read_exact(&mut cd_buf)?;
        let mut cd_cursor = Cursor::new(&cd_buf);

        let mut entries = Vec::with_capacity(eocd.entry_count as usize);
        for _ in 0..eocd.entry_count {
            let mut sig = [0u8; 4];
            cd_cursor.read_exact(&mut sig)?;
            if LittleEndian::read_u32(&sig) != CENTRAL_DIRECTORY_SIGNATURE {
                return Err(FormatError::Malformed {
                    format: NAME,
                    reason: "central directory entry missing its signature".into(),
                });
            }
            let cd_entry =
                CentralDirectoryEntry::read(&mut cd_cursor).map_err(|e| FormatError::Malformed {
                    format: NAME,
                    reason: e.to_string(),
                })?;

            let mut name_buf = vec![0u8; cd_entry.name_length as usize];
            cd_cursor.read_exact(&mut name_buf)?;
            let mut extra_buf = vec![0u8; cd_entry.extra_length as usize];
            cd_cursor.read_exact(&mut extra_buf)?;
            let mut _comment = vec![0u8; cd_entry.comment_length as usize];
            cd_cursor.read_exact(&mut _comment)?;

            let hint = Zip64SentinelHint {
                uncompressed_size: cd_entry.uncompressed_size == u32::MAX,
                compressed_size: cd_entry.compressed_size == u32::MAX,
                local_header_offset: cd_entry.local_header_offset == u32::MAX,
                disk_start: cd_entry.disk_start == u16::MAX,
            };
            let extras = parse_extras(&extra_buf, hint);

            let mut uncompressed_size = u64::from(cd_entry.uncompressed_size);
            let mut compressed_size = u64::from(cd_entry.compressed_size);
            let mut local_header_offset = u64::from(cd_entry.local_header_offset);
            for extra in &extras {
                if let super::ExtraField::Zip64 {
                    uncompressed_size: u,
                    compressed_size: c,
                    local_header_offset: o,
                    ..
                } = extra
                {
                    if let Some(u) = u {
                        uncompressed_size = *u;
                    }
                    if let Some(c) = c {
                        compressed_size = *c;
                    }
                    if let Some(o) = o {
                        local_header_offset = *o;
                    }
                }
            }

            // Confirm the local header really is there before trusting
            // this entry (spec.md §4.2: "confirm the 50 4B 03 04
            // signature").
            source.seek(SeekFrom::Start(local_header_offset))?;
            let mut local_sig = [0u8; 4];
            source.read_exact(&mut local_sig)?;
            if LittleEndian::read_u32(&local_sig) != LOCAL_HEADER_SIGNATURE {
                return Err(FormatError::Malformed {
                    format: NAME,
                    reason: format!(
                        "local header signature mismatch at offset {local_header_offset}"
                    ),
                });
            }

            let path = String::from_utf8_lossy(&name_buf).into_owned();
            let is_directory = path.ends_with('/');
            entries.push(SeekEntry {
                local_header_offset,
                compression_method: cd_entry.compression_method,
                crc32: cd_entry.crc32,
                compressed_size,
                uncompressed_size,
                dos_mtime: cd_entry.dos_mtime,
                name: path,
                is_directory,
                unix_mode: cd_entry.unix_mode(),
            });
        }

        // CD order need not match on-disk order; the sequential read
        // path below walks local headers in physical order.
        entries.sort_by_key(|e| e.local_header_offset);
        source.seek(SeekFrom::Start(0))?;

        Ok(Box::new(ZipSeekableReader {
            entries,
            next_idx: 0,
            current: None,
        }))
    }
}

struct SeekEntry {
    local_header_offset: u64,
    compression_method: u16,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    dos_mtime: u32,
    name: String,
    is_directory: bool,
    unix_mode: Option<u16>,
}

/// Seekable ZIP reader: the central directory (read once, up front, by
/// [`ZipSeekableBidder::init_reader`]) supplies authoritative size/CRC
/// for every entry, so unlike [`ZipStreamableReader`] it never depends on
/// a trailing data descriptor and can skip an unsupported-method entry
/// even when its local header was written length-at-end (spec.md §4.2
/// "Header reading — seekable").
pub struct ZipSeekableReader {
    entries: Vec<SeekEntry>,
    next_idx: usize,
    current: Option<CurrentEntry>,
}

impl ZipSeekableReader {
    fn finish_current(&mut self, source: &mut dyn Read) -> FormatResult<()> {
        if let Some(mut current) = self.current.take() {
            if !current.finished {
                drain_entry(&mut current, source)?;
            }
            self.finalize_current(current, source)?;
        }
        Ok(())
    }

    fn finalize_current(&mut self, current: CurrentEntry, source: &mut dyn Read) -> FormatResult<()> {
        match validate_and_consume_descriptor(
            &current,
            source,
            current.crc32_expected,
            current.compressed_bytes_seen,
            current.uncompressed_bytes_seen,
            false,
        ) {
            Ok(()) => {}
            Err(FormatError::ChecksumMismatch { .. } | FormatError::SizeMismatch { .. }) => {
                // WARN-class per spec.md §4.2 "Validation on end-of-entry".
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

impl FormatReader for ZipSeekableReader {
    fn name(&self) -> &'static str {
        NAME
    }

    fn bid(&self, _prefix: &[u8], _best_so_far: Option<u32>) -> Option<crate::registry::Bid> {
        // The seekable reader's real signal (the EOCD record) lives at
        // end-of-file, unreachable from a forward-scan prefix; it is
        // only ever constructed through `SeekBidder::init_reader`.
        None
    }

    fn next_header(&mut self, source: &mut dyn Read) -> FormatResult<Option<Entry>> {
        self.finish_current(source)?;

        if self.next_idx >= self.entries.len() {
            return Ok(None);
        }
        let idx = self.next_idx;
        self.next_idx += 1;

        let mut sig = [0u8; 4];
        source.read_exact(&mut sig)?;
        if LittleEndian::read_u32(&sig) != LOCAL_HEADER_SIGNATURE {
            return Err(FormatError::Malformed {
                format: NAME,
                reason: "expected local header signature in sequential scan".into(),
            });
        }
        let header = read_local_header_fixed(source)?;
        let mut name_buf = vec![0u8; header.name_length as usize];
        source.read_exact(&mut name_buf)?;
        let mut extra_buf = vec![0u8; header.extra_length as usize];
        source.read_exact(&mut extra_buf)?;

        let seek_entry = &self.entries[idx];

        let mut entry = Entry::new();
        entry.path = MultiString::from_ingested_utf8(&seek_entry.name);
        entry.filetype = Some(if seek_entry.is_directory {
            FileType::Directory
        } else {
            FileType::Regular
        });
        entry.mode = u32::from(seek_entry.unix_mode.unwrap_or(0o777));
        entry.size = seek_entry.uncompressed_size;
        entry.mtime = Some(crate::format::Timestamp::from_seconds(dos_to_unix(
            seek_entry.dos_mtime,
        )));

        self.current = Some(CurrentEntry {
            compression_method: seek_entry.compression_method,
            crc32_expected: seek_entry.crc32,
            mode: DataMode::Known {
                compressed_remaining: seek_entry.compressed_size,
                uncompressed_remaining: seek_entry.uncompressed_size,
            },
            crc: Crc32::new(),
            deflate: None,
            compressed_bytes_seen: 0,
            uncompressed_bytes_seen: 0,
            finished: seek_entry.uncompressed_size == 0,
        });

        Ok(Some(entry))
    }

    fn read_data(&mut self, source: &mut dyn Read, buf: &mut [u8]) -> FormatResult<usize> {
        let mut current = self.current.take().ok_or_else(|| FormatError::Malformed {
            format: NAME,
            reason: "read_data called with no current entry".into(),
        })?;
        let n = read_entry_chunk(&mut current, source, buf)?;
        if current.finished {
            self.finalize_current(current, source)?;
        } else {
            self.current = Some(current);
        }
        Ok(n)
    }

    fn read_data_skip(&mut self, source: &mut dyn Read) -> FormatResult<()> {
        self.finish_current(source)
    }
}

enum DataMode {
    /// Sizes known up front (from the local header, or validated
    /// against the central directory by the seekable variant).
    Known {
        compressed_remaining: u64,
        uncompressed_remaining: u64,
    },
    /// Length-at-end: drive decompression to stream end, then read and
    /// validate the trailing 16-byte descriptor.
    LengthAtEnd,
}

struct CurrentEntry {
    compression_method: u16,
    crc32_expected: u32,
    mode: DataMode,
    crc: Crc32,
    deflate: Option<Decompress>,
    compressed_bytes_seen: u64,
    uncompressed_bytes_seen: u64,
    finished: bool,
}

/// Streamable ZIP reader: forward-scans for entry markers, trusts the
/// local header (or a trailing data descriptor) for sizes, and cannot
/// skip an unsupported-method length-at-end entry (spec.md §4.2).
pub struct ZipStreamableReader {
    current: Option<CurrentEntry>,
}

impl ZipStreamableReader {
    /// A reader with no entry in progress.
    pub fn new() -> Self {
        Self { current: None }
    }

    fn read_u32(source: &mut dyn Read) -> FormatResult<u32> {
        let mut buf = [0u8; 4];
        source.read_exact(&mut buf)?;
        Ok(LittleEndian::read_u32(&buf))
    }

    fn finish_current(&mut self, source: &mut dyn Read) -> FormatResult<()> {
        if let Some(mut current) = self.current.take() {
            if !current.finished {
                drain_entry(&mut current, source)?;
            }
        }
        Ok(())
    }
}

impl Default for ZipStreamableReader {
    fn default() -> Self {
        Self::new()
    }
}

fn drain_entry(current: &mut CurrentEntry, source: &mut dyn Read) -> FormatResult<()> {
    let mut scratch = [0u8; 8192];
    loop {
        let n = read_entry_chunk(current, source, &mut scratch)?;
        if n == 0 {
            break;
        }
    }
    Ok(())
}

fn read_entry_chunk(
    current: &mut CurrentEntry,
    source: &mut dyn Read,
    buf: &mut [u8],
) -> FormatResult<usize> {
    if current.finished {
        return Ok(0);
    }

    match current.mode {
        DataMode::Known {
            ref mut compressed_remaining,
            ref mut uncompressed_remaining,
        } => match current.compression_method {
            0 => {
                if *uncompressed_remaining == 0 {
                    current.finished = true;
                    return Ok(0);
                }
                let want = buf.len().min(*uncompressed_remaining as usize);
                let n = source.read(&mut buf[..want])?;
                if n == 0 {
                    return Err(FormatError::Io(std::io::Error::from(
                        ErrorKind::UnexpectedEof,
                    )));
                }
                current.crc.update(&buf[..n]);
                *uncompressed_remaining -= n as u64;
                *compressed_remaining -= n as u64;
                current.compressed_bytes_seen += n as u64;
                current.uncompressed_bytes_seen += n as u64;
                Ok(n)
            }
            8 => {
                let inflater = current.deflate.get_or_insert_with(|| Decompress::new(false));
                let mut in_buf = [0u8; 8192];
                loop {
                    if *compressed_remaining == 0 {
                        current.finished = true;
                        return Ok(0);
                    }
                    let want = in_buf.len().min(*compressed_remaining as usize);
                    let n = source.read(&mut in_buf[..want])?;
                    if n == 0 {
                        return Err(FormatError::Io(std::io::Error::from(
                            ErrorKind::UnexpectedEof,
                        )));
                    }
                    *compressed_remaining -= n as u64;
                    current.compressed_bytes_seen += n as u64;

                    let before_out = inflater.total_out();
                    let status = inflater
                        .decompress(&in_buf[..n], buf, FlushDecompress::Sync)
                        .map_err(|e| crate::iostream::FilterError::Deflate(e.to_string()))?;
                    let produced = (inflater.total_out() - before_out) as usize;
                    if produced > 0 {
                        current.crc.update(&buf[..produced]);
                        current.uncompressed_bytes_seen += produced as u64;
                        return Ok(produced);
                    }
                    if status == Status::StreamEnd {
                        current.finished = true;
                        return Ok(0);
                    }
                }
            }
            other => Err(FormatError::UnsupportedMethod {
                format: NAME,
                method: other.to_string(),
                fatal: false,
            }),
        },
        DataMode::LengthAtEnd => {
            if current.compression_method != 8 {
                return Err(FormatError::UnsupportedMethod {
                    format: NAME,
                    method: current.compression_method.to_string(),
                    fatal: true,
                });
            }
            let inflater = current.deflate.get_or_insert_with(|| Decompress::new(false));
            let mut in_buf = [0u8; 1];
            loop {
                let before_out = inflater.total_out();
                let status = inflater
                    .decompress(&[], buf, FlushDecompress::None)
                    .map_err(|e| crate::iostream::FilterError::Deflate(e.to_string()))?;
                let produced = (inflater.total_out() - before_out) as usize;
                if produced > 0 {
                    current.crc.update(&buf[..produced]);
                    current.uncompressed_bytes_seen += produced as u64;
                    return Ok(produced);
                }
                if status == Status::StreamEnd {
                    current.finished = true;
                    return Ok(0);
                }
                let n = source.read(&mut in_buf)?;
                if n == 0 {
                    return Err(FormatError::Io(std::io::Error::from(
                        ErrorKind::UnexpectedEof,
                    )));
                }
                current.compressed_bytes_seen += 1;
                let before_out = inflater.total_out();
                let status = inflater
                    .decompress(&in_buf, buf, FlushDecompress::Sync)
                    .map_err(|e| crate::iostream::FilterError::Deflate(e.to_string()))?;
                let produced = (inflater.total_out() - before_out) as usize;
                if produced > 0 {
                    current.crc.update(&buf[..produced]);
                    current.uncompressed_bytes_seen += produced as u64;
                    return Ok(produced);
                }
                if status == Status::StreamEnd {
                    current.finished = true;
                    return Ok(0);
                }
            }
        }
    }
}

fn validate_and_consume_descriptor(
    current: &CurrentEntry,
    source: &mut dyn Read,
    declared_crc: u32,
    declared_compressed: u64,
    declared_uncompressed: u64,
    length_at_end: bool,
) -> FormatResult<()> {
    let (crc, compressed, uncompressed) = if length_at_end {
        let mut sig = [0u8; 4];
        source.read_exact(&mut sig)?;
        if LittleEndian::read_u32(&sig) != DATA_DESCRIPTOR_SIGNATURE {
            return Err(FormatError::Malformed {
                format: NAME,
                reason: "missing data descriptor signature".into(),
            });
        }
        let crc = ZipStreamableReader::read_u32(source)?;
        let compressed = u64::from(ZipStreamableReader::read_u32(source)?);
        let uncompressed = u64::from(ZipStreamableReader::read_u32(source)?);
        (crc, compressed, uncompressed)
    } else {
        (declared_crc, declared_compressed, declared_uncompressed)
    };

    let computed_crc = current.crc.clone().finalize();
    if computed_crc != crc {
        warn!(computed = computed_crc, declared = crc, "zip crc mismatch");
        return Err(FormatError::ChecksumMismatch {
            context: "zip entry".into(),
            expected: crc,
            actual: computed_crc,
        });
    }
    if current.compressed_bytes_seen != compressed {
        return Err(FormatError::SizeMismatch {
            context: "zip entry compressed size".into(),
            expected: compressed,
            actual: current.compressed_bytes_seen,
        });
    }
    if (current.uncompressed_bytes_seen & 0xFFFF_FFFF) != (uncompressed & 0xFFFF_FFFF) {
        return Err(FormatError::SizeMismatch {
            context: "zip entry uncompressed size".into(),
            expected: uncompressed,
            actual: current.uncompressed_bytes_seen,
        });
    }
    Ok(())
}

impl FormatReader for ZipStreamableReader {
    fn name(&self) -> &'static str {
        NAME
    }

    fn bid(&self, prefix: &[u8], best_so_far: Option<u32>) -> Option<crate::registry::Bid> {
        let bidder = ZipBidder;
        let best = best_so_far.map(Bid);
        <ZipBidder as crate::registry::Bidder>::bid(&bidder, prefix, best)
    }

    fn next_header(&mut self, source: &mut dyn Read) -> FormatResult<Option<Entry>> {
        self.finish_current(source)?;

        loop {
            let mut sig = [0u8; 4];
            match source.read_exact(&mut sig) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e.into()),
            }
            let signature = LittleEndian::read_u32(&sig);

            if signature == SPLIT_ARCHIVE_SENTINEL {
                continue;
            }
            if signature == CENTRAL_DIRECTORY_SIGNATURE
                || signature == END_OF_CENTRAL_DIRECTORY_SIGNATURE
            {
                return Ok(None);
            }
            if signature != LOCAL_HEADER_SIGNATURE {
                return Err(FormatError::Malformed {
                    format: NAME,
                    reason: format!("unexpected signature {signature:#010x}"),
                });
            }

            return self.parse_local_entry(source).map(Some);
        }
    }

    fn read_data(&mut self, source: &mut dyn Read, buf: &mut [u8]) -> FormatResult<usize> {
        let mut current = self
            .current
            .take()
            .ok_or_else(|| FormatError::Malformed {
                format: NAME,
                reason: "read_data called with no current entry".into(),
            })?;
        let n = read_entry_chunk(&mut current, source, buf)?;
        let finished = current.finished;
        self.current = Some(current);
        if finished {
            self.finalize_current(source)?;
        }
        Ok(n)
    }

    fn read_data_skip(&mut self, source: &mut dyn Read) -> FormatResult<()> {
        self.finish_current(source)
    }
}

/// Read the 26-byte fixed local-header body. `binrw`'s [`BinRead`] bound
/// requires `Read + Seek`, so the bytes are buffered first and parsed out
/// of a `Cursor` rather than handed a bare `&mut dyn Read`.
///
/// [`BinRead`]: binrw::BinRead
fn read_local_header_fixed(source: &mut dyn Read) -> FormatResult<LocalHeader> {
    let mut buf = [0u8; LOCAL_HEADER_FIXED_LEN as usize];
    source.read_exact(&mut buf)?;
    LocalHeader::read(&mut Cursor::new(&buf)).map_err(|e| FormatError::Malformed {
        format: NAME,
        reason: e.to_string(),
    })
}

impl ZipStreamableReader {
    fn parse_local_entry(&mut self, source: &mut dyn Read) -> FormatResult<Entry> {
        let header = read_local_header_fixed(source)?;

        let mut name_buf = vec![0u8; header.name_length as usize];
        source.read_exact(&mut name_buf)?;
        let mut extra_buf = vec![0u8; header.extra_length as usize];
        source.read_exact(&mut extra_buf)?;

        let hint = Zip64SentinelHint {
            uncompressed_size: header.uncompressed_size == u32::MAX,
            compressed_size: header.compressed_size == u32::MAX,
            local_header_offset: false,
            disk_start: false,
        };
        let extras = parse_extras(&extra_buf, hint);

        let mut uncompressed_size = u64::from(header.uncompressed_size);
        let mut compressed_size = u64::from(header.compressed_size);
        for extra in &extras {
            if let super::ExtraField::Zip64 {
                uncompressed_size: u,
                compressed_size: c,
                ..
            } = extra
            {
                if let Some(u) = u {
                    uncompressed_size = *u;
                }
                if let Some(c) = c {
                    compressed_size = *c;
                }
            }
        }

        // Non-UTF-8 names would route through the charset converter's
        // "current locale" descriptor; until a real locale backend is
        // wired in (see DESIGN.md), both branches fall back to lossy
        // UTF-8, which is correct whenever flag bit 11 is set and a
        // harmless approximation otherwise.
        let path = String::from_utf8_lossy(&name_buf).into_owned();
        let is_directory = path.ends_with('/');

        let mut entry = Entry::new();
        entry.path = MultiString::from_ingested_utf8(path);
        entry.filetype = Some(if is_directory {
            FileType::Directory
        } else {
            FileType::Regular
        });
        entry.mode = if is_directory { 0o777 } else { 0o777 };
        entry.size = uncompressed_size;
        entry.mtime = Some(crate::format::Timestamp::from_seconds(dos_to_unix(
            header.dos_mtime,
        )));

        let length_at_end = header.sizes_unknown();
        self.current = Some(CurrentEntry {
            compression_method: header.compression_method,
            crc32_expected: header.crc32,
            mode: if length_at_end {
                DataMode::LengthAtEnd
            } else {
                DataMode::Known {
                    compressed_remaining: compressed_size,
                    uncompressed_remaining: uncompressed_size,
                }
            },
            crc: Crc32::new(),
            deflate: None,
            compressed_bytes_seen: 0,
            uncompressed_bytes_seen: 0,
            finished: uncompressed_size == 0 && !length_at_end,
        });

        Ok(entry)
    }

    fn finalize_current(&mut self, source: &mut dyn Read) -> FormatResult<()> {
        if let Some(current) = self.current.take() {
            let length_at_end = matches!(current.mode, DataMode::LengthAtEnd);
            let declared_crc = current.crc32_expected;
            let declared_compressed = current.compressed_bytes_seen;
            let declared_uncompressed = current.uncompressed_bytes_seen;
            match validate_and_consume_descriptor(
                &current,
                source,
                declared_crc,
                declared_compressed,
                declared_uncompressed,
                length_at_end,
            ) {
                Ok(()) => {}
                Err(FormatError::ChecksumMismatch { .. } | FormatError::SizeMismatch { .. }) => {
                    // WARN-class per spec.md §4.2 "Validation on end-of-entry".
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

/// Convert DOS date+time (packed u32, time in low 16 bits) to Unix
/// seconds, UTC (the same conversion the writer's inverse performs).
pub fn dos_to_unix(dos: u32) -> i64 {
    let time = (dos & 0xFFFF) as u32;
    let date = (dos >> 16) as u32;

    let second = (time & 0x1F) * 2;
    let minute = (time >> 5) & 0x3F;
    let hour = (time >> 11) & 0x1F;

    let day = date & 0x1F;
    let month = (date >> 5) & 0xF;
    let year = 1980 + ((date >> 9) & 0x7F);

    let days = days_since_epoch(year as i64, month as i64, day as i64);
    days * 86400 + i64::from(hour) * 3600 + i64::from(minute) * 60 + i64::from(second)
}

pub(crate) fn days_since_epoch(year: i64, month: i64, day: i64) -> i64 {
    // Howard Hinnant's civil_from_days inverse, days since 1970-01-01.
    let y = if month <= 2 { year - 1 } else { year };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe - 719468
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build_stored_entry(name: &str, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&LOCAL_HEADER_SIGNATURE.to_le_bytes());
        let mut crc = Crc32::new();
        crc.update(body);
        let header = LocalHeader {
            version_needed: 20,
            flags: 0,
            compression_method: 0,
            dos_mtime: 0,
            crc32: crc.finalize(),
            compressed_size: body.len() as u32,
            uncompressed_size: body.len() as u32,
            name_length: name.len() as u16,
            extra_length: 0,
        };
        let mut header_bytes = Vec::new();
        header.write(&mut Cursor::new(&mut header_bytes)).unwrap();
        out.extend_from_slice(&header_bytes);
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn reads_single_stored_entry_then_eof() {
        let mut archive = build_stored_entry("hello.txt", b"hello world");
        archive.extend_from_slice(&CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());

        let mut reader = ZipStreamableReader::new();
        let mut cursor = Cursor::new(archive);

        let mut entry = reader.next_header(&mut cursor).unwrap().unwrap();
        let mut conv = crate::string::CharsetConverter::default();
        assert_eq!(entry.path.as_utf8(&mut conv).unwrap(), "hello.txt");
        assert_eq!(entry.size, 11);

        let mut buf = [0u8; 32];
        let n = reader.read_data(&mut cursor, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello world");

        let next = reader.next_header(&mut cursor).unwrap();
        assert!(next.is_none());
    }

    #[test]
    fn dos_time_conversion_matches_known_epoch_value() {
        // 1980-01-01 00:00:00, the DOS epoch itself.
        assert_eq!(dos_to_unix(0x0021_0000), 315_532_800);
    }
}
