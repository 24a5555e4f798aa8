//! RAR container/file-header reader (spec.md §4.5).
//!
//! Grounded on `read_header()` in
//! `original_source/libarchive/archive_read_support_format_rar.c`: the
//! 7-byte mark header, the common 7-byte block header shape shared by
//! every block type, the main-header volume/password rejection, and the
//! file-header body layout (fixed 25 bytes, optional `FHD_LARGE` high
//! dwords, name, optional `FHD_SALT`/`FHD_EXTTIME`). Unlike the original's
//! incremental `__archive_read_ahead`/`__archive_read_consume` pairing
//! (which lets it peek before committing to a read), this reader only has
//! a plain [`Read`], so a block's body is pulled into memory in one
//! `read_exact` once its declared size is known, then parsed from that
//! buffer with a [`Cursor`].
//!
//! `FHD_EXTTIME`'s nanosecond refinement is carried over in shape (the
//! per-field `rmode` nibble, the variable-length remainder bytes) but
//! resolved against UTC rather than the original's
//! `localtime`/`mktime` round-trip, matching this crate's existing choice
//! for ZIP's DOS timestamps (`dos_to_unix`) of treating wire timestamps
//! as already being in a fixed, timezone-free epoch.

use std::io::{Cursor, ErrorKind, Read};

use byteorder::{ByteOrder, LittleEndian};
use tracing::warn;

use crate::format::entry::{Entry, FileType, Timestamp};
use crate::format::error::{FormatError, FormatResult};
use crate::format::zip::reader::days_since_epoch;
use crate::format::FormatReader;
use crate::registry::Bid;
use crate::string::{decode_utf16be, MultiString};

use super::bitreader::BitReader;
use super::lzss::LzssDecoder;
use super::{
    BLOCK_AV, BLOCK_COMMENT, BLOCK_ENDARC, BLOCK_FILE, BLOCK_MAIN, BLOCK_MARK, BLOCK_NEWSUB,
    BLOCK_PROTECT, BLOCK_SIGN, BLOCK_SUB, FHD_EXTTIME, FHD_LARGE, FHD_PASSWORD, FHD_SALT,
    FHD_SOLID, FHD_UNICODE, FILE_ATTRIBUTE_DIRECTORY, HD_ADD_SIZE_PRESENT, MHD_FIRSTVOLUME,
    MHD_PASSWORD, MHD_VOLUME, METHOD_BEST, METHOD_FAST, METHOD_FASTEST, METHOD_GOOD,
    METHOD_NORMAL, METHOD_STORE, OS_BEOS, OS_MAC_OS, OS_MSDOS, OS_OS2, OS_UNIX, OS_WIN32,
    RAR_SIGNATURE,
};

const NAME: &str = "rar";

/// Bidder for the RAR container format.
#[derive(Debug, Default)]
pub struct RarBidder;

impl crate::registry::Bidder for RarBidder {
    fn name(&self) -> &'static str {
        NAME
    }

    fn bid(&self, prefix: &[u8], _best_so_far: Option<Bid>) -> Option<Bid> {
        if prefix.len() >= 7 && prefix[0..7] == RAR_SIGNATURE {
            return Some(Bid(30));
        }
        None
    }

    fn init_reader(&self) -> Box<dyn FormatReader> {
        Box::new(RarReader::new())
    }
}

/// The entry currently open for data reads. `packed_remaining` tracks how
/// many raw bytes of this entry's payload have not yet been pulled off
/// the stream, so a header read for the *next* entry (or an explicit
/// skip) knows exactly how far to advance first.
struct CurrentFile {
    method: u8,
    packed_remaining: u64,
    unpacked_total: u64,
    decoded: Option<Vec<u8>>,
    decoded_pos: u64,
}

/// Streaming reader for RAR v1-v4 archives (LZSS only; PPMd is reported
/// as an unsupported method, per spec.md §4.5, without aborting the
/// whole archive).
pub struct RarReader {
    signature_consumed: bool,
    finished: bool,
    current: Option<CurrentFile>,
}

impl RarReader {
    /// A reader positioned before the mark header.
    pub fn new() -> Self {
        Self {
            signature_consumed: false,
            finished: false,
            current: None,
        }
    }

    fn finish_current(&mut self, source: &mut dyn Read) -> FormatResult<()> {
        if let Some(current) = self.current.take() {
            if current.packed_remaining > 0 {
                skip_n(source, current.packed_remaining)?;
            }
        }
        Ok(())
    }
}

impl Default for RarReader {
    fn default() -> Self {
        Self::new()
    }
}

fn skip_n(source: &mut dyn Read, mut n: u64) -> FormatResult<()> {
    let mut scratch = [0u8; 4096];
    while n > 0 {
        let want = n.min(scratch.len() as u64) as usize;
        source.read_exact(&mut scratch[..want])?;
        n -= want as u64;
    }
    Ok(())
}

/// Convert a RAR/DOS-packed date+time (the same bit layout ZIP's local
/// header uses) to Unix seconds, UTC.
fn rar_time_to_unix(packed: u32) -> i64 {
    let second = 2 * (packed & 0x1f) as i64;
    let minute = ((packed >> 5) & 0x3f) as i64;
    let hour = ((packed >> 11) & 0x1f) as i64;
    let day = ((packed >> 16) & 0x1f) as i64;
    let month = ((packed >> 21) & 0x0f) as i64;
    let year = 1980 + ((packed >> 25) & 0x7f) as i64;

    days_since_epoch(year, month, day) * 86400 + hour * 3600 + minute * 60 + second
}

/// Decode the `FHD_UNICODE` name field: a NUL-terminated ASCII subset
/// followed by a stateful compaction of the remaining characters as
/// UTF-16BE pairs (spec.md §4.5: "decode per the published RAR Unicode
/// scheme"). Ported from the `flagbyte`/`highbyte` loop in
/// `archive_read_support_format_rar.c`'s `read_header()`.
fn decode_rar_unicode_name(raw: &[u8]) -> String {
    let ascii_len = match raw.iter().position(|&b| b == 0) {
        Some(n) if n != raw.len() - 1 => n,
        _ => return String::from_utf8_lossy(raw).into_owned(),
    };

    let mut out = Vec::with_capacity(raw.len() * 2);
    let mut offset = ascii_len + 1;
    if offset >= raw.len() {
        return String::from_utf8_lossy(&raw[..ascii_len]).into_owned();
    }
    let highbyte = raw[offset];
    offset += 1;
    let mut flagbyte = 0u8;
    let mut flagbits = 0u8;

    while offset < raw.len() {
        if flagbits == 0 {
            flagbyte = raw[offset];
            offset += 1;
            flagbits = 8;
            if offset >= raw.len() {
                break;
            }
        }
        flagbits -= 2;
        match (flagbyte >> flagbits) & 3 {
            0 => {
                out.push(0);
                out.push(raw[offset]);
                offset += 1;
            }
            1 => {
                out.push(highbyte);
                out.push(raw[offset]);
                offset += 1;
            }
            2 => {
                if offset + 1 >= raw.len() {
                    break;
                }
                out.push(raw[offset + 1]);
                out.push(raw[offset]);
                offset += 2;
            }
            3 => {
                let mut length = raw[offset];
                offset += 1;
                while length > 0 && offset < raw.len() {
                    out.push(raw[offset]);
                    length -= 1;
                }
                if length > 0 {
                    break;
                }
            }
            _ => unreachable!("two-bit switch"),
        }
    }

    if out.len() % 2 != 0 {
        out.push(0);
    }
    // Translate the backslash-as-separator convention in place, working
    // on the reassembled UTF-16BE pairs (spec.md's stored paths are
    // forward-slash separated).
    for pair in out.chunks_exact_mut(2) {
        if pair[0] == 0 && pair[1] == b'\\' {
            pair[1] = b'/';
        }
    }
    match decode_utf16be(&out) {
        Ok((decoded, warnings)) => {
            for w in warnings {
                warn!(error = %w, "rar unicode name conversion warning");
            }
            decoded
        }
        Err(e) => {
            warn!(error = %e, "falling back to lossy ascii for rar unicode name");
            String::from_utf8_lossy(&raw[..ascii_len]).into_owned()
        }
    }
}

#[derive(Default)]
struct ExtTimeRefinement {
    mtime: Option<(i64, u32)>,
    ctime: Option<(i64, u32)>,
    atime: Option<(i64, u32)>,
    birthtime: Option<(i64, u32)>,
}

/// Parse `FHD_EXTTIME`'s sub-second refinement for up to four timestamps
/// (spec.md §4.5's file header carries only coarse 2-second mtime
/// otherwise). Ported from `read_exttime()`.
fn read_ext_time(cur: &mut Cursor<&[u8]>, base_mtime: i64) -> FormatResult<ExtTimeRefinement> {
    let mut flag_bytes = [0u8; 2];
    cur.read_exact(&mut flag_bytes).map_err(|_| FormatError::Malformed {
        format: NAME,
        reason: "truncated FHD_EXTTIME flags".into(),
    })?;
    let flags = LittleEndian::read_u16(&flag_bytes);

    let mut result = ExtTimeRefinement::default();
    for i in (0..=3).rev() {
        let rmode = (flags >> (i * 4)) as u8 & 0xF;
        if rmode & 8 == 0 {
            continue;
        }
        let mut t = if i == 3 { Some(base_mtime) } else { None };
        if t.is_none() {
            let mut tb = [0u8; 4];
            cur.read_exact(&mut tb).map_err(|_| FormatError::Malformed {
                format: NAME,
                reason: "truncated FHD_EXTTIME base time".into(),
            })?;
            t = Some(rar_time_to_unix(LittleEndian::read_u32(&tb)));
        }
        let mut t = t.unwrap();

        let count = rmode & 3;
        let mut rem: u32 = 0;
        for _ in 0..count {
            let mut b = [0u8; 1];
            cur.read_exact(&mut b).map_err(|_| FormatError::Malformed {
                format: NAME,
                reason: "truncated FHD_EXTTIME remainder byte".into(),
            })?;
            rem = (u32::from(b[0]) << 16) | (rem >> 8);
        }
        let nanos = (rem % 10_000_000) * 100;

        if rmode & 4 != 0 {
            t += 1;
        }

        match i {
            3 => result.mtime = Some((t, nanos)),
            2 => result.ctime = Some((t, nanos)),
            1 => result.atime = Some((t, nanos)),
            _ => result.birthtime = Some((t, nanos)),
        }
    }
    Ok(result)
}

fn classify(host_os: u8, file_attr: u32) -> FormatResult<(FileType, u16)> {
    match host_os {
        OS_WIN32 => {
            let is_dir = file_attr & FILE_ATTRIBUTE_DIRECTORY != 0;
            Ok((
                if is_dir {
                    FileType::Directory
                } else {
                    FileType::Regular
                },
                if is_dir { 0o755 } else { 0o644 },
            ))
        }
        OS_UNIX => {
            let filetype = match file_attr & 0xF000 {
                0x4000 => FileType::Directory,
                0xA000 => FileType::Symlink,
                0x2000 => FileType::CharDevice,
                0x6000 => FileType::BlockDevice,
                0x1000 => FileType::Fifo,
                0xC000 => FileType::Socket,
                _ => FileType::Regular,
            };
            Ok((filetype, (file_attr & 0xFFF) as u16))
        }
        OS_MSDOS | OS_OS2 | OS_MAC_OS | OS_BEOS => Err(FormatError::Malformed {
            format: NAME,
            reason: format!("unsupported RAR host OS {host_os}"),
        }),
        other => Err(FormatError::Malformed {
            format: NAME,
            reason: format!("unknown RAR host OS {other}"),
        }),
    }
}

impl RarReader {
    /// Parse one `FILE_HEAD`/`NEWSUB_HEAD` body. Returns `Ok(None)` for a
    /// `NEWSUB_HEAD` (no entry is reported for it, matching spec.md's
    /// file-only `next_header` contract), after skipping its packed
    /// payload.
    fn parse_file_block(
        &mut self,
        source: &mut dyn Read,
        flags: u16,
        block_size: u64,
        is_newsub: bool,
    ) -> FormatResult<Option<Entry>> {
        if flags & FHD_SOLID != 0 {
            return Err(FormatError::Malformed {
                format: NAME,
                reason: "solid RAR archives are not supported".into(),
            });
        }
        if flags & FHD_PASSWORD != 0 {
            return Err(FormatError::Encrypted);
        }

        let body_len = (block_size as usize).saturating_sub(7);
        let mut body = vec![0u8; body_len];
        source.read_exact(&mut body).map_err(|_| FormatError::Malformed {
            format: NAME,
            reason: "truncated RAR file header".into(),
        })?;
        let mut cur = Cursor::new(body.as_slice());

        let mut fixed = [0u8; 25];
        cur.read_exact(&mut fixed).map_err(|_| FormatError::Malformed {
            format: NAME,
            reason: "truncated RAR file header fixed fields".into(),
        })?;
        let pack_size_lo = LittleEndian::read_u32(&fixed[0..4]);
        let unp_size_lo = LittleEndian::read_u32(&fixed[4..8]);
        let host_os = fixed[8];
        let file_time = LittleEndian::read_u32(&fixed[13..17]);
        let method = fixed[18];
        let name_size = LittleEndian::read_u16(&fixed[19..21]) as usize;
        let file_attr = LittleEndian::read_u32(&fixed[21..25]);

        let (mut packed_size, mut unp_size) = (u64::from(pack_size_lo), u64::from(unp_size_lo));
        if flags & FHD_LARGE != 0 {
            let mut hi = [0u8; 4];
            cur.read_exact(&mut hi).map_err(|_| FormatError::Malformed {
                format: NAME,
                reason: "truncated FHD_LARGE packed size".into(),
            })?;
            packed_size = (u64::from(LittleEndian::read_u32(&hi)) << 32) | packed_size;
            cur.read_exact(&mut hi).map_err(|_| FormatError::Malformed {
                format: NAME,
                reason: "truncated FHD_LARGE unpacked size".into(),
            })?;
            unp_size = (u64::from(LittleEndian::read_u32(&hi)) << 32) | unp_size;
        }

        if is_newsub {
            skip_n(source, packed_size)?;
            return Ok(None);
        }

        let mut raw_name = vec![0u8; name_size];
        cur.read_exact(&mut raw_name).map_err(|_| FormatError::Malformed {
            format: NAME,
            reason: "truncated RAR file name".into(),
        })?;

        let path = if flags & FHD_UNICODE != 0 {
            decode_rar_unicode_name(&raw_name)
        } else {
            for b in raw_name.iter_mut() {
                if *b == b'\\' {
                    *b = b'/';
                }
            }
            String::from_utf8_lossy(&raw_name).into_owned()
        };

        if flags & FHD_SALT != 0 {
            let mut salt = [0u8; 8];
            cur.read_exact(&mut salt).map_err(|_| FormatError::Malformed {
                format: NAME,
                reason: "truncated FHD_SALT".into(),
            })?;
        }

        let base_mtime = rar_time_to_unix(file_time);
        let ext_time = if flags & FHD_EXTTIME != 0 {
            Some(read_ext_time(&mut cur, base_mtime)?)
        } else {
            None
        };

        let (filetype, mode) = classify(host_os, file_attr)?;

        let mut entry = Entry::new();
        entry.path = MultiString::from_ingested_utf8(path);
        entry.filetype = Some(filetype);
        entry.mode = mode;
        entry.size = unp_size;
        entry.mtime = Some(Timestamp::from_seconds(base_mtime));
        if let Some(ext) = ext_time {
            if let Some((t, n)) = ext.mtime {
                entry.mtime = Some(Timestamp::new(t, n));
            }
            if let Some((t, n)) = ext.ctime {
                entry.ctime = Some(Timestamp::new(t, n));
            }
            if let Some((t, n)) = ext.atime {
                entry.atime = Some(Timestamp::new(t, n));
            }
            if let Some((t, n)) = ext.birthtime {
                entry.birthtime = Some(Timestamp::new(t, n));
            }
        }

        if filetype == FileType::Symlink {
            let mut target = vec![0u8; packed_size as usize];
            source.read_exact(&mut target).map_err(|_| FormatError::Malformed {
                format: NAME,
                reason: "truncated RAR symlink target".into(),
            })?;
            for b in target.iter_mut() {
                if *b == b'\\' {
                    *b = b'/';
                }
            }
            entry.link_target = Some(MultiString::from_ingested_utf8(
                String::from_utf8_lossy(&target).into_owned(),
            ));
            entry.size = 0;
            self.current = None;
        } else {
            self.current = Some(CurrentFile {
                method,
                packed_remaining: packed_size,
                unpacked_total: unp_size,
                decoded: None,
                decoded_pos: 0,
            });
        }

        Ok(Some(entry))
    }
}

impl FormatReader for RarReader {
    fn name(&self) -> &'static str {
        NAME
    }

    fn bid(&self, prefix: &[u8], best_so_far: Option<u32>) -> Option<Bid> {
        let bidder = RarBidder;
        <RarBidder as crate::registry::Bidder>::bid(&bidder, prefix, best_so_far.map(Bid))
    }

    fn next_header(&mut self, source: &mut dyn Read) -> FormatResult<Option<Entry>> {
        if self.finished {
            return Ok(None);
        }
        self.finish_current(source)?;

        if !self.signature_consumed {
            let mut sig = [0u8; 7];
            source.read_exact(&mut sig).map_err(|_| FormatError::Unrecognized)?;
            if sig != RAR_SIGNATURE {
                return Err(FormatError::Unrecognized);
            }
            self.signature_consumed = true;
        }

        loop {
            let mut header = [0u8; 7];
            match source.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    self.finished = true;
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }

            let head_type = header[2];
            let flags = LittleEndian::read_u16(&header[3..5]);
            let size = u64::from(LittleEndian::read_u16(&header[5..7]));

            match head_type {
                BLOCK_MAIN => {
                    if flags & (MHD_VOLUME | MHD_FIRSTVOLUME) != 0 {
                        return Err(FormatError::MultiVolume {
                            format: NAME,
                            reason: "main header declares a multi-volume archive".into(),
                        });
                    }
                    if flags & MHD_PASSWORD != 0 {
                        return Err(FormatError::Encrypted);
                    }
                    skip_n(source, size.saturating_sub(7))?;
                }
                BLOCK_FILE | BLOCK_NEWSUB => {
                    if let Some(entry) =
                        self.parse_file_block(source, flags, size, head_type == BLOCK_NEWSUB)?
                    {
                        return Ok(Some(entry));
                    }
                }
                BLOCK_COMMENT | BLOCK_AV | BLOCK_SUB | BLOCK_PROTECT | BLOCK_SIGN => {
                    let mut skip_amount = size.saturating_sub(7);
                    if flags & HD_ADD_SIZE_PRESENT != 0 {
                        let mut add = [0u8; 4];
                        source.read_exact(&mut add)?;
                        skip_amount = skip_amount.saturating_sub(4);
                        skip_amount += u64::from(LittleEndian::read_u32(&add));
                    }
                    skip_n(source, skip_amount)?;
                }
                BLOCK_ENDARC => {
                    self.finished = true;
                    return Ok(None);
                }
                BLOCK_MARK => {
                    skip_n(source, size.saturating_sub(7))?;
                }
                other => {
                    return Err(FormatError::Malformed {
                        format: NAME,
                        reason: format!("unknown RAR block type {other:#04x}"),
                    });
                }
            }
        }
    }

    fn read_data(&mut self, source: &mut dyn Read, buf: &mut [u8]) -> FormatResult<usize> {
        let Some(current) = self.current.as_mut() else {
            return Ok(0);
        };

        match current.method {
            METHOD_STORE => {
                if current.decoded_pos >= current.unpacked_total {
                    return Ok(0);
                }
                let want = buf
                    .len()
                    .min((current.unpacked_total - current.decoded_pos) as usize);
                let n = source.read(&mut buf[..want])?;
                if n == 0 {
                    return Err(FormatError::Io(std::io::Error::from(
                        ErrorKind::UnexpectedEof,
                    )));
                }
                current.decoded_pos += n as u64;
                current.packed_remaining -= n as u64;
                Ok(n)
            }
            METHOD_FASTEST | METHOD_FAST | METHOD_NORMAL => {
                if current.decoded.is_none() {
                    let mut packed = vec![0u8; current.packed_remaining as usize];
                    source.read_exact(&mut packed)?;
                    current.packed_remaining = 0;

                    let mut bits = BitReader::new(&packed);
                    let mut out = Vec::with_capacity(current.unpacked_total as usize);
                    LzssDecoder::new().decode(&mut bits, current.unpacked_total, &mut out)?;
                    current.decoded = Some(out);
                }
                let decoded = current.decoded.as_ref().expect("decoded just populated");
                let start = current.decoded_pos as usize;
                if start >= decoded.len() {
                    return Ok(0);
                }
                let want = buf.len().min(decoded.len() - start);
                buf[..want].copy_from_slice(&decoded[start..start + want]);
                current.decoded_pos += want as u64;
                Ok(want)
            }
            METHOD_GOOD | METHOD_BEST => Err(FormatError::UnsupportedMethod {
                format: NAME,
                method: "PPMd".into(),
                fatal: false,
            }),
            other => Err(FormatError::UnsupportedMethod {
                format: NAME,
                method: format!("{other:#04x}"),
                fatal: false,
            }),
        }
    }

    fn read_data_skip(&mut self, source: &mut dyn Read) -> FormatResult<()> {
        self.finish_current(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn block_header(head_type: u8, flags: u16, size: u16) -> Vec<u8> {
        let mut out = vec![0u8; 2]; // crc16, unvalidated
        out.push(head_type);
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out
    }

    fn build_stored_file_archive(name: &str, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&RAR_SIGNATURE);

        // MAIN_HEAD: 7-byte header + reserved1(2) + reserved2(2).
        out.extend_from_slice(&block_header(BLOCK_MAIN, 0, 11));
        out.extend_from_slice(&[0u8; 4]);

        // FILE_HEAD.
        let fixed_len = 25;
        let name_bytes = name.as_bytes();
        let header_size = 7 + fixed_len + name_bytes.len();
        out.extend_from_slice(&block_header(BLOCK_FILE, 0, header_size as u16));
        out.extend_from_slice(&(body.len() as u32).to_le_bytes()); // pack_size
        out.extend_from_slice(&(body.len() as u32).to_le_bytes()); // unp_size
        out.push(OS_UNIX); // host_os
        out.extend_from_slice(&[0u8; 4]); // file_crc
        out.extend_from_slice(&0u32.to_le_bytes()); // file_time
        out.push(29); // unp_ver
        out.push(METHOD_STORE); // method
        out.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        out.extend_from_slice(&0o100644u32.to_le_bytes()); // file_attr: regular file
        out.extend_from_slice(name_bytes);
        out.extend_from_slice(body);

        out.extend_from_slice(&block_header(BLOCK_ENDARC, 0, 7));
        out
    }

    #[test]
    fn reads_single_stored_entry() {
        let archive = build_stored_file_archive("hello.txt", b"hello from rar");
        let mut reader = RarReader::new();
        let mut cursor = Cursor::new(archive);

        let mut entry = reader.next_header(&mut cursor).unwrap().unwrap();
        let mut conv = crate::string::CharsetConverter::default();
        assert_eq!(entry.path.as_utf8(&mut conv).unwrap(), "hello.txt");
        assert_eq!(entry.size, 15);
        assert_eq!(entry.filetype, Some(FileType::Regular));

        let mut buf = [0u8; 64];
        let n = reader.read_data(&mut cursor, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello from rar");

        assert!(reader.next_header(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn rejects_password_protected_main_header() {
        let mut out = Vec::new();
        out.extend_from_slice(&RAR_SIGNATURE);
        out.extend_from_slice(&block_header(BLOCK_MAIN, MHD_PASSWORD, 11));
        out.extend_from_slice(&[0u8; 4]);

        let mut reader = RarReader::new();
        let mut cursor = Cursor::new(out);
        let err = reader.next_header(&mut cursor).unwrap_err();
        assert!(matches!(err, FormatError::Encrypted));
    }

    #[test]
    fn rar_time_matches_known_epoch_value() {
        // 1980-01-01 00:00:00, same packed layout as DOS time.
        assert_eq!(rar_time_to_unix(0x0021_0000), 315_532_800);
    }
}
