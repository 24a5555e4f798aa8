//! ZIP extra field parsing (spec.md §4.2's five recognized extra ids).

use byteorder::{ByteOrder, LittleEndian};

/// One recognized extra field. Unrecognized `(id, size)` triples are
/// skipped silently, matching spec.md's "unknown extra ignored" WARN
/// class (not escalated further since it's lossless: the bytes simply
/// carry no mapped meaning).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraField {
    /// `0x0001` Zip64 extended info.
    Zip64 {
        /// Present when the local/CD header's uncompressed size was
        /// `0xFFFFFFFF`.
        uncompressed_size: Option<u64>,
        /// Present when the local/CD header's compressed size was
        /// `0xFFFFFFFF`.
        compressed_size: Option<u64>,
        /// Present when the CD header's local-header offset was
        /// `0xFFFFFFFF` (supplemented from `original_source`: the field
        /// only appears in that case, after the two size fields).
        local_header_offset: Option<u64>,
        /// Present when the CD header's disk-start was `0xFFFF`.
        disk_start: Option<u32>,
    },
    /// `0x5455` extended timestamp: mtime/atime/ctime, LE32 seconds each,
    /// present per a leading flag-byte bitmask.
    ExtendedTimestamp {
        /// Modification time, if the flag bit was set.
        mtime: Option<u32>,
        /// Access time, if the flag bit was set.
        atime: Option<u32>,
        /// Inode-change time, if the flag bit was set (writers rarely
        /// emit this one; present for read-side fidelity).
        ctime: Option<u32>,
    },
    /// `0x5855` Info-ZIP Unix (old): any subset present by field size.
    InfoZipUnixOld {
        /// Access time.
        atime: Option<u32>,
        /// Modification time.
        mtime: Option<u32>,
        /// Owning uid.
        uid: Option<u16>,
        /// Owning gid.
        gid: Option<u16>,
    },
    /// `0x7855` Info-ZIP Unix (type 2): uid/gid only.
    InfoZipUnix2 {
        /// Owning uid.
        uid: u16,
        /// Owning gid.
        gid: u16,
    },
    /// `0x7875` Info-ZIP Unix (type 3): variable-width uid/gid.
    InfoZipUnix3 {
        /// Owning uid.
        uid: u64,
        /// Owning gid.
        gid: u64,
    },
}

const ID_ZIP64: u16 = 0x0001;
const ID_EXTENDED_TIMESTAMP: u16 = 0x5455;
const ID_INFOZIP_UNIX_OLD: u16 = 0x5855;
const ID_INFOZIP_UNIX2: u16 = 0x7855;
const ID_INFOZIP_UNIX3: u16 = 0x7875;

/// Parse a concatenated run of `(id16, size16, data[size])` triples,
/// returning the recognized subset. `size_sentinel_hit` tells the Zip64
/// parser which of uncompressed/compressed/offset/disk fields to expect,
/// per the local/CD header's `0xFFFFFFFF`/`0xFFFF` sentinels.
pub fn parse_extras(mut bytes: &[u8], size_sentinel_hit: Zip64SentinelHint) -> Vec<ExtraField> {
    let mut out = Vec::new();
    while bytes.len() >= 4 {
        let id = LittleEndian::read_u16(&bytes[0..2]);
        let size = LittleEndian::read_u16(&bytes[2..4]) as usize;
        if bytes.len() < 4 + size {
            break;
        }
        let data = &bytes[4..4 + size];
        match id {
            ID_ZIP64 => out.push(parse_zip64(data, &size_sentinel_hit)),
            ID_EXTENDED_TIMESTAMP if !data.is_empty() => {
                out.push(parse_extended_timestamp(data));
            }
            ID_INFOZIP_UNIX_OLD => out.push(parse_infozip_unix_old(data)),
            ID_INFOZIP_UNIX2 if data.len() >= 4 => out.push(ExtraField::InfoZipUnix2 {
                uid: LittleEndian::read_u16(&data[0..2]),
                gid: LittleEndian::read_u16(&data[2..4]),
            }),
            ID_INFOZIP_UNIX3 => {
                if let Some(field) = parse_infozip_unix3(data) {
                    out.push(field);
                }
            }
            _ => {}
        }
        bytes = &bytes[4 + size..];
    }
    out
}

/// Which fixed-header fields were the `0xFFFFFFFF`/`0xFFFF` sentinel,
/// telling the Zip64 extra parser which trailing 8/4-byte fields to
/// expect (supplemented from `original_source`'s handling of the
/// variable-shape Zip64 extra).
#[derive(Debug, Clone, Copy, Default)]
pub struct Zip64SentinelHint {
    /// Header's uncompressed_size field was `0xFFFFFFFF`.
    pub uncompressed_size: bool,
    /// Header's compressed_size field was `0xFFFFFFFF`.
    pub compressed_size: bool,
    /// Header's local_header_offset field was `0xFFFFFFFF`.
    pub local_header_offset: bool,
    /// Header's disk_start field was `0xFFFF`.
    pub disk_start: bool,
}

fn parse_zip64(mut data: &[u8], hint: &Zip64SentinelHint) -> ExtraField {
    let mut uncompressed_size = None;
    let mut compressed_size = None;
    let mut local_header_offset = None;
    let mut disk_start = None;

    if hint.uncompressed_size && data.len() >= 8 {
        uncompressed_size = Some(LittleEndian::read_u64(data));
        data = &data[8..];
    }
    if hint.compressed_size && data.len() >= 8 {
        compressed_size = Some(LittleEndian::read_u64(data));
        data = &data[8..];
    }
    if hint.local_header_offset && data.len() >= 8 {
        local_header_offset = Some(LittleEndian::read_u64(data));
        data = &data[8..];
    }
    if hint.disk_start && data.len() >= 4 {
        disk_start = Some(LittleEndian::read_u32(data));
    }

    ExtraField::Zip64 {
        uncompressed_size,
        compressed_size,
        local_header_offset,
        disk_start,
    }
}

fn parse_extended_timestamp(data: &[u8]) -> ExtraField {
    let flags = data[0];
    let mut rest = &data[1..];
    let mut take = || {
        if rest.len() >= 4 {
            let v = LittleEndian::read_u32(&rest[0..4]);
            rest = &rest[4..];
            Some(v)
        } else {
            None
        }
    };
    let mtime = if flags & 0x1 != 0 { take() } else { None };
    let atime = if flags & 0x2 != 0 { take() } else { None };
    let ctime = if flags & 0x4 != 0 { take() } else { None };
    ExtraField::ExtendedTimestamp { mtime, atime, ctime }
}

fn parse_infozip_unix_old(data: &[u8]) -> ExtraField {
    let atime = (data.len() >= 4).then(|| LittleEndian::read_u32(&data[0..4]));
    let mtime = (data.len() >= 8).then(|| LittleEndian::read_u32(&data[4..8]));
    let uid = (data.len() >= 10).then(|| LittleEndian::read_u16(&data[8..10]));
    let gid = (data.len() >= 12).then(|| LittleEndian::read_u16(&data[10..12]));
    ExtraField::InfoZipUnixOld {
        atime,
        mtime,
        uid,
        gid,
    }
}

fn parse_infozip_unix3(data: &[u8]) -> Option<ExtraField> {
    if data.is_empty() || data[0] != 1 {
        return None;
    }
    let uid_size = *data.get(1)? as usize;
    let uid_start = 2;
    let uid_bytes = data.get(uid_start..uid_start + uid_size)?;
    let gid_size_pos = uid_start + uid_size;
    let gid_size = *data.get(gid_size_pos)? as usize;
    let gid_bytes = data.get(gid_size_pos + 1..gid_size_pos + 1 + gid_size)?;

    Some(ExtraField::InfoZipUnix3 {
        uid: read_variable_width(uid_bytes),
        gid: read_variable_width(gid_bytes),
    })
}

fn read_variable_width(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len().min(8)].copy_from_slice(&bytes[..bytes.len().min(8)]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_extended_timestamp_with_mtime_and_atime() {
        let mut data = vec![0x03u8];
        data.extend_from_slice(&100u32.to_le_bytes());
        data.extend_from_slice(&200u32.to_le_bytes());
        let field = parse_extended_timestamp(&data);
        assert_eq!(
            field,
            ExtraField::ExtendedTimestamp {
                mtime: Some(100),
                atime: Some(200),
                ctime: None,
            }
        );
    }

    #[test]
    fn parses_infozip_unix3_variable_width_ids() {
        let data = vec![1u8, 2, 0xE8, 0x03, 2, 0x64, 0x00];
        let field = parse_infozip_unix3(&data).unwrap();
        assert_eq!(
            field,
            ExtraField::InfoZipUnix3 {
                uid: 1000,
                gid: 100,
            }
        );
    }

    #[test]
    fn parse_extras_skips_unrecognized_ids() {
        let mut bytes = vec![0xFFu8, 0xFF, 2, 0, 1, 2];
        bytes.extend_from_slice(&[0x55, 0x78, 4, 0, 1, 1, 1, 1]);
        let extras = parse_extras(&bytes, Zip64SentinelHint::default());
        assert_eq!(extras.len(), 1);
        assert_eq!(
            extras[0],
            ExtraField::InfoZipUnix2 {
                uid: 0x0101,
                gid: 0x0101
            }
        );
    }
}
