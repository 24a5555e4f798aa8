//! CFHEADER/CFFOLDER/CFFILE structures (spec.md §4.4).

use std::io::Read;

use binrw::{BinRead, BinWrite};
use byteorder::{ByteOrder, LittleEndian};

use crate::format::error::{FormatError, FormatResult};

/// `M S C F` cabinet signature.
pub const CAB_SIGNATURE: [u8; 4] = *b"MSCF";

const NAME: &str = "cab";

/// The 44-byte fixed CFHEADER (spec.md §4.4 "Header parse"). The trailing
/// 8 reserved bytes cover the optional `cbCFHeader`/`cbCFFolder`/
/// `cbCFData` reservation fields some writers emit; this reader does not
/// interpret per-folder/per-file reserved areas since no producer in
/// scope here sets the RESERVE_PRESENT flag.
#[derive(Debug, Clone, Copy, BinRead, BinWrite)]
#[brw(little)]
pub struct CfHeader {
    /// `MSCF`.
    pub signature: [u8; 4],
    reserved1: u32,
    /// Total cabinet size in bytes.
    pub cb_cabinet: u32,
    reserved2: u32,
    /// Byte offset of the first CFFILE entry.
    pub coff_files: u32,
    reserved3: u32,
    /// Minor format version.
    pub version_minor: u8,
    /// Major format version.
    pub version_major: u8,
    /// Number of CFFOLDER entries (>= 1).
    pub folder_count: u16,
    /// Number of CFFILE entries (>= 1).
    pub file_count: u16,
    /// Cabinet flags (`PREV_CABINET`, `NEXT_CABINET`, `RESERVE_PRESENT`, ...).
    pub flags: u16,
    /// Set (multi-cabinet group) identifier.
    pub set_id: u16,
    /// This cabinet's index within its set.
    pub cabinet_index: u16,
    reserved_tail: [u8; 8],
}

/// Cabinet flag bits relevant to single-volume rejection.
pub const FLAG_PREV_CABINET: u16 = 0x0001;
pub const FLAG_NEXT_CABINET: u16 = 0x0002;

impl CfHeader {
    /// Read and validate the 44-byte header at the current position,
    /// scanning up to 128 KiB ahead for `MSCF` first if a PE (`MZ`)
    /// prefix was detected by the caller (spec.md §4.4).
    pub fn parse(source: &mut dyn Read) -> FormatResult<Self> {
        let mut buf = [0u8; 44];
        source.read_exact(&mut buf)?;
        let header =
            Self::read(&mut binrw::io::Cursor::new(&buf)).map_err(|e| FormatError::Malformed {
                format: NAME,
                reason: e.to_string(),
            })?;
        if header.signature != CAB_SIGNATURE {
            return Err(FormatError::Malformed {
                format: NAME,
                reason: "missing MSCF signature".into(),
            });
        }
        if header.folder_count == 0 || header.file_count == 0 {
            return Err(FormatError::Malformed {
                format: NAME,
                reason: "folder_count and file_count must be at least 1".into(),
            });
        }
        Ok(header)
    }

    /// True if this cabinet is part of a multi-volume set (spec.md's
    /// "reject multi-volume cabinets" rule).
    pub fn is_multi_volume(&self) -> bool {
        self.flags & (FLAG_PREV_CABINET | FLAG_NEXT_CABINET) != 0 || self.cabinet_index != 0
    }
}

/// One CFFOLDER entry: 8-byte fixed record (spec.md §4.4 "Folders").
#[derive(Debug, Clone, Copy, BinRead, BinWrite)]
#[brw(little)]
pub struct CfFolderEntry {
    /// Absolute offset of this folder's first CFDATA block.
    pub cfdata_offset_in_cab: u32,
    /// Number of CFDATA blocks belonging to this folder.
    pub cfdata_count: u16,
    /// Compression method (low 4 bits) + method parameters (upper bits).
    pub type_compress: u16,
}

/// Compression methods recognized in `type_compress`'s low 4 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressMethod {
    /// No compression.
    None,
    /// Deflate-based MSZIP.
    MsZip,
    /// Quantum (not implemented).
    Quantum,
    /// LZX (not implemented); upper bits carry the window size.
    Lzx,
}

impl CfFolderEntry {
    /// Decode the compression method from `type_compress`'s low 4 bits.
    pub fn method(&self) -> CompressMethod {
        match self.type_compress & 0x0F {
            0 => CompressMethod::None,
            1 => CompressMethod::MsZip,
            2 => CompressMethod::Quantum,
            3 => CompressMethod::Lzx,
            _ => CompressMethod::None,
        }
    }
}

/// One CFFILE entry (spec.md §4.4 "Files"): fixed 16-byte prefix plus a
/// NUL-terminated name.
#[derive(Debug, Clone)]
#[allow(clippy::struct_field_names)]
pub struct CfFileEntry {
    /// Uncompressed size of this file's data.
    pub uncompressed_size: u32,
    /// Byte offset of this file's data within its (uncompressed) folder.
    pub offset_in_folder: u32,
    /// Index into the folder table, or one of the continuation sentinels.
    pub folder_index: u16,
    /// DOS-packed modification date+time.
    pub dos_mtime: u32,
    /// DOS file attribute bits, including `_A_NAME_IS_UTF`.
    pub attributes: u16,
    /// Raw name bytes (before charset interpretation), backslashes
    /// already translated to forward slashes.
    pub name: Vec<u8>,
}

impl CfFileEntry {
    /// Parse one CFFILE entry from `source`.
    pub fn parse(source: &mut dyn Read) -> FormatResult<Self> {
        let mut fixed = [0u8; 16];
        source.read_exact(&mut fixed)?;
        let uncompressed_size = LittleEndian::read_u32(&fixed[0..4]);
        let offset_in_folder = LittleEndian::read_u32(&fixed[4..8]);
        let folder_index = LittleEndian::read_u16(&fixed[8..10]);
        // Wire order is date(2) then time(2); pack as (date << 16) | time
        // to match `dos_to_unix`'s expected layout.
        let dos_date = LittleEndian::read_u16(&fixed[10..12]);
        let dos_time = LittleEndian::read_u16(&fixed[12..14]);
        let dos_mtime = (u32::from(dos_date) << 16) | u32::from(dos_time);
        let attributes = LittleEndian::read_u16(&fixed[14..16]);

        let mut name = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            source.read_exact(&mut byte)?;
            if byte[0] == 0 {
                break;
            }
            name.push(if byte[0] == b'\\' { b'/' } else { byte[0] });
        }

        Ok(Self {
            uncompressed_size,
            offset_in_folder,
            folder_index,
            dos_mtime,
            attributes,
            name,
        })
    }

    /// True if the name should be decoded as UTF-8 rather than the
    /// default charset.
    pub fn name_is_utf8(&self) -> bool {
        self.attributes & super::ATTR_NAME_IS_UTF != 0
    }

    /// True if `folder_index` is one of the multi-volume continuation
    /// sentinels (spec.md: "must be rejected with a clean error on
    /// single-volume input").
    pub fn is_continuation_sentinel(&self) -> bool {
        matches!(
            self.folder_index,
            super::FOLDER_CONTINUED_FROM_PREV
                | super::FOLDER_CONTINUED_TO_AND_FROM
                | super::FOLDER_CONTINUED_TO_NEXT
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::io::Cursor;

    #[test]
    fn rejects_missing_signature() {
        let mut buf = [0u8; 44];
        buf[3] = b'X';
        let err = CfHeader::parse(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, FormatError::Malformed { .. }));
    }

    #[test]
    fn detects_multi_volume_via_flags() {
        let header = CfHeader {
            signature: CAB_SIGNATURE,
            reserved1: 0,
            cb_cabinet: 0,
            reserved2: 0,
            coff_files: 0,
            reserved3: 0,
            version_minor: 3,
            version_major: 1,
            folder_count: 1,
            file_count: 1,
            flags: FLAG_NEXT_CABINET,
            set_id: 0,
            cabinet_index: 0,
            reserved_tail: [0; 8],
        };
        assert!(header.is_multi_volume());
    }

    #[test]
    fn parses_cffile_translating_backslashes() {
        let mut data = Vec::new();
        data.extend_from_slice(&100u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&super::super::ATTR_NAME_IS_UTF.to_le_bytes());
        data.extend_from_slice(b"dir\\file.txt\0");

        let entry = CfFileEntry::parse(&mut Cursor::new(data)).unwrap();
        assert_eq!(entry.name, b"dir/file.txt");
        assert!(entry.name_is_utf8());
    }
}
