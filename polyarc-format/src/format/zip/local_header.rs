//! ZIP local file header, the 30-byte fixed prefix before name+extra+data
//! (spec.md §4.2 "Local header parse").

use binrw::{BinRead, BinWrite};

/// `50 4B 03 04` — regular-entry local header.
pub const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4b50;

/// Byte length of the fixed portion, not counting signature, name, or
/// extra field.
pub const LOCAL_HEADER_FIXED_LEN: u16 = 26;

/// The fixed 26-byte body following the 4-byte signature.
#[derive(Debug, Clone, Copy, BinRead, BinWrite)]
#[brw(little)]
pub struct LocalHeader {
    /// ZIP spec version required to extract.
    pub version_needed: u16,
    /// General-purpose bit flags.
    pub flags: u16,
    /// Compression method (0 = stored, 8 = deflate, ...).
    pub compression_method: u16,
    /// DOS-encoded modification time+date.
    pub dos_mtime: u32,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Compressed payload size.
    pub compressed_size: u32,
    /// Uncompressed payload size.
    pub uncompressed_size: u32,
    /// Length of the name field that follows.
    pub name_length: u16,
    /// Length of the extra field that follows the name.
    pub extra_length: u16,
}

impl LocalHeader {
    /// True when flag bit 3 (data descriptor) is set.
    pub fn has_data_descriptor(&self) -> bool {
        self.flags & super::FLAG_DATA_DESCRIPTOR != 0
    }

    /// True when flag bit 11 (UTF-8 name) is set.
    pub fn name_is_utf8(&self) -> bool {
        self.flags & super::FLAG_UTF8_NAME != 0
    }

    /// True when the sizes/CRC are zeroed, meaning they must come from
    /// either the central directory (seekable reader) or the trailing
    /// data descriptor (streamable reader).
    pub fn sizes_unknown(&self) -> bool {
        self.has_data_descriptor() && self.compressed_size == 0 && self.uncompressed_size == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::io::Cursor;

    #[test]
    fn round_trips_fixed_header() {
        let header = LocalHeader {
            version_needed: 20,
            flags: super::super::FLAG_DATA_DESCRIPTOR,
            compression_method: 8,
            dos_mtime: 0x1234_5678,
            crc32: 0xdead_beef,
            compressed_size: 0,
            uncompressed_size: 0,
            name_length: 13,
            extra_length: 0,
        };
        let mut buf = Vec::new();
        header.write(&mut Cursor::new(&mut buf)).unwrap();
        assert_eq!(buf.len(), LOCAL_HEADER_FIXED_LEN as usize);

        let read_back = LocalHeader::read(&mut Cursor::new(&buf)).unwrap();
        assert!(read_back.has_data_descriptor());
        assert!(read_back.sizes_unknown());
        assert!(!read_back.name_is_utf8());
    }
}
