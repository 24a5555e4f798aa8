//! ZIP central directory file header and end-of-central-directory record
//! (spec.md §4.2/§4.3).

use std::io::{Read, Seek, SeekFrom};

use binrw::{BinRead, BinWrite};
use byteorder::{ByteOrder, LittleEndian};

use crate::registry::ReadSeek;

use super::END_OF_CENTRAL_DIRECTORY_SIGNATURE;

/// Byte length of the end-of-central-directory record: 4-byte signature
/// plus its 18-byte fixed body.
const EOCD_LEN: u64 = 22;

/// The fixed 42-byte body following the 4-byte `50 4B 01 02` signature
/// (standard ZIP central directory file header, minus signature).
#[derive(Debug, Clone, Copy, BinRead, BinWrite)]
#[brw(little)]
pub struct CentralDirectoryEntry {
    /// Version of the tool that wrote the archive.
    pub version_made_by: u16,
    /// ZIP spec version required to extract.
    pub version_needed: u16,
    /// General-purpose bit flags.
    pub flags: u16,
    /// Compression method.
    pub compression_method: u16,
    /// DOS-encoded modification time+date.
    pub dos_mtime: u32,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Compressed payload size (authoritative, even under length-at-end).
    pub compressed_size: u32,
    /// Uncompressed payload size (authoritative).
    pub uncompressed_size: u32,
    /// Length of the name field that follows.
    pub name_length: u16,
    /// Length of the extra field that follows the name.
    pub extra_length: u16,
    /// Length of the per-entry comment that follows the extra field.
    pub comment_length: u16,
    /// Disk number this entry's local header starts on.
    pub disk_start: u16,
    /// Internal file attributes (text/binary hint, unused here).
    pub internal_attributes: u16,
    /// External file attributes; POSIX mode lives in the upper 16 bits
    /// when `version_made_by`'s high byte indicates a Unix writer.
    pub external_attributes: u32,
    /// Byte offset of this entry's local header from the start of the
    /// archive (or of the first disk, for split archives).
    pub local_header_offset: u32,
}

impl CentralDirectoryEntry {
    /// POSIX mode bits, when `external_attributes`' upper 16 bits carry
    /// them (Unix-origin archives; `version_made_by` high byte 3).
    pub fn unix_mode(&self) -> Option<u16> {
        if (self.version_made_by >> 8) == 3 {
            Some((self.external_attributes >> 16) as u16)
        } else {
            None
        }
    }
}

/// The 18-byte fixed body of the end-of-central-directory record,
/// following its 4-byte `50 4B 05 06` signature (spec.md §4.2 "Bidding —
/// seekable").
#[derive(Debug, Clone, Copy)]
pub struct EndOfCentralDirectory {
    /// Number of central directory entries.
    pub entry_count: u16,
    /// Byte length of the central directory.
    pub cd_size: u32,
    /// Byte offset of the central directory from the start of the
    /// archive (or of the first disk, for split archives).
    pub cd_offset: u32,
}

impl EndOfCentralDirectory {
    /// Seek to 22 bytes before end-of-file and look for the
    /// end-of-central-directory signature followed by the single-volume
    /// indicator (disk_number and cd_start_disk both zero). Returns
    /// `Ok(None)` when the stream is too short, the signature doesn't
    /// match, or the archive spans multiple disks — all of which mean
    /// "the seekable bidder declines", not an error. Always leaves
    /// `source` at whatever position it finishes reading at; callers
    /// that need a fixed position afterward must seek explicitly.
    pub fn locate(source: &mut dyn ReadSeek) -> std::io::Result<Option<Self>> {
        let len = source.seek(SeekFrom::End(0))?;
        if len < EOCD_LEN {
            return Ok(None);
        }
        source.seek(SeekFrom::End(-(EOCD_LEN as i64)))?;
        let mut buf = [0u8; EOCD_LEN as usize];
        source.read_exact(&mut buf)?;

        if LittleEndian::read_u32(&buf[0..4]) != END_OF_CENTRAL_DIRECTORY_SIGNATURE {
            return Ok(None);
        }
        let disk_number = LittleEndian::read_u16(&buf[4..6]);
        let cd_start_disk = LittleEndian::read_u16(&buf[6..8]);
        if disk_number != 0 || cd_start_disk != 0 {
            return Ok(None);
        }

        Ok(Some(Self {
            entry_count: LittleEndian::read_u16(&buf[10..12]),
            cd_size: LittleEndian::read_u32(&buf[12..16]),
            cd_offset: LittleEndian::read_u32(&buf[16..20]),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::io::Cursor;

    #[test]
    fn extracts_unix_mode_from_external_attributes() {
        let entry = CentralDirectoryEntry {
            version_made_by: 0x0314,
            version_needed: 20,
            flags: 0,
            compression_method: 0,
            dos_mtime: 0,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            name_length: 0,
            extra_length: 0,
            comment_length: 0,
            disk_start: 0,
            internal_attributes: 0,
            external_attributes: 0o100644 << 16,
            local_header_offset: 0,
        };
        assert_eq!(entry.unix_mode(), Some(0o100644));
    }

    #[test]
    fn round_trips_through_binrw() {
        let entry = CentralDirectoryEntry {
            version_made_by: 0x0314,
            version_needed: 20,
            flags: 0,
            compression_method: 8,
            dos_mtime: 42,
            crc32: 7,
            compressed_size: 10,
            uncompressed_size: 20,
            name_length: 4,
            extra_length: 0,
            comment_length: 0,
            disk_start: 0,
            internal_attributes: 0,
            external_attributes: 0,
            local_header_offset: 128,
        };
        let mut buf = Vec::new();
        entry.write(&mut Cursor::new(&mut buf)).unwrap();
        let read_back = CentralDirectoryEntry::read(&mut Cursor::new(&buf)).unwrap();
        assert_eq!(read_back.local_header_offset, 128);
    }

    #[test]
    fn locates_eocd_at_end_of_single_volume_archive() {
        let mut archive = vec![0u8; 10]; // stand-in for a local entry + CD
        archive.extend_from_slice(&END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
        archive.extend_from_slice(&0u16.to_le_bytes()); // disk_number
        archive.extend_from_slice(&0u16.to_le_bytes()); // cd_start_disk
        archive.extend_from_slice(&3u16.to_le_bytes()); // entries_this_disk
        archive.extend_from_slice(&3u16.to_le_bytes()); // entries_total
        archive.extend_from_slice(&100u32.to_le_bytes()); // cd_size
        archive.extend_from_slice(&10u32.to_le_bytes()); // cd_offset
        archive.extend_from_slice(&0u16.to_le_bytes()); // comment_length

        let eocd = EndOfCentralDirectory::locate(&mut Cursor::new(archive))
            .unwrap()
            .unwrap();
        assert_eq!(eocd.entry_count, 3);
        assert_eq!(eocd.cd_size, 100);
        assert_eq!(eocd.cd_offset, 10);
    }

    #[test]
    fn declines_multi_disk_archives() {
        let mut archive = Vec::new();
        archive.extend_from_slice(&END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
        archive.extend_from_slice(&1u16.to_le_bytes()); // disk_number != 0
        archive.extend_from_slice(&[0u8; 16]);

        assert!(EndOfCentralDirectory::locate(&mut Cursor::new(archive))
            .unwrap()
            .is_none());
    }

    #[test]
    fn declines_streams_too_short_to_hold_an_eocd() {
        let archive = vec![0u8; 10];
        assert!(EndOfCentralDirectory::locate(&mut Cursor::new(archive))
            .unwrap()
            .is_none());
    }
}
