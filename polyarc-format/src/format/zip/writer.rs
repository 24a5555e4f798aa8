//! ZIP writer (spec.md §4.3).

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use crate::format::error::{FormatError, FormatResult};

use super::{
    CENTRAL_DIRECTORY_SIGNATURE, DATA_DESCRIPTOR_SIGNATURE, END_OF_CENTRAL_DIRECTORY_SIGNATURE,
    FLAG_DATA_DESCRIPTOR, LOCAL_HEADER_SIGNATURE,
};

/// Version-made-by value for a UNIX writer at spec version 3.2.0
/// (spec.md §4.3: "version-made-by = 3.2.0 UNIX (0x0314)").
const VERSION_MADE_BY_UNIX: u16 = 0x0314;
const VERSION_NEEDED: u16 = 20;

/// Compression method a caller may request per entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMethod {
    /// Method 0: copy through unchanged.
    Stored,
    /// Method 8: DEFLATE.
    Deflate,
}

struct WrittenEntry {
    name: String,
    mode: u16,
    mtime_unix: i64,
    uid: u32,
    gid: u32,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    local_header_offset: u32,
    is_directory: bool,
}

/// Streaming ZIP writer: one entry open at a time, central directory
/// assembled in memory and flushed on [`ZipWriter::finish`].
pub struct ZipWriter<W: Write> {
    sink: W,
    offset: u64,
    entries: Vec<WrittenEntry>,
}

impl<W: Write> ZipWriter<W> {
    /// Wrap a fresh output stream.
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            offset: 0,
            entries: Vec::new(),
        }
    }

    /// Write one entry's local header, payload, and trailing data
    /// descriptor in a single call (spec.md's scenario S1 style usage;
    /// streaming multi-call writes of one entry's body are not needed by
    /// any caller in scope here, so this API takes the whole body).
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
    ) -> FormatResult<()> {
        let body: &[u8] = if is_directory { &[] } else { body };
        let (compressed, method_id) = match method {
            WriteMethod::Stored => (body.to_vec(), 0u16),
            WriteMethod::Deflate => (deflate(body)?, 8u16),
        };
        let mut crc = Crc32::new();
        crc.update(body);
        let crc32 = crc.finalize();

        let name = if is_directory && !name.ends_with('/') {
            format!("{name}/")
        } else {
            name.to_string()
        };

        let local_header_offset = self.offset;

        self.sink
            .write_u32::<LittleEndian>(LOCAL_HEADER_SIGNATURE)?;
        self.sink.write_u16::<LittleEndian>(VERSION_NEEDED)?;
        self.sink
            .write_u16::<LittleEndian>(FLAG_DATA_DESCRIPTOR)?;
        self.sink.write_u16::<LittleEndian>(method_id)?;
        self.sink
            .write_u32::<LittleEndian>(unix_to_dos(mtime_unix))?;
        self.sink.write_u32::<LittleEndian>(crc32)?;
        // Stored: declare sizes even under the descriptor flag, so a
        // naive scanner can still find the next entry (spec.md §4.3).
        // Deflate: declare zero and rely on the descriptor.
        match method {
            WriteMethod::Stored => {
                self.sink
                    .write_u32::<LittleEndian>(compressed.len() as u32)?;
                self.sink
                    .write_u32::<LittleEndian>(body.len() as u32)?;
            }
            WriteMethod::Deflate => {
                self.sink.write_u32::<LittleEndian>(0)?;
                self.sink.write_u32::<LittleEndian>(0)?;
            }
        }
        self.sink
            .write_u16::<LittleEndian>(name.len() as u16)?;

        let extra = build_extras(mtime_unix, uid, gid);
        self.sink
            .write_u16::<LittleEndian>(extra.len() as u16)?;
        self.sink.write_all(name.as_bytes())?;
        self.sink.write_all(&extra)?;
        self.sink.write_all(&compressed)?;

        self.sink
            .write_u32::<LittleEndian>(DATA_DESCRIPTOR_SIGNATURE)?;
        self.sink.write_u32::<LittleEndian>(crc32)?;
        self.sink
            .write_u32::<LittleEndian>(compressed.len() as u32)?;
        self.sink.write_u32::<LittleEndian>(body.len() as u32)?;

        let header_len = 30 + name.len() as u64 + extra.len() as u64;
        let descriptor_len = 16u64;
        self.offset += header_len + compressed.len() as u64 + descriptor_len;

        self.entries.push(WrittenEntry {
            name,
            mode,
            mtime_unix,
            uid,
            gid,
            crc32,
            compressed_size: compressed.len() as u32,
            uncompressed_size: body.len() as u32,
            local_header_offset: local_header_offset as u32,
            is_directory,
        });

        Ok(())
    }

    /// Emit the central directory and end-of-central-directory record,
    /// consuming the writer and returning the underlying sink.
    pub fn finish(mut self) -> FormatResult<W> {
        let cd_offset = self.offset;
        for entry in &self.entries {
            self.sink
                .write_u32::<LittleEndian>(CENTRAL_DIRECTORY_SIGNATURE)?;
            self.sink
                .write_u16::<LittleEndian>(VERSION_MADE_BY_UNIX)?;
            self.sink.write_u16::<LittleEndian>(VERSION_NEEDED)?;
            self.sink
                .write_u16::<LittleEndian>(FLAG_DATA_DESCRIPTOR)?;
            let method_id = if entry.is_directory {
                0
            } else if entry.compressed_size != entry.uncompressed_size {
                8
            } else {
                0
            };
            self.sink.write_u16::<LittleEndian>(method_id)?;
            self.sink
                .write_u32::<LittleEndian>(unix_to_dos(entry.mtime_unix))?;
            self.sink.write_u32::<LittleEndian>(entry.crc32)?;
            let (compressed_size, uncompressed_size) = if entry.is_directory {
                (0, 0)
            } else {
                (entry.compressed_size, entry.uncompressed_size)
            };
            self.sink
                .write_u32::<LittleEndian>(compressed_size)?;
            self.sink
                .write_u32::<LittleEndian>(uncompressed_size)?;
            self.sink
                .write_u16::<LittleEndian>(entry.name.len() as u16)?;
            let extra = build_extras(entry.mtime_unix, entry.uid, entry.gid);
            self.sink
                .write_u16::<LittleEndian>(extra.len() as u16)?;
            self.sink.write_u16::<LittleEndian>(0)?; // comment length
            self.sink.write_u16::<LittleEndian>(0)?; // disk start
            self.sink.write_u16::<LittleEndian>(0)?; // internal attributes
            let mode_bits = u32::from(entry.mode)
                | if entry.is_directory { 0o040000 } else { 0o100000 };
            self.sink
                .write_u32::<LittleEndian>(mode_bits << 16)?;
            self.sink
                .write_u32::<LittleEndian>(entry.local_header_offset)?;
            self.sink.write_all(entry.name.as_bytes())?;
            self.sink.write_all(&extra)?;
        }
        let cd_size = self.offset_after_cd(cd_offset);

        self.sink
            .write_u32::<LittleEndian>(END_OF_CENTRAL_DIRECTORY_SIGNATURE)?;
        self.sink.write_u16::<LittleEndian>(0)?; // disk number
        self.sink.write_u16::<LittleEndian>(0)?; // cd start disk
        self.sink
            .write_u16::<LittleEndian>(self.entries.len() as u16)?;
        self.sink
            .write_u16::<LittleEndian>(self.entries.len() as u16)?;
        self.sink.write_u32::<LittleEndian>(cd_size)?;
        self.sink
            .write_u32::<LittleEndian>(cd_offset as u32)?;
        self.sink.write_u16::<LittleEndian>(0)?; // comment length

        Ok(self.sink)
    }

    fn offset_after_cd(&self, cd_offset: u64) -> u32 {
        let mut size = 0u64;
        for entry in &self.entries {
            let extra_len = build_extras(entry.mtime_unix, entry.uid, entry.gid).len() as u64;
            size += 46 + entry.name.len() as u64 + extra_len;
        }
        let _ = cd_offset;
        size as u32
    }
}

fn deflate(body: &[u8]) -> FormatResult<Vec<u8>> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body)?;
    encoder.finish().map_err(FormatError::Io)
}

fn build_extras(mtime_unix: i64, uid: u32, gid: u32) -> Vec<u8> {
    let mut out = Vec::new();
    // 0x5455 extended timestamp: flags (mtime|atime|ctime), then the
    // three LE32 values in that order, matching the reader's parser.
    out.extend_from_slice(&0x5455u16.to_le_bytes());
    out.extend_from_slice(&13u16.to_le_bytes());
    out.push(0x07);
    out.extend_from_slice(&(mtime_unix as u32).to_le_bytes());
    out.extend_from_slice(&(mtime_unix as u32).to_le_bytes());
    out.extend_from_slice(&(mtime_unix as u32).to_le_bytes());

    // 0x7875 Info-ZIP Unix type 3: version=1, 4-byte uid, 4-byte gid.
    out.extend_from_slice(&0x7875u16.to_le_bytes());
    out.extend_from_slice(&11u16.to_le_bytes());
    out.push(1);
    out.push(4);
    out.extend_from_slice(&uid.to_le_bytes());
    out.push(4);
    out.extend_from_slice(&gid.to_le_bytes());

    out
}

fn unix_to_dos(unix_seconds: i64) -> u32 {
    let days_total = unix_seconds.div_euclid(86400);
    let secs_of_day = unix_seconds.rem_euclid(86400);
    let (year, month, day) = civil_from_days(days_total);
    let year = year.max(1980);

    let hour = secs_of_day / 3600;
    let minute = (secs_of_day % 3600) / 60;
    let second = secs_of_day % 60;

    let date = (((year - 1980) as u32) << 9) | ((month as u32) << 5) | day as u32;
    let time = ((hour as u32) << 11) | ((minute as u32) << 5) | (second as u32 / 2);
    (date << 16) | time
}

/// Howard Hinnant's `civil_from_days`, used in both directions so the
/// writer's DOS-time math matches the reader's inverse exactly.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = z - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = if month <= 2 { y + 1 } else { y };
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn stored_entry_matches_scenario_s1_prefix() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .write_entry(
                "helloworld.txt",
                0o644,
                1_700_000_000,
                0,
                0,
                WriteMethod::Stored,
                b"hello libarchive test suite!\n",
                false,
            )
            .unwrap();
        let buf = writer.finish().unwrap().into_inner();
        // spec.md S1: "must begin with 50 4B 03 04 14 00 08 00 00 00".
        assert_eq!(&buf[0..10], &[0x50, 0x4B, 0x03, 0x04, 0x14, 0x00, 0x08, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn directory_entry_forces_zero_size_and_trailing_slash() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .write_entry("dir", 0o755, 0, 0, 0, WriteMethod::Stored, b"", true)
            .unwrap();
        assert_eq!(writer.entries[0].name, "dir/");
        assert_eq!(writer.entries[0].uncompressed_size, 0);
    }

    #[test]
    fn dos_time_round_trips_through_unix_conversion() {
        let dos = unix_to_dos(1_700_000_000);
        let unix = super::super::reader::dos_to_unix(dos);
        // DOS time has 2-second resolution and a 1980 floor.
        assert!((1_700_000_000 - unix).abs() < 2);
    }
}
