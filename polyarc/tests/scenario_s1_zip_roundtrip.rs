//! End-to-end scenario S1 from spec.md §8: write a single stored entry
//! through [`polyarc::ArchiveWriter`] and read it back through
//! [`polyarc::ArchiveReader`].

use std::io::Cursor;

use polyarc::handle::HandleState;
use polyarc::{ArchiveReader, ArchiveWriter};
use polyarc_format::format::zip::WriteMethod;

#[test]
fn zip_stored_entry_round_trips_through_the_handle() {
    let body = b"hello libarchive test suite!\n";
    assert_eq!(body.len(), 29);

    let mut writer: ArchiveWriter<Cursor<Vec<u8>>> = ArchiveWriter::new();
    writer.open(Cursor::new(Vec::new())).unwrap();
    writer
        .write_entry(
            "helloworld.txt",
            0o644,
            1_700_000_000,
            0,
            0,
            WriteMethod::Stored,
            body,
            false,
        )
        .unwrap();
    let sink = writer.close().unwrap().expect("writer was opened");
    let archive = sink.into_inner();

    assert_eq!(
        &archive[..10],
        &[0x50, 0x4B, 0x03, 0x04, 0x14, 0x00, 0x08, 0x00, 0x00, 0x00]
    );

    let mut reader = ArchiveReader::new();
    reader.open_memory(archive).unwrap();
    let entry = reader.next_header().unwrap().expect("one entry expected");
    assert_eq!(entry.size, 29);
    assert_eq!(reader.state(), HandleState::Data);

    let mut buf = vec![0u8; 64];
    let mut total = Vec::new();
    loop {
        let n = reader.read_data(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        total.extend_from_slice(&buf[..n]);
    }
    assert_eq!(total, body);

    reader.read_data_skip().unwrap();
    assert!(reader.next_header().unwrap().is_none());
    assert_eq!(reader.state(), HandleState::Eof);
}
