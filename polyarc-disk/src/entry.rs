//! Populate a format-neutral [`polyarc_format::Entry`] from a disk
//! `stat` result (spec.md §3 "Entry", §4.6).

use std::fs::Metadata;
use std::path::Path;

use polyarc_format::{Entry, FileType, Timestamp};
use polyarc_format::string::MultiString;

/// Build an [`Entry`] from a path and its already-captured [`Metadata`],
/// filling in every field the platform metadata API exposes. `atime` is
/// always populated from the metadata that was captured *before* the
/// caller reads the file's data, so atime-restoration (spec.md §4.6) has
/// the pre-read value to write back.
pub fn entry_from_metadata(path: &Path, source_path: &Path, meta: &Metadata) -> Entry {
    let mut entry = Entry::new();
    entry.path = MultiString::from_utf8(path.to_string_lossy().into_owned());
    entry.source_path = Some(source_path.to_path_buf());
    entry.filetype = Some(classify(meta));
    entry.size = if meta.is_file() { meta.len() } else { 0 };

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        entry.mode = (meta.mode() & 0xFFFF) as u16;
        entry.uid = meta.uid();
        entry.gid = meta.gid();
        entry.nlink = meta.nlink();
        entry.dev = meta.dev();
        entry.ino = meta.ino();
        entry.rdev = meta.rdev();
        entry.mtime = Some(Timestamp::new(meta.mtime(), meta.mtime_nsec() as u32));
        entry.atime = Some(Timestamp::new(meta.atime(), meta.atime_nsec() as u32));
        entry.ctime = Some(Timestamp::new(meta.ctime(), meta.ctime_nsec() as u32));
    }
    #[cfg(not(unix))]
    {
        entry.mode = if meta.permissions().readonly() {
            0o444
        } else {
            0o644
        };
        if let Ok(mtime) = meta.modified() {
            entry.mtime = Some(system_time_to_timestamp(mtime));
        }
        if let Ok(atime) = meta.accessed() {
            entry.atime = Some(system_time_to_timestamp(atime));
        }
    }

    if let Ok(created) = meta.created() {
        entry.birthtime = Some(system_time_to_timestamp(created));
    }

    entry
}

fn classify(meta: &Metadata) -> FileType {
    if meta.is_dir() {
        FileType::Directory
    } else if meta.file_type().is_symlink() {
        FileType::Symlink
    } else {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;
            let ft = meta.file_type();
            if ft.is_char_device() {
                return FileType::CharDevice;
            }
            if ft.is_block_device() {
                return FileType::BlockDevice;
            }
            if ft.is_fifo() {
                return FileType::Fifo;
            }
            if ft.is_socket() {
                return FileType::Socket;
            }
        }
        FileType::Regular
    }
}

#[allow(dead_code)]
fn system_time_to_timestamp(t: std::time::SystemTime) -> Timestamp {
    match t.duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => Timestamp::new(d.as_secs() as i64, d.subsec_nanos()),
        Err(e) => Timestamp::from_seconds(-(e.duration().as_secs() as i64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn regular_file_gets_size_and_regular_filetype() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::File::create(&path).unwrap().write_all(b"hi").unwrap();
        let meta = std::fs::symlink_metadata(&path).unwrap();
        let entry = entry_from_metadata(Path::new("f.txt"), &path, &meta);
        assert_eq!(entry.filetype, Some(FileType::Regular));
        assert_eq!(entry.size, 2);
    }

    #[test]
    fn directory_gets_zero_size() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("d");
        std::fs::create_dir(&sub).unwrap();
        let meta = std::fs::symlink_metadata(&sub).unwrap();
        let entry = entry_from_metadata(Path::new("d"), &sub, &meta);
        assert_eq!(entry.filetype, Some(FileType::Directory));
        assert_eq!(entry.size, 0);
    }
}
