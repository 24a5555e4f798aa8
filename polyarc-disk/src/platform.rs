//! Raw platform calls backing spec.md §4.6's optional atime-restoration
//! and nodump-skip behaviors — the one place in this crate `unsafe` is
//! allowed, mirroring the way the teacher's `cascette-client-storage`
//! shared-memory backend and `cascette-cache`'s `libc::fsync` call wrap a
//! single raw syscall behind a safe-looking function instead of spreading
//! `unsafe` through the caller.

use std::path::Path;

use polyarc_format::Timestamp;

/// Restore a file's atime/mtime after its data has been read (spec.md
/// §4.6 "Atime restoration"). Best-effort: a failure here is reported to
/// the caller as an I/O error but never changes traversal correctness,
/// since the walker itself already produced the right [`polyarc_format::Entry`]
/// before this runs.
#[cfg(unix)]
pub fn restore_times(path: &Path, atime: Timestamp, mtime: Timestamp) -> std::io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;

    let times = [
        libc::timespec {
            tv_sec: atime.seconds as libc::time_t,
            tv_nsec: i64::from(atime.nanos.unwrap_or(0)) as libc::c_long,
        },
        libc::timespec {
            tv_sec: mtime.seconds as libc::time_t,
            tv_nsec: i64::from(mtime.nanos.unwrap_or(0)) as libc::c_long,
        },
    ];

    // Safety: `c_path` is a valid NUL-terminated byte string for the
    // duration of the call, `times` is a fully-initialized 2-element
    // array as `utimensat` requires, and `AT_FDCWD` resolves relative to
    // the process's current directory like every other path in this
    // crate's traversal.
    let rc = unsafe { libc::utimensat(libc::AT_FDCWD, c_path.as_ptr(), times.as_ptr(), 0) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

/// No-op outside Unix; nothing in this crate's traversal disturbs atime
/// on a platform with no `utimensat` equivalent wired up here.
#[cfg(not(unix))]
pub fn restore_times(_path: &Path, _atime: Timestamp, _mtime: Timestamp) -> std::io::Result<()> {
    Ok(())
}

/// Linux-specific `FS_IOC_GETFLAGS` probe for the ext2-family "nodump"
/// attribute (spec.md §4.6 "Nodump"). Other platforms have no portable
/// equivalent exposed through `libc` alone (BSD/macOS use `st_flags` from
/// `stat`, which would need its own per-OS field access); they report no
/// entry as nodump rather than guess.
#[cfg(target_os = "linux")]
pub fn has_nodump_attr(path: &Path) -> bool {
    use std::fs::File;
    use std::os::unix::io::AsRawFd;

    const FS_IOC_GETFLAGS: libc::c_ulong = 0x8004_7601;
    const FS_NODUMP_FL: libc::c_long = 0x0000_0040;

    let Ok(file) = File::open(path) else {
        return false;
    };
    let mut flags: libc::c_long = 0;
    // Safety: `file`'s fd is valid for the call, and `flags` is a valid
    // writable `c_long` the ioctl fills in on success.
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), FS_IOC_GETFLAGS, &mut flags) };
    rc == 0 && (flags & FS_NODUMP_FL) != 0
}

/// Always `false` outside Linux; see the Linux variant's doc comment.
#[cfg(not(target_os = "linux"))]
pub fn has_nodump_attr(_path: &Path) -> bool {
    false
}
