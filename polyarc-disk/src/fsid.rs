//! Filesystem identity tracking (spec.md §4.6 "Filesystem identity").
//!
//! Each unique `dev` seen during traversal is assigned a sequential id so
//! the walker can cheaply test "did we cross a mount boundary" without
//! re-querying the platform for every entry. `synthetic`/`remote` are
//! inferred from the mount's filesystem type name where the platform
//! exposes one (statfs `f_fstypename` on BSD/macOS, `/proc/mounts` on
//! Linux); both default to "unknown" (`-1`, modeled here as `None`) where
//! that inspection API doesn't exist, matching the spec's stated fallback.

use std::collections::HashMap;

/// A filesystem seen during traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilesystemRecord {
    /// Raw device id as reported by `stat`.
    pub dev: u64,
    /// `Some(true)` for pseudo-filesystems (`devfs`, `proc`, `sysfs`, ...),
    /// `Some(false)` otherwise, `None` when undeterminable on this platform.
    pub synthetic: Option<bool>,
    /// `Some(true)` for network filesystems (`nfs`, `smb`, `cifs`, `coda`,
    /// `afs`), `Some(false)` otherwise, `None` when undeterminable.
    pub remote: Option<bool>,
    /// Maximum filename length this filesystem allows, when known.
    pub max_name_len: Option<u32>,
}

/// Classify a filesystem type name the way spec.md §4.6 specifies:
/// `devfs`/`proc`/`sysfs`/... → synthetic; `nfs`/`smb`/`cifs`/`coda`/`afs`
/// → remote; everything else is an ordinary local filesystem.
pub fn classify(fstype: &str) -> (Option<bool>, Option<bool>) {
    const SYNTHETIC: &[&str] = &["devfs", "proc", "sysfs", "tmpfs", "devtmpfs", "cgroup", "cgroup2"];
    const REMOTE: &[&str] = &["nfs", "nfs4", "smb", "smbfs", "cifs", "coda", "afs"];

    if SYNTHETIC.contains(&fstype) {
        (Some(true), Some(false))
    } else if REMOTE.contains(&fstype) {
        (Some(false), Some(true))
    } else {
        (Some(false), Some(false))
    }
}

/// Sequential-id registry of filesystems encountered so far, keyed by
/// raw `dev`. The walker consults this on every entry to decide whether
/// it has crossed a mount boundary and to look up `synthetic`/`remote`.
#[derive(Debug, Default)]
pub struct FilesystemRegistry {
    by_dev: HashMap<u64, usize>,
    records: Vec<FilesystemRecord>,
}

impl FilesystemRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up or assign the sequential id for `dev`, inserting a fresh
    /// record (classified "unknown") if this is the first time `dev` has
    /// been seen. Returns the sequential id.
    pub fn id_for(&mut self, dev: u64) -> usize {
        if let Some(&id) = self.by_dev.get(&dev) {
            return id;
        }
        let id = self.records.len();
        self.records.push(FilesystemRecord {
            dev,
            synthetic: None,
            remote: None,
            max_name_len: None,
        });
        self.by_dev.insert(dev, id);
        id
    }

    /// Overwrite the classification for an already-registered filesystem
    /// once the platform layer has resolved it (e.g. after reading
    /// `/proc/mounts` or calling `statfs`).
    pub fn classify_as(&mut self, id: usize, synthetic: Option<bool>, remote: Option<bool>) {
        if let Some(record) = self.records.get_mut(id) {
            record.synthetic = synthetic;
            record.remote = remote;
        }
    }

    /// Fetch a previously registered record.
    pub fn record(&self, id: usize) -> Option<&FilesystemRecord> {
        self.records.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_dev_reuses_the_same_id() {
        let mut reg = FilesystemRegistry::new();
        let a = reg.id_for(42);
        let b = reg.id_for(42);
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_devs_get_distinct_ids() {
        let mut reg = FilesystemRegistry::new();
        let a = reg.id_for(1);
        let b = reg.id_for(2);
        assert_ne!(a, b);
    }

    #[test]
    fn classifies_well_known_synthetic_and_remote_types() {
        assert_eq!(classify("devfs"), (Some(true), Some(false)));
        assert_eq!(classify("nfs"), (Some(false), Some(true)));
        assert_eq!(classify("ext4"), (Some(false), Some(false)));
    }
}
