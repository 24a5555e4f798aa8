//! Layer 4: predicate combinators over entries (spec.md §3 "Matcher",
//! §4.7 "Matcher — time predicates", §8 testable property 6, scenario S5).

use std::collections::HashMap;

use polyarc_format::{Entry, Timestamp};

/// A name predicate: returns `true` to keep the entry, `false` to
/// exclude it. Boxed so callers can combine globs, regexes, or plain
/// string comparisons without the matcher depending on any of them.
pub type NamePredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

/// Combines the time and name predicates spec.md §4.7 describes into a
/// single include/exclude decision per entry.
///
/// Time semantics (spec.md §8 S5, testable property 6 — the operative
/// definition where the prose of §4.7 reads ambiguously): a `newer_mtime`
/// reference **excludes** an entry whose `mtime <= reference`, i.e. it
/// only keeps entries strictly newer than the reference. A `older_mtime`
/// reference excludes an entry whose `mtime >= reference`, keeping only
/// entries strictly older. `ctime` variants are symmetric.
#[derive(Default)]
pub struct Matcher {
    newer_mtime: Option<Timestamp>,
    older_mtime: Option<Timestamp>,
    newer_ctime: Option<Timestamp>,
    older_ctime: Option<Timestamp>,
    /// Per-path overrides for the newer-mtime check (spec.md §4.7's
    /// "pathname-specific-mtime-table"), keyed by the entry's archive
    /// path exactly as it appears in [`Entry::path`].
    newer_mtime_overrides: HashMap<String, Timestamp>,
    name_predicates: Vec<NamePredicate>,
}

impl Matcher {
    /// A matcher with no predicates installed (excludes nothing).
    pub fn new() -> Self {
        Self::default()
    }

    /// Only keep entries with `mtime` strictly newer than `reference`.
    pub fn set_newer_mtime(&mut self, reference: Timestamp) {
        self.newer_mtime = Some(reference);
    }

    /// Only keep entries with `mtime` strictly older than `reference`.
    pub fn set_older_mtime(&mut self, reference: Timestamp) {
        self.older_mtime = Some(reference);
    }

    /// Only keep entries with `ctime` strictly newer than `reference`.
    pub fn set_newer_ctime(&mut self, reference: Timestamp) {
        self.newer_ctime = Some(reference);
    }

    /// Only keep entries with `ctime` strictly older than `reference`.
    pub fn set_older_ctime(&mut self, reference: Timestamp) {
        self.older_ctime = Some(reference);
    }

    /// Install a path-specific newer-mtime reference that overrides the
    /// global one for exactly that path.
    pub fn set_newer_mtime_for_path(&mut self, path: impl Into<String>, reference: Timestamp) {
        self.newer_mtime_overrides.insert(path.into(), reference);
    }

    /// Register a name predicate; an entry is excluded if any registered
    /// predicate returns `false` for its path.
    pub fn add_name_predicate(&mut self, predicate: NamePredicate) {
        self.name_predicates.push(predicate);
    }

    fn effective_newer_mtime(&self, path: &str) -> Option<Timestamp> {
        self.newer_mtime_overrides
            .get(path)
            .copied()
            .or(self.newer_mtime)
    }

    /// True if `entry` should be excluded under the installed predicates.
    pub fn excludes(&self, entry: &Entry, path: &str) -> bool {
        if let Some(reference) = self.effective_newer_mtime(path) {
            if let Some(mtime) = entry.mtime {
                if mtime.as_nanos() <= reference.as_nanos() {
                    return true;
                }
            }
        }
        if let Some(reference) = self.older_mtime {
            if let Some(mtime) = entry.mtime {
                if mtime.as_nanos() >= reference.as_nanos() {
                    return true;
                }
            }
        }
        if let Some(reference) = self.newer_ctime {
            if let Some(ctime) = entry.ctime {
                if ctime.as_nanos() <= reference.as_nanos() {
                    return true;
                }
            }
        }
        if let Some(reference) = self.older_ctime {
            if let Some(ctime) = entry.ctime {
                if ctime.as_nanos() >= reference.as_nanos() {
                    return true;
                }
            }
        }
        if self.name_predicates.iter().any(|pred| !pred(path)) {
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyarc_format::FileType;

    fn entry_with_mtime(seconds: i64, nanos: u32) -> Entry {
        let mut e = Entry::new();
        e.filetype = Some(FileType::Regular);
        e.mtime = Some(Timestamp::new(seconds, nanos));
        e
    }

    #[test]
    fn newer_mtime_boundary_matches_scenario_s5() {
        let mut matcher = Matcher::new();
        matcher.set_newer_mtime(Timestamp::new(7880, 0));

        assert!(matcher.excludes(&entry_with_mtime(7879, 999_999_999), "f"));
        assert!(matcher.excludes(&entry_with_mtime(7880, 0), "f"));
        assert!(!matcher.excludes(&entry_with_mtime(7880, 1), "f"));
    }

    #[test]
    fn older_mtime_excludes_at_and_after_reference() {
        let mut matcher = Matcher::new();
        matcher.set_older_mtime(Timestamp::new(100, 0));

        assert!(!matcher.excludes(&entry_with_mtime(99, 0), "f"));
        assert!(matcher.excludes(&entry_with_mtime(100, 0), "f"));
        assert!(matcher.excludes(&entry_with_mtime(101, 0), "f"));
    }

    #[test]
    fn path_specific_override_wins_over_global_newer_mtime() {
        let mut matcher = Matcher::new();
        matcher.set_newer_mtime(Timestamp::new(1000, 0));
        matcher.set_newer_mtime_for_path("special", Timestamp::new(0, 0));

        // Under the global reference this would be excluded; the
        // per-path override makes it newer than 0 and thus included.
        assert!(!matcher.excludes(&entry_with_mtime(1, 0), "special"));
        assert!(matcher.excludes(&entry_with_mtime(1, 0), "unrelated"));
    }

    #[test]
    fn name_predicate_excludes_non_matching_paths() {
        let mut matcher = Matcher::new();
        matcher.add_name_predicate(Box::new(|p: &str| p.ends_with(".txt")));
        let e = entry_with_mtime(0, 0);
        assert!(!matcher.excludes(&e, "a.txt"));
        assert!(matcher.excludes(&e, "a.bin"));
    }
}
