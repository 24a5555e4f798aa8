//! End-to-end disk traversal ordering (spec.md §8 scenario S4).

use polyarc_disk::{DiskWalker, DiskWalkerOptions, SymlinkMode, VisitKind};
use polyarc_format::FileType;
use std::fs;

fn populate(root: &std::path::Path) {
    fs::create_dir_all(root.join("d1/d3")).unwrap();
    fs::create_dir_all(root.join("d2/d4")).unwrap();
    fs::write(root.join("d1/f1"), b"f1").unwrap();
    fs::write(root.join("d1/d3/f3"), b"f3").unwrap();
    fs::write(root.join("d2/f2"), b"f2").unwrap();
}

#[test]
fn before_contents_precedes_children_precedes_after_contents() {
    let tmp = tempfile::tempdir().unwrap();
    populate(tmp.path());

    let mut walker = DiskWalker::new(
        tmp.path(),
        SymlinkMode::Physical,
        DiskWalkerOptions {
            all_visit_types: true,
            ..Default::default()
        },
    )
    .unwrap();

    let mut conv = polyarc_format::string::CharsetConverter::default();
    let mut visits = Vec::new();
    while let Some((kind, mut entry)) = walker.next().unwrap() {
        let path = entry.path.as_utf8(&mut conv).unwrap().to_string();
        let is_dir = matches!(entry.filetype, Some(FileType::Directory));
        visits.push((kind, path));
        if is_dir && kind == VisitKind::Regular {
            walker.descend().unwrap();
        }
    }
    walker.close().unwrap();

    // Every BEFORE_CONTENTS (PostDescent) for a directory must precede
    // every regular visit for its children, which must precede its
    // AFTER_CONTENTS (PostAscent).
    for dirname in ["d1", "d2", "d1/d3"] {
        let before = visits
            .iter()
            .position(|(k, p)| *k == VisitKind::PostDescent && p.ends_with(dirname))
            .unwrap_or_else(|| panic!("missing PostDescent for {dirname}"));
        let after = visits
            .iter()
            .position(|(k, p)| *k == VisitKind::PostAscent && p.ends_with(dirname))
            .unwrap_or_else(|| panic!("missing PostAscent for {dirname}"));
        assert!(before < after, "{dirname}: PostDescent must precede PostAscent");
    }

    let regular_files: Vec<&String> = visits
        .iter()
        .filter(|(k, p)| *k == VisitKind::Regular && (p.ends_with("f1") || p.ends_with("f2") || p.ends_with("f3")))
        .map(|(_, p)| p)
        .collect();
    assert_eq!(regular_files.len(), 3);
}
