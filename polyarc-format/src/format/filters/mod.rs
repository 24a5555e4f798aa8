//! Filter bidders recognized by signature but out of codec scope here
//! (spec.md §1's bzip2/xz/compress/uuencode/rpm/program-pipe/Android-
//! backup family). Bundled under `format` rather than `iostream` since
//! they exist purely to keep the bid contest exercisable for the whole
//! filter family named in spec.md §1, not because they belong to the
//! container-codec layer.

use crate::iostream::{FilterBidder, RecognizedOnlyFilter};

fn matches_bzip2(prefix: &[u8]) -> bool {
    prefix.len() >= 3 && &prefix[0..3] == b"BZh"
}

fn matches_xz(prefix: &[u8]) -> bool {
    prefix.len() >= 6 && prefix[0..6] == [0xFD, b'7', b'z', b'X', b'Z', 0x00]
}

fn matches_compress(prefix: &[u8]) -> bool {
    prefix.len() >= 2 && prefix[0] == 0x1F && prefix[1] == 0x9D
}

fn matches_uuencode(prefix: &[u8]) -> bool {
    prefix.starts_with(b"begin ")
}

fn matches_rpm(prefix: &[u8]) -> bool {
    prefix.len() >= 4 && prefix[0..4] == [0xED, 0xAB, 0xEE, 0xDB]
}

fn matches_pipe(_prefix: &[u8]) -> bool {
    // A program-pipe filter has no byte signature of its own; it is only
    // ever selected explicitly by the caller, never by the bid contest.
    false
}

fn matches_android_backup(prefix: &[u8]) -> bool {
    prefix.starts_with(b"ANDROID BACKUP\n")
}

/// The recognized-but-unimplemented filter family (spec.md §1), each
/// returning [`crate::iostream::FilterError::Unsupported`] if it ever
/// wins a bid and is opened.
pub fn recognized_only_filters() -> Vec<Box<dyn FilterBidder>> {
    vec![
        Box::new(RecognizedOnlyFilter {
            name: "bzip2",
            bid_value: 30,
            matches: matches_bzip2,
        }),
        Box::new(RecognizedOnlyFilter {
            name: "xz",
            bid_value: 30,
            matches: matches_xz,
        }),
        Box::new(RecognizedOnlyFilter {
            name: "compress",
            bid_value: 20,
            matches: matches_compress,
        }),
        Box::new(RecognizedOnlyFilter {
            name: "uuencode",
            bid_value: 10,
            matches: matches_uuencode,
        }),
        Box::new(RecognizedOnlyFilter {
            name: "rpm",
            bid_value: 30,
            matches: matches_rpm,
        }),
        Box::new(RecognizedOnlyFilter {
            name: "pipe",
            bid_value: 0,
            matches: matches_pipe,
        }),
        Box::new(RecognizedOnlyFilter {
            name: "android-backup",
            bid_value: 30,
            matches: matches_android_backup,
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_stub_declines_bytes_that_do_not_match_its_signature() {
        for filter in recognized_only_filters() {
            assert_eq!(filter.bid(b"not a match at all"), None, "{}", filter.name());
        }
    }

    #[test]
    fn bzip2_stub_recognizes_its_signature_and_refuses_to_open() {
        let filters = recognized_only_filters();
        let bzip2 = filters.iter().find(|f| f.name() == "bzip2").unwrap();
        assert!(bzip2.bid(b"BZh9...").is_some());
        assert!(bzip2.open(Box::new(std::io::Cursor::new(Vec::new()))).is_err());
    }
}
