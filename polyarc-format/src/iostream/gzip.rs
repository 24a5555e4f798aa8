//! gzip filter bidder (spec.md §1's byte-level filter family).

use std::io::Read;

use flate2::read::GzDecoder;

use super::error::FilterResult;
use super::filter::FilterBidder;

/// Bidder for the gzip container format (magic `1F 8B 08`).
#[derive(Debug, Default)]
pub struct GzipBidder;

impl FilterBidder for GzipBidder {
    fn name(&self) -> &'static str {
        "gzip"
    }

    fn bid(&self, prefix: &[u8]) -> Option<u32> {
        (prefix.len() >= 3 && prefix[0] == 0x1F && prefix[1] == 0x8B && prefix[2] == 0x08)
            .then_some(30)
    }

    fn open(&self, inner: Box<dyn Read + Send>) -> FilterResult<Box<dyn Read + Send>> {
        Ok(Box::new(GzDecoder::new(inner)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    #[test]
    fn round_trips_through_gzip() {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"hello gzip world").unwrap();
        let compressed = encoder.finish().unwrap();

        let bidder = GzipBidder;
        assert_eq!(bidder.bid(&compressed), Some(30));

        let mut decoded = bidder.open(Box::new(Cursor::new(compressed))).unwrap();
        let mut out = Vec::new();
        decoded.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello gzip world");
    }

    #[test]
    fn declines_non_gzip_prefix() {
        let bidder = GzipBidder;
        assert_eq!(bidder.bid(b"PK\x03\x04"), None);
    }
}
