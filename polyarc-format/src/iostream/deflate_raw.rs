//! Raw-deflate primitive with preset-dictionary support.
//!
//! CAB's MSZIP method (spec.md §4.4) frames raw DEFLATE per 32 KiB CFDATA
//! block and carries the previous block's 32 KiB of output forward as the
//! next block's preset dictionary. `flate2`'s convenience `Read` wrappers
//! don't expose dictionary resets mid-stream, so this drives the low-level
//! `flate2::Decompress` state machine directly — the same crate the
//! teacher uses for zlib framing, one layer down.

use flate2::{Decompress, FlushDecompress, Status};

use super::error::{FilterError, FilterResult};

/// Maximum single CFDATA uncompressed size (spec.md §4.4).
pub const MSZIP_BLOCK_SIZE: usize = 32 * 1024;

/// Stateful raw-deflate decoder that can have its dictionary reset between
/// blocks, mirroring "set dictionary" in spec.md's MSZIP description.
pub struct RawDeflateDecoder {
    inner: Decompress,
}

impl RawDeflateDecoder {
    /// Create a decoder with an empty dictionary (used for the first
    /// CFDATA block in a folder).
    pub fn new() -> Self {
        Self {
            inner: Decompress::new(false),
        }
    }

    /// Reset internal state and install `dictionary` as the preset
    /// dictionary for the next `decompress` call.
    pub fn reset_with_dictionary(&mut self, dictionary: &[u8]) -> FilterResult<()> {
        self.inner.reset(false);
        if !dictionary.is_empty() {
            self.inner
                .set_dictionary(dictionary)
                .map_err(|e| FilterError::Deflate(e.to_string()))?;
        }
        Ok(())
    }

    /// Decompress `input` fully into `output`, appending. Returns the
    /// number of input bytes consumed (should equal `input.len()` for a
    /// well-formed single-block CFDATA payload).
    pub fn decompress(&mut self, input: &[u8], output: &mut Vec<u8>) -> FilterResult<usize> {
        let start_in = self.inner.total_in();
        let mut scratch = vec![0u8; MSZIP_BLOCK_SIZE];
        loop {
            let before_out = self.inner.total_out();
            let status = self
                .inner
                .decompress(
                    &input[(self.inner.total_in() - start_in) as usize..],
                    &mut scratch,
                    FlushDecompress::Sync,
                )
                .map_err(|e| FilterError::Deflate(e.to_string()))?;
            let produced = (self.inner.total_out() - before_out) as usize;
            output.extend_from_slice(&scratch[..produced]);

            match status {
                Status::StreamEnd => break,
                Status::Ok if produced == 0 => break,
                Status::Ok => continue,
                Status::BufError => break,
            }
        }
        Ok((self.inner.total_in() - start_in) as usize)
    }
}

impl Default for RawDeflateDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn raw_deflate(data: &[u8]) -> Vec<u8> {
        let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn decompresses_single_block_without_dictionary() {
        let original = b"the quick brown fox jumps over the lazy dog";
        let compressed = raw_deflate(original);

        let mut decoder = RawDeflateDecoder::new();
        let mut out = Vec::new();
        decoder.decompress(&compressed, &mut out).unwrap();
        assert_eq!(out, original);
    }

    #[test]
    fn dictionary_reset_is_accepted_between_blocks() {
        let first = b"AAAAAAAAAABBBBBBBBBBCCCCCCCCCC";
        let compressed_first = raw_deflate(first);
        let mut decoder = RawDeflateDecoder::new();
        let mut out1 = Vec::new();
        decoder.decompress(&compressed_first, &mut out1).unwrap();
        assert_eq!(out1, first);

        // Reset with the previous output as dictionary, as CAB/MSZIP does
        // between CFDATA blocks in the same folder.
        decoder.reset_with_dictionary(&out1).unwrap();
        let second = b"DDDDDDDDDDEEEEEEEEEE";
        let compressed_second = raw_deflate(second);
        let mut out2 = Vec::new();
        decoder.decompress(&compressed_second, &mut out2).unwrap();
        assert_eq!(out2, second);
    }
}
