//! MSZIP block decoding (spec.md §4.4 "Decompression state").

use crate::format::error::{FormatError, FormatResult};
use crate::iostream::RawDeflateDecoder;

const NAME: &str = "cab";

/// `43 4B` ("CK") MSZIP block signature.
pub const MSZIP_SIGNATURE: [u8; 2] = [0x43, 0x4B];

/// Per-folder MSZIP decoder state: the raw-deflate primitive plus the
/// previous block's output, carried forward as the next block's preset
/// dictionary.
pub struct MsZipFolderDecoder {
    inner: RawDeflateDecoder,
    history: Vec<u8>,
    first_block: bool,
}

impl MsZipFolderDecoder {
    /// A decoder for a fresh folder (no dictionary carried in).
    pub fn new() -> Self {
        Self {
            inner: RawDeflateDecoder::new(),
            history: Vec::new(),
            first_block: true,
        }
    }

    /// Decode one CFDATA payload (signature included) into `output`.
    pub fn decode_block(&mut self, payload: &[u8], output: &mut Vec<u8>) -> FormatResult<()> {
        if payload.len() < 2 || payload[0..2] != MSZIP_SIGNATURE {
            return Err(FormatError::Malformed {
                format: NAME,
                reason: "missing MSZIP block signature".into(),
            });
        }

        if self.first_block {
            self.first_block = false;
        } else {
            self.inner
                .reset_with_dictionary(&self.history)
                .map_err(FormatError::Filter)?;
        }

        let before = output.len();
        self.inner
            .decompress(&payload[2..], output)
            .map_err(FormatError::Filter)?;

        self.history.clear();
        self.history.extend_from_slice(&output[before..]);
        Ok(())
    }
}

impl Default for MsZipFolderDecoder {
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

    fn mszip_block(data: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        let compressed = encoder.finish().unwrap();
        let mut block = MSZIP_SIGNATURE.to_vec();
        block.extend_from_slice(&compressed);
        block
    }

    #[test]
    fn decodes_two_chained_blocks() {
        let mut decoder = MsZipFolderDecoder::new();
        let mut out = Vec::new();

        let first = b"first block of folder data";
        decoder
            .decode_block(&mszip_block(first), &mut out)
            .unwrap();
        assert_eq!(&out, first);

        let second = b"second block, dictionary chained";
        decoder
            .decode_block(&mszip_block(second), &mut out)
            .unwrap();
        assert_eq!(&out[first.len()..], second);
    }

    #[test]
    fn rejects_block_missing_signature() {
        let mut decoder = MsZipFolderDecoder::new();
        let mut out = Vec::new();
        let err = decoder.decode_block(b"not mszip", &mut out).unwrap_err();
        assert!(matches!(err, FormatError::Malformed { .. }));
    }
}
