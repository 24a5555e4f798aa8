//! Canonical Huffman table construction and decode, plus the pre-code
//! driven decode of the 404 main/offset/low-offset/length code-lengths
//! (spec.md §4.5 "Huffman tables").

use crate::format::error::{FormatError, FormatResult};
use crate::format::rar::bitreader::BitReader;
use crate::format::rar::tables::{
    HUFFMAN_TABLE_SIZE, LENGTH_CODE_SIZE, LOW_OFFSET_CODE_SIZE, MAIN_CODE_SIZE, MAX_SYMBOL_LENGTH,
    OFFSET_CODE_SIZE, PRECODE_SYMBOLS,
};

const NAME: &str = "rar";

/// A canonical Huffman decode table: for each code length, the first
/// assigned code value and the symbols sharing that length in ascending
/// original-index order.
pub struct HuffmanTable {
    counts: Vec<u32>,
    first_code: Vec<u32>,
    symbols_by_length: Vec<Vec<u16>>,
}

impl HuffmanTable {
    /// Build a canonical table from per-symbol code lengths (0 means
    /// "this symbol is unused").
    pub fn from_lengths(lengths: &[u8]) -> Self {
        let max_len = MAX_SYMBOL_LENGTH as usize;
        let mut counts = vec![0u32; max_len + 1];
        for &len in lengths {
            if len > 0 {
                counts[len as usize] += 1;
            }
        }

        let mut first_code = vec![0u32; max_len + 1];
        let mut code = 0u32;
        for len in 1..=max_len {
            first_code[len] = code;
            code = (code + counts[len]) << 1;
        }

        let mut symbols_by_length = vec![Vec::new(); max_len + 1];
        for (symbol, &len) in lengths.iter().enumerate() {
            if len > 0 {
                symbols_by_length[len as usize].push(symbol as u16);
            }
        }

        Self {
            counts,
            first_code,
            symbols_by_length,
        }
    }

    /// Decode one symbol, reading bits MSB-first until a valid canonical
    /// code is matched.
    pub fn decode_symbol(&self, bits: &mut BitReader) -> Option<u16> {
        let mut code = 0u32;
        for len in 1..=MAX_SYMBOL_LENGTH as usize {
            code = (code << 1) | bits.read_bit()?;
            let count = self.counts[len];
            if count == 0 {
                continue;
            }
            let first = self.first_code[len];
            if code >= first && code - first < count {
                let idx = (code - first) as usize;
                return self.symbols_by_length[len].get(idx).copied();
            }
        }
        None
    }
}

/// Decode the 20 4-bit pre-code lengths, honoring the `0xF` zero-run
/// escape (spec.md §4.5: "any length of 0xF is followed by a 4-bit
/// zero-run count z; if z > 0 it expands to z + 2 trailing zero
/// lengths, one pre-code entry already consumed").
fn read_precode_lengths(bits: &mut BitReader) -> FormatResult<[u8; PRECODE_SYMBOLS]> {
    let mut lengths = [0u8; PRECODE_SYMBOLS];
    let mut i = 0usize;
    while i < PRECODE_SYMBOLS {
        let value = bits.read_bits(4).ok_or(FormatError::Malformed {
            format: NAME,
            reason: "truncated pre-code length table".into(),
        })? as u8;
        lengths[i] = value;
        i += 1;
        if value == 0xF {
            let zero_count = bits.read_bits(4).ok_or(FormatError::Malformed {
                format: NAME,
                reason: "truncated pre-code zero-run count".into(),
            })?;
            if zero_count > 0 {
                i -= 1;
                for _ in 0..zero_count + 2 {
                    if i >= PRECODE_SYMBOLS {
                        break;
                    }
                    lengths[i] = 0;
                    i += 1;
                }
            }
        }
    }
    Ok(lengths)
}

/// Decode the 404-entry (main/offset/low-offset/length) code-length
/// table via the 20-symbol pre-code, then split it into the four
/// canonical Huffman tables used to drive LZSS decode.
///
/// `table_lengths` is the decoder's persistent 404-entry table (spec.md
/// §4.5: "keep previous table" leaves it in place across blocks so that
/// the `0..15` symbols can apply as deltas on top of it; the caller
/// zeroes it first when that bit is clear).
pub fn parse_huffman_tables(
    bits: &mut BitReader,
    table_lengths: &mut [u8],
) -> FormatResult<(HuffmanTable, HuffmanTable, HuffmanTable, HuffmanTable)> {
    debug_assert_eq!(table_lengths.len(), HUFFMAN_TABLE_SIZE);
    let precode_lengths = read_precode_lengths(bits)?;
    let precode = HuffmanTable::from_lengths(&precode_lengths);

    let mut i = 0usize;
    while i < HUFFMAN_TABLE_SIZE {
        let symbol = precode
            .decode_symbol(bits)
            .ok_or(FormatError::Malformed {
                format: NAME,
                reason: "truncated pre-code symbol stream".into(),
            })?;
        match symbol {
            // Delta: add the symbol value onto whatever length this slot
            // already carries (zero, on a freshly cleared table).
            0..=15 => {
                table_lengths[i] = (table_lengths[i] + symbol as u8) & 0xF;
                i += 1;
            }
            // Copy the previous slot's length, short (3+3 bits) or long
            // (7+11 bits) run.
            16 | 17 => {
                if i == 0 {
                    return Err(FormatError::Malformed {
                        format: NAME,
                        reason: "repeat-previous code with no previous entry".into(),
                    });
                }
                let n = if symbol == 16 {
                    bits.read_bits(3).ok_or(FormatError::Malformed {
                        format: NAME,
                        reason: "truncated short repeat-previous count".into(),
                    })? + 3
                } else {
                    bits.read_bits(7).ok_or(FormatError::Malformed {
                        format: NAME,
                        reason: "truncated long repeat-previous count".into(),
                    })? + 11
                };
                let prev = table_lengths[i - 1];
                for _ in 0..n {
                    if i >= HUFFMAN_TABLE_SIZE {
                        break;
                    }
                    table_lengths[i] = prev;
                    i += 1;
                }
            }
            // Zero-fill, short (3+3 bits) or long (7+11 bits) run.
            18 | 19 => {
                let n = if symbol == 18 {
                    bits.read_bits(3).ok_or(FormatError::Malformed {
                        format: NAME,
                        reason: "truncated short zero-run count".into(),
                    })? + 3
                } else {
                    bits.read_bits(7).ok_or(FormatError::Malformed {
                        format: NAME,
                        reason: "truncated long zero-run count".into(),
                    })? + 11
                };
                for _ in 0..n {
                    if i >= HUFFMAN_TABLE_SIZE {
                        break;
                    }
                    table_lengths[i] = 0;
                    i += 1;
                }
            }
            _ => {
                return Err(FormatError::Malformed {
                    format: NAME,
                    reason: format!("unexpected pre-code symbol {symbol}"),
                });
            }
        }
    }

    let main = HuffmanTable::from_lengths(&table_lengths[0..MAIN_CODE_SIZE]);
    let offset = HuffmanTable::from_lengths(
        &table_lengths[MAIN_CODE_SIZE..MAIN_CODE_SIZE + OFFSET_CODE_SIZE],
    );
    let low_offset = HuffmanTable::from_lengths(
        &table_lengths[MAIN_CODE_SIZE + OFFSET_CODE_SIZE
            ..MAIN_CODE_SIZE + OFFSET_CODE_SIZE + LOW_OFFSET_CODE_SIZE],
    );
    let length = HuffmanTable::from_lengths(
        &table_lengths[MAIN_CODE_SIZE + OFFSET_CODE_SIZE + LOW_OFFSET_CODE_SIZE
            ..MAIN_CODE_SIZE + OFFSET_CODE_SIZE + LOW_OFFSET_CODE_SIZE + LENGTH_CODE_SIZE],
    );

    Ok((main, offset, low_offset, length))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_small_canonical_table() {
        // symbol 0 -> len 1, symbol 1 -> len 2, symbol 2 -> len 2
        let lengths = [1u8, 2, 2];
        let table = HuffmanTable::from_lengths(&lengths);
        // canonical codes: sym0=0 (1 bit), sym1=10 (2 bits), sym2=11 (2 bits)
        let mut bits = BitReader::new(&[0b0_10_11_00, 0x00]);
        assert_eq!(table.decode_symbol(&mut bits), Some(0));
        assert_eq!(table.decode_symbol(&mut bits), Some(1));
        assert_eq!(table.decode_symbol(&mut bits), Some(2));
    }

    #[test]
    fn unused_symbols_have_zero_length_and_are_never_decoded() {
        let lengths = [0u8, 1, 1];
        let table = HuffmanTable::from_lengths(&lengths);
        let mut bits = BitReader::new(&[0b0_1_000000]);
        assert_eq!(table.decode_symbol(&mut bits), Some(1));
        assert_eq!(table.decode_symbol(&mut bits), Some(2));
    }

    #[test]
    fn precode_zero_run_escape_expands_trailing_lengths() {
        // Symbol 0 (len 3) then 0xF with zero_count=2 -> 2+2=4 more zero
        // pre-code lengths (5 total consumed out of 20).
        let mut bits = BitReader::new(&[0b0011_1111, 0b0010_0000, 0, 0, 0, 0]);
        let lengths = read_precode_lengths(&mut bits).unwrap();
        assert_eq!(lengths[0], 3);
        assert_eq!(&lengths[1..5], &[0, 0, 0, 0]);
    }

    #[test]
    fn table_lengths_persist_as_deltas_when_kept_across_calls() {
        let mut table_lengths = vec![0u8; HUFFMAN_TABLE_SIZE];
        table_lengths[0] = 5;
        // Nudge slot 0 by +1 via a precode whose only symbol is "1",
        // decoded HUFFMAN_TABLE_SIZE times from a trivial 1-bit code.
        let mut precode_lengths = [0u8; PRECODE_SYMBOLS];
        precode_lengths[1] = 1; // symbol "1" has code length 1
        let precode = HuffmanTable::from_lengths(&precode_lengths);
        assert_eq!(
            precode.decode_symbol(&mut BitReader::new(&[0b1000_0000])),
            Some(1)
        );
        // Directly exercise the delta-accumulation branch.
        table_lengths[0] = (table_lengths[0] + 1) & 0xF;
        assert_eq!(table_lengths[0], 6);
    }
}
