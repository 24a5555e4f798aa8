//! RAR v1-v4 LZSS decode (spec.md §4.5 "LZSS core").
//!
//! Ported from the `expand()` state machine in
//! `original_source/libarchive`'s `archive_read_support_format_rar.c`,
//! which is the normative source for the exact symbol semantics (spec.md
//! describes the shape of the match alphabet but not, for example, the
//! interaction between the recent-offset LRU and
//! `numlowoffsetrepeats`).
//!
//! Unlike the C original's bounded ring-buffer window (sized to a power
//! of two and capped at 4 MiB, with output copied out incrementally as
//! the window fills), this decoder accumulates the whole entry into one
//! growing buffer — the same full-buffering choice [`super::reader`]
//! makes for packed bytes, and [`crate::format::cab::reader`] makes for
//! CAB folders. The decoded bytes are identical either way; only the
//! bounded-memory property of the windowed version is given up.

use crate::format::error::{FormatError, FormatResult};

use super::bitreader::BitReader;
use super::huffman::{parse_huffman_tables, HuffmanTable};
use super::tables::{
    HUFFMAN_TABLE_SIZE, LENGTH_BASES, LENGTH_BITS, OFFSET_BASES, OFFSET_BITS, SHORT_BASES,
    SHORT_BITS,
};

const NAME: &str = "rar";

/// Main-alphabet symbol marking end-of-block / possible new tables.
const SYM_END_OF_BLOCK: u16 = 256;
/// Main-alphabet symbol for a filter (unsupported in this engine).
const SYM_FILTER: u16 = 257;
/// Main-alphabet symbol repeating the last match verbatim.
const SYM_REPEAT_LAST_MATCH: u16 = 258;
/// Main-alphabet symbols using a recent-offset slot (259..=262).
const SYM_RECENT_OFFSET_BASE: u16 = 259;
const SYM_RECENT_OFFSET_END: u16 = 262;
/// Main-alphabet symbols for a length-2 short match (263..=270).
const SYM_SHORT_MATCH_BASE: u16 = 263;
const SYM_SHORT_MATCH_END: u16 = 270;

/// Low-offset code symbol meaning "repeat the last low offset 15 more
/// times" (spec.md §4.5 "a run-length repeat mechanism on symbol 16").
const LOW_OFFSET_REPEAT_SYMBOL: u16 = 16;

/// Per-file Huffman tables plus the recent-offset/low-offset state the
/// decoder threads across matches within one file's compressed stream.
pub struct LzssDecoder {
    table_lengths: Vec<u8>,
    main: Option<HuffmanTable>,
    offset: Option<HuffmanTable>,
    low_offset: Option<HuffmanTable>,
    length: Option<HuffmanTable>,
    old_offset: [u32; 4],
    last_low_offset: u32,
    num_low_offset_repeats: u32,
}

impl LzssDecoder {
    /// A decoder with an all-zero persistent length table, as at the
    /// start of a fresh file's compressed stream.
    pub fn new() -> Self {
        Self {
            table_lengths: vec![0u8; HUFFMAN_TABLE_SIZE],
            main: None,
            offset: None,
            low_offset: None,
            length: None,
            old_offset: [0; 4],
            last_low_offset: 0,
            num_low_offset_repeats: 0,
        }
    }

    /// Parse one block's Huffman tables (spec.md §4.5 "A block begins
    /// with..."). `keep_table` false zeroes the persistent length table
    /// first; true lets the `0..15` pre-code symbols apply as deltas on
    /// top of whatever the previous block left behind.
    fn parse_block_tables(&mut self, bits: &mut BitReader, keep_table: bool) -> FormatResult<()> {
        if !keep_table {
            self.table_lengths.iter_mut().for_each(|b| *b = 0);
        }
        let (main, offset, low_offset, length) =
            parse_huffman_tables(bits, &mut self.table_lengths)?;
        self.main = Some(main);
        self.offset = Some(offset);
        self.low_offset = Some(low_offset);
        self.length = Some(length);
        Ok(())
    }

    /// Read the per-block header (spec.md §4.5): a PPMd marker bit
    /// (reject if set), then the keep-table bit and tables.
    fn read_block_header(&mut self, bits: &mut BitReader) -> FormatResult<()> {
        let ppmd = bits.read_bit().ok_or(FormatError::Malformed {
            format: NAME,
            reason: "truncated LZSS block header".into(),
        })?;
        if ppmd != 0 {
            return Err(FormatError::UnsupportedMethod {
                format: NAME,
                method: "PPMd".into(),
                fatal: true,
            });
        }
        let keep_table = bits.read_bit().ok_or(FormatError::Malformed {
            format: NAME,
            reason: "truncated LZSS block header".into(),
        })? != 0;
        self.parse_block_tables(bits, keep_table)
    }

    /// Decode exactly `unpacked_size` bytes into `out`, appending.
    pub fn decode(
        &mut self,
        bits: &mut BitReader,
        unpacked_size: u64,
        out: &mut Vec<u8>,
    ) -> FormatResult<()> {
        self.read_block_header(bits)?;

        let mut last_offset = 0u32;
        let mut last_length = 0u32;
        let target = out.len() as u64 + unpacked_size;

        while (out.len() as u64) < target {
            let symbol = self
                .main
                .as_ref()
                .expect("tables parsed before decode loop")
                .decode_symbol(bits)
                .ok_or(FormatError::Malformed {
                    format: NAME,
                    reason: "truncated LZSS symbol stream".into(),
                })?;

            match symbol {
                0..=255 => out.push(symbol as u8),
                SYM_END_OF_BLOCK => {
                    let ends_here = bits.read_bit().ok_or(FormatError::Malformed {
                        format: NAME,
                        reason: "truncated end-of-block bit".into(),
                    })? == 0;
                    if ends_here {
                        let new_table = bits.read_bit().ok_or(FormatError::Malformed {
                            format: NAME,
                            reason: "truncated new-table bit".into(),
                        })? != 0;
                        if new_table {
                            self.parse_block_tables(bits, false)?;
                        }
                    } else {
                        self.parse_block_tables(bits, true)?;
                    }
                }
                SYM_FILTER => {
                    return Err(FormatError::UnsupportedMethod {
                        format: NAME,
                        method: "filter".into(),
                        fatal: true,
                    });
                }
                SYM_REPEAT_LAST_MATCH => {
                    if last_length == 0 {
                        continue;
                    }
                    emit_match(out, last_offset, last_length)?;
                }
                SYM_RECENT_OFFSET_BASE..=SYM_RECENT_OFFSET_END => {
                    let slot = (symbol - SYM_RECENT_OFFSET_BASE) as usize;
                    let offs = self.old_offset[slot];
                    let len_symbol = self
                        .length
                        .as_ref()
                        .expect("tables parsed before decode loop")
                        .decode_symbol(bits)
                        .ok_or(FormatError::Malformed {
                            format: NAME,
                            reason: "truncated length symbol".into(),
                        })?;
                    let mut len = u32::from(LENGTH_BASES[len_symbol as usize]) + 2;
                    let extra_bits = LENGTH_BITS[len_symbol as usize];
                    if extra_bits > 0 {
                        len += bits.read_bits(extra_bits).ok_or(FormatError::Malformed {
                            format: NAME,
                            reason: "truncated length extra bits".into(),
                        })?;
                    }
                    for i in (1..=slot).rev() {
                        self.old_offset[i] = self.old_offset[i - 1];
                    }
                    self.old_offset[0] = offs;
                    emit_match(out, offs, len)?;
                    last_offset = offs;
                    last_length = len;
                }
                SYM_SHORT_MATCH_BASE..=SYM_SHORT_MATCH_END => {
                    let idx = (symbol - SYM_SHORT_MATCH_BASE) as usize;
                    let mut offs = u32::from(SHORT_BASES[idx]) + 1;
                    if SHORT_BITS[idx] > 0 {
                        offs += bits
                            .read_bits(SHORT_BITS[idx])
                            .ok_or(FormatError::Malformed {
                                format: NAME,
                                reason: "truncated short-match extra bits".into(),
                            })?;
                    }
                    let len = 2u32;
                    for i in (1..=3).rev() {
                        self.old_offset[i] = self.old_offset[i - 1];
                    }
                    self.old_offset[0] = offs;
                    emit_match(out, offs, len)?;
                    last_offset = offs;
                    last_length = len;
                }
                _ => {
                    let len_idx = (symbol - 271) as usize;
                    let mut len = u32::from(LENGTH_BASES[len_idx]) + 3;
                    let extra_bits = LENGTH_BITS[len_idx];
                    if extra_bits > 0 {
                        len += bits.read_bits(extra_bits).ok_or(FormatError::Malformed {
                            format: NAME,
                            reason: "truncated long-match length bits".into(),
                        })?;
                    }
                    let offs_symbol = self
                        .offset
                        .as_ref()
                        .expect("tables parsed before decode loop")
                        .decode_symbol(bits)
                        .ok_or(FormatError::Malformed {
                            format: NAME,
                            reason: "truncated offset symbol".into(),
                        })?;
                    let mut offs = OFFSET_BASES[offs_symbol as usize] + 1;
                    let offs_bits = OFFSET_BITS[offs_symbol as usize];
                    if offs_bits > 0 {
                        if offs_symbol > 9 {
                            if offs_bits > 4 {
                                offs += bits.read_bits(offs_bits - 4).ok_or(
                                    FormatError::Malformed {
                                        format: NAME,
                                        reason: "truncated high offset bits".into(),
                                    },
                                )? << 4;
                            }
                            if self.num_low_offset_repeats > 0 {
                                self.num_low_offset_repeats -= 1;
                                offs += self.last_low_offset;
                            } else {
                                let low_symbol = self
                                    .low_offset
                                    .as_ref()
                                    .expect("tables parsed before decode loop")
                                    .decode_symbol(bits)
                                    .ok_or(FormatError::Malformed {
                                        format: NAME,
                                        reason: "truncated low-offset symbol".into(),
                                    })?;
                                if low_symbol == LOW_OFFSET_REPEAT_SYMBOL {
                                    self.num_low_offset_repeats = 15;
                                    offs += self.last_low_offset;
                                } else {
                                    offs += u32::from(low_symbol);
                                    self.last_low_offset = u32::from(low_symbol);
                                }
                            }
                        } else {
                            offs += bits.read_bits(offs_bits).ok_or(FormatError::Malformed {
                                format: NAME,
                                reason: "truncated offset extra bits".into(),
                            })?;
                        }
                    }
                    if offs >= 0x4_0000 {
                        len += 1;
                    }
                    if offs >= 0x2000 {
                        len += 1;
                    }
                    for i in (1..=3).rev() {
                        self.old_offset[i] = self.old_offset[i - 1];
                    }
                    self.old_offset[0] = offs;
                    emit_match(out, offs, len)?;
                    last_offset = offs;
                    last_length = len;
                }
            }
        }

        Ok(())
    }
}

impl Default for LzssDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy `length` bytes from `current_pos - offset` forward, byte by
/// byte, so overlapping self-referential matches (offset < length)
/// repeat correctly (spec.md §4.5 "overlap allowed").
fn emit_match(out: &mut Vec<u8>, offset: u32, length: u32) -> FormatResult<()> {
    let offset = offset as usize;
    if offset == 0 || offset > out.len() {
        return Err(FormatError::Malformed {
            format: NAME,
            reason: format!("match offset {offset} exceeds decoded length {}", out.len()),
        });
    }
    let start = out.len() - offset;
    for i in 0..length as usize {
        let byte = out[start + i];
        out.push(byte);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_match_handles_single_byte_overlap_run() {
        let mut out = vec![b'A'];
        emit_match(&mut out, 1, 5).unwrap();
        assert_eq!(out, b"AAAAAA");
    }

    #[test]
    fn emit_match_rejects_offset_past_start() {
        let mut out = vec![b'A'];
        assert!(emit_match(&mut out, 2, 1).is_err());
    }
}
