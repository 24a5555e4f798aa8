//! LZSS length/offset base and bit-width tables (spec.md §4.5's "length
//! base/extra tables", "offset base/extra tables", short-match tables).
//!
//! Carried over verbatim from `original_source/libarchive`'s
//! `archive_read_support_format_rar.c` `expand()`, which is the
//! normative source for these constants (spec.md describes their shape
//! but not their exact values).

/// Length-code base values, indexed by the length symbol (both the
/// `259..=262` recent-offset path and the `271..` long-match path reuse
/// this table with different index offsets).
pub const LENGTH_BASES: [u16; 28] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 10, 12, 14, 16, 20, 24, 28, 32, 40, 48, 56, 64, 80, 96, 112, 128,
    160, 192, 224,
];

/// Extra bits to read and add to the corresponding `LENGTH_BASES` entry.
pub const LENGTH_BITS: [u8; 28] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5,
];

/// Offset-code base values for the long-match path (`271..` symbols).
pub const OFFSET_BASES: [u32; 60] = [
    0, 1, 2, 3, 4, 6, 8, 12, 16, 24, 32, 48, 64, 96, 128, 192, 256, 384, 512, 768, 1024, 1536,
    2048, 3072, 4096, 6144, 8192, 12288, 16384, 24576, 32768, 49152, 65536, 98304, 131072, 196608,
    262144, 327680, 393216, 458752, 524288, 589824, 655360, 720896, 786432, 851968, 917504,
    983040, 1048576, 1310720, 1572864, 1835008, 2097152, 2359296, 2621440, 2883584, 3145728,
    3407872, 3670016, 3932160,
];

/// Extra bits for the corresponding `OFFSET_BASES` entry.
pub const OFFSET_BITS: [u8; 60] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13, 14, 14, 15, 15, 16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 16, 18, 18, 18, 18, 18, 18, 18,
    18, 18, 18, 18, 18,
];

/// Short-match (`263..=270`) offset base values.
pub const SHORT_BASES: [u16; 8] = [0, 4, 8, 16, 32, 64, 128, 192];

/// Extra bits for the corresponding `SHORT_BASES` entry.
pub const SHORT_BITS: [u8; 8] = [2, 2, 3, 4, 5, 6, 6, 6];

/// Symbol-count sizes for the four Huffman tables that split the 388
/// code-length entries (spec.md §4.5 "From the 388 code-lengths...").
pub const MAIN_CODE_SIZE: usize = 299;
pub const OFFSET_CODE_SIZE: usize = 60;
pub const LOW_OFFSET_CODE_SIZE: usize = 17;
pub const LENGTH_CODE_SIZE: usize = 28;
pub const HUFFMAN_TABLE_SIZE: usize =
    MAIN_CODE_SIZE + OFFSET_CODE_SIZE + LOW_OFFSET_CODE_SIZE + LENGTH_CODE_SIZE;

/// Pre-code symbol count and max code length (spec.md: "20 x 4-bit
/// code-lengths for the pre-code").
pub const PRECODE_SYMBOLS: usize = 20;
pub const MAX_SYMBOL_LENGTH: u8 = 15;

/// Dictionary window cap (spec.md §4.5 "LZSS core").
pub const DICTIONARY_MAX_SIZE: usize = 4 * 1024 * 1024;
