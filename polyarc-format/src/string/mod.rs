//! Growable string buffers and locale/UTF-8/UTF-16 charset conversion.
//!
//! Mirrors spec.md §3 ("String") and §4.7 ("String, charset, and matcher
//! cores"): a resizable byte buffer with doubling-then-25%-growth, a
//! multi-string bundle that memoizes lazy conversions between encodings,
//! and a two-slot LRU of charset converters.

mod buffer;
mod charset;
mod error;
mod multi;
mod utf16;

pub use buffer::ByteBuffer;
pub use charset::{CharsetConverter, CharsetDirection};
pub use error::StringError;
pub use multi::{EncodingKind, MultiString};
pub use utf16::{decode_utf16be, encode_utf16be};
