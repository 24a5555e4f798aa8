//! Layer 3: the entry data model and per-format codecs (spec.md §3, §4.2-
//! §4.5).

pub mod entry;
mod error;

pub mod cab;
pub mod filters;
pub mod rar;
pub mod stubs;
pub mod zip;

pub use entry::{Entry, FileType, Timestamp};
pub use error::{FormatError, FormatResult, ReadSeverity};

use std::io::Read;

use crate::registry::Bid;

/// The full default bidder set a [`crate::registry::FormatRegistry`]
/// registers unless the caller customizes it: the implemented codecs
/// (ZIP, CAB, RAR) ahead of the recognized-but-unimplemented container
/// family from spec.md §1, in that order — registration order is the
/// tie-break rule (spec.md §4.1 point 3), and an implemented codec
/// should always win a tie against a stub that merely recognizes the
/// same signature.
pub fn default_format_bidders() -> Vec<Box<dyn crate::registry::Bidder>> {
    let mut bidders: Vec<Box<dyn crate::registry::Bidder>> = vec![
        Box::new(zip::ZipBidder),
        Box::new(cab::CabBidder),
        Box::new(rar::RarBidder),
    ];
    bidders.extend(stubs::recognized_only_formats());
    bidders
}

/// The default seek-capable bidder set (spec.md §4.2 "Bidding —
/// seekable"): tried ahead of [`default_format_bidders`]'s prefix-only
/// set whenever the source supports [`crate::registry::ReadSeek`].
pub fn default_seek_bidders() -> Vec<Box<dyn crate::registry::SeekBidder>> {
    vec![Box::new(zip::ZipSeekableBidder)]
}

/// A data block handed back from [`FormatReader::read_data_block`]: a
/// borrowed slice into the codec's internal scratch buffer, plus the
/// archive-relative offset it starts at (spec.md §6's
/// `read_data_block(&buf, &size, &offset)`).
pub struct DataBlock<'a> {
    /// The decoded bytes.
    pub data: &'a [u8],
    /// Offset of `data[0]` within the entry's uncompressed payload.
    pub offset: u64,
}

/// The per-format reader contract (spec.md §4.1's registered-format
/// entry: `bidder, reader_init, header_reader, data_block_reader,
/// data_skipper, cleanup`). One implementation per container format;
/// [`crate::registry::FormatRegistry`] runs the bid contest and owns the
/// winner for the handle's lifetime.
pub trait FormatReader: Send {
    /// Stable name (`"zip"`, `"cab"`, `"rar"`, ...).
    fn name(&self) -> &'static str;

    /// Inspect a non-consumed read-ahead prefix and return a bid, or
    /// `None` to decline. `best_so_far` lets a bidder short-circuit once
    /// it knows it cannot win (spec.md §4.1 point 2).
    fn bid(&self, prefix: &[u8], best_so_far: Option<u32>) -> Option<Bid>;

    /// Parse the next entry header, advancing past any unread payload of
    /// the previous entry. Returns `Ok(None)` at end of archive.
    fn next_header(&mut self, source: &mut dyn Read) -> FormatResult<Option<Entry>>;

    /// Read the next chunk of the current entry's payload into `buf`,
    /// returning the number of bytes written (0 at end of entry).
    fn read_data(&mut self, source: &mut dyn Read, buf: &mut [u8]) -> FormatResult<usize>;

    /// Skip the remainder of the current entry's payload without
    /// decoding it, when the codec can do so cheaply.
    fn read_data_skip(&mut self, source: &mut dyn Read) -> FormatResult<()>;
}
