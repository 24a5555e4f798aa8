//! The seek-capable half of the bid contest (spec.md §4.1, §4.2
//! "Bidding — seekable"). A handful of formats can bid with certainty
//! once random access is available (ZIP's end-of-central-directory
//! record, in particular) rather than inferring from a forward-scan
//! prefix; [`SeekBidder`] is the seat for those.

use std::io::{Read, Seek};

use crate::format::{FormatReader, FormatResult};

use super::Bid;

/// Marker trait for a source that supports both [`Read`] and [`Seek`].
/// Rust doesn't let a `dyn` type name two arbitrary supertraits directly,
/// so this blanket-impl'd trait is the seam that makes `dyn ReadSeek`
/// usable as a trait object.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// A format bidder that inspects (and may roam freely across) a
/// seek-capable source rather than a fixed forward-scan prefix. Used for
/// formats whose most authoritative signature sits away from the start
/// of the stream (spec.md §4.2: ZIP's EOCD record at end-of-file).
pub trait SeekBidder: Send + Sync {
    /// Stable name, matched against [`FormatReader::name`].
    fn name(&self) -> &'static str;

    /// Inspect `source`, seeking as needed. The contest restores the
    /// source's position to the start before trying the next bidder, so
    /// implementations need not undo their own seeks.
    fn bid(&self, source: &mut dyn ReadSeek) -> std::io::Result<Option<Bid>>;

    /// Construct the full reader after winning the contest. `source` is
    /// positioned wherever [`SeekBidder::bid`] left it; the implementation
    /// is responsible for seeking to wherever it needs (e.g. the central
    /// directory) and must leave `source` positioned at the start of the
    /// archive before returning, ready for the winner's own sequential
    /// [`FormatReader::next_header`]/[`FormatReader::read_data`] calls.
    fn init_reader(&self, source: &mut dyn ReadSeek) -> FormatResult<Box<dyn FormatReader>>;
}
