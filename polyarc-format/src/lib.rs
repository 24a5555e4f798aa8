//! Format registry, bidder dispatch, and streaming codecs for the polyarc
//! archive engine.
//!
//! This crate provides the L0-L3 layers of the archive engine: growable
//! string/charset buffers, a stackable I/O filter chain, the format/filter
//! bidder registry, and the streaming codecs for ZIP (read + write), CAB
//! (read), and RAR v1-v4 (read).
//!
//! # Layers
//!
//! - [`string`] — growable byte/wide buffers and locale/UTF-8/UTF-16 charset
//!   conversion with a small LRU cache.
//! - [`iostream`] — the stackable filter chain (decompression filters sit
//!   between the raw byte source and a format codec).
//! - [`registry`] — the bid contest that lets a reader self-identify a
//!   format without committing to one up front.
//! - [`format`] — the entry data model plus the ZIP/CAB/RAR codecs.

#![warn(missing_docs)]

pub mod format;
pub mod iostream;
pub mod registry;
pub mod string;

pub use format::entry::{Entry, FileType, Timestamp};
pub use format::{default_format_bidders, default_seek_bidders, FormatReader, ReadSeverity};
pub use registry::{Bid, Bidder, FormatRegistry, ReadSeek, SeekBidder};

/// The full default filter-bidder set spanning both layers: the
/// implemented codecs in [`iostream`] ahead of the recognized-but-
/// unimplemented byte-level filter family in [`format::filters`] (same
/// registration-order tie-break rationale as
/// [`format::default_format_bidders`]).
pub fn default_filter_bidders() -> Vec<Box<dyn iostream::FilterBidder>> {
    let mut bidders = iostream::default_filter_bidders();
    bidders.extend(format::filters::recognized_only_filters());
    bidders
}
