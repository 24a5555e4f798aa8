//! Layer 2: the format/filter bidder registry (spec.md §4.1).
//!
//! Mirrors the filter chain's bid contest in [`crate::iostream::push_filters`]
//! one layer up: every registered format bidder inspects the same
//! read-ahead prefix and returns a confidence score; the highest bid wins,
//! ties break by registration order.

mod error;
mod seek;

pub use error::{RegistryError, RegistryResult};
pub use seek::{ReadSeek, SeekBidder};

use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use tracing::debug;

use crate::format::FormatReader;

/// How many leading bytes a format bidder gets to inspect, non-consuming.
/// Generous enough to cover CAB's 44-byte CFHEADER and ZIP's 30-byte
/// local header; a bidder needing to scan further (CAB's PE-prefix
/// `MSCF` search up to 128 KiB) does its own seeking once it has won and
/// `reader_init` runs.
pub const BID_PREFIX_LEN: usize = 64;

/// A bidder's confidence score. Per spec.md §4.1's suggested convention,
/// `>= UNIQUE_MATCH` means the signature was matched uniquely; lower
/// values represent weaker inference (a seekable variant bidding slightly
/// above its streamable peer to win ties when seeking is available).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Bid(pub u32);

/// Bid threshold conventionally meaning "signature uniquely matched".
pub const UNIQUE_MATCH_BID: u32 = 32;

impl Bid {
    /// True if this bid meets the "signature uniquely matched" convention.
    pub fn is_unique_match(&self) -> bool {
        self.0 >= UNIQUE_MATCH_BID
    }
}

/// A registered format: a name, a bidding function, and a constructor for
/// the full [`FormatReader`] once it has won the contest. Kept distinct
/// from `FormatReader` itself so bidding never requires allocating or
/// initializing per-format state that a loser would just discard.
pub trait Bidder: Send + Sync {
    /// Stable name, matched against [`FormatReader::name`].
    fn name(&self) -> &'static str;

    /// Inspect a non-consumed read-ahead prefix and return a bid, or
    /// `None` to decline. `best_so_far` is the current leader's bid, so a
    /// bidder that cannot possibly beat it may return early.
    fn bid(&self, prefix: &[u8], best_so_far: Option<Bid>) -> Option<Bid>;

    /// Construct the full reader after winning the contest.
    fn init_reader(&self) -> Box<dyn FormatReader>;
}

/// Owns the registered format bidders and runs the contest described in
/// spec.md §4.1. Construction never fails: `new` starts empty and
/// `register` is an infallible push, matching spec.md's "legal only in
/// state NEW" constraint, which the handle state machine in `polyarc`
/// enforces rather than the registry itself.
#[derive(Default)]
pub struct FormatRegistry {
    bidders: Vec<Box<dyn Bidder>>,
    seek_bidders: Vec<Box<dyn SeekBidder>>,
}

impl FormatRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            bidders: Vec::new(),
            seek_bidders: Vec::new(),
        }
    }

    /// Register a format bidder. Registration order is the tie-break
    /// order for the contest.
    pub fn register(&mut self, bidder: Box<dyn Bidder>) {
        self.bidders.push(bidder);
    }

    /// Register a seek-capable format bidder (spec.md §4.2 "Bidding —
    /// seekable"). Tried ahead of the prefix-only bidders in
    /// [`FormatRegistry::contest_seekable`]; registration order is still
    /// the tie-break rule among seek bidders themselves.
    pub fn register_seekable(&mut self, bidder: Box<dyn SeekBidder>) {
        self.seek_bidders.push(bidder);
    }

    /// Number of registered prefix-only bidders.
    pub fn len(&self) -> usize {
        self.bidders.len()
    }

    /// True if no prefix-only bidder is registered.
    pub fn is_empty(&self) -> bool {
        self.bidders.is_empty()
    }

    /// Run the bid contest against `source`, returning the winning
    /// format's fully-constructed [`FormatReader`] and the read-ahead
    /// prefix that was buffered during bidding (so the caller can
    /// re-prepend it ahead of the winner's own reads). `Err` if no
    /// bidder bids positively.
    pub fn contest(
        &self,
        source: &mut dyn Read,
    ) -> RegistryResult<(Box<dyn FormatReader>, Vec<u8>)> {
        let mut reader = BufReader::new(source);
        let prefix = reader.fill_buf()?;
        let prefix = prefix[..prefix.len().min(BID_PREFIX_LEN)].to_vec();

        let mut best: Option<(Bid, usize)> = None;
        for (idx, bidder) in self.bidders.iter().enumerate() {
            let best_bid = best.map(|(b, _)| b);
            let this_bid = bidder.bid(&prefix, best_bid);
            debug!(bidder = bidder.name(), bid = ?this_bid, "format bid");
            if let Some(bid) = this_bid {
                match best {
                    Some((b, _)) if bid <= b => {}
                    _ => best = Some((bid, idx)),
                }
            }
        }

        match best {
            Some((_, idx)) => {
                let reader = self.bidders[idx].init_reader();
                Ok((reader, prefix))
            }
            None => Err(RegistryError::Unrecognized),
        }
    }

    /// Run the bid contest against a seek-capable `source`, trying the
    /// registered [`SeekBidder`]s alongside the ordinary prefix-only
    /// [`Bidder`]s (spec.md §4.2 "Bidding — seekable": the seekable ZIP
    /// variant bids 32, beating its streamable sibling's 30). `source` is
    /// always left positioned at the start of the archive on return,
    /// whichever kind of bidder won.
    pub fn contest_seekable(
        &self,
        source: &mut dyn ReadSeek,
    ) -> RegistryResult<Box<dyn FormatReader>> {
        let mut best: Option<(Bid, usize)> = None;

        for (idx, bidder) in self.seek_bidders.iter().enumerate() {
            let best_bid = best.map(|(b, _)| b);
            let this_bid = bidder.bid(source)?;
            source.seek(SeekFrom::Start(0))?;
            debug!(bidder = bidder.name(), bid = ?this_bid, "seekable format bid");
            if let Some(bid) = this_bid {
                match best {
                    Some((b, _)) if bid <= b => {}
                    _ => best = Some((bid, idx)),
                }
            }
        }
        let seek_best = best;

        let mut prefix = vec![0u8; BID_PREFIX_LEN];
        let n = read_prefix(source, &mut prefix)?;
        prefix.truncate(n);
        source.seek(SeekFrom::Start(0))?;

        let mut prefix_best: Option<(Bid, usize)> = None;
        for (idx, bidder) in self.bidders.iter().enumerate() {
            let best_bid = prefix_best.map(|(b, _)| b).or_else(|| seek_best.map(|(b, _)| b));
            let this_bid = bidder.bid(&prefix, best_bid);
            debug!(bidder = bidder.name(), bid = ?this_bid, "format bid (seekable path)");
            if let Some(bid) = this_bid {
                match prefix_best {
                    Some((b, _)) if bid <= b => {}
                    _ => prefix_best = Some((bid, idx)),
                }
            }
        }

        match (seek_best, prefix_best) {
            (Some((seek_bid, seek_idx)), Some((prefix_bid, prefix_idx))) => {
                if seek_bid >= prefix_bid {
                    self.seek_bidders[seek_idx].init_reader(source).map_err(RegistryError::from)
                } else {
                    let reader = self.bidders[prefix_idx].init_reader();
                    source.seek(SeekFrom::Start(0))?;
                    Ok(reader)
                }
            }
            (Some((_, seek_idx)), None) => {
                self.seek_bidders[seek_idx].init_reader(source).map_err(RegistryError::from)
            }
            (None, Some((_, prefix_idx))) => {
                let reader = self.bidders[prefix_idx].init_reader();
                source.seek(SeekFrom::Start(0))?;
                Ok(reader)
            }
            (None, None) => Err(RegistryError::Unrecognized),
        }
    }
}

fn read_prefix(source: &mut dyn Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = source.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}
