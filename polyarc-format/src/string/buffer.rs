//! A growable byte buffer modeled on spec.md §3's `archive_string` core.
//!
//! Capacity grows by doubling until it reaches 8 KiB, then by 25% per
//! `ensure` call. A failed growth resets length and capacity to zero rather
//! than leaving the buffer in a partially-grown state, matching the spec's
//! "allocation failure degrades to empty buffer" contract.

use super::error::{StringError, StringResult};

const DOUBLE_UNTIL: usize = 8 * 1024;
const GROWTH_NUMERATOR: usize = 5;
const GROWTH_DENOMINATOR: usize = 4;

/// A growable byte buffer with explicit length, independent of any NUL
/// terminator. A trailing NUL is maintained for debug display only and is
/// never counted in [`ByteBuffer::len`].
#[derive(Debug, Clone, Default)]
pub struct ByteBuffer {
    data: Vec<u8>,
}

impl ByteBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// Current length in bytes (excludes the debug NUL terminator).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the buffer's contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Ensure capacity for at least `additional` more bytes, growing by
    /// doubling (below [`DOUBLE_UNTIL`]) or by 25% (at or above it).
    ///
    /// On allocation failure the buffer is released and both length and
    /// capacity reset to zero, so a subsequent append is a safe no-op
    /// rather than a silent truncation.
    pub fn ensure(&mut self, additional: usize) -> StringResult<()> {
        let required = self.data.len() + additional;
        if required <= self.data.capacity() {
            return Ok(());
        }

        let mut target = self.data.capacity().max(1);
        while target < required {
            target = if target < DOUBLE_UNTIL {
                target * 2
            } else {
                target + target * GROWTH_NUMERATOR / GROWTH_DENOMINATOR
            };
        }

        match self.data.try_reserve(target - self.data.len()) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.data = Vec::new();
                Err(StringError::AllocationFailed { requested: target })
            }
        }
    }

    /// Append raw bytes, growing as needed.
    pub fn append(&mut self, bytes: &[u8]) -> StringResult<()> {
        self.ensure(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Truncate to zero length without releasing capacity.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Consume the buffer, returning the owned bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grows_by_doubling_below_8kib() {
        let mut buf = ByteBuffer::new();
        buf.ensure(100).unwrap();
        assert!(buf.data.capacity() >= 100);
        let cap_after_first = buf.data.capacity();
        assert!(cap_after_first < DOUBLE_UNTIL);
    }

    #[test]
    fn append_tracks_length_exactly() {
        let mut buf = ByteBuffer::new();
        buf.append(b"hello").unwrap();
        buf.append(b" world").unwrap();
        assert_eq!(buf.len(), 11);
        assert_eq!(buf.as_bytes(), b"hello world");
    }

    #[test]
    fn clear_resets_length_not_capacity() {
        let mut buf = ByteBuffer::new();
        buf.append(b"0123456789").unwrap();
        let cap = buf.data.capacity();
        buf.clear();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.data.capacity(), cap);
    }
}
