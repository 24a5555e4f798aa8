//! Charset converter cache (spec.md §3 "Charset converter", §4.7).
//!
//! The spec treats converters as opaque descriptors obtained from the
//! platform locale layer; that layer is explicitly out of scope (spec.md
//! §1 lists "per-platform syscall shims" as a collaborator, not something
//! this crate implements). [`LocaleCodec`] is the pluggable seam: the
//! default [`Utf8LocaleCodec`] treats the current locale as UTF-8, which is
//! the common case on modern Linux/macOS and keeps the cache's eviction and
//! memoization logic independently testable without a real iconv binding.

use std::collections::VecDeque;

use super::error::{StringError, StringResult};

/// Direction of a single conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharsetDirection {
    /// From the named charset into the current locale's encoding.
    ToCurrentLocale,
    /// From the current locale's encoding into the named charset.
    FromCurrentLocale,
}

/// A pluggable "current locale" codec. Real implementations would bind to
/// iconv or an equivalent platform API; see the module doc for why this
/// crate ships only the UTF-8 default.
pub trait LocaleCodec: std::fmt::Debug {
    /// Decode locale-encoded bytes to UTF-8.
    fn to_utf8(&self, bytes: &[u8]) -> StringResult<String>;
    /// Encode a UTF-8 string to locale-encoded bytes.
    fn from_utf8(&self, s: &str) -> StringResult<Vec<u8>>;
}

/// Default locale codec: current locale == UTF-8.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8LocaleCodec;

impl LocaleCodec for Utf8LocaleCodec {
    fn to_utf8(&self, bytes: &[u8]) -> StringResult<String> {
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| StringError::ConversionFailed {
                charset: "current-locale".to_string(),
                reason: e.to_string(),
            })
    }

    fn from_utf8(&self, s: &str) -> StringResult<Vec<u8>> {
        Ok(s.as_bytes().to_vec())
    }
}

struct Slot {
    charset: String,
}

/// A 2-slot LRU of charset converters, keyed by charset name.
///
/// A miss evicts the least-recently-used slot. Both conversion directions
/// live in the same slot (spec.md: "Each slot stores both directions").
/// The cache holds no OS resources itself — the codec is shared — so
/// "release on close" is simply dropping the cache with the owning handle.
pub struct CharsetConverter {
    codec: Box<dyn LocaleCodec>,
    slots: VecDeque<Slot>,
    capacity: usize,
}

impl std::fmt::Debug for CharsetConverter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharsetConverter")
            .field("capacity", &self.capacity)
            .field("cached", &self.slots.len())
            .finish()
    }
}

impl Default for CharsetConverter {
    fn default() -> Self {
        Self::new(Box::new(Utf8LocaleCodec))
    }
}

impl CharsetConverter {
    /// Create a converter cache around the given locale codec, with the
    /// spec-mandated capacity of 2.
    pub fn new(codec: Box<dyn LocaleCodec>) -> Self {
        Self {
            codec,
            slots: VecDeque::with_capacity(2),
            capacity: 2,
        }
    }

    /// Record use of `charset`, evicting the LRU slot on a capacity miss.
    fn touch(&mut self, charset: &str) {
        if let Some(pos) = self.slots.iter().position(|s| s.charset == charset) {
            let slot = self.slots.remove(pos).unwrap();
            self.slots.push_back(slot);
            return;
        }
        if self.slots.len() >= self.capacity {
            self.slots.pop_front();
        }
        self.slots.push_back(Slot {
            charset: charset.to_string(),
        });
    }

    /// Convert `bytes` from `charset` into the current locale's encoding
    /// (round-tripping through UTF-8 since `charset` is always UTF-8 in
    /// this engine's internal representation).
    pub fn convert(
        &mut self,
        charset: &str,
        direction: CharsetDirection,
        data: &[u8],
    ) -> StringResult<Vec<u8>> {
        self.touch(charset);
        match direction {
            CharsetDirection::ToCurrentLocale => {
                let s = std::str::from_utf8(data).map_err(|e| StringError::ConversionFailed {
                    charset: charset.to_string(),
                    reason: e.to_string(),
                })?;
                self.codec.from_utf8(s)
            }
            CharsetDirection::FromCurrentLocale => {
                let s = self.codec.to_utf8(data)?;
                Ok(s.into_bytes())
            }
        }
    }

    /// Number of charsets currently cached (0, 1, or 2).
    pub fn cached_len(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used_on_third_charset() {
        let mut conv = CharsetConverter::default();
        conv.touch("ISO-8859-1");
        conv.touch("CP437");
        assert_eq!(conv.cached_len(), 2);
        conv.touch("UTF-16LE");
        assert_eq!(conv.cached_len(), 2);
        assert!(conv.slots.iter().any(|s| s.charset == "CP437"));
        assert!(conv.slots.iter().any(|s| s.charset == "UTF-16LE"));
        assert!(!conv.slots.iter().any(|s| s.charset == "ISO-8859-1"));
    }

    #[test]
    fn touching_existing_slot_marks_it_most_recent() {
        let mut conv = CharsetConverter::default();
        conv.touch("A");
        conv.touch("B");
        conv.touch("A"); // A is now most-recently-used
        conv.touch("C"); // should evict B, not A
        assert!(conv.slots.iter().any(|s| s.charset == "A"));
        assert!(conv.slots.iter().any(|s| s.charset == "C"));
    }
}
