//! Multi-string bundle: a value held in up to three encodings at once,
//! with lazy, memoized cross-conversion (spec.md §3 "String", §4.7).

use unicode_normalization::UnicodeNormalization;

use super::charset::{CharsetConverter, CharsetDirection};
use super::error::StringResult;
use super::utf16::{decode_utf16be, encode_utf16be};

/// Which encodings are currently populated in a [`MultiString`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingKind {
    /// Current-locale multibyte bytes.
    Mbs,
    /// UTF-8 bytes.
    Utf8,
    /// UTF-16 code units (platform-width "wide" form).
    Wcs,
}

/// Code point ranges excluded from NFD conversion because they are
/// precomposed compatibility forms that would not round-trip (spec.md
/// §4.7). Kept as a standalone helper so the exclusion logic is testable
/// independent of whatever normalization backend is wired in.
pub fn excluded_from_nfd(c: char) -> bool {
    let cp = c as u32;
    (0x2000..=0x2FFF).contains(&cp)
        || (0xF900..=0xFAFF).contains(&cp)
        || (0x2F800..=0x2FAFF).contains(&cp)
}

/// Normalize a filename captured while walking an archive header into the
/// form spec.md §4.7 "Normalization" calls for: NFD on platforms whose
/// filesystem layer canonically stores NFD (Apple), NFC everywhere else,
/// with the [`excluded_from_nfd`] code points left precomposed so they
/// still round-trip through the conversion.
pub fn normalize_for_ingestion(s: &str) -> String {
    if cfg!(target_os = "macos") {
        let mut out = String::with_capacity(s.len());
        for c in s.chars() {
            if excluded_from_nfd(c) {
                out.push(c);
            } else {
                out.extend(c.nfd());
            }
        }
        out
    } else {
        s.nfc().collect()
    }
}

/// A bundle of the same textual value in up to three encodings, with a
/// bitmask tracking which forms are populated. Conversions are computed on
/// first request and cached; later requests for the same form are O(1).
#[derive(Debug, Default)]
pub struct MultiString {
    utf8: Option<String>,
    mbs: Option<Vec<u8>>,
    wcs: Option<Vec<u16>>,
}

impl MultiString {
    /// Build a multi-string that already has its UTF-8 form populated.
    pub fn from_utf8(s: impl Into<String>) -> Self {
        Self {
            utf8: Some(s.into()),
            mbs: None,
            wcs: None,
        }
    }

    /// Build a multi-string from a filename read off an archive header,
    /// applying the ingestion-boundary normalization of spec.md §4.7
    /// before the value is stored.
    pub fn from_ingested_utf8(s: impl AsRef<str>) -> Self {
        Self::from_utf8(normalize_for_ingestion(s.as_ref()))
    }

    /// True if `kind` is already populated (would be an O(1) fetch).
    pub fn has(&self, kind: EncodingKind) -> bool {
        match kind {
            EncodingKind::Mbs => self.mbs.is_some(),
            EncodingKind::Utf8 => self.utf8.is_some(),
            EncodingKind::Wcs => self.wcs.is_some(),
        }
    }

    /// Get (computing and memoizing if necessary) the UTF-8 form.
    pub fn as_utf8(&mut self, conv: &mut CharsetConverter) -> StringResult<&str> {
        if self.utf8.is_none() {
            if let Some(wcs) = &self.wcs {
                let bytes: Vec<u8> = wcs.iter().flat_map(|u| u.to_be_bytes()).collect();
                let (decoded, _warnings) = decode_utf16be(&bytes)?;
                self.utf8 = Some(decoded);
            } else if let Some(mbs) = &self.mbs {
                let converted =
                    conv.convert("current-locale", CharsetDirection::FromCurrentLocale, mbs)?;
                self.utf8 = Some(String::from_utf8_lossy(&converted).into_owned());
            } else {
                self.utf8 = Some(String::new());
            }
        }
        Ok(self.utf8.as_deref().unwrap())
    }

    /// Get (computing and memoizing if necessary) the wide (UTF-16) form.
    pub fn as_wcs(&mut self, conv: &mut CharsetConverter) -> StringResult<&[u16]> {
        if self.wcs.is_none() {
            let utf8 = self.as_utf8(conv)?.to_string();
            self.wcs = Some(utf8.encode_utf16().collect());
        }
        Ok(self.wcs.as_deref().unwrap())
    }

    /// Get (computing and memoizing if necessary) the current-locale bytes.
    pub fn as_mbs(&mut self, conv: &mut CharsetConverter) -> StringResult<&[u8]> {
        if self.mbs.is_none() {
            let utf8 = self.as_utf8(conv)?.to_string();
            let bytes = conv.convert("current-locale", CharsetDirection::ToCurrentLocale, utf8.as_bytes())?;
            self.mbs = Some(bytes);
        }
        Ok(self.mbs.as_deref().unwrap())
    }

    /// Re-encode as big-endian UTF-16 bytes (used by ZIP/RAR Unicode
    /// name fields), without touching the memoized wide form.
    pub fn to_utf16be(&mut self, conv: &mut CharsetConverter) -> StringResult<Vec<u8>> {
        Ok(encode_utf16be(self.as_utf8(conv)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memoizes_utf8_to_wcs_conversion() {
        let mut conv = CharsetConverter::default();
        let mut ms = MultiString::from_utf8("hello");
        assert!(!ms.has(EncodingKind::Wcs));
        let wcs = ms.as_wcs(&mut conv).unwrap().to_vec();
        assert_eq!(wcs, "hello".encode_utf16().collect::<Vec<_>>());
        assert!(ms.has(EncodingKind::Wcs));
    }

    #[test]
    fn exclusion_ranges_cover_general_punctuation_and_cjk_compat() {
        assert!(excluded_from_nfd('\u{2010}')); // general punctuation
        assert!(excluded_from_nfd('\u{FA10}')); // CJK compatibility ideograph
        assert!(!excluded_from_nfd('a'));
    }

    #[test]
    fn ingestion_normalization_round_trips_precomposed_latin() {
        // "caf\u{e9}" (precomposed) and "cafe\u{301}" (decomposed) are
        // canonically equivalent; ingestion should fold both to the same
        // platform-appropriate form.
        let precomposed = "caf\u{e9}";
        let decomposed = "cafe\u{0301}";
        let a = normalize_for_ingestion(precomposed);
        let b = normalize_for_ingestion(decomposed);
        assert_eq!(a, b);
    }

    #[test]
    fn ingestion_normalization_leaves_excluded_code_points_precomposed() {
        // U+FA10 lies in the CJK-compatibility exclusion range (spec.md
        // §4.7); even on an NFD platform it must not be decomposed.
        let s = "\u{FA10}";
        assert_eq!(normalize_for_ingestion(s), s);
    }

    #[test]
    fn as_mbs_round_trips_through_default_utf8_locale() {
        let mut conv = CharsetConverter::default();
        let mut ms = MultiString::from_utf8("caf\u{e9}");
        let mbs = ms.as_mbs(&mut conv).unwrap().to_vec();
        assert_eq!(mbs, "caf\u{e9}".as_bytes());
    }
}
