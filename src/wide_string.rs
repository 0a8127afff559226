//! Decoding of wide-character strings embedded in hive values and descriptors.
//!
//! Two decoders live here. [`strip_nulls_decode`] is the null-stripping codec the
//! account and descriptor decoders use: it removes *every* zero byte and keeps
//! each remaining byte as one character, which is lossy outside Latin-1.
//! [`decode_utf16le`] is a real UTF-16LE decoder used for registry key and
//! value names.

use encoding::all::{ISO_8859_1, UTF_16LE};
use encoding::{DecoderTrap, Encoding};

/// Drop all zero bytes from `bytes` and map each remaining byte to a char.
///
/// `41 00 42 00` decodes to `"AB"`; `41 00 00 00` decodes to `"A"`. Never fails.
pub fn strip_nulls_decode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .filter(|&&b| b != 0)
        .map(|&b| char::from(b))
        .collect()
}

/// Decode UTF-16LE text, trimming trailing NUL code units.
///
/// Unpaired surrogates and a dangling odd byte are replaced, not reported.
pub fn decode_utf16le(bytes: &[u8]) -> String {
    let mut end = bytes.len() & !1;
    while end >= 2 && bytes[end - 2] == 0 && bytes[end - 1] == 0 {
        end -= 2;
    }

    UTF_16LE
        .decode(&bytes[..end], DecoderTrap::Replace)
        .unwrap_or_else(|err| err.into_owned())
}

/// Decode a single-byte ("compressed") registry name.
pub fn decode_latin1(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    ISO_8859_1
        .decode(&bytes[..end], DecoderTrap::Replace)
        .unwrap_or_else(|err| err.into_owned())
}
