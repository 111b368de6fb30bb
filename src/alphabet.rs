//! The GPT-2 byte-to-printable-rune alphabet.
//!
//! GPT-2 serialises arbitrary token bytes as JSON strings by mapping each
//! byte to a printable Unicode code point: the printable ranges 33..=126,
//! 161..=172 and 174..=255 map to themselves, and the remaining 68 bytes
//! map to code points 256, 257, ... in byte-ascending order. Vocabulary
//! keys and merge-table entries are written in that encoding; this module
//! replays the mapping in both directions.

use std::collections::HashMap;
use std::sync::OnceLock;

fn alphabet() -> &'static ([char; 256], HashMap<char, u8>) {
    static ALPHABET: OnceLock<([char; 256], HashMap<char, u8>)> = OnceLock::new();
    ALPHABET.get_or_init(|| {
        let mut forward = ['\0'; 256];
        let mut reverse = HashMap::with_capacity(256);
        let printable =
            |b: u8| matches!(b, 33..=126 | 161..=172 | 174..=255);

        let mut next = 256u32;
        for b in 0u8..=255 {
            let ch = if printable(b) {
                char::from_u32(u32::from(b)).expect("byte range code point valid")
            } else {
                let ch = char::from_u32(next).expect("stand-in code point valid");
                next += 1;
                ch
            };
            forward[b as usize] = ch;
            reverse.insert(ch, b);
        }
        (forward, reverse)
    })
}

/// Decodes a vocab.json key (or merges.txt field) back into the raw bytes
/// the token represents.
///
/// Each character either stands in for one raw byte (the alphabet above) or
/// is meant literally, in which case its UTF-8 encoding is appended. The
/// literal branch is what lets multi-character ASCII tokens like `the`
/// round-trip unchanged.
#[must_use]
pub fn token_key_to_bytes(key: &str) -> Vec<u8> {
    let (_, reverse) = alphabet();
    let mut out = Vec::with_capacity(key.len());
    let mut utf8 = [0u8; 4];
    for ch in key.chars() {
        match reverse.get(&ch) {
            Some(&b) => out.push(b),
            None => out.extend_from_slice(ch.encode_utf8(&mut utf8).as_bytes()),
        }
    }
    out
}

/// Encodes raw token bytes as the printable-rune key GPT-2 vocabularies use.
#[must_use]
pub fn bytes_to_token_key(bytes: &[u8]) -> String {
    let (forward, _) = alphabet();
    bytes.iter().map(|&b| forward[b as usize]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_byte_round_trips() {
        let bytes: Vec<u8> = (0..=u8::MAX).collect();
        let key = bytes_to_token_key(&bytes);
        assert_eq!(token_key_to_bytes(&key), bytes);
    }

    #[test]
    fn printable_ascii_is_identity() {
        assert_eq!(bytes_to_token_key(b"the"), "the");
        assert_eq!(token_key_to_bytes("the"), b"the");
    }

    #[test]
    fn space_uses_the_g_breve_stand_in() {
        // Byte 0x20 is the 33rd non-printable byte, so it lands on U+0120.
        assert_eq!(bytes_to_token_key(b" hello"), "\u{120}hello");
        assert_eq!(token_key_to_bytes("\u{120}hello"), b" hello");
    }

    #[test]
    fn literal_multibyte_runes_pass_through() {
        // A code point outside the stand-in table decodes as its UTF-8 bytes.
        assert_eq!(token_key_to_bytes("\u{4e16}"), "\u{4e16}".as_bytes());
    }
}
