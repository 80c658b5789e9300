//! Byte-level encode/decode for the key protocol.
//!
//! Encoding is total: every `(Key, ModMask)` pair has exactly one byte
//! rendition, and decoding it yields the pair back. The escape rules keep
//! the stream self-framing: 0x80 appears only as the first byte of a
//! triple, and a decoder never consumes across a triple boundary.

use crate::{
    K_SPECIAL, KE_FILLER, KS_EXTRA, KS_MODIFIER, KS_SPECIAL, KS_ZERO, Key, ModMask, SpecialKey,
};

/// Length in bytes of the UTF-8 sequence introduced by `lead`.
/// Continuation and invalid lead bytes count as a single byte.
pub fn utf8_len(lead: u8) -> usize {
    match lead {
        0xc2..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf4 => 4,
        _ => 1,
    }
}

/// Append the UTF-8 form of `ch`, escaping NUL and any 0x80 byte.
///
/// Returns the number of bytes written. 0x80 occurs both as a bare
/// escaped-latin1 value and as a continuation byte inside longer
/// sequences; either way it must not appear unescaped.
pub fn encode_char(ch: char, out: &mut Vec<u8>) -> usize {
    let before = out.len();
    if ch == '\0' {
        out.extend_from_slice(&[K_SPECIAL, KS_ZERO, KE_FILLER]);
        return 3;
    }
    let mut utf8 = [0u8; 4];
    for &b in ch.encode_utf8(&mut utf8).as_bytes() {
        if b == K_SPECIAL {
            out.extend_from_slice(&[K_SPECIAL, KS_SPECIAL, KE_FILLER]);
        } else {
            out.push(b);
        }
    }
    out.len() - before
}

/// Append the `KS_EXTRA` triple for a named key.
pub fn encode_special(key: SpecialKey, out: &mut Vec<u8>) -> usize {
    out.extend_from_slice(&[K_SPECIAL, KS_EXTRA, key.code()]);
    3
}

/// Append the full encoding of a key with modifiers: the modifier triple
/// first (when the mask is nonempty), then the key itself.
pub fn encode_key(key: Key, mods: ModMask, out: &mut Vec<u8>) -> usize {
    let mut n = 0;
    if !mods.is_empty() {
        out.extend_from_slice(&[K_SPECIAL, KS_MODIFIER, mods.bits()]);
        n += 3;
    }
    n + match key {
        Key::Char(c) => encode_char(c, out),
        Key::Special(s) => encode_special(s, out),
    }
}

/// One decoded unit of the byte protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// A character; `len` bytes were consumed (more than the UTF-8 length
    /// when continuation bytes were escaped).
    Char { ch: char, len: usize },
    /// A named special key from a `KS_EXTRA` triple.
    Special { key: SpecialKey, len: usize },
    /// A modifier mask applying to the next decoded unit.
    Modifier { mods: ModMask, len: usize },
    /// The buffer ends in the middle of a triple or multi-byte sequence.
    Incomplete,
}

/// Decode one unit from the front of `bytes`.
///
/// An escaped 0x80 at the start is treated as a bare latin-1 0x80 (it
/// cannot begin a UTF-8 sequence). Invalid UTF-8 degrades to the lead
/// byte as a single unit rather than desynchronizing the stream.
pub fn decode(bytes: &[u8]) -> Decoded {
    let Some(&first) = bytes.first() else {
        return Decoded::Incomplete;
    };

    if first == K_SPECIAL {
        if bytes.len() < 3 {
            return Decoded::Incomplete;
        }
        return match bytes[1] {
            KS_MODIFIER => Decoded::Modifier {
                mods: ModMask::from_bits_truncate(bytes[2]),
                len: 3,
            },
            KS_EXTRA => Decoded::Special {
                key: SpecialKey::from_code(bytes[2]),
                len: 3,
            },
            KS_ZERO => Decoded::Char { ch: '\0', len: 3 },
            // KS_SPECIAL (and anything unrecognized, defensively framed as
            // a triple): a raw 0x80 byte, which cannot start a character.
            _ => Decoded::Char {
                ch: '\u{80}',
                len: 3,
            },
        };
    }

    let want = utf8_len(first);
    if want == 1 {
        return Decoded::Char {
            ch: first as char,
            len: 1,
        };
    }

    // Gather the sequence, unescaping inline 0x80 continuation bytes.
    let mut seq = [0u8; 4];
    let mut seq_len = 1;
    let mut consumed = 1;
    seq[0] = first;
    while seq_len < want {
        match bytes.get(consumed) {
            None => return Decoded::Incomplete,
            Some(&K_SPECIAL) => {
                if bytes.len() < consumed + 3 {
                    return Decoded::Incomplete;
                }
                seq[seq_len] = K_SPECIAL;
                consumed += 3;
            }
            Some(&b) => {
                seq[seq_len] = b;
                consumed += 1;
            }
        }
        seq_len += 1;
    }

    match std::str::from_utf8(&seq[..want]) {
        Ok(s) => Decoded::Char {
            ch: s.chars().next().unwrap_or('\u{fffd}'),
            len: consumed,
        },
        Err(_) => Decoded::Char {
            ch: first as char,
            len: 1,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn round_trip(key: Key, mods: ModMask) {
        let mut buf = Vec::new();
        encode_key(key, mods, &mut buf);

        let mut got_mods = ModMask::empty();
        let mut at = 0;
        let got = loop {
            match decode(&buf[at..]) {
                Decoded::Modifier { mods, len } => {
                    got_mods = mods;
                    at += len;
                }
                Decoded::Char { ch, len } => {
                    at += len;
                    break Key::Char(ch);
                }
                Decoded::Special { key, len } => {
                    at += len;
                    break Key::Special(key);
                }
                Decoded::Incomplete => panic!("incomplete encoding of {key:?}"),
            }
        };
        assert_eq!((got, got_mods), (key, mods));
        assert_eq!(at, buf.len(), "trailing bytes after {key:?}");
    }

    #[test]
    fn keys_survive_encode_decode() {
        for key in [
            Key::Char('a'),
            Key::Char('\0'),
            Key::Char('\u{80}'),
            Key::Char('é'),
            Key::Char('語'),
            Key::Char('𝕏'),
            Key::Special(SpecialKey::Up),
            Key::Special(SpecialKey::F(12)),
            Key::Special(SpecialKey::Plug),
        ] {
            round_trip(key, ModMask::empty());
            round_trip(key, ModMask::ALT);
            round_trip(key, ModMask::CTRL | ModMask::SHIFT);
        }
    }

    #[test]
    fn special_lead_byte_only_opens_triples() {
        // Characters whose UTF-8 form contains 0x80 continuation bytes.
        for ch in ['\u{800}', '\u{2000}', '\u{10000}'] {
            let mut buf = Vec::new();
            encode_char(ch, &mut buf);
            let mut i = 0;
            while i < buf.len() {
                if buf[i] == K_SPECIAL {
                    assert_eq!(buf[i + 1], KS_SPECIAL);
                    assert_eq!(buf[i + 2], KE_FILLER);
                    i += 3;
                } else {
                    i += 1;
                }
            }
        }
    }

    #[test]
    fn escaped_continuation_bytes_decode() {
        // U+0800 is e0 a0 80: the final continuation byte must be escaped
        // and transparently restored.
        let mut buf = Vec::new();
        let n = encode_char('\u{800}', &mut buf);
        assert_eq!(n, 5);
        assert_eq!(
            decode(&buf),
            Decoded::Char {
                ch: '\u{800}',
                len: 5
            }
        );
    }

    #[test]
    fn truncated_triple_is_incomplete() {
        assert_eq!(decode(&[K_SPECIAL]), Decoded::Incomplete);
        assert_eq!(decode(&[K_SPECIAL, KS_MODIFIER]), Decoded::Incomplete);
        assert_eq!(decode(&[0xe0, 0xa0]), Decoded::Incomplete);
    }

    #[test]
    fn invalid_utf8_degrades_to_lead_byte() {
        assert_eq!(
            decode(&[0xe0, b'a', b'b']),
            Decoded::Char {
                ch: 0xe0 as char,
                len: 1
            }
        );
    }
}
