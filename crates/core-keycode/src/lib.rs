//! core-keycode: the logical key model and the in-band byte protocol.
//!
//! Every key that flows through the input pipeline is a byte string. Plain
//! ASCII and UTF-8 multi-byte characters travel as themselves; everything
//! else (named keys, modifier masks, a literal 0x80 or NUL byte) is escaped
//! into a fixed three-byte sequence introduced by [`K_SPECIAL`]. Keeping the
//! escape in-band means one storage format serves typeahead, the redo
//! buffer, recorded registers and script files alike.
//!
//! The codec lives in [`codec`]; this module defines the key/modifier model
//! and the pure key transforms (modifier merging, keypad aliasing).

use bitflags::bitflags;

pub mod codec;

pub use codec::{Decoded, decode, encode_char, encode_key, encode_special, utf8_len};

/// Lead byte of every escape triple. Never appears bare in a buffer.
pub const K_SPECIAL: u8 = 0x80;

/// Second byte: the third byte is a modifier mask for the following key.
pub const KS_MODIFIER: u8 = 252;
/// Second byte: the third byte enumerates a named special key.
pub const KS_EXTRA: u8 = 253;
/// Second byte: `K_SPECIAL KS_SPECIAL KE_FILLER` is a literal 0x80 byte.
pub const KS_SPECIAL: u8 = 254;
/// Second byte: `K_SPECIAL KS_ZERO KE_FILLER` is a literal NUL byte.
pub const KS_ZERO: u8 = 255;
/// Third byte used by the two literal-byte escapes.
pub const KE_FILLER: u8 = b'X';

pub const ESC: u8 = 0x1b;
pub const CTRL_C: u8 = 0x03;
pub const CTRL_K: u8 = 0x0b;
pub const CTRL_V: u8 = 0x16;
pub const CTRL_W: u8 = 0x17;
pub const CTRL_BSL: u8 = 0x1c;
pub const CAR: u8 = b'\r';
pub const DEL: u8 = 0x7f;

bitflags! {
    /// Modifier mask carried by a `KS_MODIFIER` triple.
    ///
    /// Bit layout is part of the wire protocol; the multi-click bits are
    /// only meaningful on mouse keys.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct ModMask: u8 {
        const SHIFT  = 1;
        const ALT    = 2;
        const CTRL   = 4;
        const META   = 8;
        const CMD    = 16;
        const CLICK2 = 32;
        const CLICK3 = 64;
        const CLICK4 = 128;
    }
}

/// Named keys with no single-byte representation.
///
/// Each variant maps to a stable code carried as the third byte of a
/// `K_SPECIAL KS_EXTRA code` triple; see [`SpecialKey::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialKey {
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    Backspace,
    Help,
    Undo,
    /// Function key, 1..=37.
    F(u8),
    // Keypad keys; unmapped ones fall back to their plain equivalent.
    KPlus,
    KMinus,
    KMultiply,
    KDivide,
    KEnter,
    KPoint,
    KComma,
    KEqual,
    KDigit(u8),
    KHome,
    KEnd,
    KUp,
    KDown,
    KLeft,
    KRight,
    KPageUp,
    KPageDown,
    KInsert,
    KDelete,
    // Mouse events. Geometry travels out of band; only the event identity
    // is encoded in the key stream.
    LeftMouse,
    LeftDrag,
    LeftRelease,
    MiddleMouse,
    MiddleDrag,
    MiddleRelease,
    RightMouse,
    RightDrag,
    RightRelease,
    MouseMove,
    ScrollWheelUp,
    ScrollWheelDown,
    ScrollWheelLeft,
    ScrollWheelRight,
    PasteStart,
    PasteEnd,
    /// Consumed silently by the dispatcher; used to force a pass through
    /// the main loop (e.g. after an `<expr>` mapping produced nothing).
    Ignore,
    /// Does nothing at all.
    Nop,
    /// Prefix reserved for mapping-only pseudo keys; always remappable.
    Plug,
    /// Introduces an embedded command-line fragment in a mapping RHS.
    Cmd,
    /// Switches the dispatcher back to Select mode after a Visual-mode
    /// mapping ran on a Select-mode selection.
    Select,
}

const KE_KDIGIT_BASE: u8 = 60;
const KE_F_BASE: u8 = 80;

impl SpecialKey {
    /// Stable third-byte code for the `KS_EXTRA` triple.
    pub fn code(self) -> u8 {
        use SpecialKey::*;
        match self {
            Up => 1,
            Down => 2,
            Left => 3,
            Right => 4,
            Home => 5,
            End => 6,
            PageUp => 7,
            PageDown => 8,
            Insert => 9,
            Delete => 10,
            Backspace => 11,
            Help => 12,
            Undo => 13,
            Ignore => 14,
            Nop => 15,
            Plug => 16,
            Cmd => 17,
            Select => 18,
            PasteStart => 19,
            PasteEnd => 20,
            KPlus => 21,
            KMinus => 22,
            KMultiply => 23,
            KDivide => 24,
            KEnter => 25,
            KPoint => 26,
            KComma => 27,
            KEqual => 28,
            KHome => 29,
            KEnd => 30,
            KUp => 31,
            KDown => 32,
            KLeft => 33,
            KRight => 34,
            KPageUp => 35,
            KPageDown => 36,
            KInsert => 37,
            KDelete => 38,
            LeftMouse => 39,
            LeftDrag => 40,
            LeftRelease => 41,
            MiddleMouse => 42,
            MiddleDrag => 43,
            MiddleRelease => 44,
            RightMouse => 45,
            RightDrag => 46,
            RightRelease => 47,
            MouseMove => 48,
            ScrollWheelUp => 49,
            ScrollWheelDown => 50,
            ScrollWheelLeft => 51,
            ScrollWheelRight => 52,
            KDigit(d) => KE_KDIGIT_BASE + d.min(9),
            F(n) => KE_F_BASE + n.clamp(1, 37),
        }
    }

    /// Inverse of [`SpecialKey::code`]. Unknown codes decode to [`SpecialKey::Nop`]
    /// so a foreign byte stream degrades to a harmless key instead of
    /// desynchronizing the triple framing.
    pub fn from_code(code: u8) -> SpecialKey {
        use SpecialKey::*;
        match code {
            1 => Up,
            2 => Down,
            3 => Left,
            4 => Right,
            5 => Home,
            6 => End,
            7 => PageUp,
            8 => PageDown,
            9 => Insert,
            10 => Delete,
            11 => Backspace,
            12 => Help,
            13 => Undo,
            14 => Ignore,
            15 => Nop,
            16 => Plug,
            17 => Cmd,
            18 => Select,
            19 => PasteStart,
            20 => PasteEnd,
            21 => KPlus,
            22 => KMinus,
            23 => KMultiply,
            24 => KDivide,
            25 => KEnter,
            26 => KPoint,
            27 => KComma,
            28 => KEqual,
            29 => KHome,
            30 => KEnd,
            31 => KUp,
            32 => KDown,
            33 => KLeft,
            34 => KRight,
            35 => KPageUp,
            36 => KPageDown,
            37 => KInsert,
            38 => KDelete,
            39 => LeftMouse,
            40 => LeftDrag,
            41 => LeftRelease,
            42 => MiddleMouse,
            43 => MiddleDrag,
            44 => MiddleRelease,
            45 => RightMouse,
            46 => RightDrag,
            47 => RightRelease,
            48 => MouseMove,
            49 => ScrollWheelUp,
            50 => ScrollWheelDown,
            51 => ScrollWheelLeft,
            52 => ScrollWheelRight,
            c if (KE_KDIGIT_BASE..KE_KDIGIT_BASE + 10).contains(&c) => KDigit(c - KE_KDIGIT_BASE),
            c if (KE_F_BASE + 1..=KE_F_BASE + 37).contains(&c) => F(c - KE_F_BASE),
            _ => Nop,
        }
    }
}

/// One logical key: either a Unicode scalar or a named special key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Char(char),
    Special(SpecialKey),
}

impl Key {
    pub fn is_special(self) -> bool {
        matches!(self, Key::Special(_))
    }
}

/// Keys for which Alt-folding to an ESC prefix must be suppressed:
/// terminals encode mouse reports as CSI sequences where the Alt bit is
/// meaningful even for unmapped keys.
pub fn is_mouse_key(key: Key) -> bool {
    use SpecialKey::*;
    matches!(
        key,
        Key::Special(
            LeftMouse
                | LeftDrag
                | LeftRelease
                | MiddleMouse
                | MiddleDrag
                | MiddleRelease
                | RightMouse
                | RightDrag
                | RightRelease
                | MouseMove
                | ScrollWheelUp
                | ScrollWheelDown
                | ScrollWheelLeft
                | ScrollWheelRight
        )
    )
}

/// Fold modifiers into an equivalent simpler key where one exists.
///
/// Ctrl plus an ASCII key in the `@..DEL` range becomes the corresponding
/// control byte with Ctrl cleared; Shift plus a lowercase ASCII letter
/// becomes the uppercase letter. Modifiers that cannot be folded stay in
/// the returned mask.
pub fn merge_modifiers(key: Key, mods: ModMask) -> (Key, ModMask) {
    let mut key = key;
    let mut mods = mods;

    if mods.contains(ModMask::SHIFT)
        && let Key::Char(c) = key
        && c.is_ascii_lowercase()
    {
        key = Key::Char(c.to_ascii_uppercase());
        mods.remove(ModMask::SHIFT);
    }

    if mods.contains(ModMask::CTRL)
        && let Key::Char(c) = key
        && c.is_ascii()
    {
        let b = c as u8;
        let folded = match b {
            b'@'..=b'_' | b'`'..=DEL => Some(b & 0x1f),
            b'2' => Some(0),    // Ctrl-2 is an alias for Ctrl-@
            b'6' => Some(0x1e), // Ctrl-6 is an alias for Ctrl-^
            b'-' => Some(0x1f),
            _ => None,
        };
        if let Some(f) = folded {
            key = Key::Char(f as char);
            mods.remove(ModMask::CTRL);
        }
    }

    (key, mods)
}

/// Translate an unmapped keypad key to its plain equivalent.
pub fn keypad_to_plain(key: SpecialKey) -> Option<Key> {
    use SpecialKey::*;
    Some(match key {
        KPlus => Key::Char('+'),
        KMinus => Key::Char('-'),
        KMultiply => Key::Char('*'),
        KDivide => Key::Char('/'),
        KEnter => Key::Char('\r'),
        KPoint => Key::Char('.'),
        KComma => Key::Char(','),
        KEqual => Key::Char('='),
        KDigit(d) => Key::Char((b'0' + d.min(9)) as char),
        KHome => Key::Special(Home),
        KEnd => Key::Special(End),
        KUp => Key::Special(Up),
        KDown => Key::Special(Down),
        KLeft => Key::Special(Left),
        KRight => Key::Special(Right),
        KPageUp => Key::Special(PageUp),
        KPageDown => Key::Special(PageDown),
        KInsert => Key::Special(Insert),
        KDelete => Key::Special(Delete),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn special_key_codes_round_trip() {
        let keys = [
            SpecialKey::Up,
            SpecialKey::Backspace,
            SpecialKey::F(1),
            SpecialKey::F(37),
            SpecialKey::KDigit(0),
            SpecialKey::KDigit(9),
            SpecialKey::Plug,
            SpecialKey::Cmd,
            SpecialKey::ScrollWheelRight,
        ];
        for k in keys {
            assert_eq!(SpecialKey::from_code(k.code()), k, "{k:?}");
        }
    }

    #[test]
    fn special_key_codes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for code in 0..=u8::MAX {
            let k = SpecialKey::from_code(code);
            if k != SpecialKey::Nop {
                assert!(seen.insert(k.code()), "duplicate code for {k:?}");
            }
        }
    }

    #[test]
    fn ctrl_folds_into_control_byte() {
        let (k, m) = merge_modifiers(Key::Char('a'), ModMask::CTRL);
        assert_eq!(k, Key::Char('\u{1}'));
        assert!(m.is_empty());

        let (k, m) = merge_modifiers(Key::Char('['), ModMask::CTRL);
        assert_eq!(k, Key::Char('\u{1b}'));
        assert!(m.is_empty());
    }

    #[test]
    fn shift_folds_into_uppercase() {
        let (k, m) = merge_modifiers(Key::Char('x'), ModMask::SHIFT | ModMask::ALT);
        assert_eq!(k, Key::Char('X'));
        assert_eq!(m, ModMask::ALT);
    }

    #[test]
    fn unfoldable_modifiers_are_kept() {
        let (k, m) = merge_modifiers(Key::Special(SpecialKey::Up), ModMask::CTRL);
        assert_eq!(k, Key::Special(SpecialKey::Up));
        assert_eq!(m, ModMask::CTRL);
    }

    #[test]
    fn keypad_aliases() {
        assert_eq!(keypad_to_plain(SpecialKey::KPlus), Some(Key::Char('+')));
        assert_eq!(
            keypad_to_plain(SpecialKey::KHome),
            Some(Key::Special(SpecialKey::Home))
        );
        assert_eq!(keypad_to_plain(SpecialKey::Up), None);
    }
}
