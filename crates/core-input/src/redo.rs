//! The redo buffer pair and replay preparation.
//!
//! Every completed change serializes a canonical key sequence into the
//! redo buffer: optional register, optional count, command characters,
//! then whatever the command read. Repeating pushes that sequence into
//! the replay buffer, where the source multiplexer finds it ahead of
//! typeahead.
//!
//! Two buffers are kept so a read-only excursion between changes (the
//! `<C-O>` escape from insert mode) does not lose the previous change:
//! starting a new change parks the current buffer in `old`, and canceling
//! restores it.

use core_keycode::codec::{Decoded, decode};
use core_typeahead::BlockChain;
use tracing::{debug, trace};

/// Facts recovered from the redo prefix when replay starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RedoStart {
    /// The recorded command ran on a Visual selection; the dispatcher
    /// must re-enter Visual mode before replaying.
    pub visual: bool,
    /// The expression register is used; its re-evaluation must not echo.
    pub silent: bool,
}

/// Deep-copied redo pair for nested invocations.
#[derive(Debug)]
pub struct RedoFrame {
    redobuf: BlockChain,
    old: BlockChain,
}

#[derive(Debug, Default)]
pub(crate) struct RedoState {
    redobuf: BlockChain,
    old: BlockChain,
    /// Set while a replayed insert runs so the replay does not overwrite
    /// the very buffer it is reading from.
    block: bool,
}

impl RedoState {
    pub(crate) fn is_blocked(&self) -> bool {
        self.block
    }

    pub(crate) fn set_blocked(&mut self, on: bool) {
        self.block = on;
    }

    /// Start a fresh redo sequence, keeping the previous one reachable.
    pub(crate) fn reset(&mut self) {
        if self.block {
            return;
        }
        self.old = self.redobuf.take();
        trace!(target: "input.redo", "reset");
    }

    /// Throw away the sequence being built and bring the previous one
    /// back.
    pub(crate) fn cancel(&mut self) {
        if self.block {
            return;
        }
        self.redobuf = self.old.take();
        trace!(target: "input.redo", "cancel");
    }

    pub(crate) fn append_raw(&mut self, bytes: &[u8]) {
        if !self.block {
            self.redobuf.append(bytes);
        }
    }

    pub(crate) fn append_char(&mut self, ch: char) {
        if !self.block {
            self.redobuf.append_char(ch);
        }
    }

    pub(crate) fn append_key(&mut self, key: core_keycode::Key, mods: core_keycode::ModMask) {
        if !self.block {
            self.redobuf.append_key(key, mods);
        }
    }

    pub(crate) fn append_num(&mut self, n: i64) {
        if !self.block {
            self.redobuf.append_num(n);
        }
    }

    /// Append literal text, protecting characters that would be
    /// re-interpreted on replay.
    ///
    /// Control characters get a Ctrl-V prefix. The sequence never ends in
    /// a bare `0` or `^`, which a following Ctrl-D would treat as an
    /// indent command: a trailing `0` is spelled out as the `048` decimal
    /// form behind Ctrl-V.
    pub(crate) fn append_lit(&mut self, text: &str) {
        if self.block {
            return;
        }
        const CTRL_V: char = '\u{16}';
        const DEL: char = '\u{7f}';
        let chars: Vec<char> = text.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            // A run of plain printable ASCII goes in as-is.
            let start = i;
            while i < chars.len() && chars[i] >= ' ' && chars[i] < DEL {
                i += 1;
            }
            let mut end = i;
            if end == chars.len() && end > start && (chars[end - 1] == '0' || chars[end - 1] == '^')
            {
                end -= 1;
            }
            if end > start {
                let run: String = chars[start..end].iter().collect();
                self.redobuf.append(run.as_bytes());
            }
            i = end.max(start);
            if i >= chars.len() {
                break;
            }

            let c = chars[i];
            i += 1;
            let at_end = i >= chars.len();
            if c < ' ' || c == DEL || (at_end && (c == '0' || c == '^')) {
                self.redobuf.append_char(CTRL_V);
            }
            if at_end && c == '0' {
                self.redobuf.append(b"048");
            } else {
                self.redobuf.append_char(c);
            }
        }
    }

    /// Move the pair out for a nested invocation, leaving a copy of the
    /// active buffer behind so a nested repeat still works.
    pub(crate) fn save(&mut self) -> RedoFrame {
        let redobuf = self.redobuf.take();
        let old = self.old.take();
        self.redobuf = redobuf.duplicate();
        RedoFrame { redobuf, old }
    }

    pub(crate) fn restore(&mut self, frame: RedoFrame) {
        self.redobuf = frame.redobuf;
        self.old = frame.old;
    }

    pub(crate) fn is_empty(&self, use_old: bool) -> bool {
        if use_old {
            self.old.is_empty()
        } else {
            self.redobuf.is_empty()
        }
    }

    /// Prepare `replay` with the recorded sequence.
    ///
    /// A non-zero `count` replaces the recorded count. The register
    /// prefix survives, with a numbered register incremented so repeated
    /// pastes walk the delete ring. A leading `v` marks a Visual replay.
    pub(crate) fn start_redo(
        &mut self,
        replay: &mut BlockChain,
        count: u32,
        use_old: bool,
    ) -> Option<RedoStart> {
        let src = if use_old { &self.old } else { &self.redobuf };
        if src.is_empty() {
            return None;
        }
        let bytes = src.concat();
        let mut cur = Cursor::new(&bytes);
        let mut info = RedoStart::default();

        if cur.peek_char() == Some('"') {
            replay.append(b"\"");
            cur.advance();
            if let Some(mut reg) = cur.peek_char() {
                if ('1'..='8').contains(&reg) {
                    reg = ((reg as u8) + 1) as char;
                }
                replay.append_char(reg);
                if reg == '=' {
                    // Re-evaluate the expression register on replay.
                    replay.append_char('\r');
                    info.silent = true;
                }
                cur.advance();
            }
        }

        if cur.peek_char() == Some('v') {
            info.visual = true;
            cur.advance();
        }

        if count > 0 {
            while matches!(cur.peek_char(), Some(c) if c.is_ascii_digit()) {
                cur.advance();
            }
            replay.append_num(i64::from(count));
        }

        replay.append(cur.rest());
        debug!(target: "input.redo", count, use_old, visual = info.visual, "replay prepared");
        Some(info)
    }

    /// Prepare `replay` with just the typed text of the last insert
    /// command, for repeating an insertion from within Insert mode.
    ///
    /// Skips the register, count and command letter; an `o`/`O` insert
    /// replays behind a fresh newline. Blocks redo recording until
    /// [`RedoState::set_blocked`] lifts it, so the replayed insert cannot
    /// clobber the buffer it reads from.
    pub(crate) fn start_redo_insert(&mut self, replay: &mut BlockChain) -> bool {
        if self.redobuf.is_empty() {
            return false;
        }
        let bytes = self.redobuf.concat();
        let mut cur = Cursor::new(&bytes);
        while let Some(c) = cur.peek_char() {
            cur.advance();
            if "AaIiRrOo".contains(c) {
                if c == 'O' || c == 'o' {
                    replay.append(b"\n");
                }
                break;
            }
        }
        replay.append(cur.rest());
        self.block = true;
        true
    }
}

/// Cursor over an escaped byte string, stepping one decoded unit at a
/// time. Only character units are inspected; escape triples are opaque.
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Cursor { bytes, pos: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        match decode(&self.bytes[self.pos..]) {
            Decoded::Char { ch, .. } => Some(ch),
            _ => None,
        }
    }

    fn advance(&mut self) {
        self.pos += match decode(&self.bytes[self.pos..]) {
            Decoded::Char { len, .. }
            | Decoded::Special { len, .. }
            | Decoded::Modifier { len, .. } => len,
            Decoded::Incomplete => self.bytes.len() - self.pos,
        };
    }

    fn rest(&self) -> &[u8] {
        &self.bytes[self.pos..]
    }
}
