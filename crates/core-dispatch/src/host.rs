//! The contract between the dispatcher and the rest of the editor.
//!
//! The dispatcher assembles commands; what a command does to text is the
//! host's business. Motions that need to read text (words, character
//! search, text objects) are delegated too, returning positions the
//! dispatcher folds into the pending-operator range.

use crate::types::{MotionType, OperatorArg, Position};
use core_keycode::Key;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

/// A text-object span resolved by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectSpan {
    pub start: Position,
    pub end: Position,
    pub motion_type: MotionType,
    pub inclusive: bool,
}

pub trait EditorHost {
    // --- document geometry -------------------------------------------------
    fn cursor(&self) -> Position;
    fn set_cursor(&mut self, pos: Position);
    fn line_count(&self) -> usize;
    /// Byte length of the line's text.
    fn line_len(&self, line: usize) -> usize;
    /// Byte length of the character at `pos`; used to extend inclusive
    /// ranges over a multi-byte end character.
    fn char_len_at(&self, pos: Position) -> usize {
        let _ = pos;
        1
    }
    /// Screen column of a position, for block-wise ranges.
    fn virtual_col(&self, pos: Position) -> usize {
        pos.col
    }

    // --- motions needing text knowledge ------------------------------------
    /// Word-wise motion from the cursor. `to_end` lands on the last byte
    /// of the word (inclusive motions).
    fn word_motion(&mut self, dir: Direction, big: bool, to_end: bool, count: u32)
    -> Option<Position>;
    /// In-line character search. `before` stops one column short.
    fn find_char(&mut self, target: char, dir: Direction, before: bool, count: u32)
    -> Option<Position>;
    /// Resolve a text object at the cursor (`iw`, `a(`, ...).
    fn text_object(&mut self, around: bool, object: char, count: u32) -> Option<ObjectSpan> {
        let _ = (around, object, count);
        None
    }

    // --- effects ------------------------------------------------------------
    /// Run the operator over its normalized range. Returns true when the
    /// document changed.
    fn apply_operator(&mut self, oap: &OperatorArg) -> bool;
    /// Enter Insert mode for one of `iIaAoOR`.
    fn enter_insert(&mut self, cmd: char, count: u32);
    fn join_lines(&mut self, count: u32, keep_spaces: bool);
    fn undo(&mut self);
    fn redo(&mut self);
    fn paste(&mut self, register: Option<char>, after: bool, count: u32);
    /// Replace `count` characters under the cursor; false when it does
    /// not fit on the line.
    fn replace_char(&mut self, key: Key, count: u32) -> bool;
    /// Execute a command-line fragment collected from a command mapping.
    fn execute_command_line(&mut self, fragment: &str);
    /// Open the interactive command line (the `:` command).
    fn start_cmdline(&mut self) {}
    fn window_command(&mut self, key: Key, count: u32) {
        let _ = (key, count);
    }
    fn set_register(&mut self, name: char, bytes: Vec<u8>);
    fn register_contents(&self, name: char) -> Option<Vec<u8>>;
    fn digraph(&mut self, c1: char, c2: char) -> Option<char> {
        let _ = (c1, c2);
        None
    }
    fn beep(&mut self);

    // --- guards and notifications -------------------------------------------
    /// Text is locked (e.g. a command line is being edited); commands
    /// flagged as disallowed must abort.
    fn text_locked(&self) -> bool {
        false
    }
    fn in_cmdline_window(&self) -> bool {
        false
    }
    fn rightleft(&self) -> bool {
        false
    }
    /// The cursor ended somewhere new after a command.
    fn cursor_moved(&mut self) {}
    /// Re-align scroll-bound and cursor-bound sibling windows.
    fn check_bindings(&mut self) {}
}
