//! Core vocabulary of the normal-mode state machine.

use bitflags::bitflags;
use core_keycode::Key;

/// A document position. Lines and columns are zero-based; the column is
/// a byte offset within the line, owned and interpreted by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Position {
    pub line: usize,
    pub col: usize,
}

impl Position {
    pub fn new(line: usize, col: usize) -> Self {
        Position { line, col }
    }
}

/// The pending operator, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operator {
    #[default]
    Nop,
    Delete,
    Yank,
    Change,
    ShiftLeft,
    ShiftRight,
    Filter,
    Indent,
    Format,
    Colon,
    Tilde,
    Upper,
    Lower,
    Rot13,
    Join,
    JoinKeepSpaces,
    Fold,
    FoldOpen,
    FoldClose,
    FoldDelete,
    AddNum,
    SubNum,
    /// User-defined operator dispatching to a host function.
    Function,
}

impl Operator {
    /// The key characters that spell this operator, for redo
    /// serialization: optional prefix char plus the operator char.
    pub fn chars(self) -> (Option<char>, char) {
        use Operator::*;
        match self {
            Nop => (None, '\0'),
            Delete => (None, 'd'),
            Yank => (None, 'y'),
            Change => (None, 'c'),
            ShiftLeft => (None, '<'),
            ShiftRight => (None, '>'),
            Filter => (None, '!'),
            Indent => (None, '='),
            Colon => (None, ':'),
            Format => (Some('g'), 'q'),
            Tilde => (Some('g'), '~'),
            Upper => (Some('g'), 'U'),
            Lower => (Some('g'), 'u'),
            Rot13 => (Some('g'), '?'),
            Join => (None, 'J'),
            JoinKeepSpaces => (Some('g'), 'J'),
            Fold => (Some('z'), 'f'),
            FoldOpen => (Some('z'), 'o'),
            FoldClose => (Some('z'), 'c'),
            FoldDelete => (Some('z'), 'd'),
            AddNum => (None, '\u{1}'),
            SubNum => (None, '\u{18}'),
            Function => (Some('g'), '@'),
        }
    }
}

/// Operator character pairs, used when an operator key is read.
pub(crate) fn operator_from(prechar: Option<char>, ch: char) -> Option<Operator> {
    use Operator::*;
    Some(match (prechar, ch) {
        (None, 'd') => Delete,
        (None, 'y') => Yank,
        (None, 'c') => Change,
        (None, '<') => ShiftLeft,
        (None, '>') => ShiftRight,
        (None, '!') => Filter,
        (None, '=') => Indent,
        (Some('g'), 'q') => Format,
        (Some('g'), '~') => Tilde,
        (Some('g'), 'U') => Upper,
        (Some('g'), 'u') => Lower,
        (Some('g'), '?') => Rot13,
        (Some('g'), '@') => Function,
        (Some('z'), 'f') => Fold,
        _ => return None,
    })
}

/// Shape of the range a motion produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionType {
    #[default]
    Unknown,
    CharWise,
    LineWise,
    BlockWise,
}

/// Everything an operator needs to run once its motion is known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperatorArg {
    pub op: Operator,
    pub regname: Option<char>,
    pub motion_type: MotionType,
    /// A `v`/`V`/CTRL-V typed between operator and motion overrides the
    /// motion's own type.
    pub motion_force: Option<char>,
    /// The range includes the character at `end`.
    pub inclusive: bool,
    pub start: Position,
    pub end: Position,
    pub line_count: usize,
    pub count: u32,
    /// Character-wise and start == end: nothing to operate on.
    pub empty: bool,
    pub is_visual: bool,
    /// `end` was swapped or extended while normalizing the range.
    pub end_adjusted: bool,
    pub start_vcol: usize,
    pub end_vcol: usize,
}

bitflags! {
    /// Descriptor flags in the command table.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct CmdFlags: u16 {
        /// May need a second character.
        const NCH      = 0x01;
        /// Second char only when no operator is pending.
        const NCH_NOP  = 0x02 | 0x01;
        /// Always needs its second char.
        const NCH_ALW  = 0x04 | 0x01;
        /// Second char goes through the language map.
        const LANG     = 0x08;
        /// May start a selection.
        const SS       = 0x10;
        /// May start a selection with the shift modifier.
        const SSS      = 0x20;
        /// May stop Select mode without a shift modifier.
        const STS      = 0x40;
        /// 'rightleft' inverts the horizontal direction.
        const RL       = 0x80;
        /// Do not clear the register name.
        const KEEPREG  = 0x100;
        /// Not allowed in the command-line window.
        const NCW      = 0x200;
    }
}

bitflags! {
    /// Result bits a command function sets on the command argument.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct RetFlags: u8 {
        /// The command took over; skip pending-operator finalization.
        const COMMAND_BUSY    = 1;
        /// Do not apply the inclusive end adjustment.
        const NO_ADJUST_OP_END = 2;
    }
}

/// Scratch assembled for one command dispatch.
#[derive(Debug, Clone, Default)]
pub struct CmdArg {
    /// Leading `g`/`z` for two-character command names.
    pub prechar: Option<char>,
    pub cmdchar: Option<Key>,
    /// Second character (text objects, two-char commands, `f` targets).
    pub nchar: Option<Key>,
    /// Third character for the rare three-character commands.
    pub extra_char: Option<Key>,
    /// Count carried over from a pending operator.
    pub opcount: u32,
    /// Count typed before this command (already multiplied with
    /// `opcount` where both were given).
    pub count0: u32,
    /// `count0`, with zero meaning one.
    pub count1: u32,
    /// Per-command argument from the descriptor.
    pub arg: i32,
    pub regname: Option<char>,
    /// Scratch for commands that assemble a search pattern.
    pub searchbuf: Option<String>,
    pub retval: RetFlags,
}

impl CmdArg {
    pub fn cmd_char(&self) -> Option<char> {
        match self.cmdchar {
            Some(Key::Char(c)) => Some(c),
            _ => None,
        }
    }

    pub fn nchar_char(&self) -> Option<char> {
        match self.nchar {
            Some(Key::Char(c)) => Some(c),
            _ => None,
        }
    }
}
