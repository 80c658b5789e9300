//! The normal-mode command table: one descriptor per command character,
//! kept sorted for binary-search lookup.

use crate::commands;
use crate::normal::CommandContext;
use crate::types::CmdFlags;
use core_input::InputError;
use core_keycode::{Key, SpecialKey};

pub(crate) type CmdFunc = fn(&mut CommandContext<'_>) -> Result<(), InputError>;

pub(crate) struct NormalCommand {
    pub key: Key,
    pub func: CmdFunc,
    pub flags: CmdFlags,
    pub arg: i32,
}

/// Total order over keys: characters by scalar value, special keys above
/// every character.
fn key_ord(key: Key) -> u32 {
    match key {
        Key::Char(c) => c as u32,
        Key::Special(s) => 0x8000_0000 | u32::from(s.code()),
    }
}

const FORWARD: i32 = 0;
const BACKWARD: i32 = 1;
const TILL: i32 = 2;

pub(crate) struct CommandTable {
    commands: Vec<NormalCommand>,
}

impl CommandTable {
    pub(crate) fn find(&self, key: Key) -> Option<&NormalCommand> {
        self.commands
            .binary_search_by_key(&key_ord(key), |c| key_ord(c.key))
            .ok()
            .map(|i| &self.commands[i])
    }

    pub(crate) fn build() -> Self {
        use CmdFlags as F;
        use Key::{Char, Special};
        use SpecialKey as S;

        let none = F::empty();
        let mut commands = vec![
            cmd(Char('\u{1}'), commands::nv_addsub, none, 1), // CTRL-A
            cmd(Char('\u{12}'), commands::nv_redo, none, 0),  // CTRL-R
            cmd(Char('\u{16}'), commands::nv_visual, none, 'b' as i32), // CTRL-V
            cmd(Char('\u{17}'), commands::nv_wincmd, F::NCH_ALW | F::NCW, 0), // CTRL-W
            cmd(Char('\u{18}'), commands::nv_addsub, none, -1), // CTRL-X
            cmd(Char('\u{1b}'), commands::nv_esc, none, 0),   // ESC
            cmd(Char('\u{1c}'), commands::nv_normal, F::NCH_ALW, 0), // CTRL-Bslash
            cmd(Char(' '), commands::nv_right, F::RL, 0),
            cmd(Char('!'), commands::nv_operator, none, 0),
            cmd(Char('$'), commands::nv_dollar, none, 0),
            cmd(Char('&'), commands::nv_optrans, none, '&' as i32),
            cmd(Char(','), commands::nv_csearch_repeat, none, 1),
            cmd(Char('.'), commands::nv_dot, F::KEEPREG, 0),
            cmd(Char(':'), commands::nv_colon, none, 0),
            cmd(Char(';'), commands::nv_csearch_repeat, none, 0),
            cmd(Char('0'), commands::nv_beginline, none, 0),
            cmd(Char('<'), commands::nv_operator, F::RL, 0),
            cmd(Char('='), commands::nv_operator, none, 0),
            cmd(Char('>'), commands::nv_operator, F::RL, 0),
            cmd(Char('@'), commands::nv_at, F::NCH_NOP, 0),
            cmd(Char('A'), commands::nv_edit, none, 0),
            cmd(Char('B'), commands::nv_bck_word, none, 1),
            cmd(Char('C'), commands::nv_optrans, F::KEEPREG, 'C' as i32),
            cmd(Char('D'), commands::nv_optrans, F::KEEPREG, 'D' as i32),
            cmd(Char('E'), commands::nv_wordcmd, none, 3), // big + to end
            cmd(Char('F'), commands::nv_csearch, F::NCH_ALW | F::LANG, BACKWARD),
            cmd(Char('G'), commands::nv_goto, none, 1),
            cmd(Char('I'), commands::nv_edit, none, 0),
            cmd(Char('J'), commands::nv_join, none, 0),
            cmd(Char('O'), commands::nv_edit, none, 0),
            cmd(Char('P'), commands::nv_put, none, 0),
            cmd(Char('R'), commands::nv_edit, none, 0),
            cmd(Char('S'), commands::nv_optrans, F::KEEPREG, 'S' as i32),
            cmd(Char('T'), commands::nv_csearch, F::NCH_ALW | F::LANG, BACKWARD + TILL),
            cmd(Char('V'), commands::nv_visual, F::SS, 'V' as i32),
            cmd(Char('W'), commands::nv_wordcmd, none, 1), // big
            cmd(Char('X'), commands::nv_optrans, F::KEEPREG, 'X' as i32),
            cmd(Char('Y'), commands::nv_optrans, F::KEEPREG, 'Y' as i32),
            cmd(Char('a'), commands::nv_edit, F::NCH, 0),
            cmd(Char('b'), commands::nv_bck_word, none, 0),
            cmd(Char('c'), commands::nv_operator, none, 0),
            cmd(Char('d'), commands::nv_operator, none, 0),
            cmd(Char('e'), commands::nv_wordcmd, none, 2), // to end
            cmd(Char('f'), commands::nv_csearch, F::NCH_ALW | F::LANG, FORWARD),
            cmd(Char('g'), commands::nv_g_cmd, F::NCH_ALW, 0),
            cmd(Char('h'), commands::nv_left, F::RL, 0),
            cmd(Char('i'), commands::nv_edit, F::NCH, 0),
            cmd(Char('j'), commands::nv_down, none, 0),
            cmd(Char('k'), commands::nv_up, none, 0),
            cmd(Char('l'), commands::nv_right, F::RL, 0),
            cmd(Char('p'), commands::nv_put, none, 1),
            cmd(Char('q'), commands::nv_record, F::NCH, 0),
            cmd(Char('r'), commands::nv_replace, F::NCH_NOP | F::LANG, 0),
            cmd(Char('s'), commands::nv_optrans, F::KEEPREG, 's' as i32),
            cmd(Char('t'), commands::nv_csearch, F::NCH_ALW | F::LANG, FORWARD + TILL),
            cmd(Char('u'), commands::nv_undo, none, 0),
            cmd(Char('v'), commands::nv_visual, F::SS, 'v' as i32),
            cmd(Char('w'), commands::nv_wordcmd, none, 0),
            cmd(Char('x'), commands::nv_optrans, none, 'x' as i32),
            cmd(Char('y'), commands::nv_operator, none, 0),
            cmd(Char('z'), commands::nv_z_cmd, F::NCH_ALW, 0),
            cmd(Char('|'), commands::nv_pipe, none, 0),
            cmd(Char('~'), commands::nv_tilde, none, 0),
            cmd(Special(S::Up), commands::nv_up, F::SSS | F::STS, 0),
            cmd(Special(S::Down), commands::nv_down, F::SSS | F::STS, 0),
            cmd(Special(S::Left), commands::nv_left, F::SSS | F::STS | F::RL, 0),
            cmd(Special(S::Right), commands::nv_right, F::SSS | F::STS | F::RL, 0),
            cmd(Special(S::Home), commands::nv_beginline, F::SSS | F::STS, 0),
            cmd(Special(S::End), commands::nv_dollar, F::SSS | F::STS, 0),
            cmd(Special(S::Backspace), commands::nv_left, none, 0),
            cmd(Special(S::Delete), commands::nv_optrans, none, 'x' as i32),
            cmd(Special(S::Ignore), commands::nv_ignore, F::KEEPREG, 0),
            cmd(Special(S::Nop), commands::nv_nop, none, 0),
            cmd(Special(S::Select), commands::nv_select, none, 0),
            cmd(Special(S::Cmd), commands::nv_cmdkey, none, 0),
            cmd(Special(S::MouseMove), commands::nv_ignore, F::KEEPREG, 0),
            cmd(Special(S::LeftRelease), commands::nv_ignore, F::KEEPREG, 0),
            cmd(Special(S::MiddleRelease), commands::nv_ignore, F::KEEPREG, 0),
            cmd(Special(S::RightRelease), commands::nv_ignore, F::KEEPREG, 0),
            cmd(Special(S::PasteStart), commands::nv_ignore, F::KEEPREG, 0),
            cmd(Special(S::PasteEnd), commands::nv_ignore, F::KEEPREG, 0),
        ];
        commands.sort_by_key(|c| key_ord(c.key));
        debug_assert!(
            commands.windows(2).all(|w| key_ord(w[0].key) < key_ord(w[1].key)),
            "duplicate command character"
        );
        CommandTable { commands }
    }
}

fn cmd(key: Key, func: CmdFunc, flags: CmdFlags, arg: i32) -> NormalCommand {
    NormalCommand {
        key,
        func,
        flags,
        arg,
    }
}

/// `f`/`F`/`t`/`T` argument decoding.
pub(crate) fn csearch_args(arg: i32) -> (crate::host::Direction, bool) {
    let dir = if arg & BACKWARD != 0 {
        crate::host::Direction::Backward
    } else {
        crate::host::Direction::Forward
    };
    (dir, arg & TILL != 0)
}
