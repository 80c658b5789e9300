//! The normal-mode state machine: one pass per command.
//!
//! A pass reads an optional register, an optional count, the command
//! character, and whatever second or third character the descriptor asks
//! for; dispatches the command function; and finalizes a pending
//! operator. Counts before and after an operator multiply. State that
//! must survive between passes (the pending operator, the carried count,
//! the Visual anchor) lives on the dispatcher.

use crate::commands;
use crate::host::{Direction, EditorHost};
use crate::oper;
use crate::table::CommandTable;
use crate::types::{CmdArg, CmdFlags, Operator, OperatorArg, Position};
use core_input::{InputCore, InputError, KeyPress, RemapPolicy};
use core_keycode::{Key, SpecialKey};
use core_keymap::ModeMask;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualKind {
    Char,
    Line,
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualState {
    pub start: Position,
    pub kind: VisualKind,
}

/// Dispatcher state that survives between commands.
#[derive(Debug, Default)]
pub struct NormalState {
    /// Count entered before a pending operator, carried into the motion.
    pub opcount: u32,
    /// The operator was already pending when the current command began.
    pub finish_op: bool,
    pub visual: Option<VisualState>,
    /// Visual selection behaves as Select mode.
    pub select: bool,
    /// Register carried across a stuffed shorthand translation.
    pub carry_regname: Option<char>,
    /// Last `f`/`F`/`t`/`T` target for `;` and `,`.
    pub last_csearch: Option<(char, Direction, bool)>,
}

/// Everything a command function may touch.
pub struct CommandContext<'a> {
    pub input: &'a mut InputCore,
    pub host: &'a mut dyn EditorHost,
    pub oap: &'a mut OperatorArg,
    pub ca: &'a mut CmdArg,
    pub state: &'a mut NormalState,
}

/// Outcome of one dispatcher pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchResult {
    /// A command function ran.
    pub executed: bool,
    /// An operator is pending; the next command supplies the motion.
    pub operator_pending: bool,
    /// The key source is exhausted.
    pub end_of_input: bool,
}

impl DispatchResult {
    fn executed(pending: bool) -> Self {
        DispatchResult {
            executed: true,
            operator_pending: pending,
            end_of_input: false,
        }
    }

    fn aborted(pending: bool) -> Self {
        DispatchResult {
            executed: false,
            operator_pending: pending,
            end_of_input: false,
        }
    }

    fn end_of_input() -> Self {
        DispatchResult {
            executed: false,
            operator_pending: false,
            end_of_input: true,
        }
    }
}

pub struct NormalDispatcher {
    table: CommandTable,
    oap: OperatorArg,
    pub state: NormalState,
}

impl Default for NormalDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalDispatcher {
    pub fn new() -> Self {
        NormalDispatcher {
            table: CommandTable::build(),
            oap: OperatorArg::default(),
            state: NormalState::default(),
        }
    }

    pub fn operator_pending(&self) -> bool {
        self.oap.op != Operator::Nop
    }

    pub fn visual_active(&self) -> bool {
        self.state.visual.is_some()
    }

    /// The mapping mode the input core should match against right now.
    fn mapping_mode(&self) -> ModeMask {
        if self.state.visual.is_some() {
            if self.state.select {
                ModeMask::SELECT
            } else {
                ModeMask::VISUAL
            }
        } else if self.oap.op != Operator::Nop {
            ModeMask::OP_PENDING
        } else {
            ModeMask::NORMAL
        }
    }

    /// Read, assemble and execute one command.
    pub fn run_one_command(
        &mut self,
        input: &mut InputCore,
        host: &mut dyn EditorHost,
    ) -> Result<DispatchResult, InputError> {
        let mut ca = CmdArg {
            opcount: self.state.opcount,
            regname: self.state.carry_regname.take(),
            ..CmdArg::default()
        };
        self.state.finish_op = self.oap.op != Operator::Nop;
        input.set_mode(self.mapping_mode());

        let Some(first) = input.get_one_key()? else {
            return Ok(DispatchResult::end_of_input());
        };
        let mut key = first;

        // Select mode: a typed printable replaces the selection.
        if self.state.select
            && let Key::Char(c) = key.key
            && !c.is_control()
        {
            self.replace_selection(input, host, c)?;
            return Ok(DispatchResult::executed(false));
        }

        // Optional register and count, in either order around `"`.
        loop {
            while let Key::Char(c @ '0'..='9') = key.key {
                if c == '0' && ca.count0 == 0 {
                    break;
                }
                ca.count0 = ca
                    .count0
                    .saturating_mul(10)
                    .saturating_add(c.to_digit(10).unwrap_or(0))
                    .min(i32::MAX as u32);
                trace!(target: "dispatch.normal", count = ca.count0, "count digit");
                // While a count is pending, `0` extends it instead of
                // being remapped or taken as a command.
                let next = input.with_no_zero_mapping(|i| i.get_one_key())?;
                let Some(next) = next else {
                    return Ok(DispatchResult::end_of_input());
                };
                key = next;
            }

            if key.key == Key::Char('"') && self.oap.op == Operator::Nop {
                let Some(reg) = input.with_no_mapping(|i| i.get_one_key())? else {
                    return Ok(DispatchResult::end_of_input());
                };
                match reg.key {
                    Key::Char(r) if valid_register(r) => ca.regname = Some(r),
                    _ => {
                        host.beep();
                        return Ok(DispatchResult::aborted(false));
                    }
                }
                let Some(next) = input.get_one_key()? else {
                    return Ok(DispatchResult::end_of_input());
                };
                key = next;
                // Loop again: a count may follow the register.
                continue;
            }
            break;
        }

        // A count before the operator multiplies with one after it.
        if ca.opcount > 0 {
            if ca.count0 > 0 {
                ca.count0 = ca
                    .opcount
                    .saturating_mul(ca.count0)
                    .min(i32::MAX as u32);
            } else {
                ca.count0 = ca.opcount;
            }
        }
        ca.count1 = ca.count0.max(1);
        ca.cmdchar = Some(key.key);

        let Some(cmd) = self.table.find(key.key) else {
            debug!(target: "dispatch.normal", key = ?key.key, "unknown command");
            self.oap.op = Operator::Nop;
            self.state.opcount = 0;
            host.beep();
            return Ok(DispatchResult::aborted(false));
        };
        let mut flags = cmd.flags;
        let mut func = cmd.func;
        ca.arg = cmd.arg;

        // Guards: locked text and the command-line window forbid some
        // commands outright.
        if (host.text_locked() || host.in_cmdline_window()) && flags.contains(CmdFlags::NCW) {
            host.beep();
            self.oap.op = Operator::Nop;
            self.state.opcount = 0;
            return Ok(DispatchResult::aborted(false));
        }

        // 'rightleft' inverts directly typed horizontal commands.
        if host.rightleft() && input.key_typed() && flags.contains(CmdFlags::RL) {
            let inverted = invert_rl(key.key);
            if inverted != key.key {
                key.key = inverted;
                ca.cmdchar = Some(inverted);
                if let Some(c2) = self.table.find(inverted) {
                    flags = c2.flags;
                    func = c2.func;
                    ca.arg = c2.arg;
                }
            }
        }

        // Second character, when the descriptor wants one.
        if self.needs_second_char(&ca, flags, input) {
            let Some(mut second) = input.with_no_mapping(|i| i.get_one_key())? else {
                commands::clearop(&mut CommandContext {
                    input: &mut *input,
                    host: &mut *host,
                    oap: &mut self.oap,
                    ca: &mut ca,
                    state: &mut self.state,
                });
                return Ok(DispatchResult::end_of_input());
            };

            // CTRL-K starts a digraph.
            if second.key == Key::Char('\u{b}') {
                second = self.read_digraph(input, host)?.unwrap_or(second);
            }

            if flags.contains(CmdFlags::LANG)
                && let Key::Char(c) = second.key
                && c.is_ascii()
            {
                second.key = Key::Char(input.langmap_translate(c as u8) as char);
            }
            ca.nchar = Some(second.key);
        }

        if key.key == Key::Char('g') {
            ca.prechar = Some('g');
        } else if key.key == Key::Char('z') {
            ca.prechar = Some('z');
        }

        let pos_before = host.cursor();
        {
            let mut ctx = CommandContext {
                input: &mut *input,
                host: &mut *host,
                oap: &mut self.oap,
                ca: &mut ca,
                state: &mut self.state,
            };
            func(&mut ctx)?;
            if ctx.ca.cmdchar != Some(Key::Special(SpecialKey::Ignore)) {
                oper::do_pending_operator(&mut ctx);
            }
        }

        // Carry state into the next pass.
        if flags.contains(CmdFlags::KEEPREG) {
            self.state.carry_regname = ca.regname;
        }
        let pending = self.oap.op != Operator::Nop;
        self.state.opcount = if pending { ca.count0 } else { 0 };

        if host.cursor() != pos_before {
            host.cursor_moved();
            host.check_bindings();
        }
        Ok(DispatchResult::executed(pending))
    }

    fn needs_second_char(&self, ca: &CmdArg, flags: CmdFlags, input: &InputCore) -> bool {
        if !flags.contains(CmdFlags::NCH) {
            return false;
        }
        let alw = flags.contains(CmdFlags::NCH_ALW);
        let nop_only = flags.contains(CmdFlags::NCH_NOP) && !alw;
        alw || (nop_only && self.oap.op == Operator::Nop)
            || (ca.cmd_char() == Some('q')
                && self.oap.op == Operator::Nop
                && input.recording().is_none())
            || (matches!(ca.cmd_char(), Some('a' | 'i'))
                && (self.oap.op != Operator::Nop || self.state.visual.is_some()))
    }

    fn read_digraph(
        &mut self,
        input: &mut InputCore,
        host: &mut dyn EditorHost,
    ) -> Result<Option<KeyPress>, InputError> {
        let k1 = input.with_no_mapping(|i| i.get_one_key())?;
        let k2 = input.with_no_mapping(|i| i.get_one_key())?;
        if let (Some(KeyPress { key: Key::Char(c1), .. }), Some(KeyPress { key: Key::Char(c2), .. })) =
            (k1, k2)
            && let Some(composed) = host.digraph(c1, c2)
        {
            return Ok(Some(KeyPress {
                key: Key::Char(composed),
                mods: core_keycode::ModMask::empty(),
            }));
        }
        host.beep();
        Ok(None)
    }

    /// A printable typed over a Select-mode selection deletes it and
    /// starts inserting the typed text.
    fn replace_selection(
        &mut self,
        input: &mut InputCore,
        host: &mut dyn EditorHost,
        c: char,
    ) -> Result<(), InputError> {
        let visual = self.state.visual.take().expect("select implies visual");
        self.state.select = false;
        let mut arg = OperatorArg {
            op: Operator::Change,
            motion_type: match visual.kind {
                VisualKind::Char => crate::types::MotionType::CharWise,
                VisualKind::Line => crate::types::MotionType::LineWise,
                VisualKind::Block => crate::types::MotionType::BlockWise,
            },
            inclusive: true,
            start: visual.start,
            end: host.cursor(),
            is_visual: true,
            count: 1,
            line_count: 1,
            ..OperatorArg::default()
        };
        if arg.end < arg.start {
            std::mem::swap(&mut arg.start, &mut arg.end);
        }
        arg.line_count = arg.end.line - arg.start.line + 1;
        host.apply_operator(&arg);
        host.enter_insert('i', 1);
        let mut bytes = Vec::new();
        core_keycode::encode_char(c, &mut bytes);
        input.feed_keys(&bytes, RemapPolicy::None, true)?;
        Ok(())
    }
}

/// Register names accepted after `"`.
fn valid_register(r: char) -> bool {
    r.is_ascii_alphanumeric() || "\"*+-:.%#=_/".contains(r)
}

/// Horizontal inversion for 'rightleft'.
fn invert_rl(key: Key) -> Key {
    match key {
        Key::Char('l') => Key::Char('h'),
        Key::Char('h') => Key::Char('l'),
        Key::Char('>') => Key::Char('<'),
        Key::Char('<') => Key::Char('>'),
        Key::Char(' ') => Key::Special(SpecialKey::Backspace),
        Key::Special(SpecialKey::Right) => Key::Special(SpecialKey::Left),
        Key::Special(SpecialKey::Left) => Key::Special(SpecialKey::Right),
        other => other,
    }
}
