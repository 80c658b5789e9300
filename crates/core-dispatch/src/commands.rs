//! Normal-mode command functions.
//!
//! Each function either completes a motion (cursor moved, motion type and
//! inclusive flag set on the operator argument), completes an operator
//! itself, or is a plain command. Pending-operator finalization happens
//! afterwards in `do_pending_operator`.

use crate::host::Direction;
use crate::normal::{CommandContext, VisualKind, VisualState};
use crate::oper::prep_redo;
use crate::table::csearch_args;
use crate::types::{MotionType, Operator, OperatorArg, Position, operator_from};
use core_input::{InputError, RemapPolicy};
use core_keycode::Key;
use tracing::trace;

type CmdResult = Result<(), InputError>;

pub(crate) fn clearop(ctx: &mut CommandContext<'_>) {
    ctx.oap.op = Operator::Nop;
    ctx.oap.regname = None;
    ctx.oap.motion_force = None;
    ctx.state.opcount = 0;
}

pub(crate) fn clearopbeep(ctx: &mut CommandContext<'_>) {
    clearop(ctx);
    ctx.host.beep();
}

/// Abort when an operator is pending; most non-motion commands do this.
fn check_clear_op(ctx: &mut CommandContext<'_>) -> bool {
    if ctx.oap.op != Operator::Nop {
        clearopbeep(ctx);
        return true;
    }
    false
}

/// Like `check_clear_op`, but a selection is equally disqualifying.
fn check_clear_opq(ctx: &mut CommandContext<'_>) -> bool {
    if ctx.oap.op != Operator::Nop || ctx.state.visual.is_some() {
        ctx.state.visual = None;
        ctx.state.select = false;
        clearopbeep(ctx);
        return true;
    }
    false
}

// -------------------------------------------------------------------------
// Plain motions
// -------------------------------------------------------------------------

pub(crate) fn nv_left(ctx: &mut CommandContext<'_>) -> CmdResult {
    ctx.oap.motion_type = MotionType::CharWise;
    ctx.oap.inclusive = false;
    let mut pos = ctx.host.cursor();
    let n = ctx.ca.count1 as usize;
    if pos.col == 0 {
        clearopbeep(ctx);
        return Ok(());
    }
    pos.col = pos.col.saturating_sub(n);
    ctx.host.set_cursor(pos);
    Ok(())
}

pub(crate) fn nv_right(ctx: &mut CommandContext<'_>) -> CmdResult {
    ctx.oap.motion_type = MotionType::CharWise;
    ctx.oap.inclusive = false;
    let mut pos = ctx.host.cursor();
    let len = ctx.host.line_len(pos.line);
    // With an operator pending the motion may stop one past the last
    // character, so `dl` at the end of a line still has a range.
    let limit = if ctx.oap.op != Operator::Nop || ctx.state.visual.is_some() {
        len
    } else {
        len.saturating_sub(1)
    };
    let target = (pos.col + ctx.ca.count1 as usize).min(limit);
    if target <= pos.col {
        clearopbeep(ctx);
        return Ok(());
    }
    pos.col = target;
    ctx.host.set_cursor(pos);
    Ok(())
}

pub(crate) fn nv_down(ctx: &mut CommandContext<'_>) -> CmdResult {
    updown(ctx, Direction::Forward)
}

pub(crate) fn nv_up(ctx: &mut CommandContext<'_>) -> CmdResult {
    updown(ctx, Direction::Backward)
}

fn updown(ctx: &mut CommandContext<'_>, dir: Direction) -> CmdResult {
    ctx.oap.motion_type = MotionType::LineWise;
    ctx.oap.inclusive = false;
    let mut pos = ctx.host.cursor();
    let n = ctx.ca.count1 as usize;
    let last = ctx.host.line_count().saturating_sub(1);
    let target = match dir {
        Direction::Forward if pos.line + n <= last => pos.line + n,
        Direction::Backward if pos.line >= n => pos.line - n,
        _ => {
            clearopbeep(ctx);
            return Ok(());
        }
    };
    pos.line = target;
    pos.col = pos.col.min(ctx.host.line_len(target).saturating_sub(1));
    ctx.host.set_cursor(pos);
    Ok(())
}

pub(crate) fn nv_beginline(ctx: &mut CommandContext<'_>) -> CmdResult {
    ctx.oap.motion_type = MotionType::CharWise;
    ctx.oap.inclusive = false;
    let mut pos = ctx.host.cursor();
    pos.col = 0;
    ctx.host.set_cursor(pos);
    Ok(())
}

pub(crate) fn nv_dollar(ctx: &mut CommandContext<'_>) -> CmdResult {
    ctx.oap.motion_type = MotionType::CharWise;
    ctx.oap.inclusive = true;
    let mut pos = ctx.host.cursor();
    let down = ctx.ca.count1 as usize - 1;
    let last = ctx.host.line_count().saturating_sub(1);
    if pos.line + down > last {
        clearopbeep(ctx);
        return Ok(());
    }
    pos.line += down;
    pos.col = ctx.host.line_len(pos.line).saturating_sub(1);
    ctx.host.set_cursor(pos);
    Ok(())
}

pub(crate) fn nv_pipe(ctx: &mut CommandContext<'_>) -> CmdResult {
    ctx.oap.motion_type = MotionType::CharWise;
    ctx.oap.inclusive = false;
    let mut pos = ctx.host.cursor();
    let len = ctx.host.line_len(pos.line);
    pos.col = (ctx.ca.count1 as usize - 1).min(len.saturating_sub(1));
    ctx.host.set_cursor(pos);
    Ok(())
}

pub(crate) fn nv_goto(ctx: &mut CommandContext<'_>) -> CmdResult {
    let default_last = ctx.ca.arg != 0;
    goto_line(ctx, default_last)
}

fn goto_line(ctx: &mut CommandContext<'_>, default_last: bool) -> CmdResult {
    ctx.oap.motion_type = MotionType::LineWise;
    ctx.oap.inclusive = false;
    let last = ctx.host.line_count().saturating_sub(1);
    let line = if ctx.ca.count0 > 0 {
        (ctx.ca.count0 as usize - 1).min(last)
    } else if default_last {
        last
    } else {
        0
    };
    ctx.host.set_cursor(Position::new(line, 0));
    Ok(())
}

pub(crate) fn nv_wordcmd(ctx: &mut CommandContext<'_>) -> CmdResult {
    let big = ctx.ca.arg & 1 != 0;
    let mut to_end = ctx.ca.arg & 2 != 0;
    let mut inclusive = to_end;
    // "cw" on a word behaves like "ce": the change stops at the end of
    // the word rather than eating the following white space.
    if ctx.oap.op == Operator::Change && !to_end {
        to_end = true;
        inclusive = true;
    }
    match ctx
        .host
        .word_motion(Direction::Forward, big, to_end, ctx.ca.count1)
    {
        Some(pos) => {
            ctx.oap.motion_type = MotionType::CharWise;
            ctx.oap.inclusive = inclusive;
            ctx.host.set_cursor(pos);
            Ok(())
        }
        None => {
            clearopbeep(ctx);
            Ok(())
        }
    }
}

pub(crate) fn nv_bck_word(ctx: &mut CommandContext<'_>) -> CmdResult {
    let big = ctx.ca.arg != 0;
    match ctx
        .host
        .word_motion(Direction::Backward, big, false, ctx.ca.count1)
    {
        Some(pos) => {
            ctx.oap.motion_type = MotionType::CharWise;
            ctx.oap.inclusive = false;
            ctx.host.set_cursor(pos);
            Ok(())
        }
        None => {
            clearopbeep(ctx);
            Ok(())
        }
    }
}

pub(crate) fn nv_csearch(ctx: &mut CommandContext<'_>) -> CmdResult {
    let Some(target) = ctx.ca.nchar_char() else {
        clearopbeep(ctx);
        return Ok(());
    };
    let (dir, till) = csearch_args(ctx.ca.arg);
    ctx.state.last_csearch = Some((target, dir, till));
    do_csearch(ctx, target, dir, till)
}

pub(crate) fn nv_csearch_repeat(ctx: &mut CommandContext<'_>) -> CmdResult {
    let Some((target, dir, till)) = ctx.state.last_csearch else {
        clearopbeep(ctx);
        return Ok(());
    };
    let dir = if ctx.ca.arg != 0 { dir.reversed() } else { dir };
    do_csearch(ctx, target, dir, till)
}

fn do_csearch(
    ctx: &mut CommandContext<'_>,
    target: char,
    dir: Direction,
    till: bool,
) -> CmdResult {
    match ctx.host.find_char(target, dir, till, ctx.ca.count1) {
        Some(pos) => {
            ctx.oap.motion_type = MotionType::CharWise;
            ctx.oap.inclusive = dir == Direction::Forward;
            ctx.host.set_cursor(pos);
            Ok(())
        }
        None => {
            clearopbeep(ctx);
            Ok(())
        }
    }
}

// -------------------------------------------------------------------------
// Operators
// -------------------------------------------------------------------------

pub(crate) fn nv_operator(ctx: &mut CommandContext<'_>) -> CmdResult {
    let (pre, ch) = match ctx.ca.cmd_char() {
        Some(p @ ('g' | 'z')) => (Some(p), ctx.ca.nchar_char().unwrap_or('\0')),
        Some(c) => (ctx.ca.prechar, c),
        None => (None, '\0'),
    };
    let Some(op) = operator_from(pre, ch) else {
        clearopbeep(ctx);
        return Ok(());
    };

    if op == ctx.oap.op {
        // Doubled operator: work on whole lines.
        ctx.oap.motion_type = MotionType::LineWise;
        ctx.oap.inclusive = false;
        let mut pos = ctx.host.cursor();
        let down = ctx.ca.count1 as usize - 1;
        if pos.line + down >= ctx.host.line_count() {
            clearopbeep(ctx);
            return Ok(());
        }
        pos.line += down;
        ctx.host.set_cursor(pos);
        return Ok(());
    }
    if check_clear_op(ctx) {
        return Ok(());
    }

    trace!(target: "dispatch.normal", op = ?op, "operator pending");
    ctx.oap.op = op;
    ctx.oap.start = ctx.host.cursor();
    if ctx.ca.regname.is_some() {
        ctx.oap.regname = ctx.ca.regname;
    }
    Ok(())
}

/// Commands that are shorthand for an operator and a motion; the
/// translation is stuffed and re-dispatched, which keeps the redo record
/// canonical.
pub(crate) fn nv_optrans(ctx: &mut CommandContext<'_>) -> CmdResult {
    if check_clear_opq(ctx) {
        return Ok(());
    }
    let shorthand = char::from_u32(ctx.ca.arg as u32).unwrap_or('\0');
    let translation = match shorthand {
        'x' => "dl",
        'X' => "dh",
        'D' => "d$",
        'C' => "c$",
        's' => "cl",
        'S' => "cc",
        'Y' => "yy",
        '&' => ":s\r",
        _ => {
            clearopbeep(ctx);
            return Ok(());
        }
    };
    if ctx.ca.count0 > 0 {
        ctx.input.stuff_num(i64::from(ctx.ca.count0));
    }
    ctx.input.stuff_typed(translation);
    Ok(())
}

pub(crate) fn nv_tilde(ctx: &mut CommandContext<'_>) -> CmdResult {
    if check_clear_opq(ctx) {
        return Ok(());
    }
    let pos = ctx.host.cursor();
    let len = ctx.host.line_len(pos.line);
    if len == 0 {
        ctx.host.beep();
        return Ok(());
    }
    let end_col = (pos.col + ctx.ca.count1 as usize).min(len);
    let arg = OperatorArg {
        op: Operator::Tilde,
        motion_type: MotionType::CharWise,
        start: pos,
        end: Position::new(pos.line, end_col),
        line_count: 1,
        count: ctx.ca.count1,
        ..OperatorArg::default()
    };
    prep_redo(ctx.input, None, ctx.ca.count0, None, '~', None, None);
    ctx.host.apply_operator(&arg);
    ctx.host
        .set_cursor(Position::new(pos.line, end_col.min(len - 1)));
    Ok(())
}

pub(crate) fn nv_addsub(ctx: &mut CommandContext<'_>) -> CmdResult {
    if check_clear_opq(ctx) {
        return Ok(());
    }
    let (op, cmd) = if ctx.ca.arg > 0 {
        (Operator::AddNum, '\u{1}')
    } else {
        (Operator::SubNum, '\u{18}')
    };
    let pos = ctx.host.cursor();
    let arg = OperatorArg {
        op,
        motion_type: MotionType::CharWise,
        inclusive: true,
        start: pos,
        end: pos,
        line_count: 1,
        count: ctx.ca.count1,
        ..OperatorArg::default()
    };
    prep_redo(ctx.input, None, ctx.ca.count0, None, cmd, None, None);
    ctx.host.apply_operator(&arg);
    Ok(())
}

// -------------------------------------------------------------------------
// Prefixed commands
// -------------------------------------------------------------------------

pub(crate) fn nv_g_cmd(ctx: &mut CommandContext<'_>) -> CmdResult {
    match ctx.ca.nchar {
        Some(Key::Char('g')) => goto_line(ctx, false),
        Some(Key::Char('~' | 'u' | 'U' | '?' | 'q' | '@')) => nv_operator(ctx),
        Some(Key::Char('J')) => {
            if check_clear_opq(ctx) {
                return Ok(());
            }
            prep_redo(
                ctx.input,
                None,
                ctx.ca.count0,
                Some('g'),
                'J',
                None,
                None,
            );
            ctx.host.join_lines(ctx.ca.count1.max(2), true);
            Ok(())
        }
        Some(Key::Char('j')) => nv_down(ctx),
        Some(Key::Char('k')) => nv_up(ctx),
        Some(Key::Char('0')) => nv_beginline(ctx),
        Some(Key::Char('$')) => nv_dollar(ctx),
        _ => {
            clearopbeep(ctx);
            Ok(())
        }
    }
}

pub(crate) fn nv_z_cmd(ctx: &mut CommandContext<'_>) -> CmdResult {
    match ctx.ca.nchar {
        Some(Key::Char('f')) => nv_operator(ctx),
        Some(Key::Char(c @ ('o' | 'c' | 'd'))) => {
            if check_clear_opq(ctx) {
                return Ok(());
            }
            let op = match c {
                'o' => Operator::FoldOpen,
                'c' => Operator::FoldClose,
                _ => Operator::FoldDelete,
            };
            let pos = ctx.host.cursor();
            let arg = OperatorArg {
                op,
                motion_type: MotionType::LineWise,
                start: pos,
                end: pos,
                line_count: 1,
                count: ctx.ca.count1,
                ..OperatorArg::default()
            };
            ctx.host.apply_operator(&arg);
            Ok(())
        }
        _ => {
            clearopbeep(ctx);
            Ok(())
        }
    }
}

pub(crate) fn nv_wincmd(ctx: &mut CommandContext<'_>) -> CmdResult {
    if check_clear_opq(ctx) {
        return Ok(());
    }
    // A count may follow CTRL-W as well; both counts multiply.
    let mut key = ctx.ca.nchar;
    let mut count = 0u32;
    while let Some(Key::Char(c @ '1'..='9')) | Some(Key::Char(c @ '0')) = key {
        if c == '0' && count == 0 {
            break;
        }
        count = count
            .saturating_mul(10)
            .saturating_add(c.to_digit(10).unwrap_or(0));
        key = ctx
            .input
            .with_no_mapping(|i| i.get_one_key())?
            .map(|kp| kp.key);
    }
    let Some(key) = key else {
        clearopbeep(ctx);
        return Ok(());
    };
    let effective = if count > 0 {
        ctx.ca.count1.saturating_mul(count)
    } else {
        ctx.ca.count1
    };
    ctx.host.window_command(key, effective);
    Ok(())
}

// -------------------------------------------------------------------------
// Text state commands
// -------------------------------------------------------------------------

pub(crate) fn nv_edit(ctx: &mut CommandContext<'_>) -> CmdResult {
    let c = ctx.ca.cmd_char().unwrap_or('\0');
    if (c == 'a' || c == 'i')
        && (ctx.oap.op != Operator::Nop || ctx.state.visual.is_some())
    {
        return nv_object(ctx);
    }
    if check_clear_opq(ctx) {
        return Ok(());
    }
    // The dispatcher records the command prefix; the host appends the
    // typed text and the final ESC while the insert runs.
    prep_redo(ctx.input, None, ctx.ca.count0, None, c, None, None);
    ctx.host.enter_insert(c, ctx.ca.count1);
    Ok(())
}

fn nv_object(ctx: &mut CommandContext<'_>) -> CmdResult {
    let around = ctx.ca.cmd_char() == Some('a');
    let Some(object) = ctx.ca.nchar_char() else {
        clearopbeep(ctx);
        return Ok(());
    };
    match ctx.host.text_object(around, object, ctx.ca.count1) {
        Some(span) => {
            ctx.oap.start = span.start;
            ctx.oap.motion_type = span.motion_type;
            ctx.oap.inclusive = span.inclusive;
            ctx.host.set_cursor(span.end);
            Ok(())
        }
        None => {
            clearopbeep(ctx);
            Ok(())
        }
    }
}

pub(crate) fn nv_replace(ctx: &mut CommandContext<'_>) -> CmdResult {
    if check_clear_op(ctx) {
        return Ok(());
    }
    let Some(key) = ctx.ca.nchar else {
        clearopbeep(ctx);
        return Ok(());
    };
    if ctx.host.replace_char(key, ctx.ca.count1) {
        prep_redo(
            ctx.input,
            ctx.ca.regname,
            ctx.ca.count0,
            None,
            'r',
            Some(key),
            None,
        );
    } else {
        clearopbeep(ctx);
    }
    Ok(())
}

pub(crate) fn nv_join(ctx: &mut CommandContext<'_>) -> CmdResult {
    if check_clear_opq(ctx) {
        return Ok(());
    }
    prep_redo(ctx.input, None, ctx.ca.count0, None, 'J', None, None);
    ctx.host.join_lines(ctx.ca.count1.max(2), false);
    Ok(())
}

pub(crate) fn nv_put(ctx: &mut CommandContext<'_>) -> CmdResult {
    if check_clear_opq(ctx) {
        return Ok(());
    }
    let after = ctx.ca.arg != 0;
    let cmd = if after { 'p' } else { 'P' };
    prep_redo(
        ctx.input,
        ctx.ca.regname,
        ctx.ca.count0,
        None,
        cmd,
        None,
        None,
    );
    ctx.host.paste(ctx.ca.regname, after, ctx.ca.count1);
    Ok(())
}

pub(crate) fn nv_undo(ctx: &mut CommandContext<'_>) -> CmdResult {
    if check_clear_opq(ctx) {
        return Ok(());
    }
    ctx.host.undo();
    Ok(())
}

pub(crate) fn nv_redo(ctx: &mut CommandContext<'_>) -> CmdResult {
    if check_clear_opq(ctx) {
        return Ok(());
    }
    ctx.host.redo();
    Ok(())
}

// -------------------------------------------------------------------------
// Repeat, registers, recording
// -------------------------------------------------------------------------

pub(crate) fn nv_dot(ctx: &mut CommandContext<'_>) -> CmdResult {
    if check_clear_opq(ctx) {
        return Ok(());
    }
    match ctx.input.start_redo(ctx.ca.count0, false) {
        Some(info) => {
            if info.visual {
                ctx.state.visual = Some(VisualState {
                    start: ctx.host.cursor(),
                    kind: VisualKind::Char,
                });
            }
            Ok(())
        }
        None => {
            clearopbeep(ctx);
            Ok(())
        }
    }
}

pub(crate) fn nv_at(ctx: &mut CommandContext<'_>) -> CmdResult {
    if check_clear_op(ctx) {
        return Ok(());
    }
    let Some(reg) = ctx.ca.nchar_char() else {
        clearopbeep(ctx);
        return Ok(());
    };
    let Some(bytes) = ctx.host.register_contents(reg) else {
        clearopbeep(ctx);
        return Ok(());
    };
    for _ in 0..ctx.ca.count1 {
        ctx.input.feed_keys(&bytes, RemapPolicy::All, true)?;
    }
    Ok(())
}

pub(crate) fn nv_record(ctx: &mut CommandContext<'_>) -> CmdResult {
    if ctx.oap.op != Operator::Nop {
        clearopbeep(ctx);
        return Ok(());
    }
    if ctx.input.recording().is_some() {
        if let Some((register, bytes)) = ctx.input.stop_recording() {
            ctx.host.set_register(register, bytes);
        }
        return Ok(());
    }
    match ctx.ca.nchar_char() {
        Some(reg) if reg.is_ascii_alphanumeric() || reg == '"' => {
            if !ctx.input.start_recording(reg) {
                ctx.host.beep();
            }
        }
        _ => clearopbeep(ctx),
    }
    Ok(())
}

// -------------------------------------------------------------------------
// Mode switching and leftovers
// -------------------------------------------------------------------------

pub(crate) fn nv_visual(ctx: &mut CommandContext<'_>) -> CmdResult {
    let kind_char = char::from_u32(ctx.ca.arg as u32).unwrap_or('v');
    if ctx.oap.op != Operator::Nop {
        // Between operator and motion, v/V/CTRL-V force the motion type.
        ctx.oap.motion_force = Some(kind_char);
        return Ok(());
    }
    let kind = match kind_char {
        'V' => VisualKind::Line,
        'b' => VisualKind::Block,
        _ => VisualKind::Char,
    };
    ctx.state.select = false;
    match &ctx.state.visual {
        Some(v) if v.kind == kind => ctx.state.visual = None,
        _ => {
            ctx.state.visual = Some(VisualState {
                start: ctx.host.cursor(),
                kind,
            });
        }
    }
    Ok(())
}

pub(crate) fn nv_select(ctx: &mut CommandContext<'_>) -> CmdResult {
    if ctx.state.visual.is_some() {
        ctx.state.select = true;
    }
    Ok(())
}

pub(crate) fn nv_esc(ctx: &mut CommandContext<'_>) -> CmdResult {
    let had_state = ctx.oap.op != Operator::Nop
        || ctx.ca.opcount > 0
        || ctx.state.visual.is_some();
    ctx.state.visual = None;
    ctx.state.select = false;
    clearop(ctx);
    if !had_state {
        ctx.host.beep();
    }
    Ok(())
}

pub(crate) fn nv_normal(ctx: &mut CommandContext<'_>) -> CmdResult {
    match ctx.ca.nchar {
        Some(Key::Char('\u{e}')) | Some(Key::Char('\u{7}')) => {
            // CTRL-\ CTRL-N / CTRL-G: back to plain Normal mode.
            ctx.state.visual = None;
            ctx.state.select = false;
            clearop(ctx);
            Ok(())
        }
        _ => {
            clearopbeep(ctx);
            Ok(())
        }
    }
}

pub(crate) fn nv_colon(ctx: &mut CommandContext<'_>) -> CmdResult {
    if check_clear_op(ctx) {
        return Ok(());
    }
    ctx.host.start_cmdline();
    Ok(())
}

pub(crate) fn nv_cmdkey(ctx: &mut CommandContext<'_>) -> CmdResult {
    let fragment = ctx.input.collect_cmd_fragment()?;
    ctx.host.execute_command_line(&fragment);
    Ok(())
}

pub(crate) fn nv_ignore(_ctx: &mut CommandContext<'_>) -> CmdResult {
    Ok(())
}

pub(crate) fn nv_nop(_ctx: &mut CommandContext<'_>) -> CmdResult {
    Ok(())
}
