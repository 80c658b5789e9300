//! Pending-operator finalization.
//!
//! Runs after every dispatched command. When an operator was pending
//! before the command (or a Visual operator fired), the motion's end
//! position is folded into a normalized range, the canonical redo
//! sequence is recorded, and the host executes the operator.

use crate::normal::{CommandContext, VisualKind};
use crate::types::{MotionType, Operator, RetFlags};
use core_input::InputCore;
use core_keycode::{Key, ModMask};
use tracing::debug;

/// Record the canonical redo prefix: register, count, then up to four
/// command characters.
pub(crate) fn prep_redo(
    input: &mut InputCore,
    regname: Option<char>,
    count: u32,
    prechar: Option<char>,
    cmd: char,
    nchar: Option<Key>,
    extra: Option<Key>,
) {
    input.reset_redo();
    if let Some(r) = regname {
        input.append_redo_char('"');
        input.append_redo_char(r);
    }
    if count > 0 {
        input.append_redo_num(i64::from(count));
    }
    if let Some(p) = prechar {
        input.append_redo_char(p);
    }
    if cmd != '\0' {
        input.append_redo_char(cmd);
    }
    for key in [nchar, extra].into_iter().flatten() {
        input.append_redo_key(key, ModMask::empty());
    }
}

pub(crate) fn do_pending_operator(ctx: &mut CommandContext<'_>) {
    let visual_op = ctx.state.visual.is_some() && ctx.oap.op != Operator::Nop;
    if ctx.oap.op == Operator::Nop {
        return;
    }
    // Only act when the operator was pending before this command started;
    // otherwise the motion is still to come.
    if !(ctx.state.finish_op || visual_op) {
        return;
    }
    if ctx.ca.retval.contains(RetFlags::COMMAND_BUSY) {
        return;
    }

    ctx.oap.end = ctx.host.cursor();

    if let Some(visual) = ctx.state.visual.take() {
        ctx.oap.start = visual.start;
        ctx.oap.motion_type = match visual.kind {
            VisualKind::Char => MotionType::CharWise,
            VisualKind::Line => MotionType::LineWise,
            VisualKind::Block => MotionType::BlockWise,
        };
        // A Visual range always includes the character under the cursor.
        ctx.oap.inclusive = true;
        ctx.oap.is_visual = true;
        ctx.state.select = false;
    }

    // An explicit v/V/CTRL-V between operator and motion overrides the
    // motion's own type.
    if let Some(force) = ctx.oap.motion_force {
        ctx.oap.motion_type = match force {
            'V' => MotionType::LineWise,
            '\u{16}' | 'b' => MotionType::BlockWise,
            _ => MotionType::CharWise,
        };
    }

    if ctx.oap.end < ctx.oap.start {
        std::mem::swap(&mut ctx.oap.start, &mut ctx.oap.end);
        ctx.oap.end_adjusted = true;
        ctx.host.set_cursor(ctx.oap.start);
    }
    ctx.oap.line_count = ctx.oap.end.line - ctx.oap.start.line + 1;

    // Character-wise inclusive ranges extend past the final character,
    // covering all bytes of a multi-byte one.
    if ctx.oap.motion_type == MotionType::CharWise
        && ctx.oap.inclusive
        && !ctx.ca.retval.contains(RetFlags::NO_ADJUST_OP_END)
    {
        ctx.oap.end.col += ctx.host.char_len_at(ctx.oap.end);
        ctx.oap.end_adjusted = true;
    }

    ctx.oap.empty = ctx.oap.motion_type == MotionType::CharWise
        && !ctx.oap.is_visual
        && ctx.oap.start == ctx.oap.end;

    if ctx.oap.motion_type == MotionType::BlockWise {
        ctx.oap.start_vcol = ctx.host.virtual_col(ctx.oap.start);
        ctx.oap.end_vcol = ctx.host.virtual_col(ctx.oap.end);
        if ctx.oap.start_vcol > ctx.oap.end_vcol {
            std::mem::swap(&mut ctx.oap.start_vcol, &mut ctx.oap.end_vcol);
        }
    }

    // Record the canonical repeat sequence. Yanks do not move the redo
    // buffer; replays would lose the change they are meant to repeat.
    if ctx.oap.op != Operator::Yank && !ctx.input.redo_blocked() {
        let (pre, ch) = ctx.oap.op.chars();
        if ctx.oap.is_visual {
            prep_redo(
                ctx.input,
                ctx.oap.regname,
                0,
                None,
                'v',
                None,
                None,
            );
            if let Some(p) = pre {
                ctx.input.append_redo_char(p);
            }
            ctx.input.append_redo_char(ch);
        } else {
            let force = ctx.oap.motion_force.map(Key::Char);
            prep_redo(
                ctx.input,
                ctx.oap.regname,
                ctx.ca.count0,
                pre,
                ch,
                force,
                None,
            );
            if let Some(k) = ctx.ca.cmdchar {
                ctx.input.append_redo_key(k, ModMask::empty());
            }
            for k in [ctx.ca.nchar, ctx.ca.extra_char].into_iter().flatten() {
                ctx.input.append_redo_key(k, ModMask::empty());
            }
        }
    }

    ctx.oap.count = ctx.ca.count1;
    debug!(
        target: "dispatch.oper",
        op = ?ctx.oap.op,
        motion = ?ctx.oap.motion_type,
        lines = ctx.oap.line_count,
        "operator executes"
    );
    ctx.host.apply_operator(ctx.oap);

    // Clear the pending state; the register does not survive the operator.
    ctx.oap.op = Operator::Nop;
    ctx.oap.regname = None;
    ctx.oap.motion_force = None;
    ctx.oap.is_visual = false;
    ctx.oap.end_adjusted = false;
    ctx.state.finish_op = false;
    ctx.state.opcount = 0;
}
