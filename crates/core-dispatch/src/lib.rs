//! core-dispatch: the normal-mode command dispatcher.
//!
//! Consumes logical keys from `core-input` and assembles them into
//! commands: register prefix, count, command character, second character,
//! text objects and pending-operator motions. Command effects go through
//! the [`EditorHost`] trait; this crate owns only assembly, sequencing,
//! and the canonical redo record of each change.

mod commands;
mod host;
mod normal;
mod oper;
mod table;
mod types;

pub use host::{Direction, EditorHost, ObjectSpan};
pub use normal::{
    CommandContext, DispatchResult, NormalDispatcher, NormalState, VisualKind, VisualState,
};
pub use types::{
    CmdArg, CmdFlags, MotionType, Operator, OperatorArg, Position, RetFlags,
};
