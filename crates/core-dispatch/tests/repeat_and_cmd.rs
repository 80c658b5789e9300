//! Repeat (`.`), recording, register execution and command mappings
//! driven end-to-end through dispatcher and input core.

mod common;

use common::MockHost;
use core_config::InputConfig;
use core_dispatch::{NormalDispatcher, Operator, Position};
use core_input::{FeedInput, InputCore};
use core_keycode::{SpecialKey, encode_special};
use core_keymap::{MapFlags, MapRhs, Mapping, ModeMask};
use pretty_assertions::assert_eq;

fn input_with(bytes: &[u8]) -> InputCore {
    let mut feed = FeedInput::new();
    feed.push_bytes(bytes);
    InputCore::new(InputConfig::default(), Box::new(feed))
}

fn run_all(input: &mut InputCore, host: &mut MockHost) -> NormalDispatcher {
    let mut dispatcher = NormalDispatcher::new();
    loop {
        let result = dispatcher.run_one_command(input, host).unwrap();
        if result.end_of_input {
            break;
        }
    }
    dispatcher
}

#[test]
fn dot_replays_the_last_change() {
    let mut input = input_with(b"x.");
    let mut host = MockHost::with_text("abcdef");
    run_all(&mut input, &mut host);

    // "x" translated to "dl" and ran; "." replayed the same bytes.
    assert_eq!(host.applied.len(), 2);
    assert_eq!(host.applied[0].op, Operator::Delete);
    assert_eq!(host.applied[1].op, Operator::Delete);
    assert_eq!(host.line(0), "cdef");
}

#[test]
fn dot_with_count_overrides_the_recorded_count() {
    let mut input = input_with(b"1x3.");
    let mut host = MockHost::with_text("abcdef");
    run_all(&mut input, &mut host);

    assert_eq!(host.applied.len(), 2);
    // The second delete covered three characters.
    assert_eq!(host.applied[1].count, 3);
    assert_eq!(host.line(0), "ef");
}

#[test]
fn dot_replay_consumes_the_same_byte_stream() {
    let mut input = input_with(b"df .");
    let mut host = MockHost::with_text("a b c d");
    run_all(&mut input, &mut host);

    assert_eq!(host.applied.len(), 2);
    assert_eq!(host.line(0), "c d");
}

#[test]
fn dot_without_a_recorded_change_beeps() {
    let mut input = input_with(b".");
    let mut host = MockHost::with_text("abc");
    run_all(&mut input, &mut host);
    assert!(host.beeps > 0);
    assert!(host.applied.is_empty());
}

#[test]
fn recording_round_trips_through_a_register() {
    // qa x q: record, then @a replays the recorded "x".
    let mut input = input_with(b"qaxq@a");
    let mut host = MockHost::with_text("abcdef");
    run_all(&mut input, &mut host);

    assert_eq!(host.registers.get(&'a').map(Vec::as_slice), Some(&b"x"[..]));
    assert_eq!(host.applied.len(), 2);
    assert_eq!(host.line(0), "cdef");
}

#[test]
fn counted_register_execution_repeats() {
    let mut input = input_with(b"qbxq2@b");
    let mut host = MockHost::with_text("abcdef");
    run_all(&mut input, &mut host);

    // Once while recording, twice replayed.
    assert_eq!(host.applied.len(), 3);
    assert_eq!(host.line(0), "def");
}

#[test]
fn cmd_mapping_executes_a_command_line_fragment() {
    let mut rhs = Vec::new();
    encode_special(SpecialKey::Cmd, &mut rhs);
    rhs.extend_from_slice(b"write\r");

    let mut input = input_with(b"m");
    input.maps.global.define(Mapping {
        lhs: b"m".to_vec(),
        lhs_alt: None,
        rhs: MapRhs::Keys(rhs),
        modes: ModeMask::NORMAL,
        flags: MapFlags::NOREMAP | MapFlags::CMD,
    });
    let mut host = MockHost::with_text("abc");
    run_all(&mut input, &mut host);

    assert_eq!(host.executed_cmdlines, vec!["write".to_string()]);
    // Back in Normal mode with no residual keys or pending state.
    assert!(host.applied.is_empty());
}

#[test]
fn insert_command_records_prefix_and_host_appends_text() {
    let mut input = input_with(b"ia");
    let mut host = MockHost::with_text("");
    let mut dispatcher = NormalDispatcher::new();

    // "i" enters insert; the host's insert loop consumes following keys
    // and mirrors them into the redo buffer.
    dispatcher.run_one_command(&mut input, &mut host).unwrap();
    assert_eq!(host.inserts, vec![('i', 1)]);
    let typed = input.get_one_key().unwrap().unwrap();
    assert_eq!(typed.key, core_keycode::Key::Char('a'));
    input.append_redo_lit("a");
    input.append_redo_char('\u{1b}');

    // Repeating feeds the very same byte stream back.
    let mut input2 = input; // same core keeps the redo buffer
    let mut d2 = dispatcher;
    input2
        .feed_keys(b".", core_input::RemapPolicy::All, false)
        .unwrap();
    // One pass consumes ".", the next dispatches the replayed "i".
    d2.run_one_command(&mut input2, &mut host).unwrap();
    d2.run_one_command(&mut input2, &mut host).unwrap();
    assert_eq!(host.inserts, vec![('i', 1), ('i', 1)]);

    let mut replay = Vec::new();
    while let Some(kp) = input2.get_one_key().unwrap() {
        replay.push(kp.key);
    }
    assert_eq!(
        replay,
        vec![core_keycode::Key::Char('a'), core_keycode::Key::Char('\u{1b}')]
    );
}

#[test]
fn visual_operator_records_a_visual_repeat() {
    let mut input = input_with(b"vlyd");
    let mut host = MockHost::with_text("abcdef");
    run_all(&mut input, &mut host);

    // "vly" yanked the selection; the trailing "d" starts a fresh
    // operator with no visual state left behind.
    assert_eq!(host.applied.len(), 1);
    assert_eq!(host.applied[0].op, Operator::Yank);
    assert!(host.applied[0].is_visual);
}

#[test]
fn operator_pending_state_is_reported() {
    let mut input = input_with(b"d");
    let mut host = MockHost::with_text("abc");
    let mut dispatcher = NormalDispatcher::new();
    let result = dispatcher.run_one_command(&mut input, &mut host).unwrap();
    assert!(result.operator_pending);
    assert!(dispatcher.operator_pending());
    assert_eq!(host.cursor, Position::new(0, 0));
}
