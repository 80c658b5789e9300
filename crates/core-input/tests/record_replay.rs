//! Recording, redo replay, and key assembly behavior.

use core_config::InputConfig;
use core_input::{FeedInput, InputCore, KeyPress, OnKeyAction};
use core_keycode::{Key, ModMask, SpecialKey};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::rc::Rc;

fn core_with(feed: FeedInput) -> InputCore {
    InputCore::new(InputConfig::default(), Box::new(feed))
}

fn drain_keys(core: &mut InputCore) -> Vec<Key> {
    let mut out = Vec::new();
    while let Some(KeyPress { key, .. }) = core.get_one_key().unwrap() {
        out.push(key);
    }
    out
}

#[test]
fn recording_captures_typed_keys_minus_the_stop_key() {
    let mut feed = FeedInput::new();
    feed.push_bytes(b"abq");
    let mut core = core_with(feed);
    assert!(core.start_recording('r'));
    assert_eq!(core.recording(), Some('r'));

    // The dispatcher reads keys until it sees the stop command.
    let mut seen = Vec::new();
    loop {
        let kp = core.get_one_key().unwrap().unwrap();
        if kp.key == Key::Char('q') {
            break;
        }
        seen.push(kp.key);
    }
    let (reg, bytes) = core.stop_recording().unwrap();
    assert_eq!(reg, 'r');
    assert_eq!(bytes, b"ab");
    assert_eq!(seen, vec![Key::Char('a'), Key::Char('b')]);
}

#[test]
fn mapped_expansions_record_the_typed_keys_not_the_expansion() {
    use core_keymap::{MapFlags, MapRhs, Mapping, ModeMask};

    let mut feed = FeedInput::new();
    feed.push_bytes(b"xq");
    let mut core = core_with(feed);
    core.maps.global.define(Mapping {
        lhs: b"x".to_vec(),
        lhs_alt: None,
        rhs: MapRhs::Keys(b"dd".to_vec()),
        modes: ModeMask::NORMAL,
        flags: MapFlags::empty(),
    });
    core.start_recording('r');

    let mut got = Vec::new();
    loop {
        let kp = core.get_one_key().unwrap().unwrap();
        if kp.key == Key::Char('q') {
            break;
        }
        got.push(kp.key);
    }
    assert_eq!(got, vec![Key::Char('d'), Key::Char('d')]);

    let (_, bytes) = core.stop_recording().unwrap();
    // The trigger was recorded, not its expansion.
    assert_eq!(bytes, b"x");
}

#[test]
fn replayed_recording_is_mappable_input() {
    let mut core = core_with(FeedInput::new());
    core.feed_keys(b"ok", core_input::RemapPolicy::All, false)
        .unwrap();
    assert_eq!(drain_keys(&mut core), vec![Key::Char('o'), Key::Char('k')]);
}

#[test]
fn redo_replay_reproduces_the_command_bytes() {
    let mut core = core_with(FeedInput::new());
    core.append_redo_raw(b"3x");
    assert!(core.start_redo(0, false).is_some());
    assert_eq!(drain_keys(&mut core), vec![Key::Char('3'), Key::Char('x')]);
}

#[test]
fn redo_with_count_override() {
    let mut core = core_with(FeedInput::new());
    core.append_redo_raw(b"2dw");
    core.start_redo(7, false).unwrap();
    assert_eq!(
        drain_keys(&mut core),
        vec![Key::Char('7'), Key::Char('d'), Key::Char('w')]
    );
}

#[test]
fn reset_then_readonly_commands_then_cancel_preserves_redo() {
    let mut core = core_with(FeedInput::new());
    core.append_redo_raw(b"dw");

    // A new command begins...
    core.reset_redo();
    core.append_redo_char('y');
    // ...but turns out to be read-only: cancel brings the old one back.
    core.cancel_redo();

    core.start_redo(0, false).unwrap();
    assert_eq!(drain_keys(&mut core), vec![Key::Char('d'), Key::Char('w')]);
}

#[test]
fn redo_insert_replays_only_the_typed_text() {
    let mut core = core_with(FeedInput::new());
    core.append_redo_char('i');
    core.append_redo_lit("hi");
    core.append_redo_char('\u{1b}');

    assert!(core.start_redo_insert());
    assert!(core.redo_blocked());
    // While blocked, nothing can clobber the buffer being replayed.
    core.append_redo_char('Z');
    core.stop_redo_insert();

    assert_eq!(
        drain_keys(&mut core),
        vec![Key::Char('h'), Key::Char('i'), Key::Char('\u{1b}')]
    );
}

#[test]
fn alt_modified_ascii_key_folds_to_esc_prefix() {
    let mut feed = FeedInput::new();
    feed.push_key(Key::Char('f'), ModMask::ALT);
    let mut core = core_with(feed);
    let keys = drain_keys(&mut core);
    assert_eq!(keys, vec![Key::Char('\u{1b}'), Key::Char('f')]);
}

#[test]
fn alt_fold_is_suppressed_in_terminal_mode() {
    use core_keymap::ModeMask;

    let mut feed = FeedInput::new();
    feed.push_key(Key::Char('f'), ModMask::ALT);
    let mut core = core_with(feed);
    core.set_mode(ModeMask::TERMINAL);
    let kp = core.get_one_key().unwrap().unwrap();
    assert_eq!(kp.key, Key::Char('f'));
    assert_eq!(kp.mods, ModMask::ALT);
}

#[test]
fn alt_fold_is_suppressed_for_mouse_keys() {
    let mut feed = FeedInput::new();
    feed.push_key(Key::Special(SpecialKey::LeftMouse), ModMask::ALT);
    let mut core = core_with(feed);
    let kp = core.get_one_key().unwrap().unwrap();
    assert_eq!(kp.key, Key::Special(SpecialKey::LeftMouse));
    assert_eq!(kp.mods, ModMask::ALT);
}

#[test]
fn keypad_keys_fall_back_to_plain_equivalents() {
    let mut feed = FeedInput::new();
    feed.push_key(Key::Special(SpecialKey::KPlus), ModMask::empty());
    feed.push_key(Key::Special(SpecialKey::KDigit(7)), ModMask::empty());
    feed.push_key(Key::Special(SpecialKey::KHome), ModMask::empty());
    let mut core = core_with(feed);
    assert_eq!(
        drain_keys(&mut core),
        vec![
            Key::Char('+'),
            Key::Char('7'),
            Key::Special(SpecialKey::Home)
        ]
    );
}

#[test]
fn multibyte_chars_assemble_whole() {
    let mut feed = FeedInput::new();
    feed.push_key(Key::Char('é'), ModMask::empty());
    feed.push_key(Key::Char('語'), ModMask::empty());
    feed.push_key(Key::Char('\u{800}'), ModMask::empty());
    let mut core = core_with(feed);
    assert_eq!(
        drain_keys(&mut core),
        vec![Key::Char('é'), Key::Char('語'), Key::Char('\u{800}')]
    );
}

#[test]
fn on_key_observer_sees_typed_bytes_and_can_swallow() {
    let seen: Rc<RefCell<Vec<Vec<u8>>>> = Rc::default();
    let seen2 = seen.clone();

    let mut feed = FeedInput::new();
    feed.push_bytes(b"ax");
    let mut core = core_with(feed);
    core.set_on_key(Some(Box::new(move |kp, bytes| {
        seen2.borrow_mut().push(bytes.to_vec());
        if kp.key == Key::Char('x') {
            OnKeyAction::Swallow
        } else {
            OnKeyAction::Pass
        }
    })));

    let first = core.get_one_key().unwrap().unwrap();
    assert_eq!(first.key, Key::Char('a'));
    let second = core.get_one_key().unwrap().unwrap();
    assert_eq!(second.key, Key::Special(SpecialKey::Ignore));

    let seen = seen.borrow();
    assert_eq!(seen.as_slice(), &[b"a".to_vec(), b"x".to_vec()]);
}

#[test]
fn script_capture_records_every_typed_key() {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Sink(Arc<Mutex<Vec<u8>>>);
    impl Write for Sink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let sink = Sink::default();
    let mut feed = FeedInput::new();
    feed.push_bytes(b"abc");
    let mut core = core_with(feed);
    core.record_to_script(Some(Box::new(sink.clone())));
    drain_keys(&mut core);
    assert_eq!(*sink.0.lock().unwrap(), b"abc");
}
