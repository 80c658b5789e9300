//! End-to-end mapping behavior through the public key API.

use core_config::InputConfig;
use core_input::{FeedInput, InputCore, InputError, KeyPress};
use core_keycode::{K_SPECIAL, KS_EXTRA, Key, ModMask, SpecialKey, encode_special};
use core_keymap::{ExprError, MapFlags, MapRhs, Mapping, ModeMask};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::rc::Rc;

fn core_with(feed: FeedInput) -> InputCore {
    InputCore::new(InputConfig::default(), Box::new(feed))
}

fn map(lhs: &[u8], rhs: &[u8], modes: ModeMask, flags: MapFlags) -> Mapping {
    Mapping {
        lhs: lhs.to_vec(),
        lhs_alt: None,
        rhs: MapRhs::Keys(rhs.to_vec()),
        modes,
        flags,
    }
}

fn drain_keys(core: &mut InputCore) -> Vec<Key> {
    let mut out = Vec::new();
    while let Some(KeyPress { key, .. }) = core.get_one_key().unwrap() {
        out.push(key);
    }
    out
}

fn chars(s: &str) -> Vec<Key> {
    s.chars().map(Key::Char).collect()
}

#[test]
fn unmapped_keys_pass_through() {
    let mut feed = FeedInput::new();
    feed.push_bytes(b"abc");
    let mut core = core_with(feed);
    assert_eq!(drain_keys(&mut core), chars("abc"));
}

#[test]
fn mapping_expands_in_place() {
    let mut feed = FeedInput::new();
    feed.push_bytes(b"x");
    let mut core = core_with(feed);
    core.maps
        .global
        .define(map(b"x", b"dd", ModeMask::NORMAL, MapFlags::empty()));
    assert_eq!(drain_keys(&mut core), chars("dd"));
}

#[test]
fn insert_mode_double_key_mapping() {
    // The first press enters Insert mode (consumer-side), the doubled key
    // then maps to ESC, and the trailing key arrives unmapped.
    let mut feed = FeedInput::new();
    feed.push_bytes(b"iiix");
    let mut core = core_with(feed);
    core.maps
        .global
        .define(map(b"ii", b"\x1b", ModeMask::INSERT, MapFlags::empty()));

    let first = core.get_one_key().unwrap().unwrap();
    assert_eq!(first.key, Key::Char('i'));
    core.set_mode(ModeMask::INSERT);

    let second = core.get_one_key().unwrap().unwrap();
    assert_eq!(second.key, Key::Char('\u{1b}'));
    core.set_mode(ModeMask::NORMAL);

    let third = core.get_one_key().unwrap().unwrap();
    assert_eq!(third.key, Key::Char('x'));
}

#[test]
fn longest_full_match_wins() {
    let mut feed = FeedInput::new();
    feed.push_bytes(b"abc");
    let mut core = core_with(feed);
    core.maps
        .global
        .define(map(b"ab", b"1", ModeMask::NORMAL, MapFlags::empty()));
    core.maps
        .global
        .define(map(b"abc", b"2", ModeMask::NORMAL, MapFlags::empty()));
    assert_eq!(drain_keys(&mut core), chars("2"));
}

#[test]
fn shorter_match_fires_when_longer_cannot_complete() {
    let mut feed = FeedInput::new();
    feed.push_bytes(b"abx");
    let mut core = core_with(feed);
    core.maps
        .global
        .define(map(b"ab", b"1", ModeMask::NORMAL, MapFlags::empty()));
    core.maps
        .global
        .define(map(b"abc", b"2", ModeMask::NORMAL, MapFlags::empty()));
    assert_eq!(drain_keys(&mut core), chars("1x"));
}

#[test]
fn partial_match_times_out_and_emits_literally() {
    // One wait comes back empty (the grace period expired), after which
    // the pending byte is delivered as itself.
    let mut feed = FeedInput::new();
    feed.push_bytes(b"j").push_gap().push_bytes(b"x");
    let mut core = core_with(feed);
    core.maps
        .global
        .define(map(b"jk", b"\x1b", ModeMask::NORMAL, MapFlags::empty()));
    assert_eq!(drain_keys(&mut core), chars("jx"));
}

#[test]
fn partial_match_completes_within_the_wait() {
    let mut feed = FeedInput::new();
    feed.push_bytes(b"j").push_bytes(b"k");
    let mut core = core_with(feed);
    core.maps
        .global
        .define(map(b"jk", b"\x1b", ModeMask::NORMAL, MapFlags::empty()));
    assert_eq!(drain_keys(&mut core), chars("\u{1b}"));
}

#[test]
fn nowait_mapping_fires_without_waiting_for_longer() {
    let mut feed = FeedInput::new();
    feed.push_bytes(b"a");
    let mut core = core_with(feed);
    core.maps
        .global
        .define(map(b"ab", b"2", ModeMask::NORMAL, MapFlags::empty()));
    core.maps
        .global
        .define(map(b"a", b"1", ModeMask::NORMAL, MapFlags::NOWAIT));
    // Without NOWAIT the longer candidate would force a wait before the
    // short match could be chosen.
    let first = core.get_one_key().unwrap().unwrap();
    assert_eq!(first.key, Key::Char('1'));
}

#[test]
fn recursive_mapping_expands_through_rhs() {
    let mut feed = FeedInput::new();
    feed.push_bytes(b"a");
    let mut core = core_with(feed);
    core.maps
        .global
        .define(map(b"a", b"b", ModeMask::NORMAL, MapFlags::empty()));
    core.maps
        .global
        .define(map(b"b", b"c", ModeMask::NORMAL, MapFlags::empty()));
    assert_eq!(drain_keys(&mut core), chars("c"));
}

#[test]
fn noremap_rhs_is_not_reexpanded() {
    let mut feed = FeedInput::new();
    feed.push_bytes(b"jk");
    let mut core = core_with(feed);
    // "j" expands recursively; its RHS "g"/"j" is consumed as a command
    // plus literal second char by the dispatcher, which reads the second
    // char with mapping disabled.
    core.maps
        .global
        .define(map(b"j", b"gj", ModeMask::NORMAL, MapFlags::empty()));
    core.maps
        .global
        .define(map(b"k", b"k", ModeMask::NORMAL, MapFlags::NOREMAP));

    let g = core.get_one_key().unwrap().unwrap();
    assert_eq!(g.key, Key::Char('g'));
    let j = core
        .with_no_mapping(|c| c.get_one_key())
        .unwrap()
        .unwrap();
    assert_eq!(j.key, Key::Char('j'));
    let k = core.get_one_key().unwrap().unwrap();
    assert_eq!(k.key, Key::Char('k'));
    assert!(core.get_one_key().unwrap().is_none());
}

#[test]
fn noremap_containing_its_own_lhs_stays_bounded() {
    let mut feed = FeedInput::new();
    feed.push_bytes(b"j");
    let mut core = core_with(feed);
    core.maps
        .global
        .define(map(b"j", b"gjg", ModeMask::NORMAL, MapFlags::NOREMAP));
    assert_eq!(drain_keys(&mut core), chars("gjg"));
}

#[test]
fn unbounded_recursion_is_cut_off() {
    let mut feed = FeedInput::new();
    feed.push_bytes(b"a");
    let mut core = core_with(feed);
    core.maps
        .global
        .define(map(b"a", b"b", ModeMask::NORMAL, MapFlags::empty()));
    core.maps
        .global
        .define(map(b"b", b"a", ModeMask::NORMAL, MapFlags::empty()));
    match core.get_one_key() {
        Err(InputError::RecursiveMapping) => {}
        other => panic!("expected recursion error, got {other:?}"),
    }
}

#[test]
fn plug_prefixed_keys_map_even_under_noremap() {
    // A noremap RHS pointing at a <Plug> key still expands the plug
    // mapping; that is the whole point of the prefix.
    let mut plug = Vec::new();
    encode_special(SpecialKey::Plug, &mut plug);
    let mut plug_x = plug.clone();
    plug_x.push(b'x');

    let mut feed = FeedInput::new();
    feed.push_bytes(b"q");
    let mut core = core_with(feed);
    core.maps
        .global
        .define(map(b"q", &plug_x, ModeMask::NORMAL, MapFlags::NOREMAP));
    core.maps
        .global
        .define(map(&plug_x, b"Z", ModeMask::NORMAL, MapFlags::empty()));
    assert_eq!(drain_keys(&mut core), chars("Z"));
}

#[test]
fn buffer_local_mapping_shadows_global() {
    let mut feed = FeedInput::new();
    feed.push_bytes(b"x");
    let mut core = core_with(feed);
    core.maps
        .global
        .define(map(b"x", b"G", ModeMask::NORMAL, MapFlags::empty()));
    core.maps
        .local
        .define(map(b"x", b"L", ModeMask::NORMAL, MapFlags::empty()));
    assert_eq!(drain_keys(&mut core), chars("L"));
}

#[test]
fn expr_mapping_evaluates_at_expansion_time() {
    let calls = Rc::new(RefCell::new(0u32));
    let calls2 = calls.clone();

    let mut feed = FeedInput::new();
    feed.push_bytes(b"e");
    let mut core = core_with(feed);
    core.maps.global.define(Mapping {
        lhs: b"e".to_vec(),
        lhs_alt: None,
        rhs: MapRhs::Expr(Rc::new(move || {
            *calls2.borrow_mut() += 1;
            Ok(b"ok".to_vec())
        })),
        modes: ModeMask::NORMAL,
        flags: MapFlags::EXPR,
    });
    assert_eq!(drain_keys(&mut core), chars("ok"));
    assert_eq!(*calls.borrow(), 1);
}

#[test]
fn empty_expr_result_becomes_ignore() {
    let mut feed = FeedInput::new();
    feed.push_bytes(b"e");
    let mut core = core_with(feed);
    core.maps.global.define(Mapping {
        lhs: b"e".to_vec(),
        lhs_alt: None,
        rhs: MapRhs::Expr(Rc::new(|| Ok(Vec::new()))),
        modes: ModeMask::NORMAL,
        flags: MapFlags::EXPR,
    });
    let key = core.get_one_key().unwrap().unwrap();
    assert_eq!(key.key, Key::Special(SpecialKey::Ignore));
}

#[test]
fn failing_expr_aborts_the_expansion() {
    let mut feed = FeedInput::new();
    feed.push_bytes(b"e");
    let mut core = core_with(feed);
    core.maps.global.define(Mapping {
        lhs: b"e".to_vec(),
        lhs_alt: None,
        rhs: MapRhs::Expr(Rc::new(|| Err(ExprError("boom".into())))),
        modes: ModeMask::NORMAL,
        flags: MapFlags::EXPR,
    });
    match core.get_one_key() {
        Err(InputError::ExprFailed(msg)) => assert_eq!(msg, "boom"),
        other => panic!("expected expression failure, got {other:?}"),
    }
}

#[test]
fn silent_mapping_marks_delivery_silent() {
    let mut feed = FeedInput::new();
    feed.push_bytes(b"sa");
    let mut core = core_with(feed);
    core.maps
        .global
        .define(map(b"s", b"y", ModeMask::NORMAL, MapFlags::SILENT));
    let first = core.get_one_key().unwrap().unwrap();
    assert_eq!(first.key, Key::Char('y'));
    assert!(core.cmd_silent());
    let second = core.get_one_key().unwrap().unwrap();
    assert_eq!(second.key, Key::Char('a'));
    assert!(!core.cmd_silent());
}

#[test]
fn alternate_lhs_form_matches() {
    // A mapping defined for CR also fires when the keypad Enter alias
    // arrives on the wire.
    let mut kenter = Vec::new();
    encode_special(SpecialKey::KEnter, &mut kenter);

    let mut feed = FeedInput::new();
    feed.push_bytes(&kenter);
    let mut core = core_with(feed);
    core.maps.global.define(Mapping {
        lhs: b"\r".to_vec(),
        lhs_alt: Some(kenter),
        rhs: MapRhs::Keys(b"T".to_vec()),
        modes: ModeMask::NORMAL,
        flags: MapFlags::empty(),
    });
    assert_eq!(drain_keys(&mut core), chars("T"));
}

#[test]
fn mode_mask_limits_where_a_mapping_applies() {
    let mut feed = FeedInput::new();
    feed.push_bytes(b"w");
    let mut core = core_with(feed);
    core.maps
        .global
        .define(map(b"w", b"INS", ModeMask::INSERT, MapFlags::empty()));
    assert_eq!(drain_keys(&mut core), chars("w"));
}

#[test]
fn select_mode_visual_mapping_switches_and_schedules_switch_back() {
    let mut feed = FeedInput::new();
    feed.push_bytes(b"z");
    let mut core = core_with(feed);
    core.set_mode(ModeMask::SELECT);
    core.maps.global.define(map(
        b"z",
        b"y",
        ModeMask::VISUAL | ModeMask::SELECT,
        MapFlags::empty(),
    ));

    // The expansion runs in Visual mode; the synthetic switch-back key
    // follows it in the stream.
    let keys = drain_keys(&mut core);
    assert_eq!(keys, vec![Key::Char('y'), Key::Special(SpecialKey::Select)]);
    assert!(core.mode().contains(ModeMask::VISUAL));
    assert!(!core.mode().contains(ModeMask::SELECT));
}

#[test]
fn modifier_simplification_enables_control_byte_mapping() {
    // <C-a> arrives as a modifier triple; no mapping matches the triple,
    // so the engine folds it into the control byte, which then maps.
    let mut feed = FeedInput::new();
    feed.push_key(Key::Char('a'), ModMask::CTRL);
    let mut core = core_with(feed);
    core.maps
        .global
        .define(map(b"\x01", b"M", ModeMask::NORMAL, MapFlags::empty()));
    assert_eq!(drain_keys(&mut core), chars("M"));
}

#[test]
fn incomplete_triple_waits_for_the_key_code_timeout() {
    // The lone lead byte of a triple is not simplified early; after the
    // key-code wait expires it is delivered as-is.
    let mut feed = FeedInput::new();
    feed.push_bytes(&[K_SPECIAL]).push_gap().push_gap();
    feed.push_bytes(&[KS_EXTRA, SpecialKey::Up.code()]);
    let mut core = core_with(feed);
    let key = core.get_one_key().unwrap().unwrap();
    assert_eq!(key.key, Key::Special(SpecialKey::Up));
}

#[test]
fn interrupt_flushes_and_synthesizes_a_control_c() {
    let mut feed = FeedInput::new();
    feed.push_bytes(b"dd");
    let mut core = core_with(feed);
    core.interrupt();
    let key = core.get_one_key().unwrap().unwrap();
    assert_eq!(key.key, Key::Char('\u{3}'));
    // The pending keys were flushed.
    assert_eq!(core.typeahead_len(), 0);
}
