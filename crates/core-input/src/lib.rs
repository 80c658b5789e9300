//! core-input: the input core of the editor.
//!
//! One [`InputCore`] value owns every buffer between the raw byte sources
//! and the command dispatcher: typeahead with its remap mask, the stuff
//! and replay buffers, the redo pair, the record sink, the one-shot
//! put-back key and the script-source stack. Nested invocations (synthetic
//! command sequences, sourced scripts, event handlers) snapshot the whole
//! core with [`InputCore::save_input_state`] instead of shadowing pieces
//! of it.
//!
//! Reading a key walks the source chain in a fixed order: put-back key,
//! stuff buffer, replay buffer, typeahead (rewritten by the mapping
//! engine), script file, then the user. [`InputCore::get_one_key`]
//! assembles whole logical keys from the byte stream; the engine itself
//! lives in `engine.rs`.

mod engine;
mod error;
mod frames;
mod gather;
mod redo;
mod source;

pub use error::InputError;
pub use frames::{InputFrame, MAX_SCRIPT_DEPTH};
pub use redo::RedoStart;
pub use source::{FeedInput, FeedStep, KeyInjector, TerminalInput, UserInput, Wait};

// The buffer-level vocabulary is part of this crate's API surface.
pub use core_typeahead::{FlushMode, RemapPolicy};

use crate::frames::{ScriptStack, StreamSave};
use crate::gather::Gather;
use crate::redo::RedoState;
use core_config::InputConfig;
use core_keycode::{
    CTRL_V, ESC, K_SPECIAL, KS_MODIFIER, KS_ZERO, Key, ModMask, SpecialKey, encode_key,
    is_mouse_key, keypad_to_plain, utf8_len,
};
use core_keymap::{LangMap, MapStore, ModeMask};
use core_typeahead::{BlockChain, RemapMask, Typeahead};
use crossbeam_channel::Receiver;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// A fully assembled logical key with its modifier mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Key,
    pub mods: ModMask,
}

/// What the on-key observer wants done with the key it just saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnKeyAction {
    Pass,
    /// Suppress the key; the caller sees `<Ignore>`.
    Swallow,
}

pub type OnKeyCallback = Box<dyn FnMut(KeyPress, &[u8]) -> OnKeyAction>;

/// The saved one-shot put-back key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutBack {
    key: Key,
    mods: ModMask,
    /// Whether the key originally came out of the stuff buffer; a stuffed
    /// put-back is returned even while the stuff buffer has more.
    stuffed: bool,
    mouse: Option<(u16, u16)>,
}

/// Handle for flagging an interrupt from signal handlers or other
/// threads; observed at every engine loop head.
#[derive(Debug, Clone)]
pub struct InterruptHandle(Arc<AtomicBool>);

impl InterruptHandle {
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }
}

pub struct InputCore {
    pub(crate) typeahead: Typeahead,
    pub(crate) stuff: BlockChain,
    pub(crate) redo_replay: BlockChain,
    pub(crate) redo: RedoState,
    pub(crate) gather: Gather,
    pub(crate) putback: Option<PutBack>,
    pub(crate) scripts: ScriptStack,
    /// Global and buffer-local mapping tables.
    pub maps: MapStore,
    pub(crate) langmap: LangMap,
    pub(crate) opts: InputConfig,
    pub(crate) mode: ModeMask,
    user: Box<dyn UserInput>,
    pub(crate) injector_rx: Receiver<Vec<u8>>,
    injector: KeyInjector,
    got_int: Arc<AtomicBool>,

    /// The last delivered key was typed (not mapped, not replayed).
    pub(crate) key_typed: bool,
    /// The last delivered key came from the stuff or replay buffer.
    pub(crate) key_stuffed: bool,
    /// Remap mask of the last delivered byte.
    pub(crate) key_noremap: RemapMask,
    /// The current key is under a `<silent>` expansion.
    pub(crate) cmd_silent: bool,
    /// Ambient modifier mask of the key being assembled.
    pub(crate) mod_mask: ModMask,
    mouse_pos: Option<(u16, u16)>,

    /// Mapping disabled (reading a literal next char).
    pub(crate) no_mapping: u32,
    /// Special-key simplification still allowed under `no_mapping`.
    pub(crate) allow_keys: u32,
    /// `0` is a count digit here, not a command to remap.
    pub(crate) no_zero_mapping: u32,
    /// Reentrancy depth of the byte reader.
    pub(crate) busy_depth: u32,
    /// Depth of synthetic-command scopes (`:normal`-style execution).
    normal_scope: u32,
    frames_depth: u32,
    /// At the hit-enter prompt, CR and SPACE bypass mapping.
    hit_enter_prompt: bool,
    on_key: Option<OnKeyCallback>,
}

impl std::fmt::Debug for InputCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputCore")
            .field("typeahead_len", &self.typeahead.len())
            .field("mode", &self.mode)
            .field("script_depth", &self.scripts.depth())
            .finish()
    }
}

impl InputCore {
    pub fn new(opts: InputConfig, user: Box<dyn UserInput>) -> Self {
        let (injector, injector_rx) = source::injector_channel();
        InputCore {
            typeahead: Typeahead::new(),
            stuff: BlockChain::new(),
            redo_replay: BlockChain::new(),
            redo: RedoState::default(),
            gather: Gather::default(),
            putback: None,
            scripts: ScriptStack::default(),
            maps: MapStore::new(),
            langmap: LangMap::identity(),
            opts,
            mode: ModeMask::NORMAL,
            user,
            injector_rx,
            injector,
            got_int: Arc::new(AtomicBool::new(false)),
            key_typed: false,
            key_stuffed: false,
            key_noremap: RemapMask::Remap,
            cmd_silent: false,
            mod_mask: ModMask::empty(),
            mouse_pos: None,
            no_mapping: 0,
            allow_keys: 0,
            no_zero_mapping: 0,
            busy_depth: 0,
            normal_scope: 0,
            frames_depth: 0,
            hit_enter_prompt: false,
            on_key: None,
        }
    }

    // ---------------------------------------------------------------------
    // Ambient state
    // ---------------------------------------------------------------------

    pub fn mode(&self) -> ModeMask {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ModeMask) {
        self.mode = mode;
    }

    pub fn set_langmap(&mut self, langmap: LangMap) {
        self.langmap = langmap;
    }

    pub fn langmap_translate(&self, byte: u8) -> u8 {
        self.langmap.translate(byte)
    }

    pub fn key_typed(&self) -> bool {
        self.key_typed
    }

    pub fn key_stuffed(&self) -> bool {
        self.key_stuffed
    }

    pub fn cmd_silent(&self) -> bool {
        self.cmd_silent
    }

    pub fn mod_mask(&self) -> ModMask {
        self.mod_mask
    }

    pub fn set_hit_enter_prompt(&mut self, on: bool) {
        self.hit_enter_prompt = on;
    }

    /// Pending typeahead bytes (for pending-command display).
    pub fn typeahead_bytes(&self) -> &[u8] {
        self.typeahead.bytes()
    }

    pub fn typeahead_len(&self) -> usize {
        self.typeahead.len()
    }

    /// Structural-change tag of the typeahead buffer; see
    /// [`core_typeahead::Typeahead::change_cnt`].
    pub fn typeahead_change_cnt(&self) -> u32 {
        self.typeahead.change_cnt()
    }

    pub fn set_mouse_pos(&mut self, row: u16, col: u16) {
        self.mouse_pos = Some((row, col));
    }

    pub fn mouse_pos(&self) -> Option<(u16, u16)> {
        self.mouse_pos
    }

    /// Handle for setting the interrupt flag from outside.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle(self.got_int.clone())
    }

    pub fn interrupt(&self) {
        self.got_int.store(true, Ordering::Release);
    }

    pub(crate) fn interrupted(&self) -> bool {
        self.got_int.load(Ordering::Acquire)
    }

    pub(crate) fn clear_interrupt(&self) {
        self.got_int.store(false, Ordering::Release);
    }

    /// Cloneable handle other threads use to inject synthesized keys;
    /// injected bytes drain into the stuff buffer.
    pub fn injector(&self) -> KeyInjector {
        self.injector.clone()
    }

    /// Define a global mapping. LHS and RHS are byte strings in the wire
    /// protocol (special keys escaped).
    pub fn define_mapping(
        &mut self,
        modes: ModeMask,
        lhs: Vec<u8>,
        rhs: core_keymap::MapRhs,
        flags: core_keymap::MapFlags,
    ) {
        self.maps.global.define(core_keymap::Mapping {
            lhs,
            lhs_alt: None,
            rhs,
            modes,
            flags,
        });
    }

    /// Remove a global mapping for the given modes.
    pub fn remove_mapping(&mut self, modes: ModeMask, lhs: &[u8]) -> bool {
        self.maps.global.remove(lhs, modes)
    }

    /// Disable mapping for reads performed inside `f` (literal next-char
    /// reads, mapping-disabled second characters).
    pub fn with_no_mapping<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.no_mapping += 1;
        self.allow_keys += 1;
        let out = f(self);
        self.no_mapping -= 1;
        self.allow_keys -= 1;
        out
    }

    /// Treat `0` as a count digit (no mapping) while `f` runs.
    pub fn with_no_zero_mapping<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.no_zero_mapping += 1;
        let out = f(self);
        self.no_zero_mapping -= 1;
        out
    }

    /// Run `f` in a synthetic-command scope: reads never block on the
    /// user and unwind with ESC when the buffers run dry.
    pub fn with_normal_scope<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.normal_scope += 1;
        let out = f(self);
        self.normal_scope -= 1;
        out
    }

    // ---------------------------------------------------------------------
    // Key reading (character assembly)
    // ---------------------------------------------------------------------

    /// Check for an available byte without consuming anything.
    pub fn peek_byte(&mut self) -> Result<Option<u8>, InputError> {
        let can_putback = self
            .putback
            .as_ref()
            .is_some_and(|pb| pb.stuffed || (self.stuff.is_empty() && self.redo_replay.is_empty()));
        if can_putback {
            // An already-assembled key has no single-byte identity; report
            // availability with its first encoded byte.
            let pb = self.putback.expect("checked above");
            let mut buf = Vec::new();
            encode_key(pb.key, pb.mods, &mut buf);
            return Ok(buf.first().copied());
        }
        self.next_byte(false)
    }

    /// True when a key is available and `get_one_key` would not block.
    pub fn char_avail(&mut self) -> bool {
        matches!(self.peek_byte(), Ok(Some(_)))
    }

    /// Read and assemble the next logical key.
    ///
    /// Returns `None` when the source chain is exhausted (non-interactive
    /// input) or when called recursively outside a synthetic-command
    /// scope. The ambient modifier mask of the key is in the result and
    /// in [`InputCore::mod_mask`].
    pub fn get_one_key(&mut self) -> Result<Option<KeyPress>, InputError> {
        // A put-back key was already assembled and observed once.
        let can_putback = self
            .putback
            .as_ref()
            .is_some_and(|pb| pb.stuffed || (self.stuff.is_empty() && self.redo_replay.is_empty()));
        if can_putback {
            let pb = self.putback.take().expect("checked above");
            self.mod_mask = pb.mods;
            self.mouse_pos = pb.mouse;
            return Ok(Some(KeyPress {
                key: pb.key,
                mods: pb.mods,
            }));
        }

        self.mod_mask = ModMask::empty();
        self.gather.begin_key_read();

        let key = loop {
            // After a modifier triple has been consumed the modified key
            // must arrive literally.
            let guarded = !self.mod_mask.is_empty();
            if guarded {
                self.no_mapping += 1;
                self.allow_keys += 1;
            }
            let b = self.next_byte(true)?;
            if guarded {
                self.no_mapping -= 1;
                self.allow_keys -= 1;
            }
            let Some(b) = b else {
                return Ok(None);
            };

            let mut key = if b == K_SPECIAL {
                // Two more bytes belong to this triple; no mapping, and no
                // simplification that could eat them.
                self.no_mapping += 1;
                let saved_allow = std::mem::replace(&mut self.allow_keys, 0);
                let b2 = self.next_byte(true)?.unwrap_or(0);
                let b3 = self.next_byte(true)?.unwrap_or(0);
                self.no_mapping -= 1;
                self.allow_keys = saved_allow;

                if b2 == KS_MODIFIER {
                    self.mod_mask = ModMask::from_bits_truncate(b3);
                    continue;
                }
                match b2 {
                    core_keycode::KS_EXTRA => Key::Special(SpecialKey::from_code(b3)),
                    KS_ZERO => Key::Char('\0'),
                    _ => Key::Char('\u{80}'),
                }
            } else if utf8_len(b) > 1 {
                // Gather the continuation bytes, un-escaping inline 0x80s.
                let want = utf8_len(b);
                let mut seq = [0u8; 4];
                seq[0] = b;
                self.no_mapping += 1;
                for slot in seq.iter_mut().take(want).skip(1) {
                    let mut nb = self.next_byte(true)?.unwrap_or(0);
                    if nb == K_SPECIAL {
                        // K_SPECIAL KS_SPECIAL KE_FILLER is a literal 0x80.
                        self.next_byte(true)?;
                        self.next_byte(true)?;
                        nb = K_SPECIAL;
                    }
                    *slot = nb;
                }
                self.no_mapping -= 1;
                match std::str::from_utf8(&seq[..want]) {
                    Ok(s) => Key::Char(s.chars().next().unwrap_or('\u{fffd}')),
                    Err(_) => Key::Char(b as char),
                }
            } else {
                Key::Char(b as char)
            };

            // A directly typed, unmapped Alt key is delivered the way most
            // terminals encode it: ESC followed by the bare key. Not in
            // Terminal mode, and never for mouse keys.
            if self.no_mapping == 0
                && self.key_typed
                && self.mod_mask == ModMask::ALT
                && !self.mode.contains(ModeMask::TERMINAL)
                && !is_mouse_key(key)
            {
                self.mod_mask = ModMask::empty();
                let len = self.push_key_front(key, ModMask::empty(), false)?;
                self.push_key_front(Key::Char(ESC as char), ModMask::empty(), false)?;
                // The rolled-back bytes will be recorded again on re-read.
                let rolled = len + 3;
                self.gather.ungetchars(rolled);
                self.gather.shrink_observed(rolled);
                continue;
            }

            // Unmapped keypad keys act like their plain counterpart.
            if let Key::Special(sk) = key
                && let Some(plain) = keypad_to_plain(sk)
            {
                key = plain;
            }

            break key;
        };

        let mut key = key;
        let observed = self.gather.take_observed();
        if let Some(mut cb) = self.on_key.take() {
            let act = cb(
                KeyPress {
                    key,
                    mods: self.mod_mask,
                },
                &observed,
            );
            if self.on_key.is_none() {
                self.on_key = Some(cb);
            }
            if act == OnKeyAction::Swallow {
                key = Key::Special(SpecialKey::Ignore);
            }
        }

        Ok(Some(KeyPress {
            key,
            mods: self.mod_mask,
        }))
    }

    /// Save exactly one logical key to be returned by the very next
    /// `get_one_key`; overwrites any previous put-back.
    pub fn put_back_key(&mut self, key: Key, mods: ModMask) {
        self.putback = Some(PutBack {
            key,
            mods,
            stuffed: self.key_stuffed,
            mouse: self.mouse_pos,
        });
    }

    /// Encode a key and insert it at the front of typeahead, restoring
    /// the typed/silent flags of the key it came from. Returns the number
    /// of bytes inserted.
    pub fn push_key_front(
        &mut self,
        key: Key,
        mods: ModMask,
        ignore_for_on_key: bool,
    ) -> Result<usize, InputError> {
        let mut bytes = Vec::new();
        encode_key(key, mods, &mut bytes);
        let policy = match self.key_noremap {
            RemapMask::Remap => RemapPolicy::All,
            RemapMask::Noremap => RemapPolicy::FirstN(1),
            RemapMask::ScriptOnly => RemapPolicy::Script,
            RemapMask::AbbrOnly => RemapPolicy::Skip,
        };
        let nottyped = !self.key_typed;
        let silent = self.cmd_silent;
        self.insert_front(&bytes, policy, nottyped, silent)?;
        if self.key_typed && ignore_for_on_key {
            self.gather.add_observe_ignore(bytes.len());
        }
        Ok(bytes.len())
    }

    /// Append keys at the tail of typeahead (programmatic feeding).
    pub fn feed_keys(
        &mut self,
        bytes: &[u8],
        policy: RemapPolicy,
        nottyped: bool,
    ) -> Result<(), InputError> {
        let offset = self.typeahead.len();
        self.typeahead
            .insert(offset, bytes, policy, nottyped, false)
            .map_err(|e| {
                self.flush(FlushMode::Input);
                e.into()
            })
    }

    /// Register (or clear) the on-key observer.
    pub fn set_on_key(&mut self, cb: Option<OnKeyCallback>) {
        self.on_key = cb;
    }

    // ---------------------------------------------------------------------
    // Stuff API
    // ---------------------------------------------------------------------

    /// Append pre-escaped bytes to the stuff buffer.
    pub fn stuff_literal(&mut self, bytes: &[u8]) {
        self.stuff.append(bytes);
    }

    /// Append text as typed characters (each code point escaped).
    pub fn stuff_typed(&mut self, text: &str) {
        for ch in text.chars() {
            self.stuff.append_char(ch);
        }
    }

    pub fn stuff_char(&mut self, ch: char) {
        self.stuff.append_char(ch);
    }

    pub fn stuff_num(&mut self, n: i64) {
        self.stuff.append_num(n);
    }

    /// Stuff text so it is inserted literally when `literally`, protecting
    /// control characters with Ctrl-V; otherwise as interpretable keys.
    pub fn stuff_escaped(&mut self, text: &str, literally: bool) {
        for ch in text.chars() {
            if literally && ((ch < ' ' && ch != '\t') || ch == '\u{7f}') {
                self.stuff.append_char(CTRL_V as char);
            }
            self.stuff.append_char(ch);
        }
    }

    pub fn stuff_empty(&self) -> bool {
        self.stuff.is_empty() && self.redo_replay.is_empty()
    }

    /// Discard pending input per `mode`, including the read buffers.
    pub fn flush(&mut self, mode: FlushMode) {
        self.stuff.clear();
        self.redo_replay.clear();
        self.typeahead.flush(mode);
    }

    // ---------------------------------------------------------------------
    // Redo API
    // ---------------------------------------------------------------------

    pub fn reset_redo(&mut self) {
        self.redo.reset();
    }

    /// Discard the current redo sequence and bring the previous one back,
    /// dropping any replay already queued from it.
    pub fn cancel_redo(&mut self) {
        self.redo.cancel();
        self.stuff.clear();
        self.redo_replay.clear();
    }

    pub fn append_redo_char(&mut self, ch: char) {
        self.redo.append_char(ch);
    }

    pub fn append_redo_key(&mut self, key: Key, mods: ModMask) {
        self.redo.append_key(key, mods);
    }

    pub fn append_redo_num(&mut self, n: i64) {
        self.redo.append_num(n);
    }

    /// Append pre-escaped bytes.
    pub fn append_redo_raw(&mut self, bytes: &[u8]) {
        self.redo.append_raw(bytes);
    }

    /// Append literal text with Ctrl-V protection.
    pub fn append_redo_lit(&mut self, text: &str) {
        self.redo.append_lit(text);
    }

    pub fn redo_blocked(&self) -> bool {
        self.redo.is_blocked()
    }

    /// Queue the recorded redo sequence for replay. `count` overrides the
    /// recorded count when non-zero; `use_old` replays the change before
    /// last.
    pub fn start_redo(&mut self, count: u32, use_old: bool) -> Option<RedoStart> {
        self.redo.start_redo(&mut self.redo_replay, count, use_old)
    }

    /// Queue just the typed text of the last insert for replay; blocks
    /// redo recording until [`InputCore::stop_redo_insert`].
    pub fn start_redo_insert(&mut self) -> bool {
        self.redo.start_redo_insert(&mut self.redo_replay)
    }

    pub fn stop_redo_insert(&mut self) {
        self.redo.set_blocked(false);
    }

    // ---------------------------------------------------------------------
    // Recording API
    // ---------------------------------------------------------------------

    pub fn recording(&self) -> Option<char> {
        self.gather.recording()
    }

    /// Begin capturing typed keys for `register`. Fails when a recording
    /// is already running.
    pub fn start_recording(&mut self, register: char) -> bool {
        self.gather.start_recording(register)
    }

    /// Stop capturing; returns the register and the captured bytes, minus
    /// the keystroke that stopped the recording.
    pub fn stop_recording(&mut self) -> Option<(char, Vec<u8>)> {
        self.gather.stop_recording()
    }

    /// Attach a sink receiving every typed key (a script capture file).
    pub fn record_to_script(&mut self, sink: Option<Box<dyn std::io::Write + Send>>) {
        self.gather.set_script_out(sink);
    }

    // ---------------------------------------------------------------------
    // Script sources
    // ---------------------------------------------------------------------

    /// Push a script file as the innermost byte source. The live byte
    /// streams are parked with the frame and restored when it pops.
    pub fn open_script(&mut self, path: &Path) -> Result<(), InputError> {
        if !self.scripts.has_room() {
            return Err(InputError::ScriptDepth);
        }
        let file = std::fs::File::open(path)?;
        let saved = StreamSave {
            typeahead: std::mem::take(&mut self.typeahead),
            stuff: self.stuff.take(),
            redo_replay: self.redo_replay.take(),
            putback: self.putback.take(),
        };
        self.scripts.push(path, file, saved);
        Ok(())
    }

    pub(crate) fn finish_script(&mut self) {
        if let Some(frame) = self.scripts.pop() {
            self.restore_streams(frame.saved);
        }
    }

    pub fn close_all_scripts(&mut self) {
        while self.scripts.is_active() {
            self.finish_script();
        }
    }

    pub fn using_script(&self) -> bool {
        self.scripts.is_active()
    }

    pub fn script_depth(&self) -> usize {
        self.scripts.depth()
    }

    fn restore_streams(&mut self, saved: StreamSave) {
        self.typeahead = saved.typeahead;
        self.stuff = saved.stuff;
        self.redo_replay = saved.redo_replay;
        self.putback = saved.putback;
    }

    // ---------------------------------------------------------------------
    // Whole-state save/restore
    // ---------------------------------------------------------------------

    /// Snapshot every buffer for a nested invocation, leaving the core
    /// with fresh empty ones (and a copy of the redo buffer, so a nested
    /// repeat still works).
    pub fn save_input_state(&mut self) -> InputFrame {
        self.frames_depth += 1;
        let (recording, record, last_recorded) = self.gather.take_record_state();
        debug!(target: "input.frames", depth = self.frames_depth, "state saved");
        InputFrame {
            typeahead: std::mem::take(&mut self.typeahead),
            stuff: self.stuff.take(),
            redo_replay: self.redo_replay.take(),
            redo: self.redo.save(),
            putback: self.putback.take(),
            recording,
            record,
            last_recorded,
        }
    }

    /// Restore a frame produced by [`InputCore::save_input_state`]. Pairs
    /// must balance.
    pub fn restore_input_state(&mut self, frame: InputFrame) {
        if self.frames_depth == 0 {
            warn!(target: "input.frames", "unbalanced input-state restore");
            debug_assert!(false, "unbalanced input-state restore");
        } else {
            self.frames_depth -= 1;
        }
        let floor = self.typeahead.change_cnt();
        self.typeahead = frame.typeahead;
        // Any index cached across the nested scope is dead.
        self.typeahead.touch(floor);
        self.stuff = frame.stuff;
        self.redo_replay = frame.redo_replay;
        self.redo.restore(frame.redo);
        self.putback = frame.putback;
        self.gather
            .restore_record_state(frame.recording, frame.record, frame.last_recorded);
        debug!(target: "input.frames", depth = self.frames_depth, "state restored");
    }

    // ---------------------------------------------------------------------
    // Command-line fragments from mappings
    // ---------------------------------------------------------------------

    /// Collect the command-line fragment of an embedded-command mapping:
    /// everything up to the terminating CR, mapping disabled. A nested
    /// command key or running out of keys is a malformed mapping; the
    /// remaining expansion is discarded.
    pub fn collect_cmd_fragment(&mut self) -> Result<String, InputError> {
        let mut out = String::new();
        let result = self.with_no_mapping(|core| {
            loop {
                match core.get_one_key()? {
                    None => {
                        return Err(InputError::MalformedCmdMapping(
                            "command mapping must end with <CR>".into(),
                        ));
                    }
                    Some(kp) => match kp.key {
                        Key::Special(SpecialKey::Cmd) => {
                            return Err(InputError::MalformedCmdMapping(
                                "nested command mapping".into(),
                            ));
                        }
                        Key::Special(SpecialKey::Ignore) | Key::Special(SpecialKey::Nop) => {}
                        Key::Char('\r') | Key::Char('\n') => return Ok(()),
                        Key::Char(c) => out.push(c),
                        Key::Special(other) => {
                            return Err(InputError::MalformedCmdMapping(format!(
                                "special key {other:?} in command fragment"
                            )));
                        }
                    },
                }
            }
        });
        match result {
            Ok(()) => Ok(out),
            Err(e) => {
                self.flush(FlushMode::Minimal);
                Err(e)
            }
        }
    }
}
