//! The mapping engine: rewrite typeahead until a byte is ready.
//!
//! One pass classifies the front of typeahead against the mapping tables:
//! a full match expands in place and the scan restarts; a partial match
//! asks for more bytes (bounded by the mapping timeout); an incomplete
//! escape triple asks for more bytes (bounded by the key-code timeout);
//! no match emits the front byte. Expansion depth is capped, and every
//! loop head observes the interrupt flag.
//!
//! The scan rules mirror long-standing modal-editor behavior: the longest
//! full match wins, but only when no longer mapping could still complete;
//! a `nowait` entry fires without waiting; language-map translation
//! applies per byte outside escape triples; an entry is dead if any
//! matched byte's remap mask forbids mapping, unless the buffer starts
//! with the always-remappable mapping-pseudo-key prefix.

use crate::InputCore;
use crate::error::InputError;
use crate::source::Wait;
use core_keycode::{
    CAR, ESC, K_SPECIAL, KS_EXTRA, KS_MODIFIER, Key, ModMask, SpecialKey, encode_key,
    encode_special, merge_modifiers, utf8_len,
};
use core_keymap::{MapRhs, Mapping, ModeMask};
use core_typeahead::{FlushMode, MAXMAPLEN, RemapMask, RemapPolicy};
use std::rc::Rc;
use tracing::{debug, trace, warn};

/// Which kind of incomplete prefix is pending; selects the wait budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PartialKind {
    None,
    /// A strict prefix of some mapping LHS.
    Map,
    /// An incomplete escape triple.
    KeyCode,
}

#[derive(Debug)]
enum MapOutcome {
    /// Typeahead was rewritten (expansion or simplification); rescan.
    Retry,
    /// No mapping applies; the front byte is the result.
    GetByte,
    /// Cannot decide yet; fetch more bytes.
    NeedMore(PartialKind),
}

#[derive(Debug)]
enum Fill {
    Added(usize),
    None,
    /// The innermost script reached its end and was popped.
    ScriptEnded,
}

impl InputCore {
    /// Move injected byte strings into the stuff buffer.
    pub(crate) fn drain_injector(&mut self) {
        while let Ok(bytes) = self.injector_rx.try_recv() {
            self.stuff.append(&bytes);
        }
    }

    fn read_readbuffers(&mut self, advance: bool) -> Option<u8> {
        if let Some(b) = self.stuff.read(advance) {
            return Some(b);
        }
        self.redo_replay.read(advance)
    }

    /// Insert at the front of typeahead, flushing everything on overflow
    /// so no partial expansion survives.
    pub(crate) fn insert_front(
        &mut self,
        bytes: &[u8],
        policy: RemapPolicy,
        nottyped: bool,
        silent: bool,
    ) -> Result<(), InputError> {
        if let Err(e) = self.typeahead.insert(0, bytes, policy, nottyped, silent) {
            self.flush(FlushMode::Input);
            return Err(e.into());
        }
        Ok(())
    }

    /// Pull bytes from the innermost script, or from the user.
    fn fill_typeahead(&mut self, wait: Wait) -> Result<Fill, InputError> {
        if self.scripts.is_active() {
            let mut buf = [0u8; 128];
            match self.scripts.read_some(&mut buf) {
                Ok(0) => {
                    self.finish_script();
                    return Ok(Fill::ScriptEnded);
                }
                Ok(n) => {
                    self.typeahead.push_typed(&buf[..n])?;
                    return Ok(Fill::Added(n));
                }
                Err(_) => {
                    // Read error behaves like end of file.
                    self.finish_script();
                    return Ok(Fill::ScriptEnded);
                }
            }
        }
        let mut tmp = Vec::new();
        let n = self.user.fill(wait, &mut tmp)?;
        if n == 0 {
            return Ok(Fill::None);
        }
        self.typeahead.push_typed(&tmp)?;
        Ok(Fill::Added(n))
    }

    fn front_is_plug(&self) -> bool {
        self.typeahead.len() >= 3
            && self.typeahead.byte(0) == K_SPECIAL
            && self.typeahead.byte(1) == KS_EXTRA
            && self.typeahead.byte(2) == SpecialKey::Plug.code()
    }

    /// Whether a mapping may be looked up for the front byte at all.
    fn mapping_allowed(&self, first: u8) -> bool {
        if self.no_mapping > 0 {
            return false;
        }
        if self.no_zero_mapping > 0 && first == b'0' {
            return false;
        }
        if self.hit_enter_prompt && (first == CAR || first == b' ') {
            return false;
        }
        self.typeahead.maplen() == 0
            || self.front_is_plug()
            || !self.typeahead.mask(0).blocks_mapping()
    }

    /// One classification pass over the mapping tables.
    fn handle_mapping(
        &mut self,
        timedout: bool,
        mapdepth: &mut u32,
    ) -> Result<MapOutcome, InputError> {
        let tlen = self.typeahead.len();
        let first = self.typeahead.byte(0);
        let is_plug = self.front_is_plug();

        let mut best: Option<Rc<Mapping>> = None;
        let mut best_len = 0usize;
        let mut partial = false;
        let mut max_nomatch = 0usize;

        if self.mapping_allowed(first) {
            // Language-map translation applies to the lookup byte outside
            // insert/cmdline and outside Select mode; never to the escape
            // byte itself.
            let lookup = if first == K_SPECIAL {
                first
            } else if !self.mode.intersects(ModeMask::INSERT | ModeMask::CMDLINE)
                && !self.mode.contains(ModeMask::SELECT)
            {
                self.langmap.translate(first)
            } else {
                first
            };
            let in_triple0: u8 = if first == K_SPECIAL { 2 } else { 0 };

            for mp in self.maps.candidates(self.mode, lookup).iter() {
                // Language mappings apply to typed keys only.
                if mp.modes.contains(ModeMask::LANGMAP) && self.typeahead.maplen() > 0 {
                    continue;
                }
                let lhs: &[u8] = if mp.lhs.first() == Some(&lookup) {
                    &mp.lhs
                } else if let Some(alt) = &mp.lhs_alt
                    && alt.first() == Some(&lookup)
                {
                    alt
                } else {
                    continue;
                };

                // Longest common prefix of LHS and typeahead, tracking
                // escape triples so langmap and modifier merging only
                // touch plain bytes.
                let mut mlen = 1usize;
                let mut in_triple = in_triple0;
                let mut mod_pending = 0u8; // 1 = saw KS_MODIFIER, then the mask
                let mut mod_mask = 0u8;
                while mlen < tlen {
                    let mut c2 = self.typeahead.byte(mlen);
                    if in_triple > 0 {
                        if in_triple == 2 && c2 == KS_MODIFIER {
                            mod_pending = 1;
                        } else if in_triple == 1 && mod_pending == 1 {
                            mod_mask = c2;
                            mod_pending = 0;
                        }
                        in_triple -= 1;
                    } else if c2 == K_SPECIAL {
                        in_triple = 2;
                    } else {
                        // Apply langmap only where merging the pending
                        // modifier would not change the byte, so layouts
                        // behave the same across terminals.
                        if byte_unchanged_by_mods(c2, mod_mask) {
                            c2 = self.langmap.translate(c2);
                        }
                        mod_mask = 0;
                    }
                    if lhs.get(mlen) != Some(&c2) {
                        break;
                    }
                    mlen += 1;
                }

                // Never match just the lead bytes of a longer multi-byte
                // character.
                if let Some(cl) = unescaped_first_char_len(lhs)
                    && utf8_len(first) > cl
                {
                    continue;
                }

                let keylen = lhs.len();
                let full = mlen == keylen;
                let could_grow = mlen == tlen && tlen < keylen;
                if full || could_grow {
                    // Script-only bytes match script-local entries alone.
                    if self.typeahead.mask(0) == RemapMask::ScriptOnly && !mp.is_script() {
                        continue;
                    }
                    // A masked byte anywhere in the match kills the entry.
                    if !is_plug
                        && (0..mlen.min(tlen)).any(|i| self.typeahead.mask(i).blocks_mapping())
                    {
                        continue;
                    }
                    if keylen > tlen {
                        if !timedout && !best.as_ref().is_some_and(|b| b.nowait()) {
                            partial = true;
                            break;
                        }
                    } else if keylen > best_len
                        || (keylen == best_len
                            && best
                                .as_ref()
                                .is_some_and(|b| !b.modes.contains(ModeMask::LANGMAP))
                            && mp.modes.contains(ModeMask::LANGMAP))
                    {
                        best = Some(mp.clone());
                        best_len = keylen;
                    }
                } else {
                    max_nomatch = max_nomatch.max(mlen);
                }
            }
        }

        if partial {
            trace!(target: "input.engine", "partial mapping match");
            return Ok(MapOutcome::NeedMore(PartialKind::Map));
        }

        if best.is_none() || max_nomatch > best_len {
            // No usable mapping, or it is shadowed by a longer non-match.
            // Before falling back to the raw byte, try folding a leading
            // modifier triple into a simpler key.
            if self.no_mapping == 0 || self.allow_keys > 0 {
                if first == K_SPECIAL
                    && (tlen < 2 || (self.typeahead.byte(1) == KS_MODIFIER && tlen < 4))
                {
                    // Can't tell yet whether to simplify.
                    return Ok(MapOutcome::NeedMore(PartialKind::KeyCode));
                }
                if self.check_simplify_modifier(max_nomatch + 1)? {
                    return Ok(MapOutcome::Retry);
                }
            }
            if best.is_none() {
                return Ok(MapOutcome::GetByte);
            }
        }

        let mp = best.expect("a full match was selected");
        let keylen = best_len;
        self.expand_mapping(&mp, keylen, mapdepth)?;
        Ok(MapOutcome::Retry)
    }

    /// Replace the matched LHS with the RHS at the front of typeahead.
    fn expand_mapping(
        &mut self,
        mp: &Rc<Mapping>,
        keylen: usize,
        mapdepth: &mut u32,
    ) -> Result<(), InputError> {
        let maplen = self.typeahead.maplen();
        let is_langmap = mp.modes.contains(ModeMask::LANGMAP);

        // Record the typed portion that triggered the mapping. Language
        // mappings record their expansion instead, afterwards.
        if keylen > maplen && !is_langmap {
            let typed: Vec<u8> = self.typeahead.bytes()[maplen..keylen].to_vec();
            self.gather.gotchars(&typed);
        }

        self.cmd_silent = self.typeahead.silent_len() > 0;
        self.typeahead.delete(0, keylen);

        *mapdepth += 1;
        if *mapdepth >= self.opts.maxmapdepth {
            warn!(target: "input.engine", depth = *mapdepth, "recursive mapping");
            self.flush(FlushMode::Minimal);
            *mapdepth = 0;
            return Err(InputError::RecursiveMapping);
        }

        // A Visual-mode mapping used on a Select-mode selection runs in
        // Visual mode; a synthetic key switches back afterwards.
        if self.mode.contains(ModeMask::SELECT) && mp.modes.contains(ModeMask::VISUAL) {
            self.mode = (self.mode - ModeMask::SELECT) | ModeMask::VISUAL;
            let mut switchback = Vec::new();
            encode_special(SpecialKey::Select, &mut switchback);
            self.insert_front(&switchback, RemapPolicy::None, true, false)?;
        }

        let rhs_bytes = match &mp.rhs {
            MapRhs::Keys(k) => k.clone(),
            MapRhs::Expr(eval) => {
                // The callback may read keys itself; lift the reentrancy
                // guard for its duration.
                let saved_busy = std::mem::replace(&mut self.busy_depth, 0);
                let result = eval();
                self.busy_depth = saved_busy;
                match result {
                    Ok(bytes) if bytes.is_empty() => {
                        // Nothing produced and no error raised: emit an
                        // <Ignore> so a redraw pass still happens.
                        let mut ignore = Vec::new();
                        encode_special(SpecialKey::Ignore, &mut ignore);
                        ignore
                    }
                    Ok(bytes) => bytes,
                    Err(e) => {
                        debug!(target: "input.engine", error = %e, "expression mapping failed");
                        return Err(InputError::ExprFailed(e.0));
                    }
                }
            }
        };

        if keylen > maplen && is_langmap {
            self.gather.gotchars(&rhs_bytes);
        }

        let starts_with_lhs = rhs_bytes.starts_with(&mp.lhs)
            || mp
                .lhs_alt
                .as_ref()
                .is_some_and(|alt| rhs_bytes.starts_with(alt));
        let policy = if mp.is_noremap() {
            if starts_with_lhs {
                RemapPolicy::Skip
            } else {
                RemapPolicy::None
            }
        } else if mp.is_script() {
            RemapPolicy::Script
        } else {
            RemapPolicy::All
        };

        let silent = self.cmd_silent || mp.flags.contains(core_keymap::MapFlags::SILENT);
        debug!(
            target: "input.engine",
            matched = keylen,
            rhs = rhs_bytes.len(),
            depth = *mapdepth,
            "mapping expanded"
        );
        self.insert_front(&rhs_bytes, policy, true, silent)
    }

    /// Fold the first modifier triple within `max_offset` bytes of the
    /// front into a simpler key. Returns true when typeahead changed.
    fn check_simplify_modifier(&mut self, max_offset: usize) -> Result<bool, InputError> {
        for offset in 0..max_offset {
            if offset + 3 >= self.typeahead.len() {
                break;
            }
            if self.typeahead.byte(offset) != K_SPECIAL
                || self.typeahead.byte(offset + 1) != KS_MODIFIER
            {
                continue;
            }
            let mods = ModMask::from_bits_truncate(self.typeahead.byte(offset + 2));
            let c = self.typeahead.byte(offset + 3);
            if c == K_SPECIAL || !c.is_ascii() {
                // Only single-byte keys fold.
                continue;
            }
            let (new_key, new_mods) = merge_modifiers(Key::Char(c as char), mods);
            if new_key == Key::Char(c as char) {
                continue;
            }
            let mut bytes = Vec::new();
            encode_key(new_key, new_mods, &mut bytes);
            self.typeahead.delete(offset, 4);
            self.typeahead
                .insert(offset, &bytes, RemapPolicy::All, false, false)?;
            trace!(target: "input.engine", offset, "modifier simplified");
            return Ok(true);
        }
        Ok(false)
    }

    /// Produce the next byte of the key stream, or `None` when no byte is
    /// available (peek with nothing pending, exhausted non-interactive
    /// input, or a guarded recursive call).
    pub(crate) fn next_byte(&mut self, advance: bool) -> Result<Option<u8>, InputError> {
        // Recursive reads (an event handler reading keys while a read is
        // in progress) must not steal from the outer read, except inside
        // an explicit synthetic-command scope.
        if self.busy_depth > 0 && self.normal_scope == 0 {
            return Ok(None);
        }
        self.busy_depth += 1;
        let result = self.next_byte_inner(advance);
        self.busy_depth -= 1;
        result
    }

    fn next_byte_inner(&mut self, advance: bool) -> Result<Option<u8>, InputError> {
        if advance {
            self.key_stuffed = false;
        }
        self.drain_injector();
        self.stuff.start_read();
        self.redo_replay.start_read();

        let mut timedout = false;
        let mut mapdepth: u32 = 0;
        let mut partial = PartialKind::None;

        // Sources 1 and 2: the stuff and replay buffers.
        if let Some(c) = self.read_readbuffers(advance) {
            if !self.interrupted() {
                if advance {
                    // Commands replayed from a buffer behave like typed
                    // ones for everything except recording.
                    self.key_stuffed = true;
                }
                self.typeahead.set_no_abbr_min(1);
                return Ok(Some(c));
            }
        }

        let got = loop {
            if self.interrupted() {
                let from_script = self.scripts.is_active();
                self.close_all_scripts();
                // Drain whatever the user source still holds; it all goes.
                let mut scratch = Vec::new();
                while matches!(self.user.fill(Wait::None, &mut scratch), Ok(n) if n > 0) {
                    scratch.clear();
                }
                let b = if (from_script || self.typeahead.maplen() > 0)
                    && self.mode.intersects(ModeMask::INSERT | ModeMask::CMDLINE)
                {
                    ESC
                } else {
                    core_keycode::CTRL_C
                };
                self.flush(FlushMode::Input);
                self.clear_interrupt();
                self.cmd_silent = false;
                if advance {
                    self.gather.gotchars(&[b]);
                }
                break Some(b);
            }

            if self.typeahead.len() > 0 {
                match self.handle_mapping(timedout, &mut mapdepth)? {
                    MapOutcome::Retry => continue,
                    MapOutcome::GetByte => {
                        let b = self.typeahead.byte(0);
                        if advance {
                            self.cmd_silent = self.typeahead.silent_len() > 0;
                            if self.typeahead.maplen() > 0 {
                                self.key_typed = false;
                            } else {
                                self.key_typed = true;
                                self.gather.gotchars(&[b]);
                            }
                            self.key_noremap = self.typeahead.mask(0);
                            self.typeahead.delete(0, 1);
                        }
                        break Some(b);
                    }
                    MapOutcome::NeedMore(kind) => partial = kind,
                }
            }

            // Inside a synthetic command scope there is no user to wait
            // for: an incomplete mapping behaves as timed out, and an
            // empty buffer yields an ESC to unwind the caller.
            if self.normal_scope > 0 {
                if self.typeahead.len() > 0 {
                    timedout = true;
                    continue;
                }
                self.typeahead.set_no_abbr_min(0);
                break Some(ESC);
            }

            if self.typeahead.is_empty() {
                // A dead partial match was fully consumed; the flag must
                // not leak into the next key.
                timedout = false;
            }

            let wait = if !advance {
                Wait::None
            } else if self.typeahead.is_empty() {
                Wait::Forever
            } else {
                let budget = match partial {
                    PartialKind::KeyCode => self.opts.keycode_wait(),
                    _ => self.opts.map_wait(),
                };
                match budget {
                    Some(d) => Wait::from(d),
                    None => Wait::Forever,
                }
            };

            let waiting_on = self.typeahead.len();
            match self.fill_typeahead(wait)? {
                Fill::ScriptEnded => continue,
                Fill::Added(_) => {
                    if self.typeahead.len() >= self.typeahead.maplen() + MAXMAPLEN {
                        // Buffer effectively full; stop extending matches.
                        timedout = true;
                    }
                    continue;
                }
                Fill::None => {
                    if !advance {
                        break None;
                    }
                    if waiting_on > 0 {
                        timedout = true;
                        continue;
                    }
                    // Blocking read with nothing pending produced nothing:
                    // the source is exhausted.
                    break None;
                }
            }
        };

        if let Some(b) = got {
            if timedout && b == ESC {
                // An ESC emitted because a mapping timed out must not fuse
                // with following bytes into a key code when recorded.
                self.gather.record_ignore();
            }
            return Ok(Some(b));
        }
        Ok(None)
    }
}

/// True when merging `mods` into the byte would leave it unchanged.
fn byte_unchanged_by_mods(b: u8, mods: u8) -> bool {
    let mask = ModMask::from_bits_truncate(mods);
    if mask.is_empty() {
        return true;
    }
    if !b.is_ascii() {
        return true;
    }
    merge_modifiers(Key::Char(b as char), mask).0 == Key::Char(b as char)
}

/// Byte length of the first unescaped character of an LHS, when it is a
/// character at all.
fn unescaped_first_char_len(lhs: &[u8]) -> Option<usize> {
    match core_keycode::decode(lhs) {
        core_keycode::Decoded::Char { ch, .. } => Some(ch.len_utf8()),
        _ => None,
    }
}
