//! The typeahead buffer: one linear byte array plus a parallel remap mask.
//!
//! Valid bytes live in `buf[off .. off + len]`, with margins on both sides
//! so that inserting at the front or deleting from the front is usually a
//! pointer adjustment rather than a move. `buf[off + len]` is always NUL.
//!
//! Three prefix counters describe the front of the buffer: the first
//! `maplen` bytes came out of a mapping expansion (not typed), the first
//! `silent` bytes are under a `<silent>` mapping, and the first `no_abbr`
//! bytes must not trigger abbreviation. Every counter is at most `len`.
//!
//! `change_cnt` increments on every structural change. Callers that hold
//! an index across an operation that may insert or delete must re-check it
//! and re-derive their position.

use thiserror::Error;
use tracing::trace;

/// Longest LHS a mapping may have, in bytes.
pub const MAXMAPLEN: usize = 50;

/// Reserved space on either side of the valid region.
const MARGIN: usize = MAXMAPLEN + 4;

/// Initial allocation; enough for a few nested mappings without growing.
const INIT_LEN: usize = 5 * (MAXMAPLEN + 3);

/// Ceiling on the buffer; an insert that would exceed it fails whole.
const MAX_LEN: usize = i32::MAX as usize - 4 * MARGIN;

/// Per-byte remap permission, parallel to the byte array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum RemapMask {
    /// May match any mapping.
    #[default]
    Remap,
    /// Must not match any mapping or abbreviation.
    Noremap,
    /// May match script-local mappings only.
    ScriptOnly,
    /// Must not match mappings, but may trigger abbreviations.
    AbbrOnly,
}

impl RemapMask {
    /// Bytes with this mask never participate in a mapping LHS.
    pub fn blocks_mapping(self) -> bool {
        matches!(self, RemapMask::Noremap | RemapMask::AbbrOnly)
    }
}

/// How an inserted byte string may be remapped afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemapPolicy {
    /// All new bytes are mappable.
    All,
    /// No new byte is mappable.
    None,
    /// New bytes match script-local mappings only.
    Script,
    /// The first byte must not be remapped but may abbreviate; used when a
    /// mapping RHS starts with its own LHS.
    Skip,
    /// The first `n` bytes are not mappable, the rest are.
    FirstN(usize),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeaheadError {
    #[error("typeahead buffer overflow; pending keys discarded")]
    Overflow,
}

/// What [`Typeahead::flush`] discards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Everything, typed input included.
    Input,
    /// Only the mapped prefix; typed bytes stay.
    Minimal,
}

#[derive(Debug)]
pub struct Typeahead {
    buf: Vec<u8>,
    mask: Vec<RemapMask>,
    off: usize,
    len: usize,
    maplen: usize,
    silent: usize,
    no_abbr: usize,
    change_cnt: u32,
}

impl Default for Typeahead {
    fn default() -> Self {
        Self::new()
    }
}

impl Typeahead {
    pub fn new() -> Self {
        let mut t = Typeahead {
            buf: vec![0; INIT_LEN],
            mask: vec![RemapMask::Remap; INIT_LEN],
            off: MARGIN,
            len: 0,
            maplen: 0,
            silent: 0,
            no_abbr: 0,
            change_cnt: 1,
        };
        t.buf[t.off] = 0;
        t
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Length of the mapped (not typed) prefix.
    pub fn maplen(&self) -> usize {
        self.maplen
    }

    /// Length of the `<silent>` prefix.
    pub fn silent_len(&self) -> usize {
        self.silent
    }

    /// Length of the no-abbreviation prefix.
    pub fn no_abbr(&self) -> usize {
        self.no_abbr
    }

    /// Keep at least `n` front bytes out of abbreviation matching,
    /// clamped so the counter never exceeds the buffer length.
    pub fn set_no_abbr_min(&mut self, n: usize) {
        self.no_abbr = self.no_abbr.max(n).min(self.len);
    }

    /// Structural-change tag; increments on every mutation and never
    /// returns to a previously observed value within a session.
    pub fn change_cnt(&self) -> u32 {
        self.change_cnt
    }

    /// Force a structural-change tick without mutating contents; used
    /// when the buffer is swapped wholesale so cached indices die.
    pub fn touch(&mut self, floor: u32) {
        self.change_cnt = self.change_cnt.max(floor);
        self.bump_change();
    }

    /// Byte at logical position `i` (0 is the front).
    pub fn byte(&self, i: usize) -> u8 {
        debug_assert!(i < self.len);
        self.buf[self.off + i]
    }

    /// Remap mask at logical position `i`.
    pub fn mask(&self, i: usize) -> RemapMask {
        debug_assert!(i < self.len);
        self.mask[self.off + i]
    }

    /// The valid bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.buf[self.off..self.off + self.len]
    }

    /// The valid remap masks, parallel to [`Typeahead::bytes`].
    pub fn masks(&self) -> &[RemapMask] {
        &self.mask[self.off..self.off + self.len]
    }

    fn bump_change(&mut self) {
        self.change_cnt = self.change_cnt.checked_add(1).unwrap_or(1);
    }

    /// Insert `bytes` at logical position `offset`.
    ///
    /// `nottyped` extends the mapped prefix by the insert length; `silent`
    /// extends the silent prefix. On overflow nothing is written.
    pub fn insert(
        &mut self,
        offset: usize,
        bytes: &[u8],
        policy: RemapPolicy,
        nottyped: bool,
        silent: bool,
    ) -> Result<(), TypeaheadError> {
        debug_assert!(offset <= self.len);
        self.bump_change();
        let addlen = bytes.len();
        if addlen == 0 {
            return Ok(());
        }

        if offset == 0 && addlen <= self.off {
            // Room in front: move the offset back.
            self.off -= addlen;
            self.buf[self.off..self.off + addlen].copy_from_slice(bytes);
        } else if self.len == 0 && self.buf.len() >= addlen + 3 * MARGIN {
            // Empty buffer: centre the string to leave space on both sides.
            self.off = (self.buf.len() - addlen - 3 * MARGIN) / 2;
            self.buf[self.off..self.off + addlen].copy_from_slice(bytes);
        } else {
            // Reallocate with headroom on both sides.
            if self.len.saturating_add(addlen) > MAX_LEN {
                trace!(target: "input.typeahead", len = self.len, add = addlen, "overflow");
                return Err(TypeaheadError::Overflow);
            }
            let newoff = MARGIN;
            let newlen = self.len + addlen + newoff + 4 * MARGIN;
            let mut buf = vec![0u8; newlen];
            let mut mask = vec![RemapMask::Remap; newlen];

            buf[newoff..newoff + offset]
                .copy_from_slice(&self.buf[self.off..self.off + offset]);
            buf[newoff + offset..newoff + offset + addlen].copy_from_slice(bytes);
            buf[newoff + offset + addlen..newoff + self.len + addlen]
                .copy_from_slice(&self.buf[self.off + offset..self.off + self.len]);

            mask[newoff..newoff + offset]
                .copy_from_slice(&self.mask[self.off..self.off + offset]);
            mask[newoff + offset + addlen..newoff + self.len + addlen]
                .copy_from_slice(&self.mask[self.off + offset..self.off + self.len]);

            self.buf = buf;
            self.mask = mask;
            self.off = newoff;
        }
        self.len += addlen;
        self.buf[self.off + self.len] = 0;

        // Mask for the inserted range.
        let (val, nrm) = match policy {
            RemapPolicy::All => (RemapMask::Remap, 0),
            RemapPolicy::None => (RemapMask::Noremap, addlen),
            RemapPolicy::Script => (RemapMask::ScriptOnly, addlen),
            RemapPolicy::Skip => (RemapMask::AbbrOnly, 1),
            RemapPolicy::FirstN(n) => (RemapMask::Noremap, n.min(addlen)),
        };
        for i in 0..addlen {
            self.mask[self.off + offset + i] =
                if i < nrm { val } else { RemapMask::Remap };
        }

        // The prefix counters assume mapped/silent bytes sit contiguously
        // at the front; an insert inside such a prefix extends it.
        if nottyped || self.maplen > offset {
            self.maplen += addlen;
        }
        if silent || self.silent > offset {
            self.silent += addlen;
        }
        if self.no_abbr > 0 && offset == 0 {
            self.no_abbr += addlen;
        }
        trace!(
            target: "input.typeahead",
            add = addlen,
            offset,
            len = self.len,
            maplen = self.maplen,
            "insert"
        );
        Ok(())
    }

    /// Remove `len` bytes at logical position `offset`.
    pub fn delete(&mut self, offset: usize, len: usize) {
        if len == 0 {
            return;
        }
        debug_assert!(offset + len <= self.len);
        self.bump_change();
        self.len -= len;

        if offset == 0 && self.buf.len() - (self.off + len) >= 3 * MAXMAPLEN + 3 {
            // Plenty of room left after the front: just advance.
            self.off += len;
        } else {
            let from = self.off + offset;
            if self.off > MAXMAPLEN {
                // Slide the head back toward the margin so future appends
                // keep their room at the end.
                self.buf.copy_within(self.off..from, MAXMAPLEN);
                self.mask.copy_within(self.off..from, MAXMAPLEN);
                self.off = MAXMAPLEN;
            }
            let from = self.off + offset;
            self.buf
                .copy_within(from + len..from + len + (self.len - offset) + 1, from);
            self.mask
                .copy_within(from + len..from + len + (self.len - offset), from);
        }
        self.buf[self.off + self.len] = 0;

        for counter in [&mut self.maplen, &mut self.silent, &mut self.no_abbr] {
            if *counter > offset {
                *counter = if *counter < offset + len {
                    offset
                } else {
                    *counter - len
                };
            }
        }
        trace!(
            target: "input.typeahead",
            del = len,
            offset,
            len = self.len,
            maplen = self.maplen,
            "delete"
        );
    }

    /// Append typed bytes at the end; they are fully mappable and do not
    /// extend any prefix counter.
    pub fn push_typed(&mut self, bytes: &[u8]) -> Result<(), TypeaheadError> {
        self.insert(self.len, bytes, RemapPolicy::All, false, false)
    }

    /// Discard buffered bytes.
    pub fn flush(&mut self, mode: FlushMode) {
        match mode {
            FlushMode::Input => {
                self.bump_change();
                self.off = MARGIN.min(self.buf.len() - 1);
                self.len = 0;
                self.maplen = 0;
                self.silent = 0;
                self.no_abbr = 0;
                self.buf[self.off] = 0;
            }
            FlushMode::Minimal => {
                let mapped = self.maplen;
                self.delete(0, mapped);
            }
        }
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        assert_eq!(self.buf[self.off + self.len], 0);
        assert!(self.maplen <= self.len);
        assert!(self.silent <= self.len);
        assert!(self.no_abbr <= self.len);
    }
}
