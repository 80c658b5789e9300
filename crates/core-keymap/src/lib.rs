//! core-keymap: user-defined key mappings.
//!
//! A [`MapTable`] hashes entries by the first LHS byte into 256 buckets, so
//! candidate lookup for the engine is a single indexed scan. Mode coverage
//! is a bitmask per entry; defining a mapping strips its modes from any
//! existing entry with the same LHS before inserting, which is what makes
//! redefinition-by-mode work.
//!
//! Entries are handed out as `Rc` clones. The mapping engine snapshots the
//! entry it selected before evaluating an `<expr>` RHS, so a callback that
//! removes or redefines the very mapping being expanded cannot invalidate
//! the expansion in progress.

use bitflags::bitflags;
use smallvec::SmallVec;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, trace};

mod langmap;

pub use langmap::LangMap;

bitflags! {
    /// Which editor modes an entry applies to.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct ModeMask: u16 {
        const NORMAL     = 1;
        const VISUAL     = 2;
        const SELECT     = 4;
        const OP_PENDING = 8;
        const INSERT     = 16;
        const CMDLINE    = 32;
        const TERMINAL   = 64;
        /// Language mappings: applied to typed keys only, recorded after
        /// expansion instead of before.
        const LANGMAP    = 128;
    }
}

bitflags! {
    /// Per-entry behavior flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct MapFlags: u8 {
        /// RHS is not itself subject to mapping.
        const NOREMAP = 1;
        /// Expansion does not echo or show in pending-command displays.
        const SILENT  = 2;
        /// RHS is an expression evaluated at expansion time.
        const EXPR    = 4;
        /// A full match fires immediately, never waiting for longer ones.
        const NOWAIT  = 8;
        /// Script-local: the only entries that match `ScriptOnly` bytes.
        const SCRIPT  = 16;
        /// RHS is an embedded command-line fragment.
        const CMD     = 32;
    }
}

/// Result of evaluating an `<expr>` RHS callback.
///
/// `Ok` with an empty byte string means the expression produced nothing
/// and emitted no error; the engine substitutes an `<Ignore>` key so the
/// screen still gets a redraw pass.
pub type ExprResult = Result<Vec<u8>, ExprError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ExprError(pub String);

/// Right-hand side of a mapping.
#[derive(Clone)]
pub enum MapRhs {
    /// Byte string in the wire protocol, inserted into typeahead verbatim.
    Keys(Vec<u8>),
    /// Host expression; called once per expansion.
    Expr(Rc<dyn Fn() -> ExprResult>),
}

impl fmt::Debug for MapRhs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapRhs::Keys(k) => f.debug_tuple("Keys").field(k).finish(),
            MapRhs::Expr(_) => f.write_str("Expr(..)"),
        }
    }
}

/// One mapping entry.
#[derive(Debug)]
pub struct Mapping {
    /// LHS in the wire protocol (special keys escaped).
    pub lhs: Vec<u8>,
    /// Alternate LHS for key-code aliases (`<Tab>` vs `<C-I>`); a match
    /// against either form selects this entry.
    pub lhs_alt: Option<Vec<u8>>,
    pub rhs: MapRhs,
    pub modes: ModeMask,
    pub flags: MapFlags,
}

impl Mapping {
    pub fn is_noremap(&self) -> bool {
        self.flags.contains(MapFlags::NOREMAP)
    }

    pub fn is_script(&self) -> bool {
        self.flags.contains(MapFlags::SCRIPT)
    }

    pub fn nowait(&self) -> bool {
        self.flags.contains(MapFlags::NOWAIT)
    }
}

const BUCKETS: usize = 256;

/// Mapping entries hashed by first LHS byte.
pub struct MapTable {
    buckets: Vec<Vec<Rc<Mapping>>>,
}

impl Default for MapTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MapTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapTable").field("len", &self.len()).finish()
    }
}

impl MapTable {
    pub fn new() -> Self {
        MapTable {
            buckets: (0..BUCKETS).map(|_| Vec::new()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(Vec::is_empty)
    }

    /// Narrow every entry with this exact LHS by `modes`, dropping
    /// entries left covering nothing. Scans all buckets so the alternate
    /// form of an aliased entry stays consistent with the primary.
    fn strip(&mut self, lhs: &[u8], modes: ModeMask) -> bool {
        let mut hit = false;
        for bucket in &mut self.buckets {
            for entry in bucket.iter_mut() {
                if entry.lhs == lhs && entry.modes.intersects(modes) {
                    hit = true;
                    *entry = Rc::new(Mapping {
                        lhs: entry.lhs.clone(),
                        lhs_alt: entry.lhs_alt.clone(),
                        rhs: entry.rhs.clone(),
                        modes: entry.modes - modes,
                        flags: entry.flags,
                    });
                }
            }
            bucket.retain(|e| !e.modes.is_empty());
        }
        hit
    }

    /// Define a mapping. Any existing entry with an identical LHS loses
    /// the overlapping modes; entries left covering no mode are removed.
    /// An entry with an alternate LHS is reachable from both first bytes.
    pub fn define(&mut self, mapping: Mapping) {
        debug_assert!(!mapping.lhs.is_empty());
        self.strip(&mapping.lhs, mapping.modes);
        debug!(
            target: "input.map",
            lhs_len = mapping.lhs.len(),
            modes = ?mapping.modes,
            flags = ?mapping.flags,
            "define_mapping"
        );
        let first = mapping.lhs[0];
        let alt_first = mapping
            .lhs_alt
            .as_ref()
            .and_then(|a| a.first().copied())
            .filter(|&b| b != first);
        let entry = Rc::new(mapping);
        if let Some(b) = alt_first {
            self.buckets[b as usize].insert(0, entry.clone());
        }
        self.buckets[first as usize].insert(0, entry);
    }

    /// Remove the entry with this exact LHS for the given modes.
    /// Returns true when something was removed or narrowed.
    pub fn remove(&mut self, lhs: &[u8], modes: ModeMask) -> bool {
        if lhs.is_empty() {
            return false;
        }
        self.strip(lhs, modes)
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
    }

    /// Entries whose LHS starts with `first` and that cover `mode`.
    pub fn candidates(&self, mode: ModeMask, first: u8) -> impl Iterator<Item = &Rc<Mapping>> {
        self.buckets[first as usize]
            .iter()
            .filter(move |e| e.modes.intersects(mode))
    }
}

/// The pair of tables the engine consults: buffer-local entries shadow
/// global ones of the same LHS by coming first in candidate order.
#[derive(Debug, Default)]
pub struct MapStore {
    pub global: MapTable,
    pub local: MapTable,
}

impl MapStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Candidate entries for `first` in `mode`, buffer-local first. The
    /// snapshot is owned so the caller may mutate the store (for example
    /// from an `<expr>` callback) while holding it.
    pub fn candidates(&self, mode: ModeMask, first: u8) -> SmallVec<[Rc<Mapping>; 8]> {
        let mut out: SmallVec<[Rc<Mapping>; 8]> = SmallVec::new();
        out.extend(self.local.candidates(mode, first).cloned());
        out.extend(self.global.candidates(mode, first).cloned());
        trace!(target: "input.map", first, n = out.len(), "candidates");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn keys(lhs: &[u8], rhs: &[u8], modes: ModeMask) -> Mapping {
        Mapping {
            lhs: lhs.to_vec(),
            lhs_alt: None,
            rhs: MapRhs::Keys(rhs.to_vec()),
            modes,
            flags: MapFlags::empty(),
        }
    }

    #[test]
    fn define_then_lookup() {
        let mut table = MapTable::new();
        table.define(keys(b"jk", b"\x1b", ModeMask::INSERT));
        let found: Vec<_> = table.candidates(ModeMask::INSERT, b'j').collect();
        assert_eq!(found.len(), 1);
        assert!(
            table
                .candidates(ModeMask::NORMAL, b'j')
                .next()
                .is_none()
        );
    }

    #[test]
    fn redefine_replaces_overlapping_modes_only() {
        let mut table = MapTable::new();
        table.define(keys(b"x", b"old", ModeMask::NORMAL | ModeMask::VISUAL));
        table.define(keys(b"x", b"new", ModeMask::NORMAL));

        let normal: Vec<_> = table.candidates(ModeMask::NORMAL, b'x').collect();
        assert_eq!(normal.len(), 1);
        match &normal[0].rhs {
            MapRhs::Keys(k) => assert_eq!(k, b"new"),
            other => panic!("unexpected rhs {other:?}"),
        }

        let visual: Vec<_> = table.candidates(ModeMask::VISUAL, b'x').collect();
        assert_eq!(visual.len(), 1);
        match &visual[0].rhs {
            MapRhs::Keys(k) => assert_eq!(k, b"old"),
            other => panic!("unexpected rhs {other:?}"),
        }
    }

    #[test]
    fn remove_narrows_modes() {
        let mut table = MapTable::new();
        table.define(keys(b"q", b"r", ModeMask::NORMAL | ModeMask::INSERT));
        assert!(table.remove(b"q", ModeMask::INSERT));
        assert!(table.candidates(ModeMask::INSERT, b'q').next().is_none());
        assert!(table.candidates(ModeMask::NORMAL, b'q').next().is_some());
        assert!(table.remove(b"q", ModeMask::NORMAL));
        assert!(table.is_empty());
        assert!(!table.remove(b"q", ModeMask::NORMAL));
    }

    #[test]
    fn store_orders_local_before_global() {
        let mut store = MapStore::new();
        store.global.define(keys(b"d", b"G", ModeMask::NORMAL));
        store.local.define(keys(b"d", b"L", ModeMask::NORMAL));
        let found = store.candidates(ModeMask::NORMAL, b'd');
        assert_eq!(found.len(), 2);
        match &found[0].rhs {
            MapRhs::Keys(k) => assert_eq!(k, b"L"),
            other => panic!("unexpected rhs {other:?}"),
        }
    }
}
