//! Language-map translation for keyboard layouts that type another script.
//!
//! The table rewrites single bytes before mapping lookup and before
//! second-character reads that are flagged for language adjustment. Bytes
//! inside escape triples are never translated; the engine skips them.

use core_keycode::K_SPECIAL;
use tracing::warn;

/// Byte-to-byte translation table.
#[derive(Debug, Clone)]
pub struct LangMap {
    table: [u8; 256],
}

impl Default for LangMap {
    fn default() -> Self {
        Self::identity()
    }
}

impl LangMap {
    /// The identity map: translation disabled.
    pub fn identity() -> Self {
        let mut table = [0u8; 256];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = i as u8;
        }
        LangMap { table }
    }

    pub fn from_pairs(pairs: &[(u8, u8)]) -> Self {
        let mut map = Self::identity();
        for &(from, to) in pairs {
            map.set(from, to);
        }
        map
    }

    pub fn set(&mut self, from: u8, to: u8) {
        if from == K_SPECIAL || to == K_SPECIAL {
            // 0x80 frames escape triples and may not be remapped into or
            // out of existence.
            warn!(target: "input.map", from, to, "langmap entry on escape byte ignored");
            return;
        }
        self.table[from as usize] = to;
    }

    pub fn translate(&self, byte: u8) -> u8 {
        self.table[byte as usize]
    }

    pub fn is_identity(&self) -> bool {
        self.table.iter().enumerate().all(|(i, &b)| i as u8 == b)
    }
}
