//! Chain of byte blocks with amortized O(1) append and a front read cursor.
//!
//! The chain structure (rather than one resizable ring) keeps previously
//! appended bytes at stable positions while a reader is draining the front,
//! which the recording sink depends on: `start_read` forces the next append
//! into a fresh block so a read in progress never races a write into the
//! same block.

use core_keycode::{Key, ModMask, encode_key};
use std::collections::VecDeque;

/// Smallest allocation for a block; short appends share blocks.
const MIN_BLOCK: usize = 20;

#[derive(Debug, Clone, Default)]
struct Block {
    bytes: Vec<u8>,
}

/// A byte buffer made of chained blocks.
///
/// Reading is destructive: `read(true)` consumes from the front and frees
/// exhausted blocks. Appending goes to the tail, reusing spare capacity
/// unless a read has been started since the last append.
#[derive(Debug, Default)]
pub struct BlockChain {
    blocks: VecDeque<Block>,
    /// Read position within the front block.
    read_at: usize,
    /// Set by `start_read`; the next append must open a new block.
    sealed: bool,
}

impl BlockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total unread bytes.
    pub fn len(&self) -> usize {
        let total: usize = self.blocks.iter().map(|b| b.bytes.len()).sum();
        total - self.read_at
    }

    /// Append raw (already escaped) bytes.
    pub fn append(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let reuse = !self.sealed
            && self
                .blocks
                .back()
                .is_some_and(|b| b.bytes.capacity() - b.bytes.len() >= bytes.len());
        if reuse {
            self.blocks
                .back_mut()
                .expect("reuse implies a tail block")
                .bytes
                .extend_from_slice(bytes);
        } else {
            let mut block = Block {
                bytes: Vec::with_capacity(MIN_BLOCK.max(bytes.len())),
            };
            block.bytes.extend_from_slice(bytes);
            self.blocks.push_back(block);
            self.sealed = false;
        }
    }

    /// Append one character, escaped through the key codec.
    pub fn append_char(&mut self, ch: char) {
        self.append_key(Key::Char(ch), ModMask::empty());
    }

    /// Append one key (special keys and modifiers become escape triples).
    pub fn append_key(&mut self, key: Key, mods: ModMask) {
        let mut buf = Vec::with_capacity(8);
        encode_key(key, mods, &mut buf);
        self.append(&buf);
    }

    /// Append the decimal rendition of `n`.
    pub fn append_num(&mut self, n: i64) {
        self.append(n.to_string().as_bytes());
    }

    /// Mark the start of a read pass: later appends open a fresh block so
    /// they cannot disturb the block the cursor is in.
    pub fn start_read(&mut self) {
        self.sealed = true;
    }

    /// Return the byte at the read cursor, or `None` when the chain is
    /// empty. With `advance` the cursor moves and exhausted blocks are
    /// freed.
    pub fn read(&mut self, advance: bool) -> Option<u8> {
        let front = self.blocks.front()?;
        let byte = front.bytes[self.read_at];
        if advance {
            self.read_at += 1;
            if self.read_at >= front.bytes.len() {
                self.blocks.pop_front();
                self.read_at = 0;
                if self.blocks.is_empty() {
                    self.sealed = false;
                }
            }
        }
        Some(byte)
    }

    /// Drop the last `n` appended bytes. Callers only delete bytes they
    /// just appended and have not read.
    pub fn delete_tail(&mut self, n: usize) {
        let mut todo = n;
        while todo > 0 {
            let only_block = self.blocks.len() == 1;
            let read_at = self.read_at;
            let Some(tail) = self.blocks.back_mut() else {
                return;
            };
            let avail = if only_block {
                tail.bytes.len() - read_at
            } else {
                tail.bytes.len()
            };
            let cut = todo.min(avail);
            let keep = tail.bytes.len() - cut;
            tail.bytes.truncate(keep);
            todo -= cut;
            if tail.bytes.is_empty() {
                self.blocks.pop_back();
                if self.blocks.is_empty() {
                    self.read_at = 0;
                    self.sealed = false;
                }
            }
            if cut == 0 {
                return;
            }
        }
    }

    /// Concatenate the unread contents into one byte string, leaving the
    /// chain untouched.
    pub fn concat(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        for (i, block) in self.blocks.iter().enumerate() {
            let from = if i == 0 { self.read_at } else { 0 };
            out.extend_from_slice(&block.bytes[from..]);
        }
        out
    }

    /// Iterate the unread bytes without consuming them.
    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(i, b)| b.bytes[if i == 0 { self.read_at } else { 0 }..].iter().copied())
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.read_at = 0;
        self.sealed = false;
    }

    /// Move the contents out, leaving this chain empty.
    pub fn take(&mut self) -> BlockChain {
        std::mem::take(self)
    }

    /// Deep copy of the unread contents as a fresh chain.
    pub fn duplicate(&self) -> BlockChain {
        let mut copy = BlockChain::new();
        copy.append(&self.concat());
        copy
    }
}
