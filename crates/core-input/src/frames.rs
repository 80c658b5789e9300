//! Whole-pipeline snapshots for nested invocations.
//!
//! A synthetic command sequence, a sourced script or an event handler that
//! replays keys must not see — or damage — the keys the user already has
//! in flight. Saving moves every buffer out into a frame and leaves fresh
//! ones behind; restoring is the exact reverse. Frames nest and must
//! balance.

use crate::redo::RedoFrame;
use crate::PutBack;
use core_typeahead::{BlockChain, Typeahead};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Snapshot of every input buffer, produced by `save_input_state`.
#[derive(Debug)]
pub struct InputFrame {
    pub(crate) typeahead: Typeahead,
    pub(crate) stuff: BlockChain,
    pub(crate) redo_replay: BlockChain,
    pub(crate) redo: RedoFrame,
    pub(crate) putback: Option<PutBack>,
    pub(crate) recording: Option<char>,
    pub(crate) record: BlockChain,
    pub(crate) last_recorded: usize,
}

/// The byte streams a script frame parks while its file is being read.
#[derive(Debug)]
pub(crate) struct StreamSave {
    pub(crate) typeahead: Typeahead,
    pub(crate) stuff: BlockChain,
    pub(crate) redo_replay: BlockChain,
    pub(crate) putback: Option<PutBack>,
}

pub(crate) struct ScriptFrame {
    reader: BufReader<File>,
    path: PathBuf,
    pub(crate) saved: StreamSave,
}

impl std::fmt::Debug for ScriptFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptFrame")
            .field("path", &self.path)
            .finish()
    }
}

/// Nested script sources; index grows with nesting depth.
#[derive(Debug, Default)]
pub(crate) struct ScriptStack {
    frames: Vec<ScriptFrame>,
}

/// Nesting allowed before `open` refuses.
pub const MAX_SCRIPT_DEPTH: usize = 15;

impl ScriptStack {
    pub(crate) fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn has_room(&self) -> bool {
        self.frames.len() < MAX_SCRIPT_DEPTH
    }

    pub(crate) fn push(&mut self, path: &Path, file: File, saved: StreamSave) {
        debug!(target: "input.script", path = %path.display(), depth = self.frames.len(), "script opened");
        self.frames.push(ScriptFrame {
            reader: BufReader::new(file),
            path: path.to_path_buf(),
            saved,
        });
    }

    pub(crate) fn pop(&mut self) -> Option<ScriptFrame> {
        let frame = self.frames.pop();
        if let Some(f) = &frame {
            debug!(target: "input.script", path = %f.path.display(), "script closed");
        }
        frame
    }

    /// Read a chunk from the innermost script. Zero means end of file.
    pub(crate) fn read_some(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(0);
        };
        match frame.reader.read(buf) {
            Ok(n) => Ok(n),
            Err(e) => {
                warn!(target: "input.script", path = %frame.path.display(), error = %e, "script read failed");
                Err(e)
            }
        }
    }
}
