//! The byte-assembly sink observing every typed byte after mapping.
//!
//! Bytes arrive one at a time from the engine, but the observers (script
//! output, the on-key callback, the record buffer) must each see whole
//! logical keys: splitting an escape triple or a multi-byte character
//! across two flushes would make "un-record the last key" ill-defined.
//! The state machine therefore buffers until a key completes and flushes
//! the whole region in one call.

use core_keycode::{K_SPECIAL, KS_EXTRA, KS_MODIFIER, SpecialKey, utf8_len};
use core_typeahead::BlockChain;
use std::io::Write;
use tracing::{debug, trace};

#[derive(Default)]
pub(crate) struct Gather {
    /// Bytes of the key currently being assembled.
    buf: Vec<u8>,
    /// Last byte (second triple byte while inside an escape).
    prev: u8,
    /// Escape-triple bytes still expected.
    pending_special: u8,
    /// UTF-8 continuation bytes still expected.
    pending_mbyte: u8,
    /// Completed bytes awaiting the on-key observer.
    observed: Vec<u8>,
    /// Front bytes to withhold from the observer (synthesized keys).
    observe_ignore: usize,
    recording: Option<char>,
    record: BlockChain,
    /// Bytes recorded since `begin_key_read`; the stop keystroke is
    /// trimmed from a recording by exactly this much.
    last_recorded: usize,
    script_out: Option<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for Gather {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gather")
            .field("pending_special", &self.pending_special)
            .field("pending_mbyte", &self.pending_mbyte)
            .field("recording", &self.recording)
            .finish()
    }
}

impl Gather {
    /// Feed one byte; returns true when it completed a logical key.
    fn add_byte(&mut self, byte: u8) -> bool {
        self.buf.push(byte);
        let in_special = self.pending_special > 0;
        let in_mbyte = self.pending_mbyte > 0;

        if in_special {
            self.pending_special -= 1;
        } else if byte == K_SPECIAL {
            self.pending_special = 2;
        }
        if self.pending_special > 0 {
            self.prev = byte;
            return false;
        }

        if in_mbyte {
            self.pending_mbyte -= 1;
        } else if in_special {
            if self.prev == KS_MODIFIER {
                // A modifier triple completes together with the key it
                // modifies.
                self.prev = byte;
                return false;
            }
            // A completed non-modifier triple is a whole key.
        } else {
            self.pending_mbyte = (utf8_len(byte) - 1) as u8;
        }

        self.prev = byte;
        self.pending_mbyte == 0
    }

    /// Record typed bytes, flushing each completed key to every observer
    /// atomically.
    pub(crate) fn gotchars(&mut self, bytes: &[u8]) {
        for &b in bytes {
            if !self.add_byte(b) {
                continue;
            }
            trace!(target: "input.record", len = self.buf.len(), "key complete");

            if let Some(out) = &mut self.script_out {
                // A failing script sink only loses the capture.
                let _ = out.write_all(&self.buf);
            }

            if self.buf.len() > self.observe_ignore {
                let skip = self.observe_ignore;
                self.observed.extend_from_slice(&self.buf[skip..]);
                self.observe_ignore = 0;
            } else {
                self.observe_ignore -= self.buf.len();
            }

            if self.recording.is_some() {
                self.record.append(&self.buf);
                self.last_recorded += self.buf.len();
            }

            self.buf.clear();
        }
    }

    /// Record an `<Ignore>` key, hidden from the on-key observer.
    pub(crate) fn record_ignore(&mut self) {
        let triple = [K_SPECIAL, KS_EXTRA, SpecialKey::Ignore.code()];
        self.observe_ignore += triple.len();
        self.gotchars(&triple);
    }

    /// Extend the observer-ignore window over the next `n` bytes.
    pub(crate) fn add_observe_ignore(&mut self, n: usize) {
        self.observe_ignore += n;
    }

    /// Undo the recording of the last `len` bytes; used when a consumed
    /// key is pushed back into typeahead and will be recorded again.
    pub(crate) fn ungetchars(&mut self, len: usize) {
        if self.recording.is_some() {
            self.record.delete_tail(len);
            self.last_recorded = self.last_recorded.saturating_sub(len);
        }
    }

    /// Drop the tail of the observer buffer (rolled-back keys).
    pub(crate) fn shrink_observed(&mut self, len: usize) {
        let keep = self.observed.len().saturating_sub(len);
        self.observed.truncate(keep);
    }

    /// Take the bytes accumulated for the on-key observer.
    pub(crate) fn take_observed(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.observed)
    }

    /// Called at the start of each advancing key read so the trim window
    /// of `stop_recording` covers exactly the keys of that read.
    pub(crate) fn begin_key_read(&mut self) {
        self.last_recorded = 0;
    }

    pub(crate) fn recording(&self) -> Option<char> {
        self.recording
    }

    pub(crate) fn start_recording(&mut self, register: char) -> bool {
        if self.recording.is_some() {
            return false;
        }
        debug!(target: "input.record", register = %register, "recording started");
        self.recording = Some(register);
        self.record.clear();
        self.last_recorded = 0;
        true
    }

    /// Stop recording and return the capture, minus the keystroke that
    /// stopped it.
    pub(crate) fn stop_recording(&mut self) -> Option<(char, Vec<u8>)> {
        let register = self.recording.take()?;
        let mut bytes = self.record.concat();
        let keep = bytes.len().saturating_sub(self.last_recorded);
        bytes.truncate(keep);
        self.record.clear();
        self.last_recorded = 0;
        debug!(target: "input.record", register = %register, len = bytes.len(), "recording stopped");
        Some((register, bytes))
    }

    pub(crate) fn set_script_out(&mut self, sink: Option<Box<dyn Write + Send>>) {
        self.script_out = sink;
    }

    pub(crate) fn take_record_state(&mut self) -> (Option<char>, BlockChain, usize) {
        (
            self.recording.take(),
            self.record.take(),
            std::mem::replace(&mut self.last_recorded, 0),
        )
    }

    pub(crate) fn restore_record_state(
        &mut self,
        recording: Option<char>,
        record: BlockChain,
        last_recorded: usize,
    ) {
        self.recording = recording;
        self.record = record;
        self.last_recorded = last_recorded;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_keycode::{Key, ModMask, encode_key};
    use pretty_assertions::assert_eq;

    fn gather_with_recording() -> Gather {
        let mut g = Gather::default();
        g.start_recording('a');
        g
    }

    #[test]
    fn ascii_keys_flush_one_by_one() {
        let mut g = gather_with_recording();
        g.gotchars(b"ab");
        assert_eq!(g.take_observed(), b"ab");
        let (_, rec) = g.stop_recording().unwrap();
        assert_eq!(rec, b"ab");
    }

    #[test]
    fn modifier_triple_flushes_with_its_key() {
        let mut g = gather_with_recording();
        let mut key = Vec::new();
        encode_key(Key::Char('x'), ModMask::ALT, &mut key);
        assert_eq!(key.len(), 4);
        // Deliver byte by byte; nothing is observable until the key ends.
        for (i, &b) in key.iter().enumerate() {
            g.gotchars(&[b]);
            if i + 1 < key.len() {
                assert!(g.take_observed().is_empty(), "flushed early at byte {i}");
            }
        }
        assert_eq!(g.take_observed(), key);
    }

    #[test]
    fn multibyte_char_flushes_whole() {
        let mut g = gather_with_recording();
        let bytes = "é".as_bytes();
        g.gotchars(&bytes[..1]);
        assert!(g.take_observed().is_empty());
        g.gotchars(&bytes[1..]);
        assert_eq!(g.take_observed(), bytes);
    }

    #[test]
    fn escaped_special_byte_counts_as_one_key() {
        let mut g = gather_with_recording();
        g.gotchars(&[K_SPECIAL, KS_EXTRA, SpecialKey::Up.code()]);
        assert_eq!(g.take_observed().len(), 3);
    }

    #[test]
    fn stop_recording_trims_the_stop_key() {
        let mut g = gather_with_recording();
        g.gotchars(b"iab");
        g.begin_key_read();
        g.gotchars(b"q");
        let (reg, rec) = g.stop_recording().unwrap();
        assert_eq!(reg, 'a');
        assert_eq!(rec, b"iab");
    }

    #[test]
    fn ignore_key_is_recorded_but_not_observed() {
        let mut g = gather_with_recording();
        g.record_ignore();
        assert!(g.take_observed().is_empty());
        let (_, rec) = g.stop_recording().unwrap();
        assert_eq!(rec.len(), 3);
    }

    #[test]
    fn ungetchars_rolls_back_recording() {
        let mut g = gather_with_recording();
        g.gotchars(b"xy");
        g.ungetchars(1);
        let (_, rec) = g.stop_recording().unwrap();
        assert_eq!(rec, b"x");
    }

    #[test]
    fn script_sink_sees_completed_keys() {
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct Shared(Arc<Mutex<Vec<u8>>>);
        impl Write for Shared {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let sink = Shared::default();
        let mut g = Gather::default();
        g.set_script_out(Some(Box::new(sink.clone())));
        g.gotchars(b"ok");
        assert_eq!(*sink.0.lock().unwrap(), b"ok");
    }
}
