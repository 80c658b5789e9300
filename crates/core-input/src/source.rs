//! Byte sources feeding the input pipeline.
//!
//! The pipeline pulls bytes through the [`UserInput`] trait; the terminal
//! implementation translates crossterm events into the wire protocol, and
//! [`FeedInput`] drives tests and batch runs deterministically.
//!
//! Producers on other threads never touch the typeahead directly: they
//! enqueue byte strings through a [`KeyInjector`], and the engine drains
//! the queue into the stuff buffer at its next pass.

use core_keycode::{Key, ModMask, SpecialKey, encode_key, encode_special};
use crossbeam_channel::{Receiver, Sender, unbounded};
use crossterm::event::{
    Event as CtEvent, KeyCode as CtKeyCode, KeyEvent as CtKeyEvent, KeyEventKind as CtKeyEventKind,
    KeyModifiers as CtKeyModifiers, MouseEventKind as CtMouseEventKind,
};
use std::collections::VecDeque;
use std::io;
use std::time::Duration;
use tracing::trace;

/// How long a read may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Block until at least one byte arrives.
    Forever,
    /// Block up to this many milliseconds.
    Millis(u64),
    /// Poll only.
    None,
}

impl From<Duration> for Wait {
    fn from(d: Duration) -> Self {
        Wait::Millis(d.as_millis().min(u128::from(u64::MAX)) as u64)
    }
}

/// The final fallback source: real user input.
///
/// `fill` appends whatever is available to `out`, blocking according to
/// `wait`, and returns the number of bytes added. Zero means the wait
/// expired (or, for non-interactive sources, that the stream is finished).
pub trait UserInput {
    fn fill(&mut self, wait: Wait, out: &mut Vec<u8>) -> io::Result<usize>;
}

/// A scripted source for tests and batch feeding.
///
/// Bytes pop off step by step; a [`FeedStep::Gap`] makes the next bounded
/// wait come back empty, which is how tests exercise timeout behavior.
/// An exhausted feed always returns zero bytes.
#[derive(Debug, Default)]
pub struct FeedInput {
    steps: VecDeque<FeedStep>,
}

#[derive(Debug)]
pub enum FeedStep {
    Bytes(Vec<u8>),
    /// One wait (of any kind) yields nothing.
    Gap,
}

impl FeedInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.steps.push_back(FeedStep::Bytes(bytes.to_vec()));
        self
    }

    pub fn push_key(&mut self, key: Key, mods: ModMask) -> &mut Self {
        let mut buf = Vec::new();
        encode_key(key, mods, &mut buf);
        self.steps.push_back(FeedStep::Bytes(buf));
        self
    }

    pub fn push_gap(&mut self) -> &mut Self {
        self.steps.push_back(FeedStep::Gap);
        self
    }
}

impl UserInput for FeedInput {
    fn fill(&mut self, _wait: Wait, out: &mut Vec<u8>) -> io::Result<usize> {
        match self.steps.pop_front() {
            Some(FeedStep::Bytes(b)) => {
                out.extend_from_slice(&b);
                Ok(b.len())
            }
            Some(FeedStep::Gap) | None => Ok(0),
        }
    }
}

/// Cloneable handle for injecting synthesized key bytes from outside the
/// input thread of control (timers, job callbacks). Injected bytes land in
/// the stuff buffer, never directly in typeahead.
#[derive(Debug, Clone)]
pub struct KeyInjector {
    tx: Sender<Vec<u8>>,
}

impl KeyInjector {
    pub fn send_bytes(&self, bytes: Vec<u8>) {
        // A closed channel means the core is gone; nothing left to do.
        let _ = self.tx.send(bytes);
    }

    pub fn send_key(&self, key: Key, mods: ModMask) {
        let mut buf = Vec::new();
        encode_key(key, mods, &mut buf);
        self.send_bytes(buf);
    }
}

pub(crate) fn injector_channel() -> (KeyInjector, Receiver<Vec<u8>>) {
    let (tx, rx) = unbounded();
    (KeyInjector { tx }, rx)
}

/// Live terminal input: crossterm events translated to protocol bytes.
#[derive(Debug, Default)]
pub struct TerminalInput {
    last_mouse: Option<(u16, u16)>,
}

impl TerminalInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grid position of the most recent mouse event.
    pub fn last_mouse(&self) -> Option<(u16, u16)> {
        self.last_mouse
    }

    fn encode_event(&mut self, event: CtEvent, out: &mut Vec<u8>) -> usize {
        let before = out.len();
        match event {
            CtEvent::Key(kev) => {
                if let Some((key, mods)) = translate_key_event(&kev) {
                    encode_key(key, mods, out);
                }
            }
            CtEvent::Mouse(mev) => {
                if let Some(key) = translate_mouse_kind(mev.kind) {
                    self.last_mouse = Some((mev.row, mev.column));
                    let mods = translate_mods(mev.modifiers);
                    encode_key(Key::Special(key), mods, out);
                }
            }
            CtEvent::Paste(text) => {
                encode_special(SpecialKey::PasteStart, out);
                for ch in text.chars() {
                    encode_key(Key::Char(ch), ModMask::empty(), out);
                }
                encode_special(SpecialKey::PasteEnd, out);
            }
            // Geometry and focus changes are not keys.
            CtEvent::Resize(..) | CtEvent::FocusGained | CtEvent::FocusLost => {}
        }
        out.len() - before
    }
}

impl UserInput for TerminalInput {
    fn fill(&mut self, wait: Wait, out: &mut Vec<u8>) -> io::Result<usize> {
        loop {
            let budget = match wait {
                Wait::None => Duration::ZERO,
                Wait::Millis(ms) => Duration::from_millis(ms),
                // Poll in slices so a caller-side interrupt flag gets a
                // chance between waits.
                Wait::Forever => Duration::from_millis(250),
            };
            if !crossterm::event::poll(budget)? {
                if matches!(wait, Wait::Forever) {
                    continue;
                }
                return Ok(0);
            }
            let n = self.encode_event(crossterm::event::read()?, out);
            if n > 0 || !matches!(wait, Wait::Forever) {
                trace!(target: "input.source", bytes = n, "terminal event");
                return Ok(n);
            }
        }
    }
}

fn translate_key_event(event: &CtKeyEvent) -> Option<(Key, ModMask)> {
    if matches!(event.kind, CtKeyEventKind::Release) {
        return None;
    }
    let mut mods = translate_mods(event.modifiers);
    let key = match event.code {
        CtKeyCode::Char(c) => {
            // The character already carries the shifted identity.
            mods.remove(ModMask::SHIFT);
            Key::Char(c)
        }
        CtKeyCode::Enter => Key::Char('\r'),
        CtKeyCode::Esc => Key::Char('\u{1b}'),
        CtKeyCode::Tab => Key::Char('\t'),
        CtKeyCode::BackTab => {
            mods.insert(ModMask::SHIFT);
            Key::Char('\t')
        }
        CtKeyCode::Backspace => Key::Special(SpecialKey::Backspace),
        CtKeyCode::Up => Key::Special(SpecialKey::Up),
        CtKeyCode::Down => Key::Special(SpecialKey::Down),
        CtKeyCode::Left => Key::Special(SpecialKey::Left),
        CtKeyCode::Right => Key::Special(SpecialKey::Right),
        CtKeyCode::Home => Key::Special(SpecialKey::Home),
        CtKeyCode::End => Key::Special(SpecialKey::End),
        CtKeyCode::PageUp => Key::Special(SpecialKey::PageUp),
        CtKeyCode::PageDown => Key::Special(SpecialKey::PageDown),
        CtKeyCode::Insert => Key::Special(SpecialKey::Insert),
        CtKeyCode::Delete => Key::Special(SpecialKey::Delete),
        CtKeyCode::F(n @ 1..=37) => Key::Special(SpecialKey::F(n)),
        _ => return None,
    };
    Some((key, mods))
}

fn translate_mods(mods: CtKeyModifiers) -> ModMask {
    let mut out = ModMask::empty();
    if mods.contains(CtKeyModifiers::SHIFT) {
        out |= ModMask::SHIFT;
    }
    if mods.contains(CtKeyModifiers::ALT) {
        out |= ModMask::ALT;
    }
    if mods.contains(CtKeyModifiers::CONTROL) {
        out |= ModMask::CTRL;
    }
    if mods.contains(CtKeyModifiers::META) {
        out |= ModMask::META;
    }
    if mods.contains(CtKeyModifiers::SUPER) {
        out |= ModMask::CMD;
    }
    out
}

fn translate_mouse_kind(kind: CtMouseEventKind) -> Option<SpecialKey> {
    use crossterm::event::MouseButton as B;
    Some(match kind {
        CtMouseEventKind::Down(B::Left) => SpecialKey::LeftMouse,
        CtMouseEventKind::Down(B::Middle) => SpecialKey::MiddleMouse,
        CtMouseEventKind::Down(B::Right) => SpecialKey::RightMouse,
        CtMouseEventKind::Drag(B::Left) => SpecialKey::LeftDrag,
        CtMouseEventKind::Drag(B::Middle) => SpecialKey::MiddleDrag,
        CtMouseEventKind::Drag(B::Right) => SpecialKey::RightDrag,
        CtMouseEventKind::Up(B::Left) => SpecialKey::LeftRelease,
        CtMouseEventKind::Up(B::Middle) => SpecialKey::MiddleRelease,
        CtMouseEventKind::Up(B::Right) => SpecialKey::RightRelease,
        CtMouseEventKind::Moved => SpecialKey::MouseMove,
        CtMouseEventKind::ScrollUp => SpecialKey::ScrollWheelUp,
        CtMouseEventKind::ScrollDown => SpecialKey::ScrollWheelDown,
        CtMouseEventKind::ScrollLeft => SpecialKey::ScrollWheelLeft,
        CtMouseEventKind::ScrollRight => SpecialKey::ScrollWheelRight,
    })
}
