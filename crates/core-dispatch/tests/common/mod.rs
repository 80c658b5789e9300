//! Shared test host: a tiny line-based document with just enough motion
//! and operator behavior to observe what the dispatcher assembled.

use core_dispatch::{
    Direction, EditorHost, MotionType, ObjectSpan, Operator, OperatorArg, Position,
};
use core_keycode::Key;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct MockHost {
    pub lines: Vec<String>,
    pub cursor: Position,
    pub applied: Vec<OperatorArg>,
    pub word_calls: Vec<(Direction, bool, bool, u32)>,
    pub inserts: Vec<(char, u32)>,
    pub joins: Vec<(u32, bool)>,
    pub pastes: Vec<(Option<char>, bool, u32)>,
    pub executed_cmdlines: Vec<String>,
    pub registers: HashMap<char, Vec<u8>>,
    pub beeps: u32,
    pub undos: u32,
    pub redos: u32,
}

impl MockHost {
    pub fn with_text(text: &str) -> Self {
        MockHost {
            lines: text.lines().map(String::from).collect(),
            ..MockHost::default()
        }
    }

    pub fn line(&self, n: usize) -> &str {
        &self.lines[n]
    }

    fn apply_text_change(&mut self, oap: &OperatorArg) {
        // Only the cases the tests observe textually.
        match (oap.op, oap.motion_type) {
            (Operator::Delete | Operator::Change, MotionType::CharWise)
                if oap.start.line == oap.end.line =>
            {
                let line = &mut self.lines[oap.start.line];
                let end = oap.end.col.min(line.len());
                if oap.start.col <= end {
                    line.replace_range(oap.start.col..end, "");
                }
                self.cursor = oap.start;
            }
            (Operator::Delete, MotionType::LineWise) => {
                let from = oap.start.line;
                let to = (oap.end.line + 1).min(self.lines.len());
                self.lines.drain(from..to);
                if self.lines.is_empty() {
                    self.lines.push(String::new());
                }
                self.cursor = Position::new(from.min(self.lines.len() - 1), 0);
            }
            _ => {}
        }
    }
}

impl EditorHost for MockHost {
    fn cursor(&self) -> Position {
        self.cursor
    }

    fn set_cursor(&mut self, pos: Position) {
        self.cursor = pos;
    }

    fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn line_len(&self, line: usize) -> usize {
        self.lines.get(line).map_or(0, String::len)
    }

    fn word_motion(
        &mut self,
        dir: Direction,
        big: bool,
        to_end: bool,
        count: u32,
    ) -> Option<Position> {
        self.word_calls.push((dir, big, to_end, count));
        let line = self.lines.get(self.cursor.line)?.clone();
        let mut col = self.cursor.col;
        for _ in 0..count {
            col = match dir {
                Direction::Forward => {
                    let rest = &line[col.min(line.len())..];
                    let in_word = rest.find(' ').map(|o| col + o)?;
                    let next = line[in_word..]
                        .find(|c: char| c != ' ')
                        .map(|o| in_word + o)?;
                    if to_end {
                        line[next..]
                            .find(' ')
                            .map(|o| next + o - 1)
                            .unwrap_or(line.len().saturating_sub(1))
                    } else {
                        next
                    }
                }
                Direction::Backward => {
                    let before = line[..col].trim_end_matches(' ');
                    before.rfind(' ').map(|o| o + 1).unwrap_or(0)
                }
            };
        }
        Some(Position::new(self.cursor.line, col))
    }

    fn find_char(
        &mut self,
        target: char,
        dir: Direction,
        before: bool,
        count: u32,
    ) -> Option<Position> {
        let line = self.lines.get(self.cursor.line)?;
        let mut col = self.cursor.col;
        for _ in 0..count {
            col = match dir {
                Direction::Forward => line[col + 1..].find(target).map(|o| col + 1 + o)?,
                Direction::Backward => line[..col].rfind(target)?,
            };
        }
        if before {
            col = match dir {
                Direction::Forward => col.checked_sub(1)?,
                Direction::Backward => col + 1,
            };
        }
        Some(Position::new(self.cursor.line, col))
    }

    fn text_object(&mut self, around: bool, object: char, _count: u32) -> Option<ObjectSpan> {
        if object != 'w' {
            return None;
        }
        let line = self.lines.get(self.cursor.line)?;
        let col = self.cursor.col.min(line.len().saturating_sub(1));
        let start = line[..col].rfind(' ').map(|o| o + 1).unwrap_or(0);
        let mut end = line[col..]
            .find(' ')
            .map(|o| col + o - 1)
            .unwrap_or(line.len().saturating_sub(1));
        if around {
            end = (end + 1).min(line.len().saturating_sub(1));
        }
        Some(ObjectSpan {
            start: Position::new(self.cursor.line, start),
            end: Position::new(self.cursor.line, end),
            motion_type: MotionType::CharWise,
            inclusive: true,
        })
    }

    fn apply_operator(&mut self, oap: &OperatorArg) -> bool {
        self.applied.push(oap.clone());
        self.apply_text_change(oap);
        true
    }

    fn enter_insert(&mut self, cmd: char, count: u32) {
        self.inserts.push((cmd, count));
    }

    fn join_lines(&mut self, count: u32, keep_spaces: bool) {
        self.joins.push((count, keep_spaces));
    }

    fn undo(&mut self) {
        self.undos += 1;
    }

    fn redo(&mut self) {
        self.redos += 1;
    }

    fn paste(&mut self, register: Option<char>, after: bool, count: u32) {
        self.pastes.push((register, after, count));
    }

    fn replace_char(&mut self, key: Key, count: u32) -> bool {
        let Key::Char(c) = key else { return false };
        let pos = self.cursor;
        let Some(line) = self.lines.get_mut(pos.line) else {
            return false;
        };
        let end = pos.col + count as usize;
        if end > line.len() {
            return false;
        }
        let replacement: String = std::iter::repeat_n(c, count as usize).collect();
        line.replace_range(pos.col..end, &replacement);
        true
    }

    fn execute_command_line(&mut self, fragment: &str) {
        self.executed_cmdlines.push(fragment.to_string());
    }

    fn set_register(&mut self, name: char, bytes: Vec<u8>) {
        self.registers.insert(name, bytes);
    }

    fn register_contents(&self, name: char) -> Option<Vec<u8>> {
        self.registers.get(&name).cloned()
    }

    fn beep(&mut self) {
        self.beeps += 1;
    }
}
