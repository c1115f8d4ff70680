//! Minimal line-based text buffer for the editor pane.

use crate::orchestrator::Editor;

const TAB: &str = "\t";

pub struct TextBuffer {
    lines: Vec<String>,
    row: usize,
    /// Cursor column in chars, not bytes.
    col: usize,
}

fn byte_idx(line: &str, col: usize) -> usize {
    line.char_indices()
        .nth(col)
        .map(|(i, _)| i)
        .unwrap_or(line.len())
}

fn char_len(line: &str) -> usize {
    line.chars().count()
}

impl TextBuffer {
    pub fn new(text: &str) -> Self {
        let mut buf = Self {
            lines: vec![String::new()],
            row: 0,
            col: 0,
        };
        buf.set_text(text);
        buf.row = 0;
        buf.col = 0;
        buf
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn cursor(&self) -> (usize, usize) {
        (self.row, self.col)
    }

    /// First line to draw so the cursor stays inside a pane of `height` rows.
    pub fn scroll_top(&self, height: usize) -> usize {
        let height = height.max(1);
        (self.row + 1).saturating_sub(height)
    }

    fn clamp_col(&mut self) {
        self.col = self.col.min(char_len(&self.lines[self.row]));
    }

    pub fn insert_char(&mut self, c: char) {
        let line = &mut self.lines[self.row];
        let at = byte_idx(line, self.col);
        line.insert(at, c);
        self.col += 1;
    }

    pub fn insert_tab(&mut self) {
        let line = &mut self.lines[self.row];
        let at = byte_idx(line, self.col);
        line.insert_str(at, TAB);
        self.col += char_len(TAB);
    }

    pub fn insert_newline(&mut self) {
        let line = &mut self.lines[self.row];
        let at = byte_idx(line, self.col);
        let rest = line.split_off(at);
        self.lines.insert(self.row + 1, rest);
        self.row += 1;
        self.col = 0;
    }

    pub fn backspace(&mut self) {
        if self.col > 0 {
            let line = &mut self.lines[self.row];
            let at = byte_idx(line, self.col - 1);
            line.remove(at);
            self.col -= 1;
        } else if self.row > 0 {
            let line = self.lines.remove(self.row);
            self.row -= 1;
            self.col = char_len(&self.lines[self.row]);
            self.lines[self.row].push_str(&line);
        }
    }

    pub fn delete(&mut self) {
        let len = char_len(&self.lines[self.row]);
        if self.col < len {
            let line = &mut self.lines[self.row];
            let at = byte_idx(line, self.col);
            line.remove(at);
        } else if self.row + 1 < self.lines.len() {
            let next = self.lines.remove(self.row + 1);
            self.lines[self.row].push_str(&next);
        }
    }

    pub fn move_left(&mut self) {
        if self.col > 0 {
            self.col -= 1;
        } else if self.row > 0 {
            self.row -= 1;
            self.col = char_len(&self.lines[self.row]);
        }
    }

    pub fn move_right(&mut self) {
        if self.col < char_len(&self.lines[self.row]) {
            self.col += 1;
        } else if self.row + 1 < self.lines.len() {
            self.row += 1;
            self.col = 0;
        }
    }

    pub fn move_up(&mut self) {
        if self.row > 0 {
            self.row -= 1;
            self.clamp_col();
        }
    }

    pub fn move_down(&mut self) {
        if self.row + 1 < self.lines.len() {
            self.row += 1;
            self.clamp_col();
        }
    }

    pub fn home(&mut self) {
        self.col = 0;
    }

    pub fn end(&mut self) {
        self.col = char_len(&self.lines[self.row]);
    }
}

impl Editor for TextBuffer {
    fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Replace the whole buffer, keeping the cursor as close to where it was as the new text allows.
    fn set_text(&mut self, text: &str) {
        self.lines = text.split('\n').map(str::to_string).collect();
        self.row = self.row.min(self.lines.len() - 1);
        self.clamp_col();
    }
}
