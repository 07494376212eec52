use crate::locate::SourceSpan;
use ropey::Rope;
use std::borrow::Cow;

const UNDO_LIMIT: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct Buffer {
    rope: Rope,
    cursor_char: usize,
    preferred_col: Option<usize>,
    revision: u64,
    undo_stack: Vec<(Rope, usize)>,
    redo_stack: Vec<(Rope, usize)>,
}

impl Buffer {
    pub fn from_text(text: &str) -> Self {
        Self {
            rope: Rope::from_str(&normalize_line_endings(text)),
            ..Self::default()
        }
    }

    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn len_lines(&self) -> usize {
        self.rope.len_lines()
    }

    pub fn line(&self, idx: usize) -> Cow<'_, str> {
        if idx >= self.rope.len_lines() {
            return Cow::Borrowed("");
        }
        let len = line_len_chars(&self.rope, idx);
        let start = self.rope.line_to_char(idx);
        self.rope.slice(start..start + len).into()
    }

    pub fn cursor_line_col(&self) -> (usize, usize) {
        let line = self.rope.char_to_line(self.cursor_char);
        let line_start = self.rope.line_to_char(line);
        (line, self.cursor_char.saturating_sub(line_start))
    }

    pub fn set_cursor_line_col(&mut self, line: usize, col: usize) {
        let line = line.min(self.rope.len_lines().saturating_sub(1));
        let col = col.min(line_len_chars(&self.rope, line));
        self.cursor_char = self.rope.line_to_char(line) + col;
        self.preferred_col = None;
    }

    fn changed(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    fn snapshot(&mut self) {
        self.undo_stack.push((self.rope.clone(), self.cursor_char));
        if self.undo_stack.len() > UNDO_LIMIT {
            self.undo_stack.remove(0);
        }
        self.redo_stack.clear();
    }

    pub fn insert_char(&mut self, c: char) {
        self.snapshot();
        self.rope.insert_char(self.cursor_char, c);
        self.cursor_char += 1;
        self.preferred_col = None;
        self.changed();
    }

    pub fn insert_str(&mut self, text: &str) {
        let text = normalize_line_endings(text);
        if text.is_empty() {
            return;
        }
        self.snapshot();
        self.rope.insert(self.cursor_char, &text);
        self.cursor_char += text.chars().count();
        self.preferred_col = None;
        self.changed();
    }

    pub fn backspace(&mut self) {
        if self.cursor_char == 0 {
            return;
        }
        self.snapshot();
        let prev = self.cursor_char - 1;
        self.rope.remove(prev..self.cursor_char);
        self.cursor_char = prev;
        self.preferred_col = None;
        self.changed();
    }

    pub fn delete(&mut self) {
        if self.cursor_char >= self.rope.len_chars() {
            return;
        }
        self.snapshot();
        self.rope.remove(self.cursor_char..self.cursor_char + 1);
        self.preferred_col = None;
        self.changed();
    }

    pub fn insert_at_cursor(&mut self, text: &str) -> SourceSpan {
        let (line, col) = self.cursor_line_col();
        let needs_gap = col > 0 || line_len_chars(&self.rope, line) > 0;
        let prefix = if needs_gap { "\n\n" } else { "" };
        let insertion = format!("{prefix}{}\n\n", normalize_line_endings(text));

        self.snapshot();
        self.rope.insert(self.cursor_char, &insertion);
        self.cursor_char += insertion.chars().count();
        self.preferred_col = None;
        self.changed();

        let start_line = if needs_gap { line + 2 } else { line };
        SourceSpan::new(start_line, start_line + text.matches('\n').count())
    }

    /// Replace whole lines `span.start_line..=span.end_line` with `text`.
    ///
    /// Returns `None` without touching the buffer when the span is out of range.
    pub fn replace_span(&mut self, span: SourceSpan, text: &str) -> Option<SourceSpan> {
        if span.end_line < span.start_line || span.end_line >= self.rope.len_lines() {
            return None;
        }
        let text = normalize_line_endings(text);
        let start = self.rope.line_to_char(span.start_line);
        let end = self.rope.line_to_char(span.end_line) + line_len_chars(&self.rope, span.end_line);

        self.snapshot();
        self.rope.remove(start..end);
        self.rope.insert(start, &text);
        self.cursor_char = start + text.chars().count();
        self.preferred_col = None;
        self.changed();

        Some(SourceSpan::new(
            span.start_line,
            span.start_line + text.matches('\n').count(),
        ))
    }

    pub fn undo(&mut self) -> bool {
        let Some((prev, cursor)) = self.undo_stack.pop() else {
            return false;
        };
        self.redo_stack.push((self.rope.clone(), self.cursor_char));
        self.rope = prev;
        self.cursor_char = cursor.min(self.rope.len_chars());
        self.changed();
        true
    }

    pub fn redo(&mut self) -> bool {
        let Some((next, cursor)) = self.redo_stack.pop() else {
            return false;
        };
        self.undo_stack.push((self.rope.clone(), self.cursor_char));
        self.rope = next;
        self.cursor_char = cursor.min(self.rope.len_chars());
        self.changed();
        true
    }

    pub fn move_left(&mut self) {
        if self.cursor_char > 0 {
            self.cursor_char -= 1;
        }
        self.preferred_col = None;
    }

    pub fn move_right(&mut self) {
        if self.cursor_char < self.rope.len_chars() {
            self.cursor_char += 1;
        }
        self.preferred_col = None;
    }

    pub fn move_up(&mut self) {
        self.move_lines(-1);
    }

    pub fn move_down(&mut self) {
        self.move_lines(1);
    }

    pub fn move_lines(&mut self, delta: isize) {
        let (line, col) = self.cursor_line_col();
        let max_line = self.rope.len_lines().saturating_sub(1);
        let target_line = if delta.is_negative() {
            line.saturating_sub(delta.unsigned_abs())
        } else {
            (line + delta as usize).min(max_line)
        };
        let desired = self.preferred_col.unwrap_or(col);
        let target_col = desired.min(line_len_chars(&self.rope, target_line));
        self.cursor_char = self.rope.line_to_char(target_line) + target_col;
        self.preferred_col = Some(desired);
    }

    pub fn move_line_start(&mut self) {
        let (line, _) = self.cursor_line_col();
        self.cursor_char = self.rope.line_to_char(line);
        self.preferred_col = None;
    }

    pub fn move_line_end(&mut self) {
        let (line, _) = self.cursor_line_col();
        self.cursor_char = self.rope.line_to_char(line) + line_len_chars(&self.rope, line);
        self.preferred_col = None;
    }
}

fn line_len_chars(rope: &Rope, line: usize) -> usize {
    if line >= rope.len_lines() {
        return 0;
    }
    let slice = rope.line(line);
    let len = slice.len_chars();
    if len > 0 && slice.char(len - 1) == '\n' {
        len - 1
    } else {
        len
    }
}

pub fn normalize_line_endings(input: &str) -> Cow<'_, str> {
    if input.contains('\r') {
        Cow::Owned(input.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(input)
    }
}

#[cfg(test)]
mod tests {
    use super::{Buffer, normalize_line_endings};
    use crate::locate::SourceSpan;
    use std::borrow::Cow;

    #[test]
    fn insert_on_empty_line_adds_no_leading_gap() {
        let mut buf = Buffer::from_text("");
        let span = buf.insert_at_cursor("![a]({static}/images/a.png)");
        assert_eq!(buf.text(), "![a]({static}/images/a.png)\n\n");
        assert_eq!(span, SourceSpan::single(0));
    }

    #[test]
    fn insert_mid_line_separates_from_prose() {
        let mut buf = Buffer::from_text("hello world");
        buf.set_cursor_line_col(0, 5);
        let span = buf.insert_at_cursor("X");
        assert_eq!(buf.text(), "hello\n\nX\n\n world");
        assert_eq!(span, SourceSpan::single(2));
    }

    #[test]
    fn insert_at_start_of_non_empty_line_still_gets_gap() {
        let mut buf = Buffer::from_text("para\nnext");
        buf.set_cursor_line_col(1, 0);
        let span = buf.insert_at_cursor("A\nB");
        assert_eq!(buf.text(), "para\n\n\nA\nB\n\nnext");
        assert_eq!(span, SourceSpan::new(3, 4));
    }

    #[test]
    fn replace_span_swaps_whole_lines_once() {
        let mut buf = Buffer::from_text("a\n<div>\nx\n</div>\nb");
        let before = buf.revision();
        let span = buf.replace_span(SourceSpan::new(1, 3), "NEW").unwrap();
        assert_eq!(buf.text(), "a\nNEW\nb");
        assert_eq!(span, SourceSpan::single(1));
        assert_eq!(buf.revision(), before + 1);
    }

    #[test]
    fn replace_span_can_grow_a_line_into_a_block() {
        let mut buf = Buffer::from_text("a\nold\nb");
        let span = buf.replace_span(SourceSpan::single(1), "1\n2\n3").unwrap();
        assert_eq!(buf.text(), "a\n1\n2\n3\nb");
        assert_eq!(span, SourceSpan::new(1, 3));
    }

    #[test]
    fn replace_span_on_last_line_without_newline() {
        let mut buf = Buffer::from_text("a\nlast");
        buf.replace_span(SourceSpan::single(1), "z").unwrap();
        assert_eq!(buf.text(), "a\nz");
    }

    #[test]
    fn replace_span_out_of_range_is_rejected() {
        let mut buf = Buffer::from_text("a\nb");
        let before = buf.revision();
        assert!(buf.replace_span(SourceSpan::new(1, 5), "x").is_none());
        assert_eq!(buf.text(), "a\nb");
        assert_eq!(buf.revision(), before);
    }

    #[test]
    fn cursor_motion_keeps_preferred_column() {
        let mut buf = Buffer::from_text("abcdef\nab\nabcdef");
        buf.set_cursor_line_col(0, 5);
        buf.move_down();
        assert_eq!(buf.cursor_line_col(), (1, 2));
        buf.move_down();
        assert_eq!(buf.cursor_line_col(), (2, 5));
    }

    #[test]
    fn typing_and_deleting_bump_revision() {
        let mut buf = Buffer::from_text("");
        buf.insert_char('a');
        buf.insert_str("bc");
        buf.backspace();
        assert_eq!(buf.text(), "ab");
        assert_eq!(buf.revision(), 3);
        buf.move_line_start();
        buf.backspace();
        assert_eq!(buf.revision(), 3);
    }

    #[test]
    fn undo_and_redo_restore_text() {
        let mut buf = Buffer::from_text("x");
        buf.move_line_end();
        buf.insert_str("yz");
        assert!(buf.undo());
        assert_eq!(buf.text(), "x");
        assert!(buf.redo());
        assert_eq!(buf.text(), "xyz");
        assert!(!buf.redo());
    }

    #[test]
    fn line_excludes_newline() {
        let buf = Buffer::from_text("one\ntwo\n");
        assert_eq!(buf.line(0), "one");
        assert_eq!(buf.line(2), "");
        assert_eq!(buf.len_lines(), 3);
    }

    #[test]
    fn normalize_line_endings_converts_crlf_and_cr() {
        assert!(matches!(normalize_line_endings("a\nb"), Cow::Borrowed(_)));
        assert_eq!(normalize_line_endings("a\r\nb\rc"), "a\nb\nc");
    }
}
