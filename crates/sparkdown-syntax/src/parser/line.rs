//! Per-line cursor used by the block parser.
//!
//! A [`Line`] is reset for every physical line. Container markup (block
//! quote `>`, choice markers) is consumed by moving the *base* forward, so
//! nested recognizers see the line as if the container markup were not
//! there.

use super::element::Element;

/// Columns a tab advances to.
const TAB_WIDTH: usize = 4;

/// The line currently being parsed.
#[derive(Debug, Default)]
pub struct Line {
    /// The line's text, without the trailing newline.
    pub text: String,
    /// Column of the base position.
    pub base_indent: usize,
    /// Byte offset where content of the innermost open context starts.
    pub base_pos: usize,
    /// Number of open contexts whose markup this line satisfied.
    pub depth: usize,
    /// Container markup elements consumed while skipping markup.
    pub markers: Vec<Element>,
    /// First non-whitespace byte at or after the base position.
    pub pos: usize,
    /// Column of `pos`.
    pub indent: usize,
    /// Character at `pos`, `None` at end of line.
    pub next: Option<char>,
}

impl Line {
    /// Skip whitespace after the base position, if the base moved past `pos`.
    pub fn forward(&mut self) {
        if self.base_pos > self.pos {
            self.forward_inner();
        }
    }

    pub(crate) fn forward_inner(&mut self) {
        let new_pos = skip_space(&self.text, self.base_pos);
        self.indent = self.count_indent(new_pos, self.pos, self.indent);
        self.pos = new_pos;
        self.next = self.text[new_pos..].chars().next();
    }

    /// Reset for a new line of text.
    pub(crate) fn reset(&mut self, text: String) {
        self.text = text;
        self.base_indent = 0;
        self.base_pos = 0;
        self.pos = 0;
        self.indent = 0;
        self.forward_inner();
        self.depth = 1;
        self.markers.clear();
    }

    /// Move the base position to `to` (a byte offset).
    pub fn move_base(&mut self, to: usize) {
        self.base_pos = to;
        self.base_indent = self.count_indent(to, self.pos, self.indent);
    }

    /// Move the base position to the given column.
    pub fn move_base_column(&mut self, indent: usize) {
        self.base_indent = indent;
        self.base_pos = self.find_column(indent);
    }

    pub fn add_marker(&mut self, element: Element) {
        self.markers.push(element);
    }

    /// Column reached after walking from `from` (at column `indent`) to `to`.
    pub fn count_indent(&self, to: usize, from: usize, indent: usize) -> usize {
        if to <= from {
            return indent;
        }
        self.text[from..to].chars().fold(indent, advance_column)
    }

    /// Byte offset of the given column, or the end of the line.
    pub fn find_column(&self, goal: usize) -> usize {
        let mut indent = 0;
        for (i, ch) in self.text.char_indices() {
            if indent >= goal {
                return i;
            }
            indent = advance_column(indent, ch);
        }
        self.text.len()
    }

    /// True when nothing but whitespace follows the base position.
    pub fn is_blank(&self) -> bool {
        self.next.is_none()
    }

    /// The line text with consumed container markup replaced by spaces.
    ///
    /// Byte offsets in the result match offsets in the source line.
    pub fn scrub(&self) -> String {
        if self.base_pos == 0 {
            return self.text.clone();
        }
        let mut result = " ".repeat(self.base_pos);
        result.push_str(&self.text[self.base_pos..]);
        result
    }

    /// Remaining text from `pos`.
    pub fn rest(&self) -> &str {
        &self.text[self.pos..]
    }
}

fn advance_column(indent: usize, ch: char) -> usize {
    if ch == '\t' {
        indent + TAB_WIDTH - indent % TAB_WIDTH
    } else {
        indent + 1
    }
}

/// First byte offset at or after `from` that is not a space, tab or `\r`.
pub fn skip_space(text: &str, from: usize) -> usize {
    text[from..]
        .find(|c: char| !matches!(c, ' ' | '\t' | '\r'))
        .map_or(text.len(), |i| from + i)
}

/// Last byte offset before `to` (and after `from`) preceded by non-space.
pub fn skip_space_back(text: &str, to: usize, from: usize) -> usize {
    text[from..to]
        .rfind(|c: char| !matches!(c, ' ' | '\t' | '\r'))
        .map_or(from, |i| {
            let ch_len = text[from + i..].chars().next().map_or(1, char::len_utf8);
            from + i + ch_len
        })
}
