//! Diagnostics reported against a script.
//!
//! Every diagnostic carries both byte offsets and 0-based line/column
//! positions so hosts can display it without re-scanning the text.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Focus {
    pub from: usize,
    pub to: usize,
}

/// A fix-it style follow-up offered alongside a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub label: String,
    pub focus: Option<Focus>,
}

impl Action {
    pub fn jump_to_declaration(from: usize, to: usize) -> Self {
        Self {
            label: "Jump to declaration".to_string(),
            focus: Some(Focus { from, to }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub from: usize,
    pub to: usize,
    pub line: usize,
    pub start_column: usize,
    pub end_column: usize,
    pub severity: Severity,
    pub message: String,
    pub actions: Vec<Action>,
}

impl Diagnostic {
    pub fn with_action(&mut self, action: Action) -> &mut Self {
        self.actions.push(action);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}: {}",
            self.line + 1,
            self.start_column + 1,
            self.severity,
            self.message
        )
    }
}

/// Maps byte offsets to 0-based lines and character columns.
#[derive(Debug, Clone)]
pub struct LineIndex<'t> {
    text: &'t str,
    line_starts: Vec<usize>,
}

impl<'t> LineIndex<'t> {
    pub fn new(text: &'t str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self { text, line_starts }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        }
    }

    pub fn line_start(&self, line: usize) -> usize {
        self.line_starts.get(line).copied().unwrap_or(self.text.len())
    }

    pub fn column_of(&self, offset: usize) -> usize {
        let start = self.line_start(self.line_of(offset));
        let offset = self.floor_char_boundary(offset);
        self.text[start..offset].chars().count()
    }

    fn floor_char_boundary(&self, mut offset: usize) -> usize {
        offset = offset.min(self.text.len());
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }
        offset
    }

    /// Widen an empty or inverted span to cover one character.
    pub fn widen(&self, from: usize, to: usize) -> (usize, usize) {
        if from < to {
            return (from, to);
        }
        let from = self.floor_char_boundary(from);
        match self.text[from..].chars().next() {
            Some(c) => (from, from + c.len_utf8()),
            None => match self.text[..from].chars().next_back() {
                Some(c) => (from - c.len_utf8(), from),
                // Empty script: nothing to point at
                None => (0, 1),
            },
        }
    }

    pub fn diagnostic(
        &self,
        severity: Severity,
        from: usize,
        to: usize,
        message: impl Into<String>,
    ) -> Diagnostic {
        let (from, to) = self.widen(from, to);
        let line = self.line_of(from);
        let end_line = self.line_of(to);
        let end_column = if end_line == line {
            self.column_of(to)
        } else {
            // Multi-line spans are clipped to the first line for columns
            self.column_of(self.line_start(line + 1).saturating_sub(1))
                .max(self.column_of(from) + 1)
        };
        Diagnostic {
            from,
            to,
            line,
            start_column: self.column_of(from),
            end_column,
            severity,
            message: message.into(),
            actions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0, 0)]
    #[case(3, 0, 3)]
    #[case(4, 1, 0)]
    #[case(8, 2, 1)]
    fn line_and_column(#[case] offset: usize, #[case] line: usize, #[case] column: usize) {
        let index = LineIndex::new("abc\nde\nfgh");
        assert_eq!(index.line_of(offset), line);
        assert_eq!(index.column_of(offset), column);
    }

    #[test]
    fn columns_count_characters() {
        let index = LineIndex::new("é x");
        assert_eq!(index.column_of(3), 2);
    }

    #[test]
    fn degenerate_spans_are_widened() {
        let index = LineIndex::new("ab\n");
        assert_eq!(index.widen(1, 1), (1, 2));
        assert_eq!(index.widen(3, 3), (2, 3));
        assert_eq!(index.widen(2, 5), (2, 5));

        let diagnostic = index.diagnostic(Severity::Error, 1, 1, "oops");
        assert_eq!((diagnostic.from, diagnostic.to), (1, 2));
        assert_eq!((diagnostic.start_column, diagnostic.end_column), (1, 2));
        assert_eq!(diagnostic.to_string(), "1:2: error: oops");
    }

    #[test]
    fn actions_chain_onto_a_reported_diagnostic() {
        let index = LineIndex::new("# A\n# A\n");
        let mut diagnostic = index.diagnostic(Severity::Error, 6, 7, "'A' is already declared");
        diagnostic
            .with_action(Action::jump_to_declaration(2, 3))
            .with_action(Action::jump_to_declaration(0, 1));
        assert_eq!(diagnostic.actions.len(), 2);
        assert_eq!(diagnostic.actions[0].focus, Some(Focus { from: 2, to: 3 }));
    }
}
