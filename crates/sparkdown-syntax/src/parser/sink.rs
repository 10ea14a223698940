//! Sink for converting parser events into a Rowan green tree.
//!
//! Events only describe the marked-up parts of the document. The sink walks
//! the source alongside them and fills every gap with `WHITESPACE`,
//! `NEWLINE` and `TEXT` tokens (or `SKIPPED` for text outside the retained
//! ranges), so the resulting tree covers every byte.

use rowan::{GreenNode, GreenToken, NodeOrToken};

use super::element::ReusedNode;
use super::event::Event;
use super::fragment::RangeMap;
use crate::syntax_kind::SyntaxKind;
use crate::tree::{BlockRecord, Tree};

type GreenElement = NodeOrToken<GreenNode, GreenToken>;

struct Frame {
    kind: SyntaxKind,
    from: usize,
    hash: Option<u32>,
    children: Vec<GreenElement>,
}

/// Converts parser events into a [`Tree`].
pub struct Sink<'a> {
    text: &'a str,
    ranges: &'a RangeMap,
    reused: &'a [ReusedNode],
    cursor: usize,
    stack: Vec<Frame>,
    root: Option<GreenNode>,
    records: Vec<BlockRecord>,
}

impl<'a> Sink<'a> {
    pub fn new(text: &'a str, ranges: &'a RangeMap, reused: &'a [ReusedNode]) -> Self {
        Self {
            text,
            ranges,
            reused,
            cursor: 0,
            stack: Vec::new(),
            root: None,
            records: Vec::new(),
        }
    }

    /// Consume the sink and build the tree.
    pub fn finish(mut self, events: Vec<Event>) -> Tree {
        for event in events {
            match event {
                Event::Start { kind, from, hash } => {
                    if self.stack.is_empty() {
                        // The root always starts at 0 so skipped text before
                        // the first range stays inside it
                        self.stack.push(Frame {
                            kind,
                            from: 0,
                            hash,
                            children: Vec::new(),
                        });
                        let start = self.ranges.to_absolute(from, false);
                        self.fill(start);
                        continue;
                    }
                    let start = self.ranges.to_absolute(from, false);
                    self.fill(start);
                    self.stack.push(Frame {
                        kind,
                        from: self.cursor,
                        hash,
                        children: Vec::new(),
                    });
                }
                Event::Token { kind, from, to } => {
                    let start = self.ranges.to_absolute(from, false);
                    let end = self.ranges.to_absolute(to, true).max(start);
                    self.fill(start);
                    self.token(kind, end);
                }
                Event::Finish { to } => {
                    let end = if self.stack.len() == 1 {
                        self.text.len()
                    } else {
                        self.ranges.to_absolute(to, true)
                    };
                    self.fill(end);
                    self.finish_node();
                }
                Event::Reuse { index, from, hash } => {
                    let start = self.ranges.to_absolute(from, false);
                    self.fill(start);
                    self.splice(index, hash);
                }
            }
        }

        // Unbalanced buffers only come from a bug in the block parser;
        // close whatever is still open rather than lose text.
        while !self.stack.is_empty() {
            if self.stack.len() == 1 {
                self.fill(self.text.len());
            }
            self.finish_node();
        }

        let green = match self.root {
            Some(root) => root,
            None => GreenNode::new(SyntaxKind::DOCUMENT.into(), Vec::<GreenElement>::new()),
        };
        self.records
            .sort_by(|a, b| a.from.cmp(&b.from).then(b.to.cmp(&a.to)));
        Tree::new(green, self.records)
    }

    fn finish_node(&mut self) {
        let Some(frame) = self.stack.pop() else {
            return;
        };
        let node = GreenNode::new(frame.kind.into(), frame.children);
        if let Some(hash) = frame.hash {
            self.records.push(BlockRecord {
                kind: frame.kind,
                from: frame.from,
                to: self.cursor,
                hash,
            });
        }
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(NodeOrToken::Node(node)),
            None => self.root = Some(node),
        }
    }

    fn splice(&mut self, index: usize, hash: u32) {
        let Some(reused) = self.reused.get(index) else {
            return;
        };
        let from = self.cursor;
        let len = u32::from(reused.green.text_len()) as usize;
        self.records.push(BlockRecord {
            kind: reused.kind,
            from,
            to: from + len,
            hash,
        });
        self.records.extend(reused.records.iter().map(|record| BlockRecord {
            from: record.from + from,
            to: record.to + from,
            ..*record
        }));
        if let Some(frame) = self.stack.last_mut() {
            frame.children.push(NodeOrToken::Node(reused.green.clone()));
        }
        self.cursor = from + len;
    }

    fn token(&mut self, kind: SyntaxKind, end: usize) {
        if end <= self.cursor {
            return;
        }
        let text = &self.text[self.cursor..end];
        self.push_token(kind, text);
        self.cursor = end;
    }

    fn push_token(&mut self, kind: SyntaxKind, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(frame) = self.stack.last_mut() {
            frame
                .children
                .push(NodeOrToken::Token(GreenToken::new(kind.into(), text)));
        }
    }

    /// Emit filler tokens for the source between the cursor and `to`.
    fn fill(&mut self, to: usize) {
        if to <= self.cursor {
            return;
        }
        for (segment, visible) in self.ranges.segments(self.cursor, to) {
            let text = self.text;
            if !visible {
                self.push_token(SyntaxKind::SKIPPED, &text[segment]);
                continue;
            }
            for (kind, piece) in split_filler(&text[segment]) {
                self.push_token(kind, piece);
            }
        }
        self.cursor = to;
    }
}

/// Split plain text into newline, whitespace and text runs.
fn split_filler(text: &str) -> Vec<(SyntaxKind, &str)> {
    fn class(ch: char) -> SyntaxKind {
        match ch {
            '\n' => SyntaxKind::NEWLINE,
            ' ' | '\t' | '\r' => SyntaxKind::WHITESPACE,
            _ => SyntaxKind::TEXT,
        }
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    let mut current: Option<SyntaxKind> = None;
    for (i, ch) in text.char_indices() {
        let kind = class(ch);
        match current {
            Some(prev) if prev == kind && kind != SyntaxKind::NEWLINE => {}
            Some(prev) => {
                pieces.push((prev, &text[start..i]));
                start = i;
                current = Some(kind);
            }
            None => current = Some(kind),
        }
    }
    if let Some(kind) = current {
        pieces.push((kind, &text[start..]));
    }
    pieces
}
