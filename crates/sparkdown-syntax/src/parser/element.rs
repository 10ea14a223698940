//! Tree elements produced by the block and inline parsers.
//!
//! Elements are plain `(kind, from, to, children)` values in parse
//! coordinates. Text between child elements is not stored; the
//! [`Sink`](super::sink::Sink) fills it in from the source when the tree
//! is assembled.

use rowan::GreenNode;

use super::event::{Event, TreeBuffer};
use crate::syntax_kind::SyntaxKind;
use crate::tree::BlockRecord;

/// A node or token spanning `from..to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub kind: SyntaxKind,
    pub from: usize,
    pub to: usize,
    pub children: Vec<TreeChild>,
    /// Context hash of the composite block this element is a direct child of.
    pub context_hash: Option<u32>,
}

/// A child of an element: either a freshly parsed element or a subtree
/// reused from a previous parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeChild {
    Element(Element),
    /// Index into the parse's side table of reused green nodes.
    Reused {
        index: usize,
        from: usize,
        to: usize,
        hash: u32,
    },
}

/// A green subtree taken from an older tree, with the block records found
/// inside it (offsets relative to the subtree start).
#[derive(Debug, Clone)]
pub struct ReusedNode {
    pub green: GreenNode,
    pub kind: SyntaxKind,
    pub records: Vec<BlockRecord>,
}

impl Element {
    pub fn new(kind: SyntaxKind, from: usize, to: usize) -> Self {
        Self {
            kind,
            from,
            to,
            children: Vec::new(),
            context_hash: None,
        }
    }

    pub fn with_children(kind: SyntaxKind, from: usize, to: usize, children: Vec<Element>) -> Self {
        Self {
            kind,
            from,
            to,
            children: children.into_iter().map(TreeChild::Element).collect(),
            context_hash: None,
        }
    }

    /// Elements shifted by `offset`, used when a sub-parser worked on a slice.
    pub fn shifted(mut self, offset: usize) -> Self {
        self.shift(offset);
        self
    }

    fn shift(&mut self, offset: usize) {
        self.from += offset;
        self.to += offset;
        for child in &mut self.children {
            if let TreeChild::Element(element) = child {
                element.shift(offset);
            }
        }
    }

    /// Write this element and its children as events.
    pub fn write_to(&self, buffer: &mut TreeBuffer) {
        if self.kind.is_token() && self.children.is_empty() {
            buffer.push(Event::Token {
                kind: self.kind,
                from: self.from,
                to: self.to,
            });
            return;
        }
        buffer.push(Event::Start {
            kind: self.kind,
            from: self.from,
            hash: self.context_hash,
        });
        for child in &self.children {
            child.write_to(buffer);
        }
        buffer.push(Event::Finish { to: self.to });
    }
}

impl TreeChild {
    pub fn from(&self) -> usize {
        match self {
            TreeChild::Element(element) => element.from,
            TreeChild::Reused { from, .. } => *from,
        }
    }

    pub fn to(&self) -> usize {
        match self {
            TreeChild::Element(element) => element.to,
            TreeChild::Reused { to, .. } => *to,
        }
    }

    pub fn write_to(&self, buffer: &mut TreeBuffer) {
        match self {
            TreeChild::Element(element) => element.write_to(buffer),
            TreeChild::Reused {
                index, from, hash, ..
            } => buffer.push(Event::Reuse {
                index: *index,
                from: *from,
                hash: *hash,
            }),
        }
    }
}

impl From<Element> for TreeChild {
    fn from(element: Element) -> Self {
        TreeChild::Element(element)
    }
}

/// Merge container markers (e.g. `QUOTE_MARK` on continuation lines) into
/// an ordered list of inline elements, nesting a marker inside any element
/// that spans it.
pub fn inject_marks(mut elements: Vec<Element>, marks: Vec<Element>) -> Vec<Element> {
    if marks.is_empty() {
        return elements;
    }
    if elements.is_empty() {
        return marks;
    }
    let mut i = 0;
    for mark in marks {
        while i < elements.len() && elements[i].to < mark.to {
            i += 1;
        }
        if i < elements.len() && elements[i].from < mark.from {
            let outer = &mut elements[i];
            let inner: Vec<Element> = std::mem::take(&mut outer.children)
                .into_iter()
                .filter_map(|child| match child {
                    TreeChild::Element(element) => Some(element),
                    TreeChild::Reused { .. } => None,
                })
                .collect();
            outer.children = inject_marks(inner, vec![mark])
                .into_iter()
                .map(TreeChild::Element)
                .collect();
        } else {
            elements.insert(i, mark);
            i += 1;
        }
    }
    elements
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(elements: &[Element]) -> Vec<(SyntaxKind, usize, usize)> {
        elements.iter().map(|e| (e.kind, e.from, e.to)).collect()
    }

    #[test]
    fn token_without_children_writes_token_event() {
        let mut buffer = TreeBuffer::default();
        Element::new(SyntaxKind::NAME, 2, 5).write_to(&mut buffer);
        assert_eq!(
            buffer.events,
            vec![Event::Token {
                kind: SyntaxKind::NAME,
                from: 2,
                to: 5
            }]
        );
    }

    #[test]
    fn node_writes_start_children_finish() {
        let mut buffer = TreeBuffer::default();
        let node = Element::with_children(
            SyntaxKind::JUMP,
            0,
            6,
            vec![
                Element::new(SyntaxKind::DIVERT_MARK, 0, 2),
                Element::new(SyntaxKind::NAME, 3, 6),
            ],
        );
        node.write_to(&mut buffer);
        assert_eq!(buffer.events.len(), 4);
        assert_eq!(
            buffer.events[0],
            Event::Start {
                kind: SyntaxKind::JUMP,
                from: 0,
                hash: None
            }
        );
        assert_eq!(buffer.events[3], Event::Finish { to: 6 });
    }

    #[test]
    fn inject_marks_between_elements() {
        let elements = vec![
            Element::new(SyntaxKind::EMPHASIS, 0, 3),
            Element::new(SyntaxKind::NOTE, 10, 14),
        ];
        let marks = vec![Element::new(SyntaxKind::QUOTE_MARK, 5, 6)];
        let merged = inject_marks(elements, marks);
        assert_eq!(
            kinds(&merged),
            vec![
                (SyntaxKind::EMPHASIS, 0, 3),
                (SyntaxKind::QUOTE_MARK, 5, 6),
                (SyntaxKind::NOTE, 10, 14),
            ]
        );
    }

    #[test]
    fn inject_marks_nests_inside_spanning_element() {
        let elements = vec![Element::new(SyntaxKind::EMPHASIS, 0, 12)];
        let marks = vec![Element::new(SyntaxKind::QUOTE_MARK, 5, 6)];
        let merged = inject_marks(elements, marks);
        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged[0].children,
            vec![TreeChild::Element(Element::new(SyntaxKind::QUOTE_MARK, 5, 6))]
        );
    }

    #[test]
    fn shifted_moves_children() {
        let node = Element::with_children(
            SyntaxKind::EXPRESSION,
            0,
            3,
            vec![Element::new(SyntaxKind::IDENT, 0, 3)],
        )
        .shifted(10);
        assert_eq!((node.from, node.to), (10, 13));
        assert_eq!(node.children[0].from(), 10);
    }
}
