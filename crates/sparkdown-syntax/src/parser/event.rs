//! # Parser Events
//!
//! Events are the intermediate representation between parsing and tree
//! building. Once the block parser has finished, its element tree is written
//! out as a **flat sequence** of events that describe the tree structure.
//!
//! ## Event Types
//!
//! ```text
//! Start(DIALOGUE, 0)        ← Begin a DIALOGUE node at offset 0
//!   Start(CHARACTER, 0)
//!     Token(CHARACTER_NAME, 0..4)
//!     Token(COLON, 4..5)
//!   Finish(5)
//!   ...
//! Finish(12)                ← End the DIALOGUE node at offset 12
//! Reuse(0, 13)              ← Splice side-table subtree #0 at offset 13
//! ```
//!
//! Positions are in parse coordinates (text outside the retained ranges
//! removed). Text between events is not part of the buffer; the Sink reads
//! it from the source and emits whitespace, newline and text tokens for it.
//!
//! ## Reused Subtrees
//!
//! A subtree reused from a previous parse is not copied into the buffer.
//! `Reuse` carries an index into the side table of green nodes the parse
//! collected, and the Sink splices the node in by reference.

use crate::syntax_kind::SyntaxKind;

/// An event in the flat tree buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Begin a node at `from`.
    ///
    /// `hash` is set for direct children of composite blocks and ends up in
    /// the tree's block record table.
    Start {
        kind: SyntaxKind,
        from: usize,
        hash: Option<u32>,
    },

    /// A leaf token spanning `from..to`.
    Token {
        kind: SyntaxKind,
        from: usize,
        to: usize,
    },

    /// Finish the current node at `to`.
    Finish { to: usize },

    /// Splice a reused green node from the side table at `from`.
    Reuse { index: usize, from: usize, hash: u32 },
}

/// The flat event buffer written by the element tree.
#[derive(Debug, Default)]
pub struct TreeBuffer {
    pub events: Vec<Event>,
}

impl TreeBuffer {
    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_collects_events_in_order() {
        let mut buffer = TreeBuffer::default();
        buffer.push(Event::Start {
            kind: SyntaxKind::DOCUMENT,
            from: 0,
            hash: None,
        });
        buffer.push(Event::Finish { to: 0 });
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.events[1], Event::Finish { to: 0 });
    }
}
