//! Editable script buffer with incremental reparsing.
//!
//! [`ScriptBuffer`] keeps the script in an `xi_rope::Rope`. Every edit is
//! compiled to a rope `Delta`, applied, and followed by an incremental
//! reparse that reuses the unchanged blocks of the previous tree.

use std::ops::Range;

use log::debug;
use thiserror::Error;
use xi_rope::Rope;
use xi_rope::delta::Builder;

use crate::parser::{
    ChangedRange, MIN_FRAGMENT_GAP, ParseInput, ParserConfig, PartialParse, TreeFragment,
};
use crate::tree::Tree;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("edit range {start}..{end} is outside the buffer (length {len})")]
    OutOfBounds { start: usize, end: usize, len: usize },

    #[error("edit position {0} is not on a character boundary")]
    NotCharBoundary(usize),
}

/// Result of one edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reparse {
    /// Byte ranges of inserted text in the new buffer.
    pub changed: Vec<Range<usize>>,
    pub version: u64,
    /// Subtrees spliced in from the previous tree.
    pub reused_nodes: usize,
}

/// A script plus its current syntax tree.
pub struct ScriptBuffer {
    buffer: Rope,
    config: ParserConfig,
    tree: Tree,
    fragments: Vec<TreeFragment>,
    version: u64,
}

impl ScriptBuffer {
    pub fn new(text: &str) -> Self {
        Self::with_config(text, ParserConfig::default())
    }

    pub fn with_config(text: &str, config: ParserConfig) -> Self {
        let tree = config.parse(text);
        let fragments = TreeFragment::add_tree(tree.clone(), &[], false);
        Self {
            buffer: Rope::from(text),
            config,
            tree,
            fragments,
            version: 0,
        }
    }

    pub fn text(&self) -> String {
        self.buffer.to_string()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.len() == 0
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Replace `range` with `text` and reparse.
    pub fn edit(&mut self, range: Range<usize>, text: &str) -> Result<Reparse, EditError> {
        let current = self.buffer.to_string();
        if range.start > range.end || range.end > current.len() {
            return Err(EditError::OutOfBounds {
                start: range.start,
                end: range.end,
                len: current.len(),
            });
        }
        for pos in [range.start, range.end] {
            if !current.is_char_boundary(pos) {
                return Err(EditError::NotCharBoundary(pos));
            }
        }

        let mut builder = Builder::new(current.len());
        builder.replace(range.clone(), Rope::from(text));
        let delta = builder.build();
        self.buffer = delta.apply(&self.buffer);

        let change = ChangedRange {
            from_a: range.start,
            to_a: range.end,
            from_b: range.start,
            to_b: range.start + text.len(),
        };
        let fragments = TreeFragment::apply_changes(&self.fragments, &[change], MIN_FRAGMENT_GAP);

        let new_text = self.buffer.to_string();
        let mut parse = self.config.start_parse(ParseInput {
            text: &new_text,
            ranges: Vec::new(),
            fragments,
        });
        let tree = loop {
            if let Some(tree) = parse.advance() {
                break tree;
            }
        };
        let reused_nodes = parse.reused_nodes();

        self.fragments = TreeFragment::add_tree(tree.clone(), &[], false);
        self.tree = tree;
        self.version += 1;
        debug!(
            "edit {}..{} (+{} bytes): version {}, {} reused subtrees",
            range.start,
            range.end,
            text.len(),
            self.version,
            reused_nodes
        );

        Ok(Reparse {
            changed: vec![range.start..range.start + text.len()],
            version: self.version,
            reused_nodes,
        })
    }

    pub fn insert(&mut self, at: usize, text: &str) -> Result<Reparse, EditError> {
        self.edit(at..at, text)
    }

    pub fn delete(&mut self, range: Range<usize>) -> Result<Reparse, EditError> {
        self.edit(range, "")
    }
}
