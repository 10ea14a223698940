//! # Parser - Building the Syntax Tree
//!
//! The parser turns a script into a [`Tree`]. It is line oriented: a
//! [`BlockContext`] walks the text line by line, keeping a stack of open
//! composite blocks, and consults the ordered recognizer tables of a
//! [`ParserConfig`] to decide what each line starts.
//!
//! ## Recognizer Tables
//!
//! | table | signature | role |
//! |-------|-----------|------|
//! | `block_parsers` | [`BlockParseFn`] | claim a line: open a composite or consume a block |
//! | `leaf_parsers` | [`LeafParserFactory`] | offer to claim paragraph-like leaves |
//! | `end_leaf` | [`EndLeafFn`] | end a leaf when the next line starts something else |
//! | `inline_parsers` | [`InlineParseFn`] | recognise inline markup |
//! | `skip_markup` | [`SkipMarkupFn`] | decide whether a line continues an open composite |
//!
//! The core table knows the document structure (front matter, chunks,
//! sections, quotes, choices) and the inline delimiters. The screenplay
//! constructs are layered on through [`Extension`]s; see
//! [`grammar::script_extension`].
//!
//! ## Incremental Parsing
//!
//! Pass [`TreeFragment`]s of an older tree in [`ParseInput::fragments`] and
//! unchanged blocks are spliced into the new tree instead of being parsed
//! again.

use std::collections::HashMap;
use std::ops::Range;

use log::warn;
use thiserror::Error;

pub mod block;
pub mod element;
pub mod event;
pub mod fragment;
pub mod grammar;
pub mod line;
pub mod registry;
pub mod sink;

pub use block::{BlockContext, BlockResult, CompositeBlock, LeafBlock, LeafBlockParser};
pub use fragment::{ChangedRange, FragmentCursor, MIN_FRAGMENT_GAP, RangeMap, TreeFragment};
pub use grammar::inline::InlineContext;
pub use registry::{Placement, Registry};

use crate::syntax_kind::SyntaxKind;
use crate::tree::Tree;

/// Try to claim the current line.
pub type BlockParseFn = fn(&mut BlockContext<'_>) -> BlockResult;
/// Offer a leaf parser for a freshly started leaf block.
pub type LeafParserFactory = fn(&BlockContext<'_>, &LeafBlock) -> Option<Box<dyn LeafBlockParser>>;
/// Return true when the current line ends the open leaf block.
pub type EndLeafFn = fn(&BlockContext<'_>, &LeafBlock) -> bool;
/// Try to parse inline markup starting with `next` at `pos`, returning the
/// position to continue from.
pub type InlineParseFn = fn(&mut InlineContext<'_>, char, usize) -> Option<usize>;
/// Skip the markup of the open composite at the given stack index, returning
/// false when the current line does not continue it.
pub type SkipMarkupFn = fn(&mut BlockContext<'_>, usize) -> bool;

/// Errors from configuring or driving a parse.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("stop position can only move later (currently {current}, requested {requested})")]
    StopMovedBackwards { current: usize, requested: usize },

    #[error("no recognizer named '{0}'")]
    UnknownRecognizer(String),
}

/// A parse that can be advanced step by step.
pub trait PartialParse {
    /// Do one unit of work. Returns the tree once parsing has finished.
    fn advance(&mut self) -> Option<Tree>;

    /// Source position up to which input has been consumed.
    fn parsed_pos(&self) -> usize;

    /// Finish the parse once it passes `pos`. The position may only move
    /// later once set.
    fn stop_at(&mut self, pos: usize) -> Result<(), ParseError>;

    fn stopped_at(&self) -> Option<usize>;
}

/// Text plus optional incremental state.
#[derive(Debug, Clone, Default)]
pub struct ParseInput<'a> {
    pub text: &'a str,
    /// Source ranges to read. Empty means the whole text.
    pub ranges: Vec<Range<usize>>,
    /// Fragments of an older tree that may be reused.
    pub fragments: Vec<TreeFragment>,
}

impl<'a> ParseInput<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            ..Self::default()
        }
    }
}

/// A set of registry edits layered onto a [`ParserConfig`].
#[derive(Default)]
pub struct Extension {
    pub block_parsers: Vec<(Placement, &'static str, BlockParseFn)>,
    pub leaf_parsers: Vec<(Placement, &'static str, LeafParserFactory)>,
    pub end_leaf: Vec<(Placement, &'static str, EndLeafFn)>,
    pub inline_parsers: Vec<(Placement, &'static str, InlineParseFn)>,
    pub skip_markup: Vec<(SyntaxKind, SkipMarkupFn)>,
    /// Names removed from every table before the additions are applied.
    pub remove: Vec<&'static str>,
}

/// The recognizer tables a parse runs with.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub block_parsers: Registry<BlockParseFn>,
    pub leaf_parsers: Registry<LeafParserFactory>,
    pub end_leaf: Registry<EndLeafFn>,
    pub inline_parsers: Registry<InlineParseFn>,
    pub skip_markup: HashMap<SyntaxKind, SkipMarkupFn>,
}

impl ParserConfig {
    /// Document structure and inline delimiters only.
    pub fn core() -> Self {
        grammar::core_config()
    }

    /// A new config with `extension` applied.
    pub fn configure(&self, extension: Extension) -> Result<Self, ParseError> {
        let mut config = self.clone();
        for name in &extension.remove {
            config.block_parsers.remove(name);
            config.leaf_parsers.remove(name);
            config.end_leaf.remove(name);
            config.inline_parsers.remove(name);
        }
        for (placement, name, parse) in extension.block_parsers {
            config.block_parsers.insert(placement, name, parse)?;
        }
        for (placement, name, factory) in extension.leaf_parsers {
            config.leaf_parsers.insert(placement, name, factory)?;
        }
        for (placement, name, stop) in extension.end_leaf {
            config.end_leaf.insert(placement, name, stop)?;
        }
        for (placement, name, parse) in extension.inline_parsers {
            config.inline_parsers.insert(placement, name, parse)?;
        }
        config.skip_markup.extend(extension.skip_markup);
        Ok(config)
    }

    /// Begin a step-wise parse.
    pub fn start_parse<'p>(&'p self, input: ParseInput<'p>) -> BlockContext<'p> {
        let ranges = RangeMap::new(&input.ranges, input.text.len());
        let fragments = (!input.fragments.is_empty()).then(|| FragmentCursor::new(input.fragments));
        BlockContext::new(self, input.text, ranges, fragments)
    }

    /// Parse a whole document.
    pub fn parse(&self, text: &str) -> Tree {
        run(self.start_parse(ParseInput::new(text)))
    }

    /// Reparse `text`, reusing unchanged parts of older trees.
    pub fn parse_incremental(
        &self,
        text: &str,
        fragments: &[TreeFragment],
        ranges: &[Range<usize>],
    ) -> Tree {
        run(self.start_parse(ParseInput {
            text,
            ranges: ranges.to_vec(),
            fragments: fragments.to_vec(),
        }))
    }
}

impl Default for ParserConfig {
    /// The core table with the screenplay constructs.
    fn default() -> Self {
        let core = Self::core();
        match core.configure(grammar::script_extension()) {
            Ok(config) => config,
            Err(err) => {
                warn!("script extension failed to apply, using core grammar: {err}");
                core
            }
        }
    }
}

/// Drive a partial parse to completion.
pub fn run(mut parse: impl PartialParse) -> Tree {
    loop {
        if let Some(tree) = parse.advance() {
            return tree;
        }
    }
}

/// Parse a script with the default grammar.
pub fn parse(text: &str) -> Tree {
    ParserConfig::default().parse(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_empty_input() {
        let tree = parse("");
        assert_eq!(tree.syntax().kind(), SyntaxKind::DOCUMENT);
        assert_eq!(tree.text(), "");
    }

    #[test]
    fn default_config_layers_script_extension() {
        let config = ParserConfig::default();
        let names: Vec<_> = config.block_parsers.names().collect();
        assert_eq!(names.first(), Some(&"FrontMatter"));
        assert!(names.contains(&"Scene"));
        assert!(config.leaf_parsers.get("Dialogue").is_some());
        assert!(config.inline_parsers.get("AssetTag").is_some());
    }

    #[test]
    fn core_config_has_no_script_constructs() {
        let tree = ParserConfig::core().parse("INT. HOUSE - DAY\n");
        assert!(tree.nodes_of(SyntaxKind::SCENE).is_empty());
        assert_eq!(tree.nodes_of(SyntaxKind::ACTION).len(), 1);
    }

    #[test]
    fn extension_with_unknown_anchor_fails() {
        fn decline(_: &mut BlockContext<'_>) -> BlockResult {
            BlockResult::Declined
        }
        let extension = Extension {
            block_parsers: vec![(
                Placement::Before("Nope"),
                "Other",
                decline as BlockParseFn,
            )],
            ..Extension::default()
        };
        let err = ParserConfig::core().configure(extension).unwrap_err();
        assert_eq!(err, ParseError::UnknownRecognizer("Nope".to_string()));
    }

    #[test]
    fn extension_can_remove_recognizers() {
        let extension = Extension {
            remove: vec!["Scene"],
            ..Extension::default()
        };
        let config = ParserConfig::default().configure(extension).unwrap();
        let tree = config.parse("INT. HOUSE - DAY\n");
        assert!(tree.nodes_of(SyntaxKind::SCENE).is_empty());
    }

    #[test]
    fn ranges_skip_text() {
        let text = "A.\nhidden\nB.\n";
        let tree = ParserConfig::default().parse_incremental(text, &[], &[0..3, 9..13]);
        assert_eq!(tree.text(), text);
        assert_eq!(tree.nodes_of(SyntaxKind::ACTION).len(), 2);
        let skipped = tree
            .syntax()
            .descendants_with_tokens()
            .filter(|t| t.kind() == SyntaxKind::SKIPPED)
            .count();
        assert_eq!(skipped, 1);
    }
}
