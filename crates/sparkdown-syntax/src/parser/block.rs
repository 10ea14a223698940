//! The block parser state machine.
//!
//! [`BlockContext`] consumes the document one line at a time. Composite
//! blocks (chunks, sections, quotes, choice lists and choices) live on an
//! explicit stack; every other construct is either consumed eagerly by a
//! block recognizer or accumulated as a leaf block until something ends it.

use std::borrow::Cow;

use log::{debug, trace, warn};

use super::element::{Element, ReusedNode, TreeChild, inject_marks};
use super::event::TreeBuffer;
use super::fragment::{FragmentCursor, RangeMap};
use super::grammar::inline::parse_inline;
use super::line::Line;
use super::sink::Sink;
use super::{ParseError, ParserConfig, PartialParse};
use crate::syntax_kind::SyntaxKind;
use crate::tree::Tree;

/// What a block recognizer did with the current line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockResult {
    /// Not this construct; try the next recognizer.
    Declined,
    /// The block was consumed (and the line cursor moved past it).
    Handled,
    /// A composite was opened; dispatch the same line again at the new base.
    Continue,
}

/// One frame of the composite block stack.
#[derive(Debug, Clone)]
pub struct CompositeBlock {
    pub kind: SyntaxKind,
    /// Marker char, heading level or content column, depending on `kind`.
    pub value: u32,
    pub from: usize,
    pub hash: u32,
    /// End of the last line the block claimed.
    pub end: usize,
    children: Vec<TreeChild>,
}

impl CompositeBlock {
    pub fn create(kind: SyntaxKind, value: u32, from: usize, parent_hash: u32, end: usize) -> Self {
        let hash = parent_hash
            .wrapping_add(parent_hash << 8)
            .wrapping_add(kind as u32)
            .wrapping_add(value << 4);
        Self {
            kind,
            value,
            from,
            hash,
            end,
            children: Vec::new(),
        }
    }

    fn document() -> Self {
        Self::create(SyntaxKind::DOCUMENT, 0, 0, 0, 0)
    }

    pub fn children_len(&self) -> usize {
        self.children.len()
    }

    fn into_element(self, end: usize) -> Element {
        let to = self
            .children
            .last()
            .map_or(end, |child| end.max(child.to()));
        Element {
            kind: self.kind,
            from: self.from,
            to,
            children: self.children,
            context_hash: None,
        }
    }
}

/// Paragraph-like content accumulated over several lines.
#[derive(Debug, Clone)]
pub struct LeafBlock {
    pub start: usize,
    /// Scrubbed line texts joined with `\n`; offsets map 1:1 to the source.
    pub content: String,
    /// Container markers met on continuation lines.
    pub marks: Vec<Element>,
}

impl LeafBlock {
    fn new(start: usize, content: String) -> Self {
        Self {
            start,
            content,
            marks: Vec::new(),
        }
    }

    pub fn end(&self) -> usize {
        self.start + self.content.len()
    }
}

/// A parser that may claim a leaf block it was offered.
pub trait LeafBlockParser {
    /// Observe a continuation line. Returning true means the parser has
    /// finished the leaf itself.
    fn next_line(&mut self, cx: &mut BlockContext<'_>, leaf: &mut LeafBlock) -> bool;

    /// The leaf ended. Returning true means the parser added its node.
    fn finish(&mut self, cx: &mut BlockContext<'_>, leaf: &LeafBlock) -> bool;
}

/// An in-progress parse. Drive it with [`PartialParse::advance`].
pub struct BlockContext<'p> {
    config: &'p ParserConfig,
    input: &'p str,
    visible: Cow<'p, str>,
    ranges: RangeMap,
    pub line: Line,
    line_start: usize,
    to: usize,
    at_end: bool,
    block: CompositeBlock,
    parents: Vec<CompositeBlock>,
    fragments: Option<FragmentCursor>,
    stopped_at: Option<usize>,
    reused: Vec<ReusedNode>,
    reused_count: usize,
    done: Option<Tree>,
}

impl<'p> BlockContext<'p> {
    pub(crate) fn new(
        config: &'p ParserConfig,
        input: &'p str,
        ranges: RangeMap,
        fragments: Option<FragmentCursor>,
    ) -> Self {
        let visible = ranges.visible_text(input);
        let to = visible.len();
        debug!(
            "starting parse of {} bytes ({} retained ranges, incremental: {})",
            input.len(),
            ranges.ranges().len(),
            fragments.is_some()
        );
        let mut cx = Self {
            config,
            input,
            visible,
            ranges,
            line: Line::default(),
            line_start: 0,
            to,
            at_end: false,
            block: CompositeBlock::document(),
            parents: Vec::new(),
            fragments,
            stopped_at: None,
            reused: Vec::new(),
            reused_count: 0,
            done: None,
        };
        cx.read_line();
        cx
    }

    pub fn config(&self) -> &'p ParserConfig {
        self.config
    }

    pub(crate) fn ranges(&self) -> &RangeMap {
        &self.ranges
    }

    /// Start of the current line in parse coordinates.
    pub fn line_start(&self) -> usize {
        self.line_start
    }

    /// End of the current line in parse coordinates.
    pub fn line_end(&self) -> usize {
        self.line_start + self.line.text.len()
    }

    /// Start of the current line in source coordinates.
    pub fn absolute_line_start(&self) -> usize {
        self.ranges.to_absolute(self.line_start, false)
    }

    /// End of the line before the current one.
    pub fn prev_line_end(&self) -> usize {
        if self.at_end {
            self.line_start
        } else {
            self.line_start.saturating_sub(1)
        }
    }

    /// The innermost open composite block.
    pub fn block(&self) -> &CompositeBlock {
        &self.block
    }

    /// Number of open composite blocks, including the document.
    pub fn depth(&self) -> usize {
        self.parents.len() + 1
    }

    /// Open composite block at stack index `depth` (0 is the document).
    pub fn context(&self, depth: usize) -> &CompositeBlock {
        self.parents.get(depth).unwrap_or(&self.block)
    }

    pub fn context_mut(&mut self, depth: usize) -> &mut CompositeBlock {
        if depth < self.parents.len() {
            &mut self.parents[depth]
        } else {
            &mut self.block
        }
    }

    /// True when the innermost block may hold chunks and sections.
    pub fn at_structure_level(&self) -> bool {
        matches!(
            self.block.kind,
            SyntaxKind::DOCUMENT | SyntaxKind::CHUNK | SyntaxKind::SECTION
        )
    }

    /// Number of subtrees spliced in from earlier trees so far.
    pub fn reused_nodes(&self) -> usize {
        self.reused_count
    }

    /// Move to the next line. Returns false at the end of input.
    pub fn next_line(&mut self) -> bool {
        self.line_start += self.line.text.len();
        if self.line_start >= self.to {
            self.at_end = true;
            self.read_line();
            return false;
        }
        self.line_start += 1;
        self.read_line();
        true
    }

    fn read_line(&mut self) {
        let rest = &self.visible[self.line_start.min(self.to)..];
        let text = rest.find('\n').map_or(rest, |i| &rest[..i]).to_string();
        self.line.reset(text);
        let config = self.config;
        while self.line.depth < self.depth() {
            let depth = self.line.depth;
            let kind = self.context(depth).kind;
            let Some(skip) = config.skip_markup.get(&kind) else {
                warn!("no skip-markup handler for {kind:?}, closing it");
                break;
            };
            if !skip(self, depth) {
                break;
            }
            self.line.forward();
            self.line.depth += 1;
        }
    }

    /// Open a composite block at byte `start` of the current line.
    pub fn start_context(&mut self, kind: SyntaxKind, start: usize, value: u32) {
        let block = CompositeBlock::create(
            kind,
            value,
            self.line_start + start,
            self.block.hash,
            self.line_end(),
        );
        let parent = std::mem::replace(&mut self.block, block);
        self.parents.push(parent);
    }

    fn finish_context(&mut self) {
        let Some(parent) = self.parents.pop() else {
            return;
        };
        let done = std::mem::replace(&mut self.block, parent);
        let end = done.end;
        self.add_element(done.into_element(end));
    }

    /// Add a finished element to the innermost open block.
    pub fn add_element(&mut self, mut element: Element) {
        if element.kind.is_node() {
            element.context_hash = Some(self.block.hash);
        }
        self.block.children.push(TreeChild::Element(element));
    }

    /// Add a bare token, e.g. a list marker.
    pub fn add_token(&mut self, kind: SyntaxKind, from: usize, to: usize) {
        self.add_element(Element::new(kind, from, to));
    }

    pub(crate) fn add_reused(&mut self, node: ReusedNode, from: usize, to: usize) {
        let index = self.reused.len();
        self.reused.push(node);
        self.reused_count += 1;
        self.block.children.push(TreeChild::Reused {
            index,
            from,
            to,
            hash: self.block.hash,
        });
    }

    pub(crate) fn truncate_children(&mut self, len: usize) {
        let len = len.min(self.block.children.len());
        let dropped = self.block.children.split_off(len);
        let dropped_reused = dropped
            .iter()
            .filter(|child| matches!(child, TreeChild::Reused { .. }))
            .count();
        self.reused_count -= dropped_reused;
    }

    /// Retained text after the current line.
    pub fn text_after_line(&self) -> &str {
        let from = (self.line_end() + 1).min(self.to);
        &self.visible[from..]
    }

    /// Inline-parse `text` that starts at parse position `offset`.
    pub fn parse_inline(&self, text: &str, offset: usize) -> Vec<Element> {
        parse_inline(self.config, text, offset)
    }

    fn reuse_fragment(&mut self, base: usize) -> bool {
        let Some(mut cursor) = self.fragments.take() else {
            return false;
        };
        let reused = self.try_reuse(&mut cursor, base);
        self.fragments = Some(cursor);
        reused
    }

    fn try_reuse(&mut self, cursor: &mut FragmentCursor, base: usize) -> bool {
        let line_start = self.absolute_line_start();
        let pos = self.ranges.to_absolute(self.line_start + base, false);
        if !cursor.move_to(self.input, pos, line_start) || !cursor.matches(self.block.hash) {
            return false;
        }
        let taken = cursor.take_nodes(self);
        if taken == 0 {
            return false;
        }
        trace!("reused {taken} bytes at {line_start}");
        self.line_start += taken;
        if self.line_start < self.to {
            self.line_start += 1;
        } else {
            self.at_end = true;
        }
        self.read_line();
        true
    }

    fn finish_leaf(&mut self, leaf: LeafBlock, parsers: Vec<Box<dyn LeafBlockParser>>) {
        for mut parser in parsers {
            if parser.finish(self, &leaf) {
                return;
            }
        }
        let inline = self.parse_inline(&leaf.content, leaf.start);
        let end = leaf.end();
        let children = inject_marks(inline, leaf.marks);
        self.add_element(Element::with_children(
            SyntaxKind::ACTION,
            leaf.start,
            end,
            children,
        ));
    }

    fn finish(&mut self) -> Tree {
        if let Some(tree) = &self.done {
            return tree.clone();
        }
        while !self.parents.is_empty() {
            self.finish_context();
        }
        let document =
            std::mem::replace(&mut self.block, CompositeBlock::document()).into_element(self.line_start);
        let mut buffer = TreeBuffer::default();
        document.write_to(&mut buffer);
        let events = buffer.len();
        let tree = Sink::new(self.input, &self.ranges, &self.reused).finish(buffer.events);
        debug!(
            "parse finished: {} bytes, {} events, {} reused subtrees",
            tree.len(),
            events,
            self.reused_count
        );
        self.done = Some(tree.clone());
        tree
    }
}

impl PartialParse for BlockContext<'_> {
    fn advance(&mut self) -> Option<Tree> {
        if self.done.is_some() {
            return Some(self.finish());
        }
        if self
            .stopped_at
            .is_some_and(|stop| self.absolute_line_start() > stop)
        {
            return Some(self.finish());
        }

        loop {
            // Close contexts the line no longer continues, replaying the
            // markers that belong before each close
            let mut mark = 0;
            loop {
                let closing = self.line.depth < self.depth();
                let limit = closing.then_some(self.block.end);
                while mark < self.line.markers.len()
                    && limit.is_none_or(|end| self.line.markers[mark].from < end)
                {
                    let marker = self.line.markers[mark].clone();
                    mark += 1;
                    self.add_element(marker);
                }
                if !closing {
                    break;
                }
                self.finish_context();
            }
            if !self.line.is_blank() {
                break;
            }
            if !self.next_line() {
                return Some(self.finish());
            }
        }

        if self.fragments.is_some() && self.reuse_fragment(self.line.base_pos) {
            return None;
        }

        let config = self.config;
        'dispatch: loop {
            for (name, recognize) in config.block_parsers.entries() {
                match recognize(self) {
                    BlockResult::Declined => {}
                    BlockResult::Handled => {
                        trace!("{name} handled line at {}", self.line_start);
                        return None;
                    }
                    BlockResult::Continue => {
                        trace!("{name} opened a context at {}", self.line_start);
                        self.line.forward();
                        continue 'dispatch;
                    }
                }
            }
            break;
        }

        if self.line.is_blank() {
            // Composite markup with nothing after it, e.g. a bare `+`
            self.next_line();
            return None;
        }

        let start = self.line_start + self.line.pos;
        let mut leaf = LeafBlock::new(start, self.line.text[self.line.pos..].to_string());
        let mut parsers: Vec<Box<dyn LeafBlockParser>> = config
            .leaf_parsers
            .iter()
            .filter_map(|factory| factory(self, &leaf))
            .collect();

        while self.next_line() {
            if self.line.is_blank() || self.line.depth < self.depth() {
                break;
            }
            if config.end_leaf.iter().any(|stop| stop(self, &leaf)) {
                break;
            }
            for parser in parsers.iter_mut() {
                if parser.next_line(self, &mut leaf) {
                    return None;
                }
            }
            leaf.content.push('\n');
            leaf.content.push_str(&self.line.scrub());
            leaf.marks.append(&mut self.line.markers);
        }
        self.finish_leaf(leaf, parsers);
        None
    }

    fn parsed_pos(&self) -> usize {
        self.absolute_line_start()
    }

    fn stop_at(&mut self, pos: usize) -> Result<(), ParseError> {
        if let Some(current) = self.stopped_at {
            if pos < current {
                warn!("refusing to move stop position from {current} back to {pos}");
                return Err(ParseError::StopMovedBackwards {
                    current,
                    requested: pos,
                });
            }
        }
        self.stopped_at = Some(pos);
        Ok(())
    }

    fn stopped_at(&self) -> Option<usize> {
        self.stopped_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParseInput;
    use pretty_assertions::assert_eq;

    #[test]
    fn context_hash_mixes_parent_kind_and_value() {
        let parent = CompositeBlock::create(SyntaxKind::DOCUMENT, 0, 0, 0, 0);
        let a = CompositeBlock::create(SyntaxKind::SECTION, 1, 0, parent.hash, 0);
        let b = CompositeBlock::create(SyntaxKind::SECTION, 2, 0, parent.hash, 0);
        let nested = CompositeBlock::create(SyntaxKind::SECTION, 1, 0, a.hash, 0);
        assert_ne!(a.hash, b.hash);
        assert_ne!(a.hash, nested.hash);
        let expected = parent
            .hash
            .wrapping_add(parent.hash << 8)
            .wrapping_add(SyntaxKind::SECTION as u32)
            .wrapping_add(1 << 4);
        assert_eq!(a.hash, expected);
    }

    #[test]
    fn advance_steps_until_done() {
        let config = ParserConfig::default();
        let mut parse = config.start_parse(ParseInput::new("A.\n\nB.\n"));
        let mut steps = 0;
        let tree = loop {
            steps += 1;
            if let Some(tree) = parse.advance() {
                break tree;
            }
        };
        assert_eq!(steps, 3);
        assert_eq!(tree.text(), "A.\n\nB.\n");
        assert_eq!(parse.parsed_pos(), 7);
    }

    #[test]
    fn stop_at_only_moves_later() {
        let config = ParserConfig::default();
        let mut parse = config.start_parse(ParseInput::new("A.\n"));
        parse.stop_at(10).unwrap();
        parse.stop_at(12).unwrap();
        assert_eq!(
            parse.stop_at(5),
            Err(ParseError::StopMovedBackwards {
                current: 12,
                requested: 5
            })
        );
        assert_eq!(parse.stopped_at(), Some(12));
    }

    #[test]
    fn stop_closes_open_contexts() {
        let config = ParserConfig::default();
        let text = "# One\nText.\n\n# Two\nMore.\n";
        let mut parse = config.start_parse(ParseInput::new(text));
        parse.stop_at(6).unwrap();
        let tree = loop {
            if let Some(tree) = parse.advance() {
                break tree;
            }
        };
        assert_eq!(tree.text(), text);
        assert_eq!(tree.nodes_of(SyntaxKind::SECTION).len(), 1);
    }
}
