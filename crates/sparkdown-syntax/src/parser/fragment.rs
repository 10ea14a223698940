//! Incremental reparsing: retained ranges, tree fragments and the cursor
//! that splices unchanged subtrees of an older tree into a new parse.

use std::borrow::Cow;
use std::ops::Range;

use log::trace;
use rowan::{NodeOrToken, TextSize};

use super::block::BlockContext;
use super::element::{Element, ReusedNode};
use crate::syntax_kind::{SyntaxElement, SyntaxNode};
use crate::tree::Tree;

/// Fragments separated by less than this many unchanged bytes are dropped
/// by [`TreeFragment::apply_changes`].
pub const MIN_FRAGMENT_GAP: usize = 128;

/// Ordered, non-overlapping source ranges the parser reads.
///
/// Parse positions count only retained text ("relative"); tree positions
/// count every byte of the source ("absolute").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeMap {
    ranges: Vec<Range<usize>>,
}

impl RangeMap {
    /// Normalise `ranges` against a document of `len` bytes: clamp, sort,
    /// merge touching ranges and drop empty ones. No ranges means the whole
    /// document.
    pub fn new(ranges: &[Range<usize>], len: usize) -> Self {
        let mut sorted: Vec<Range<usize>> = ranges
            .iter()
            .map(|r| r.start.min(len)..r.end.min(len))
            .filter(|r| r.start < r.end)
            .collect();
        if sorted.is_empty() {
            return Self::full(len);
        }
        sorted.sort_by_key(|r| r.start);
        let mut merged: Vec<Range<usize>> = Vec::with_capacity(sorted.len());
        for range in sorted {
            match merged.last_mut() {
                Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
                _ => merged.push(range),
            }
        }
        Self { ranges: merged }
    }

    pub fn full(len: usize) -> Self {
        Self {
            ranges: vec![0..len],
        }
    }

    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    /// Number of retained bytes.
    pub fn visible_len(&self) -> usize {
        self.ranges.iter().map(|r| r.len()).sum()
    }

    /// Concatenated retained text.
    pub fn visible_text<'a>(&self, input: &'a str) -> Cow<'a, str> {
        match self.ranges.as_slice() {
            [only] if only.start == 0 && only.end == input.len() => Cow::Borrowed(input),
            ranges => Cow::Owned(ranges.iter().map(|r| &input[r.clone()]).collect()),
        }
    }

    pub fn to_relative(&self, abs: usize) -> usize {
        let mut rel = 0;
        for range in &self.ranges {
            if abs <= range.start {
                return rel;
            }
            if abs < range.end {
                return rel + abs - range.start;
            }
            rel += range.len();
        }
        rel
    }

    /// Absolute position of a relative one. At the seam between two ranges,
    /// `prefer_end` picks the end of the earlier range.
    pub fn to_absolute(&self, rel: usize, prefer_end: bool) -> usize {
        let mut rel = rel;
        for range in &self.ranges {
            let len = range.len();
            if rel < len || (rel == len && prefer_end) {
                return range.start + rel;
            }
            rel -= len;
        }
        self.ranges.last().map_or(0, |r| r.end)
    }

    /// End of the retained range containing `abs`.
    pub fn range_end(&self, abs: usize) -> usize {
        self.ranges
            .iter()
            .find(|r| r.start <= abs && abs <= r.end)
            .map_or(abs, |r| r.end)
    }

    /// Split `from..to` into retained and skipped segments.
    pub fn segments(&self, from: usize, to: usize) -> Vec<(Range<usize>, bool)> {
        let mut segments = Vec::new();
        let mut cursor = from;
        for range in &self.ranges {
            if range.end <= cursor {
                continue;
            }
            if range.start >= to {
                break;
            }
            if cursor < range.start {
                segments.push((cursor..range.start, false));
                cursor = range.start;
            }
            let end = range.end.min(to);
            segments.push((cursor..end, true));
            cursor = end;
        }
        if cursor < to {
            segments.push((cursor..to, false));
        }
        segments
    }
}

/// A replaced span: `from_a..to_a` in the old document became
/// `from_b..to_b` in the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangedRange {
    pub from_a: usize,
    pub to_a: usize,
    pub from_b: usize,
    pub to_b: usize,
}

/// A piece of an older tree that is still valid for `from..to` of the new
/// document.
#[derive(Debug, Clone)]
pub struct TreeFragment {
    pub from: usize,
    pub to: usize,
    /// Tree position minus document position.
    pub offset: isize,
    pub tree: Tree,
    /// Cut at its start by a change.
    pub open_start: bool,
    /// Cut at its end by a change.
    pub open_end: bool,
}

impl TreeFragment {
    /// Fragments for a freshly parsed tree, keeping older fragments that
    /// extend past it.
    pub fn add_tree(tree: Tree, fragments: &[TreeFragment], partial: bool) -> Vec<TreeFragment> {
        let len = tree.len();
        let mut result = vec![TreeFragment {
            from: 0,
            to: len,
            offset: 0,
            tree,
            open_start: false,
            open_end: partial,
        }];
        result.extend(fragments.iter().filter(|f| f.to > len).cloned());
        result
    }

    /// Cut `fragments` at `changes` (sorted, in old-document order) and move
    /// them into new-document coordinates.
    pub fn apply_changes(
        fragments: &[TreeFragment],
        changes: &[ChangedRange],
        min_gap: usize,
    ) -> Vec<TreeFragment> {
        if changes.is_empty() {
            return fragments.to_vec();
        }
        let mut result = Vec::new();
        let mut next_f = 0;
        let mut pos = 0usize;
        let mut off = 0isize;
        for c_i in 0..=changes.len() {
            let next_c = changes.get(c_i);
            let next_pos = next_c.map_or(usize::MAX, |c| c.from_a);
            if next_pos.saturating_sub(pos) >= min_gap {
                while let Some(fragment) = fragments.get(next_f) {
                    if fragment.from >= next_pos {
                        break;
                    }
                    let cut = if pos >= fragment.from || next_pos <= fragment.to || off != 0 {
                        let f_from = fragment.from.max(pos) as isize - off;
                        let f_to = fragment.to.min(next_pos) as isize - off;
                        (f_from < f_to).then(|| TreeFragment {
                            from: f_from as usize,
                            to: f_to as usize,
                            offset: fragment.offset + off,
                            tree: fragment.tree.clone(),
                            open_start: c_i > 0,
                            open_end: next_c.is_some(),
                        })
                    } else {
                        Some(fragment.clone())
                    };
                    result.extend(cut);
                    if fragment.to > next_pos {
                        break;
                    }
                    next_f += 1;
                }
            }
            let Some(change) = next_c else {
                break;
            };
            pos = change.to_a;
            off = change.to_a as isize - change.to_b as isize;
        }
        result
    }
}

/// Walks fragments in step with the block parser.
pub struct FragmentCursor {
    fragments: Vec<TreeFragment>,
    index: usize,
    /// Position of the last newline inside the current fragment.
    fragment_end: Option<usize>,
    cursor: Option<SyntaxElement>,
}

impl FragmentCursor {
    pub fn new(fragments: Vec<TreeFragment>) -> Self {
        Self {
            fragments,
            index: 0,
            fragment_end: None,
            cursor: None,
        }
    }

    fn fragment(&self) -> Option<&TreeFragment> {
        self.fragments.get(self.index)
    }

    fn next_fragment(&mut self) {
        self.index += 1;
        self.fragment_end = None;
        self.cursor = None;
    }

    /// Position the cursor on the outermost old node starting at or after
    /// `pos`. Returns false when no fragment covering `line_start` applies.
    pub fn move_to(&mut self, input: &str, pos: usize, line_start: usize) -> bool {
        while self.fragment().is_some_and(|f| f.to <= pos) {
            self.next_fragment();
        }
        let Some(fragment) = self.fragment() else {
            return false;
        };
        if fragment.from > pos.saturating_sub(1) {
            return false;
        }
        let (from, to, offset) = (fragment.from, fragment.to, fragment.offset);
        let root = fragment.tree.syntax();
        if self.fragment_end.is_none() {
            let end = input[..to.min(input.len())].rfind('\n').unwrap_or(0);
            self.fragment_end = Some(end);
        }

        let Ok(r_pos) = usize::try_from(pos as isize + offset) else {
            return false;
        };
        let mut current = match self.cursor.take() {
            Some(current) => current,
            None => match root.first_child_or_token() {
                Some(first) => first,
                None => return false,
            },
        };
        while end_of(&current) <= r_pos {
            match current.parent() {
                Some(parent) => current = NodeOrToken::Node(parent),
                None => return false,
            }
        }
        loop {
            if start_of(&current) >= r_pos {
                self.cursor = Some(current);
                return from <= line_start;
            }
            let NodeOrToken::Node(node) = &current else {
                return false;
            };
            match child_after(node, r_pos) {
                Some(child) => current = child,
                None => return false,
            }
        }
    }

    /// Whether the node under the cursor was parsed in a context with `hash`.
    pub fn matches(&self, hash: u32) -> bool {
        let (Some(fragment), Some(NodeOrToken::Node(node))) = (self.fragment(), &self.cursor)
        else {
            return false;
        };
        let range = node.text_range();
        fragment.tree.context_hash(
            node.kind(),
            range.start().into(),
            range.end().into(),
        ) == Some(hash)
    }

    /// Add the run of whole blocks starting at the cursor to the open block
    /// of `cx`. Returns the number of source bytes taken.
    pub fn take_nodes(&mut self, cx: &mut BlockContext<'_>) -> usize {
        let (Some(fragment), Some(mut current)) = (self.fragment(), self.cursor.clone()) else {
            return 0;
        };
        let off = fragment.offset;
        let frag_end = self
            .fragment_end
            .unwrap_or(0)
            .saturating_sub(usize::from(fragment.open_end));
        let start = cx.absolute_line_start();
        let range_end = cx.ranges().range_end(start);
        let mut end = start;
        let mut keep = cx.block().children_len();

        loop {
            let doc_from = (start_of(&current) as isize - off) as usize;
            let doc_to = (end_of(&current) as isize - off) as usize;
            if doc_to > frag_end || doc_to > range_end {
                break;
            }
            let rel_from = cx.ranges().to_relative(doc_from);
            let rel_to = rel_from + (doc_to - doc_from);
            match &current {
                NodeOrToken::Node(node) => {
                    let kind = node.kind();
                    let records = fragment.tree.records_within(
                        kind,
                        start_of(&current),
                        end_of(&current),
                    );
                    cx.add_reused(
                        ReusedNode {
                            green: node.green().into_owned(),
                            kind,
                            records,
                        },
                        rel_from,
                        rel_to,
                    );
                    if !kind.may_continue_past_blank() {
                        end = doc_to;
                        keep = cx.block().children_len();
                    }
                    trace!("reusing {kind:?} at {doc_from}..{doc_to}");
                }
                NodeOrToken::Token(token) if !token.kind().is_filler() => {
                    cx.add_element(Element::new(token.kind(), rel_from, rel_to));
                }
                NodeOrToken::Token(_) => {}
            }
            match current.next_sibling_or_token() {
                Some(next) => current = next,
                None => break,
            }
        }
        cx.truncate_children(keep);
        end - start
    }
}

fn start_of(element: &SyntaxElement) -> usize {
    element.text_range().start().into()
}

fn end_of(element: &SyntaxElement) -> usize {
    element.text_range().end().into()
}

fn child_after(node: &SyntaxNode, pos: usize) -> Option<SyntaxElement> {
    let pos = TextSize::try_from(pos).ok()?;
    node.children_with_tokens()
        .find(|child| child.text_range().end() > pos)
}
