//! The finished syntax tree.

use std::sync::Arc;

use rowan::GreenNode;

use crate::syntax_kind::{SyntaxKind, SyntaxNode};

/// Position and context hash of one direct child of a composite block.
///
/// Fragment reuse compares a node's recorded hash against the hash of the
/// block stack it would be reused in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRecord {
    pub kind: SyntaxKind,
    pub from: usize,
    pub to: usize,
    pub hash: u32,
}

/// An immutable, cheaply clonable syntax tree plus its block record table.
#[derive(Debug, Clone)]
pub struct Tree {
    green: GreenNode,
    records: Arc<[BlockRecord]>,
}

impl Tree {
    pub(crate) fn new(green: GreenNode, records: Vec<BlockRecord>) -> Self {
        Self {
            green,
            records: records.into(),
        }
    }

    pub fn green(&self) -> &GreenNode {
        &self.green
    }

    /// A fresh red tree rooted at the document node.
    pub fn syntax(&self) -> SyntaxNode {
        SyntaxNode::new_root(self.green.clone())
    }

    /// The full source text covered by the tree.
    pub fn text(&self) -> String {
        self.syntax().text().to_string()
    }

    pub fn len(&self) -> usize {
        u32::from(self.green.text_len()) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Block records sorted by start (outer blocks first).
    pub fn block_records(&self) -> &[BlockRecord] {
        &self.records
    }

    /// Recorded context hash of the block `kind` spanning `from..to`.
    pub fn context_hash(&self, kind: SyntaxKind, from: usize, to: usize) -> Option<u32> {
        let start = self.records.partition_point(|r| r.from < from);
        self.records[start..]
            .iter()
            .take_while(|r| r.from == from)
            .find(|r| r.kind == kind && r.to == to)
            .map(|r| r.hash)
    }

    /// Records strictly inside `from..to`, excluding the `kind` node spanning
    /// exactly that range, with offsets relative to `from`.
    pub(crate) fn records_within(
        &self,
        kind: SyntaxKind,
        from: usize,
        to: usize,
    ) -> Vec<BlockRecord> {
        let start = self.records.partition_point(|r| r.from < from);
        self.records[start..]
            .iter()
            .take_while(|r| r.from < to)
            .filter(|r| r.to <= to && !(r.kind == kind && r.from == from && r.to == to))
            .map(|r| BlockRecord {
                from: r.from - from,
                to: r.to - from,
                ..*r
            })
            .collect()
    }

    /// All nodes of the given kind in document order.
    pub fn nodes_of(&self, kind: SyntaxKind) -> Vec<SyntaxNode> {
        self.syntax()
            .descendants()
            .filter(|node| node.kind() == kind)
            .collect()
    }

    /// The innermost node containing `pos`.
    pub fn node_at(&self, pos: usize) -> SyntaxNode {
        let mut node = self.syntax();
        loop {
            let child = node.children().find(|child| {
                let range = child.text_range();
                usize::from(range.start()) <= pos && pos < usize::from(range.end())
            });
            match child {
                Some(child) => node = child,
                None => return node,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;
    use pretty_assertions::assert_eq;

    #[test]
    fn node_at_finds_innermost() {
        let tree = parse("# Start\nJohn: Hello.\n");
        let node = tree.node_at(9);
        assert_eq!(node.kind(), SyntaxKind::CHARACTER);
        assert_eq!(tree.node_at(2).kind(), SyntaxKind::SECTION_HEADING);
    }

    #[test]
    fn nodes_of_returns_document_order() {
        let tree = parse("-> A\n\n-> B\n");
        let jumps: Vec<_> = tree
            .nodes_of(SyntaxKind::JUMP)
            .iter()
            .map(|node| node.text().to_string())
            .collect();
        assert_eq!(jumps, vec!["-> A".to_string(), "-> B".to_string()]);
    }

    #[test]
    fn every_composite_child_has_a_record() {
        let tree = parse("# A\nText.\n\n## B\n-> A\n");
        let kinds: Vec<_> = tree.block_records().iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SyntaxKind::SECTION,
                SyntaxKind::SECTION_HEADING,
                SyntaxKind::ACTION,
                SyntaxKind::SECTION,
                SyntaxKind::SECTION_HEADING,
                SyntaxKind::JUMP,
            ]
        );
    }

    #[test]
    fn context_hash_lookup() {
        let tree = parse("Text.\n");
        let record = tree.block_records()[0];
        assert_eq!(
            tree.context_hash(record.kind, record.from, record.to),
            Some(record.hash)
        );
        assert_eq!(tree.context_hash(SyntaxKind::SCENE, 0, 5), None);
    }
}
