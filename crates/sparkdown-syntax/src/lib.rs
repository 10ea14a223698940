//! # sparkdown-syntax
//!
//! An incremental, lossless syntax tree for Sparkdown screenplay scripts,
//! built on [Rowan] with a [Logos] lexer for statement lines.
//!
//! [Rowan]: https://docs.rs/rowan
//! [Logos]: https://docs.rs/logos
//!
//! ## Lossless Trees
//!
//! The tree preserves **every byte** of the script. Text that no construct
//! claims (spacing, newlines, unmatched delimiters) is kept as `WHITESPACE`,
//! `NEWLINE` and `TEXT` tokens, so `tree.text()` always equals the input.
//!
//! ## Architecture Overview
//!
//! ```text
//! Source Text → BlockContext → Elements → Events → Sink → Rowan Tree
//!                (line by line)  (+ inline)  (flat)   (GreenNodeBuilder)
//! ```
//!
//! ### 1. Block parsing ([`parser::block`])
//!
//! The script is consumed one line at a time. Chunks, sections, quotes and
//! choices are composite blocks kept on a stack; every other construct is
//! either consumed eagerly or collected into a leaf block (dialogue, action).
//!
//! ### 2. Inline parsing ([`parser::grammar::inline`])
//!
//! Leaf text is scanned for delimiters and inline elements, and delimiters
//! are resolved into nested emphasis, notes and interpolations.
//!
//! ### 3. Tree assembly ([`parser::sink`])
//!
//! Elements are flattened into events and built into a Rowan green tree.
//! Subtrees reused from an older tree are spliced in by reference.
//!
//! ### 4. Editing ([`edit`])
//!
//! [`ScriptBuffer`] keeps the text in a rope and reparses incrementally after
//! every edit.
//!
//! ## Module Structure
//!
//! ```text
//! sparkdown-syntax/
//! ├── lib.rs           # This file - public API and tree dumps
//! ├── syntax_kind.rs   # SyntaxKind enum (tokens + nodes) and Rowan integration
//! ├── lexer.rs         # Logos tokenizer for statement lines
//! ├── tree.rs          # Tree: green root plus block records
//! ├── edit.rs          # Rope-backed ScriptBuffer
//! └── parser/
//!     ├── mod.rs       # ParserConfig, Extension, parse()
//!     ├── block.rs     # BlockContext state machine
//!     ├── line.rs      # Per-line cursor
//!     ├── fragment.rs  # TreeFragment and FragmentCursor (reuse)
//!     ├── element.rs   # Elements and reused subtrees
//!     ├── event.rs     # Flat event buffer
//!     ├── sink.rs      # Events to Rowan GreenNode
//!     ├── registry.rs  # Named, ordered recognizer tables
//!     └── grammar/     # Block, leaf, inline and statement rules
//! ```
//!
//! ## Quick Start
//!
//! ```
//! use sparkdown_syntax::{parse, SyntaxKind};
//!
//! let tree = parse("# Start\nJohn: Hello.\n");
//!
//! // The tree preserves all text
//! assert_eq!(tree.text(), "# Start\nJohn: Hello.\n");
//!
//! // Navigate the tree structure
//! let section = &tree.nodes_of(SyntaxKind::SECTION)[0];
//! assert_eq!(section.children().count(), 2);
//! assert_eq!(tree.nodes_of(SyntaxKind::DIALOGUE).len(), 1);
//! ```

pub mod edit;
pub mod lexer;
pub mod parser;
pub mod syntax_kind;
pub mod tree;

pub use edit::{EditError, Reparse, ScriptBuffer};
pub use parser::{
    ChangedRange, Extension, ParseError, ParseInput, ParserConfig, PartialParse, TreeFragment,
    parse,
};
pub use syntax_kind::{ScriptLang, SyntaxElement, SyntaxKind, SyntaxNode, SyntaxToken};
pub use tree::{BlockRecord, Tree};

/// Indented `KIND@range` dump of a syntax tree, one node or token per line.
pub fn format_tree(node: &SyntaxNode) -> String {
    let mut lines = Vec::new();
    write_tree(node, 0, &mut lines);
    lines.join("\n")
}

fn write_tree(node: &SyntaxNode, indent: usize, lines: &mut Vec<String>) {
    let prefix = "  ".repeat(indent);
    lines.push(format!("{prefix}{:?}@{:?}", node.kind(), node.text_range()));
    for child in node.children_with_tokens() {
        match child {
            rowan::NodeOrToken::Node(n) => write_tree(&n, indent + 1, lines),
            rowan::NodeOrToken::Token(t) => lines.push(format!(
                "{prefix}  {:?}@{:?} {:?}",
                t.kind(),
                t.text_range(),
                t.text()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    #[test]
    fn snapshot_section_with_dialogue() {
        let tree = parse("# Start\nJohn: Hello.\n");
        assert_snapshot!(format_tree(&tree.syntax()), @r##"
        DOCUMENT@0..21
          SECTION@0..20
            SECTION_HEADING@0..7
              HEADING_MARK@0..1 "#"
              WHITESPACE@1..2 " "
              NAME@2..7 "Start"
            NEWLINE@7..8 "\n"
            DIALOGUE@8..20
              CHARACTER@8..13
                CHARACTER_NAME@8..12 "John"
                COLON@12..13 ":"
              WHITESPACE@13..14 " "
              DIALOGUE_LINE@14..20
                TEXT@14..20 "Hello."
          NEWLINE@20..21 "\n"
        "##);
    }

    #[test]
    fn snapshot_choice_with_divert() {
        let tree = parse("+ Go -> End\n");
        assert_snapshot!(format_tree(&tree.syntax()), @r#"
        DOCUMENT@0..12
          CHOICE_LIST@0..11
            CHOICE@0..11
              LIST_MARK@0..1 "+"
              WHITESPACE@1..2 " "
              ACTION@2..11
                TEXT@2..4 "Go"
                WHITESPACE@4..5 " "
                DIVERT@5..11
                  DIVERT_MARK@5..7 "->"
                  WHITESPACE@7..8 " "
                  NAME@8..11 "End"
          NEWLINE@11..12 "\n"
        "#);
    }

    #[test]
    fn snapshot_emphasis_in_action() {
        let tree = parse("A *big* day.");
        assert_snapshot!(format_tree(&tree.syntax()), @r#"
        DOCUMENT@0..12
          ACTION@0..12
            TEXT@0..1 "A"
            WHITESPACE@1..2 " "
            EMPHASIS@2..7
              EMPHASIS_MARK@2..3 "*"
              TEXT@3..6 "big"
              EMPHASIS_MARK@6..7 "*"
            WHITESPACE@7..8 " "
            TEXT@8..12 "day."
        "#);
    }

    #[test]
    fn format_tree_round_trips_text() {
        let input = "---\ntitle: Demo\n---\n% intro\n## Scene\n> quoted\n";
        let tree = parse(input);
        assert_eq!(tree.text(), input);
        assert!(format_tree(&tree.syntax()).starts_with("DOCUMENT@0..46"));
    }
}
