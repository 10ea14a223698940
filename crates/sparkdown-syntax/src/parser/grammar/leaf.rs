//! The dialogue leaf parser.
//!
//! A leaf whose first line starts with a character header (`Name:`,
//! `Name (V.O.):`) is claimed as dialogue. The header may be followed by
//! spoken text on the same line; every further line of the leaf is either a
//! `(parenthetical)` or another spoken line.

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

use crate::parser::block::{BlockContext, LeafBlock, LeafBlockParser};
use crate::parser::element::{Element, inject_marks};
use crate::parser::line::{skip_space, skip_space_back};
use crate::syntax_kind::SyntaxKind;

fn header_regex() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| {
        Regex::new(
            r"^(\p{L}[\p{L}\p{N}_'.\-]*(?: [\p{L}\p{N}_'.\-]+){0,2})(?:[ \t]*(\([^()\n]*\)))?[ \t]*(:)(?:[ \t]|$)",
        )
        .expect("Invalid dialogue header regex")
    })
}

/// Byte ranges of a character header, relative to the line.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Header {
    name: Range<usize>,
    extension: Option<Range<usize>>,
    colon: usize,
}

fn parse_header(line: &str) -> Option<Header> {
    let caps = header_regex().captures(line)?;
    Some(Header {
        name: caps.get(1)?.range(),
        extension: caps.get(2).map(|m| m.range()),
        colon: caps.get(3)?.start(),
    })
}

struct DialogueParser {
    header: Header,
}

impl DialogueParser {
    fn character(&self, start: usize) -> Element {
        let header = &self.header;
        let mut children = vec![Element::new(
            SyntaxKind::CHARACTER_NAME,
            start + header.name.start,
            start + header.name.end,
        )];
        if let Some(extension) = &header.extension {
            children.push(Element::new(
                SyntaxKind::CHARACTER_EXTENSION,
                start + extension.start,
                start + extension.end,
            ));
        }
        children.push(Element::new(
            SyntaxKind::COLON,
            start + header.colon,
            start + header.colon + 1,
        ));
        Element::with_children(
            SyntaxKind::CHARACTER,
            start + header.name.start,
            start + header.colon + 1,
            children,
        )
    }
}

impl LeafBlockParser for DialogueParser {
    fn next_line(&mut self, _cx: &mut BlockContext<'_>, _leaf: &mut LeafBlock) -> bool {
        false
    }

    fn finish(&mut self, cx: &mut BlockContext<'_>, leaf: &LeafBlock) -> bool {
        let start = leaf.start;
        let mut children = vec![self.character(start)];

        let mut line_start = 0;
        for (i, line) in leaf.content.split('\n').enumerate() {
            let skip = if i == 0 { self.header.colon + 1 } else { 0 };
            let from = skip_space(line, skip);
            let to = skip_space_back(line, line.len(), from);
            if from < to {
                let text = &line[from..to];
                let (from, to) = (start + line_start + from, start + line_start + to);
                if i > 0 && text.starts_with('(') && text.ends_with(')') {
                    children.push(Element::new(SyntaxKind::PARENTHETICAL, from, to));
                } else {
                    let inline = cx.parse_inline(text, from);
                    children.push(Element::with_children(
                        SyntaxKind::DIALOGUE_LINE,
                        from,
                        to,
                        inline,
                    ));
                }
            }
            line_start += line.len() + 1;
        }

        let children = inject_marks(children, leaf.marks.clone());
        cx.add_element(Element::with_children(
            SyntaxKind::DIALOGUE,
            start,
            leaf.end(),
            children,
        ));
        true
    }
}

/// Claim leaves that open with a character header.
pub fn dialogue(_cx: &BlockContext<'_>, leaf: &LeafBlock) -> Option<Box<dyn LeafBlockParser>> {
    let header = parse_header(&leaf.content)?;
    Some(Box::new(DialogueParser { header }))
}

/// A character header starts a new dialogue block.
pub fn ends_with_dialogue(cx: &BlockContext<'_>, _leaf: &LeafBlock) -> bool {
    parse_header(cx.line.rest()).is_some()
}
