//! Token-level structure of definition, import and logic lines.
//!
//! Statement lines are split into sub-tokens by the [`lexer`](crate::lexer)
//! and grouped into small nodes (`DECLARATION`, `EXPRESSION`, ...). Anything
//! that does not fit the expected shape is wrapped in an `ERROR` node so the
//! line stays lossless.

use crate::lexer::lex_with_spans;
use crate::parser::element::Element;
use crate::syntax_kind::SyntaxKind;

const CONDITION_KEYWORDS: [&str; 4] = ["if", "elif", "else", "end"];
const ASSIGN_OPERATORS: [&str; 5] = ["=", "+=", "-=", "*=", "/="];

/// Non-whitespace sub-tokens of `text`, positioned at `offset`.
struct Tokens<'t> {
    items: Vec<(SyntaxKind, &'t str, usize, usize)>,
    pos: usize,
}

impl<'t> Tokens<'t> {
    fn new(text: &'t str, offset: usize) -> Self {
        let items = lex_with_spans(text)
            .into_iter()
            .filter(|(token, _)| token.kind != SyntaxKind::WHITESPACE)
            .map(|(token, span)| (token.kind, token.text, offset + span.start, offset + span.end))
            .collect();
        Self { items, pos: 0 }
    }

    fn peek(&self) -> Option<(SyntaxKind, &'t str)> {
        self.items.get(self.pos).map(|&(kind, text, _, _)| (kind, text))
    }

    fn at(&self, kind: SyntaxKind, text: &str) -> bool {
        self.peek() == Some((kind, text))
    }

    fn bump_as(&mut self, kind: SyntaxKind) -> Option<Element> {
        let &(_, _, from, to) = self.items.get(self.pos)?;
        self.pos += 1;
        Some(Element::new(kind, from, to))
    }

    fn bump(&mut self) -> Option<Element> {
        let kind = self.peek()?.0;
        self.bump_as(kind)
    }

    /// Take tokens while `pred` holds.
    fn take_while(&mut self, pred: impl Fn(SyntaxKind, &str) -> bool) -> Vec<Element> {
        let mut taken = Vec::new();
        while let Some((kind, text)) = self.peek() {
            if !pred(kind, text) {
                break;
            }
            taken.extend(self.bump());
        }
        taken
    }

    fn rest(&mut self) -> Vec<Element> {
        self.take_while(|_, _| true)
    }
}

/// Group `tokens` under a node of `kind`, or nothing when empty.
fn node(kind: SyntaxKind, tokens: Vec<Element>) -> Option<Element> {
    let from = tokens.first()?.from;
    let to = tokens.last()?.to;
    Some(Element::with_children(kind, from, to, tokens))
}

/// `name` or `type.name` (or a deeper dotted path).
fn dotted_path(tokens: &mut Tokens<'_>) -> Vec<Element> {
    let mut path = Vec::new();
    let mut want_ident = true;
    while let Some((kind, _)) = tokens.peek() {
        let expected = if want_ident {
            SyntaxKind::IDENT
        } else {
            SyntaxKind::DOT
        };
        if kind != expected {
            break;
        }
        path.extend(tokens.bump());
        want_ident = !want_ident;
    }
    path
}

/// Children of a `define [type.]name[: Parent] [= expr]` header line.
pub fn define_header(text: &str, offset: usize) -> Vec<Element> {
    let mut tokens = Tokens::new(text, offset);
    let mut children = Vec::new();
    children.extend(tokens.bump_as(SyntaxKind::KEYWORD));

    children.extend(node(SyntaxKind::DECLARATION, dotted_path(&mut tokens)));
    children.extend(node(
        SyntaxKind::ERROR,
        tokens.take_while(|kind, text| {
            kind != SyntaxKind::COLON && !(kind == SyntaxKind::OPERATOR && text == "=")
        }),
    ));

    if tokens.at(SyntaxKind::COLON, ":") {
        children.extend(tokens.bump());
        children.extend(node(SyntaxKind::TYPE_ANNOTATION, dotted_path(&mut tokens)));
    }
    if tokens.at(SyntaxKind::OPERATOR, "=") {
        children.extend(tokens.bump());
        children.extend(node(SyntaxKind::EXPRESSION, tokens.rest()));
    }
    children.extend(node(SyntaxKind::ERROR, tokens.rest()));
    children
}

/// A `path = expr` field line inside a definition.
pub fn struct_field(text: &str, offset: usize) -> Option<Element> {
    let mut tokens = Tokens::new(text, offset);
    let mut children = Vec::new();
    children.extend(node(SyntaxKind::FIELD_PATH, dotted_path(&mut tokens)));
    if tokens.at(SyntaxKind::OPERATOR, "=") {
        children.extend(tokens.bump());
        children.extend(node(SyntaxKind::EXPRESSION, tokens.rest()));
    }
    children.extend(node(SyntaxKind::ERROR, tokens.rest()));
    let from = children.first()?.from;
    let to = children.last()?.to;
    Some(Element::with_children(SyntaxKind::STRUCT_FIELD, from, to, children))
}

/// Children of an `import type.name from "path"` line.
pub fn import(text: &str, offset: usize) -> Vec<Element> {
    let mut tokens = Tokens::new(text, offset);
    let mut children = Vec::new();
    children.extend(tokens.bump_as(SyntaxKind::KEYWORD));
    children.extend(node(SyntaxKind::DECLARATION, dotted_path(&mut tokens)));
    children.extend(node(
        SyntaxKind::ERROR,
        tokens.take_while(|kind, text| !(kind == SyntaxKind::IDENT && text == "from")),
    ));
    if tokens.at(SyntaxKind::IDENT, "from") {
        children.extend(tokens.bump_as(SyntaxKind::KEYWORD));
        if tokens.peek().is_some_and(|(kind, _)| kind == SyntaxKind::STRING) {
            children.extend(tokens.bump());
        }
    }
    children.extend(node(SyntaxKind::ERROR, tokens.rest()));
    children
}

/// A `~ ...` logic line: a `CONDITION` or an `ASSIGN`.
///
/// `text` starts at the `~`.
pub fn logic(text: &str, offset: usize) -> Element {
    let mark = Element::new(SyntaxKind::LOGIC_MARK, offset, offset + 1);
    let mut tokens = Tokens::new(&text[1..], offset + 1);
    let mut children = vec![mark];

    let is_condition = tokens
        .peek()
        .is_some_and(|(kind, text)| kind == SyntaxKind::IDENT && CONDITION_KEYWORDS.contains(&text));
    let kind = if is_condition {
        children.extend(tokens.bump_as(SyntaxKind::KEYWORD));
        children.extend(node(SyntaxKind::EXPRESSION, tokens.rest()));
        SyntaxKind::CONDITION
    } else {
        let target = tokens.take_while(|kind, text| {
            !(kind == SyntaxKind::OPERATOR && ASSIGN_OPERATORS.contains(&text))
        });
        children.extend(node(SyntaxKind::ASSIGN_TARGET, target));
        if tokens.peek().is_some() {
            children.extend(tokens.bump());
            children.extend(node(SyntaxKind::EXPRESSION, tokens.rest()));
        }
        SyntaxKind::ASSIGN
    };

    let to = children.last().map_or(offset + 1, |last| last.to);
    Element::with_children(kind, offset, to, children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::element::TreeChild;
    use pretty_assertions::assert_eq;

    fn shape(elements: &[Element]) -> Vec<(SyntaxKind, usize, usize)> {
        elements.iter().map(|e| (e.kind, e.from, e.to)).collect()
    }

    fn child_kinds(element: &Element) -> Vec<SyntaxKind> {
        element
            .children
            .iter()
            .filter_map(|child| match child {
                TreeChild::Element(e) => Some(e.kind),
                TreeChild::Reused { .. } => None,
            })
            .collect()
    }

    #[test]
    fn define_with_parent_and_value() {
        let children = define_header("define character.john: hero = 1", 10);
        assert_eq!(
            shape(&children),
            vec![
                (SyntaxKind::KEYWORD, 10, 16),
                (SyntaxKind::DECLARATION, 17, 31),
                (SyntaxKind::COLON, 31, 32),
                (SyntaxKind::TYPE_ANNOTATION, 33, 37),
                (SyntaxKind::OPERATOR, 38, 39),
                (SyntaxKind::EXPRESSION, 40, 41),
            ]
        );
    }

    #[test]
    fn define_struct_header_only() {
        let children = define_header("define T:", 0);
        assert_eq!(
            shape(&children),
            vec![
                (SyntaxKind::KEYWORD, 0, 6),
                (SyntaxKind::DECLARATION, 7, 8),
                (SyntaxKind::COLON, 8, 9),
            ]
        );
    }

    #[test]
    fn define_garbage_is_an_error_node() {
        let children = define_header("define 5 x", 0);
        let kinds: Vec<_> = children.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![SyntaxKind::KEYWORD, SyntaxKind::ERROR]);
    }

    #[test]
    fn struct_field_line() {
        let field = struct_field("stats.hp = 10", 4).unwrap();
        assert_eq!((field.from, field.to), (4, 17));
        assert_eq!(
            child_kinds(&field),
            vec![
                SyntaxKind::FIELD_PATH,
                SyntaxKind::OPERATOR,
                SyntaxKind::EXPRESSION
            ]
        );
    }

    #[test]
    fn import_line() {
        let children = import("import image.logo from \"logo.png\"", 0);
        let kinds: Vec<_> = children.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SyntaxKind::KEYWORD,
                SyntaxKind::DECLARATION,
                SyntaxKind::KEYWORD,
                SyntaxKind::STRING
            ]
        );
    }

    #[test]
    fn logic_assignment() {
        let assign = logic("~ gold += 5", 0);
        assert_eq!(assign.kind, SyntaxKind::ASSIGN);
        assert_eq!((assign.from, assign.to), (0, 11));
        assert_eq!(
            child_kinds(&assign),
            vec![
                SyntaxKind::LOGIC_MARK,
                SyntaxKind::ASSIGN_TARGET,
                SyntaxKind::OPERATOR,
                SyntaxKind::EXPRESSION
            ]
        );
    }

    #[test]
    fn logic_condition() {
        let condition = logic("~ if gold > 3", 0);
        assert_eq!(condition.kind, SyntaxKind::CONDITION);
        assert_eq!(
            child_kinds(&condition),
            vec![
                SyntaxKind::LOGIC_MARK,
                SyntaxKind::KEYWORD,
                SyntaxKind::EXPRESSION
            ]
        );
        let end = logic("~ end", 0);
        assert_eq!(
            child_kinds(&end),
            vec![SyntaxKind::LOGIC_MARK, SyntaxKind::KEYWORD]
        );
    }

    #[test]
    fn logic_without_operator_keeps_target() {
        let assign = logic("~ gold", 0);
        assert_eq!(assign.kind, SyntaxKind::ASSIGN);
        assert_eq!(
            child_kinds(&assign),
            vec![SyntaxKind::LOGIC_MARK, SyntaxKind::ASSIGN_TARGET]
        );
    }
}
