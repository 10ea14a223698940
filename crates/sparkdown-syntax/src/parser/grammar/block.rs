//! Block recognizers, end-leaf predicates and skip-markup handlers.
//!
//! Composite constructs (chunks, sections, quotes, choices) open a context
//! and either return [`BlockResult::Handled`] after adding their heading or
//! [`BlockResult::Continue`] so the rest of the line is dispatched again.
//! Everything else is consumed eagerly: the recognizer builds the element,
//! moves to the next line, and returns [`BlockResult::Handled`].

use std::sync::OnceLock;

use regex::Regex;

use super::statement;
use crate::parser::block::{BlockContext, BlockResult, LeafBlock};
use crate::parser::element::Element;
use crate::parser::line::{Line, skip_space, skip_space_back};
use crate::syntax_kind::SyntaxKind;

const MAX_HEADING_LEVEL: usize = 6;

fn scene_regex() -> &'static Regex {
    static SCENE: OnceLock<Regex> = OnceLock::new();
    SCENE.get_or_init(|| {
        Regex::new(r"(?i)^(?:INT\./EXT|INT/EXT|I/E|INT|EXT|EST)(?:[.\s]|$)")
            .expect("Invalid scene regex")
    })
}

fn transition_regex() -> &'static Regex {
    static TRANSITION: OnceLock<Regex> = OnceLock::new();
    TRANSITION.get_or_init(|| {
        Regex::new(r"^(?:[A-Z0-9][A-Z0-9 '.\-]* TO:|FADE OUT\.|FADE IN:|FADE TO BLACK\.)$")
            .expect("Invalid transition regex")
    })
}

fn checkpoint_line_regex() -> &'static Regex {
    static CHECKPOINT: OnceLock<Regex> = OnceLock::new();
    CHECKPOINT.get_or_init(|| Regex::new(r"^\^[A-Za-z0-9_]+$").expect("Invalid checkpoint regex"))
}

// Line tests

fn is_space_or_end(text: &str, at: usize) -> bool {
    text[at..]
        .chars()
        .next()
        .is_none_or(|c| c == ' ' || c == '\t')
}

/// `% name`
fn is_chunk_heading(line: &Line) -> bool {
    line.next == Some('%')
        && is_space_or_end(&line.text, line.pos + 1)
        && skip_space(&line.text, line.pos + 1) < line.text.len()
}

/// Level of a `#`..`######` heading.
fn heading_level(line: &Line) -> Option<usize> {
    let level = line.rest().bytes().take_while(|&b| b == b'#').count();
    if level == 0 || level > MAX_HEADING_LEVEL {
        return None;
    }
    let after = line.pos + level;
    let has_name = skip_space(&line.text, after) < line.text.len();
    (is_space_or_end(&line.text, after) && after < line.text.len() && has_name).then_some(level)
}

fn is_fence(line: &Line) -> bool {
    line.pos == 0 && line.text.trim_end() == "---"
}

/// Byte length of `>` markup (with its optional space).
fn quote_markup(line: &Line) -> Option<usize> {
    if line.next != Some('>') {
        return None;
    }
    Some(if line.text[line.pos + 1..].starts_with(' ') {
        2
    } else {
        1
    })
}

/// `+` or `*` followed by a space or the end of the line.
fn choice_marker(line: &Line) -> Option<char> {
    let marker = line.next.filter(|&c| c == '+' || c == '*')?;
    is_space_or_end(&line.text, line.pos + 1).then_some(marker)
}

fn starts_with_keyword(line: &Line, keyword: &str) -> bool {
    let rest = line.rest();
    rest.starts_with(keyword) && is_space_or_end(rest, keyword.len())
}

fn is_jump(line: &Line) -> bool {
    line.rest().starts_with("->")
}

fn is_checkpoint_line(line: &Line) -> bool {
    checkpoint_line_regex().is_match(line.rest().trim_end())
}

/// Length of a forced `.` scene prefix, or 0 for a recognised scene keyword.
fn scene_prefix(line: &Line) -> Option<usize> {
    let rest = line.rest();
    if scene_regex().is_match(rest) {
        return Some(0);
    }
    let mut chars = rest.chars();
    (chars.next() == Some('.') && chars.next().is_some_and(char::is_alphanumeric)).then_some(1)
}

fn is_transition(line: &Line) -> bool {
    transition_regex().is_match(line.rest().trim_end())
}

/// Mark token plus trimmed `NAME` for a heading-like line, spanning to the
/// end of the line.
fn heading(cx: &BlockContext<'_>, kind: SyntaxKind, mark: SyntaxKind, mark_len: usize) -> Element {
    let base = cx.line_start();
    let text = &cx.line.text;
    let pos = cx.line.pos;
    let name_from = skip_space(text, pos + mark_len);
    let name_to = skip_space_back(text, text.len(), name_from);
    let mut children = vec![Element::new(mark, base + pos, base + pos + mark_len)];
    if name_to > name_from {
        children.push(Element::new(SyntaxKind::NAME, base + name_from, base + name_to));
    }
    Element::with_children(kind, base + pos, base + text.len(), children)
}

// Core recognizers

/// `---` fenced `key: value` block on the first line of the document.
pub fn front_matter(cx: &mut BlockContext<'_>) -> BlockResult {
    if cx.line_start() != 0 || cx.block().kind != SyntaxKind::DOCUMENT || !is_fence(&cx.line) {
        return BlockResult::Declined;
    }
    let closed = cx
        .text_after_line()
        .split('\n')
        .any(|line| line.trim_end() == "---");
    if !closed {
        return BlockResult::Declined;
    }

    let mut children = vec![Element::new(SyntaxKind::FENCE_MARK, 0, 3)];
    let mut to = cx.line_end();
    while cx.next_line() {
        let base = cx.line_start();
        to = cx.line_end();
        if is_fence(&cx.line) {
            children.push(Element::new(SyntaxKind::FENCE_MARK, base, base + 3));
            cx.next_line();
            break;
        }
        children.extend(front_matter_field(&cx.line.text, base));
    }
    cx.add_element(Element::with_children(SyntaxKind::FRONT_MATTER, 0, to, children));
    BlockResult::Handled
}

/// `key: value`, or an indented continuation value for the previous key.
fn front_matter_field(text: &str, base: usize) -> Option<Element> {
    let from = skip_space(text, 0);
    let to = skip_space_back(text, text.len(), from);
    if from == to {
        return None;
    }
    let key_end = (from == 0)
        .then(|| text.find(':'))
        .flatten()
        .filter(|&colon| colon > 0);
    let children = match key_end {
        Some(colon) => {
            let key_to = skip_space_back(text, colon, 0);
            let mut children = vec![
                Element::new(SyntaxKind::FIELD_KEY, base, base + key_to),
                Element::new(SyntaxKind::COLON, base + colon, base + colon + 1),
            ];
            let value_from = skip_space(text, colon + 1);
            if value_from < to {
                children.push(Element::new(SyntaxKind::FIELD_VALUE, base + value_from, base + to));
            }
            children
        }
        None => vec![Element::new(SyntaxKind::FIELD_VALUE, base + from, base + to)],
    };
    Some(Element::with_children(
        SyntaxKind::FRONT_MATTER_FIELD,
        base + from,
        base + to,
        children,
    ))
}

/// `% name` opens a chunk.
pub fn chunk(cx: &mut BlockContext<'_>) -> BlockResult {
    if !cx.at_structure_level() || !is_chunk_heading(&cx.line) {
        return BlockResult::Declined;
    }
    let pos = cx.line.pos;
    cx.start_context(SyntaxKind::CHUNK, pos, 0);
    let heading = heading(cx, SyntaxKind::CHUNK_HEADING, SyntaxKind::CHUNK_MARK, 1);
    cx.add_element(heading);
    cx.next_line();
    BlockResult::Handled
}

/// `# name` opens a section of the heading's level.
pub fn section(cx: &mut BlockContext<'_>) -> BlockResult {
    if !cx.at_structure_level() {
        return BlockResult::Declined;
    }
    let Some(level) = heading_level(&cx.line) else {
        return BlockResult::Declined;
    };
    let pos = cx.line.pos;
    cx.start_context(SyntaxKind::SECTION, pos, level as u32);
    let heading = heading(cx, SyntaxKind::SECTION_HEADING, SyntaxKind::HEADING_MARK, level);
    cx.add_element(heading);
    cx.next_line();
    BlockResult::Handled
}

pub fn block_quote(cx: &mut BlockContext<'_>) -> BlockResult {
    let Some(size) = quote_markup(&cx.line) else {
        return BlockResult::Declined;
    };
    let pos = cx.line.pos;
    let from = cx.line_start() + pos;
    cx.start_context(SyntaxKind::BLOCK_QUOTE, pos, 0);
    cx.add_token(SyntaxKind::QUOTE_MARK, from, from + 1);
    cx.line.move_base(pos + size);
    BlockResult::Continue
}

/// Column where a choice's content starts.
fn list_indent(line: &Line, pos: usize) -> usize {
    let indent_after = line.count_indent(pos, line.pos, line.indent);
    let indented = line.count_indent(skip_space(&line.text, pos), pos, indent_after);
    if indented >= indent_after + 5 {
        indent_after + 1
    } else {
        indented
    }
}

/// `+ text` or `* text` opens a choice (and its list, when needed).
pub fn choice_list(cx: &mut BlockContext<'_>) -> BlockResult {
    let Some(marker) = choice_marker(&cx.line) else {
        return BlockResult::Declined;
    };
    if cx.block().kind != SyntaxKind::CHOICE_LIST {
        let base = cx.line.base_pos;
        cx.start_context(SyntaxKind::CHOICE_LIST, base, marker as u32);
    }
    let pos = cx.line.pos;
    let new_base = list_indent(&cx.line, pos + 1);
    let (base_pos, base_indent) = (cx.line.base_pos, cx.line.base_indent);
    cx.start_context(SyntaxKind::CHOICE, base_pos, (new_base - base_indent) as u32);
    let from = cx.line_start() + pos;
    cx.add_token(SyntaxKind::LIST_MARK, from, from + 1);
    cx.line.move_base_column(new_base);
    BlockResult::Continue
}

// Script recognizers

/// `define` header plus its indented `path = expr` field lines.
pub fn define(cx: &mut BlockContext<'_>) -> BlockResult {
    if !starts_with_keyword(&cx.line, "define") {
        return BlockResult::Declined;
    }
    let pos = cx.line.pos;
    let from = cx.line_start() + pos;
    let header_indent = cx.line.indent;
    let mut children = statement::define_header(&cx.line.text[pos..], from);
    let mut to = cx.line_end();

    while cx.next_line() {
        if cx.line.is_blank() || cx.line.depth < cx.depth() || cx.line.indent <= header_indent {
            break;
        }
        children.append(&mut cx.line.markers);
        let start = cx.line_start() + cx.line.pos;
        children.extend(statement::struct_field(cx.line.rest(), start));
        to = cx.line_end();
    }

    cx.add_element(Element::with_children(SyntaxKind::DEFINE, from, to, children));
    BlockResult::Handled
}

/// `import type.name from "path"`
pub fn import(cx: &mut BlockContext<'_>) -> BlockResult {
    if !starts_with_keyword(&cx.line, "import") {
        return BlockResult::Declined;
    }
    let from = cx.line_start() + cx.line.pos;
    let children = statement::import(cx.line.rest(), from);
    cx.add_element(Element::with_children(SyntaxKind::IMPORT, from, cx.line_end(), children));
    cx.next_line();
    BlockResult::Handled
}

/// `~ target = expr` or `~ if expr` (and `elif`, `else`, `end`).
pub fn logic(cx: &mut BlockContext<'_>) -> BlockResult {
    if cx.line.next != Some('~') {
        return BlockResult::Declined;
    }
    let from = cx.line_start() + cx.line.pos;
    let mut element = statement::logic(cx.line.rest(), from);
    element.to = cx.line_end();
    cx.add_element(element);
    cx.next_line();
    BlockResult::Handled
}

/// `-> target`
pub fn jump(cx: &mut BlockContext<'_>) -> BlockResult {
    if !is_jump(&cx.line) {
        return BlockResult::Declined;
    }
    let jump = heading(cx, SyntaxKind::JUMP, SyntaxKind::DIVERT_MARK, 2);
    cx.add_element(jump);
    cx.next_line();
    BlockResult::Handled
}

/// `^name` on a line of its own.
pub fn checkpoint(cx: &mut BlockContext<'_>) -> BlockResult {
    if !is_checkpoint_line(&cx.line) {
        return BlockResult::Declined;
    }
    let checkpoint = heading(cx, SyntaxKind::CHECKPOINT, SyntaxKind::CHECKPOINT_MARK, 1);
    cx.add_element(checkpoint);
    cx.next_line();
    BlockResult::Handled
}

/// `INT. HOUSE - DAY`, or a forced `.HEADING`.
pub fn scene(cx: &mut BlockContext<'_>) -> BlockResult {
    let Some(prefix) = scene_prefix(&cx.line) else {
        return BlockResult::Declined;
    };
    let base = cx.line_start();
    let pos = cx.line.pos;
    let end = skip_space_back(&cx.line.text, cx.line.text.len(), pos);
    let mut children = Vec::new();
    if prefix > 0 {
        children.push(Element::new(SyntaxKind::SCENE_MARK, base + pos, base + pos + prefix));
    }
    let heading = &cx.line.text[pos + prefix..end];
    children.extend(cx.parse_inline(heading, base + pos + prefix));
    cx.add_element(Element::with_children(
        SyntaxKind::SCENE,
        base + pos,
        cx.line_end(),
        children,
    ));
    cx.next_line();
    BlockResult::Handled
}

/// `CUT TO:`, `FADE OUT.` and friends.
pub fn transition(cx: &mut BlockContext<'_>) -> BlockResult {
    if !is_transition(&cx.line) {
        return BlockResult::Declined;
    }
    let from = cx.line_start() + cx.line.pos;
    cx.add_element(Element::new(SyntaxKind::TRANSITION, from, cx.line_end()));
    cx.next_line();
    BlockResult::Handled
}

// End-leaf predicates

pub fn ends_with_chunk(cx: &BlockContext<'_>, _leaf: &LeafBlock) -> bool {
    cx.at_structure_level() && is_chunk_heading(&cx.line)
}

pub fn ends_with_section(cx: &BlockContext<'_>, _leaf: &LeafBlock) -> bool {
    cx.at_structure_level() && heading_level(&cx.line).is_some()
}

pub fn ends_with_block_quote(cx: &BlockContext<'_>, _leaf: &LeafBlock) -> bool {
    quote_markup(&cx.line).is_some()
}

pub fn ends_with_choice(cx: &BlockContext<'_>, _leaf: &LeafBlock) -> bool {
    choice_marker(&cx.line).is_some() && skip_space(&cx.line.text, cx.line.pos + 1) < cx.line.text.len()
}

pub fn ends_with_define(cx: &BlockContext<'_>, _leaf: &LeafBlock) -> bool {
    starts_with_keyword(&cx.line, "define")
}

pub fn ends_with_import(cx: &BlockContext<'_>, _leaf: &LeafBlock) -> bool {
    starts_with_keyword(&cx.line, "import")
}

pub fn ends_with_logic(cx: &BlockContext<'_>, _leaf: &LeafBlock) -> bool {
    cx.line.next == Some('~')
}

pub fn ends_with_jump(cx: &BlockContext<'_>, _leaf: &LeafBlock) -> bool {
    is_jump(&cx.line)
}

pub fn ends_with_checkpoint(cx: &BlockContext<'_>, _leaf: &LeafBlock) -> bool {
    is_checkpoint_line(&cx.line)
}

pub fn ends_with_scene(cx: &BlockContext<'_>, _leaf: &LeafBlock) -> bool {
    scene_prefix(&cx.line).is_some()
}

pub fn ends_with_transition(cx: &BlockContext<'_>, _leaf: &LeafBlock) -> bool {
    is_transition(&cx.line)
}

// Skip-markup handlers

pub fn skip_document(_cx: &mut BlockContext<'_>, _depth: usize) -> bool {
    true
}

pub fn skip_chunk(cx: &mut BlockContext<'_>, _depth: usize) -> bool {
    !is_chunk_heading(&cx.line)
}

pub fn skip_section(cx: &mut BlockContext<'_>, depth: usize) -> bool {
    if is_chunk_heading(&cx.line) {
        return false;
    }
    let level = cx.context(depth).value as usize;
    heading_level(&cx.line).is_none_or(|other| other > level)
}

pub fn skip_block_quote(cx: &mut BlockContext<'_>, depth: usize) -> bool {
    let Some(size) = quote_markup(&cx.line) else {
        return false;
    };
    let pos = cx.line.pos;
    let from = cx.line_start() + pos;
    cx.line
        .add_marker(Element::new(SyntaxKind::QUOTE_MARK, from, from + 1));
    cx.line.move_base(pos + size);
    let end = cx.line_end();
    cx.context_mut(depth).end = end;
    true
}

pub fn skip_choice_list(cx: &mut BlockContext<'_>, depth: usize) -> bool {
    let line = &cx.line;
    if line.is_blank() {
        return true;
    }
    if depth + 1 < cx.depth()
        && line.indent >= line.base_indent + cx.context(depth + 1).value as usize
    {
        return true;
    }
    if line.indent >= line.base_indent + 4 {
        return false;
    }
    choice_marker(line).is_some_and(|marker| marker as u32 == cx.context(depth).value)
}

pub fn skip_choice(cx: &mut BlockContext<'_>, depth: usize) -> bool {
    let column = cx.line.base_indent + cx.context(depth).value as usize;
    if cx.line.indent < column && !cx.line.is_blank() {
        return false;
    }
    cx.line.move_base_column(column);
    true
}

#[cfg(test)]
mod tests {
    use crate::parser::parse;
    use crate::syntax_kind::SyntaxKind;
    use crate::tree::Tree;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn kinds_of(tree: &Tree, kind: SyntaxKind) -> Vec<String> {
        tree.nodes_of(kind)
            .iter()
            .map(|node| node.text().to_string())
            .collect()
    }

    fn names(tree: &Tree) -> Vec<String> {
        tree.syntax()
            .descendants_with_tokens()
            .filter_map(|element| element.into_token())
            .filter(|token| token.kind() == SyntaxKind::NAME)
            .map(|token| token.text().to_string())
            .collect()
    }

    #[test]
    fn front_matter_fields() {
        let tree = parse("---\ntitle: Demo\nauthor: A\n  B\n---\nText.\n");
        let fields = kinds_of(&tree, SyntaxKind::FRONT_MATTER_FIELD);
        assert_eq!(fields, vec!["title: Demo", "author: A", "B"]);
        assert_eq!(
            kinds_of(&tree, SyntaxKind::FRONT_MATTER),
            vec!["---\ntitle: Demo\nauthor: A\n  B\n---"]
        );
        assert_eq!(kinds_of(&tree, SyntaxKind::ACTION), vec!["Text."]);
    }

    #[test]
    fn unclosed_front_matter_is_not_front_matter() {
        let tree = parse("---\ntitle: Demo\n");
        assert!(tree.nodes_of(SyntaxKind::FRONT_MATTER).is_empty());
    }

    #[test]
    fn sections_nest_by_level() {
        let tree = parse("# A\n## B\nText.\n# C\n");
        let sections = tree.nodes_of(SyntaxKind::SECTION);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].text().to_string(), "# A\n## B\nText.");
        assert_eq!(sections[1].text().to_string(), "## B\nText.");
        assert_eq!(sections[1].parent().map(|p| p.kind()), Some(SyntaxKind::SECTION));
        assert_eq!(sections[2].text().to_string(), "# C");
    }

    #[test]
    fn chunk_closes_sections() {
        let tree = parse("% one\n# A\nText.\n% two\n# B\n");
        let chunks = tree.nodes_of(SyntaxKind::CHUNK);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text().to_string(), "% one\n# A\nText.");
        assert_eq!(names(&tree), vec!["one", "A", "two", "B"]);
    }

    #[test]
    fn hash_without_space_is_not_a_heading() {
        let tree = parse("#hashtag\n");
        assert!(tree.nodes_of(SyntaxKind::SECTION).is_empty());
        assert_eq!(tree.nodes_of(SyntaxKind::ACTION).len(), 1);
    }

    #[test]
    fn block_quote_with_lazy_lines() {
        let tree = parse("> one\n> two\n\nAfter.\n");
        let quotes = tree.nodes_of(SyntaxKind::BLOCK_QUOTE);
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].text().to_string(), "> one\n> two");
        let marks = quotes[0]
            .descendants_with_tokens()
            .filter(|e| e.kind() == SyntaxKind::QUOTE_MARK)
            .count();
        assert_eq!(marks, 2);
    }

    #[test]
    fn choices_group_into_lists() {
        let tree = parse("+ Go left\n  -> Left\n+ Go right\n* Once\n");
        let lists = tree.nodes_of(SyntaxKind::CHOICE_LIST);
        assert_eq!(lists.len(), 2);
        let choices = kinds_of(&tree, SyntaxKind::CHOICE);
        assert_eq!(choices, vec!["+ Go left\n  -> Left", "+ Go right", "* Once"]);
        assert_eq!(tree.nodes_of(SyntaxKind::JUMP).len(), 1);
    }

    #[test]
    fn choice_ends_at_outdented_line() {
        let tree = parse("+ Go\nNarration.\n");
        assert_eq!(kinds_of(&tree, SyntaxKind::CHOICE), vec!["+ Go"]);
        assert_eq!(kinds_of(&tree, SyntaxKind::ACTION), vec!["Go", "Narration."]);
    }

    #[test]
    fn define_consumes_indented_fields() {
        let tree = parse("define hero:\n  hp = 10\n  name = \"Ann\"\nText.\n");
        assert_eq!(
            kinds_of(&tree, SyntaxKind::DEFINE),
            vec!["define hero:\n  hp = 10\n  name = \"Ann\""]
        );
        assert_eq!(tree.nodes_of(SyntaxKind::STRUCT_FIELD).len(), 2);
        assert_eq!(kinds_of(&tree, SyntaxKind::ACTION), vec!["Text."]);
    }

    #[test]
    fn import_and_logic_lines() {
        let tree = parse("import image.logo from \"logo.png\"\n~ gold = 1\n~ if gold\nRich.\n~ end\n");
        assert_eq!(tree.nodes_of(SyntaxKind::IMPORT).len(), 1);
        assert_eq!(kinds_of(&tree, SyntaxKind::ASSIGN), vec!["~ gold = 1"]);
        assert_eq!(kinds_of(&tree, SyntaxKind::CONDITION), vec!["~ if gold", "~ end"]);
        assert_eq!(kinds_of(&tree, SyntaxKind::ACTION), vec!["Rich."]);
    }

    #[test]
    fn jump_and_checkpoint_lines() {
        let tree = parse("Text.\n^here\n-> End\n");
        assert_eq!(kinds_of(&tree, SyntaxKind::ACTION), vec!["Text."]);
        assert_eq!(kinds_of(&tree, SyntaxKind::CHECKPOINT), vec!["^here"]);
        assert_eq!(kinds_of(&tree, SyntaxKind::JUMP), vec!["-> End"]);
        assert_eq!(names(&tree), vec!["here", "End"]);
    }

    #[rstest]
    #[case("INT. HOUSE - DAY")]
    #[case("ext. field")]
    #[case("INT./EXT. CAR")]
    #[case("I/E TRAIN")]
    #[case("EST. CITY")]
    #[case(".FLASHBACK")]
    fn scene_headings(#[case] text: &str) {
        let tree = parse(text);
        assert_eq!(kinds_of(&tree, SyntaxKind::SCENE), vec![text]);
    }

    #[rstest]
    #[case("INTERIOR design matters.")]
    #[case("...and then.")]
    fn not_scene_headings(#[case] text: &str) {
        assert!(parse(text).nodes_of(SyntaxKind::SCENE).is_empty());
    }

    #[rstest]
    #[case("CUT TO:")]
    #[case("SMASH CUT TO:")]
    #[case("FADE OUT.")]
    #[case("FADE IN:")]
    fn transitions(#[case] text: &str) {
        assert_eq!(kinds_of(&parse(text), SyntaxKind::TRANSITION), vec![text]);
    }

    #[test]
    fn script_line_ends_action() {
        let tree = parse("She waits.\nCUT TO:\n");
        assert_eq!(kinds_of(&tree, SyntaxKind::ACTION), vec!["She waits."]);
        assert_eq!(tree.nodes_of(SyntaxKind::TRANSITION).len(), 1);
    }
}
