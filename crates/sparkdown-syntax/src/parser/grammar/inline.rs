//! Inline parsing.
//!
//! A single left-to-right scan tries the ordered inline recognizers at every
//! position. A recognizer either adds a finished element (asset tags,
//! diverts, escapes) or a [`Delimiter`]. Once the scan is done,
//! [`InlineContext::resolve_markers`] pairs closing delimiters with their
//! nearest compatible openers and turns each pair into a nested node.
//! Delimiters left unmatched are dropped and stay plain text.

use crate::parser::ParserConfig;
use crate::parser::element::Element;
use crate::syntax_kind::SyntaxKind;

/// Paired inline markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelimiterKind {
    /// `*` and `**`
    Asterisk,
    /// `_`
    Underscore,
    /// `((` and `))`
    Note,
    /// `{` and `}`
    Interpolation,
}

impl DelimiterKind {
    fn mark(self) -> SyntaxKind {
        match self {
            DelimiterKind::Asterisk => SyntaxKind::EMPHASIS_MARK,
            DelimiterKind::Underscore => SyntaxKind::UNDERLINE_MARK,
            DelimiterKind::Note => SyntaxKind::NOTE_MARK,
            DelimiterKind::Interpolation => SyntaxKind::INTERPOLATION_MARK,
        }
    }

    fn is_emphasis(self) -> bool {
        matches!(self, DelimiterKind::Asterisk | DelimiterKind::Underscore)
    }
}

/// A run of delimiter characters that may open and/or close a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiter {
    pub kind: DelimiterKind,
    pub from: usize,
    pub to: usize,
    pub can_open: bool,
    pub can_close: bool,
}

impl Delimiter {
    fn len(&self) -> usize {
        self.to - self.from
    }
}

#[derive(Debug, Clone)]
enum InlinePart {
    Element(Element),
    Delimiter(Delimiter),
}

/// State of one inline parse. Positions are in parse coordinates, so
/// `offset` is the position of the first byte of `text`.
pub struct InlineContext<'a> {
    text: &'a str,
    offset: usize,
    parts: Vec<Option<InlinePart>>,
}

impl<'a> InlineContext<'a> {
    pub fn new(text: &'a str, offset: usize) -> Self {
        Self {
            text,
            offset,
            parts: Vec::new(),
        }
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Position just past the text.
    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }

    pub fn slice(&self, from: usize, to: usize) -> &'a str {
        &self.text[from - self.offset..to - self.offset]
    }

    /// Character starting at `pos`.
    pub fn char_at(&self, pos: usize) -> Option<char> {
        self.text.get(pos.checked_sub(self.offset)?..)?.chars().next()
    }

    /// Character ending at `pos`.
    pub fn char_before(&self, pos: usize) -> Option<char> {
        self.text.get(..pos.checked_sub(self.offset)?)?.chars().next_back()
    }

    /// Add a finished element, returning its end.
    pub fn add_element(&mut self, element: Element) -> usize {
        let to = element.to;
        self.parts.push(Some(InlinePart::Element(element)));
        to
    }

    /// Add a delimiter, returning its end.
    pub fn add_delimiter(&mut self, delimiter: Delimiter) -> usize {
        let to = delimiter.to;
        if delimiter.can_open || delimiter.can_close {
            self.parts.push(Some(InlinePart::Delimiter(delimiter)));
        }
        to
    }

    /// Pair delimiters into nodes and return the top-level elements.
    pub fn resolve_markers(mut self) -> Vec<Element> {
        let mut i = 0;
        while i < self.parts.len() {
            let close = match &self.parts[i] {
                Some(InlinePart::Delimiter(close)) if close.can_close => *close,
                _ => {
                    i += 1;
                    continue;
                }
            };
            let Some((j, open)) = self.find_opener(i, &close) else {
                i += 1;
                continue;
            };

            let (kind, start, end) = match close.kind {
                DelimiterKind::Asterisk => {
                    let size = open.len().min(close.len()).min(2);
                    let kind = if size == 1 {
                        SyntaxKind::EMPHASIS
                    } else {
                        SyntaxKind::STRONG
                    };
                    (kind, open.to - size, close.from + size)
                }
                DelimiterKind::Underscore => (SyntaxKind::UNDERLINE, open.to - 1, close.from + 1),
                DelimiterKind::Note => (SyntaxKind::NOTE, open.from, close.to),
                DelimiterKind::Interpolation => (SyntaxKind::INTERPOLATION, open.from, close.to),
            };

            let mut content = vec![Element::new(close.kind.mark(), start, open.to)];
            for part in &mut self.parts[j + 1..i] {
                if let Some(InlinePart::Element(element)) = part.take() {
                    content.push(element);
                }
            }
            content.push(Element::new(close.kind.mark(), close.from, end));
            let element = Element::with_children(kind, start, end, content);

            // Leftover delimiter characters go back into the stream
            self.parts[j] = (open.from != start).then_some(InlinePart::Delimiter(Delimiter {
                to: start,
                ..open
            }));
            if close.to != end {
                self.parts[i] = Some(InlinePart::Delimiter(Delimiter { from: end, ..close }));
                self.parts.insert(i, Some(InlinePart::Element(element)));
            } else {
                self.parts[i] = Some(InlinePart::Element(element));
            }
            i += 1;
        }

        self.parts
            .into_iter()
            .filter_map(|part| match part {
                Some(InlinePart::Element(element)) => Some(element),
                _ => None,
            })
            .collect()
    }

    fn find_opener(&self, i: usize, close: &Delimiter) -> Option<(usize, Delimiter)> {
        (0..i).rev().find_map(|j| match &self.parts[j] {
            Some(InlinePart::Delimiter(open))
                if open.can_open && open.kind == close.kind && !breaks_rule_of_three(open, close) =>
            {
                Some((j, *open))
            }
            _ => None,
        })
    }
}

/// When either run could both open and close, runs whose lengths sum to a
/// multiple of three only pair when both are multiples of three.
fn breaks_rule_of_three(open: &Delimiter, close: &Delimiter) -> bool {
    close.kind.is_emphasis()
        && (close.can_open || open.can_close)
        && (open.len() + close.len()) % 3 == 0
        && (open.len() % 3 != 0 || close.len() % 3 != 0)
}

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation() || c == '\u{a1}' || ('\u{2010}'..='\u{2027}').contains(&c)
}

fn is_space(c: Option<char>) -> bool {
    c.is_none_or(char::is_whitespace)
}

/// Inline-parse `text`, which starts at parse position `offset`.
pub fn parse_inline(config: &ParserConfig, text: &str, offset: usize) -> Vec<Element> {
    let mut cx = InlineContext::new(text, offset);
    let end = cx.end();
    let mut pos = offset;
    'scan: while pos < end {
        let Some(next) = cx.char_at(pos) else {
            break;
        };
        for parse in config.inline_parsers.iter() {
            if let Some(to) = parse(&mut cx, next, pos) {
                if to > pos {
                    pos = to;
                    continue 'scan;
                }
            }
        }
        pos += next.len_utf8();
    }
    cx.resolve_markers()
}

// Recognizers

/// `\` followed by ASCII punctuation.
pub fn escape(cx: &mut InlineContext<'_>, next: char, pos: usize) -> Option<usize> {
    if next != '\\' {
        return None;
    }
    let escaped = cx.char_at(pos + 1)?;
    if !escaped.is_ascii_punctuation() {
        return None;
    }
    Some(cx.add_element(Element::new(SyntaxKind::ESCAPE, pos, pos + 2)))
}

fn emphasis_run(cx: &mut InlineContext<'_>, next: char, start: usize, kind: DelimiterKind) -> usize {
    let mut pos = start + 1;
    while cx.char_at(pos) == Some(next) {
        pos += 1;
    }
    let before = cx.char_before(start);
    let after = cx.char_at(pos);
    let (p_before, p_after) = (before.is_some_and(is_punctuation), after.is_some_and(is_punctuation));
    let (s_before, s_after) = (is_space(before), is_space(after));
    let left_flanking = !s_after && (!p_after || s_before || p_before);
    let right_flanking = !s_before && (!p_before || s_after || p_after);
    let asterisk = kind == DelimiterKind::Asterisk;
    cx.add_delimiter(Delimiter {
        kind,
        from: start,
        to: pos,
        can_open: left_flanking && (asterisk || !right_flanking || p_before),
        can_close: right_flanking && (asterisk || !left_flanking || p_after),
    })
}

/// `*emphasis*` and `**strong**`
pub fn emphasis(cx: &mut InlineContext<'_>, next: char, pos: usize) -> Option<usize> {
    (next == '*').then(|| emphasis_run(cx, next, pos, DelimiterKind::Asterisk))
}

/// `_underline_`
pub fn underline(cx: &mut InlineContext<'_>, next: char, pos: usize) -> Option<usize> {
    (next == '_').then(|| emphasis_run(cx, next, pos, DelimiterKind::Underscore))
}

/// `((note))`
pub fn note(cx: &mut InlineContext<'_>, next: char, pos: usize) -> Option<usize> {
    let (can_open, can_close) = match next {
        '(' => (true, false),
        ')' => (false, true),
        _ => return None,
    };
    if cx.char_at(pos + 1) != Some(next) {
        return None;
    }
    Some(cx.add_delimiter(Delimiter {
        kind: DelimiterKind::Note,
        from: pos,
        to: pos + 2,
        can_open,
        can_close,
    }))
}

/// `{expression}`
pub fn interpolation(cx: &mut InlineContext<'_>, next: char, pos: usize) -> Option<usize> {
    let (can_open, can_close) = match next {
        '{' => (true, false),
        '}' => (false, true),
        _ => return None,
    };
    Some(cx.add_delimiter(Delimiter {
        kind: DelimiterKind::Interpolation,
        from: pos,
        to: pos + 1,
        can_open,
        can_close,
    }))
}

/// `[[name]]` or `[[channel:name]]`
pub fn asset_tag(cx: &mut InlineContext<'_>, next: char, pos: usize) -> Option<usize> {
    if next != '[' || cx.char_at(pos + 1) != Some('[') {
        return None;
    }
    let inner_from = pos + 2;
    let rest = cx.slice(inner_from, cx.end());
    let inner_len = rest.find("]]")?;
    let inner = &rest[..inner_len];
    if inner.contains(['\n', '[']) {
        return None;
    }
    let inner_to = inner_from + inner_len;

    let trimmed = |from: usize, to: usize| {
        let text = cx.slice(from, to);
        let start = from + (text.len() - text.trim_start().len());
        let end = to - (text.len() - text.trim_end().len());
        (start, end.max(start))
    };
    let mut children = vec![Element::new(SyntaxKind::ASSET_MARK, pos, inner_from)];
    let name_from = match inner.find(':') {
        Some(colon) => {
            let colon = inner_from + colon;
            let (from, to) = trimmed(inner_from, colon);
            if from < to {
                children.push(Element::new(SyntaxKind::ASSET_CHANNEL, from, to));
            }
            children.push(Element::new(SyntaxKind::COLON, colon, colon + 1));
            colon + 1
        }
        None => inner_from,
    };
    let (from, to) = trimmed(name_from, inner_to);
    if from == to {
        return None;
    }
    children.push(Element::new(SyntaxKind::ASSET_NAME, from, to));
    children.push(Element::new(SyntaxKind::ASSET_MARK, inner_to, inner_to + 2));
    Some(cx.add_element(Element::with_children(
        SyntaxKind::ASSET_TAG,
        pos,
        inner_to + 2,
        children,
    )))
}

fn name_end(cx: &InlineContext<'_>, from: usize, extra: &[char]) -> usize {
    let text = cx.slice(from, cx.end());
    from + text
        .find(|c: char| !(c.is_alphanumeric() || c == '_' || extra.contains(&c)))
        .unwrap_or(text.len())
}

/// `-> target`
pub fn divert(cx: &mut InlineContext<'_>, next: char, pos: usize) -> Option<usize> {
    if next != '-' || cx.char_at(pos + 1) != Some('>') {
        return None;
    }
    let mut name_from = pos + 2;
    while matches!(cx.char_at(name_from), Some(' ' | '\t')) {
        name_from += 1;
    }
    let name_to = name_end(cx, name_from, &['.']);
    if name_to == name_from {
        return None;
    }
    Some(cx.add_element(Element::with_children(
        SyntaxKind::DIVERT,
        pos,
        name_to,
        vec![
            Element::new(SyntaxKind::DIVERT_MARK, pos, pos + 2),
            Element::new(SyntaxKind::NAME, name_from, name_to),
        ],
    )))
}

/// `^name` at the start of the text or after whitespace.
pub fn checkpoint(cx: &mut InlineContext<'_>, next: char, pos: usize) -> Option<usize> {
    if next != '^' || !is_space(cx.char_before(pos)) {
        return None;
    }
    let name_to = name_end(cx, pos + 1, &[]);
    if name_to == pos + 1 {
        return None;
    }
    Some(cx.add_element(Element::with_children(
        SyntaxKind::CHECKPOINT,
        pos,
        name_to,
        vec![
            Element::new(SyntaxKind::CHECKPOINT_MARK, pos, pos + 1),
            Element::new(SyntaxKind::NAME, pos + 1, name_to),
        ],
    )))
}
