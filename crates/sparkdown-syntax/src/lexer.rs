//! # Lexer - Tokenizing Statement Lines
//!
//! Screenplay text is parsed line by line by the block parser, but the logic
//! lines (`define`, `import`, `~ ...`) carry a small expression-like syntax.
//! This module breaks those lines into tokens using the [Logos] lexer
//! generator.
//!
//! [Logos]: https://docs.rs/logos
//!
//! ## The Lossless Guarantee
//!
//! Every byte in the input appears in exactly one token. Unrecognised
//! characters become `TEXT` tokens rather than being dropped:
//!
//! ```
//! use sparkdown_syntax::lexer::lex;
//!
//! let input = "define character.hero: villain = \"Bob\"";
//! let tokens = lex(input);
//!
//! let reconstructed: String = tokens.iter().map(|t| t.text).collect();
//! assert_eq!(input, reconstructed);
//! ```
//!
//! ## Why Two Token Enums?
//!
//! Logos derives on its own enum ([`TokenKind`]); rowan uses [`SyntaxKind`].
//! [`TokenKind::to_syntax_kind`] converts between them. Keywords are not
//! separate tokens: the statement grammar decides when an `IDENT` is used as
//! a keyword.
//!
//! [`SyntaxKind`]: crate::syntax_kind::SyntaxKind

use std::ops::Range;

use logos::Logos;

use crate::syntax_kind::SyntaxKind;

/// Token kinds produced by the Logos lexer.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"")]
pub enum TokenKind {
    /// Horizontal whitespace
    #[regex(r"[ \t\r]+")]
    Whitespace,

    /// Identifier, `$` allowed for `$default`
    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*")]
    Ident,

    /// Integer or decimal literal
    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Number,

    /// Single or double quoted string with backslash escapes
    #[regex(r#""([^"\\]|\\.)*""#)]
    #[regex(r#"'([^'\\]|\\.)*'"#)]
    String,

    #[token(".")]
    Dot,

    #[token(":")]
    Colon,

    #[token(",")]
    Comma,

    /// Operator run, e.g. `=`, `+=`, `==`, `&&`
    #[regex(r"[=+\-*/<>!&|%?^]+")]
    Operator,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[regex(r"[(){}]")]
    Punct,
}

impl TokenKind {
    /// Convert to SyntaxKind.
    pub fn to_syntax_kind(self) -> SyntaxKind {
        match self {
            TokenKind::Whitespace => SyntaxKind::WHITESPACE,
            TokenKind::Ident => SyntaxKind::IDENT,
            TokenKind::Number => SyntaxKind::NUMBER,
            TokenKind::String => SyntaxKind::STRING,
            TokenKind::Dot => SyntaxKind::DOT,
            TokenKind::Colon => SyntaxKind::COLON,
            TokenKind::Comma => SyntaxKind::COMMA,
            TokenKind::Operator => SyntaxKind::OPERATOR,
            TokenKind::LBracket => SyntaxKind::L_BRACKET,
            TokenKind::RBracket => SyntaxKind::R_BRACKET,
            TokenKind::Punct => SyntaxKind::PUNCT,
        }
    }
}

/// A lexed token with its kind and text slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: SyntaxKind,
    pub text: &'a str,
}

/// Lex the input into a sequence of tokens.
///
/// Guarantees that all bytes from the input appear in the output tokens.
pub fn lex(input: &str) -> Vec<Token<'_>> {
    lex_with_spans(input)
        .into_iter()
        .map(|(token, _)| token)
        .collect()
}

/// Lex and return tokens along with their byte spans.
pub fn lex_with_spans(input: &str) -> Vec<(Token<'_>, Range<usize>)> {
    let mut tokens = Vec::new();
    let mut lexer = TokenKind::lexer(input);

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let text = lexer.slice();
        let kind = match result {
            Ok(token_kind) => token_kind.to_syntax_kind(),
            // Unrecognised character (or unterminated string) - keep as TEXT
            Err(()) => SyntaxKind::TEXT,
        };
        tokens.push((Token { kind, text }, span));
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn token(kind: SyntaxKind, text: &str) -> Token<'_> {
        Token { kind, text }
    }

    #[test]
    fn lex_empty_input() {
        assert_eq!(lex(""), vec![]);
    }

    #[test]
    fn lex_define_header() {
        let tokens = lex("define character.hero: villain");
        assert_eq!(
            tokens,
            vec![
                token(SyntaxKind::IDENT, "define"),
                token(SyntaxKind::WHITESPACE, " "),
                token(SyntaxKind::IDENT, "character"),
                token(SyntaxKind::DOT, "."),
                token(SyntaxKind::IDENT, "hero"),
                token(SyntaxKind::COLON, ":"),
                token(SyntaxKind::WHITESPACE, " "),
                token(SyntaxKind::IDENT, "villain"),
            ]
        );
    }

    #[test]
    fn lex_compound_assignment() {
        let tokens = lex("x += 1.5");
        assert_eq!(
            tokens,
            vec![
                token(SyntaxKind::IDENT, "x"),
                token(SyntaxKind::WHITESPACE, " "),
                token(SyntaxKind::OPERATOR, "+="),
                token(SyntaxKind::WHITESPACE, " "),
                token(SyntaxKind::NUMBER, "1.5"),
            ]
        );
    }

    #[test]
    fn lex_strings_keep_escapes() {
        let tokens = lex(r#""a \"b\"" 'c'"#);
        assert_eq!(
            tokens,
            vec![
                token(SyntaxKind::STRING, r#""a \"b\"""#),
                token(SyntaxKind::WHITESPACE, " "),
                token(SyntaxKind::STRING, "'c'"),
            ]
        );
    }

    #[test]
    fn lex_bracket_target() {
        let tokens = lex(r#"x["a"]"#);
        assert_eq!(
            tokens,
            vec![
                token(SyntaxKind::IDENT, "x"),
                token(SyntaxKind::L_BRACKET, "["),
                token(SyntaxKind::STRING, r#""a""#),
                token(SyntaxKind::R_BRACKET, "]"),
            ]
        );
    }

    #[test]
    fn lex_default_marker_is_ident() {
        let tokens = lex("$default");
        assert_eq!(tokens, vec![token(SyntaxKind::IDENT, "$default")]);
    }

    #[test]
    fn unknown_characters_become_text() {
        let tokens = lex("a @ b");
        assert_eq!(tokens[2], token(SyntaxKind::TEXT, "@"));
    }

    #[test]
    fn all_bytes_preserved() {
        let input = "~ hero.mood = \"angry\" && !calm # trailing";
        let tokens = lex(input);
        let reconstructed: String = tokens.iter().map(|t| t.text).collect();
        assert_eq!(input, reconstructed);
    }

    #[test]
    fn spans_cover_input() {
        let spans: Vec<_> = lex_with_spans("a.b")
            .into_iter()
            .map(|(_, span)| span)
            .collect();
        assert_eq!(spans, vec![0..1, 1..2, 2..3]);
    }
}
