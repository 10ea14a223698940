//! SyntaxKind enum for all tokens and nodes in the Sparkdown CST.
//!
//! Following the rust-analyzer model, all tokens and nodes share a single enum.
//! Every byte in the source must appear as a token in the tree.

/// All syntax kinds for the Sparkdown CST.
///
/// This enum represents both tokens (leaf text) and composite nodes. The
/// `repr(u16)` ensures efficient storage in rowan's green tree.
///
/// We use SCREAMING_CASE following the rust-analyzer convention for SyntaxKind.
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(non_camel_case_types)]
pub enum SyntaxKind {
    // === Tokens ===
    /// Horizontal whitespace (spaces, tabs, stray carriage returns)
    WHITESPACE,
    /// Line ending
    NEWLINE,
    /// Plain text content
    TEXT,
    /// Text outside the parsed ranges of a partial reparse
    SKIPPED,
    /// `#` run opening a section heading
    HEADING_MARK,
    /// `%` opening a chunk heading
    CHUNK_MARK,
    /// `>` container markup
    QUOTE_MARK,
    /// `+` or `*` choice marker
    LIST_MARK,
    /// `---` front matter fence
    FENCE_MARK,
    /// `*` run inside emphasis or strong
    EMPHASIS_MARK,
    /// `_` run inside underline
    UNDERLINE_MARK,
    /// `((` or `))`
    NOTE_MARK,
    /// `{` or `}`
    INTERPOLATION_MARK,
    /// `[[` or `]]`
    ASSET_MARK,
    /// `->`
    DIVERT_MARK,
    /// `^`
    CHECKPOINT_MARK,
    /// `~` opening a logic line
    LOGIC_MARK,
    /// `.` forcing a scene heading
    SCENE_MARK,
    /// Backslash escape with its escaped character
    ESCAPE,
    /// Declared or referenced name (sections, chunks, checkpoints, targets)
    NAME,
    /// Character name in a dialogue header
    CHARACTER_NAME,
    /// Parenthesised extension after a character name, e.g. `(V.O.)`
    CHARACTER_EXTENSION,
    /// Front matter key
    FIELD_KEY,
    /// Front matter value
    FIELD_VALUE,
    /// Channel part of an asset tag
    ASSET_CHANNEL,
    /// Name part of an asset tag
    ASSET_NAME,
    /// Statement keyword (`define`, `import`, `from`, `if`, ...)
    KEYWORD,
    /// Identifier inside a statement
    IDENT,
    /// `.` inside a statement
    DOT,
    /// `:`
    COLON,
    /// `,`
    COMMA,
    /// Operator run (`=`, `+=`, `==`, ...)
    OPERATOR,
    /// Quoted string literal
    STRING,
    /// Numeric literal
    NUMBER,
    /// `[`
    L_BRACKET,
    /// `]`
    R_BRACKET,
    /// `(`, `)`, `{`, `}` inside a statement
    PUNCT,

    // === Composite Nodes ===
    /// Root document node
    DOCUMENT,
    /// `---` delimited key/value block at the top of a script
    FRONT_MATTER,
    /// One `key: value` line of front matter
    FRONT_MATTER_FIELD,
    /// Chunk container (`% name`), closed by the next chunk
    CHUNK,
    /// The heading line of a chunk
    CHUNK_HEADING,
    /// Section container (`# name`), closed by a heading of equal or lower level
    SECTION,
    /// The heading line of a section
    SECTION_HEADING,
    /// Quoted container (`> ...`)
    BLOCK_QUOTE,
    /// Run of choices sharing one marker
    CHOICE_LIST,
    /// A single choice
    CHOICE,
    /// Scene heading (`INT. HOUSE - DAY`)
    SCENE,
    /// Transition (`CUT TO:`)
    TRANSITION,
    /// Dialogue block
    DIALOGUE,
    /// Dialogue header (`John (V.O.):`)
    CHARACTER,
    /// Spoken line inside a dialogue block
    DIALOGUE_LINE,
    /// `(beat)` line inside a dialogue block
    PARENTHETICAL,
    /// Action paragraph
    ACTION,
    /// Block-level jump (`-> target`)
    JUMP,
    /// Explicit checkpoint (`^name`), block-level or inline
    CHECKPOINT,
    /// Variable or struct definition
    DEFINE,
    /// `type.name` being declared
    DECLARATION,
    /// Parent type after `:` in a definition
    TYPE_ANNOTATION,
    /// `path = value` line inside a definition
    STRUCT_FIELD,
    /// Dotted property path of a struct field
    FIELD_PATH,
    /// Expression source handed to the compile callback
    EXPRESSION,
    /// `import type.name from "path"`
    IMPORT,
    /// `~ target = value`
    ASSIGN,
    /// Assignment target
    ASSIGN_TARGET,
    /// `~ if`, `~ elif`, `~ else`, `~ end`
    CONDITION,
    /// Emphasis `*text*`
    EMPHASIS,
    /// Strong emphasis `**text**`
    STRONG,
    /// Underline `_text_`
    UNDERLINE,
    /// Note `((text))`
    NOTE,
    /// Interpolation tag `{expr}`
    INTERPOLATION,
    /// Asset tag `[[channel:name]]`
    ASSET_TAG,
    /// Inline divert `-> target`
    DIVERT,

    /// Unexpected statement content
    ERROR,
}

impl SyntaxKind {
    /// Returns true if this kind represents a token.
    pub fn is_token(self) -> bool {
        (self as u16) <= (Self::PUNCT as u16)
    }

    /// Returns true if this kind represents a composite node.
    pub fn is_node(self) -> bool {
        !self.is_token()
    }

    /// Returns true if this kind is trivia (whitespace/newlines).
    pub fn is_trivia(self) -> bool {
        matches!(self, Self::WHITESPACE | Self::NEWLINE)
    }

    /// Tokens the tree assembler regenerates from plain source text.
    pub fn is_filler(self) -> bool {
        matches!(
            self,
            Self::WHITESPACE | Self::NEWLINE | Self::TEXT | Self::SKIPPED
        )
    }

    /// Block kinds that own nested blocks and sit on the parser's context stack.
    pub fn is_composite(self) -> bool {
        matches!(
            self,
            Self::DOCUMENT
                | Self::CHUNK
                | Self::SECTION
                | Self::BLOCK_QUOTE
                | Self::CHOICE_LIST
                | Self::CHOICE
        )
    }

    /// Blocks that may still absorb lines after a blank line, so a run of
    /// reused nodes never ends on one of them.
    pub fn may_continue_past_blank(self) -> bool {
        matches!(
            self,
            Self::CHUNK | Self::SECTION | Self::CHOICE_LIST | Self::CHOICE
        )
    }
}

impl From<SyntaxKind> for rowan::SyntaxKind {
    fn from(kind: SyntaxKind) -> Self {
        Self(kind as u16)
    }
}

/// Language definition for rowan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScriptLang {}

impl rowan::Language for ScriptLang {
    type Kind = SyntaxKind;

    fn kind_from_raw(raw: rowan::SyntaxKind) -> Self::Kind {
        assert!(raw.0 <= SyntaxKind::ERROR as u16);
        // SAFETY: We check bounds above and SyntaxKind is repr(u16)
        unsafe { std::mem::transmute::<u16, SyntaxKind>(raw.0) }
    }

    fn kind_to_raw(kind: Self::Kind) -> rowan::SyntaxKind {
        kind.into()
    }
}

/// Type alias for our syntax nodes.
pub type SyntaxNode = rowan::SyntaxNode<ScriptLang>;
/// Type alias for our syntax tokens.
pub type SyntaxToken = rowan::SyntaxToken<ScriptLang>;
/// Type alias for syntax elements (node or token).
pub type SyntaxElement = rowan::SyntaxElement<ScriptLang>;

#[cfg(test)]
mod tests {
    use super::*;
    use rowan::Language;

    #[test]
    fn token_kinds_are_tokens() {
        assert!(SyntaxKind::WHITESPACE.is_token());
        assert!(SyntaxKind::NAME.is_token());
        assert!(SyntaxKind::PUNCT.is_token());
    }

    #[test]
    fn node_kinds_are_nodes() {
        assert!(SyntaxKind::DOCUMENT.is_node());
        assert!(SyntaxKind::DIALOGUE.is_node());
        assert!(SyntaxKind::ERROR.is_node());
    }

    #[test]
    fn composites_are_nodes() {
        for kind in [
            SyntaxKind::DOCUMENT,
            SyntaxKind::CHUNK,
            SyntaxKind::SECTION,
            SyntaxKind::BLOCK_QUOTE,
            SyntaxKind::CHOICE_LIST,
            SyntaxKind::CHOICE,
        ] {
            assert!(kind.is_composite());
            assert!(kind.is_node());
        }
        assert!(!SyntaxKind::ACTION.is_composite());
    }

    #[test]
    fn trivia_detection() {
        assert!(SyntaxKind::WHITESPACE.is_trivia());
        assert!(SyntaxKind::NEWLINE.is_trivia());
        assert!(!SyntaxKind::TEXT.is_trivia());
    }

    #[test]
    fn rowan_conversion_roundtrip() {
        let kind = SyntaxKind::DIALOGUE;
        let raw: rowan::SyntaxKind = kind.into();
        let back = ScriptLang::kind_from_raw(raw);
        assert_eq!(kind, back);
    }
}
