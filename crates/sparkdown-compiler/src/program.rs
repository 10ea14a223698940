//! The compiled Program model.
//!
//! Everything here is plain data and serialisable with serde, so hosts can
//! ship a Program to a renderer or runtime as JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diagnostic::{Diagnostic, Severity};

/// Compiled values by type, then by name.
pub type Context = BTreeMap<String, BTreeMap<String, Value>>;

/// Id of the section holding everything outside any heading.
pub const ROOT_SECTION: &str = "";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub from: usize,
    pub to: usize,
}

impl Span {
    pub fn new(from: usize, to: usize) -> Self {
        Self { from, to }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub name: String,
    pub range: Span,
    /// Ids of top-level sections declared in this chunk.
    pub sections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub name: String,
    pub level: usize,
    pub parent: Option<String>,
    pub chunk: Option<String>,
    pub children: Vec<String>,
    /// Names from the outermost ancestor down to this section.
    pub path: Vec<String>,
    pub range: Span,
    /// Indices into [`Program::tokens`].
    pub tokens: Vec<usize>,
    pub checkpoints: Vec<String>,
}

impl Section {
    pub fn root() -> Self {
        Self {
            id: ROOT_SECTION.to_string(),
            name: String::new(),
            level: 0,
            parent: None,
            chunk: None,
            children: Vec::new(),
            path: Vec::new(),
            range: Span::new(0, 0),
            tokens: Vec::new(),
            checkpoints: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub path: String,
    pub value: Value,
    pub range: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub id: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub name: String,
    /// Id of the variable this one inherits fields from.
    pub parent: Option<String>,
    pub compiled: Value,
    pub fields: Vec<Field>,
    pub range: Option<Span>,
    pub implicit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum DialogueLine {
    Speech(String),
    Parenthetical(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TokenKind {
    Dialogue {
        /// Variable key of the speaker, e.g. `john`.
        character: String,
        name: String,
        extension: Option<String>,
        lines: Vec<DialogueLine>,
        /// 1 or 2 when two characters speak simultaneously.
        position: Option<u8>,
        duration: f64,
    },
    Action {
        text: String,
        duration: f64,
    },
    Scene {
        heading: String,
    },
    Transition {
        text: String,
    },
    Choice {
        text: String,
        once: bool,
        target: Option<String>,
    },
    Jump {
        target: String,
    },
    Assign {
        target: String,
        operator: String,
        value: Value,
    },
    Condition {
        keyword: String,
        value: Option<Value>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    #[serde(flatten)]
    pub kind: TokenKind,
    pub section: String,
    pub checkpoint: Option<String>,
    pub range: Span,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Section,
    Variable,
    Asset,
    Channel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub kind: ReferenceKind,
    pub name: String,
    pub range: Span,
    /// Resolved id, or `None` when nothing by that name exists.
    pub target: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineMetadata {
    /// Chunk and section ids open on this line, outermost first.
    pub scopes: Vec<String>,
    pub references: Vec<Reference>,
    pub characters: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlineKind {
    Chunk,
    Section,
    Scene,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineItem {
    pub kind: OutlineKind,
    pub name: String,
    pub level: usize,
    pub line: usize,
    pub range: Span,
    pub children: Vec<OutlineItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMetadata {
    pub heading: String,
    pub line: usize,
    pub range: Span,
    /// Estimated seconds of dialogue and action until the next scene.
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterMetadata {
    pub name: String,
    pub lines: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub lines: Vec<LineMetadata>,
    pub outline: Vec<OutlineItem>,
    pub scenes: Vec<SceneMetadata>,
    pub characters: BTreeMap<String, CharacterMetadata>,
    pub references: Vec<Reference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub front_matter: BTreeMap<String, Vec<String>>,
    pub chunks: BTreeMap<String, Chunk>,
    pub sections: BTreeMap<String, Section>,
    pub variables: BTreeMap<String, Variable>,
    pub context: Context,
    pub diagnostics: Vec<Diagnostic>,
    pub metadata: Metadata,
    pub tokens: Vec<Token>,
}

impl Program {
    pub fn section_tokens(&self, id: &str) -> Vec<&Token> {
        self.sections
            .get(id)
            .map(|section| section.tokens.iter().map(|&i| &self.tokens[i]).collect())
            .unwrap_or_default()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Value bound in the context for `type` and `name`.
    pub fn value(&self, ty: &str, name: &str) -> Option<&Value> {
        self.context.get(ty)?.get(name)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
