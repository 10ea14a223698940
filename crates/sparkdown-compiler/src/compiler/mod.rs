//! # Program compiler
//!
//! Two walks over a finished syntax tree:
//!
//! 1. **Hoist** ([`hoist`]) registers front matter, chunks, sections,
//!    declarations and implicit character variables, and builds the outline.
//!    Nothing is evaluated yet, so every name is known before pass 2 needs it.
//! 2. **Process** ([`process`]) builds variable values, assembles tokens and
//!    checkpoints, resolves references and fills per-line metadata.
//!
//! Problems in the script never abort either walk. Each one becomes a
//! [`Diagnostic`] and the offending statement falls back to a safe default.

mod hoist;
mod outline;
mod process;
pub mod timing;

use std::collections::{HashMap, HashSet};

use log::debug;
use sparkdown_config::Config;
use sparkdown_syntax::{SyntaxKind, SyntaxNode, SyntaxToken, Tree};

use crate::callbacks::ScriptCallbacks;
use crate::diagnostic::{Action, Diagnostic, LineIndex, Severity};
use crate::keywords::Keywords;
use crate::program::{Program, Reference, Section, Span};
use crate::value::is_primitive_type;

/// Knobs for one compile.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    pub words_per_minute: f64,
    /// Seconds added per punctuation mark when estimating speech.
    pub pause_seconds: f64,
    pub reserved_keywords: Vec<String>,
    pub warn_on_level_jump: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            words_per_minute: 200.0,
            pause_seconds: 0.25,
            reserved_keywords: Vec::new(),
            warn_on_level_jump: true,
        }
    }
}

impl From<&Config> for CompileOptions {
    fn from(config: &Config) -> Self {
        Self {
            words_per_minute: f64::from(config.timing.words_per_minute),
            pause_seconds: config.timing.pause_seconds,
            reserved_keywords: config.compiler.reserved_keywords.clone(),
            warn_on_level_jump: config.compiler.warn_on_level_jump,
        }
    }
}

/// Compile a parsed script into a [`Program`].
pub fn compile(tree: &Tree, callbacks: &dyn ScriptCallbacks, options: &CompileOptions) -> Program {
    let text = tree.text();
    debug!("compiling {} bytes", text.len());

    let root = tree.syntax();
    let mut compiler = Compiler::new(&text, callbacks, options);
    compiler.hoist(&root);
    compiler.process(&root);
    let program = compiler.program;

    debug!(
        "compiled {} sections, {} variables, {} tokens, {} diagnostics",
        program.sections.len(),
        program.variables.len(),
        program.tokens.len(),
        program.diagnostics.len()
    );
    program
}

/// Parse and compile in one go.
pub fn compile_script(
    text: &str,
    callbacks: &dyn ScriptCallbacks,
    options: &CompileOptions,
) -> Program {
    compile(&sparkdown_syntax::parse(text), callbacks, options)
}

/// A `define` or `import` target, resolved to its variable id.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Declaration {
    pub ty: String,
    pub name: String,
    pub id: String,
    /// Variable whose value this one inherits.
    pub parent: Option<String>,
    pub annotation: Option<(String, Span)>,
    /// `define T:` with no type prefix declares the defaults of type `T`.
    pub struct_type: bool,
    /// Untyped `define x = expr`: the type comes from the compiled value.
    pub inferred: bool,
    pub span: Span,
}

impl Declaration {
    pub fn from_define(node: &SyntaxNode) -> Option<Self> {
        let declaration = child_node(node, SyntaxKind::DECLARATION)?;
        let span = node_span(&declaration);
        let path = declaration.text().to_string();
        let annotation = child_node(node, SyntaxKind::TYPE_ANNOTATION)
            .map(|n| (n.text().to_string(), node_span(&n)));
        let has_expression = child_node(node, SyntaxKind::EXPRESSION).is_some();
        let has_fields = node
            .children()
            .any(|child| child.kind() == SyntaxKind::STRUCT_FIELD);

        let mut declaration = match path.split_once('.') {
            Some((ty, name)) => {
                let parent = match &annotation {
                    Some((parent, _)) if parent.contains('.') => Some(parent.clone()),
                    Some((parent, _)) => Some(format!("{ty}.{parent}")),
                    None => (name != "$default").then(|| format!("{ty}.$default")),
                };
                Self::typed(ty, name, parent, span)
            }
            None => match annotation.as_ref().map(|(a, _)| a.as_str()) {
                Some(primitive) if is_primitive_type(primitive) => Self {
                    ty: primitive.to_string(),
                    name: path.clone(),
                    id: path.clone(),
                    parent: None,
                    annotation: None,
                    struct_type: false,
                    inferred: false,
                    span,
                },
                Some(parent) => match parent.split_once('.') {
                    Some((ty, _)) => Self::typed(ty, &path, Some(parent.to_string()), span),
                    None => Self::typed(parent, &path, Some(format!("{parent}.$default")), span),
                },
                None if has_fields || !has_expression => {
                    let mut declaration = Self::typed(&path, "$default", None, span);
                    declaration.struct_type = true;
                    declaration
                }
                None => Self {
                    ty: String::new(),
                    name: path.clone(),
                    id: path.clone(),
                    parent: None,
                    annotation: None,
                    struct_type: false,
                    inferred: true,
                    span,
                },
            },
        };
        declaration.annotation = annotation;
        Some(declaration)
    }

    /// `import type.name from "path"` always names its type.
    pub fn from_import(node: &SyntaxNode) -> Option<Self> {
        let declaration = child_node(node, SyntaxKind::DECLARATION)?;
        let path = declaration.text().to_string();
        let (ty, name) = path.split_once('.')?;
        Some(Self::typed(ty, name, None, node_span(&declaration)))
    }

    fn typed(ty: &str, name: &str, parent: Option<String>, span: Span) -> Self {
        Self {
            ty: ty.to_string(),
            name: name.to_string(),
            id: format!("{ty}.{name}"),
            parent,
            annotation: None,
            struct_type: false,
            inferred: false,
            span,
        }
    }
}

pub(crate) struct Compiler<'a> {
    lines: LineIndex<'a>,
    callbacks: &'a dyn ScriptCallbacks,
    options: &'a CompileOptions,
    keywords: Keywords,
    pub(crate) program: Program,
    /// Section id by the start offset of its `SECTION` node.
    section_ids: HashMap<usize, String>,
    /// Chunk name by the start offset of its `CHUNK` node.
    chunk_names: HashMap<usize, String>,
    /// First declaration of every chunk and section name.
    declared_names: HashMap<String, Span>,
    /// Struct and declared variable types, with where they were declared.
    types: HashMap<String, Span>,
    /// `DEFINE` nodes by the variable id they declare.
    definitions: HashMap<String, SyntaxNode>,
    /// Start offsets of statements dropped as duplicates.
    dropped: HashSet<usize>,
    built: HashSet<String>,
    building: HashSet<String>,
}

impl<'a> Compiler<'a> {
    fn new(text: &'a str, callbacks: &'a dyn ScriptCallbacks, options: &'a CompileOptions) -> Self {
        let lines = LineIndex::new(text);
        let mut program = Program::default();
        let mut root = Section::root();
        root.range = Span::new(0, text.len());
        program.sections.insert(root.id.clone(), root);
        program.metadata.lines = vec![Default::default(); lines.line_count()];
        Self {
            lines,
            callbacks,
            options,
            keywords: Keywords::new(&options.reserved_keywords),
            program,
            section_ids: HashMap::new(),
            chunk_names: HashMap::new(),
            declared_names: HashMap::new(),
            types: HashMap::new(),
            definitions: HashMap::new(),
            dropped: HashSet::new(),
            built: HashSet::new(),
            building: HashSet::new(),
        }
    }

    fn report(&mut self, severity: Severity, span: Span, message: impl Into<String>) -> &mut Diagnostic {
        let diagnostic = self.lines.diagnostic(severity, span.from, span.to, message);
        self.program.diagnostics.push(diagnostic);
        let last = self.program.diagnostics.len() - 1;
        &mut self.program.diagnostics[last]
    }

    fn error(&mut self, span: Span, message: impl Into<String>) -> &mut Diagnostic {
        self.report(Severity::Error, span, message)
    }

    fn warning(&mut self, span: Span, message: impl Into<String>) -> &mut Diagnostic {
        self.report(Severity::Warning, span, message)
    }

    fn already_declared(&mut self, name: &str, span: Span, first: Span) {
        let action = Action::jump_to_declaration(first.from, first.to);
        self.error(span, format!("'{name}' is already declared"))
            .with_action(action);
    }

    fn line_of(&self, offset: usize) -> usize {
        self.lines.line_of(offset)
    }

    fn record_reference(&mut self, reference: Reference) {
        let line = self.line_of(reference.range.from);
        if let Some(metadata) = self.program.metadata.lines.get_mut(line) {
            metadata.references.push(reference.clone());
        }
        self.program.metadata.references.push(reference);
    }
}

pub(crate) fn node_span(node: &SyntaxNode) -> Span {
    let range = node.text_range();
    Span::new(range.start().into(), range.end().into())
}

pub(crate) fn token_span(token: &SyntaxToken) -> Span {
    let range = token.text_range();
    Span::new(range.start().into(), range.end().into())
}

pub(crate) fn child_node(node: &SyntaxNode, kind: SyntaxKind) -> Option<SyntaxNode> {
    node.children().find(|child| child.kind() == kind)
}

pub(crate) fn child_token(node: &SyntaxNode, kind: SyntaxKind) -> Option<SyntaxToken> {
    node.children_with_tokens()
        .filter_map(|element| element.into_token())
        .find(|token| token.kind() == kind)
}

/// Variable key for a character name: lowercase, spaces as `_`.
pub fn character_key(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn declaration(source: &str) -> Declaration {
        let tree = sparkdown_syntax::parse(source);
        let node = &tree.nodes_of(SyntaxKind::DEFINE)[0];
        Declaration::from_define(node).unwrap()
    }

    #[rstest]
    #[case("define character.mara:\n  age = 30\n", "character.mara", Some("character.$default"))]
    #[case("define character.mara: hero\n", "character.mara", Some("character.hero"))]
    #[case("define gold: number = 5\n", "gold", None)]
    #[case("define v: T\n", "T.v", Some("T.$default"))]
    #[case("define T:\n  x = 1\n", "T.$default", None)]
    #[case("define count = 3\n", "count", None)]
    fn declaration_ids(
        #[case] source: &str,
        #[case] id: &str,
        #[case] parent: Option<&str>,
    ) {
        let declaration = declaration(source);
        assert_eq!(declaration.id, id);
        assert_eq!(declaration.parent.as_deref(), parent);
    }

    #[test]
    fn struct_and_inferred_flags() {
        assert!(declaration("define T:\n  x = 1\n").struct_type);
        assert!(declaration("define count = 3\n").inferred);
        assert_eq!(declaration("define gold: number = 5\n").ty, "number");
    }

    #[rstest]
    #[case("John", "john")]
    #[case("Old Man Jenkins", "old_man_jenkins")]
    fn character_keys(#[case] name: &str, #[case] key: &str) {
        assert_eq!(character_key(name), key);
    }
}
