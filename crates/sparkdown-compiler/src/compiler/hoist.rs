//! Pass 1: register every declared name before anything is evaluated.

use log::trace;
use serde_json::{Value, json};
use sparkdown_syntax::{SyntaxKind, SyntaxNode};

use super::outline::OutlineBuilder;
use super::{Compiler, Declaration, character_key, child_node, child_token, node_span, token_span};
use crate::program::{Chunk, OutlineItem, OutlineKind, ROOT_SECTION, Section, Span, Variable};

/// A section that is open while its children are hoisted.
struct OpenSection {
    id: String,
    level: usize,
    path: Vec<String>,
}

#[derive(Default)]
struct HoistScope {
    sections: Vec<OpenSection>,
    chunk: Option<String>,
    outline: OutlineBuilder,
    last_field: Option<String>,
}

impl Compiler<'_> {
    pub(super) fn hoist(&mut self, root: &SyntaxNode) {
        let mut scope = HoistScope::default();
        self.hoist_children(root, &mut scope);
        self.program.metadata.outline = scope.outline.finish();
    }

    fn hoist_children(&mut self, node: &SyntaxNode, scope: &mut HoistScope) {
        for child in node.children() {
            self.hoist_node(&child, scope);
        }
    }

    fn hoist_node(&mut self, node: &SyntaxNode, scope: &mut HoistScope) {
        match node.kind() {
            SyntaxKind::FRONT_MATTER => self.hoist_front_matter(node, scope),
            SyntaxKind::CHUNK => self.hoist_chunk(node, scope),
            SyntaxKind::SECTION => self.hoist_section(node, scope),
            SyntaxKind::SCENE => {
                let span = node_span(node);
                scope.outline.leaf(OutlineItem {
                    kind: OutlineKind::Scene,
                    name: scene_heading(node),
                    level: scope.outline.depth() + 1,
                    line: self.line_of(span.from),
                    range: span,
                    children: Vec::new(),
                });
            }
            SyntaxKind::DIALOGUE => self.hoist_character(node),
            SyntaxKind::DEFINE => {
                if let Some(declaration) = Declaration::from_define(node) {
                    self.hoist_declaration(node, &declaration);
                }
            }
            SyntaxKind::IMPORT => {
                if let Some(declaration) = Declaration::from_import(node) {
                    self.hoist_declaration(node, &declaration);
                }
            }
            SyntaxKind::BLOCK_QUOTE | SyntaxKind::CHOICE_LIST | SyntaxKind::CHOICE => {
                self.hoist_children(node, scope)
            }
            _ => {}
        }
    }

    fn hoist_front_matter(&mut self, node: &SyntaxNode, scope: &mut HoistScope) {
        for field in node.children() {
            if field.kind() != SyntaxKind::FRONT_MATTER_FIELD {
                continue;
            }
            let value = child_token(&field, SyntaxKind::FIELD_VALUE)
                .map(|token| token.text().trim().to_string());
            if value.as_deref().is_some_and(|value| value.starts_with('~')) {
                self.error(node_span(&field), "assignments are not allowed in front matter");
                continue;
            }
            match child_token(&field, SyntaxKind::FIELD_KEY) {
                Some(key) => {
                    let key = key.text().trim().to_string();
                    let values = self.program.front_matter.entry(key.clone()).or_default();
                    values.extend(value);
                    scope.last_field = Some(key);
                }
                // Indented continuation of the previous key
                None => {
                    if let (Some(key), Some(value)) = (&scope.last_field, value) {
                        self.program
                            .front_matter
                            .entry(key.clone())
                            .or_default()
                            .push(value);
                    }
                }
            }
        }
    }

    /// Reserved words and names already taken by a chunk, section, type or
    /// explicit variable. Reports and returns false on conflict.
    fn check_new_name(&mut self, name: &str, span: Span) -> bool {
        if self.keywords.is_reserved(name) {
            self.error(span, format!("'{name}' is a reserved keyword"));
            return false;
        }
        let earlier = self
            .declared_names
            .get(name)
            .or_else(|| self.types.get(name))
            .copied()
            .or_else(|| {
                self.program
                    .variables
                    .get(name)
                    .filter(|variable| !variable.implicit)
                    .and_then(|variable| variable.range)
            });
        if let Some(first) = earlier {
            self.already_declared(name, span, first);
            return false;
        }
        self.declared_names.insert(name.to_string(), span);
        true
    }

    fn hoist_chunk(&mut self, node: &SyntaxNode, scope: &mut HoistScope) {
        let span = node_span(node);
        let name = child_node(node, SyntaxKind::CHUNK_HEADING)
            .and_then(|heading| child_token(&heading, SyntaxKind::NAME));
        let registered = match name {
            Some(name) => {
                let text = name.text().to_string();
                self.check_new_name(&text, token_span(&name)).then_some(text)
            }
            None => None,
        };

        let outer = scope.chunk.take();
        if let Some(name) = &registered {
            trace!("chunk '{name}'");
            self.chunk_names.insert(span.from, name.clone());
            self.program.chunks.insert(
                name.clone(),
                Chunk {
                    name: name.clone(),
                    range: span,
                    sections: Vec::new(),
                },
            );
            scope.outline.open(OutlineItem {
                kind: OutlineKind::Chunk,
                name: name.clone(),
                level: 0,
                line: self.line_of(span.from),
                range: span,
                children: Vec::new(),
            });
            scope.chunk = registered.clone();
        }

        self.hoist_children(node, scope);

        if registered.is_some() {
            scope.outline.close();
        }
        scope.chunk = outer;
    }

    fn hoist_section(&mut self, node: &SyntaxNode, scope: &mut HoistScope) {
        let span = node_span(node);
        let heading = child_node(node, SyntaxKind::SECTION_HEADING);
        let level = heading
            .as_ref()
            .and_then(|h| child_token(h, SyntaxKind::HEADING_MARK))
            .map_or(1, |mark| mark.text().len());
        let name = heading
            .as_ref()
            .and_then(|h| child_token(h, SyntaxKind::NAME));

        let registered = match name {
            Some(name) => {
                let text = name.text().to_string();
                let name_span = token_span(&name);
                if let Some(enclosing) = scope.sections.last()
                    && level > enclosing.level + 1
                    && self.options.warn_on_level_jump
                {
                    let message = format!(
                        "section level jumps from {} to {level}",
                        enclosing.level
                    );
                    self.warning(name_span, message);
                }
                if self.check_new_name(&text, name_span) {
                    Some(self.register_section(text, level, span, scope))
                } else {
                    None
                }
            }
            None => None,
        };

        if let Some(open) = registered {
            self.section_ids.insert(span.from, open.id.clone());
            scope.outline.open(OutlineItem {
                kind: OutlineKind::Section,
                name: open.path.last().cloned().unwrap_or_default(),
                level,
                line: self.line_of(span.from),
                range: span,
                children: Vec::new(),
            });
            scope.sections.push(open);
            self.hoist_children(node, scope);
            scope.sections.pop();
            scope.outline.close();
        } else {
            self.hoist_children(node, scope);
        }
    }

    fn register_section(
        &mut self,
        name: String,
        level: usize,
        span: Span,
        scope: &HoistScope,
    ) -> OpenSection {
        let parent = scope
            .sections
            .iter()
            .rev()
            .find(|open| open.level + 1 == level);
        let mut path = parent.map(|p| p.path.clone()).unwrap_or_default();
        path.push(name.clone());
        let id = path.join(".");
        let parent_id = parent.map(|p| p.id.clone());
        trace!("section '{id}' at level {level}");

        match &parent_id {
            Some(parent) => {
                if let Some(section) = self.program.sections.get_mut(parent) {
                    section.children.push(id.clone());
                }
            }
            None => {
                if let Some(root) = self.program.sections.get_mut(ROOT_SECTION) {
                    root.children.push(id.clone());
                }
                if let Some(chunk) = scope
                    .chunk
                    .as_ref()
                    .and_then(|chunk| self.program.chunks.get_mut(chunk))
                {
                    chunk.sections.push(id.clone());
                }
            }
        }

        self.program.sections.insert(
            id.clone(),
            Section {
                id: id.clone(),
                name,
                level,
                parent: parent_id,
                chunk: scope.chunk.clone(),
                children: Vec::new(),
                path: path.clone(),
                range: span,
                tokens: Vec::new(),
                checkpoints: Vec::new(),
            },
        );
        OpenSection { id, level, path }
    }

    /// First sight of a speaker declares implicit `character` and `synth`
    /// variables for them.
    fn hoist_character(&mut self, node: &SyntaxNode) {
        let Some(name) = child_node(node, SyntaxKind::CHARACTER)
            .and_then(|character| child_token(&character, SyntaxKind::CHARACTER_NAME))
        else {
            return;
        };
        let display = name.text().trim().to_string();
        let key = character_key(&display);
        for (ty, value) in [
            ("character", json!({ "name": display })),
            ("synth", json!({})),
        ] {
            let id = format!("{ty}.{key}");
            if self.program.variables.contains_key(&id) {
                continue;
            }
            self.program.variables.insert(
                id.clone(),
                Variable {
                    id,
                    ty: ty.to_string(),
                    name: key.clone(),
                    parent: Some(format!("{ty}.$default")),
                    compiled: value,
                    fields: Vec::new(),
                    range: None,
                    implicit: true,
                },
            );
        }
    }

    fn hoist_declaration(&mut self, node: &SyntaxNode, declaration: &Declaration) {
        let id = &declaration.id;
        match self.program.variables.get_mut(id) {
            Some(existing) if existing.implicit => {
                existing.implicit = false;
                existing.range = Some(declaration.span);
            }
            Some(existing) => {
                let first = existing.range.unwrap_or(declaration.span);
                self.already_declared(id, declaration.span, first);
                self.dropped.insert(node_span(node).from);
                return;
            }
            None => {
                self.program.variables.insert(
                    id.clone(),
                    Variable {
                        id: id.clone(),
                        ty: declaration.ty.clone(),
                        name: declaration.name.clone(),
                        parent: declaration.parent.clone(),
                        compiled: Value::Null,
                        fields: Vec::new(),
                        range: Some(declaration.span),
                        implicit: false,
                    },
                );
            }
        }
        if let Some(variable) = self.program.variables.get_mut(id) {
            variable.parent = declaration.parent.clone();
        }
        if declaration.struct_type {
            self.types
                .entry(declaration.ty.clone())
                .or_insert(declaration.span);
        }
        if node.kind() == SyntaxKind::DEFINE {
            self.definitions.insert(id.clone(), node.clone());
        }
    }
}

/// Scene heading text without the forcing `.`.
pub(super) fn scene_heading(node: &SyntaxNode) -> String {
    node.descendants_with_tokens()
        .filter_map(|element| element.into_token())
        .filter(|token| token.kind() != SyntaxKind::SCENE_MARK)
        .map(|token| token.text().to_string())
        .collect::<String>()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use crate::callbacks::LiteralCallbacks;
    use crate::compiler::{CompileOptions, compile_script};
    use crate::program::OutlineKind;
    use pretty_assertions::assert_eq;

    fn compile(source: &str) -> crate::program::Program {
        compile_script(source, &LiteralCallbacks::new(), &CompileOptions::default())
    }

    #[test]
    fn front_matter_keys_accumulate() {
        let program = compile("---\ntitle: Demo\nauthor: A\n  B\nauthor: C\n---\nText.\n");
        assert_eq!(program.front_matter["title"], vec!["Demo"]);
        assert_eq!(program.front_matter["author"], vec!["A", "B", "C"]);
    }

    #[test]
    fn sections_parent_by_level() {
        let program = compile("# A\n## B\n### C\n## D\n# E\n");
        assert_eq!(program.sections["A.B.C"].parent.as_deref(), Some("A.B"));
        assert_eq!(program.sections["A.D"].parent.as_deref(), Some("A"));
        assert_eq!(program.sections["A"].children, vec!["A.B", "A.D"]);
        assert_eq!(program.sections[""].children, vec!["A", "E"]);
        assert!(program.diagnostics.is_empty());
    }

    #[test]
    fn level_jump_is_a_warning() {
        let program = compile("# A\n### C\n");
        assert_eq!(program.diagnostics.len(), 1);
        assert_eq!(
            program.diagnostics[0].message,
            "section level jumps from 1 to 3"
        );
        // No level-2 section is open, so C hangs off the root
        assert_eq!(program.sections["C"].parent, None);
    }

    #[test]
    fn reserved_section_name() {
        let program = compile("# define\n");
        assert_eq!(program.diagnostics[0].message, "'define' is a reserved keyword");
        assert!(!program.sections.contains_key("define"));
    }

    #[test]
    fn chunks_own_their_top_level_sections() {
        let program = compile("% one\n# A\n## B\n% two\n# C\n");
        assert_eq!(program.chunks["one"].sections, vec!["A"]);
        assert_eq!(program.chunks["two"].sections, vec!["C"]);
        assert_eq!(program.sections["C"].chunk.as_deref(), Some("two"));
    }

    #[test]
    fn outline_nests_chunks_sections_and_scenes() {
        let program = compile("% one\n# A\nINT. ROOM - DAY\n\nText.\n");
        let outline = &program.metadata.outline;
        assert_eq!(outline.len(), 1);
        assert_eq!(outline[0].kind, OutlineKind::Chunk);
        let section = &outline[0].children[0];
        assert_eq!(section.name, "A");
        assert_eq!(section.children[0].kind, OutlineKind::Scene);
        assert_eq!(section.children[0].name, "INT. ROOM - DAY");
    }

    #[test]
    fn characters_become_implicit_variables() {
        let program = compile("Old Man: Hi.\nOld Man: Again.\n");
        let character = &program.variables["character.old_man"];
        assert!(character.implicit);
        assert_eq!(character.compiled["name"], "Old Man");
        assert!(program.variables.contains_key("synth.old_man"));
    }

    #[test]
    fn explicit_define_replaces_implicit_flag() {
        let program = compile("John: Hi.\n\ndefine character.john:\n  age = 30\n");
        let john = &program.variables["character.john"];
        assert!(!john.implicit);
        assert_eq!(john.compiled["name"], "John");
        assert_eq!(john.compiled["age"], 30);
        assert!(program.diagnostics.is_empty(), "{:?}", program.diagnostics);
    }
}
