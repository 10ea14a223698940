//! Pass 2: build values, tokens, checkpoints, references and metadata.

use std::ops::Range;

use log::trace;
use serde_json::{Map, Value, json};
use sparkdown_syntax::{SyntaxKind, SyntaxNode};

use super::hoist::scene_heading;
use super::timing::speech_duration;
use super::{Compiler, Declaration, character_key, child_node, child_token, node_span, token_span};
use crate::callbacks::{ExpressionDiagnostic, ExpressionReference, lookup};
use crate::diagnostic::Action;
use crate::program::{
    CharacterMetadata, DialogueLine, Field, ROOT_SECTION, Reference, ReferenceKind,
    SceneMetadata, Span, Token, TokenKind,
};
use crate::value::{Shape, ValueKind, overlay, set_path};

const ASSET_TYPES: [&str; 3] = ["image", "audio", "video"];

#[derive(Default)]
struct ProcessState {
    section: String,
    scopes: Vec<String>,
    /// Last token that received a checkpoint, with the line it ends on.
    checkpointed: Option<(usize, usize)>,
    /// Last dialogue token, with the line it ends on.
    dialogue: Option<(usize, usize)>,
    /// Index into the scene metadata that durations accrue to.
    scene: Option<usize>,
    /// Open `~ if` lines.
    conditions: Vec<Span>,
}

fn checkpoint_id(section: &str, suffix: &str) -> String {
    if section.is_empty() {
        suffix.to_string()
    } else {
        format!("{section}.{suffix}")
    }
}

fn layer(base: &mut Option<Value>, top: &Value) {
    match base {
        Some(base) => overlay(base, top),
        None => *base = Some(top.clone()),
    }
}

/// Quoted string token without its quotes.
fn unquote(text: &str) -> String {
    if text.starts_with('"')
        && let Ok(unescaped) = serde_json::from_str::<String>(text)
    {
        return unescaped;
    }
    let inner = text.get(1..text.len().saturating_sub(1)).unwrap_or_default();
    inner.to_string()
}

/// One rendered source line. Hidden markup can leave gaps, so each kept
/// token records where its text sits in the line and in the source.
#[derive(Debug, Default)]
struct ContentLine {
    text: String,
    segments: Vec<(usize, usize)>,
}

impl ContentLine {
    fn push(&mut self, source: usize, text: &str) {
        self.segments.push((self.text.len(), source));
        self.text.push_str(text);
    }

    fn source_offset(&self, at: usize) -> usize {
        let index = self.segments.partition_point(|(start, _)| *start <= at);
        match index.checked_sub(1).and_then(|i| self.segments.get(i)) {
            Some((start, source)) => source + (at - start),
            None => at,
        }
    }

    /// Source span of a range within the line text.
    fn span(&self, range: Range<usize>) -> Span {
        let from = self.source_offset(range.start);
        let to = if range.end > range.start {
            self.source_offset(range.end - 1) + 1
        } else {
            from
        };
        Span::new(from, to)
    }
}

/// Source lines of a block with container markup and checkpoint, divert and
/// note markup left out.
fn content_lines(node: &SyntaxNode) -> Vec<ContentLine> {
    let mut lines = Vec::new();
    let mut current: Option<ContentLine> = None;
    for token in node
        .descendants_with_tokens()
        .filter_map(|element| element.into_token())
    {
        match token.kind() {
            SyntaxKind::NEWLINE => {
                lines.extend(current.take());
                continue;
            }
            SyntaxKind::WHITESPACE | SyntaxKind::QUOTE_MARK if current.is_none() => continue,
            _ => {}
        }
        let hidden = token
            .parent_ancestors()
            .take_while(|ancestor| ancestor != node)
            .any(|ancestor| {
                matches!(
                    ancestor.kind(),
                    SyntaxKind::CHECKPOINT | SyntaxKind::DIVERT | SyntaxKind::NOTE
                )
            });
        if hidden {
            continue;
        }
        current
            .get_or_insert_with(ContentLine::default)
            .push(token.text_range().start().into(), token.text());
    }
    lines.extend(current);
    lines
        .into_iter()
        .filter_map(|mut line| {
            line.text.truncate(line.text.trim_end().len());
            (!line.text.is_empty()).then_some(line)
        })
        .collect()
}

impl Compiler<'_> {
    pub(super) fn process(&mut self, root: &SyntaxNode) {
        self.build_implicit_variables();
        let mut state = ProcessState {
            section: ROOT_SECTION.to_string(),
            ..ProcessState::default()
        };
        self.process_children(root, &mut state);
        for span in std::mem::take(&mut state.conditions) {
            self.error(span, "'~ if' is never closed with '~ end'");
        }
    }

    fn process_children(&mut self, node: &SyntaxNode, state: &mut ProcessState) {
        for child in node.children() {
            self.process_node(&child, state);
        }
    }

    fn process_node(&mut self, node: &SyntaxNode, state: &mut ProcessState) {
        match node.kind() {
            SyntaxKind::CHUNK => self.process_chunk(node, state),
            SyntaxKind::SECTION => self.process_section(node, state),
            SyntaxKind::BLOCK_QUOTE | SyntaxKind::CHOICE_LIST => self.process_children(node, state),
            SyntaxKind::CHOICE => self.process_choice(node, state),
            SyntaxKind::SCENE => self.process_scene(node, state),
            SyntaxKind::TRANSITION => {
                let text = node.text().to_string().trim().to_string();
                self.push_token(state, TokenKind::Transition { text }, node_span(node), true);
            }
            SyntaxKind::DIALOGUE => self.process_dialogue(node, state),
            SyntaxKind::ACTION => self.process_action(node, state),
            SyntaxKind::JUMP => self.process_jump(node, state),
            SyntaxKind::CHECKPOINT => {
                if let Some(name) = child_token(node, SyntaxKind::NAME) {
                    let span = token_span(&name);
                    self.explicit_checkpoint(state, name.text(), span);
                }
            }
            SyntaxKind::DEFINE => self.process_define(node),
            SyntaxKind::IMPORT => self.process_import(node),
            SyntaxKind::ASSIGN => self.process_assign(node, state),
            SyntaxKind::CONDITION => self.process_condition(node, state),
            _ => {}
        }
    }

    fn mark_scopes(&mut self, span: Span, scopes: &[String]) {
        let first = self.line_of(span.from);
        let last = self.line_of(span.to.saturating_sub(1).max(span.from));
        for line in first..=last {
            if let Some(metadata) = self.program.metadata.lines.get_mut(line) {
                metadata.scopes = scopes.to_vec();
            }
        }
    }

    fn end_line(&self, span: Span) -> usize {
        self.line_of(span.to.saturating_sub(1).max(span.from))
    }

    fn process_chunk(&mut self, node: &SyntaxNode, state: &mut ProcessState) {
        let span = node_span(node);
        let name = self.chunk_names.get(&span.from).cloned();
        if let Some(name) = &name {
            state.scopes.push(name.clone());
            self.mark_scopes(span, &state.scopes);
        }
        self.process_children(node, state);
        if name.is_some() {
            state.scopes.pop();
        }
        state.checkpointed = None;
    }

    fn process_section(&mut self, node: &SyntaxNode, state: &mut ProcessState) {
        let span = node_span(node);
        let id = self.section_ids.get(&span.from).cloned();
        let outer = state.section.clone();
        if let Some(id) = &id {
            trace!("processing section '{id}'");
            state.section = id.clone();
            state.scopes.push(id.clone());
            self.mark_scopes(span, &state.scopes);
        }
        state.checkpointed = None;
        self.process_children(node, state);
        if id.is_some() {
            state.scopes.pop();
        }
        state.section = outer;
        state.checkpointed = None;
    }

    // Tokens and checkpoints

    fn push_token(
        &mut self,
        state: &mut ProcessState,
        kind: TokenKind,
        span: Span,
        checkpointed: bool,
    ) -> usize {
        let index = self.program.tokens.len();
        let mut checkpoint = None;
        if let Some(section) = self.program.sections.get_mut(&state.section) {
            if checkpointed {
                let id = checkpoint_id(&section.id, &section.checkpoints.len().to_string());
                section.checkpoints.push(id.clone());
                checkpoint = Some(id);
            }
            section.tokens.push(index);
        }
        let line = self.line_of(span.from);
        let end_line = self.end_line(span);
        self.program.tokens.push(Token {
            kind,
            section: state.section.clone(),
            checkpoint,
            range: span,
            line,
        });
        state.checkpointed = checkpointed.then_some((index, end_line));
        index
    }

    /// `^name` either renames the checkpoint of the token it directly
    /// follows, or adds a checkpoint of its own.
    fn explicit_checkpoint(&mut self, state: &mut ProcessState, name: &str, span: Span) {
        let line = self.line_of(span.from);
        let id = checkpoint_id(&state.section, name);
        let Some(section) = self.program.sections.get_mut(&state.section) else {
            return;
        };
        if section.checkpoints.contains(&id) {
            self.error(span, format!("checkpoint '{name}' is already declared"));
            return;
        }
        match state.checkpointed.take() {
            Some((index, end_line)) if line == end_line || line == end_line + 1 => {
                if let Some(last) = section.checkpoints.last_mut() {
                    *last = id.clone();
                }
                if let Some(token) = self.program.tokens.get_mut(index) {
                    token.checkpoint = Some(id);
                }
            }
            _ => section.checkpoints.push(id),
        }
    }

    fn inline_checkpoints(&mut self, node: &SyntaxNode, state: &mut ProcessState) {
        let names: Vec<_> = node
            .descendants()
            .filter(|n| n.kind() == SyntaxKind::CHECKPOINT)
            .filter_map(|n| child_token(&n, SyntaxKind::NAME))
            .collect();
        for name in names {
            self.explicit_checkpoint(state, name.text(), token_span(&name));
        }
    }

    fn add_scene_duration(&mut self, state: &ProcessState, seconds: f64) {
        if let Some(scene) = state
            .scene
            .and_then(|i| self.program.metadata.scenes.get_mut(i))
        {
            scene.duration += seconds;
        }
    }

    // Blocks

    /// Render a block's text, passing interpolated lines through the format
    /// callback.
    fn render(&mut self, node: &SyntaxNode) -> String {
        let mut rendered = Vec::new();
        for line in content_lines(node) {
            if line.text.contains('{') {
                let result = self.callbacks.format(&line.text, &self.program.context);
                self.absorb(|range| line.span(range), result.diagnostics, result.references);
                rendered.push(result.text);
            } else {
                rendered.push(line.text);
            }
        }
        rendered.join("\n")
    }

    fn process_scene(&mut self, node: &SyntaxNode, state: &mut ProcessState) {
        let span = node_span(node);
        let heading = scene_heading(node);
        self.process_inline(node, state);
        self.program.metadata.scenes.push(SceneMetadata {
            heading: heading.clone(),
            line: self.line_of(span.from),
            range: span,
            duration: 0.0,
        });
        state.scene = Some(self.program.metadata.scenes.len() - 1);
        self.push_token(state, TokenKind::Scene { heading }, span, true);
        self.inline_checkpoints(node, state);
    }

    fn process_action(&mut self, node: &SyntaxNode, state: &mut ProcessState) {
        let span = node_span(node);
        let text = self.render(node);
        let duration = speech_duration(
            &text,
            self.options.words_per_minute,
            self.options.pause_seconds,
        );
        self.process_inline(node, state);
        self.push_token(state, TokenKind::Action { text, duration }, span, true);
        self.add_scene_duration(state, duration);
        self.inline_checkpoints(node, state);
    }

    fn process_dialogue(&mut self, node: &SyntaxNode, state: &mut ProcessState) {
        let span = node_span(node);
        let character = child_node(node, SyntaxKind::CHARACTER);
        let name = character
            .as_ref()
            .and_then(|c| child_token(c, SyntaxKind::CHARACTER_NAME))
            .map(|t| t.text().trim().to_string())
            .unwrap_or_default();
        let extension = character
            .as_ref()
            .and_then(|c| child_token(c, SyntaxKind::CHARACTER_EXTENSION))
            .map(|t| t.text().to_string());
        let key = character_key(&name);

        let mut lines = Vec::new();
        let mut spoken = Vec::new();
        for child in node.children() {
            match child.kind() {
                SyntaxKind::DIALOGUE_LINE => {
                    let text = self.render(&child);
                    spoken.push(text.clone());
                    lines.push(DialogueLine::Speech(text));
                }
                SyntaxKind::PARENTHETICAL => {
                    lines.push(DialogueLine::Parenthetical(
                        child.text().to_string().trim().to_string(),
                    ));
                }
                _ => {}
            }
        }
        let duration = speech_duration(
            &spoken.join(" "),
            self.options.words_per_minute,
            self.options.pause_seconds,
        );

        self.process_inline(node, state);
        let index = self.push_token(
            state,
            TokenKind::Dialogue {
                character: key.clone(),
                name: name.clone(),
                extension,
                lines,
                position: None,
                duration,
            },
            span,
            true,
        );

        let start_line = self.line_of(span.from);
        let end_line = self.end_line(span);
        if let Some((previous, previous_end)) = state.dialogue
            && previous + 1 == index
            && previous_end + 1 == start_line
            && self.dialogue_position(previous).is_none()
        {
            self.set_position(previous, 1);
            self.set_position(index, 2);
        }
        state.dialogue = Some((index, end_line));

        for line in start_line..=end_line {
            if let Some(metadata) = self.program.metadata.lines.get_mut(line) {
                metadata.characters.push(key.clone());
            }
        }
        self.program
            .metadata
            .characters
            .entry(key)
            .or_insert_with(|| CharacterMetadata {
                name,
                lines: Vec::new(),
            })
            .lines
            .push(start_line);

        self.add_scene_duration(state, duration);
        self.inline_checkpoints(node, state);
    }

    fn dialogue_position(&self, index: usize) -> Option<u8> {
        match self.program.tokens.get(index).map(|token| &token.kind) {
            Some(TokenKind::Dialogue { position, .. }) => *position,
            _ => None,
        }
    }

    fn set_position(&mut self, index: usize, side: u8) {
        if let Some(Token {
            kind: TokenKind::Dialogue { position, .. },
            ..
        }) = self.program.tokens.get_mut(index)
        {
            *position = Some(side);
        }
    }

    fn process_choice(&mut self, node: &SyntaxNode, state: &mut ProcessState) {
        let span = node_span(node);
        let once = child_token(node, SyntaxKind::LIST_MARK).is_some_and(|mark| mark.text() == "*");
        let first_line = self.line_of(span.from);
        let first = node
            .children()
            .find(|child| self.line_of(node_span(child).from) == first_line);

        let mut text = String::new();
        let mut target = None;
        let mut end = span.from + 1;
        if let Some(first) = &first {
            end = node_span(first).to;
            match first.kind() {
                SyntaxKind::ACTION | SyntaxKind::DIALOGUE => {
                    text = self.render(first);
                    self.process_inline(first, state);
                    target = first
                        .descendants()
                        .find(|n| n.kind() == SyntaxKind::DIVERT)
                        .and_then(|divert| child_token(&divert, SyntaxKind::NAME))
                        .map(|name| {
                            self.resolve_section(&state.section, name.text())
                                .unwrap_or_else(|| name.text().to_string())
                        });
                }
                SyntaxKind::JUMP => {
                    target = self.jump_target(first, state);
                }
                SyntaxKind::ASSIGN => {
                    self.error(node_span(first), "assignments are not allowed in choice text");
                }
                _ => {}
            }
        }
        self.push_token(
            state,
            TokenKind::Choice { text, once, target },
            Span::new(span.from, end),
            false,
        );

        for child in node.children() {
            if first.as_ref() == Some(&child) {
                continue;
            }
            self.process_node(&child, state);
        }
    }

    fn process_jump(&mut self, node: &SyntaxNode, state: &mut ProcessState) {
        let span = node_span(node);
        match self.jump_target(node, state) {
            Some(target) => {
                self.push_token(state, TokenKind::Jump { target }, span, false);
            }
            None => {
                self.error(span, "missing jump target");
            }
        }
    }

    /// Resolved section id of a jump, or its name as written when it does
    /// not resolve.
    fn jump_target(&mut self, node: &SyntaxNode, state: &ProcessState) -> Option<String> {
        let name = child_token(node, SyntaxKind::NAME)?;
        let resolved = self.section_reference(name.text(), token_span(&name), state);
        Some(resolved.unwrap_or_else(|| name.text().to_string()))
    }

    // References

    /// Child, then sibling, then any section with that name, then an id path.
    pub(super) fn resolve_section(&self, current: &str, name: &str) -> Option<String> {
        let sections = &self.program.sections;
        let named = |ids: &[String]| {
            ids.iter()
                .find(|id| sections.get(*id).is_some_and(|s| s.name == name))
                .cloned()
        };
        let section = sections.get(current)?;
        if let Some(child) = named(&section.children) {
            return Some(child);
        }
        if current != ROOT_SECTION {
            let parent = section.parent.as_deref().unwrap_or(ROOT_SECTION);
            if let Some(sibling) = sections.get(parent).and_then(|p| named(&p.children)) {
                return Some(sibling);
            }
        }
        if let Some(any) = sections
            .values()
            .find(|s| s.id != ROOT_SECTION && s.name == name)
        {
            return Some(any.id.clone());
        }
        (name != ROOT_SECTION && sections.contains_key(name)).then(|| name.to_string())
    }

    fn section_reference(&mut self, name: &str, span: Span, state: &ProcessState) -> Option<String> {
        let target = self.resolve_section(&state.section, name);
        self.record_reference(Reference {
            kind: ReferenceKind::Section,
            name: name.to_string(),
            range: span,
            target: target.clone(),
        });
        if target.is_none() {
            self.error(span, format!("cannot find section '{name}'"));
        }
        target
    }

    /// Check asset tags and diverts inside a block.
    fn process_inline(&mut self, node: &SyntaxNode, state: &ProcessState) {
        for inline in node.descendants() {
            match inline.kind() {
                SyntaxKind::ASSET_TAG => {
                    if let Some(name) = child_token(&inline, SyntaxKind::ASSET_NAME) {
                        let target = ASSET_TYPES
                            .iter()
                            .map(|ty| format!("{ty}.{}", name.text()))
                            .find(|id| self.program.variables.contains_key(id));
                        self.asset_reference(ReferenceKind::Asset, name.text(), token_span(&name), target);
                    }
                    if let Some(channel) = child_token(&inline, SyntaxKind::ASSET_CHANNEL) {
                        let id = format!("channel.{}", channel.text());
                        let target = self.program.variables.contains_key(&id).then_some(id);
                        self.asset_reference(
                            ReferenceKind::Channel,
                            channel.text(),
                            token_span(&channel),
                            target,
                        );
                    }
                }
                SyntaxKind::DIVERT => {
                    if let Some(name) = child_token(&inline, SyntaxKind::NAME) {
                        self.section_reference(name.text(), token_span(&name), state);
                    }
                }
                _ => {}
            }
        }
    }

    fn asset_reference(
        &mut self,
        kind: ReferenceKind,
        name: &str,
        span: Span,
        target: Option<String>,
    ) {
        if target.is_none() {
            let what = match kind {
                ReferenceKind::Channel => "channel",
                _ => "asset",
            };
            self.error(span, format!("cannot find {what} '{name}'"));
        }
        self.record_reference(Reference {
            kind,
            name: name.to_string(),
            range: span,
            target,
        });
    }

    /// Record callback output, mapping its ranges to source spans.
    fn absorb(
        &mut self,
        to_span: impl Fn(Range<usize>) -> Span,
        diagnostics: Vec<ExpressionDiagnostic>,
        references: Vec<ExpressionReference>,
    ) {
        for diagnostic in diagnostics {
            self.report(diagnostic.severity, to_span(diagnostic.range), diagnostic.message);
        }
        for reference in references {
            let known = lookup(&self.program.context, &reference.name).is_some()
                || self.resolve_variable(&reference.name).is_some();
            self.record_reference(Reference {
                kind: ReferenceKind::Variable,
                target: known.then(|| reference.name.clone()),
                name: reference.name,
                range: to_span(reference.range),
            });
        }
    }

    fn compile_expression(&mut self, node: &SyntaxNode) -> Value {
        let span = node_span(node);
        let text = node.text().to_string();
        let result = self.callbacks.compile(&text, &self.program.context);
        let shift = |range: Range<usize>| Span::new(span.from + range.start, span.from + range.end);
        self.absorb(shift, result.diagnostics, result.references);
        result.value
    }

    /// Variable id an assignment target or expression path writes to.
    fn resolve_variable(&self, path: &str) -> Option<String> {
        let variables = &self.program.variables;
        let mut segments = path.split('.');
        let first = segments.next()?;
        if variables.contains_key(first) {
            return Some(first.to_string());
        }
        let typed = format!("{first}.{}", segments.next()?);
        variables.contains_key(&typed).then_some(typed)
    }

    // Declarations

    fn bind(&mut self, ty: &str, name: &str, value: Value) {
        self.program
            .context
            .entry(ty.to_string())
            .or_default()
            .insert(name.to_string(), value);
    }

    fn build_implicit_variables(&mut self) {
        let implicit: Vec<String> = self
            .program
            .variables
            .values()
            .filter(|variable| variable.implicit)
            .map(|variable| variable.id.clone())
            .collect();
        for id in implicit {
            let Some(variable) = self.program.variables.get(&id) else {
                continue;
            };
            let (ty, name, own, parent) = (
                variable.ty.clone(),
                variable.name.clone(),
                variable.compiled.clone(),
                variable.parent.clone(),
            );
            let mut value = self
                .inherited(parent.as_deref())
                .unwrap_or_else(|| Value::Object(Map::new()));
            overlay(&mut value, &own);
            if let Some(variable) = self.program.variables.get_mut(&id) {
                variable.compiled = value.clone();
            }
            self.bind(&ty, &name, value);
            self.built.insert(id);
        }
    }

    /// Compiled value of `parent`, building it first if it has not been.
    fn inherited(&mut self, parent: Option<&str>) -> Option<Value> {
        let parent = parent?;
        self.build_variable(parent);
        self.program
            .variables
            .get(parent)
            .map(|variable| variable.compiled.clone())
            .filter(|value| !value.is_null())
    }

    fn build_variable(&mut self, id: &str) {
        if self.built.contains(id) {
            return;
        }
        let Some(node) = self.definitions.get(id).cloned() else {
            return;
        };
        if !self.building.insert(id.to_string()) {
            let span = self
                .program
                .variables
                .get(id)
                .and_then(|variable| variable.range)
                .unwrap_or_else(|| node_span(&node));
            self.error(span, format!("'{id}' inherits from itself"));
            return;
        }
        self.define(&node);
        self.building.remove(id);
        self.built.insert(id.to_string());
    }

    fn process_define(&mut self, node: &SyntaxNode) {
        if self.dropped.contains(&node_span(node).from) {
            return;
        }
        match Declaration::from_define(node) {
            Some(declaration) => self.build_variable(&declaration.id),
            None => {
                let span = child_token(node, SyntaxKind::KEYWORD)
                    .map_or_else(|| node_span(node), |keyword| token_span(&keyword));
                self.error(span, "missing identifier");
            }
        }
    }

    fn report_unexpected(&mut self, node: &SyntaxNode) {
        for error in node.children().filter(|n| n.kind() == SyntaxKind::ERROR) {
            let text = error.text().to_string();
            self.error(node_span(&error), format!("unexpected '{}'", text.trim()));
        }
    }

    /// Build a declared value in layers: inherited fields, then the
    /// existing variable, then the declared value and fields.
    fn define(&mut self, node: &SyntaxNode) {
        let Some(declaration) = Declaration::from_define(node) else {
            return;
        };
        self.report_unexpected(node);

        let parent = declaration.parent.clone();
        let mut value = self.inherited(parent.as_deref());
        let parent_kind = value.as_ref().map(ValueKind::of);
        if let Some(existing) = self
            .program
            .variables
            .get(&declaration.id)
            .map(|variable| variable.compiled.clone())
            .filter(|existing| !existing.is_null())
        {
            layer(&mut value, &existing);
        }

        let mut expression_kind = None;
        let expression = child_node(node, SyntaxKind::EXPRESSION);
        if let Some(expression) = &expression {
            let compiled = self.compile_expression(expression);
            expression_kind = Some(ValueKind::of(&compiled));
            layer(&mut value, &compiled);
        } else if let Some(operator) = child_token(node, SyntaxKind::OPERATOR) {
            let end = token_span(&operator).to;
            self.error(Span::new(end, end), "missing expression");
        }

        let mut fields = Vec::new();
        for field in node
            .children()
            .filter(|child| child.kind() == SyntaxKind::STRUCT_FIELD)
        {
            let field_span = node_span(&field);
            if field.text().to_string().starts_with('~') {
                self.error(field_span, "assignments are not allowed in definitions");
                continue;
            }
            self.report_unexpected(&field);
            let Some(path) = child_node(&field, SyntaxKind::FIELD_PATH) else {
                self.error(field_span, "missing field name");
                continue;
            };
            let path = path.text().to_string();
            let Some(expression) = child_node(&field, SyntaxKind::EXPRESSION) else {
                self.error(field_span, format!("missing value for field '{path}'"));
                continue;
            };
            let compiled = self.compile_expression(&expression);
            let target = value.get_or_insert_with(|| Value::Object(Map::new()));
            set_path(target, &path, compiled.clone());
            fields.push(Field {
                path,
                value: compiled,
                range: field_span,
            });
        }
        let value = value.unwrap_or(Value::Null);
        let kind = ValueKind::of(&value);

        let mut ty = declaration.ty.clone();
        let mut mismatch = None;
        let found = expression_kind.and_then(ValueKind::shape);
        if declaration.inferred {
            ty = kind
                .primitive_name()
                .map_or_else(|| kind.to_string(), str::to_string);
        } else if ValueKind::of_primitive(&declaration.ty).is_some() {
            if let Some(found) = found.filter(|found| *found != Shape::Primitive) {
                let focus = declaration.annotation.as_ref().map(|(_, span)| *span);
                mismatch = Some((declaration.ty.clone(), found, focus));
            }
        } else if let (Some(expected), Some(found)) =
            (parent_kind.and_then(ValueKind::shape), found)
            && expected != found
        {
            let focus = parent
                .as_ref()
                .and_then(|parent| self.program.variables.get(parent))
                .and_then(|variable| variable.range);
            mismatch = Some((expected.to_string(), found, focus));
        }

        if let Some((expected, found, focus)) = &mismatch {
            let span = expression.as_ref().map_or(declaration.span, node_span);
            let action = match focus {
                Some(focus) => Action::jump_to_declaration(focus.from, focus.to),
                None => Action {
                    label: "Jump to declaration".to_string(),
                    focus: None,
                },
            };
            self.error(
                span,
                format!("type mismatch: expected {expected} but found {found}"),
            )
            .with_action(action);
        }

        if let Some(variable) = self.program.variables.get_mut(&declaration.id) {
            variable.ty = ty.clone();
            variable.compiled = value.clone();
            variable.fields = fields;
        }
        if mismatch.is_none() {
            self.bind(&ty, &declaration.name, value);
        }
    }

    fn process_import(&mut self, node: &SyntaxNode) {
        if self.dropped.contains(&node_span(node).from) {
            return;
        }
        self.report_unexpected(node);
        let Some(declaration) = Declaration::from_import(node) else {
            self.error(node_span(node), "expected 'import type.name from \"path\"'");
            return;
        };
        let Some(path_token) = child_token(node, SyntaxKind::STRING) else {
            self.error(declaration.span, "missing file path");
            return;
        };
        let path = unquote(path_token.text());
        let mut value = json!({ "src": path });
        match self.callbacks.read_file(&path) {
            Ok(data) => value["data"] = Value::String(data),
            Err(err) => {
                self.warning(token_span(&path_token), err.to_string());
            }
        }
        if let Some(variable) = self.program.variables.get_mut(&declaration.id) {
            variable.compiled = value.clone();
        }
        self.bind(&declaration.ty, &declaration.name, value);
    }

    // Logic

    fn process_assign(&mut self, node: &SyntaxNode, state: &mut ProcessState) {
        let span = node_span(node);
        let Some(target) = child_node(node, SyntaxKind::ASSIGN_TARGET) else {
            self.error(span, "missing variable name");
            return;
        };
        let target_span = node_span(&target);
        let target_text: String = target
            .text()
            .to_string()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if target
            .children_with_tokens()
            .any(|element| element.kind() == SyntaxKind::L_BRACKET)
        {
            self.error(
                target_span,
                "bracket notation is not allowed in assignments; use a dotted path",
            );
            return;
        }
        let operator = child_token(node, SyntaxKind::OPERATOR);
        let (Some(operator), Some(expression)) =
            (operator, child_node(node, SyntaxKind::EXPRESSION))
        else {
            self.error(Span::new(span.to, span.to), "missing expression");
            return;
        };

        let declared = self.resolve_variable(&target_text);
        self.record_reference(Reference {
            kind: ReferenceKind::Variable,
            name: target_text.clone(),
            range: target_span,
            target: declared.clone(),
        });
        if declared.is_none() {
            self.error(target_span, format!("cannot find variable '{target_text}'"));
            return;
        }

        let value = self.compile_expression(&expression);
        self.push_token(
            state,
            TokenKind::Assign {
                target: target_text,
                operator: operator.text().to_string(),
                value,
            },
            span,
            false,
        );
    }

    fn process_condition(&mut self, node: &SyntaxNode, state: &mut ProcessState) {
        let span = node_span(node);
        let keyword = child_token(node, SyntaxKind::KEYWORD)
            .map(|token| token.text().to_string())
            .unwrap_or_default();
        match keyword.as_str() {
            "if" => state.conditions.push(span),
            "elif" | "else" | "end" if state.conditions.is_empty() => {
                self.error(span, format!("'~ {keyword}' without a matching '~ if'"));
                return;
            }
            "end" => {
                state.conditions.pop();
            }
            _ => {}
        }

        let mut value = None;
        if matches!(keyword.as_str(), "if" | "elif") {
            match child_node(node, SyntaxKind::EXPRESSION) {
                Some(expression) => value = Some(self.compile_expression(&expression)),
                None => {
                    self.error(Span::new(span.to, span.to), "missing condition");
                }
            }
        }
        self.push_token(state, TokenKind::Condition { keyword, value }, span, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::LiteralCallbacks;
    use crate::compiler::{CompileOptions, compile_script};
    use crate::program::Program;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn compile(source: &str) -> Program {
        compile_script(source, &LiteralCallbacks::new(), &CompileOptions::default())
    }

    fn messages(program: &Program) -> Vec<&str> {
        program
            .diagnostics
            .iter()
            .map(|d| d.message.as_str())
            .collect()
    }

    #[test]
    fn content_lines_drop_markup() {
        let tree = sparkdown_syntax::parse("> Go now. ^mark\n> Then ((aside)) run.\n");
        let action = &tree.nodes_of(SyntaxKind::ACTION)[0];
        let lines: Vec<_> = content_lines(action).into_iter().map(|l| l.text).collect();
        assert_eq!(lines, vec!["Go now.", "Then  run."]);
    }

    #[test]
    fn content_line_spans_skip_hidden_markup() {
        let tree = sparkdown_syntax::parse("Hi ((aside)) {silver}.\n");
        let action = &tree.nodes_of(SyntaxKind::ACTION)[0];
        let lines = content_lines(action);
        assert_eq!(lines[0].text, "Hi  {silver}.");
        assert_eq!(lines[0].span(5..11), Span::new(14, 20));
        assert_eq!(lines[0].span(0..2), Span::new(0, 2));
    }

    #[rstest]
    #[case("\"logo.png\"", "logo.png")]
    #[case("'a b'", "a b")]
    #[case(r#""say \"hi\"""#, "say \"hi\"")]
    fn unquotes_strings(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(unquote(text), expected);
    }

    #[test]
    fn primitives_of_another_kind_still_bind() {
        let program = compile("define gold: number = \"lots\"\n");
        assert!(program.diagnostics.is_empty(), "{:?}", program.diagnostics);
        assert_eq!(program.value("number", "gold"), Some(&json!("lots")));
    }

    #[test]
    fn object_for_a_primitive_keeps_value_unbound() {
        let program = compile("define n: number = {\"a\": 1}\n");
        assert_eq!(
            messages(&program),
            vec!["type mismatch: expected number but found object"]
        );
        let action = &program.diagnostics[0].actions[0];
        assert_eq!(action.label, "Jump to declaration");
        let focus = action.focus.unwrap();
        assert_eq!((focus.from, focus.to), (10, 16));
        assert_eq!(program.variables["n"].compiled, json!({"a": 1}));
        assert_eq!(program.value("number", "n"), None);
    }

    #[test]
    fn array_satisfies_a_struct_default() {
        let program = compile("define T:\n  x = 1\n\ndefine T.v = [1, 2]\n");
        assert!(program.diagnostics.is_empty(), "{:?}", program.diagnostics);
        assert_eq!(program.value("T", "v"), Some(&json!([1, 2])));
    }

    #[test]
    fn struct_default_mismatch_focuses_the_type() {
        let program = compile("define character:\n  color = \"red\"\n\ndefine character.mara = 5\n");
        assert_eq!(
            messages(&program),
            vec!["type mismatch: expected object but found primitive"]
        );
        let focus = program.diagnostics[0].actions[0].focus.unwrap();
        assert_eq!(focus.from, 7);
        assert_eq!(focus.to, 16);
    }

    #[test]
    fn inferred_scalars_key_by_name() {
        let program = compile("define count = 3\ndefine title = \"Heist\"\n");
        assert_eq!(program.variables["count"].ty, "number");
        assert_eq!(program.value("number", "count"), Some(&json!(3)));
        assert_eq!(program.value("string", "title"), Some(&json!("Heist")));
    }

    #[test]
    fn inheritance_cycle_is_reported() {
        let program = compile("define a.x: a.y\n  v = 1\ndefine a.y: a.x\n  w = 2\n");
        assert_eq!(messages(&program), vec!["'a.x' inherits from itself"]);
    }

    #[test]
    fn duplicate_define_is_dropped() {
        let program = compile("define gold = 1\ndefine gold = 2\n");
        assert_eq!(messages(&program), vec!["'gold' is already declared"]);
        assert_eq!(program.value("number", "gold"), Some(&json!(1)));
    }

    #[test]
    fn imports_read_through_the_callback() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("intro.txt"), "Once upon a time").unwrap();
        let callbacks = LiteralCallbacks::with_root(dir.path());
        let program = compile_script(
            "import text.intro from \"intro.txt\"\nimport image.logo from \"logo.png\"\n",
            &callbacks,
            &CompileOptions::default(),
        );
        assert_eq!(
            program.value("text", "intro"),
            Some(&json!({"src": "intro.txt", "data": "Once upon a time"}))
        );
        assert_eq!(program.value("image", "logo"), Some(&json!({"src": "logo.png"})));
        assert_eq!(messages(&program), vec!["cannot find file 'logo.png'"]);
        assert_eq!(
            program.diagnostics[0].severity,
            crate::diagnostic::Severity::Warning
        );
    }

    #[rstest]
    #[case("~ gold = 1\n", "cannot find variable 'gold'")]
    #[case("define gold = 0\n~ gold[\"a\"] = 1\n", "bracket notation is not allowed in assignments; use a dotted path")]
    #[case("define gold = 0\n~ gold +=\n", "missing expression")]
    #[case("~ else\n", "'~ else' without a matching '~ if'")]
    #[case("~ if\n~ end\n", "missing condition")]
    #[case("~ if true\n", "'~ if' is never closed with '~ end'")]
    #[case("+ ~ gold = 1\n", "assignments are not allowed in choice text")]
    #[case("define hero:\n  ~ hp = 1\n", "assignments are not allowed in definitions")]
    #[case("---\ntitle: Heist\n~ gold = 1\n---\n", "assignments are not allowed in front matter")]
    #[case("-> Nowhere\n", "cannot find section 'Nowhere'")]
    fn logic_errors(#[case] source: &str, #[case] message: &str) {
        let program = compile(source);
        assert_eq!(messages(&program), vec![message]);
    }

    #[test]
    fn assignment_token() {
        let program = compile("define character.john:\n  gold = 3\n\n~ character.john.gold += 1\n");
        assert!(program.diagnostics.is_empty(), "{:?}", program.diagnostics);
        let assign = program.tokens.last().unwrap();
        assert_eq!(
            assign.kind,
            TokenKind::Assign {
                target: "character.john.gold".to_string(),
                operator: "+=".to_string(),
                value: json!(1),
            }
        );
    }

    #[test]
    fn choices_carry_text_and_target() {
        let program = compile("# Hub\n+ Go left -> Left\n* Stay\n  -> Left\n## Left\nDone.\n");
        assert!(program.diagnostics.is_empty(), "{:?}", program.diagnostics);
        let choices: Vec<_> = program
            .tokens
            .iter()
            .filter_map(|token| match &token.kind {
                TokenKind::Choice { text, once, target } => {
                    Some((text.as_str(), *once, target.clone()))
                }
                _ => None,
            })
            .collect();
        assert_eq!(
            choices,
            vec![
                ("Go left", false, Some("Hub.Left".to_string())),
                ("Stay", true, None),
            ]
        );
        // Lines below the choice text are still processed
        assert!(program.tokens.iter().any(|t| matches!(
            &t.kind,
            TokenKind::Jump { target } if target == "Hub.Left"
        )));
    }

    fn positions(program: &Program) -> Vec<Option<u8>> {
        program
            .tokens
            .iter()
            .filter_map(|token| match &token.kind {
                TokenKind::Dialogue { position, .. } => Some(*position),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn simultaneous_dialogue_positions() {
        let program = compile("John: Now!\nMary: Now!\n\nJohn: Alone.\n");
        assert_eq!(positions(&program), vec![Some(1), Some(2), None]);
        // Only the first pair of a run
        let run = compile("A: One.\nB: Two.\nC: Three.\n");
        assert_eq!(positions(&run), vec![Some(1), Some(2), None]);
    }

    #[test]
    fn interpolation_is_formatted() {
        let program = compile("define gold = 5\n\nYou have {gold} coins and {silver}.\n");
        let action = program.tokens.last().unwrap();
        assert!(matches!(
            &action.kind,
            TokenKind::Action { text, .. } if text == "You have 5 coins and ."
        ));
        assert_eq!(messages(&program), vec!["cannot find variable 'silver'"]);
        let diagnostic = &program.diagnostics[0];
        assert_eq!((diagnostic.line, diagnostic.start_column), (2, 27));
    }

    #[test]
    fn interpolation_after_a_note_points_at_the_expression() {
        let program = compile("Hi ((aside)) {silver}.\n");
        assert_eq!(messages(&program), vec!["cannot find variable 'silver'"]);
        let diagnostic = &program.diagnostics[0];
        assert_eq!((diagnostic.from, diagnostic.to), (14, 20));
        let reference = &program.metadata.references[0];
        assert_eq!(reference.range, Span::new(14, 20));
        assert_eq!(reference.target, None);
    }

    #[test]
    fn asset_and_channel_references() {
        let program = compile(
            "import image.door from \"door.png\"\n\nThe door. [[door]] [[music:theme]]\n",
        );
        assert_eq!(
            messages(&program),
            vec![
                "cannot find file 'door.png'",
                "cannot find asset 'theme'",
                "cannot find channel 'music'",
            ]
        );
        let kinds: Vec<_> = program
            .metadata
            .references
            .iter()
            .map(|r| (r.kind, r.target.clone()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (ReferenceKind::Asset, Some("image.door".to_string())),
                (ReferenceKind::Asset, None),
                (ReferenceKind::Channel, None),
            ]
        );
    }

    #[test]
    fn scene_durations_and_line_metadata() {
        let program = compile("# A\nINT. ROOM - DAY\n\nJohn: One two three four.\n");
        let scene = &program.metadata.scenes[0];
        assert_eq!(scene.heading, "INT. ROOM - DAY");
        assert!((scene.duration - (1.2 + 0.25)).abs() < 1e-9);
        assert_eq!(program.metadata.lines[3].scopes, vec!["A"]);
        assert_eq!(program.metadata.lines[3].characters, vec!["john"]);
        assert_eq!(program.metadata.characters["john"].lines, vec![3]);
    }
}
