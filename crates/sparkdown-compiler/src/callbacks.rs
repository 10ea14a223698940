//! Hooks the compiler calls into for everything it does not evaluate itself.
//!
//! The compiler never evaluates expressions. Hosts plug in their own
//! expression language through [`ScriptCallbacks`]; [`LiteralCallbacks`]
//! covers JSON literals and variable paths, which is enough for declarations
//! and simple interpolation.

use std::ops::Range;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use sparkdown_config::Config;

use crate::diagnostic::Severity;
use crate::error::CompileError;
use crate::program::Context;
use crate::value::{PRIMITIVE_TYPES, display};

/// A problem inside an expression, relative to the expression text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionDiagnostic {
    pub range: Range<usize>,
    pub severity: Severity,
    pub message: String,
}

/// A variable an expression reads, relative to the expression text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionReference {
    pub range: Range<usize>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompileResult {
    pub value: Value,
    pub diagnostics: Vec<ExpressionDiagnostic>,
    pub references: Vec<ExpressionReference>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormatResult {
    pub text: String,
    pub diagnostics: Vec<ExpressionDiagnostic>,
    pub references: Vec<ExpressionReference>,
}

pub trait ScriptCallbacks {
    fn compile(&self, expression: &str, context: &Context) -> CompileResult;

    /// Render text containing `{expr}` interpolations.
    fn format(&self, template: &str, context: &Context) -> FormatResult;

    fn read_file(&self, path: &str) -> Result<String, CompileError> {
        Err(CompileError::FileNotFound(path.to_string()))
    }
}

fn path_regex() -> &'static Regex {
    static PATH: OnceLock<Regex> = OnceLock::new();
    PATH.get_or_init(|| {
        Regex::new(r"[A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*").expect("Invalid path regex")
    })
}

fn string_regex() -> &'static Regex {
    static STRING: OnceLock<Regex> = OnceLock::new();
    STRING.get_or_init(|| Regex::new(r#""(?:[^"\\]|\\.)*""#).expect("Invalid string regex"))
}

fn interpolation_regex() -> &'static Regex {
    static INTERPOLATION: OnceLock<Regex> = OnceLock::new();
    INTERPOLATION
        .get_or_init(|| Regex::new(r"\{([^{}]*)\}").expect("Invalid interpolation regex"))
}

const OPERATOR_WORDS: [&str; 6] = ["true", "false", "null", "and", "or", "not"];

/// Resolve a dotted path against the context.
///
/// `type.name.rest` is tried first, then `name.rest` against the primitive
/// buckets.
pub fn lookup<'c>(context: &'c Context, path: &str) -> Option<&'c Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let rest: Vec<&str> = segments.collect();

    let typed = rest.first().and_then(|name| {
        let value = context.get(first)?.get(*name)?;
        rest[1..]
            .iter()
            .try_fold(value, |current, segment| current.get(*segment))
    });
    typed.or_else(|| {
        PRIMITIVE_TYPES.iter().find_map(|ty| {
            let value = context.get(*ty)?.get(first)?;
            rest.iter()
                .try_fold(value, |current, segment| current.get(*segment))
        })
    })
}

/// Evaluates JSON literals and variable paths; anything else compiles to
/// `null` after its variable references are checked.
#[derive(Debug, Clone, Default)]
pub struct LiteralCallbacks {
    root: Option<PathBuf>,
}

impl LiteralCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve imports relative to `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn reference(
        context: &Context,
        range: Range<usize>,
        name: &str,
        result: &mut CompileResult,
    ) -> Option<Value> {
        result.references.push(ExpressionReference {
            range: range.clone(),
            name: name.to_string(),
        });
        let value = lookup(context, name).cloned();
        if value.is_none() {
            result.diagnostics.push(ExpressionDiagnostic {
                range,
                severity: Severity::Error,
                message: format!("cannot find variable '{name}'"),
            });
        }
        value
    }
}

impl From<&Config> for LiteralCallbacks {
    fn from(config: &Config) -> Self {
        Self {
            root: config.project.asset_root.clone(),
        }
    }
}

impl ScriptCallbacks for LiteralCallbacks {
    fn compile(&self, expression: &str, context: &Context) -> CompileResult {
        let mut result = CompileResult {
            value: Value::Null,
            diagnostics: Vec::new(),
            references: Vec::new(),
        };
        let trimmed = expression.trim();
        let lead = expression.len() - expression.trim_start().len();
        if trimmed.is_empty() {
            result.diagnostics.push(ExpressionDiagnostic {
                range: 0..expression.len(),
                severity: Severity::Error,
                message: "missing expression".to_string(),
            });
            return result;
        }

        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            result.value = value;
            return result;
        }

        let whole_path = path_regex()
            .find(trimmed)
            .is_some_and(|m| m.start() == 0 && m.end() == trimmed.len());
        if whole_path && !OPERATOR_WORDS.contains(&trimmed) {
            let range = lead..lead + trimmed.len();
            if let Some(value) = Self::reference(context, range, trimmed, &mut result) {
                result.value = value;
            }
            return result;
        }

        let strings: Vec<Range<usize>> = string_regex()
            .find_iter(expression)
            .map(|m| m.range())
            .collect();
        for m in path_regex().find_iter(expression) {
            let in_string = strings
                .iter()
                .any(|s| s.start <= m.start() && m.end() <= s.end);
            // Exponents and the like: `1e5`
            let after_digit = expression[..m.start()]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_digit() || c == '.');
            if in_string || after_digit || OPERATOR_WORDS.contains(&m.as_str()) {
                continue;
            }
            Self::reference(context, m.range(), m.as_str(), &mut result);
        }
        result
    }

    fn format(&self, template: &str, context: &Context) -> FormatResult {
        let mut formatted = FormatResult {
            text: String::with_capacity(template.len()),
            diagnostics: Vec::new(),
            references: Vec::new(),
        };
        let mut last = 0;
        for caps in interpolation_regex().captures_iter(template) {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            formatted.text.push_str(&template[last..whole.start()]);
            let compiled = self.compile(inner.as_str(), context);
            let shift = inner.start();
            formatted
                .diagnostics
                .extend(compiled.diagnostics.into_iter().map(|mut d| {
                    d.range = d.range.start + shift..d.range.end + shift;
                    d
                }));
            formatted
                .references
                .extend(compiled.references.into_iter().map(|mut r| {
                    r.range = r.range.start + shift..r.range.end + shift;
                    r
                }));
            formatted.text.push_str(&display(&compiled.value));
            last = whole.end();
        }
        formatted.text.push_str(&template[last..]);
        formatted
    }

    fn read_file(&self, path: &str) -> Result<String, CompileError> {
        let Some(root) = &self.root else {
            return Err(CompileError::FileNotFound(path.to_string()));
        };
        let full = root.join(path);
        if !full.exists() {
            return Err(CompileError::FileNotFound(path.to_string()));
        }
        std::fs::read_to_string(&full).map_err(|source| CompileError::Io { path: full, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn context() -> Context {
        let mut context = Context::new();
        context
            .entry("number".to_string())
            .or_insert_with(BTreeMap::new)
            .insert("gold".to_string(), json!(5));
        context
            .entry("character".to_string())
            .or_insert_with(BTreeMap::new)
            .insert("john".to_string(), json!({"name": "John", "stats": {"hp": 3}}));
        context
    }

    #[rstest]
    #[case("1", json!(1))]
    #[case(" \"hi\" ", json!("hi"))]
    #[case("[1, 2]", json!([1, 2]))]
    #[case("gold", json!(5))]
    #[case("character.john.stats.hp", json!(3))]
    #[case("gold > 3", Value::Null)]
    fn compiles_literals_and_paths(#[case] expression: &str, #[case] expected: Value) {
        let result = LiteralCallbacks::new().compile(expression, &context());
        assert_eq!(result.value, expected);
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn unknown_variables_are_reported_with_their_range() {
        let result = LiteralCallbacks::new().compile("gold + silver", &context());
        let names: Vec<_> = result.references.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["gold", "silver"]);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].range, 7..13);
        assert_eq!(result.diagnostics[0].message, "cannot find variable 'silver'");
    }

    #[test]
    fn empty_expression_is_an_error() {
        let result = LiteralCallbacks::new().compile("  ", &context());
        assert_eq!(result.diagnostics[0].message, "missing expression");
    }

    #[test]
    fn format_substitutes_and_shifts() {
        let result = LiteralCallbacks::new().format("You have {gold} coins, {who}.", &context());
        assert_eq!(result.text, "You have 5 coins, .");
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].range, 24..27);
    }

    #[test]
    fn read_file_needs_a_root() {
        assert!(matches!(
            LiteralCallbacks::new().read_file("a.png"),
            Err(CompileError::FileNotFound(path)) if path == "a.png"
        ));
    }

    #[test]
    fn read_file_relative_to_root() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        let callbacks = LiteralCallbacks::with_root(dir.path());
        assert_eq!(callbacks.read_file("notes.txt").unwrap(), "hello");
        assert!(callbacks.read_file("missing.txt").is_err());
    }
}
