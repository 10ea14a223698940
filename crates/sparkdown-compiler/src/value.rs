//! Compiled values, their JSON kinds and the coarse shapes used for type checks.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Types whose variables are keyed by name alone.
pub const PRIMITIVE_TYPES: [&str; 3] = ["boolean", "number", "string"];

pub fn is_primitive_type(ty: &str) -> bool {
    PRIMITIVE_TYPES.contains(&ty)
}

/// Exact JSON kind of a compiled value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Boolean,
    Number,
    String,
    Object,
    Array,
    Null,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Object(_) => Self::Object,
            Value::Array(_) => Self::Array,
            Value::Null => Self::Null,
        }
    }

    /// Primitive or object; `None` for null, which matches anything.
    pub fn shape(self) -> Option<Shape> {
        match self {
            Self::Boolean | Self::Number | Self::String => Some(Shape::Primitive),
            Self::Object | Self::Array => Some(Shape::Object),
            Self::Null => None,
        }
    }

    /// The kind a primitive type annotation promises.
    pub fn of_primitive(ty: &str) -> Option<Self> {
        match ty {
            "boolean" => Some(Self::Boolean),
            "number" => Some(Self::Number),
            "string" => Some(Self::String),
            _ => None,
        }
    }

    /// Name used as the variable type of an untyped scalar declaration.
    pub fn primitive_name(self) -> Option<&'static str> {
        match self {
            Self::Boolean => Some("boolean"),
            Self::Number => Some("number"),
            Self::String => Some("string"),
            _ => None,
        }
    }
}

/// Coarse kind compared between a declaration and its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Primitive,
    Object,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Primitive => "primitive",
            Self::Object => "object",
        })
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Boolean => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Object => "object",
            Self::Array => "array",
            Self::Null => "null",
        };
        f.write_str(name)
    }
}

/// Write `value` at a dotted property path, creating objects on the way.
///
/// Whatever sits at the path is replaced, so arrays are never merged.
pub fn set_path(target: &mut Value, path: &str, value: Value) {
    let mut current = target;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

pub fn get_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

/// Overlay `layer` onto `base` property by property.
///
/// Nested objects are merged; any other value, arrays included, replaces the
/// base value wholesale.
pub fn overlay(base: &mut Value, layer: &Value) {
    match (base, layer) {
        (Value::Object(base), Value::Object(layer)) => {
            for (key, value) in layer {
                match base.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        overlay(existing, value)
                    }
                    _ => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, layer) => *base = layer.clone(),
    }
}

/// Text a value renders as inside dialogue and action.
pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
