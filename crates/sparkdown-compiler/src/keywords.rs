use std::collections::BTreeSet;

pub const RESERVED_KEYWORDS: &[&str] = &[
    "define",
    "import",
    "from",
    "if",
    "elif",
    "else",
    "end",
    "true",
    "false",
    "null",
    "character",
    "synth",
    "image",
    "audio",
    "channel",
    "type",
    "boolean",
    "number",
    "string",
];

/// Built-in reserved words plus any configured extras.
#[derive(Debug, Clone)]
pub struct Keywords {
    extra: BTreeSet<String>,
}

impl Keywords {
    pub fn new(extra: &[String]) -> Self {
        Self {
            extra: extra.iter().cloned().collect(),
        }
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        RESERVED_KEYWORDS.contains(&name) || self.extra.contains(name)
    }
}
