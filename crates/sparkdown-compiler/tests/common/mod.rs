use sparkdown_compiler::{CompileOptions, LiteralCallbacks, Program, TokenKind, compile_script};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn compile(source: &str) -> Program {
    init_logging();
    compile_script(source, &LiteralCallbacks::new(), &CompileOptions::default())
}

pub fn messages(program: &Program) -> Vec<&str> {
    program
        .diagnostics
        .iter()
        .map(|d| d.message.as_str())
        .collect()
}

/// One line per token: source line, section, summary, checkpoint.
pub fn dump_tokens(program: &Program) -> String {
    program
        .tokens
        .iter()
        .map(|token| {
            let summary = match &token.kind {
                TokenKind::Dialogue {
                    character, lines, ..
                } => format!("dialogue {character} x{}", lines.len()),
                TokenKind::Action { text, .. } => format!("action {text:?}"),
                TokenKind::Scene { heading } => format!("scene {heading:?}"),
                TokenKind::Transition { text } => format!("transition {text:?}"),
                TokenKind::Choice { text, once, target } => {
                    format!("choice {text:?} once={once} -> {target:?}")
                }
                TokenKind::Jump { target } => format!("jump {target}"),
                TokenKind::Assign {
                    target,
                    operator,
                    value,
                } => format!("assign {target} {operator} {value}"),
                TokenKind::Condition { keyword, value } => format!("condition {keyword} {value:?}"),
            };
            format!(
                "{} [{}] {summary} {}",
                token.line,
                token.section,
                token.checkpoint.as_deref().unwrap_or("-")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
