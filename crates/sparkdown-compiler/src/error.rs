use std::path::PathBuf;

/// Failures reported by host callbacks.
///
/// These never abort a compile: the compiler turns them into diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("cannot find file '{0}'")]
    FileNotFound(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
