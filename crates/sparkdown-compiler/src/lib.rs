//! # sparkdown-compiler
//!
//! Turns a [`sparkdown_syntax::Tree`] into a [`Program`]: sections and their
//! tokens, compiled variables, diagnostics and editor metadata.
//!
//! ```
//! use sparkdown_compiler::{CompileOptions, LiteralCallbacks, compile_script};
//!
//! let program = compile_script(
//!     "# Start\nJohn: Hello.\n",
//!     &LiteralCallbacks::new(),
//!     &CompileOptions::default(),
//! );
//! assert!(program.diagnostics.is_empty());
//! assert_eq!(program.section_tokens("Start").len(), 1);
//! ```
//!
//! ## Module Structure
//!
//! ```text
//! sparkdown-compiler/
//! ├── lib.rs          # This file - public API
//! ├── program.rs      # Program model (serde)
//! ├── compiler/
//! │   ├── mod.rs      # compile(), options, declarations
//! │   ├── hoist.rs    # Pass 1: names, sections, outline
//! │   ├── process.rs  # Pass 2: values, tokens, references
//! │   ├── outline.rs  # Outline tree builder
//! │   └── timing.rs   # Speech duration estimates
//! ├── callbacks.rs    # Expression hooks and LiteralCallbacks
//! ├── diagnostic.rs   # Diagnostics and line/column mapping
//! ├── keywords.rs     # Reserved names
//! ├── value.rs        # JSON value helpers
//! └── error.rs        # CompileError
//! ```

pub mod callbacks;
pub mod compiler;
pub mod diagnostic;
pub mod error;
pub mod keywords;
pub mod program;
pub mod value;

pub use callbacks::{
    CompileResult, ExpressionDiagnostic, ExpressionReference, FormatResult, LiteralCallbacks,
    ScriptCallbacks,
};
pub use compiler::{CompileOptions, character_key, compile, compile_script};
pub use diagnostic::{Action, Diagnostic, Focus, LineIndex, Severity};
pub use error::CompileError;
pub use keywords::Keywords;
pub use program::{
    CharacterMetadata, Chunk, Context, DialogueLine, Field, LineMetadata, Metadata, OutlineItem,
    OutlineKind, Program, ROOT_SECTION, Reference, ReferenceKind, SceneMetadata, Section, Span,
    Token, TokenKind, Variable,
};
pub use value::ValueKind;
