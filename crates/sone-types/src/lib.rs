//! Shared types for the sone compiler.
//!
//! This crate defines the annotated AST and scope model handed over by the
//! semantic-analysis pass, source spans, and the structured diagnostics
//! used across all compiler stages.

mod error;
mod span;
pub mod ast;

pub use error::{CompileErrors, ErrorCategory, ErrorCode, Severity, SoneError, MAX_ERRORS};
pub use span::{SourceFile, Span};

/// Result type used throughout the sone compiler.
pub type Result<T> = std::result::Result<T, SoneError>;
