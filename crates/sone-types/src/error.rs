use crate::Span;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of errors reported before fail-fast.
pub const MAX_ERRORS: usize = 20;

/// Error severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Error category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    /// The analysed tree handed to the compiler could not be read.
    Input,
    /// A node has no translation, or its translation is not implemented.
    Operation,
    /// An operator was applied to an operand it cannot target.
    Target,
    /// Name resolution against the supplied scopes failed.
    Scope,
    /// The produced module failed assembly, validation or a size limit.
    Module,
}

/// Numeric error code (E100–E599).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Input errors (E100–E199) ──
    pub const MALFORMED_AST: Self = Self(100);

    // ── Operation errors (E200–E299) ──
    pub const UNKNOWN_OPERATION: Self = Self(200);
    pub const UNIMPLEMENTED_FEATURE: Self = Self(201);

    // ── Target errors (E300–E399) ──
    pub const INVALID_CLAMP_TARGET: Self = Self(300);
    pub const INVALID_ASSIGNMENT_TARGET: Self = Self(301);
    pub const INVALID_ARRAY_LENGTH_TARGET: Self = Self(302);

    // ── Scope errors (E400–E499) ──
    pub const UNRESOLVED_SYMBOL: Self = Self(400);

    // ── Module errors (E500–E599) ──
    pub const ASSEMBLY_FAILED: Self = Self(500);
    pub const VALIDATION_FAILED: Self = Self(501);
    pub const LIMIT_EXCEEDED: Self = Self(502);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            100..=199 => ErrorCategory::Input,
            200..=299 => ErrorCategory::Operation,
            300..=399 => ErrorCategory::Target,
            400..=499 => ErrorCategory::Scope,
            _ => ErrorCategory::Module,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

/// A structured compiler diagnostic.
///
/// Hosts render these directly; they must not parse free-form strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoneError {
    /// Input file name.
    pub file: String,
    /// Error code (e.g., E201).
    pub code: ErrorCode,
    /// Error severity.
    pub severity: Severity,
    /// Error category (derived from code).
    pub category: ErrorCategory,
    /// Human-readable error message.
    pub message: String,
    /// Source location.
    #[serde(flatten)]
    pub span: Span,
    /// The input line for context, when one is available.
    pub source_line: String,
    /// Optional fix suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl SoneError {
    /// Create a new error.
    pub fn new(
        file: impl Into<String>,
        code: ErrorCode,
        message: impl Into<String>,
        span: Span,
        source_line: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            code,
            severity: Severity::Error,
            category: code.category(),
            message: message.into(),
            span,
            source_line: source_line.into(),
            suggestion: None,
        }
    }

    /// Attach a fix suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for SoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} [{}] {}",
            self.span, self.code, self.category, self.message
        )
    }
}

impl std::error::Error for SoneError {}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Operation => write!(f, "operation"),
            Self::Target => write!(f, "target"),
            Self::Scope => write!(f, "scope"),
            Self::Module => write!(f, "module"),
        }
    }
}

/// The structured JSON output for compilation results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileErrors {
    pub errors: Vec<SoneError>,
    pub warnings: Vec<SoneError>,
    pub total_errors: usize,
    pub total_warnings: usize,
}

impl CompileErrors {
    /// Create an empty result (no errors).
    pub fn empty() -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            total_errors: 0,
            total_warnings: 0,
        }
    }

    /// Wrap a single error.
    pub fn single(error: SoneError) -> Self {
        let mut errs = Self::empty();
        errs.push_error(error);
        errs
    }

    /// Check if there are any errors.
    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// Add an error, respecting the MAX_ERRORS limit.
    pub fn push_error(&mut self, error: SoneError) {
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(error);
        }
        self.total_errors += 1;
    }

    /// Add a warning.
    pub fn push_warning(&mut self, warning: SoneError) {
        self.warnings.push(warning);
        self.total_warnings += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::MALFORMED_AST.category(), ErrorCategory::Input);
        assert_eq!(
            ErrorCode::UNKNOWN_OPERATION.category(),
            ErrorCategory::Operation
        );
        assert_eq!(
            ErrorCode::UNIMPLEMENTED_FEATURE.category(),
            ErrorCategory::Operation
        );
        assert_eq!(
            ErrorCode::INVALID_CLAMP_TARGET.category(),
            ErrorCategory::Target
        );
        assert_eq!(ErrorCode::UNRESOLVED_SYMBOL.category(), ErrorCategory::Scope);
        assert_eq!(ErrorCode::VALIDATION_FAILED.category(), ErrorCategory::Module);
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(format!("{}", ErrorCode::INVALID_ASSIGNMENT_TARGET), "E301");
        assert_eq!(format!("{}", ErrorCode::MALFORMED_AST), "E100");
    }

    #[test]
    fn test_error_display() {
        let err = SoneError::new(
            "synth.json",
            ErrorCode::INVALID_CLAMP_TARGET,
            "non-range passed as right side of clamp operator",
            Span::new(2, 9, 2, 14),
            "",
        );
        assert_eq!(
            err.to_string(),
            "2:9: E300 [target] non-range passed as right side of clamp operator"
        );
    }

    #[test]
    fn test_error_with_suggestion() {
        let err = SoneError::new(
            "synth.json",
            ErrorCode::INVALID_ARRAY_LENGTH_TARGET,
            "reading length of non-array",
            Span::point(1, 1),
            "",
        )
        .with_suggestion("apply `[]` to an array value");
        assert_eq!(
            err.suggestion.as_deref(),
            Some("apply `[]` to an array value")
        );
    }

    #[test]
    fn test_error_json_serialization() {
        let err = SoneError::new(
            "synth.json",
            ErrorCode::UNIMPLEMENTED_FEATURE,
            "unimplemented: indexed read",
            Span::new(12, 5, 12, 9),
            "",
        );

        let json = serde_json::to_string_pretty(&err).unwrap();
        assert!(json.contains("\"code\""));
        assert!(json.contains("\"category\": \"operation\""));
        assert!(json.contains("\"line\": 12"));
        assert!(json.contains("\"end_column\": 9"));
        assert!(!json.contains("\"suggestion\""));

        let back: SoneError = serde_json::from_str(&json).unwrap();
        assert_eq!(back.code, err.code);
        assert_eq!(back.span, err.span);
    }

    #[test]
    fn test_compile_errors_max_limit() {
        let mut errs = CompileErrors::empty();
        for i in 0..25 {
            errs.push_error(SoneError::new(
                "synth.json",
                ErrorCode::MALFORMED_AST,
                format!("Error {i}"),
                Span::point(i as u32 + 1, 1),
                "",
            ));
        }
        assert_eq!(errs.errors.len(), MAX_ERRORS);
        assert_eq!(errs.total_errors, 25);
        assert!(errs.has_errors());
    }

    #[test]
    fn test_compile_errors_empty() {
        let errs = CompileErrors::empty();
        assert!(!errs.has_errors());
        assert_eq!(errs.total_warnings, 0);
    }
}
