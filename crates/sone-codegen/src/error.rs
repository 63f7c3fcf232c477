//! Codegen error types.

use sone_types::ast::Expr;
use sone_types::{ErrorCode, Span};
use thiserror::Error;

/// Errors that abort code generation.
///
/// Each variant carries the label of the offending node and its span.
#[derive(Debug, Error)]
pub enum CodegenError {
    /// The node has no translation in the position it appears in.
    #[error("unknown operation `{op}`")]
    UnknownOperation { op: &'static str, span: Span },

    /// A structurally valid construct the code generator does not support.
    #[error("unimplemented {feature} (`{op}`)")]
    UnimplementedFeature {
        feature: String,
        op: &'static str,
        span: Span,
    },

    /// The right side of `-<` is not a range.
    #[error("non-range passed as right side of clamp operator (`{op}`)")]
    InvalidClampTarget { op: &'static str, span: Span },

    /// The left side of `=` cannot be stored to, or the right side has no
    /// storable value.
    #[error("invalid assignment: {reason}")]
    InvalidAssignmentTarget { reason: String, span: Span },

    /// `a[]` applied to something that is not an array.
    #[error("reading length of non-array (`{op}`)")]
    InvalidArrayLengthTarget { op: &'static str, span: Span },

    /// An identifier is not bound in any enclosing scope.
    #[error("unresolved symbol: {name}")]
    UnresolvedSymbol { name: String, span: Span },

    /// Linear memory grew past what 32-bit addressing can hold.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),
}

impl CodegenError {
    pub(crate) fn unknown_operation(expr: &Expr) -> Self {
        Self::UnknownOperation {
            op: expr.kind.label(),
            span: expr.span,
        }
    }

    pub(crate) fn unimplemented(feature: impl Into<String>, expr: &Expr) -> Self {
        Self::UnimplementedFeature {
            feature: feature.into(),
            op: expr.kind.label(),
            span: expr.span,
        }
    }

    pub(crate) fn invalid_assignment(reason: impl Into<String>, span: Span) -> Self {
        Self::InvalidAssignmentTarget {
            reason: reason.into(),
            span,
        }
    }

    /// Stable diagnostic code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownOperation { .. } => ErrorCode::UNKNOWN_OPERATION,
            Self::UnimplementedFeature { .. } => ErrorCode::UNIMPLEMENTED_FEATURE,
            Self::InvalidClampTarget { .. } => ErrorCode::INVALID_CLAMP_TARGET,
            Self::InvalidAssignmentTarget { .. } => ErrorCode::INVALID_ASSIGNMENT_TARGET,
            Self::InvalidArrayLengthTarget { .. } => ErrorCode::INVALID_ARRAY_LENGTH_TARGET,
            Self::UnresolvedSymbol { .. } => ErrorCode::UNRESOLVED_SYMBOL,
            Self::LimitExceeded(_) => ErrorCode::LIMIT_EXCEEDED,
        }
    }

    /// Source span of the offending node, synthetic when there is none.
    pub fn span(&self) -> Span {
        match self {
            Self::UnknownOperation { span, .. }
            | Self::UnimplementedFeature { span, .. }
            | Self::InvalidClampTarget { span, .. }
            | Self::InvalidAssignmentTarget { span, .. }
            | Self::InvalidArrayLengthTarget { span, .. }
            | Self::UnresolvedSymbol { span, .. } => *span,
            Self::LimitExceeded(_) => Span::SYNTHETIC,
        }
    }
}

/// Codegen result type alias.
pub type CodegenResult<T> = Result<T, CodegenError>;
