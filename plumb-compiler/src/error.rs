use std::fmt;

use thiserror::Error;

use crate::ast::SourceSpan;

/// Broad classes of analysis failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Undeclared identifiers and illegal redeclarations.
    Scope,
    /// Operand mismatches, bad conditions, non-callable targets, bad assignments.
    Type,
    /// Misplaced `return`/`break`, bad `for` steps, unknown pipe operators.
    Structural,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorCategory::Scope => "scope error",
            ErrorCategory::Type => "type error",
            ErrorCategory::Structural => "structural error",
        };
        f.write_str(label)
    }
}

/// The single error raised by analysis. The first one aborts the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct CompileError {
    pub category: ErrorCategory,
    pub message: String,
    pub span: Option<SourceSpan>,
}

impl CompileError {
    pub fn new<S: Into<String>>(
        category: ErrorCategory,
        message: S,
        span: Option<SourceSpan>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            span,
        }
    }

    pub fn scope<S: Into<String>>(message: S, span: SourceSpan) -> Self {
        Self::new(ErrorCategory::Scope, message, Some(span))
    }

    pub fn type_error<S: Into<String>>(message: S, span: SourceSpan) -> Self {
        Self::new(ErrorCategory::Type, message, Some(span))
    }

    pub fn structural<S: Into<String>>(message: S, span: SourceSpan) -> Self {
        Self::new(ErrorCategory::Structural, message, Some(span))
    }

    pub fn undeclared(name: &str, span: SourceSpan) -> Self {
        Self::scope(format!("Identifier {name} not declared"), span)
    }
}

pub type AnalysisResult<T> = Result<T, CompileError>;
