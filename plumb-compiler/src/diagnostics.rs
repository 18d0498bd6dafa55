use crate::ast::SourceSpan;
use crate::error::{CompileError, ErrorCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub level: DiagnosticLevel,
    pub category: Option<ErrorCategory>,
    pub span: Option<SourceSpan>,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push_error_with_span<S: Into<String>>(&mut self, message: S, span: Option<SourceSpan>) {
        self.entries.push(Diagnostic {
            message: message.into(),
            level: DiagnosticLevel::Error,
            category: None,
            span,
        });
    }

    /// Records an analysis failure, keeping its category for callers that filter on it.
    pub fn push_compile_error(&mut self, error: &CompileError) {
        self.entries.push(Diagnostic {
            message: error.message.clone(),
            level: DiagnosticLevel::Error,
            category: Some(error.category),
            span: error.span,
        });
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.entries.extend(other.entries);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }
}
