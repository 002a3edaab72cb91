//! Structured diagnostics reported by the backend.

use std::fmt;

use crate::ast::Span;

/// Error code for a construct the backend cannot lower yet.
pub const UNIMPLEMENTED: &str = "E0900";

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<String>,
    pub message: String,
    pub span: Span,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code: None,
            message: message.into(),
            span,
            notes: Vec::new(),
        }
    }

    /// A construct the backend does not lower yet, e.g. `"local function emission"`.
    pub fn unimplemented(span: Span, feature: &str) -> Self {
        Self {
            severity: Severity::Error,
            code: Some(UNIMPLEMENTED.to_string()),
            message: format!("unimplemented IR generation feature: {feature}"),
            span,
            notes: Vec::new(),
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Render without colors (for logs, tests)
    pub fn render_plain(&self, file: Option<&str>) -> String {
        let mut out = String::new();

        // Header: error[E0900]: message
        if let Some(ref code) = self.code {
            out.push_str(&format!("{}[{}]: ", self.severity, code));
        } else {
            out.push_str(&format!("{}: ", self.severity));
        }
        out.push_str(&self.message);
        out.push('\n');

        // Location
        if self.span.line > 0 {
            match file {
                Some(file) => {
                    out.push_str(&format!("  --> {}:{}:{}\n", file, self.span.line, self.span.col))
                }
                None => out.push_str(&format!("  --> {}:{}\n", self.span.line, self.span.col)),
            }
        }

        for note in &self.notes {
            out.push_str(&format!("   = note: {}\n", note));
        }

        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render_plain(None).trim_end())
    }
}

/// Diagnostics collected while compiling one unit.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        self.items.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn error_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}
