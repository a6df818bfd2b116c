//! Diagnostics produced while weaving.
//!
//! Diagnostics are returned as values: every woven method yields a [`WeaveOutcome`]
//! holding its status and the diagnostics it raised, and a module pass collects the
//! outcomes in input order into a [`WeaveReport`]. Nothing here logs; hosts decide
//! how to surface messages.
//!
//! # Key Components
//!
//! - [`Diagnostic`] - One message with severity, optional source location and error kind
//! - [`Severity`] - Warning or error
//! - [`SourceLocation`] - Document and line/column range taken from a sequence point
//! - [`WeaveOutcome`] - Result of weaving one method
//! - [`WeaveReport`] - Outcomes of a whole module pass
//!
//! # Examples
//!
//! ```rust
//! use cilweave::{Diagnostic, Severity};
//!
//! let diagnostic = Diagnostic::new(Severity::Warning, "System.Void App.Program::Run(): Unused label: end");
//! assert_eq!(diagnostic.to_string(), "warning: System.Void App.Program::Run(): Unused label: end");
//! ```

use std::{
    fmt::{self, Write},
    sync::Arc,
};

use crate::{assembly::SequencePoint, ErrorKind};

/// Severity level of a diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The method was rewritten, but something looks unintended (unused label or local).
    Warning,

    /// The method could not be rewritten and was replaced by a stub.
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A source range, taken from the sequence point closest to the offending instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Source document path
    pub document: Arc<str>,
    /// Starting line
    pub line: u32,
    /// Starting column
    pub column: u16,
    /// Ending line
    pub end_line: u32,
    /// Ending column
    pub end_column: u16,
}

impl From<&SequencePoint> for SourceLocation {
    fn from(point: &SequencePoint) -> Self {
        SourceLocation {
            document: point.document.clone(),
            line: point.start_line,
            column: point.start_col,
            end_line: point.end_line,
            end_column: point.end_col,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({},{})", self.document, self.line, self.column)
    }
}

/// A single diagnostic entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Severity level of this diagnostic.
    pub severity: Severity,

    /// Human-readable description, prefixed with the method display name.
    pub message: String,

    /// Source location, when the method carries debug information.
    pub location: Option<SourceLocation>,

    /// The failure category, for errors raised by a rewrite.
    pub kind: Option<ErrorKind>,
}

impl Diagnostic {
    /// Creates a new diagnostic entry.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Diagnostic {
            severity,
            message: message.into(),
            location: None,
            kind: None,
        }
    }

    /// Attaches a source location.
    #[must_use]
    pub fn with_location(mut self, location: Option<SourceLocation>) -> Self {
        self.location = location;
        self
    }

    /// Attaches the error kind.
    #[must_use]
    pub fn with_kind(mut self, kind: Option<ErrorKind>) -> Self {
        self.kind = kind;
        self
    }

    /// True for [`Severity::Error`].
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(location) = &self.location {
            write!(f, "{location}: ")?;
        }
        write!(f, "{}: {}", self.severity, self.message)
    }
}

/// What happened to a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodStatus {
    /// The method does not use the marker vocabulary and was not touched.
    Unchanged,
    /// Every marker call was rewritten.
    Rewritten,
    /// Rewriting failed and the body was replaced by a throwing stub.
    Stubbed,
}

/// Result of weaving a single method.
#[derive(Debug, Clone)]
pub struct WeaveOutcome {
    /// Display name of the method
    pub method: String,
    /// What happened to the body
    pub status: MethodStatus,
    /// Diagnostics raised for this method
    pub diagnostics: Vec<Diagnostic>,
}

impl WeaveOutcome {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Outcomes of a module pass, in input order.
#[derive(Debug, Clone, Default)]
pub struct WeaveReport {
    /// One outcome per method, in the order the methods were supplied
    pub outcomes: Vec<WeaveOutcome>,
}

impl WeaveReport {
    /// Every diagnostic, in method order.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.outcomes.iter().flat_map(|o| o.diagnostics.iter())
    }

    /// Error diagnostics only.
    pub fn errors(&self) -> Vec<&Diagnostic> {
        self.diagnostics().filter(|d| d.is_error()).collect()
    }

    /// Warning diagnostics only.
    pub fn warnings(&self) -> Vec<&Diagnostic> {
        self.diagnostics().filter(|d| !d.is_error()).collect()
    }

    /// Returns `true` if any method failed.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.outcomes.iter().any(WeaveOutcome::has_errors)
    }

    /// Number of methods with the given status.
    #[must_use]
    pub fn count(&self, status: MethodStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Formats a summary for display.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut output = String::new();
        let _ = writeln!(
            output,
            "Weaving: {} rewritten, {} stubbed, {} unchanged; {} error(s), {} warning(s)",
            self.count(MethodStatus::Rewritten),
            self.count(MethodStatus::Stubbed),
            self.count(MethodStatus::Unchanged),
            self.errors().len(),
            self.warnings().len()
        );
        for diagnostic in self.diagnostics() {
            let _ = writeln!(output, "  {diagnostic}");
        }
        output
    }
}

impl fmt::Display for WeaveReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}
