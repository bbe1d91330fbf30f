//! Diagnostic records and the shared accumulator.
//!
//! Diagnostics are deterministic: they sort by kind, then rule, then source
//! location, so two runs over the same project print the same list.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Category of a diagnostic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// GraphQL text could not be parsed, or violates loader-level shape rules
    Syntax,
    /// Schema or framework rule violation
    Validation,
    /// Missing or malformed project configuration
    Config,
    /// Filesystem or store failure
    Io,
    /// Invariant violation inside the compiler
    Internal,
}

impl DiagnosticKind {
    /// Stable sort key for deterministic ordering.
    pub fn sort_key(&self) -> u8 {
        match self {
            DiagnosticKind::Config => 0,
            DiagnosticKind::Io => 1,
            DiagnosticKind::Syntax => 2,
            DiagnosticKind::Validation => 3,
            DiagnosticKind::Internal => 4,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DiagnosticKind::Syntax => "syntax error",
            DiagnosticKind::Validation => "validation error",
            DiagnosticKind::Config => "config error",
            DiagnosticKind::Io => "io error",
            DiagnosticKind::Internal => "internal error",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A position in a project file. Line and column are 1-based.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub filepath: String,
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(filepath: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            filepath: filepath.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.filepath, self.line, self.column)
    }
}

/// One problem found while building.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub kind: DiagnosticKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Name of the validation rule that produced this diagnostic
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    pub locations: Vec<Location>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            detail: None,
            rule: None,
            locations: Vec::new(),
        }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Syntax, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Validation, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Io, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Internal, message)
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.locations.push(location);
        self
    }

    pub fn at(self, filepath: impl Into<String>, line: usize, column: usize) -> Self {
        self.with_location(Location::new(filepath, line, column))
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_rule(mut self, rule: &str) -> Self {
        self.rule = Some(rule.to_string());
        self
    }

    /// Stable sort key: kind, rule, first location, message.
    pub fn sort_key(&self) -> (u8, &str, Option<&Location>, &str) {
        (
            self.kind.sort_key(),
            self.rule.as_deref().unwrap_or(""),
            self.locations.first(),
            &self.message,
        )
    }

    /// Format for human-readable stderr output.
    ///
    /// Examples:
    /// - "ERROR src/routes/+page.ts:4:12: validation error: unknown field \"nme\" on type \"User\""
    /// - "ERROR schema.graphql: syntax error: expected name"
    pub fn format_stderr(&self) -> String {
        let mut out = match self.locations.first() {
            Some(loc) => format!("ERROR {}: {}: {}", loc, self.kind, self.message),
            None => format!("ERROR {}: {}", self.kind, self.message),
        };
        if let Some(detail) = &self.detail {
            out.push_str("\n  ");
            out.push_str(detail);
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_stderr())
    }
}

impl PartialOrd for Diagnostic {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Diagnostic {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Shared, cloneable diagnostic accumulator.
///
/// Workers push into it concurrently; the phase drains it once at its end.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    inner: Arc<Mutex<Vec<Diagnostic>>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, diagnostic: Diagnostic) {
        self.lock().push(diagnostic);
    }

    pub fn extend(&self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.lock().extend(diagnostics);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Take every accumulated diagnostic, sorted.
    pub fn into_sorted(self) -> Vec<Diagnostic> {
        let mut items = std::mem::take(&mut *self.lock());
        items.sort();
        items
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Diagnostic>> {
        // A panicking worker must not hide the diagnostics it already pushed.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_sort_key() {
        assert!(DiagnosticKind::Syntax.sort_key() < DiagnosticKind::Validation.sort_key());
        assert!(DiagnosticKind::Config.sort_key() < DiagnosticKind::Syntax.sort_key());
    }

    #[test]
    fn test_format_stderr_with_location() {
        let diag = Diagnostic::validation("unknown field \"nme\" on type \"User\"")
            .at("src/user.graphql", 3, 5);
        assert_eq!(
            diag.format_stderr(),
            "ERROR src/user.graphql:3:5: validation error: unknown field \"nme\" on type \"User\""
        );
    }

    #[test]
    fn test_format_stderr_with_detail() {
        let diag = Diagnostic::validation("fragment cycle").with_detail("A -> B -> A");
        assert_eq!(diag.format_stderr(), "ERROR validation error: fragment cycle\n  A -> B -> A");
    }

    #[test]
    fn test_ordering_by_rule_then_location() {
        let mut diags = vec![
            Diagnostic::validation("b").with_rule("unknownField").at("b.graphql", 1, 1),
            Diagnostic::validation("a").with_rule("unknownField").at("a.graphql", 9, 1),
            Diagnostic::validation("c").with_rule("duplicateDocumentNames").at("z.graphql", 1, 1),
            Diagnostic::syntax("d").at("z.graphql", 1, 1),
        ];
        diags.sort();

        assert_eq!(diags[0].message, "d");
        assert_eq!(diags[1].message, "c");
        assert_eq!(diags[2].message, "a");
        assert_eq!(diags[3].message, "b");
    }

    #[test]
    fn test_accumulator_is_shared_between_clones() {
        let diags = Diagnostics::new();
        let clone = diags.clone();
        let handle = std::thread::spawn(move || clone.push(Diagnostic::io("boom")));
        handle.join().unwrap();
        diags.push(Diagnostic::syntax("bad"));

        assert_eq!(diags.len(), 2);
        let sorted = diags.into_sorted();
        assert_eq!(sorted[0].kind, DiagnosticKind::Io);
    }

    #[test]
    fn test_serializes_without_empty_optionals() {
        let diag = Diagnostic::syntax("oops").at("a.graphql", 1, 2);
        let json = serde_json::to_string(&diag).unwrap();
        assert!(!json.contains("detail"));
        assert!(json.contains("\"line\":1"));
    }
}
