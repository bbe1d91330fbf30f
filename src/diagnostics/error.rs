//! Fatal pipeline errors.

use std::path::PathBuf;

use super::Diagnostic;

/// Errors that abort a phase.
///
/// Per-document and per-rule problems are not errors; they are accumulated as
/// [`Diagnostic`]s and returned from the phase.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("schema could not be loaded ({} error(s))", .0.len())]
    Schema(Vec<Diagnostic>),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IR store at {} uses schema version {found}, expected {expected}", path.display())]
    IncompatibleStore {
        path: PathBuf,
        found: i64,
        expected: i64,
    },

    #[error("build cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Diagnostics carried by this error, or a single diagnostic describing it.
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        match self {
            PipelineError::Schema(diags) => diags,
            PipelineError::Config(message) => {
                vec![Diagnostic::new(super::DiagnosticKind::Config, message)]
            }
            PipelineError::Io { .. } | PipelineError::Store(_) | PipelineError::Pool(_) => {
                vec![Diagnostic::io(self.to_string())]
            }
            other => vec![Diagnostic::internal(other.to_string())],
        }
    }
}
