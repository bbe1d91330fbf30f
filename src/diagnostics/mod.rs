//! Structured diagnostics for the document pipeline.
//!
//! Every phase accumulates [`Diagnostic`]s and hands them back at the phase
//! boundary. Fatal failures travel as [`PipelineError`] instead.

pub mod diagnostic;
pub mod error;
pub mod skip;

pub use diagnostic::{Diagnostic, DiagnosticKind, Diagnostics, Location};
pub use error::PipelineError;
pub use skip::SkipReason;
