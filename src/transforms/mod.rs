//! IR rewrites that run between the parse, validate, and collect phases.

pub mod add_fields;
pub mod component_fields;
pub mod runtime_scalars;

use std::time::Instant;

use crate::diagnostics::PipelineError;
use crate::store::Store;

pub use add_fields::add_key_fields;
pub use component_fields::register_component_fields;
pub use runtime_scalars::rewrite_runtime_scalars;

/// Rows touched by the after-extract transforms.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformSummary {
    pub component_fields: usize,
    pub runtime_scalars: usize,
}

/// Component-field registration and runtime-scalar rewriting, in one transaction.
pub fn after_extract(store: &Store, task: Option<&str>) -> Result<TransformSummary, PipelineError> {
    let started = Instant::now();
    let summary = store.write(|tx| {
        Ok(TransformSummary {
            component_fields: register_component_fields(tx, task)?,
            runtime_scalars: rewrite_runtime_scalars(tx, task)?,
        })
    })?;
    tracing::info!(
        component_fields = summary.component_fields,
        runtime_scalars = summary.runtime_scalars,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "after-extract transforms applied"
    );
    Ok(summary)
}

/// Key-field augmentation; returns the number of selections added.
pub fn after_validate(store: &Store, task: Option<&str>) -> Result<usize, PipelineError> {
    let started = Instant::now();
    let added = store.write(|tx| Ok(add_key_fields(tx, task)?))?;
    tracing::info!(
        added,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "key fields added"
    );
    Ok(added)
}
