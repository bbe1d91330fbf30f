//! The compiler: one handle owning everything a build needs.
//!
//! Phases are methods invoked by the host in a fixed order:
//! [`Compiler::schema`], [`Compiler::extract`], [`Compiler::after_extract`],
//! [`Compiler::validate`], [`Compiler::after_validate`], and finally
//! [`Compiler::collect`] for whatever the host wants to print.
//!
//! Every phase returns the diagnostics it accumulated, sorted. Fatal problems
//! (store unavailable, unusable schema, cancellation) come back as
//! [`PipelineError`] and leave the IR at its last committed state.

use std::sync::Arc;
use std::time::Instant;

use rusqlite::params;

use crate::cancel::CancellationToken;
use crate::collect::{CollectedDocument, Collector};
use crate::config::ProjectConfig;
use crate::diagnostics::{Diagnostic, Diagnostics, PipelineError};
use crate::documents::DocumentLoader;
use crate::extract::Extraction;
use crate::filesystem::{FileSystem, OsFileSystem};
use crate::store::Store;
use crate::validate::Validator;
use crate::{schema, transforms};

/// A configured build over one IR store.
pub struct Compiler {
    config: Arc<ProjectConfig>,
    fs: Arc<dyn FileSystem>,
    store: Store,
    cancel: CancellationToken,
    task: Option<String>,
}

impl Compiler {
    pub fn new(config: ProjectConfig, fs: Arc<dyn FileSystem>, store: Store) -> Self {
        Self {
            config: Arc::new(config),
            fs,
            store,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Compiler over the real filesystem with the IR at `<projectRoot>/ir.db`.
    pub fn open(config: ProjectConfig) -> Result<Self, PipelineError> {
        let store = Store::open_in_dir(&config.project_root)?;
        Ok(Self::new(config, Arc::new(OsFileSystem), store))
    }

    /// Scope extraction, loading, and validation to raw documents tagged `task`.
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn task(&self) -> Option<&str> {
        self.task.as_deref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Load the schema and persist the configuration.
    ///
    /// Schema problems are fatal and arrive as [`PipelineError::Schema`].
    pub fn schema(&self) -> Result<Vec<Diagnostic>, PipelineError> {
        self.cancel.check()?;
        schema::load_schema(&self.store, &self.config, &*self.fs, &self.cancel)?;
        Ok(Vec::new())
    }

    /// Scan project files for documents and write them as raw documents.
    pub fn extract(&self) -> Result<Vec<Diagnostic>, PipelineError> {
        let diagnostics = Diagnostics::new();
        Extraction {
            store: &self.store,
            config: &self.config,
            fs: &*self.fs,
            task: self.task(),
            cancel: &self.cancel,
            diagnostics: &diagnostics,
        }
        .run()?;
        Ok(diagnostics.into_sorted())
    }

    /// Parse raw documents into the IR, then apply the post-extract transforms.
    pub fn after_extract(&self) -> Result<Vec<Diagnostic>, PipelineError> {
        let diagnostics = Diagnostics::new();
        DocumentLoader {
            store: &self.store,
            task: self.task(),
            cancel: &self.cancel,
            diagnostics: &diagnostics,
        }
        .run()?;
        self.cancel.check()?;
        transforms::after_extract(&self.store, self.task())?;
        Ok(diagnostics.into_sorted())
    }

    /// Run every validation rule and record the discovered lists.
    pub fn validate(&self) -> Result<Vec<Diagnostic>, PipelineError> {
        let diagnostics = Diagnostics::new();
        Validator {
            store: &self.store,
            task: self.task(),
            cancel: &self.cancel,
            diagnostics: &diagnostics,
        }
        .run()?;
        Ok(diagnostics.into_sorted())
    }

    /// Add `__typename` and key fields to every composite selection set.
    pub fn after_validate(&self) -> Result<Vec<Diagnostic>, PipelineError> {
        self.cancel.check()?;
        transforms::after_validate(&self.store, self.task())?;
        Ok(Vec::new())
    }

    /// Ids of the documents in scope, in insertion order.
    pub fn document_ids(&self) -> Result<Vec<i64>, PipelineError> {
        self.store.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT d.id FROM documents d
                 JOIN raw_documents raw ON raw.id = d.raw_document
                 WHERE (?1 IS NULL OR raw.current_task = ?1)
                 ORDER BY d.id",
            )?;
            let ids = stmt
                .query_map(params![self.task()], |row| row.get(0))?
                .collect::<Result<Vec<i64>, _>>()?;
            Ok(ids)
        })
    }

    /// Flatten documents into trees, fragments inlined below their spreads.
    pub fn collect(&self, ids: &[i64]) -> Result<Vec<CollectedDocument>, PipelineError> {
        Collector {
            store: &self.store,
            cancel: &self.cancel,
        }
        .collect(ids)
    }

    /// Every phase in order.
    ///
    /// Loader and validation diagnostics do not stop the build, but key fields
    /// are only added to an IR that validated cleanly.
    pub fn run_all(&self) -> Result<Vec<Diagnostic>, PipelineError> {
        let started = Instant::now();
        let mut diagnostics = self.schema()?;
        diagnostics.extend(self.extract()?);
        diagnostics.extend(self.after_extract()?);
        diagnostics.extend(self.validate()?);
        if diagnostics.is_empty() {
            self.after_validate()?;
        } else {
            tracing::warn!(diagnostics = diagnostics.len(), "skipping key field augmentation");
        }
        diagnostics.sort();
        tracing::info!(
            diagnostics = diagnostics.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "build finished"
        );
        Ok(diagnostics)
    }
}
