//! Extract phase: find GraphQL documents in project files.
//!
//! Three stages connected by bounded channels:
//!
//! 1. one walker enumerating the project root through the [`FileFilter`],
//! 2. a pool of scanner threads (one per CPU) reading candidate files,
//! 3. the single writer inserting `raw_documents` (and inline
//!    `component_fields`) inside one store transaction.
//!
//! Per-file I/O failures are recorded as diagnostics and do not stop the
//! phase. Cancellation stops the walker, lets scanners drain, and rolls the
//! writer's transaction back.

pub mod filter;
pub mod scanner;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{sync_channel, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::cancel::CancellationToken;
use crate::config::ProjectConfig;
use crate::diagnostics::{Diagnostic, Diagnostics, PipelineError, SkipReason};
use crate::filesystem::FileSystem;
use crate::paths::{display_path, normalize_lexically};
use crate::store::statements::SourcePos;
use crate::store::{ExtractStatements, Store};

pub use filter::FileFilter;
pub use scanner::{scan_source, scan_source_chunked, ExtractedDocument};

/// Capacity of the channels between stages.
pub const CHANNEL_CAPACITY: usize = 100;

/// Counts reported at the end of the phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub documents: usize,
}

/// Documents found in one file.
#[derive(Debug)]
struct FileDocuments {
    filepath: String,
    documents: Vec<ExtractedDocument>,
}

/// Inputs shared by every stage of one extraction run.
pub struct Extraction<'a> {
    pub store: &'a Store,
    pub config: &'a ProjectConfig,
    pub fs: &'a dyn FileSystem,
    pub task: Option<&'a str>,
    pub cancel: &'a CancellationToken,
    pub diagnostics: &'a Diagnostics,
}

impl Extraction<'_> {
    /// Run walker, scanners and writer to completion.
    pub fn run(&self) -> Result<ExtractSummary, PipelineError> {
        let started = Instant::now();
        let root = normalize_lexically(&self.config.project_root);
        let filter = FileFilter::new(&root, &self.config.include, &self.config.exclude)
            .map_err(|err| PipelineError::Config(format!("{err:#}")))?;
        let schema_file = normalize_lexically(&self.config.schema_file());
        let workers = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);

        let (path_tx, path_rx) = sync_channel::<PathBuf>(CHANNEL_CAPACITY);
        let (file_tx, file_rx) = sync_channel::<FileDocuments>(CHANNEL_CAPACITY);
        let path_rx = Arc::new(Mutex::new(path_rx));
        let skipped = AtomicUsize::new(0);

        let written = std::thread::scope(|scope| {
            let filter = &filter;
            let skipped = &skipped;
            let root = &root;
            let schema_file = &schema_file;

            scope.spawn(move || {
                for entry in self.fs.walk(root) {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    let path = match entry {
                        Ok(path) => path,
                        Err(err) => {
                            self.diagnostics.push(Diagnostic::io(format!("cannot walk project: {err}")));
                            continue;
                        }
                    };
                    if normalize_lexically(&path) == *schema_file {
                        continue;
                    }
                    if let Some(reason) = filter.should_skip(self.fs, &path) {
                        if reason != SkipReason::NotAFile {
                            tracing::debug!(path = %display_path(&path, root), %reason, "skipped");
                            skipped.fetch_add(1, Ordering::Relaxed);
                        }
                        continue;
                    }
                    if path_tx.send(path).is_err() {
                        break;
                    }
                }
            });

            for _ in 0..workers {
                let path_rx = Arc::clone(&path_rx);
                let file_tx = file_tx.clone();
                scope.spawn(move || {
                    while let Some(path) = next_path(&path_rx) {
                        if self.cancel.is_cancelled() {
                            continue;
                        }
                        let filepath = display_path(&path, root);
                        match read_documents(self.fs, &path) {
                            Ok(documents) => {
                                if file_tx.send(FileDocuments { filepath, documents }).is_err() {
                                    break;
                                }
                            }
                            Err(err) => {
                                self.diagnostics.push(Diagnostic::io(format!("cannot read {filepath}: {err}")));
                            }
                        }
                    }
                });
            }
            drop(path_rx);
            drop(file_tx);

            let written = self.write(&file_rx);
            drop(file_rx);
            written
        })?;

        let summary = ExtractSummary {
            files_skipped: skipped.into_inner(),
            ..written
        };
        tracing::info!(
            files = summary.files_scanned,
            skipped = summary.files_skipped,
            documents = summary.documents,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "extraction complete"
        );
        Ok(summary)
    }

    /// Single writer: replace each file's raw documents.
    fn write(&self, files: &Receiver<FileDocuments>) -> Result<ExtractSummary, PipelineError> {
        self.store.write(|tx| {
            let mut summary = ExtractSummary::default();
            let mut replaced = 0;
            {
                let mut stmts = ExtractStatements::prepare(tx)?;
                for file in files.iter() {
                    self.cancel.check()?;
                    replaced += stmts.clear_file(&file.filepath, self.task)?;
                    for doc in &file.documents {
                        let id = stmts.insert_raw_document(
                            &file.filepath,
                            &doc.content,
                            doc.offset_byte as i64,
                            SourcePos::new(doc.line as i64, doc.column as i64),
                            self.task,
                        )?;
                        if let Some(prop) = &doc.prop {
                            stmts.insert_inline_component_field(id, prop)?;
                        }
                        summary.documents += 1;
                    }
                    summary.files_scanned += 1;
                }
            }
            // Walkers stop quietly on cancellation; roll back what was written.
            self.cancel.check()?;
            if replaced > 0 {
                remove_orphan_selections(tx)?;
            }
            Ok(summary)
        })
    }
}

fn next_path(rx: &Mutex<Receiver<PathBuf>>) -> Option<PathBuf> {
    rx.lock().unwrap_or_else(PoisonError::into_inner).recv().ok()
}

fn is_graphql_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("graphql") | Some("gql")
    )
}

/// GraphQL files are one document at `(0, 0)`; anything else is scanned.
fn read_documents(fs: &dyn FileSystem, path: &Path) -> std::io::Result<Vec<ExtractedDocument>> {
    if is_graphql_file(path) {
        let bytes = fs.read(path)?;
        let content = String::from_utf8_lossy(&bytes).into_owned();
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        return Ok(vec![ExtractedDocument {
            content,
            offset_byte: 0,
            line: 0,
            column: 0,
            prop: None,
        }]);
    }
    scan_source(fs.open(path)?)
}

/// Selections whose documents were replaced are no longer referenced.
fn remove_orphan_selections(conn: &rusqlite::Connection) -> Result<(), PipelineError> {
    let removed = conn.execute(
        "DELETE FROM selections
         WHERE id NOT IN (SELECT child_id FROM selection_refs)
           AND id NOT IN (SELECT parent_id FROM selection_refs WHERE parent_id IS NOT NULL)",
        [],
    )?;
    tracing::debug!(removed, "removed orphaned selections");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::OsFileSystem;
    use tempfile::TempDir;

    fn setup() -> (TempDir, ProjectConfig, Store) {
        let dir = TempDir::new().unwrap();
        let config = ProjectConfig {
            project_root: dir.path().to_path_buf(),
            ..ProjectConfig::default()
        };
        let store = Store::open(&dir.path().join(".gqlforge.db")).unwrap();
        (dir, config, store)
    }

    fn write(dir: &TempDir, rel: &str, text: &str) {
        let path = dir.path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, text).unwrap();
    }

    fn run(config: &ProjectConfig, store: &Store, task: Option<&str>) -> (ExtractSummary, Vec<Diagnostic>) {
        let diagnostics = Diagnostics::new();
        let summary = Extraction {
            store,
            config,
            fs: &OsFileSystem,
            task,
            cancel: &CancellationToken::new(),
            diagnostics: &diagnostics,
        }
        .run()
        .unwrap();
        (summary, diagnostics.into_sorted())
    }

    fn raw_rows(store: &Store) -> Vec<(String, String, i64, i64)> {
        store
            .read(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT filepath, content, offset_line, offset_column FROM raw_documents ORDER BY filepath, offset_line",
                )?;
                let rows = stmt
                    .query_map([], |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .unwrap()
    }

    #[test]
    fn test_extracts_graphql_and_source_files() {
        let (dir, config, store) = setup();
        write(&dir, "src/queries/user.graphql", "query User { user { id } }");
        write(
            &dir,
            "src/routes/page.ts",
            "import { graphql } from '$houdini'\n\nconst store = graphql(`query Page { viewer { id } }`)\n",
        );
        write(&dir, "src/routes/notes.md", "graphql(`query Ignored { a }`)");
        write(&dir, "schema.graphql", "type Query { a: Int }");

        let (summary, diags) = run(&config, &store, None);
        assert!(diags.is_empty(), "{diags:?}");
        assert_eq!(summary.documents, 2);

        let rows = raw_rows(&store);
        assert_eq!(rows[0], ("src/queries/user.graphql".into(), "query User { user { id } }".into(), 0, 0));
        assert_eq!(rows[1].0, "src/routes/page.ts");
        assert_eq!(rows[1].1, "query Page { viewer { id } }");
        assert_eq!((rows[1].2, rows[1].3), (2, 23));
    }

    #[test]
    fn test_component_field_declarations_register_props() {
        let (dir, config, store) = setup();
        write(
            &dir,
            "src/lib/Avatar.svelte",
            "<script lang=\"ts\">\n  export let user: GraphQL<`{ ... on User @componentField(field: \"Avatar\") { url } }`>\n</script>",
        );

        run(&config, &store, None);
        let prop: String = store
            .read(|conn| Ok(conn.query_row("SELECT prop FROM component_fields WHERE inline = 1", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(prop, "user");
    }

    #[test]
    fn test_re_extraction_replaces_rows() {
        let (dir, config, store) = setup();
        write(&dir, "src/a.graphql", "query A { a }");
        run(&config, &store, None);
        write(&dir, "src/a.graphql", "query A2 { a }");
        run(&config, &store, None);

        let rows = raw_rows(&store);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1, "query A2 { a }");
    }

    #[test]
    fn test_rows_carry_task_tag() {
        let (dir, config, store) = setup();
        write(&dir, "src/a.graphql", "query A { a }");
        run(&config, &store, Some("incremental"));

        let task: Option<String> = store
            .read(|conn| Ok(conn.query_row("SELECT current_task FROM raw_documents", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(task.as_deref(), Some("incremental"));
    }

    #[test]
    fn test_cancelled_extraction_writes_nothing() {
        let (dir, config, store) = setup();
        write(&dir, "src/a.graphql", "query A { a }");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let diagnostics = Diagnostics::new();
        let result = Extraction {
            store: &store,
            config: &config,
            fs: &OsFileSystem,
            task: None,
            cancel: &cancel,
            diagnostics: &diagnostics,
        }
        .run();

        // nothing was produced, so the writer may finish before noticing
        assert!(matches!(result, Ok(_) | Err(PipelineError::Cancelled)));
        assert!(raw_rows(&store).is_empty());
    }

    #[test]
    fn test_bad_glob_is_config_error() {
        let (_dir, mut config, store) = setup();
        config.include = vec!["src/[".to_string()];
        let diagnostics = Diagnostics::new();
        let result = Extraction {
            store: &store,
            config: &config,
            fs: &OsFileSystem,
            task: None,
            cancel: &CancellationToken::new(),
            diagnostics: &diagnostics,
        }
        .run();
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }
}
