//! Load phase: parse raw documents into the relational IR.
//!
//! Raw documents are parsed in parallel on the rayon pool and handed over a
//! bounded channel to a single writer. The writer inserts each document under
//! its own savepoint inside one store transaction, so a malformed document
//! rolls back alone and is reported as a diagnostic.

pub mod component_field;
pub mod fragment_args;
pub mod loader;
pub mod type_cache;

use std::sync::mpsc::{sync_channel, Receiver};
use std::time::Instant;

use async_graphql_parser::types::ExecutableDocument;
use rayon::prelude::*;
use rusqlite::{params, Connection};

use crate::cancel::CancellationToken;
use crate::diagnostics::{Diagnostic, Diagnostics, PipelineError};
use crate::extract::CHANNEL_CAPACITY;
use crate::store::{with_savepoint, LoaderStatements, Store};

pub use fragment_args::value_matches_type;
pub use loader::{DocumentWriter, LoadError, RawDocument};
pub use type_cache::TypeCache;

type Parsed = (RawDocument, Result<ExecutableDocument, Diagnostic>);

/// Counts reported at the end of the phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub raw_documents: usize,
    pub documents: usize,
    pub failed: usize,
}

/// Inputs of one load run.
pub struct DocumentLoader<'a> {
    pub store: &'a Store,
    pub task: Option<&'a str>,
    pub cancel: &'a CancellationToken,
    pub diagnostics: &'a Diagnostics,
}

impl DocumentLoader<'_> {
    pub fn run(&self) -> Result<LoadSummary, PipelineError> {
        let started = Instant::now();
        let (pending, cache) = self
            .store
            .read(|conn| Ok((pending_raw_documents(conn, self.task)?, TypeCache::load(conn)?)))?;
        if pending.is_empty() {
            tracing::debug!("no raw documents to load");
            return Ok(LoadSummary::default());
        }

        let (parsed_tx, parsed_rx) = sync_channel::<Parsed>(CHANNEL_CAPACITY);
        let cancel = self.cancel;
        let summary = std::thread::scope(|scope| {
            scope.spawn(move || {
                pending.into_par_iter().for_each_with(parsed_tx, |tx, raw| {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let parsed = raw.parse();
                    // the writer hung up; nothing left to do
                    let _ = tx.send((raw, parsed));
                });
            });

            let written = self.write(&parsed_rx, &cache);
            drop(parsed_rx);
            written
        })?;

        tracing::info!(
            raw_documents = summary.raw_documents,
            documents = summary.documents,
            failed = summary.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "documents loaded"
        );
        Ok(summary)
    }

    fn write(&self, parsed: &Receiver<Parsed>, cache: &TypeCache) -> Result<LoadSummary, PipelineError> {
        self.store.write(|tx| {
            let mut writer = DocumentWriter::new(LoaderStatements::prepare(tx)?, cache);
            let mut summary = LoadSummary::default();

            for (raw, result) in parsed.iter() {
                self.cancel.check()?;
                summary.raw_documents += 1;

                let doc = match result {
                    Ok(doc) => doc,
                    Err(diagnostic) => {
                        summary.failed += 1;
                        self.diagnostics.push(diagnostic);
                        continue;
                    }
                };

                match with_savepoint(tx, "load_document", || writer.load(&raw, &doc))? {
                    Ok(count) => {
                        summary.documents += count;
                        self.diagnostics.extend(writer.take_warnings());
                    }
                    Err(LoadError::Invalid(diagnostic)) => {
                        tracing::debug!(filepath = %raw.filepath, raw_document = raw.id, "document rejected");
                        summary.failed += 1;
                        writer.take_warnings();
                        self.diagnostics.push(*diagnostic);
                    }
                    Err(LoadError::Store(err)) => return Err(err.into()),
                }
            }
            Ok(summary)
        })
    }
}

/// Raw documents in scope for `task` that have not produced documents yet.
fn pending_raw_documents(conn: &Connection, task: Option<&str>) -> rusqlite::Result<Vec<RawDocument>> {
    let mut stmt = conn.prepare(
        "SELECT r.id, r.filepath, r.content, r.offset_line, r.offset_column,
                (SELECT c.prop FROM component_fields c
                  WHERE c.document = r.id AND c.inline = 1
                  ORDER BY c.id LIMIT 1)
         FROM raw_documents r
         WHERE (?1 IS NULL OR r.current_task = ?1)
           AND NOT EXISTS (SELECT 1 FROM documents d WHERE d.raw_document = r.id)
         ORDER BY r.id",
    )?;
    let rows = stmt.query_map(params![task], |row| {
        Ok(RawDocument {
            id: row.get(0)?,
            filepath: row.get(1)?,
            content: row.get(2)?,
            offset_line: row.get(3)?,
            offset_column: row.get(4)?,
            component_prop: row.get(5)?,
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use crate::diagnostics::DiagnosticKind;
    use crate::testing::TestProject;

    #[test]
    fn test_loads_operation_rows() {
        let project = TestProject::new();
        project.add_raw("src/friends.graphql", "query Friends { user(id: \"1\") { firstName } }");
        let diags = project.load();
        assert!(diags.is_empty(), "{diags:?}");

        assert_eq!(
            project.rows("SELECT name || ':' || kind FROM documents"),
            vec!["Friends:query"]
        );
        assert_eq!(
            project.rows(
                "SELECT s.field_name || ':' || s.type || ':' || IFNULL(r.parent_id, 'root') || ':' || r.path_index
                 FROM selections s JOIN selection_refs r ON r.child_id = s.id ORDER BY s.id"
            ),
            vec!["user:Query.user:root:0", "firstName:User.firstName:1:0"]
        );
        assert_eq!(
            project.rows(
                "SELECT a.name || ':' || v.kind || ':' || v.raw || ':' || v.expected_type || v.expected_type_modifiers
                 || ':' || (a.field_argument IS NOT NULL)
                 FROM selection_arguments a JOIN argument_values v ON v.id = a.value"
            ),
            vec!["id:String:1:ID!:1"]
        );
    }

    #[test]
    fn test_positions_include_raw_offsets_once() {
        let project = TestProject::new();
        project.add_raw_at("src/page.ts", "query Page {\n  user(id: 1) { id }\n}", 3, 20);
        project.load();

        assert_eq!(project.rows("SELECT line || ':' || col FROM documents"), vec!["4:21"]);
        assert_eq!(
            project.rows("SELECT line || ':' || col FROM selection_refs ORDER BY id"),
            vec!["5:3", "5:17"]
        );
    }

    #[test]
    fn test_anonymous_operation_is_syntax_error() {
        let project = TestProject::new();
        project.add_raw("src/a.graphql", "{ user(id: 1) { id } }");
        project.add_raw("src/b.graphql", "query B { user(id: 1) { id } }");
        let diags = project.load();

        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::Syntax);
        assert_eq!(diags[0].locations[0].filepath, "src/a.graphql");
        assert_eq!(project.rows("SELECT name FROM documents"), vec!["B"]);
    }

    #[test]
    fn test_parse_errors_leave_other_documents() {
        let project = TestProject::new();
        project.add_raw("src/a.graphql", "query A { user(id: 1) { ");
        project.add_raw("src/b.graphql", "fragment B on User { id }");
        let diags = project.load();

        assert_eq!(diags.len(), 1);
        assert_eq!(project.rows("SELECT name || ':' || type_condition FROM documents"), vec!["B:User"]);
    }

    #[test]
    fn test_inline_component_field_becomes_fragment() {
        let project = TestProject::new();
        project.add_component_raw(
            "src/Avatar.svelte",
            r#"{ ... on User @componentField(field: "Avatar") { firstName } }"#,
            "user",
        );
        let diags = project.load();
        assert!(diags.is_empty(), "{diags:?}");

        assert_eq!(
            project.rows("SELECT name || ':' || kind || ':' || type_condition FROM documents"),
            vec!["__componentField__User_Avatar:fragment:User"]
        );
        assert_eq!(
            project.rows(
                "SELECT a.name || '=' || v.raw FROM document_directive_arguments a
                 JOIN argument_values v ON v.id = a.value ORDER BY a.name"
            ),
            vec!["field=Avatar", "prop=user"]
        );
        assert_eq!(project.rows("SELECT type FROM selections"), vec!["User.firstName"]);
    }

    #[test]
    fn test_inline_component_field_with_two_children_fails() {
        let project = TestProject::new();
        project.add_component_raw(
            "src/Avatar.svelte",
            r#"{ ... on User @componentField(field: "Avatar") { firstName } id }"#,
            "user",
        );
        let diags = project.load();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::Syntax);
        assert_eq!(project.count("SELECT COUNT(*) FROM documents"), 0);
        assert_eq!(project.count("SELECT COUNT(*) FROM selections"), 0);
    }

    #[test]
    fn test_fragment_arguments_become_variables() {
        let project = TestProject::new();
        project.add_raw(
            "src/list.graphql",
            r#"fragment Friends on User @arguments(first: {type: "Int!", default: 10}, after: {type: "String"}) {
                friends { id }
            }"#,
        );
        let diags = project.load();
        assert!(diags.is_empty(), "{diags:?}");

        assert_eq!(
            project.rows(
                "SELECT v.name || ':' || v.type || v.type_modifiers || ':' || IFNULL(d.raw, '-')
                 FROM document_variables v LEFT JOIN argument_values d ON d.id = v.default_value
                 ORDER BY v.name"
            ),
            vec!["after:String:-", "first:Int!:10"]
        );
    }

    #[test]
    fn test_fragment_argument_default_mismatch_is_reported() {
        let project = TestProject::new();
        project.add_raw(
            "src/list.graphql",
            r#"fragment Friends on User @arguments(first: {type: "Int", default: "ten"}) { id }"#,
        );
        let diags = project.load();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::Validation);
        assert_eq!(project.rows("SELECT name FROM documents"), vec!["Friends"]);
    }

    #[test]
    fn test_value_trees_carry_expected_types() {
        let project = TestProject::new();
        project.add_raw(
            "src/search.graphql",
            "query Search($term: String = \"x\") {\n  search(filter: {name: $term, tags: [\"a\", \"b\"]}, note: \"\"\"long\"\"\") { __typename }\n}",
        );
        let diags = project.load();
        assert!(diags.is_empty(), "{diags:?}");

        assert_eq!(
            project.rows(
                "SELECT kind || ':' || expected_type || expected_type_modifiers FROM argument_values ORDER BY id"
            ),
            vec![
                "String:String",
                "Object:SearchFilter!",
                "Variable:String",
                "List:String!]",
                "String:String!",
                "String:String!",
                "Block:String",
            ]
        );
        assert_eq!(
            project.rows("SELECT IFNULL(name, '#') || position FROM argument_value_children ORDER BY id"),
            vec!["name0", "#0", "#1", "tags1"]
        );
    }

    #[test]
    fn test_loading_is_idempotent_and_task_scoped() {
        let project = TestProject::new();
        project.add_raw("src/a.graphql", "query A { user(id: 1) { id } }");
        project.add_raw_for_task("src/b.graphql", "query B { user(id: 1) { id } }", "t1");

        project.load_task(Some("t1"));
        assert_eq!(project.rows("SELECT name FROM documents"), vec!["B"]);

        project.load();
        project.load();
        assert_eq!(project.rows("SELECT name FROM documents ORDER BY name"), vec!["A", "B"]);
    }
}
