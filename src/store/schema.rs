//! IR table definitions and the schema-version preflight.
//!
//! Every statement is idempotent (`IF NOT EXISTS`) so `ensure_schema` can run
//! on every open. References inside the document IR are
//! `DEFERRABLE INITIALLY DEFERRED`: the loader inserts parents and children in
//! whatever order the AST walk produces and the constraints are checked at
//! commit.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::diagnostics::PipelineError;

/// Version of the IR layout written by this build.
///
/// Bump whenever a table or column changes shape.
pub const IR_SCHEMA_VERSION: i64 = 1;

pub(crate) const CONFIG_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS config (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    project_root TEXT NOT NULL,
    schema_path TEXT NOT NULL,
    include_globs TEXT NOT NULL DEFAULT '[]',
    exclude_globs TEXT NOT NULL DEFAULT '[]',
    default_keys TEXT NOT NULL DEFAULT '["id"]',
    default_list_target TEXT CHECK (default_list_target IS NULL OR default_list_target = 'all'),
    default_list_position TEXT NOT NULL DEFAULT 'append'
        CHECK (default_list_position IN ('append', 'prepend')),
    default_paginate_mode TEXT NOT NULL DEFAULT 'Infinite'
        CHECK (default_paginate_mode IN ('Infinite', 'SinglePage')),
    default_fragment_masking TEXT NOT NULL DEFAULT 'enable'
        CHECK (default_fragment_masking IN ('enable', 'disable')),
    default_cache_policy TEXT NOT NULL DEFAULT 'CacheOrNetwork'
        CHECK (default_cache_policy IN ('CacheOrNetwork', 'CacheOnly', 'NetworkOnly', 'CacheAndNetwork', 'NoCache')),
    default_partial BOOLEAN NOT NULL DEFAULT 0,
    default_lifetime INTEGER NOT NULL,
    cache_buffer_size INTEGER NOT NULL,
    suppress_pagination_deduplication BOOLEAN NOT NULL DEFAULT 0,
    persisted_queries_path TEXT,
    definitions_path TEXT,
    runtime_dir TEXT,
    log_level TEXT NOT NULL DEFAULT 'SUMMARY'
        CHECK (log_level IN ('QUIET', 'SHORT_SUMMARY', 'SUMMARY', 'FULL'))
);

CREATE TABLE IF NOT EXISTS type_configs (
    name TEXT PRIMARY KEY,
    keys TEXT NOT NULL,
    resolve_query TEXT
);

CREATE TABLE IF NOT EXISTS scalar_config (
    name TEXT PRIMARY KEY,
    type TEXT NOT NULL,
    input_types TEXT NOT NULL DEFAULT '[]'
);

CREATE TABLE IF NOT EXISTS runtime_scalar_definitions (
    name TEXT PRIMARY KEY,
    type TEXT NOT NULL
);
"#;

pub(crate) const SCHEMA_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS types (
    name TEXT PRIMARY KEY,
    kind TEXT NOT NULL CHECK (kind IN ('OBJECT', 'INTERFACE', 'UNION', 'ENUM', 'SCALAR', 'INPUT')),
    operation TEXT CHECK (operation IS NULL OR operation IN ('query', 'mutation', 'subscription')),
    internal BOOLEAN NOT NULL DEFAULT 0,
    built_in BOOLEAN NOT NULL DEFAULT 0,
    description TEXT
);

CREATE TABLE IF NOT EXISTS type_fields (
    id TEXT PRIMARY KEY,
    parent TEXT NOT NULL REFERENCES types(name) DEFERRABLE INITIALLY DEFERRED,
    name TEXT NOT NULL,
    type TEXT NOT NULL REFERENCES types(name) DEFERRABLE INITIALLY DEFERRED,
    type_modifiers TEXT NOT NULL DEFAULT '',
    default_value TEXT,
    description TEXT,
    internal BOOLEAN NOT NULL DEFAULT 0,
    UNIQUE (parent, name)
);

CREATE TABLE IF NOT EXISTS field_argument_definitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    field TEXT NOT NULL REFERENCES type_fields(id) DEFERRABLE INITIALLY DEFERRED,
    name TEXT NOT NULL,
    type TEXT NOT NULL REFERENCES types(name) DEFERRABLE INITIALLY DEFERRED,
    type_modifiers TEXT NOT NULL DEFAULT '',
    default_value TEXT,
    UNIQUE (field, name)
);

CREATE TABLE IF NOT EXISTS enum_values (
    parent TEXT NOT NULL REFERENCES types(name) DEFERRABLE INITIALLY DEFERRED,
    value TEXT NOT NULL,
    description TEXT,
    PRIMARY KEY (parent, value)
);

CREATE TABLE IF NOT EXISTS possible_types (
    type TEXT NOT NULL REFERENCES types(name) DEFERRABLE INITIALLY DEFERRED,
    member TEXT NOT NULL REFERENCES types(name) DEFERRABLE INITIALLY DEFERRED,
    PRIMARY KEY (type, member)
);

CREATE TABLE IF NOT EXISTS directives (
    name TEXT PRIMARY KEY,
    repeatable BOOLEAN NOT NULL DEFAULT 0,
    internal BOOLEAN NOT NULL DEFAULT 0,
    description TEXT
);

CREATE TABLE IF NOT EXISTS directive_arguments (
    parent TEXT NOT NULL REFERENCES directives(name) DEFERRABLE INITIALLY DEFERRED,
    name TEXT NOT NULL,
    type TEXT NOT NULL,
    type_modifiers TEXT NOT NULL DEFAULT '',
    default_value TEXT,
    PRIMARY KEY (parent, name)
);

CREATE TABLE IF NOT EXISTS directive_locations (
    directive TEXT NOT NULL REFERENCES directives(name) DEFERRABLE INITIALLY DEFERRED,
    location TEXT NOT NULL CHECK (location IN (
        'QUERY', 'MUTATION', 'SUBSCRIPTION', 'FIELD', 'FRAGMENT_DEFINITION', 'FRAGMENT_SPREAD',
        'INLINE_FRAGMENT', 'VARIABLE_DEFINITION', 'SCHEMA', 'SCALAR', 'OBJECT', 'FIELD_DEFINITION',
        'ARGUMENT_DEFINITION', 'INTERFACE', 'UNION', 'ENUM', 'ENUM_VALUE', 'INPUT_OBJECT',
        'INPUT_FIELD_DEFINITION'
    )),
    PRIMARY KEY (directive, location)
);

CREATE VIEW IF NOT EXISTS type_possibilities AS
    SELECT name AS type, name AS member FROM types WHERE kind = 'OBJECT'
    UNION
    SELECT type, member FROM possible_types;
"#;

pub(crate) const DOCUMENT_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS raw_documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filepath TEXT NOT NULL,
    content TEXT NOT NULL,
    offset_byte INTEGER NOT NULL DEFAULT 0,
    offset_line INTEGER NOT NULL DEFAULT 0,
    offset_column INTEGER NOT NULL DEFAULT 0,
    current_task TEXT
);
CREATE INDEX IF NOT EXISTS idx_raw_documents_filepath ON raw_documents(filepath);

CREATE TABLE IF NOT EXISTS component_fields (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document INTEGER NOT NULL
        REFERENCES raw_documents(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    type TEXT,
    field TEXT,
    prop TEXT,
    fragment TEXT,
    inline BOOLEAN NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_component_fields_document ON component_fields(document);

CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('query', 'mutation', 'subscription', 'fragment')),
    raw_document INTEGER NOT NULL
        REFERENCES raw_documents(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    type_condition TEXT,
    line INTEGER NOT NULL,
    col INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_name ON documents(name);
CREATE INDEX IF NOT EXISTS idx_documents_raw ON documents(raw_document);

CREATE TABLE IF NOT EXISTS argument_values (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL CHECK (kind IN (
        'Variable', 'Int', 'Float', 'String', 'Block', 'Boolean', 'Null', 'Enum', 'List', 'Object'
    )),
    raw TEXT NOT NULL,
    expected_type TEXT NOT NULL,
    expected_type_modifiers TEXT NOT NULL DEFAULT '',
    document INTEGER NOT NULL
        REFERENCES documents(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    line INTEGER NOT NULL,
    col INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_argument_values_document ON argument_values(document);

CREATE TABLE IF NOT EXISTS argument_value_children (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT,
    parent INTEGER NOT NULL
        REFERENCES argument_values(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    value INTEGER NOT NULL
        REFERENCES argument_values(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    position INTEGER NOT NULL,
    document INTEGER NOT NULL
        REFERENCES documents(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    line INTEGER NOT NULL,
    col INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_argument_value_children_parent ON argument_value_children(parent);

CREATE TABLE IF NOT EXISTS document_variables (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document INTEGER NOT NULL
        REFERENCES documents(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    name TEXT NOT NULL,
    type TEXT NOT NULL,
    type_modifiers TEXT NOT NULL DEFAULT '',
    default_value INTEGER
        REFERENCES argument_values(id) ON DELETE SET NULL DEFERRABLE INITIALLY DEFERRED,
    line INTEGER NOT NULL,
    col INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_document_variables_document ON document_variables(document);

CREATE TABLE IF NOT EXISTS selections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    field_name TEXT NOT NULL,
    alias TEXT,
    path_index INTEGER NOT NULL,
    kind TEXT NOT NULL CHECK (kind IN ('field', 'fragment', 'inline_fragment')),
    type TEXT
);

CREATE TABLE IF NOT EXISTS selection_refs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_id INTEGER
        REFERENCES selections(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    child_id INTEGER NOT NULL
        REFERENCES selections(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    document INTEGER NOT NULL
        REFERENCES documents(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    line INTEGER NOT NULL,
    col INTEGER NOT NULL,
    path_index INTEGER NOT NULL,
    internal BOOLEAN NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_selection_refs_parent ON selection_refs(parent_id);
CREATE INDEX IF NOT EXISTS idx_selection_refs_child ON selection_refs(child_id);
CREATE INDEX IF NOT EXISTS idx_selection_refs_document ON selection_refs(document);

CREATE TABLE IF NOT EXISTS selection_arguments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    selection_id INTEGER NOT NULL
        REFERENCES selections(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    name TEXT NOT NULL,
    value INTEGER NOT NULL
        REFERENCES argument_values(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    field_argument INTEGER
        REFERENCES field_argument_definitions(id) ON DELETE SET NULL DEFERRABLE INITIALLY DEFERRED,
    document INTEGER NOT NULL
        REFERENCES documents(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    line INTEGER NOT NULL,
    col INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_selection_arguments_selection ON selection_arguments(selection_id);

CREATE TABLE IF NOT EXISTS selection_directives (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    selection_id INTEGER NOT NULL
        REFERENCES selections(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    directive TEXT NOT NULL,
    document INTEGER NOT NULL
        REFERENCES documents(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    line INTEGER NOT NULL,
    col INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_selection_directives_selection ON selection_directives(selection_id);

CREATE TABLE IF NOT EXISTS selection_directive_arguments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent INTEGER NOT NULL
        REFERENCES selection_directives(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    name TEXT NOT NULL,
    value INTEGER NOT NULL
        REFERENCES argument_values(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    document INTEGER NOT NULL
        REFERENCES documents(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED
);

CREATE TABLE IF NOT EXISTS document_directives (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    document INTEGER NOT NULL
        REFERENCES documents(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    directive TEXT NOT NULL,
    line INTEGER NOT NULL,
    col INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS document_directive_arguments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent INTEGER NOT NULL
        REFERENCES document_directives(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    name TEXT NOT NULL,
    value INTEGER NOT NULL
        REFERENCES argument_values(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED
);

CREATE TABLE IF NOT EXISTS document_variable_directives (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent INTEGER NOT NULL
        REFERENCES document_variables(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    directive TEXT NOT NULL,
    line INTEGER NOT NULL,
    col INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS document_variable_directive_arguments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent INTEGER NOT NULL
        REFERENCES document_variable_directives(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    name TEXT NOT NULL,
    value INTEGER NOT NULL
        REFERENCES argument_values(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED
);

CREATE TABLE IF NOT EXISTS discovered_lists (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    type TEXT NOT NULL,
    node_type TEXT NOT NULL,
    edge_type TEXT,
    connection BOOLEAN NOT NULL DEFAULT 0,
    list_field INTEGER NOT NULL
        REFERENCES selections(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    document INTEGER NOT NULL
        REFERENCES documents(id) ON DELETE CASCADE DEFERRABLE INITIALLY DEFERRED,
    paginate TEXT CHECK (paginate IS NULL OR paginate IN ('Infinite', 'SinglePage')),
    supports_forward BOOLEAN NOT NULL DEFAULT 0,
    supports_backward BOOLEAN NOT NULL DEFAULT 0,
    cursor_type TEXT,
    page_size INTEGER,
    embedded BOOLEAN NOT NULL DEFAULT 0
);

CREATE VIEW IF NOT EXISTS type_keys AS
    SELECT t.name AS type, k.value AS field, k.key AS position
    FROM types t
    LEFT JOIN type_configs tc ON tc.name = t.name AND json_array_length(tc.keys) > 0
    CROSS JOIN config c
    CROSS JOIN json_each(COALESCE(tc.keys, c.default_keys)) k;

CREATE VIEW IF NOT EXISTS selection_field_types AS
    SELECT
        s.id AS selection_id,
        tf.parent AS parent_type,
        tf.type AS field_type,
        tf.type_modifiers AS field_type_modifiers,
        t.kind AS field_type_kind
    FROM selections s
    JOIN type_fields tf ON tf.id = s.type
    JOIN types t ON t.name = tf.type
    WHERE s.kind = 'field';
"#;

/// Create every IR table and check the layout version.
///
/// ## Ordering contract
/// The version row is inspected before any table is created, so an IR written
/// by an incompatible build is refused without being touched.
pub fn ensure_schema(conn: &Connection, db_path: &Path) -> Result<(), PipelineError> {
    let has_meta: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'ir_meta'",
            [],
            |_| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if has_meta {
        let found: Option<i64> = conn
            .query_row("SELECT schema_version FROM ir_meta WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        if let Some(found) = found {
            if found != IR_SCHEMA_VERSION {
                return Err(PipelineError::IncompatibleStore {
                    path: db_path.to_path_buf(),
                    found,
                    expected: IR_SCHEMA_VERSION,
                });
            }
        }
    }

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS ir_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )",
    )?;
    conn.execute_batch(CONFIG_DDL)?;
    conn.execute_batch(SCHEMA_DDL)?;
    conn.execute_batch(DOCUMENT_DDL)?;

    let created_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    conn.execute(
        "INSERT OR IGNORE INTO ir_meta (id, schema_version, created_at) VALUES (1, ?1, ?2)",
        params![IR_SCHEMA_VERSION, created_at],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn test_ensure_schema_creates_every_table() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn, Path::new(":memory:")).unwrap();

        let names = table_names(&conn);
        for expected in [
            "config",
            "type_configs",
            "scalar_config",
            "runtime_scalar_definitions",
            "types",
            "type_fields",
            "field_argument_definitions",
            "enum_values",
            "possible_types",
            "directives",
            "directive_arguments",
            "directive_locations",
            "raw_documents",
            "component_fields",
            "documents",
            "document_variables",
            "selections",
            "selection_refs",
            "selection_arguments",
            "argument_values",
            "argument_value_children",
            "selection_directives",
            "selection_directive_arguments",
            "document_directives",
            "document_directive_arguments",
            "document_variable_directives",
            "document_variable_directive_arguments",
            "discovered_lists",
            "ir_meta",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing table {expected}");
        }
    }

    #[test]
    fn test_ensure_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn, Path::new(":memory:")).unwrap();
        ensure_schema(&conn, Path::new(":memory:")).unwrap();
    }

    #[test]
    fn test_kind_checks_are_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn, Path::new(":memory:")).unwrap();

        let bad = conn.execute("INSERT INTO types (name, kind) VALUES ('X', 'CLASS')", []);
        assert!(bad.is_err());
        let bad = conn.execute(
            "INSERT INTO selections (field_name, path_index, kind) VALUES ('a', 0, 'leaf')",
            [],
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_version_mismatch_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        ensure_schema(&conn, Path::new(":memory:")).unwrap();
        conn.execute("UPDATE ir_meta SET schema_version = 99", []).unwrap();

        let err = ensure_schema(&conn, Path::new("ir.db")).unwrap_err();
        assert!(matches!(err, PipelineError::IncompatibleStore { found: 99, .. }));
    }

    #[test]
    fn test_deferred_references_allow_out_of_order_inserts() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        ensure_schema(&conn, Path::new(":memory:")).unwrap();

        let tx = conn.transaction().unwrap();
        // child edge first, referenced rows afterwards
        tx.execute(
            "INSERT INTO selection_refs (id, parent_id, child_id, document, line, col, path_index)
             VALUES (1, NULL, 10, 5, 1, 1, 0)",
            [],
        )
        .unwrap();
        tx.execute(
            "INSERT INTO selections (id, field_name, path_index, kind) VALUES (10, 'a', 0, 'field')",
            [],
        )
        .unwrap();
        tx.execute(
            "INSERT INTO raw_documents (id, filepath, content) VALUES (1, 'a.graphql', '{ a }')",
            [],
        )
        .unwrap();
        tx.execute(
            "INSERT INTO documents (id, name, kind, raw_document, line, col) VALUES (5, 'A', 'query', 1, 1, 1)",
            [],
        )
        .unwrap();
        tx.commit().unwrap();
    }
}
