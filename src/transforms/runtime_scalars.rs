//! Replace runtime scalars in variable definitions.
//!
//! A runtime scalar is only known to the client. Variables declared with one
//! are rewritten to the server-side equivalent from the project config, and
//! the original name is kept on a `@runtimeScalar(type:)` application so
//! later phases can still find it.

use rusqlite::{params, Connection};

use crate::schema::internal::names;
use crate::store::{LoaderStatements, SourcePos};

struct RuntimeVariable {
    id: i64,
    document: i64,
    original: String,
    replacement: String,
    pos: SourcePos,
}

/// Rewrite every variable in scope whose type is a runtime scalar; returns the count.
///
/// Variables that already carry `@runtimeScalar` are left alone, so running
/// twice changes nothing.
pub fn rewrite_runtime_scalars(conn: &Connection, task: Option<&str>) -> rusqlite::Result<usize> {
    let variables = {
        let mut stmt = conn.prepare(
            "SELECT v.id, v.document, v.type, rs.type, v.line, v.col
             FROM document_variables v
             JOIN runtime_scalar_definitions rs ON rs.name = v.type
             JOIN documents d ON d.id = v.document
             JOIN raw_documents r ON r.id = d.raw_document
             WHERE (?1 IS NULL OR r.current_task = ?1)
               AND NOT EXISTS (
                   SELECT 1 FROM document_variable_directives x
                   WHERE x.parent = v.id AND x.directive = ?2
               )
             ORDER BY v.id",
        )?;
        let rows = stmt.query_map(params![task, names::RUNTIME_SCALAR], |row| {
            Ok(RuntimeVariable {
                id: row.get(0)?,
                document: row.get(1)?,
                original: row.get(2)?,
                replacement: row.get(3)?,
                pos: SourcePos::new(row.get(4)?, row.get(5)?),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };
    if variables.is_empty() {
        return Ok(0);
    }

    let mut stmts = LoaderStatements::prepare(conn)?;
    let mut retype = conn.prepare_cached("UPDATE document_variables SET type = ?2 WHERE id = ?1")?;
    for var in &variables {
        let value = stmts.insert_argument_value("String", &var.original, "String", "!", var.document, var.pos)?;
        let directive = stmts.insert_variable_directive(var.id, names::RUNTIME_SCALAR, var.pos)?;
        stmts.insert_variable_directive_argument(directive, "type", value)?;
        retype.execute(params![var.id, var.replacement])?;
    }
    Ok(variables.len())
}
