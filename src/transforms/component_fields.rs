//! Record which fragments back component fields.
//!
//! Every document decorated with `@componentField(field:, prop:)` gets a
//! `component_fields` row naming its type, field, prop, and fragment. Inline
//! declarations already have a row from extraction (carrying the prop); it is
//! completed in place. Other documents get a new row.

use rusqlite::{params, Connection, OptionalExtension};

use crate::schema::internal::names;

struct Declaration {
    raw_document: i64,
    fragment: String,
    type_condition: Option<String>,
    field: Option<String>,
    prop: Option<String>,
}

/// Upsert `component_fields` rows for documents in scope; returns the number of rows touched.
pub fn register_component_fields(conn: &Connection, task: Option<&str>) -> rusqlite::Result<usize> {
    let declarations = {
        let mut stmt = conn.prepare(
            "SELECT d.raw_document, d.name, d.type_condition,
                    (SELECT v.raw FROM document_directive_arguments a
                       JOIN argument_values v ON v.id = a.value
                      WHERE a.parent = dd.id AND a.name = 'field'),
                    (SELECT v.raw FROM document_directive_arguments a
                       JOIN argument_values v ON v.id = a.value
                      WHERE a.parent = dd.id AND a.name = 'prop')
             FROM document_directives dd
             JOIN documents d ON d.id = dd.document
             JOIN raw_documents r ON r.id = d.raw_document
             WHERE dd.directive = ?1
               AND (?2 IS NULL OR r.current_task = ?2)
             ORDER BY d.id",
        )?;
        let rows = stmt.query_map(params![names::COMPONENT_FIELD, task], |row| {
            Ok(Declaration {
                raw_document: row.get(0)?,
                fragment: row.get(1)?,
                type_condition: row.get(2)?,
                field: row.get(3)?,
                prop: row.get(4)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };

    let mut find = conn.prepare_cached(
        "SELECT id FROM component_fields
         WHERE document = ?1 AND (fragment IS NULL OR fragment = ?2)
         ORDER BY inline DESC, id LIMIT 1",
    )?;
    let mut update = conn.prepare_cached(
        "UPDATE component_fields
         SET type = ?2, field = ?3, prop = COALESCE(?4, prop), fragment = ?5
         WHERE id = ?1",
    )?;
    let mut insert = conn.prepare_cached(
        "INSERT INTO component_fields (document, type, field, prop, fragment, inline)
         VALUES (?1, ?2, ?3, ?4, ?5, 0)",
    )?;

    let mut touched = 0;
    for decl in &declarations {
        let existing: Option<i64> = find
            .query_row(params![decl.raw_document, decl.fragment], |row| row.get(0))
            .optional()?;
        touched += match existing {
            Some(id) => update.execute(params![id, decl.type_condition, decl.field, decl.prop, decl.fragment])?,
            None => insert.execute(params![
                decl.raw_document,
                decl.type_condition,
                decl.field,
                decl.prop,
                decl.fragment
            ])?,
        };
    }
    Ok(touched)
}
