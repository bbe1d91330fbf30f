//! Key-field augmentation.
//!
//! Every composite selection set outside an operation's root gets
//! `__typename` and the key fields configured for its type, so the runtime
//! cache can identify each record. The whole transform is a derived-table
//! insert: candidate rows are staged in a temp table, then copied into
//! `selections` and `selection_refs` with `internal = 1`.
//!
//! User selections with the same name are not merged; a key the user already
//! asked for appears twice.

use rusqlite::{params, Connection};

use crate::schema::internal::TYPENAME_FIELD;

const STAGE_DDL: &str = "
CREATE TEMP TABLE IF NOT EXISTS added_fields (
    seq INTEGER PRIMARY KEY,
    parent_id INTEGER,
    document INTEGER NOT NULL,
    type TEXT NOT NULL,
    field TEXT NOT NULL,
    line INTEGER NOT NULL,
    col INTEGER NOT NULL,
    path_index INTEGER NOT NULL
);
DELETE FROM added_fields;
";

/// Candidate sets are composite fields, inline fragments with a composite
/// type condition, and the root of every fragment. Selection sets on an
/// operation root type (fragments on `Query`, `... on Query` at depth 0) are
/// operation roots and are left alone. Keys come from the
/// `type_keys` view, and only those that exist on the type survive the join
/// with `type_fields`.
const STAGE_SQL: &str = "
WITH sets AS (
    SELECT r.child_id AS parent_id, r.document, sft.field_type AS type, r.line, r.col
    FROM selection_refs r
    JOIN selection_field_types sft ON sft.selection_id = r.child_id
    WHERE sft.field_type_kind IN ('OBJECT', 'INTERFACE', 'UNION')
    UNION ALL
    SELECT r.child_id, r.document, s.field_name, r.line, r.col
    FROM selection_refs r
    JOIN selections s ON s.id = r.child_id
    JOIN types t ON t.name = s.field_name
    WHERE s.kind = 'inline_fragment' AND t.kind IN ('OBJECT', 'INTERFACE', 'UNION')
      AND NOT (r.parent_id IS NULL AND t.operation IS NOT NULL)
    UNION ALL
    SELECT NULL, d.id, d.type_condition, d.line, d.col
    FROM documents d
    JOIN types t ON t.name = d.type_condition
    WHERE d.kind = 'fragment' AND t.kind IN ('OBJECT', 'INTERFACE', 'UNION') AND t.operation IS NULL
),
scoped AS (
    SELECT sets.*
    FROM sets
    JOIN documents d ON d.id = sets.document
    JOIN raw_documents raw ON raw.id = d.raw_document
    WHERE (?1 IS NULL OR raw.current_task = ?1)
),
keys AS (
    SELECT t.name AS type, ?2 AS field, 0 AS ord
    FROM types t
    UNION ALL
    SELECT type, field, position + 1
    FROM type_keys
),
candidates AS (
    SELECT s.parent_id, s.document, s.type, k.field, s.line, s.col, k.ord
    FROM scoped s
    JOIN keys k ON k.type = s.type
    JOIN type_fields tf ON tf.parent = s.type AND tf.name = k.field
    WHERE NOT EXISTS (
        SELECT 1
        FROM selection_refs x
        JOIN selections xs ON xs.id = x.child_id
        WHERE x.parent_id IS s.parent_id
          AND x.document = s.document
          AND x.internal = 1
          AND xs.field_name = k.field
    )
)
INSERT INTO added_fields (parent_id, document, type, field, line, col, path_index)
SELECT c.parent_id, c.document, c.type, c.field, c.line, c.col,
       COALESCE((SELECT MAX(x.path_index) FROM selection_refs x
                  WHERE x.parent_id IS c.parent_id AND x.document = c.document), -1)
       + ROW_NUMBER() OVER (PARTITION BY c.document, c.parent_id ORDER BY c.ord)
FROM candidates c
ORDER BY c.document, c.parent_id, c.ord
";

/// Insert missing key selections for documents in scope; returns the number added.
pub fn add_key_fields(conn: &Connection, task: Option<&str>) -> rusqlite::Result<usize> {
    conn.execute_batch(STAGE_DDL)?;
    let staged = conn.execute(STAGE_SQL, params![task, TYPENAME_FIELD])?;
    if staged == 0 {
        return Ok(0);
    }

    let base: i64 = conn.query_row("SELECT IFNULL(MAX(id), 0) FROM selections", [], |row| row.get(0))?;
    conn.execute(
        "INSERT INTO selections (id, field_name, alias, path_index, kind, type)
         SELECT ?1 + seq, field, NULL, path_index, 'field', type || '.' || field
         FROM added_fields ORDER BY seq",
        params![base],
    )?;
    conn.execute(
        "INSERT INTO selection_refs (parent_id, child_id, document, line, col, path_index, internal)
         SELECT parent_id, ?1 + seq, document, line, col, path_index, 1
         FROM added_fields ORDER BY seq",
        params![base],
    )?;
    conn.execute_batch("DELETE FROM added_fields")?;
    Ok(staged)
}
