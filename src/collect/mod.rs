//! Collection: the full selection tree of each requested document.
//!
//! Documents are read in batches. Each batch runs one recursive query that
//! walks selection refs downwards and, at every fragment spread, continues
//! into the fragment's root selections. A fragment already on the current
//! branch is not entered again, so cyclic spreads end as childless spreads.
//! Arguments, directives, and values are fetched per batch and attached in
//! memory.

mod model;

use std::time::Instant;

use ahash::AHashMap;
use rusqlite::{params_from_iter, Connection, Row};

use crate::cancel::CancellationToken;
use crate::diagnostics::PipelineError;
use crate::graphql::type_modifiers;
use crate::store::Store;

pub use model::{
    CollectedArgument, CollectedDirective, CollectedDocument, CollectedSelection, CollectedValue, CollectedVariable,
};

/// Documents per recursive query.
pub const BATCH_SIZE: usize = 100;

const TREE_SQL: &str = "
WITH RECURSIVE tree(root, node, parent, ref_id, selection, document, visited) AS (
    SELECT r.document, '/' || r.id, NULL, r.id, r.child_id, r.document, ',' || r.document || ','
    FROM selection_refs r
    WHERE r.parent_id IS NULL AND r.document IN ({ids})
    UNION ALL
    SELECT t.root, t.node || '/' || r.id, t.node, r.id, r.child_id, r.document, t.visited
    FROM tree t
    JOIN selection_refs r ON r.parent_id = t.selection AND r.document = t.document
    UNION ALL
    SELECT t.root, t.node || '/' || r.id, t.node, r.id, r.child_id, r.document, t.visited || f.id || ','
    FROM tree t
    JOIN selections s ON s.id = t.selection AND s.kind = 'fragment'
    JOIN documents f ON f.id = (
        SELECT MIN(d.id) FROM documents d WHERE d.name = s.field_name AND d.kind = 'fragment'
    )
    JOIN selection_refs r ON r.document = f.id AND r.parent_id IS NULL
    WHERE instr(t.visited, ',' || f.id || ',') = 0
)
SELECT t.root, t.node, t.parent, s.id, s.kind, s.field_name, s.alias, s.type, r.path_index, r.id, r.document
FROM tree t
JOIN selection_refs r ON r.id = t.ref_id
JOIN selections s ON s.id = t.selection";

/// Inputs of one collection run.
pub struct Collector<'a> {
    pub store: &'a Store,
    pub cancel: &'a CancellationToken,
}

impl Collector<'_> {
    /// Collect `ids` in the order given; ids without a document are skipped.
    pub fn collect(&self, ids: &[i64]) -> Result<Vec<CollectedDocument>, PipelineError> {
        let started = Instant::now();
        let mut collected = Vec::with_capacity(ids.len());
        for batch in ids.chunks(BATCH_SIZE) {
            self.cancel.check()?;
            let mut documents = self.store.read(|conn| Ok(collect_batch(conn, batch)?))?;
            collected.append(&mut documents);
        }
        tracing::info!(
            documents = collected.len(),
            batches = ids.len().div_ceil(BATCH_SIZE),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "documents collected"
        );
        Ok(collected)
    }
}

fn placeholders(count: usize) -> String {
    std::iter::repeat("?").take(count).collect::<Vec<_>>().join(", ")
}

/// Run `sql` with its `{ids}` marker expanded to one placeholder per id.
fn query_in<T, F>(conn: &Connection, sql: &str, ids: &[i64], f: F) -> rusqlite::Result<Vec<T>>
where
    F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = sql.replace("{ids}", &placeholders(ids.len()));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(ids.iter()), f)?;
    rows.collect()
}

/// Keep the first of every equal item.
fn dedup<T: PartialEq>(items: Vec<T>) -> Vec<T> {
    let mut kept: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        if !kept.contains(&item) {
            kept.push(item);
        }
    }
    kept
}

struct TreeRow {
    root: i64,
    node: String,
    parent: Option<String>,
    selection: i64,
    kind: String,
    field_name: String,
    alias: Option<String>,
    type_name: Option<String>,
    path_index: i64,
    ref_id: i64,
    document: i64,
}

/// Argument values of a set of documents, rebuilt on demand.
#[derive(Default)]
struct Values {
    rows: AHashMap<i64, (String, String)>,
    children: AHashMap<i64, Vec<(Option<String>, i64)>>,
}

impl Values {
    fn load(conn: &Connection, documents: &[i64]) -> rusqlite::Result<Self> {
        let mut values = Values::default();
        for (id, kind, raw) in query_in(
            conn,
            "SELECT id, kind, raw FROM argument_values WHERE document IN ({ids})",
            documents,
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
        )? {
            values.rows.insert(id, (kind, raw));
        }
        for (parent, name, value) in query_in(
            conn,
            "SELECT parent, name, value FROM argument_value_children
             WHERE document IN ({ids}) ORDER BY parent, position, id",
            documents,
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?, row.get::<_, i64>(2)?)),
        )? {
            values.children.entry(parent).or_default().push((name, value));
        }
        Ok(values)
    }

    fn build(&self, id: i64) -> CollectedValue {
        let Some((kind, raw)) = self.rows.get(&id) else {
            return CollectedValue::Null;
        };
        let children = self.children.get(&id).map(Vec::as_slice).unwrap_or_default();
        match kind.as_str() {
            "Variable" => CollectedValue::Variable(raw.clone()),
            "Null" => CollectedValue::Null,
            "List" => CollectedValue::List(children.iter().map(|(_, value)| self.build(*value)).collect()),
            "Object" => CollectedValue::Object(
                children
                    .iter()
                    .map(|(name, value)| CollectedArgument {
                        name: name.clone().unwrap_or_default(),
                        value: self.build(*value),
                    })
                    .collect(),
            ),
            _ => CollectedValue::Literal {
                kind: kind.clone(),
                raw: raw.clone(),
            },
        }
    }

    fn arguments(&self, pairs: &[(String, i64)]) -> Vec<CollectedArgument> {
        dedup(
            pairs
                .iter()
                .map(|(name, value)| CollectedArgument {
                    name: name.clone(),
                    value: self.build(*value),
                })
                .collect(),
        )
    }
}

/// Directive applications keyed by owner, with their arguments keyed by application.
#[derive(Default)]
struct Applied {
    by_owner: AHashMap<i64, Vec<(i64, String)>>,
    arguments: AHashMap<i64, Vec<(String, i64)>>,
}

impl Applied {
    fn load(conn: &Connection, directives_sql: &str, arguments_sql: &str, ids: &[i64]) -> rusqlite::Result<Self> {
        let mut applied = Applied::default();
        for (owner, id, name) in query_in(conn, directives_sql, ids, |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?))
        })? {
            applied.by_owner.entry(owner).or_default().push((id, name));
        }
        for (parent, name, value) in query_in(conn, arguments_sql, ids, |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
        })? {
            applied.arguments.entry(parent).or_default().push((name, value));
        }
        Ok(applied)
    }

    fn directives(&self, owner: i64, values: &Values) -> Vec<CollectedDirective> {
        let Some(applied) = self.by_owner.get(&owner) else {
            return Vec::new();
        };
        dedup(
            applied
                .iter()
                .map(|(id, name)| CollectedDirective {
                    name: name.clone(),
                    arguments: values.arguments(self.arguments.get(id).map(Vec::as_slice).unwrap_or_default()),
                })
                .collect(),
        )
    }
}

struct Assembly<'a> {
    children: AHashMap<&'a str, Vec<&'a TreeRow>>,
    arguments: AHashMap<i64, Vec<(String, i64)>>,
    directives: Applied,
    values: Values,
}

impl Assembly<'_> {
    fn selection(&self, row: &TreeRow) -> CollectedSelection {
        let children = self
            .children
            .get(row.node.as_str())
            .map(|rows| rows.iter().map(|child| self.selection(child)).collect())
            .unwrap_or_default();
        CollectedSelection {
            kind: row.kind.clone(),
            field_name: row.field_name.clone(),
            alias: row.alias.clone(),
            type_name: row.type_name.clone(),
            path_index: row.path_index,
            arguments: self
                .values
                .arguments(self.arguments.get(&row.selection).map(Vec::as_slice).unwrap_or_default()),
            directives: self.directives.directives(row.selection, &self.values),
            children,
        }
    }
}

fn collect_batch(conn: &Connection, ids: &[i64]) -> rusqlite::Result<Vec<CollectedDocument>> {
    let headers: AHashMap<i64, (String, String, Option<String>)> = query_in(
        conn,
        "SELECT id, name, kind, type_condition FROM documents WHERE id IN ({ids})",
        ids,
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                (row.get::<_, String>(1)?, row.get::<_, String>(2)?, row.get::<_, Option<String>>(3)?),
            ))
        },
    )?
    .into_iter()
    .collect();

    let mut rows = query_in(conn, TREE_SQL, ids, |row| {
        Ok(TreeRow {
            root: row.get(0)?,
            node: row.get(1)?,
            parent: row.get(2)?,
            selection: row.get(3)?,
            kind: row.get(4)?,
            field_name: row.get(5)?,
            alias: row.get(6)?,
            type_name: row.get(7)?,
            path_index: row.get(8)?,
            ref_id: row.get(9)?,
            document: row.get(10)?,
        })
    })?;
    rows.sort_by_key(|row| (row.path_index, row.ref_id));

    let mut documents: Vec<i64> = ids.iter().copied().chain(rows.iter().map(|row| row.document)).collect();
    documents.sort_unstable();
    documents.dedup();

    let mut arguments: AHashMap<i64, Vec<(String, i64)>> = AHashMap::new();
    for (selection, name, value) in query_in(
        conn,
        "SELECT selection_id, name, value FROM selection_arguments WHERE document IN ({ids}) ORDER BY id",
        &documents,
        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?)),
    )? {
        arguments.entry(selection).or_default().push((name, value));
    }

    let values = Values::load(conn, &documents)?;
    let selection_directives = Applied::load(
        conn,
        "SELECT selection_id, id, directive FROM selection_directives WHERE document IN ({ids}) ORDER BY id",
        "SELECT parent, name, value FROM selection_directive_arguments WHERE document IN ({ids}) ORDER BY id",
        &documents,
    )?;
    let document_directives = Applied::load(
        conn,
        "SELECT document, id, directive FROM document_directives WHERE document IN ({ids}) ORDER BY id",
        "SELECT a.parent, a.name, a.value FROM document_directive_arguments a
         JOIN document_directives dd ON dd.id = a.parent
         WHERE dd.document IN ({ids}) ORDER BY a.id",
        ids,
    )?;
    let variable_directives = Applied::load(
        conn,
        "SELECT vd.parent, vd.id, vd.directive FROM document_variable_directives vd
         JOIN document_variables dv ON dv.id = vd.parent
         WHERE dv.document IN ({ids}) ORDER BY vd.id",
        "SELECT a.parent, a.name, a.value FROM document_variable_directive_arguments a
         JOIN document_variable_directives vd ON vd.id = a.parent
         JOIN document_variables dv ON dv.id = vd.parent
         WHERE dv.document IN ({ids}) ORDER BY a.id",
        ids,
    )?;

    let mut variables: AHashMap<i64, Vec<CollectedVariable>> = AHashMap::new();
    for (document, id, name, base, modifiers, default) in query_in(
        conn,
        "SELECT document, id, name, type, type_modifiers, default_value
         FROM document_variables WHERE document IN ({ids}) ORDER BY id",
        ids,
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<i64>>(5)?,
            ))
        },
    )? {
        variables.entry(document).or_default().push(CollectedVariable {
            name,
            type_name: type_modifiers::unparse(&base, &modifiers),
            default: default.map(|value| values.build(value)),
            directives: variable_directives.directives(id, &values),
        });
    }

    let mut roots: AHashMap<i64, Vec<&TreeRow>> = AHashMap::new();
    let mut children: AHashMap<&str, Vec<&TreeRow>> = AHashMap::new();
    for row in &rows {
        match &row.parent {
            Some(parent) => children.entry(parent.as_str()).or_default().push(row),
            None => roots.entry(row.root).or_default().push(row),
        }
    }
    let assembly = Assembly {
        children,
        arguments,
        directives: selection_directives,
        values,
    };

    let mut collected = Vec::with_capacity(ids.len());
    for id in ids {
        let Some((name, kind, type_condition)) = headers.get(id) else {
            continue;
        };
        collected.push(CollectedDocument {
            id: *id,
            name: name.clone(),
            kind: kind.clone(),
            type_condition: type_condition.clone(),
            variables: variables.remove(id).unwrap_or_default(),
            directives: document_directives.directives(*id, &assembly.values),
            selections: roots
                .get(id)
                .map(|rows| rows.iter().map(|row| assembly.selection(row)).collect())
                .unwrap_or_default(),
        });
    }
    Ok(collected)
}
