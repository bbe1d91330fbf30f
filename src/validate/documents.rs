//! Rules about whole documents and fragment spreads.

use ahash::{AHashMap, AHashSet};

use super::RuleContext;

pub fn subscriptions_with_multiple_root_fields(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    ctx.report_rows(scoped!(
        "SELECT 'subscriptions can only have a single root field', docs.filepath, docs.line, docs.col
         FROM docs
         WHERE docs.kind = 'subscription'
           AND (SELECT COUNT(*) FROM selection_refs r
                 WHERE r.document = docs.id AND r.parent_id IS NULL AND r.internal = 0) > 1"
    ))
}

pub fn duplicate_document_names(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    ctx.report_rows(scoped!(
        "SELECT 'document name \"' || docs.name || '\" is not unique', docs.filepath, docs.line, docs.col
         FROM docs
         WHERE EXISTS (SELECT 1 FROM documents o WHERE o.name = docs.name AND o.id <> docs.id)"
    ))
}

pub fn fragment_unknown_type(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    ctx.report_rows(scoped!(
        "SELECT 'fragment \"' || docs.name || '\" is on unknown type \"' || docs.type_condition || '\"',
                docs.filepath, docs.line, docs.col
         FROM docs
         WHERE docs.kind = 'fragment'
           AND NOT EXISTS (SELECT 1 FROM types t WHERE t.name = docs.type_condition)
         UNION ALL
         SELECT 'inline fragment is on unknown type \"' || sels.field_name || '\"',
                sels.filepath, sels.line, sels.col
         FROM sels
         WHERE sels.kind = 'inline_fragment'
           AND sels.field_name <> 'inline_fragment'
           AND NOT EXISTS (SELECT 1 FROM types t WHERE t.name = sels.field_name)"
    ))
}

pub fn fragment_on_scalar(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    ctx.report_rows(scoped!(
        "SELECT 'fragment \"' || docs.name || '\" cannot condition on non-composite type \"'
                || docs.type_condition || '\"',
                docs.filepath, docs.line, docs.col
         FROM docs
         JOIN types t ON t.name = docs.type_condition
         WHERE docs.kind = 'fragment' AND t.kind NOT IN ('OBJECT', 'INTERFACE', 'UNION')
         UNION ALL
         SELECT 'inline fragment cannot condition on non-composite type \"' || sels.field_name || '\"',
                sels.filepath, sels.line, sels.col
         FROM sels
         JOIN types t ON t.name = sels.field_name
         WHERE sels.kind = 'inline_fragment' AND t.kind NOT IN ('OBJECT', 'INTERFACE', 'UNION')"
    ))
}

pub fn unknown_fragment(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    ctx.report_rows(scoped!(
        "SELECT 'unknown fragment \"' || sels.field_name || '\"', sels.filepath, sels.line, sels.col
         FROM sels
         WHERE sels.kind = 'fragment'
           AND NOT EXISTS (
               SELECT 1 FROM documents f WHERE f.name = sels.field_name AND f.kind = 'fragment'
           )"
    ))
}

/// A spread or inline fragment whose type can never overlap its parent type.
pub fn incompatible_fragment_spread(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    ctx.report_rows(scoped!(
        ", spreads AS (
            SELECT sels.*, sels.field_name AS fragment,
                   (SELECT f.type_condition FROM documents f
                     WHERE f.name = sels.field_name AND f.kind = 'fragment'
                     ORDER BY f.id LIMIT 1) AS condition
            FROM sels
            WHERE sels.kind = 'fragment'
            UNION ALL
            SELECT sels.*, NULL, sels.field_name
            FROM sels
            WHERE sels.kind = 'inline_fragment'
        )
        SELECT CASE WHEN s.fragment IS NULL
                    THEN 'inline fragment on \"' || s.condition || '\" can never apply to \"' || s.type || '\"'
                    ELSE 'fragment \"' || s.fragment || '\" on \"' || s.condition
                         || '\" cannot be spread inside \"' || s.type || '\"'
               END,
               s.filepath, s.line, s.col
        FROM spreads s
        WHERE s.type IS NOT NULL
          AND s.condition IS NOT NULL
          AND EXISTS (SELECT 1 FROM types t WHERE t.name = s.condition)
          AND NOT EXISTS (
              SELECT 1 FROM type_possibilities a
              JOIN type_possibilities b ON b.member = a.member
              WHERE a.type = s.type AND b.type = s.condition
          )"
    ))
}

struct Spread {
    target: String,
    filepath: String,
    line: i64,
    col: i64,
}

/// Spreads that eventually lead back to the fragment containing them.
///
/// Cycles are found over every fragment in the project and reported once,
/// starting from the alphabetically first fragment of the cycle, when that
/// fragment is in scope.
pub fn fragment_cycles(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    let mut edges: AHashMap<String, Vec<Spread>> = AHashMap::new();
    {
        let mut stmt = ctx.conn.prepare(
            "SELECT d.name, s.field_name, raw.filepath, r.line, r.col
             FROM documents d
             JOIN raw_documents raw ON raw.id = d.raw_document
             JOIN selection_refs r ON r.document = d.id
             JOIN selections s ON s.id = r.child_id
             WHERE d.kind = 'fragment' AND s.kind = 'fragment'
             ORDER BY d.name, r.id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                Spread {
                    target: row.get(1)?,
                    filepath: row.get(2)?,
                    line: row.get(3)?,
                    col: row.get(4)?,
                },
            ))
        })?;
        for row in rows {
            let (source, spread) = row?;
            edges.entry(source).or_default().push(spread);
        }
    }
    let in_scope: AHashSet<String> = {
        let mut stmt = ctx.conn.prepare(scoped!("SELECT name FROM docs WHERE kind = 'fragment'"))?;
        let rows = stmt.query_map([ctx.task], |row| row.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let mut names: Vec<&String> = edges.keys().collect();
    names.sort();
    let mut reported: AHashSet<String> = AHashSet::new();
    for start in names {
        if reported.contains(start) || !in_scope.contains(start) {
            continue;
        }
        let Some(path) = cycle_from(&edges, start) else {
            continue;
        };
        // only the smallest member of a cycle reports it
        if path.iter().any(|name| name.as_str() < start.as_str()) {
            continue;
        }
        reported.extend(path.iter().cloned());

        let trace = path
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(start.as_str()))
            .collect::<Vec<_>>()
            .join(" -> ");
        let next = path.get(1).unwrap_or(start);
        if let Some(spread) = edges.get(start).and_then(|s| s.iter().find(|s| &s.target == next)) {
            let (filepath, line, col) = (spread.filepath.clone(), spread.line, spread.col);
            ctx.report(format!("fragment cycle detected: {trace}"), &filepath, line, col);
        }
    }
    Ok(())
}

/// Shortest path of fragment names from `start` back to itself.
fn cycle_from(edges: &AHashMap<String, Vec<Spread>>, start: &str) -> Option<Vec<String>> {
    let mut previous: AHashMap<&str, &str> = AHashMap::new();
    let mut queue = std::collections::VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        for spread in edges.get(current).into_iter().flatten() {
            let target = spread.target.as_str();
            if target == start {
                let mut path = vec![current.to_string()];
                let mut at = current;
                while at != start {
                    at = previous.get(at).copied()?;
                    path.push(at.to_string());
                }
                path.reverse();
                return Some(path);
            }
            if !previous.contains_key(target) {
                previous.insert(target, current);
                queue.push_back(target);
            }
        }
    }
    None
}
