//! Rules about passing arguments to fragments with `@with`.

use crate::schema::internal::names;

use super::RuleContext;

/// Unknown, mistyped, or unexpected `@with` arguments.
///
/// A fragment accepts arguments only when it declares them with
/// `@arguments`; each passed literal must fit the declared type.
pub fn fragment_arguments(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    let task = ctx.task;
    ctx.report_rows_with(
        scoped!(
            ", withs AS (
                SELECT sels.field_name, sels.filepath, sd.id AS directive, sd.line, sd.col,
                       (SELECT f.id FROM documents f
                         WHERE f.name = sels.field_name AND f.kind = 'fragment'
                         ORDER BY f.id LIMIT 1) AS fragment
                FROM sels
                JOIN selection_directives sd ON sd.selection_id = sels.id AND sd.directive = ?2
                WHERE sels.kind = 'fragment'
            ),
            declaring AS (
                SELECT w.*,
                       EXISTS (SELECT 1 FROM document_directives dd
                                WHERE dd.document = w.fragment AND dd.directive = ?3) AS declares
                FROM withs w
                WHERE w.fragment IS NOT NULL
            )
            SELECT 'fragment \"' || w.field_name || '\" does not declare any arguments', w.filepath, w.line, w.col
            FROM declaring w
            WHERE NOT w.declares
            UNION ALL
            SELECT 'unknown argument \"' || a.name || '\" for fragment \"' || w.field_name || '\"',
                   w.filepath, v.line, v.col
            FROM declaring w
            JOIN selection_directive_arguments a ON a.parent = w.directive
            JOIN argument_values v ON v.id = a.value
            WHERE w.declares
              AND NOT EXISTS (SELECT 1 FROM document_variables dv WHERE dv.document = w.fragment AND dv.name = a.name)
            UNION ALL
            SELECT 'argument \"' || a.name || '\" of fragment \"' || w.field_name || '\" expects type \"' || dv.type || '\"',
                   w.filepath, v.line, v.col
            FROM declaring w
            JOIN selection_directive_arguments a ON a.parent = w.directive
            JOIN argument_values v ON v.id = a.value
            JOIN document_variables dv ON dv.document = w.fragment AND dv.name = a.name
            JOIN types t ON t.name = dv.type
            WHERE CASE
                      WHEN v.kind = 'Variable' THEN 0
                      WHEN v.kind = 'Null' THEN substr(dv.type_modifiers, -1) = '!'
                      WHEN v.kind = 'List' THEN rtrim(dv.type_modifiers, '!') NOT LIKE '%]'
                      WHEN t.kind = 'ENUM'
                           THEN v.kind <> 'Enum'
                                OR NOT EXISTS (SELECT 1 FROM enum_values e WHERE e.parent = t.name AND e.value = v.raw)
                      WHEN t.kind = 'INPUT' THEN v.kind <> 'Object'
                      WHEN t.name = 'Int' THEN v.kind <> 'Int'
                      WHEN t.name = 'Float' THEN v.kind NOT IN ('Int', 'Float')
                      WHEN t.name = 'String' THEN v.kind NOT IN ('String', 'Block')
                      WHEN t.name = 'Boolean' THEN v.kind <> 'Boolean'
                      WHEN t.name = 'ID' THEN v.kind NOT IN ('String', 'Block', 'Int')
                      ELSE 0
                  END"
        ),
        rusqlite::params![task, names::WITH, names::ARGUMENTS],
    )
}

/// Spreads that leave out a non-null fragment argument without a default.
pub fn fragment_arguments_missing_with(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    let task = ctx.task;
    ctx.report_rows_with(
        scoped!(
            ", spreads AS (
                SELECT sels.*,
                       (SELECT f.id FROM documents f
                         WHERE f.name = sels.field_name AND f.kind = 'fragment'
                         ORDER BY f.id LIMIT 1) AS fragment
                FROM sels
                WHERE sels.kind = 'fragment'
            )
            SELECT 'missing required argument \"' || dv.name || '\" for fragment \"' || s.field_name || '\"',
                   s.filepath, s.line, s.col
            FROM spreads s
            JOIN document_variables dv ON dv.document = s.fragment
            WHERE substr(dv.type_modifiers, -1) = '!'
              AND dv.default_value IS NULL
              AND NOT EXISTS (
                  SELECT 1 FROM selection_directives sd
                  JOIN selection_directive_arguments a ON a.parent = sd.id
                  WHERE sd.selection_id = s.id AND sd.directive = ?2 AND a.name = dv.name
              )"
        ),
        rusqlite::params![task, names::WITH],
    )
}
