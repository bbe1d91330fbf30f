//! Rules about directive applications.

use crate::schema::internal::{names, ARBITRARY_ARGUMENT_DIRECTIVES, NODE_INTERFACE};

use super::RuleContext;

/// Every directive application in scope with the location it sits at.
///
/// `source` tells which table `id` belongs to; `owner` is the selection,
/// document or variable carrying the directive.
const APPLIED: &str = ",
applied(id, source, directive, location, owner, filepath, line, col) AS (
    SELECT sd.id, 'selection', sd.directive,
           CASE sels.kind WHEN 'field' THEN 'FIELD'
                          WHEN 'fragment' THEN 'FRAGMENT_SPREAD'
                          ELSE 'INLINE_FRAGMENT' END,
           sels.id, sels.filepath, sd.line, sd.col
    FROM sels
    JOIN selection_directives sd ON sd.selection_id = sels.id
    UNION ALL
    SELECT dd.id, 'document', dd.directive,
           CASE docs.kind WHEN 'query' THEN 'QUERY'
                          WHEN 'mutation' THEN 'MUTATION'
                          WHEN 'subscription' THEN 'SUBSCRIPTION'
                          ELSE 'FRAGMENT_DEFINITION' END,
           docs.id, docs.filepath, dd.line, dd.col
    FROM docs
    JOIN document_directives dd ON dd.document = docs.id
    UNION ALL
    SELECT vd.id, 'variable', vd.directive, 'VARIABLE_DEFINITION', dv.id, docs.filepath, vd.line, vd.col
    FROM docs
    JOIN document_variables dv ON dv.document = docs.id
    JOIN document_variable_directives vd ON vd.parent = dv.id
),
applied_args(source, parent, name, value) AS (
    SELECT 'selection', parent, name, value FROM selection_directive_arguments
    UNION ALL
    SELECT 'document', parent, name, value FROM document_directive_arguments
    UNION ALL
    SELECT 'variable', parent, name, value FROM document_variable_directive_arguments
)";

fn with_applied(query: &str) -> String {
    format!("{}{APPLIED}\n{query}", scoped!(""))
}

pub fn unknown_directive(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    let sql = with_applied(
        "SELECT 'unknown directive @' || a.directive, a.filepath, a.line, a.col
         FROM applied a
         WHERE NOT EXISTS (SELECT 1 FROM directives d WHERE d.name = a.directive)",
    );
    ctx.report_rows(&sql)
}

pub fn repeating_non_repeatable(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    let sql = with_applied(
        "SELECT 'directive @' || a.directive || ' cannot be repeated here', a.filepath, a.line, a.col
         FROM applied a
         JOIN directives d ON d.name = a.directive AND d.repeatable = 0
         WHERE EXISTS (
             SELECT 1 FROM applied b
             WHERE b.source = a.source AND b.owner = a.owner AND b.directive = a.directive AND b.id < a.id
         )",
    );
    ctx.report_rows(&sql)
}

pub fn directive_location(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    let sql = with_applied(
        "SELECT 'directive @' || a.directive || ' is not allowed on ' || a.location, a.filepath, a.line, a.col
         FROM applied a
         JOIN directives d ON d.name = a.directive
         WHERE NOT EXISTS (
             SELECT 1 FROM directive_locations l WHERE l.directive = a.directive AND l.location = a.location
         )",
    );
    ctx.report_rows(&sql)
}

/// Arguments a declared directive does not define. Directives with free-form payloads are skipped.
pub fn known_directive_arguments(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    let arbitrary = ARBITRARY_ARGUMENT_DIRECTIVES
        .iter()
        .map(|name| format!("'{name}'"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = with_applied(&format!(
        "SELECT 'unknown argument \"' || x.name || '\" on directive @' || a.directive, a.filepath, v.line, v.col
         FROM applied a
         JOIN directives d ON d.name = a.directive
         JOIN applied_args x ON x.source = a.source AND x.parent = a.id
         JOIN argument_values v ON v.id = x.value
         WHERE a.directive NOT IN ({arbitrary})
           AND NOT EXISTS (
               SELECT 1 FROM directive_arguments da WHERE da.parent = a.directive AND da.name = x.name
           )"
    ));
    ctx.report_rows(&sql)
}

/// Selections carrying both `first` and `second`.
fn mutually_exclusive(ctx: &mut RuleContext<'_>, first: &str, second: &str) -> rusqlite::Result<()> {
    let task = ctx.task;
    ctx.report_rows_with(
        scoped!(
            "SELECT '@' || ?2 || ' and @' || ?3 || ' cannot be used together', sels.filepath, sels.line, sels.col
             FROM sels
             WHERE EXISTS (SELECT 1 FROM selection_directives sd WHERE sd.selection_id = sels.id AND sd.directive = ?2)
               AND EXISTS (SELECT 1 FROM selection_directives sd WHERE sd.selection_id = sels.id AND sd.directive = ?3)"
        ),
        rusqlite::params![task, first, second],
    )
}

pub fn conflicting_parent_id_all_lists(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    mutually_exclusive(ctx, names::PARENT_ID, names::ALL_LISTS)
}

pub fn conflicting_prepend_append(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    mutually_exclusive(ctx, names::PREPEND, names::APPEND)
}

pub fn mask_directives(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    mutually_exclusive(ctx, names::MASK_ENABLE, names::MASK_DISABLE)
}

/// `@required` needs a nullable field on an object type, unless a child is itself `@required`.
pub fn required_directive(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    let task = ctx.task;
    ctx.report_rows_with(
        scoped!(
            "SELECT '@required may only be used on nullable fields of object types', sels.filepath, sels.line, sels.col
             FROM sels
             JOIN selection_directives sd ON sd.selection_id = sels.id AND sd.directive = ?2
             JOIN selection_field_types sft ON sft.selection_id = sels.id
             JOIN types parent ON parent.name = sft.parent_type
             WHERE NOT (substr(sft.field_type_modifiers, -1) <> '!' AND parent.kind = 'OBJECT')
               AND NOT EXISTS (
                     SELECT 1 FROM selection_refs c
                     JOIN selection_directives cd ON cd.selection_id = c.child_id AND cd.directive = ?2
                     WHERE c.parent_id = sels.id
                 )"
        ),
        rusqlite::params![task, names::REQUIRED],
    )
}

/// `@node` only on fields whose type is the node interface or one of its implementations.
pub fn node_directive(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    let task = ctx.task;
    ctx.report_rows_with(
        scoped!(
            "SELECT '@node can only be used on fields whose type implements ' || ?3, sels.filepath, sels.line, sels.col
             FROM sels
             JOIN selection_directives sd ON sd.selection_id = sels.id AND sd.directive = ?2
             JOIN selection_field_types sft ON sft.selection_id = sels.id
             WHERE sft.field_type <> ?3
               AND NOT EXISTS (SELECT 1 FROM possible_types p WHERE p.type = ?3 AND p.member = sft.field_type)"
        ),
        rusqlite::params![task, names::NODE, NODE_INTERFACE],
    )
}

/// A nested `@loading` field or inline fragment needs `@loading` on its parent,
/// unless the whole document is marked.
pub fn loading_directive(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    let task = ctx.task;
    ctx.report_rows_with(
        scoped!(
            "SELECT '@loading on a nested selection requires @loading on its parent', sels.filepath, sd.line, sd.col
             FROM sels
             JOIN selection_directives sd ON sd.selection_id = sels.id AND sd.directive = ?2
             WHERE sels.parent_id IS NOT NULL
               AND sels.kind IN ('field', 'inline_fragment')
               AND NOT EXISTS (
                   SELECT 1 FROM selection_directives p WHERE p.selection_id = sels.parent_id AND p.directive = ?2
               )
               AND NOT EXISTS (
                   SELECT 1 FROM document_directives dd WHERE dd.document = sels.document AND dd.directive = ?2
               )"
        ),
        rusqlite::params![task, names::LOADING],
    )
}

pub fn optimistic_key_on_scalar(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    let task = ctx.task;
    ctx.report_rows_with(
        scoped!(
            "SELECT '@optimisticKey can only be used on scalar fields', sels.filepath, sels.line, sels.col
             FROM sels
             JOIN selection_directives sd ON sd.selection_id = sels.id AND sd.directive = ?2
             JOIN selection_field_types sft ON sft.selection_id = sels.id
             WHERE sft.field_type_kind <> 'SCALAR'"
        ),
        rusqlite::params![task, names::OPTIMISTIC_KEY],
    )
}

/// `@optimisticKey` lives in mutations, and once one key of a type is marked, all of them are.
pub fn optimistic_key_full_selection(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    let task = ctx.task;
    ctx.report_rows_with(
        scoped!(
            ", marked AS (
                SELECT sels.ref_id, sels.parent_id, sels.document, sels.document_kind, sels.field_name,
                       sels.filepath, sels.line, sels.col, sd.line AS directive_line, sd.col AS directive_col,
                       substr(sels.type, 1, instr(sels.type, '.') - 1) AS parent_type
                FROM sels
                JOIN selection_directives sd ON sd.selection_id = sels.id AND sd.directive = ?2
                WHERE sels.kind = 'field'
            ),
            groups AS (
                SELECT document, parent_id, parent_type, MIN(ref_id) AS first_ref
                FROM marked
                GROUP BY document, parent_id, parent_type
            )
            SELECT '@optimisticKey can only be used in mutations', m.filepath, m.directive_line, m.directive_col
            FROM marked m
            WHERE m.document_kind <> 'mutation'
            UNION ALL
            SELECT 'key field \"' || k.field || '\" of \"' || g.parent_type || '\" must also be marked @optimisticKey',
                   m.filepath, m.line, m.col
            FROM groups g
            JOIN marked m ON m.ref_id = g.first_ref
            JOIN type_keys k ON k.type = g.parent_type
            JOIN type_fields tf ON tf.parent = k.type AND tf.name = k.field
            WHERE NOT EXISTS (
                SELECT 1 FROM marked x
                WHERE x.document = g.document AND x.parent_id IS g.parent_id AND x.field_name = k.field
            )"
        ),
        rusqlite::params![task, names::OPTIMISTIC_KEY],
    )
}
