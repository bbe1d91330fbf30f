//! Rules about field arguments and the values passed to them.
//!
//! Value checks only look at values with a schema-declared slot: field
//! arguments the schema knows, arguments of declared directives, variable
//! defaults, and the items and known input fields nested below those.
//! Everything else (unknown arguments, free-form directive payloads) is
//! reported by other rules or not at all.

use crate::graphql::type_modifiers;

use super::RuleContext;

/// Values with a schema-declared expected type, as the `slotted(id)` CTE.
const SLOTTED: &str = ",
slotted(id) AS (
    SELECT a.value
    FROM selection_arguments a
    JOIN docs ON docs.id = a.document
    WHERE a.field_argument IS NOT NULL
    UNION ALL
    SELECT a.value
    FROM selection_directive_arguments a
    JOIN selection_directives sd ON sd.id = a.parent
    JOIN directive_arguments da ON da.parent = sd.directive AND da.name = a.name
    JOIN docs ON docs.id = a.document
    UNION ALL
    SELECT a.value
    FROM document_directive_arguments a
    JOIN document_directives dd ON dd.id = a.parent
    JOIN directive_arguments da ON da.parent = dd.directive AND da.name = a.name
    JOIN docs ON docs.id = dd.document
    UNION ALL
    SELECT a.value
    FROM document_variable_directive_arguments a
    JOIN document_variable_directives vd ON vd.id = a.parent
    JOIN directive_arguments da ON da.parent = vd.directive AND da.name = a.name
    JOIN document_variables dv ON dv.id = vd.parent
    JOIN docs ON docs.id = dv.document
    UNION ALL
    SELECT dv.default_value
    FROM document_variables dv
    JOIN docs ON docs.id = dv.document
    JOIN types vt ON vt.name = dv.type
    WHERE dv.default_value IS NOT NULL
    UNION ALL
    SELECT c.value
    FROM slotted p
    JOIN argument_values pv ON pv.id = p.id
    JOIN argument_value_children c ON c.parent = p.id
    WHERE pv.kind = 'List'
       OR EXISTS (
           SELECT 1 FROM type_fields tf
           JOIN types t ON t.name = tf.parent AND t.kind = 'INPUT'
           WHERE tf.parent = pv.expected_type AND tf.name = c.name
       )
)";

fn with_slotted(query: &str) -> String {
    format!("{}{SLOTTED}\n{query}", scoped!(""))
}

pub fn duplicate_argument_in_field(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    ctx.report_rows(scoped!(
        "SELECT 'argument \"' || a.name || '\" is given more than once to \"' || sels.field_name || '\"',
                sels.filepath, a.line, a.col
         FROM selection_arguments a
         JOIN sels ON sels.id = a.selection_id
         WHERE EXISTS (
             SELECT 1 FROM selection_arguments o
             WHERE o.selection_id = a.selection_id AND o.name = a.name AND o.id < a.id
         )"
    ))
}

pub fn known_arguments(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    ctx.report_rows(scoped!(
        "SELECT 'unknown argument \"' || a.name || '\" on field \"' || sels.type || '\"',
                sels.filepath, a.line, a.col
         FROM selection_arguments a
         JOIN sels ON sels.id = a.selection_id
         JOIN type_fields tf ON tf.id = sels.type
         WHERE a.field_argument IS NULL"
    ))
}

/// Non-null arguments without a default that were not passed, on fields and directives.
pub fn missing_required_argument(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    ctx.report_rows(scoped!(
        "SELECT 'missing required argument \"' || fad.name || '\" on field \"' || sels.type || '\"',
                sels.filepath, sels.line, sels.col
         FROM sels
         JOIN field_argument_definitions fad ON fad.field = sels.type
         WHERE sels.kind = 'field'
           AND substr(fad.type_modifiers, -1) = '!'
           AND fad.default_value IS NULL
           AND NOT EXISTS (
               SELECT 1 FROM selection_arguments a WHERE a.selection_id = sels.id AND a.name = fad.name
           )
         UNION ALL
         SELECT 'missing required argument \"' || da.name || '\" on directive @' || sd.directive,
                sels.filepath, sd.line, sd.col
         FROM sels
         JOIN selection_directives sd ON sd.selection_id = sels.id
         JOIN directive_arguments da ON da.parent = sd.directive
         WHERE substr(da.type_modifiers, -1) = '!'
           AND da.default_value IS NULL
           AND NOT EXISTS (
               SELECT 1 FROM selection_directive_arguments x WHERE x.parent = sd.id AND x.name = da.name
           )
         UNION ALL
         SELECT 'missing required argument \"' || da.name || '\" on directive @' || dd.directive,
                docs.filepath, dd.line, dd.col
         FROM docs
         JOIN document_directives dd ON dd.document = docs.id
         JOIN directive_arguments da ON da.parent = dd.directive
         WHERE substr(da.type_modifiers, -1) = '!'
           AND da.default_value IS NULL
           AND NOT EXISTS (
               SELECT 1 FROM document_directive_arguments x WHERE x.parent = dd.id AND x.name = da.name
           )
         UNION ALL
         SELECT 'missing required argument \"' || da.name || '\" on directive @' || vd.directive,
                docs.filepath, vd.line, vd.col
         FROM docs
         JOIN document_variables dv ON dv.document = docs.id
         JOIN document_variable_directives vd ON vd.parent = dv.id
         JOIN directive_arguments da ON da.parent = vd.directive
         WHERE substr(da.type_modifiers, -1) = '!'
           AND da.default_value IS NULL
           AND NOT EXISTS (
               SELECT 1 FROM document_variable_directive_arguments x WHERE x.parent = vd.id AND x.name = da.name
           )"
    ))
}

/// A variable whose base type differs from the type expected where it is used.
pub fn field_argument_incompatible_type(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    let sql = with_slotted(
        "SELECT 'variable \"$' || dv.name || '\" of type \"' || dv.type
                || '\" cannot be used where \"' || v.expected_type || '\" is expected',
                docs.filepath, v.line, v.col
         FROM slotted
         JOIN argument_values v ON v.id = slotted.id
         JOIN docs ON docs.id = v.document
         JOIN document_variables dv ON dv.document = v.document AND dv.name = v.raw
         WHERE v.kind = 'Variable' AND dv.type <> v.expected_type",
    );
    ctx.report_rows(&sql)
}

/// Literal kinds, enum values, null, list nesting, and variable modifiers against their slot.
///
/// `ID` accepts string and integer literals; `Float` accepts integers;
/// custom scalars accept any literal. A variable may be one level more
/// non-null than its slot, or one level less when it has a default.
pub fn wrong_types_to_scalar_arg(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    let sql = with_slotted(
        "SELECT problem, raw, kind, expected_type, expected_modifiers, var_modifiers, filepath, line, col
         FROM (
             SELECT CASE
                        WHEN v.kind = 'Null'
                             THEN CASE WHEN substr(v.expected_type_modifiers, -1) = '!' THEN 'null' END
                        WHEN v.kind = 'List'
                             THEN CASE WHEN rtrim(v.expected_type_modifiers, '!') NOT LIKE '%]' THEN 'list' END
                        WHEN v.kind = 'Variable'
                             THEN CASE WHEN dv.id IS NOT NULL
                                        AND dv.type_modifiers <> v.expected_type_modifiers
                                        AND dv.type_modifiers <> v.expected_type_modifiers || '!'
                                        AND NOT (dv.default_value IS NOT NULL
                                                 AND dv.type_modifiers || '!' = v.expected_type_modifiers)
                                       THEN 'variable' END
                        WHEN t.kind = 'ENUM'
                             THEN CASE WHEN v.kind <> 'Enum' THEN 'kind'
                                       WHEN NOT EXISTS (SELECT 1 FROM enum_values e
                                                         WHERE e.parent = t.name AND e.value = v.raw)
                                       THEN 'enum' END
                        WHEN t.kind = 'SCALAR'
                             THEN CASE
                                      WHEN t.name = 'Int' AND v.kind <> 'Int' THEN 'kind'
                                      WHEN t.name = 'Float' AND v.kind NOT IN ('Int', 'Float') THEN 'kind'
                                      WHEN t.name = 'String' AND v.kind NOT IN ('String', 'Block') THEN 'kind'
                                      WHEN t.name = 'Boolean' AND v.kind <> 'Boolean' THEN 'kind'
                                      WHEN t.name = 'ID' AND v.kind NOT IN ('String', 'Block', 'Int') THEN 'kind'
                                  END
                    END AS problem,
                    v.raw, v.kind, v.expected_type, v.expected_type_modifiers AS expected_modifiers,
                    dv.type_modifiers AS var_modifiers, docs.filepath, v.line, v.col
             FROM slotted
             JOIN argument_values v ON v.id = slotted.id
             JOIN docs ON docs.id = v.document
             LEFT JOIN types t ON t.name = v.expected_type
             LEFT JOIN document_variables dv
                    ON v.kind = 'Variable' AND dv.document = v.document AND dv.name = v.raw
         )
         WHERE problem IS NOT NULL
         ORDER BY filepath, line, col",
    );

    let found = {
        let mut stmt = ctx.conn.prepare(&sql)?;
        let rows = stmt.query_map([ctx.task], |row| {
            let problem: String = row.get(0)?;
            let raw: String = row.get(1)?;
            let kind: String = row.get(2)?;
            let expected = type_modifiers::unparse(&row.get::<_, String>(3)?, &row.get::<_, String>(4)?);
            let message = match problem.as_str() {
                "null" => format!("null is not allowed for non-null type \"{expected}\""),
                "list" => format!("a list is not allowed for non-list type \"{expected}\""),
                "variable" => {
                    let base: String = row.get(3)?;
                    let declared = type_modifiers::unparse(&base, &row.get::<_, String>(5)?);
                    format!("variable \"${raw}\" of type \"{declared}\" cannot be used where \"{expected}\" is expected")
                }
                "enum" => format!("enum \"{}\" has no value \"{raw}\"", row.get::<_, String>(3)?),
                _ => format!(
                    "expected a value of type \"{expected}\", found {} {raw}",
                    kind.to_lowercase()
                ),
            };
            Ok((message, row.get::<_, String>(6)?, row.get::<_, i64>(7)?, row.get::<_, i64>(8)?))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };
    for (message, filepath, line, col) in found {
        ctx.report(message, &filepath, line, col);
    }
    Ok(())
}

/// Input-object slots: non-object literals, unknown fields, missing required fields.
pub fn wrong_types_to_structured_arg(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    let sql = with_slotted(
        ", inputs AS (
            SELECT v.*, docs.filepath
            FROM slotted
            JOIN argument_values v ON v.id = slotted.id
            JOIN docs ON docs.id = v.document
            JOIN types t ON t.name = v.expected_type AND t.kind = 'INPUT'
        )
        SELECT 'expected an input object of type \"' || i.expected_type || '\"', i.filepath, i.line, i.col
        FROM inputs i
        WHERE i.kind NOT IN ('Object', 'Null', 'Variable', 'List')
        UNION ALL
        SELECT 'unknown field \"' || c.name || '\" on input type \"' || i.expected_type || '\"',
               i.filepath, i.line, i.col
        FROM inputs i
        JOIN argument_value_children c ON c.parent = i.id
        WHERE i.kind = 'Object'
          AND NOT EXISTS (SELECT 1 FROM type_fields tf WHERE tf.parent = i.expected_type AND tf.name = c.name)
        UNION ALL
        SELECT 'missing required field \"' || tf.name || '\" on input type \"' || i.expected_type || '\"',
               i.filepath, i.line, i.col
        FROM inputs i
        JOIN type_fields tf ON tf.parent = i.expected_type
        WHERE i.kind = 'Object'
          AND substr(tf.type_modifiers, -1) = '!'
          AND tf.default_value IS NULL
          AND NOT EXISTS (SELECT 1 FROM argument_value_children c WHERE c.parent = i.id AND c.name = tf.name)",
    );
    ctx.report_rows(&sql)
}

pub fn duplicate_keys_in_input_object(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    ctx.report_rows(scoped!(
        "SELECT 'field \"' || c.name || '\" appears more than once in an input object',
                docs.filepath, v.line, v.col
         FROM argument_values v
         JOIN docs ON docs.id = v.document
         JOIN argument_value_children c ON c.parent = v.id
         WHERE v.kind = 'Object'
           AND EXISTS (
               SELECT 1 FROM argument_value_children o
               WHERE o.parent = c.parent AND o.name = c.name AND o.id < c.id
           )"
    ))
}
