//! Rules about fields and their sub-selections.

use crate::graphql::type_modifiers;

use super::RuleContext;

pub fn scalar_with_selection(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    ctx.report_rows(scoped!(
        "SELECT 'field \"' || sels.field_name || '\" of type \"' || sft.field_type
                || '\" cannot have a selection of subfields',
                sels.filepath, sels.line, sels.col
         FROM sels
         JOIN selection_field_types sft ON sft.selection_id = sels.id
         WHERE sft.field_type_kind IN ('SCALAR', 'ENUM')
           AND EXISTS (SELECT 1 FROM selection_refs c WHERE c.parent_id = sels.id AND c.internal = 0)"
    ))
}

pub fn composite_without_selection(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    ctx.report_rows(scoped!(
        "SELECT 'field \"' || sels.field_name || '\" of type \"' || sft.field_type
                || '\" must have a selection of subfields',
                sels.filepath, sels.line, sels.col
         FROM sels
         JOIN selection_field_types sft ON sft.selection_id = sels.id
         WHERE sft.field_type_kind IN ('OBJECT', 'INTERFACE', 'UNION')
           AND NOT EXISTS (SELECT 1 FROM selection_refs c WHERE c.parent_id = sels.id)"
    ))
}

/// Fields with a known parent type that the type does not declare.
pub fn unknown_field(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    ctx.report_rows(scoped!(
        "SELECT 'unknown field \"' || sels.field_name || '\" on type \"'
                || substr(sels.type, 1, instr(sels.type, '.') - 1) || '\"',
                sels.filepath, sels.line, sels.col
         FROM sels
         WHERE sels.kind = 'field'
           AND sels.type IS NOT NULL
           AND NOT EXISTS (SELECT 1 FROM type_fields tf WHERE tf.id = sels.type)"
    ))
}

/// Two fields answering to the same response key in one selection set with different types.
pub fn conflicting_selections(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    let conflicts = {
        let mut stmt = ctx.conn.prepare(scoped!(
            "SELECT IFNULL(b.alias, b.field_name), a.type, fa.field_type, fa.field_type_modifiers,
                    b.type, fb.field_type, fb.field_type_modifiers, b.filepath, b.line, b.col
             FROM sels a
             JOIN sels b
               ON b.document = a.document
              AND b.parent_id IS a.parent_id
              AND b.ref_id > a.ref_id
              AND IFNULL(b.alias, b.field_name) = IFNULL(a.alias, a.field_name)
             JOIN selection_field_types fa ON fa.selection_id = a.id
             JOIN selection_field_types fb ON fb.selection_id = b.id
             WHERE a.kind = 'field' AND b.kind = 'field'
               AND (fa.field_type <> fb.field_type OR fa.field_type_modifiers <> fb.field_type_modifiers)
             ORDER BY b.ref_id"
        ))?;
        let rows = stmt.query_map([ctx.task], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                type_modifiers::unparse(&row.get::<_, String>(2)?, &row.get::<_, String>(3)?),
                row.get::<_, String>(4)?,
                type_modifiers::unparse(&row.get::<_, String>(5)?, &row.get::<_, String>(6)?),
                row.get::<_, String>(7)?,
                row.get::<_, i64>(8)?,
                row.get::<_, i64>(9)?,
            ))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };

    for (key, first, first_type, second, second_type, filepath, line, col) in conflicts {
        ctx.report(
            format!("conflicting selections for \"{key}\": {first} returns {first_type} but {second} returns {second_type}"),
            &filepath,
            line,
            col,
        );
    }
    Ok(())
}

/// An alias may not shadow a key field of its parent type.
pub fn no_key_alias(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    ctx.report_rows(scoped!(
        "SELECT 'alias \"' || sels.alias || '\" is reserved for the key field of \"' || k.type || '\"',
                sels.filepath, sels.line, sels.col
         FROM sels
         JOIN type_keys k
           ON k.type = substr(sels.type, 1, instr(sels.type, '.') - 1)
          AND k.field = sels.alias
         WHERE sels.kind = 'field'
           AND sels.alias IS NOT NULL
           AND sels.alias <> sels.field_name"
    ))
}
