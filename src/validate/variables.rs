//! Rules about variable definitions and their uses.

use super::RuleContext;

pub fn output_type_as_input(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    ctx.report_rows(scoped!(
        "SELECT 'variable \"$' || dv.name || '\" cannot be of output type \"' || dv.type || '\"',
                docs.filepath, dv.line, dv.col
         FROM document_variables dv
         JOIN docs ON docs.id = dv.document
         JOIN types t ON t.name = dv.type
         WHERE t.kind IN ('OBJECT', 'INTERFACE', 'UNION')"
    ))
}

pub fn unknown_variable_type(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    ctx.report_rows(scoped!(
        "SELECT 'variable \"$' || dv.name || '\" has unknown type \"' || dv.type || '\"',
                docs.filepath, dv.line, dv.col
         FROM document_variables dv
         JOIN docs ON docs.id = dv.document
         WHERE NOT EXISTS (SELECT 1 FROM types t WHERE t.name = dv.type)"
    ))
}

pub fn duplicate_variables(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    ctx.report_rows(scoped!(
        "SELECT 'variable \"$' || dv.name || '\" is declared more than once', docs.filepath, dv.line, dv.col
         FROM document_variables dv
         JOIN docs ON docs.id = dv.document
         WHERE EXISTS (
             SELECT 1 FROM document_variables o
             WHERE o.document = dv.document AND o.name = dv.name AND o.id < dv.id
         )"
    ))
}

/// Variables used by an operation without a definition.
///
/// Fragments are skipped: their free variables belong to whichever
/// operation spreads them.
pub fn undefined_variables(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    ctx.report_rows(scoped!(
        "SELECT 'variable \"$' || v.raw || '\" is not defined by operation \"' || docs.name || '\"',
                docs.filepath, v.line, v.col
         FROM argument_values v
         JOIN docs ON docs.id = v.document
         WHERE v.kind = 'Variable'
           AND docs.kind <> 'fragment'
           AND NOT EXISTS (
               SELECT 1 FROM document_variables dv WHERE dv.document = v.document AND dv.name = v.raw
           )"
    ))
}

/// Operation variables used neither by the operation nor by any fragment it reaches.
pub fn unused_variables(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    ctx.report_rows(scoped!(
        ", reach(operation, document) AS (
            SELECT docs.id, docs.id FROM docs WHERE docs.kind <> 'fragment'
            UNION
            SELECT reach.operation, f.id
            FROM reach
            JOIN selection_refs r ON r.document = reach.document
            JOIN selections s ON s.id = r.child_id AND s.kind = 'fragment'
            JOIN documents f ON f.name = s.field_name AND f.kind = 'fragment'
        )
        SELECT 'variable \"$' || dv.name || '\" is never used', docs.filepath, dv.line, dv.col
        FROM document_variables dv
        JOIN docs ON docs.id = dv.document
        WHERE docs.kind <> 'fragment'
          AND NOT EXISTS (
              SELECT 1
              FROM reach
              JOIN argument_values v ON v.document = reach.document
              WHERE reach.operation = dv.document AND v.kind = 'Variable' AND v.raw = dv.name
          )"
    ))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{check, project};

    #[test]
    fn test_variable_types() {
        let project = project(&["query A($u: User, $x: Nope, $f: SearchFilter) { user(id: 1) { id } }"]);
        assert_eq!(
            check(&project, "outputTypeAsInput"),
            vec!["1:9 variable \"$u\" cannot be of output type \"User\""]
        );
        assert_eq!(
            check(&project, "unknownVariableType"),
            vec!["1:19 variable \"$x\" has unknown type \"Nope\""]
        );
    }

    #[test]
    fn test_duplicate_variables() {
        let project = project(&["query A($id: ID!, $id: ID!) { user(id: $id) { id } }"]);
        assert_eq!(
            check(&project, "duplicateVariables"),
            vec!["1:19 variable \"$id\" is declared more than once"]
        );
    }

    #[test]
    fn test_undefined_and_unused() {
        let project = project(&[
            "query A($unused: Int) { user(id: $id) { id } }",
            "fragment F on User { friends(first: $count) { id } }",
        ]);
        assert_eq!(
            check(&project, "undefinedVariables"),
            vec!["1:34 variable \"$id\" is not defined by operation \"A\""]
        );
        assert_eq!(
            check(&project, "unusedVariables"),
            vec!["1:9 variable \"$unused\" is never used"]
        );
    }

    #[test]
    fn test_variables_used_through_fragments() {
        let project = project(&[
            "query A($count: Int) { user(id: 1) { ...F } }",
            "fragment F on User { ...G }",
            "fragment G on User { friends(first: $count) { id } }",
        ]);
        assert!(check(&project, "unusedVariables").is_empty());
    }
}
