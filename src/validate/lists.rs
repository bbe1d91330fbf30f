//! `@list` and `@paginate`: shape checks and list discovery.
//!
//! The `lists` rule is the only rule with an output besides diagnostics:
//! every well-formed site becomes a [`DiscoveredList`], persisted by
//! [`persist`] once the whole phase is done.

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::schema::internal::{names, NODE_INTERFACE};

use super::RuleContext;

/// A `@list` or `@paginate` site, as recorded in `discovered_lists`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredList {
    pub name: String,
    /// Type returned by the field: the element type of a list, the connection type otherwise.
    pub list_type: String,
    pub node_type: String,
    pub edge_type: Option<String>,
    pub connection: bool,
    /// Selection carrying the directive.
    pub list_field: i64,
    pub document: i64,
    /// Pagination mode; `None` without `@paginate`.
    pub paginate: Option<String>,
    pub supports_forward: bool,
    pub supports_backward: bool,
    pub cursor_type: Option<String>,
    pub page_size: Option<i64>,
    /// Declared inside a fragment rather than an operation.
    pub embedded: bool,
}

/// Replace the discovered lists of every document in scope.
pub fn persist(conn: &Connection, task: Option<&str>, lists: &[DiscoveredList]) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM discovered_lists
         WHERE document IN (
             SELECT d.id FROM documents d
             JOIN raw_documents raw ON raw.id = d.raw_document
             WHERE ?1 IS NULL OR raw.current_task = ?1
         )",
        params![task],
    )?;
    let mut insert = conn.prepare_cached(
        "INSERT INTO discovered_lists (
            name, type, node_type, edge_type, connection, list_field, document, paginate,
            supports_forward, supports_backward, cursor_type, page_size, embedded
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )?;
    for list in lists {
        insert.execute(params![
            list.name,
            list.list_type,
            list.node_type,
            list.edge_type,
            list.connection,
            list.list_field,
            list.document,
            list.paginate,
            list.supports_forward,
            list.supports_backward,
            list.cursor_type,
            list.page_size,
            list.embedded,
        ])?;
    }
    Ok(())
}

struct Site {
    selection: i64,
    document: i64,
    document_kind: String,
    document_name: String,
    filepath: String,
    line: i64,
    col: i64,
    list_name: Option<String>,
    paginate_name: Option<String>,
    paginate_mode: Option<String>,
    paginated: bool,
    field_type: Option<String>,
    modifiers: Option<String>,
    edge_type: Option<String>,
    edge_node_type: Option<String>,
    has_first: bool,
    has_last: bool,
    has_limit: bool,
    has_offset: bool,
    cursor_type: Option<String>,
    page_size: Option<String>,
}

/// Discover every `@list`/`@paginate` site and check the field can hold a list.
///
/// Names come from `@list(name:)`, then `@paginate(name:)`, then the
/// document name. `@list` names must be unique across the project.
pub fn lists(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    let sites = {
        let mut stmt = ctx.conn.prepare(scoped!(
            ", sites AS (
                SELECT sels.*,
                       (SELECT sd.id FROM selection_directives sd
                         WHERE sd.selection_id = sels.id AND sd.directive = ?2 ORDER BY sd.id LIMIT 1) AS list_directive,
                       (SELECT sd.id FROM selection_directives sd
                         WHERE sd.selection_id = sels.id AND sd.directive = ?3 ORDER BY sd.id LIMIT 1) AS paginate_directive
                FROM sels
                WHERE sels.kind = 'field'
            ),
            directive_args(directive, name, raw) AS (
                SELECT a.parent, a.name, v.raw
                FROM selection_directive_arguments a
                JOIN argument_values v ON v.id = a.value
            )
            SELECT s.id, s.document, s.document_kind, s.document_name, s.filepath,
                   COALESCE(ld.line, pd.line), COALESCE(ld.col, pd.col),
                   (SELECT raw FROM directive_args WHERE directive = s.list_directive AND name = 'name'),
                   (SELECT raw FROM directive_args WHERE directive = s.paginate_directive AND name = 'name'),
                   COALESCE(
                       (SELECT raw FROM directive_args WHERE directive = s.paginate_directive AND name = 'mode'),
                       (SELECT default_paginate_mode FROM config)
                   ),
                   s.paginate_directive IS NOT NULL,
                   sft.field_type, sft.field_type_modifiers,
                   e.type,
                   (SELECT n.type FROM type_fields n WHERE n.parent = e.type AND n.name = 'node'),
                   EXISTS (SELECT 1 FROM field_argument_definitions f WHERE f.field = s.type AND f.name = 'first'),
                   EXISTS (SELECT 1 FROM field_argument_definitions f WHERE f.field = s.type AND f.name = 'last'),
                   EXISTS (SELECT 1 FROM field_argument_definitions f WHERE f.field = s.type AND f.name = 'limit'),
                   EXISTS (SELECT 1 FROM field_argument_definitions f WHERE f.field = s.type AND f.name = 'offset'),
                   (SELECT f.type FROM field_argument_definitions f
                     WHERE f.field = s.type AND f.name IN ('after', 'before')
                     ORDER BY f.name = 'after' DESC LIMIT 1),
                   (SELECT v.raw FROM selection_arguments a
                     JOIN argument_values v ON v.id = a.value
                     WHERE a.selection_id = s.id AND a.name IN ('first', 'last', 'limit') AND v.kind = 'Int'
                     ORDER BY a.id LIMIT 1)
            FROM sites s
            LEFT JOIN selection_directives ld ON ld.id = s.list_directive
            LEFT JOIN selection_directives pd ON pd.id = s.paginate_directive
            LEFT JOIN selection_field_types sft ON sft.selection_id = s.id
            LEFT JOIN type_fields e ON e.parent = sft.field_type AND e.name = 'edges'
            WHERE s.list_directive IS NOT NULL OR s.paginate_directive IS NOT NULL
            ORDER BY s.ref_id"
        ))?;
        let rows = stmt.query_map(params![ctx.task, names::LIST, names::PAGINATE], |row| {
            Ok(Site {
                selection: row.get(0)?,
                document: row.get(1)?,
                document_kind: row.get(2)?,
                document_name: row.get(3)?,
                filepath: row.get(4)?,
                line: row.get(5)?,
                col: row.get(6)?,
                list_name: row.get(7)?,
                paginate_name: row.get(8)?,
                paginate_mode: row.get(9)?,
                paginated: row.get(10)?,
                field_type: row.get(11)?,
                modifiers: row.get(12)?,
                edge_type: row.get(13)?,
                edge_node_type: row.get(14)?,
                has_first: row.get(15)?,
                has_last: row.get(16)?,
                has_limit: row.get(17)?,
                has_offset: row.get(18)?,
                cursor_type: row.get(19)?,
                page_size: row.get(20)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };

    for site in sites {
        // unknown fields are reported elsewhere
        let (Some(field_type), Some(modifiers)) = (site.field_type, site.modifiers) else {
            continue;
        };
        let is_list = modifiers.contains(']');
        let connection = match (&site.edge_type, &site.edge_node_type) {
            (Some(edge), Some(node)) if !is_list => Some((edge.clone(), node.clone())),
            _ => None,
        };
        if !is_list && connection.is_none() {
            let directive = if site.list_name.is_some() { names::LIST } else { names::PAGINATE };
            ctx.report(
                format!("@{directive} can only be used on fields that return a list or a connection"),
                &site.filepath,
                site.line,
                site.col,
            );
            continue;
        }

        let name = site
            .list_name
            .or(site.paginate_name)
            .unwrap_or_else(|| site.document_name.clone());
        let paginate = site.paginated.then(|| site.paginate_mode.clone()).flatten();
        let (supports_forward, supports_backward) = match (&connection, site.paginated) {
            (_, false) => (false, false),
            (Some(_), true) => (site.has_first, site.has_last),
            (None, true) => (site.has_limit || site.has_offset, false),
        };
        let (edge_type, node_type, cursor_type) = match connection {
            Some((edge, node)) => (Some(edge), node, site.cursor_type),
            None => (None, field_type.clone(), None),
        };

        ctx.discover(DiscoveredList {
            name,
            list_type: field_type,
            node_type,
            connection: edge_type.is_some(),
            edge_type,
            list_field: site.selection,
            document: site.document,
            paginate,
            supports_forward,
            supports_backward,
            cursor_type,
            page_size: site.page_size.and_then(|raw| raw.parse().ok()),
            embedded: site.document_kind == "fragment",
        });
    }

    let task = ctx.task;
    ctx.report_rows_with(
        scoped!(
            ", names(directive, name) AS (
                SELECT sd.id, v.raw
                FROM selection_directives sd
                JOIN selection_directive_arguments a ON a.parent = sd.id AND a.name = 'name'
                JOIN argument_values v ON v.id = a.value
                WHERE sd.directive = ?2
            )
            SELECT '@list name \"' || n.name || '\" is already used', sels.filepath, sd.line, sd.col
            FROM sels
            JOIN selection_directives sd ON sd.selection_id = sels.id
            JOIN names n ON n.directive = sd.id
            WHERE EXISTS (SELECT 1 FROM names o WHERE o.name = n.name AND o.directive < n.directive)"
        ),
        params![task, names::LIST],
    )
}

/// Pagination arguments fit the shape and mode of the paginated field.
pub fn paginate_args(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    let task = ctx.task;
    ctx.report_rows_with(
        scoped!(
            ", sites AS (
                SELECT sels.id, sels.type AS field, sels.filepath, sd.line, sd.col,
                       instr(sft.field_type_modifiers, ']') > 0 AS is_list,
                       EXISTS (SELECT 1 FROM type_fields e
                               JOIN type_fields n ON n.parent = e.type AND n.name = 'node'
                               WHERE e.parent = sft.field_type AND e.name = 'edges') AS connection,
                       COALESCE(
                           (SELECT v.raw FROM selection_directive_arguments a
                             JOIN argument_values v ON v.id = a.value
                             WHERE a.parent = sd.id AND a.name = 'mode'),
                           (SELECT default_paginate_mode FROM config)
                       ) AS mode
                FROM sels
                JOIN selection_directives sd ON sd.selection_id = sels.id AND sd.directive = ?2
                JOIN selection_field_types sft ON sft.selection_id = sels.id
            ),
            passed(selection, name) AS (SELECT selection_id, name FROM selection_arguments),
            declared(field, name) AS (SELECT field, name FROM field_argument_definitions)
            SELECT '@paginate on a connection requires a first or last argument', s.filepath, s.line, s.col
            FROM sites s
            WHERE s.connection AND NOT s.is_list
              AND NOT EXISTS (SELECT 1 FROM passed p WHERE p.selection = s.id AND p.name IN ('first', 'last'))
            UNION ALL
            SELECT '@paginate in Infinite mode cannot paginate in both directions', s.filepath, s.line, s.col
            FROM sites s
            WHERE s.connection AND NOT s.is_list AND s.mode = 'Infinite'
              AND EXISTS (SELECT 1 FROM passed p WHERE p.selection = s.id AND p.name IN ('first', 'after'))
              AND EXISTS (SELECT 1 FROM passed p WHERE p.selection = s.id AND p.name IN ('last', 'before'))
            UNION ALL
            SELECT '@paginate on a list requires the field to accept limit and offset arguments',
                   s.filepath, s.line, s.col
            FROM sites s
            WHERE s.is_list
              AND (NOT EXISTS (SELECT 1 FROM declared d WHERE d.field = s.field AND d.name = 'limit')
                   OR NOT EXISTS (SELECT 1 FROM declared d WHERE d.field = s.field AND d.name = 'offset'))
            UNION ALL
            SELECT '@paginate on a list requires a limit argument', s.filepath, s.line, s.col
            FROM sites s
            WHERE s.is_list
              AND EXISTS (SELECT 1 FROM declared d WHERE d.field = s.field AND d.name = 'limit')
              AND EXISTS (SELECT 1 FROM declared d WHERE d.field = s.field AND d.name = 'offset')
              AND NOT EXISTS (SELECT 1 FROM passed p WHERE p.selection = s.id AND p.name = 'limit')"
        ),
        params![task, names::PAGINATE],
    )
}

/// Paginated fragments sit on a refetchable type and never below a list.
pub fn paginate_type_condition(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    let task = ctx.task;
    ctx.report_rows_with(
        scoped!(
            ", marked AS (
                SELECT sels.ref_id, sels.parent_id, sels.document, sels.filepath, sd.line, sd.col
                FROM sels
                JOIN selection_directives sd ON sd.selection_id = sels.id AND sd.directive = ?2
            ),
            ancestors(marker, document, selection) AS (
                SELECT m.ref_id, m.document, m.parent_id FROM marked m WHERE m.parent_id IS NOT NULL
                UNION
                SELECT a.marker, a.document, r.parent_id
                FROM ancestors a
                JOIN selection_refs r ON r.child_id = a.selection AND r.document = a.document
                WHERE r.parent_id IS NOT NULL
            )
            SELECT '@paginate can only be used in fragments on Query, ' || ?3 || ', or types with configured keys',
                   m.filepath, m.line, m.col
            FROM marked m
            JOIN docs ON docs.id = m.document
            WHERE docs.kind = 'fragment'
              AND docs.type_condition <> ?3
              AND NOT EXISTS (SELECT 1 FROM types t WHERE t.name = docs.type_condition AND t.operation = 'query')
              AND NOT EXISTS (SELECT 1 FROM possible_types p WHERE p.type = ?3 AND p.member = docs.type_condition)
              AND NOT EXISTS (
                  SELECT 1 FROM type_configs tc
                  WHERE tc.name = docs.type_condition AND json_array_length(tc.keys) > 0
              )
            UNION ALL
            SELECT '@paginate cannot be used inside a list', m.filepath, m.line, m.col
            FROM marked m
            WHERE EXISTS (
                SELECT 1 FROM ancestors a
                JOIN selection_field_types sft ON sft.selection_id = a.selection
                WHERE a.marker = m.ref_id AND instr(sft.field_type_modifiers, ']') > 0
            )"
        ),
        params![task, names::PAGINATE, NODE_INTERFACE],
    )
}

pub fn single_paginate_directive(ctx: &mut RuleContext<'_>) -> rusqlite::Result<()> {
    let task = ctx.task;
    ctx.report_rows_with(
        scoped!(
            "SELECT 'only one @paginate is allowed per document', sels.filepath, sd.line, sd.col
             FROM sels
             JOIN selection_directives sd ON sd.selection_id = sels.id AND sd.directive = ?2
             WHERE EXISTS (
                 SELECT 1 FROM selection_directives o
                 WHERE o.document = sd.document AND o.directive = ?2 AND o.id < sd.id
             )"
        ),
        params![task, names::PAGINATE],
    )
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{check, project};
    use super::super::RULES;
    use super::*;
    use crate::config::TypeConfig;
    use crate::testing::TestProject;

    fn discovered(project: &TestProject) -> Vec<DiscoveredList> {
        let rule = RULES.iter().find(|r| r.name == "lists").unwrap();
        let (_, lists) = project.store.read(|conn| Ok(rule.run(conn, None)?)).unwrap();
        lists
    }

    #[test]
    fn test_discovers_lists_and_connections() {
        let project = project(&[
            "query A { friends @list(name: \"All_Friends\") { id } users(first: 5) @paginate { edges { node { id } } } }",
            "fragment Pals on User { friends(first: 3) @paginate(name: \"Pals\", mode: SinglePage) { id } }",
        ]);
        let lists = discovered(&project);
        assert_eq!(lists.len(), 3);

        let all = &lists[0];
        assert_eq!(all.name, "All_Friends");
        assert_eq!((all.list_type.as_str(), all.node_type.as_str()), ("User", "User"));
        assert!(!all.connection);
        assert_eq!(all.paginate, None);
        assert!(!all.embedded);

        let users = &lists[1];
        assert_eq!(users.name, "A");
        assert_eq!(users.list_type, "UserConnection");
        assert_eq!(users.node_type, "User");
        assert_eq!(users.edge_type.as_deref(), Some("UserEdge"));
        assert!(users.connection);
        assert_eq!(users.paginate.as_deref(), Some("Infinite"));
        assert!(users.supports_forward && users.supports_backward);
        assert_eq!(users.cursor_type.as_deref(), Some("String"));
        assert_eq!(users.page_size, Some(5));

        let pals = &lists[2];
        assert_eq!(pals.name, "Pals");
        assert_eq!(pals.paginate.as_deref(), Some("SinglePage"));
        assert_eq!(pals.page_size, Some(3));
        assert!(pals.embedded);
    }

    #[test]
    fn test_list_on_single_object() {
        let project = project(&["query B { user(id: 1) @list(name: \"Solo\") { id } }"]);
        assert_eq!(
            check(&project, "lists"),
            vec!["1:23 @list can only be used on fields that return a list or a connection"]
        );
        assert!(discovered(&project).is_empty());
    }

    #[test]
    fn test_list_names_are_unique() {
        let project = project(&[
            "query C { friends @list(name: \"Dup\") { id } }",
            "query D { legends @list(name: \"Dup\") { name } }",
        ]);
        assert_eq!(check(&project, "lists"), vec!["1:19 @list name \"Dup\" is already used"]);
    }

    #[test]
    fn test_paginate_arguments() {
        let project = project(&[
            "query A { users @paginate { edges { node { id } } } }",
            "query B { users(first: 2, last: 2) @paginate { edges { node { id } } } }",
            "query C { users(first: 2, last: 2) @paginate(mode: SinglePage) { edges { node { id } } } }",
            "query D { legends @paginate { name } }",
            "query E { friends(offset: 1) @paginate { id } }",
            "query F { friends(limit: 10) @paginate { id } }",
        ]);
        assert_eq!(
            check(&project, "paginateArgs"),
            vec![
                "1:17 @paginate on a connection requires a first or last argument",
                "1:19 @paginate on a list requires the field to accept limit and offset arguments",
                "1:30 @paginate on a list requires a limit argument",
                "1:36 @paginate in Infinite mode cannot paginate in both directions",
            ]
        );
    }

    #[test]
    fn test_paginate_type_condition() {
        let project = project(&[
            "fragment OnUser on User { friends(first: 1) @paginate { id } }",
            "fragment OnQuery on Query { friends(limit: 2) @paginate { id } }",
            "fragment OnConn on UserConnection { edges { node { friends(first: 2) @paginate { id } } } }",
        ]);
        assert_eq!(
            check(&project, "paginateTypeCondition"),
            vec![
                "1:70 @paginate can only be used in fragments on Query, Node, or types with configured keys",
                "1:70 @paginate cannot be used inside a list",
            ]
        );
    }

    #[test]
    fn test_configured_keys_allow_pagination() {
        let project = TestProject::with_config(|config| {
            config.type_config.insert(
                "UserConnection".to_string(),
                TypeConfig {
                    keys: vec!["pageInfo".to_string()],
                    resolve_query: None,
                },
            );
        });
        project.add_raw(
            "src/a.graphql",
            "fragment OnPage on UserConnection { edges { node { friends(first: 2) @paginate { id } } } }",
        );
        project.load();
        assert_eq!(
            check(&project, "paginateTypeCondition"),
            vec!["1:70 @paginate cannot be used inside a list"]
        );
    }

    #[test]
    fn test_single_paginate_per_document() {
        let project = project(&[
            "query A { users(first: 1) @paginate { edges { node { id } } } friends(limit: 1) @paginate { id } }",
        ]);
        assert_eq!(
            check(&project, "singlePaginateDirective"),
            vec!["1:81 only one @paginate is allowed per document"]
        );
    }

    #[test]
    fn test_persist_replaces_scope_only() {
        let project = TestProject::new();
        project.add_raw_for_task("src/a.graphql", "query A { friends @list(name: \"A_Friends\") { id } }", "one");
        project.add_raw_for_task("src/b.graphql", "query B { legends @list(name: \"B_Legends\") { name } }", "two");
        project.load();
        let lists = discovered(&project);
        project
            .store
            .write(|tx| Ok(persist(tx, None, &lists)?))
            .unwrap();

        project.store.write(|tx| Ok(persist(tx, Some("one"), &[])?)).unwrap();
        assert_eq!(project.rows("SELECT name FROM discovered_lists"), vec!["B_Legends"]);
    }
}
