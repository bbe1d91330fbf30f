//! Validation phase.
//!
//! Every rule is an independent reader over the IR: mostly a single query
//! whose result rows are the violations. Rules run concurrently on the rayon
//! pool, each with its own pooled read connection, and never write. The only
//! output besides diagnostics is the set of lists discovered from `@list` and
//! `@paginate`, which is written in one transaction after every rule finished.

use std::time::Instant;

use rayon::prelude::*;
use rusqlite::{params, Connection, Params};

use crate::cancel::CancellationToken;
use crate::diagnostics::{Diagnostic, Diagnostics, PipelineError};
use crate::store::Store;

/// Prefix every rule query with the documents and selections in scope.
///
/// `docs` holds documents whose raw document matches the task in `?1` (all
/// documents when `?1` is NULL); `sels` holds every selection reference of
/// those documents together with its selection row and file.
macro_rules! scoped {
    ($sql:literal) => {
        concat!(
            "WITH docs AS (
                SELECT d.id, d.name, d.kind, d.type_condition, d.line, d.col, raw.filepath
                FROM documents d
                JOIN raw_documents raw ON raw.id = d.raw_document
                WHERE (?1 IS NULL OR raw.current_task = ?1)
            ),
            sels AS (
                SELECT r.id AS ref_id, r.parent_id, r.child_id AS id, r.document, r.line, r.col,
                       r.path_index, r.internal, s.field_name, s.alias, s.kind, s.type,
                       docs.filepath, docs.kind AS document_kind, docs.name AS document_name
                FROM selection_refs r
                JOIN selections s ON s.id = r.child_id
                JOIN docs ON docs.id = r.document
            )",
            $sql
        )
    };
}

mod arguments;
mod directives;
mod documents;
mod fragment_arguments;
mod lists;
mod selections;
mod variables;

pub use lists::DiscoveredList;

/// A named check over the IR.
pub struct Rule {
    pub name: &'static str,
    check: fn(&mut RuleContext<'_>) -> rusqlite::Result<()>,
}

/// Every rule, in reporting order.
pub const RULES: &[Rule] = &[
    Rule { name: "subscriptionsWithMultipleRootFields", check: documents::subscriptions_with_multiple_root_fields },
    Rule { name: "duplicateDocumentNames", check: documents::duplicate_document_names },
    Rule { name: "fragmentUnknownType", check: documents::fragment_unknown_type },
    Rule { name: "fragmentOnScalar", check: documents::fragment_on_scalar },
    Rule { name: "unknownFragment", check: documents::unknown_fragment },
    Rule { name: "incompatibleFragmentSpread", check: documents::incompatible_fragment_spread },
    Rule { name: "fragmentCycles", check: documents::fragment_cycles },
    Rule { name: "outputTypeAsInput", check: variables::output_type_as_input },
    Rule { name: "unknownVariableType", check: variables::unknown_variable_type },
    Rule { name: "duplicateVariables", check: variables::duplicate_variables },
    Rule { name: "undefinedVariables", check: variables::undefined_variables },
    Rule { name: "unusedVariables", check: variables::unused_variables },
    Rule { name: "scalarWithSelection", check: selections::scalar_with_selection },
    Rule { name: "compositeWithoutSelection", check: selections::composite_without_selection },
    Rule { name: "unknownField", check: selections::unknown_field },
    Rule { name: "conflictingSelections", check: selections::conflicting_selections },
    Rule { name: "noKeyAlias", check: selections::no_key_alias },
    Rule { name: "duplicateArgumentInField", check: arguments::duplicate_argument_in_field },
    Rule { name: "knownArguments", check: arguments::known_arguments },
    Rule { name: "missingRequiredArgument", check: arguments::missing_required_argument },
    Rule { name: "fieldArgumentIncompatibleType", check: arguments::field_argument_incompatible_type },
    Rule { name: "wrongTypesToScalarArg", check: arguments::wrong_types_to_scalar_arg },
    Rule { name: "wrongTypesToStructuredArg", check: arguments::wrong_types_to_structured_arg },
    Rule { name: "duplicateKeysInInputObject", check: arguments::duplicate_keys_in_input_object },
    Rule { name: "unknownDirective", check: directives::unknown_directive },
    Rule { name: "repeatingNonRepeatable", check: directives::repeating_non_repeatable },
    Rule { name: "directiveLocation", check: directives::directive_location },
    Rule { name: "knownDirectiveArguments", check: directives::known_directive_arguments },
    Rule { name: "conflictingParentIDAllLists", check: directives::conflicting_parent_id_all_lists },
    Rule { name: "conflictingPrependAppend", check: directives::conflicting_prepend_append },
    Rule { name: "maskDirectives", check: directives::mask_directives },
    Rule { name: "requiredDirective", check: directives::required_directive },
    Rule { name: "nodeDirective", check: directives::node_directive },
    Rule { name: "loadingDirective", check: directives::loading_directive },
    Rule { name: "optimisticKeyOnScalar", check: directives::optimistic_key_on_scalar },
    Rule { name: "optimisticKeyFullSelection", check: directives::optimistic_key_full_selection },
    Rule { name: "fragmentArguments", check: fragment_arguments::fragment_arguments },
    Rule { name: "fragmentArgumentsMissingWith", check: fragment_arguments::fragment_arguments_missing_with },
    Rule { name: "lists", check: lists::lists },
    Rule { name: "paginateArgs", check: lists::paginate_args },
    Rule { name: "paginateTypeCondition", check: lists::paginate_type_condition },
    Rule { name: "singlePaginateDirective", check: lists::single_paginate_directive },
];

/// State handed to one rule.
pub struct RuleContext<'a> {
    pub conn: &'a Connection,
    pub task: Option<&'a str>,
    rule: &'static str,
    found: Vec<Diagnostic>,
    lists: Vec<DiscoveredList>,
}

impl<'a> RuleContext<'a> {
    fn new(conn: &'a Connection, task: Option<&'a str>, rule: &'static str) -> Self {
        Self {
            conn,
            task,
            rule,
            found: Vec::new(),
            lists: Vec::new(),
        }
    }

    /// Record one violation.
    pub fn report(&mut self, message: impl Into<String>, filepath: &str, line: i64, col: i64) {
        self.found.push(
            Diagnostic::validation(message)
                .at(filepath, line.max(0) as usize, col.max(0) as usize)
                .with_rule(self.rule),
        );
    }

    /// Run a rule query binding only the task; every row is reported.
    pub fn report_rows(&mut self, sql: &str) -> rusqlite::Result<()> {
        let task = self.task;
        self.report_rows_with(sql, params![task])
    }

    /// Run a rule query whose rows are `(message, filepath, line, col)`.
    pub fn report_rows_with(&mut self, sql: &str, params: impl Params) -> rusqlite::Result<()> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        for (message, filepath, line, col) in rows {
            self.report(message, &filepath, line, col);
        }
        Ok(())
    }

    pub fn discover(&mut self, list: DiscoveredList) {
        self.lists.push(list);
    }
}

impl Rule {
    /// Run the rule on `conn`; returns its diagnostics and discovered lists.
    pub fn run(&self, conn: &Connection, task: Option<&str>) -> rusqlite::Result<(Vec<Diagnostic>, Vec<DiscoveredList>)> {
        let mut ctx = RuleContext::new(conn, task, self.name);
        (self.check)(&mut ctx)?;
        Ok((ctx.found, ctx.lists))
    }
}

/// Counts reported at the end of the phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationSummary {
    pub rules: usize,
    pub errors: usize,
    pub lists: usize,
}

/// Inputs of one validation run.
pub struct Validator<'a> {
    pub store: &'a Store,
    pub task: Option<&'a str>,
    pub cancel: &'a CancellationToken,
    pub diagnostics: &'a Diagnostics,
}

impl Validator<'_> {
    pub fn run(&self) -> Result<ValidationSummary, PipelineError> {
        let started = Instant::now();
        let outcomes: Vec<(Vec<Diagnostic>, Vec<DiscoveredList>)> = RULES
            .par_iter()
            .map(|rule| {
                self.cancel.check()?;
                let rule_started = Instant::now();
                let outcome = self.store.read(|conn| Ok(rule.run(conn, self.task)?))?;
                tracing::debug!(
                    rule = rule.name,
                    errors = outcome.0.len(),
                    elapsed_ms = rule_started.elapsed().as_millis() as u64,
                    "rule finished"
                );
                Ok(outcome)
            })
            .collect::<Result<_, PipelineError>>()?;

        let mut summary = ValidationSummary {
            rules: RULES.len(),
            ..ValidationSummary::default()
        };
        let mut discovered = Vec::new();
        for (found, lists) in outcomes {
            summary.errors += found.len();
            self.diagnostics.extend(found);
            discovered.extend(lists);
        }

        self.cancel.check()?;
        summary.lists = discovered.len();
        self.store.write(|tx| Ok(lists::persist(tx, self.task, &discovered)?))?;

        tracing::info!(
            rules = summary.rules,
            errors = summary.errors,
            lists = summary.lists,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "documents validated"
        );
        Ok(summary)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::testing::TestProject;

    /// Load the project and run a single rule; returns `line:col message` strings.
    pub fn check(project: &TestProject, rule: &str) -> Vec<String> {
        let rule = RULES
            .iter()
            .find(|r| r.name == rule)
            .unwrap_or_else(|| panic!("no rule {rule}"));
        let (found, _) = project.store.read(|conn| Ok(rule.run(conn, None)?)).unwrap();
        let mut found: Vec<String> = found
            .into_iter()
            .map(|d| {
                let loc = &d.locations[0];
                format!("{}:{} {}", loc.line, loc.column, d.message)
            })
            .collect();
        found.sort();
        found
    }

    /// A project with `documents` loaded, one file each.
    pub fn project(documents: &[&str]) -> TestProject {
        let project = TestProject::new();
        for (i, text) in documents.iter().enumerate() {
            project.add_raw(&format!("src/doc{i}.graphql"), text);
        }
        let diags = project.load();
        assert!(diags.is_empty(), "{diags:?}");
        project
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestProject;

    #[test]
    fn test_rule_names_are_unique() {
        let mut names: Vec<&str> = RULES.iter().map(|r| r.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RULES.len());
    }

    #[test]
    fn test_valid_document_passes_every_rule() {
        let project = test_support::project(&[
            "query Friends($id: ID!, $first: Int = 10) {
                user(id: $id) {
                    firstName
                    friends(first: $first) @list(name: \"User_Friends\") { id ...UserName }
                }
            }",
            "fragment UserName on User { nickname }",
        ]);
        let diagnostics = Diagnostics::new();
        let summary = Validator {
            store: &project.store,
            task: None,
            cancel: &CancellationToken::new(),
            diagnostics: &diagnostics,
        }
        .run()
        .unwrap();

        let found = diagnostics.into_sorted();
        assert!(found.is_empty(), "{found:?}");
        assert_eq!(summary.lists, 1);
        assert_eq!(
            project.rows("SELECT name || ':' || type || ':' || node_type FROM discovered_lists"),
            vec!["User_Friends:User:User"]
        );
    }

    #[test]
    fn test_rerun_replaces_discovered_lists() {
        let project = TestProject::new();
        project.add_raw(
            "src/a.graphql",
            "query A { friends @list(name: \"All_Friends\") { id } }",
        );
        project.load();
        for _ in 0..2 {
            Validator {
                store: &project.store,
                task: None,
                cancel: &CancellationToken::new(),
                diagnostics: &Diagnostics::new(),
            }
            .run()
            .unwrap();
        }
        assert_eq!(project.count("SELECT COUNT(*) FROM discovered_lists"), 1);
    }

    #[test]
    fn test_cancelled_validation_stops() {
        let project = test_support::project(&["query A { version }"]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = Validator {
            store: &project.store,
            task: None,
            cancel: &cancel,
            diagnostics: &Diagnostics::new(),
        }
        .run();
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }
}
