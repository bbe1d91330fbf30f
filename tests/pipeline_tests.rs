//! End-to-end builds through the public `Compiler` API.
//!
//! Each test writes a small project (schema + sources) into a temp dir and
//! drives the phases in order, then inspects the IR.

use std::fs;
use std::sync::Arc;

use gqlforge::{Compiler, Diagnostic, DiagnosticKind, OsFileSystem, ProjectConfig, Store};
use rusqlite::params;
use tempfile::TempDir;

const SCHEMA: &str = r#"
type Query {
    user(id: ID): User
    legends: [Legend!]!
    ghost: Ghost
    friends(limit: Int, offset: Int): [User!]!
}

type Subscription {
    a: Int
    b: Int
}

type User {
    id: ID!
    firstName: String!
    friends: [User!]!
}

type Legend {
    name: String!
}

type Ghost {
    aka: String!
    name: String!
}
"#;

struct Project {
    dir: TempDir,
}

impl Project {
    fn new(files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("schema.graphql"), SCHEMA).unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        Self { dir }
    }

    fn config(&self) -> ProjectConfig {
        ProjectConfig {
            project_root: self.dir.path().to_path_buf(),
            ..ProjectConfig::default()
        }
    }

    fn compiler(&self, config: ProjectConfig) -> Compiler {
        let store = Store::open(&self.dir.path().join("build.db")).unwrap();
        Compiler::new(config, Arc::new(OsFileSystem), store)
    }
}

/// Field names directly under every selection named `parent`, in ref order.
fn children(compiler: &Compiler, parent: &str) -> Vec<String> {
    compiler
        .store()
        .read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.field_name FROM selection_refs r
                 JOIN selections s ON s.id = r.child_id
                 JOIN selections p ON p.id = r.parent_id
                 WHERE p.field_name = ?1
                 ORDER BY r.id",
            )?;
            let rows = stmt
                .query_map(params![parent], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(rows)
        })
        .unwrap()
}

fn messages(diagnostics: &[Diagnostic]) -> Vec<&str> {
    diagnostics.iter().map(|d| d.message.as_str()).collect()
}

#[test]
fn test_key_fields_added_after_full_build() {
    let project = Project::new(&[("src/friends.graphql", "query Friends { user { firstName } }")]);
    let compiler = project.compiler(project.config());

    let diagnostics = compiler.run_all().unwrap();
    assert!(diagnostics.is_empty(), "{diagnostics:?}");
    assert_eq!(children(&compiler, "user"), vec!["firstName", "__typename", "id"]);
}

#[test]
fn test_types_without_keys_only_get_typename() {
    let project = Project::new(&[("src/legends.graphql", "query Friends { legends { name } }")]);
    let compiler = project.compiler(project.config());

    assert!(compiler.run_all().unwrap().is_empty());
    assert_eq!(children(&compiler, "legends"), vec!["name", "__typename"]);
}

#[test]
fn test_configured_keys_are_added_without_dedup() {
    let project = Project::new(&[("src/ghost.graphql", "query Ghosts { ghost { name } }")]);
    let mut config = project.config();
    config.type_config.insert(
        "Ghost".to_string(),
        gqlforge::config::TypeConfig {
            keys: vec!["aka".to_string(), "name".to_string()],
            resolve_query: None,
        },
    );
    let compiler = project.compiler(config);

    assert!(compiler.run_all().unwrap().is_empty());
    assert_eq!(children(&compiler, "ghost"), vec!["name", "__typename", "aka", "name"]);
}

#[test]
fn test_runtime_scalar_rewritten_after_extract() {
    let project = Project::new(&[(
        "src/info.graphql",
        "query UserInfo($user: UserFromSession!){ user(id: $user) }",
    )]);
    let mut config = project.config();
    config
        .runtime_scalars
        .insert("UserFromSession".to_string(), "ID".to_string());
    let compiler = project.compiler(config);

    assert!(compiler.schema().unwrap().is_empty());
    assert!(compiler.extract().unwrap().is_empty());
    assert!(compiler.after_extract().unwrap().is_empty());

    let (ty, directive, argument): (String, String, String) = compiler
        .store()
        .read(|conn| {
            Ok(conn.query_row(
                "SELECT dv.type, d.directive, v.raw
                 FROM document_variables dv
                 JOIN document_variable_directives d ON d.parent = dv.id
                 JOIN document_variable_directive_arguments a ON a.parent = d.id
                 JOIN argument_values v ON v.id = a.value
                 WHERE dv.name = 'user' AND a.name = 'type'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?)
        })
        .unwrap();
    assert_eq!(ty, "ID");
    assert_eq!(directive, "runtimeScalar");
    assert_eq!(argument, "UserFromSession");

    // A second pass leaves a single annotation.
    compiler.after_extract().unwrap();
    let annotations: i64 = compiler
        .store()
        .read(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM document_variable_directives WHERE directive = 'runtimeScalar'",
                [],
                |row| row.get(0),
            )?)
        })
        .unwrap();
    assert_eq!(annotations, 1);
}

#[test]
fn test_subscription_with_two_root_fields() {
    let project = Project::new(&[("src/sub.graphql", "subscription S { a b }")]);
    let compiler = project.compiler(project.config());

    let diagnostics = compiler.run_all().unwrap();
    assert_eq!(messages(&diagnostics), vec!["subscriptions can only have a single root field"]);
    assert_eq!(diagnostics[0].kind, DiagnosticKind::Validation);
    assert_eq!(diagnostics[0].locations[0].filepath, "src/sub.graphql");
}

#[test]
fn test_fragment_cycle_trace() {
    let project = Project::new(&[
        ("src/a.graphql", "fragment A on User { ...B }"),
        ("src/b.graphql", "fragment B on User { ...A }"),
    ]);
    let compiler = project.compiler(project.config());

    let diagnostics = compiler.run_all().unwrap();
    assert!(
        messages(&diagnostics)
            .iter()
            .any(|m| m.contains("A -> B -> A")),
        "{diagnostics:?}"
    );
    assert!(diagnostics.iter().all(|d| d.kind == DiagnosticKind::Validation));
}

#[test]
fn test_embedded_document_positions_are_absolute() {
    let source = "<script>\n  const store = graphql(`\n    query Page {\n      user { nope }\n    }\n  `)\n</script>\n";
    let project = Project::new(&[("src/routes/Page.svelte", source)]);
    let compiler = project.compiler(project.config());

    let diagnostics = compiler.run_all().unwrap();
    assert_eq!(diagnostics.len(), 1, "{diagnostics:?}");
    let location = &diagnostics[0].locations[0];
    assert_eq!(location.filepath, "src/routes/Page.svelte");
    assert_eq!((location.line, location.column), (4, 14));
}

#[test]
fn test_task_scopes_validation() {
    let project = Project::new(&[("src/ok.graphql", "query Ok { legends { name } }")]);
    let compiler = project.compiler(project.config()).with_task("page");
    assert!(compiler.run_all().unwrap().is_empty());

    let tagged: Vec<Option<String>> = compiler
        .store()
        .read(|conn| {
            let mut stmt = conn.prepare("SELECT current_task FROM raw_documents")?;
            let rows = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .unwrap();
    assert_eq!(tagged, vec![Some("page".to_string())]);
}

#[test]
fn test_rebuild_replaces_raw_documents() {
    let project = Project::new(&[("src/a.graphql", "query A { legends { name } }")]);
    let compiler = project.compiler(project.config());
    assert!(compiler.run_all().unwrap().is_empty());

    fs::write(project.dir.path().join("src/a.graphql"), "query A2 { legends { name } }").unwrap();
    compiler.schema().unwrap();
    compiler.extract().unwrap();
    compiler.after_extract().unwrap();

    let names: Vec<String> = compiler
        .collect(&compiler.document_ids().unwrap())
        .unwrap()
        .into_iter()
        .map(|d| d.name)
        .collect();
    assert_eq!(names, vec!["A2"]);
}
