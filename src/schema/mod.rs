//! Schema phase: load the project schema into the IR.
//!
//! The user's SDL is parsed together with the built-in and framework
//! definitions, merged, validated, and written in a single transaction along
//! with the project configuration. Any failure before the commit leaves the IR
//! untouched and surfaces as [`PipelineError::Schema`].

pub mod internal;
pub mod model;
pub mod validate;

use std::time::Instant;

use async_graphql_parser::parse_schema;
use rusqlite::{params, Connection};

use crate::cancel::CancellationToken;
use crate::config::ProjectConfig;
use crate::diagnostics::{Diagnostic, PipelineError};
use crate::filesystem::FileSystem;
use crate::paths::display_path;
use crate::store::Store;

pub use model::{Origin, SchemaModel};

/// Counts reported after a successful load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaSummary {
    pub types: usize,
    pub fields: usize,
    pub directives: usize,
}

/// Read, validate, and persist the project schema and configuration.
pub fn load_schema(
    store: &Store,
    config: &ProjectConfig,
    fs: &dyn FileSystem,
    cancel: &CancellationToken,
) -> Result<SchemaSummary, PipelineError> {
    let started = Instant::now();
    let path = config.schema_file();
    let filepath = display_path(&path, &config.project_root);

    let bytes = fs.read(&path).map_err(|err| {
        PipelineError::Schema(vec![Diagnostic::io(format!("cannot read schema {filepath}: {err}"))])
    })?;
    let text = String::from_utf8_lossy(&bytes);
    let model = build_model(&text, config, &filepath)?;
    cancel.check()?;

    let summary = store.write(|tx| {
        write_config(tx, config)?;
        clear_schema(tx)?;
        let summary = write_model(tx, &model)?;
        relink_field_arguments(tx)?;
        Ok(summary)
    })?;

    tracing::info!(
        types = summary.types,
        fields = summary.fields,
        directives = summary.directives,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "schema loaded"
    );
    Ok(summary)
}

/// Parse and validate `sdl` with every injected definition.
pub fn build_model(sdl: &str, config: &ProjectConfig, filepath: &str) -> Result<SchemaModel, PipelineError> {
    let user = parse_schema(sdl).map_err(|err| {
        let mut diagnostic = Diagnostic::syntax(format!("schema syntax error: {err}"));
        if let Some(pos) = err.positions().next() {
            diagnostic = diagnostic.at(filepath, pos.line, pos.column);
        }
        PipelineError::Schema(vec![diagnostic])
    })?;
    let built_in = parse_schema(internal::BUILT_IN_SDL)
        .map_err(|err| PipelineError::Internal(format!("built-in schema: {err}")))?;
    let framework = parse_schema(internal::INTERNAL_SDL)
        .map_err(|err| PipelineError::Internal(format!("internal schema: {err}")))?;

    let mut model = SchemaModel::new();
    model.add_document(built_in, Origin::BuiltIn);
    model.add_document(framework, Origin::Internal);
    model.add_document(user, Origin::User);
    model.apply_extensions();
    model.resolve_roots();

    for name in config.scalars.keys() {
        model.ensure_scalar(name, Origin::User);
    }
    for name in config.runtime_scalars.keys() {
        model.ensure_scalar(name, Origin::Internal);
    }

    let errors = validate::validate_schema(&model, filepath);
    if !errors.is_empty() {
        return Err(PipelineError::Schema(errors));
    }

    model.add_typename_fields();
    Ok(model)
}

fn json<T: serde::Serialize>(value: &T) -> Result<String, PipelineError> {
    serde_json::to_string(value).map_err(|e| PipelineError::Internal(e.to_string()))
}

fn write_config(conn: &Connection, config: &ProjectConfig) -> Result<(), PipelineError> {
    let path_text = |p: &Option<std::path::PathBuf>| p.as_ref().map(|p| p.to_string_lossy().into_owned());

    conn.execute(
        "INSERT OR REPLACE INTO config (
            id, project_root, schema_path, include_globs, exclude_globs, default_keys,
            default_list_target, default_list_position, default_paginate_mode,
            default_fragment_masking, default_cache_policy, default_partial, default_lifetime,
            cache_buffer_size, suppress_pagination_deduplication, persisted_queries_path,
            definitions_path, runtime_dir, log_level
        ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)",
        params![
            config.project_root.to_string_lossy().into_owned(),
            config.schema_path.to_string_lossy().into_owned(),
            json(&config.include)?,
            json(&config.exclude)?,
            json(&config.default_keys)?,
            config.default_list_target.as_str(),
            config.default_list_position.as_str(),
            config.default_paginate_mode.as_str(),
            config.default_fragment_masking.as_str(),
            config.default_cache_policy.as_str(),
            config.default_partial,
            config.default_lifetime as i64,
            config.cache_buffer_size,
            config.suppress_pagination_deduplication,
            path_text(&config.persisted_queries_path),
            path_text(&config.definitions_path),
            path_text(&config.runtime_dir),
            config.log_level.as_str(),
        ],
    )?;

    conn.execute_batch(
        "DELETE FROM type_configs; DELETE FROM scalar_config; DELETE FROM runtime_scalar_definitions;",
    )?;

    let mut insert = conn.prepare_cached("INSERT INTO type_configs (name, keys, resolve_query) VALUES (?1, ?2, ?3)")?;
    for (name, type_config) in &config.type_config {
        insert.execute(params![name, json(&type_config.keys)?, type_config.resolve_query])?;
    }

    let mut insert = conn.prepare_cached("INSERT INTO scalar_config (name, type, input_types) VALUES (?1, ?2, ?3)")?;
    for (name, scalar) in &config.scalars {
        insert.execute(params![name, scalar.host_type, json(&scalar.input_types)?])?;
    }

    let mut insert = conn.prepare_cached("INSERT INTO runtime_scalar_definitions (name, type) VALUES (?1, ?2)")?;
    for (name, equivalent) in &config.runtime_scalars {
        insert.execute(params![name, equivalent])?;
    }

    Ok(())
}

fn clear_schema(conn: &Connection) -> Result<(), PipelineError> {
    conn.execute_batch(
        "DELETE FROM possible_types;
         DELETE FROM enum_values;
         DELETE FROM directive_locations;
         DELETE FROM directive_arguments;
         DELETE FROM directives;
         DELETE FROM field_argument_definitions;
         DELETE FROM type_fields;
         DELETE FROM types;",
    )?;
    Ok(())
}

fn write_model(conn: &Connection, model: &SchemaModel) -> Result<SchemaSummary, PipelineError> {
    let mut summary = SchemaSummary::default();

    let operation_of = |name: &str| -> Option<&'static str> {
        let matches = |root: &Option<(String, async_graphql_parser::Pos)>| {
            root.as_ref().is_some_and(|(root, _)| root == name)
        };
        if matches(&model.roots.query) {
            Some("query")
        } else if matches(&model.roots.mutation) {
            Some("mutation")
        } else if matches(&model.roots.subscription) {
            Some("subscription")
        } else {
            None
        }
    };

    let mut insert_type = conn.prepare_cached(
        "INSERT INTO types (name, kind, operation, internal, built_in, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    let mut insert_field = conn.prepare_cached(
        "INSERT INTO type_fields (id, parent, name, type, type_modifiers, default_value, description, internal)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
    )?;
    let mut insert_arg = conn.prepare_cached(
        "INSERT INTO field_argument_definitions (field, name, type, type_modifiers, default_value)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    let mut insert_enum_value =
        conn.prepare_cached("INSERT INTO enum_values (parent, value, description) VALUES (?1, ?2, ?3)")?;
    let mut insert_possible =
        conn.prepare_cached("INSERT OR IGNORE INTO possible_types (type, member) VALUES (?1, ?2)")?;

    for ty in model.types.values() {
        insert_type.execute(params![
            ty.name,
            ty.kind,
            operation_of(&ty.name),
            ty.origin == Origin::Internal,
            ty.origin == Origin::BuiltIn,
            ty.description,
        ])?;
        summary.types += 1;

        for field in &ty.fields {
            let id = format!("{}.{}", ty.name, field.name);
            insert_field.execute(params![
                id,
                ty.name,
                field.name,
                field.ty,
                field.modifiers,
                field.default_value,
                field.description,
                field.internal || ty.origin == Origin::Internal,
            ])?;
            summary.fields += 1;

            for arg in &field.args {
                insert_arg.execute(params![id, arg.name, arg.ty, arg.modifiers, arg.default_value])?;
            }
        }

        for (value, description) in &ty.enum_values {
            insert_enum_value.execute(params![ty.name, value, description])?;
        }

        for member in model.possible_types(&ty.name) {
            insert_possible.execute(params![ty.name, member])?;
        }
    }

    let mut insert_directive =
        conn.prepare_cached("INSERT INTO directives (name, repeatable, internal) VALUES (?1, ?2, ?3)")?;
    let mut insert_directive_arg = conn.prepare_cached(
        "INSERT INTO directive_arguments (parent, name, type, type_modifiers, default_value)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    let mut insert_location =
        conn.prepare_cached("INSERT OR IGNORE INTO directive_locations (directive, location) VALUES (?1, ?2)")?;

    for directive in model.directives.values() {
        insert_directive.execute(params![
            directive.name,
            directive.repeatable,
            directive.origin == Origin::Internal
        ])?;
        summary.directives += 1;
        for arg in &directive.args {
            insert_directive_arg.execute(params![
                directive.name,
                arg.name,
                arg.ty,
                arg.modifiers,
                arg.default_value
            ])?;
        }
        for location in &directive.locations {
            insert_location.execute(params![directive.name, location])?;
        }
    }

    Ok(summary)
}

/// Point existing selection arguments at the freshly written definitions.
fn relink_field_arguments(conn: &Connection) -> Result<(), PipelineError> {
    conn.execute(
        "UPDATE selection_arguments SET field_argument = (
            SELECT fad.id
            FROM selections s
            JOIN field_argument_definitions fad ON fad.field = s.type AND fad.name = selection_arguments.name
            WHERE s.id = selection_arguments.selection_id
        )",
        [],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filesystem::OsFileSystem;
    use tempfile::TempDir;

    fn project(schema: &str) -> (TempDir, ProjectConfig, Store) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("schema.graphql"), schema).unwrap();
        let config = ProjectConfig {
            project_root: dir.path().to_path_buf(),
            ..ProjectConfig::default()
        };
        let store = Store::open_in_dir(dir.path()).unwrap();
        (dir, config, store)
    }

    fn scalar<T: rusqlite::types::FromSql>(store: &Store, sql: &str) -> T {
        store.read(|conn| Ok(conn.query_row(sql, [], |r| r.get(0))?)).unwrap()
    }

    #[test]
    fn test_load_writes_schema_rows() {
        let (_dir, config, store) = project(
            "type Query { user(id: ID!): User } \
             interface Node { id: ID! } \
             type User implements Node { id: ID! friends(first: Int = 10): [User!]! }",
        );
        load_schema(&store, &config, &OsFileSystem, &CancellationToken::new()).unwrap();

        let modifiers: String = scalar(&store, "SELECT type_modifiers FROM type_fields WHERE id = 'User.friends'");
        assert_eq!(modifiers, "!]!");
        let default: String =
            scalar(&store, "SELECT default_value FROM field_argument_definitions WHERE field = 'User.friends'");
        assert_eq!(default, "10");
        let operation: String = scalar(&store, "SELECT operation FROM types WHERE name = 'Query'");
        assert_eq!(operation, "query");
        let members: i64 = scalar(&store, "SELECT COUNT(*) FROM possible_types WHERE type = 'Node'");
        assert_eq!(members, 1);
        let typename: i64 =
            scalar(&store, "SELECT COUNT(*) FROM type_fields WHERE name = '__typename' AND parent = 'User'");
        assert_eq!(typename, 1);
        let list: i64 = scalar(&store, "SELECT internal FROM directives WHERE name = 'list'");
        assert_eq!(list, 1);
        let builtin: i64 = scalar(&store, "SELECT built_in FROM types WHERE name = 'ID'");
        assert_eq!(builtin, 1);
    }

    #[test]
    fn test_load_is_idempotent() {
        let (_dir, config, store) = project("type Query { a: Int }");
        let fs = OsFileSystem;
        let cancel = CancellationToken::new();
        let first = load_schema(&store, &config, &fs, &cancel).unwrap();
        let second = load_schema(&store, &config, &fs, &cancel).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_syntax_error_is_schema_error_with_location() {
        let (_dir, config, store) = project("type Query {\n  a: \n}");
        let err = load_schema(&store, &config, &OsFileSystem, &CancellationToken::new()).unwrap_err();
        match err {
            PipelineError::Schema(diags) => {
                assert_eq!(diags.len(), 1);
                assert_eq!(diags[0].locations[0].filepath, "schema.graphql");
            }
            other => panic!("unexpected {other:?}"),
        }
        let types: i64 = scalar(&store, "SELECT COUNT(*) FROM types");
        assert_eq!(types, 0);
    }

    #[test]
    fn test_missing_file_is_schema_error() {
        let dir = TempDir::new().unwrap();
        let config = ProjectConfig {
            project_root: dir.path().to_path_buf(),
            ..ProjectConfig::default()
        };
        let store = Store::open_in_dir(dir.path()).unwrap();
        let err = load_schema(&store, &config, &OsFileSystem, &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn test_config_scalars_and_runtime_scalars_become_types() {
        let (dir, mut config, store) = project("type Query { a: Int }");
        config.runtime_scalars.insert("UserFromSession".into(), "ID".into());
        config.scalars.insert(
            "DateTime".into(),
            crate::config::ScalarConfig {
                host_type: "Date".into(),
                input_types: vec![],
            },
        );
        load_schema(&store, &config, &OsFileSystem, &CancellationToken::new()).unwrap();

        let internal: i64 = scalar(&store, "SELECT internal FROM types WHERE name = 'UserFromSession'");
        assert_eq!(internal, 1);
        let kind: String = scalar(&store, "SELECT kind FROM types WHERE name = 'DateTime'");
        assert_eq!(kind, "SCALAR");
        let root: String = scalar(&store, "SELECT project_root FROM config");
        assert_eq!(root, dir.path().to_string_lossy());
    }
}
