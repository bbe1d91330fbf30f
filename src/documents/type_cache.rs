//! In-memory view of the schema tables used while loading documents.
//!
//! Loaded once per loader run, after the schema phase committed, and only
//! read afterwards.

use ahash::AHashMap;
use rusqlite::Connection;

/// Declared type of an argument or input field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSlot {
    /// `field_argument_definitions.id` for field arguments
    pub id: Option<i64>,
    pub ty: String,
    pub modifiers: String,
}

/// A schema field with its arguments.
#[derive(Debug, Clone, Default)]
pub struct FieldInfo {
    pub ty: String,
    pub modifiers: String,
    pub args: AHashMap<String, InputSlot>,
}

#[derive(Debug, Default)]
pub struct TypeCache {
    kinds: AHashMap<String, String>,
    /// Keyed by `Parent.field`; input object fields included
    fields: AHashMap<String, FieldInfo>,
    directive_args: AHashMap<(String, String), InputSlot>,
    roots: AHashMap<String, String>,
}

impl TypeCache {
    pub fn load(conn: &Connection) -> rusqlite::Result<Self> {
        let mut cache = Self::default();

        let mut stmt = conn.prepare("SELECT name, kind, operation FROM types")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let operation: Option<String> = row.get(2)?;
            if let Some(operation) = operation {
                cache.roots.insert(operation, name.clone());
            }
            cache.kinds.insert(name, row.get(1)?);
        }

        let mut stmt = conn.prepare("SELECT id, type, type_modifiers FROM type_fields")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            cache.fields.insert(
                row.get(0)?,
                FieldInfo {
                    ty: row.get(1)?,
                    modifiers: row.get(2)?,
                    args: AHashMap::new(),
                },
            );
        }

        let mut stmt = conn.prepare("SELECT id, field, name, type, type_modifiers FROM field_argument_definitions")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let field: String = row.get(1)?;
            if let Some(info) = cache.fields.get_mut(&field) {
                info.args.insert(
                    row.get(2)?,
                    InputSlot {
                        id: Some(row.get(0)?),
                        ty: row.get(3)?,
                        modifiers: row.get(4)?,
                    },
                );
            }
        }

        let mut stmt = conn.prepare("SELECT parent, name, type, type_modifiers FROM directive_arguments")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            cache.directive_args.insert(
                (row.get(0)?, row.get(1)?),
                InputSlot {
                    id: None,
                    ty: row.get(2)?,
                    modifiers: row.get(3)?,
                },
            );
        }

        Ok(cache)
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.kinds.contains_key(name)
    }

    pub fn kind(&self, name: &str) -> Option<&str> {
        self.kinds.get(name).map(String::as_str)
    }

    /// Root type for `operation` (`query`, `mutation`, `subscription`).
    ///
    /// Falls back to the conventional name so fields under a missing root
    /// still carry a `Root.field` type and are reported as unknown.
    pub fn root(&self, operation: &str) -> String {
        match self.roots.get(operation) {
            Some(name) => name.clone(),
            None => match operation {
                "mutation" => "Mutation".to_string(),
                "subscription" => "Subscription".to_string(),
                _ => "Query".to_string(),
            },
        }
    }

    pub fn field(&self, parent: &str, name: &str) -> Option<&FieldInfo> {
        self.fields.get(&field_id(parent, name))
    }

    pub fn field_argument(&self, parent: &str, field: &str, name: &str) -> Option<&InputSlot> {
        self.field(parent, field).and_then(|info| info.args.get(name))
    }

    /// Declared type of `input.name` on an input object.
    pub fn input_field(&self, input: &str, name: &str) -> Option<InputSlot> {
        self.field(input, name).map(|info| InputSlot {
            id: None,
            ty: info.ty.clone(),
            modifiers: info.modifiers.clone(),
        })
    }

    pub fn directive_argument(&self, directive: &str, name: &str) -> Option<&InputSlot> {
        self.directive_args.get(&(directive.to_string(), name.to_string()))
    }
}

/// `type_fields.id` of `parent.name`.
pub fn field_id(parent: &str, name: &str) -> String {
    format!("{parent}.{name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::filesystem::OsFileSystem;
    use crate::store::Store;
    use crate::cancel::CancellationToken;
    use tempfile::TempDir;

    #[test]
    fn test_loads_fields_arguments_and_roots() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("schema.graphql"),
            "schema { query: Root } type Root { user(id: ID!, filter: Filter): User } \
             type User { id: ID! friends: [User!]! } input Filter { name: String }",
        )
        .unwrap();
        let config = ProjectConfig {
            project_root: dir.path().to_path_buf(),
            ..ProjectConfig::default()
        };
        let store = Store::open_in_dir(dir.path()).unwrap();
        crate::schema::load_schema(&store, &config, &OsFileSystem, &CancellationToken::new()).unwrap();

        let cache = store.read(|conn| Ok(TypeCache::load(conn)?)).unwrap();
        assert_eq!(cache.root("query"), "Root");
        assert_eq!(cache.root("mutation"), "Mutation");
        assert_eq!(cache.field("User", "friends").unwrap().modifiers, "!]!");
        let arg = cache.field_argument("Root", "user", "id").unwrap();
        assert_eq!((arg.ty.as_str(), arg.modifiers.as_str()), ("ID", "!"));
        assert!(arg.id.is_some());
        assert_eq!(cache.input_field("Filter", "name").unwrap().ty, "String");
        assert_eq!(cache.directive_argument("list", "name").unwrap().modifiers, "!");
        assert_eq!(cache.kind("User"), Some("OBJECT"));
        assert!(cache.field("User", "__typename").is_some());
    }
}
