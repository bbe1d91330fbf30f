//! Fixtures shared by unit tests.

use rusqlite::params;
use tempfile::TempDir;

use crate::cancel::CancellationToken;
use crate::config::ProjectConfig;
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::documents::DocumentLoader;
use crate::filesystem::OsFileSystem;
use crate::store::Store;

pub const TEST_SCHEMA: &str = r#"
type Query {
    user(id: ID!): User
    users(first: Int, after: String, last: Int, before: String): UserConnection!
    friends(limit: Int, offset: Int): [User!]!
    legends: [Legend!]!
    ghost: Ghost
    node(id: ID!): Node
    search(filter: SearchFilter!, note: String, order: Order): [SearchResult!]!
    version: Int
}

type Mutation {
    updateUser(id: ID!, name: String): User
    addFriend(input: FriendInput): User
}

type Subscription {
    newUser: User
    userDeleted: ID
}

interface Node {
    id: ID!
}

type User implements Node {
    id: ID!
    firstName: String!
    nickname: String
    friends(first: Int, after: String): [User!]!
    avatar(size: Int): String
    bestFriend: User
}

type Legend {
    name: String!
}

type Ghost {
    aka: String!
    name: String!
}

union SearchResult = User | Legend

input SearchFilter {
    name: String
    tags: [String!]
}

input FriendInput {
    id: ID!
    note: String
}

type UserConnection {
    edges: [UserEdge!]!
    pageInfo: PageInfo!
}

type UserEdge {
    cursor: String
    node: User
}

type PageInfo {
    hasNextPage: Boolean!
    hasPreviousPage: Boolean!
    startCursor: String
    endCursor: String
}

enum Order {
    ASC
    DESC
}
"#;

/// A project directory with a loaded schema and an open IR.
pub struct TestProject {
    /// Keeps the project directory alive
    _dir: TempDir,
    pub store: Store,
}

impl TestProject {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(configure: impl FnOnce(&mut ProjectConfig)) -> Self {
        Self::with_schema(TEST_SCHEMA, configure)
    }

    pub fn with_schema(schema: &str, configure: impl FnOnce(&mut ProjectConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("schema.graphql"), schema).unwrap();
        let mut config = ProjectConfig {
            project_root: dir.path().to_path_buf(),
            ..ProjectConfig::default()
        };
        configure(&mut config);
        let store = Store::open(&dir.path().join(".gqlforge.db")).unwrap();
        crate::schema::load_schema(&store, &config, &OsFileSystem, &CancellationToken::new()).unwrap();
        Self { _dir: dir, store }
    }

    pub fn add_raw(&self, filepath: &str, content: &str) -> i64 {
        self.insert_raw(filepath, content, 0, 0, None)
    }

    pub fn add_raw_at(&self, filepath: &str, content: &str, line: i64, column: i64) -> i64 {
        self.insert_raw(filepath, content, line, column, None)
    }

    pub fn add_raw_for_task(&self, filepath: &str, content: &str, task: &str) -> i64 {
        self.insert_raw(filepath, content, 0, 0, Some(task))
    }

    pub fn add_component_raw(&self, filepath: &str, content: &str, prop: &str) -> i64 {
        let id = self.add_raw(filepath, content);
        self.execute("INSERT INTO component_fields (document, prop, inline) VALUES (?1, ?2, 1)", params![id, prop]);
        id
    }

    fn insert_raw(&self, filepath: &str, content: &str, line: i64, column: i64, task: Option<&str>) -> i64 {
        self.store
            .write(|tx| {
                tx.execute(
                    "INSERT INTO raw_documents (filepath, content, offset_line, offset_column, current_task)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![filepath, content, line, column, task],
                )?;
                Ok(tx.last_insert_rowid())
            })
            .unwrap()
    }

    pub fn execute(&self, sql: &str, params: impl rusqlite::Params) {
        self.store
            .write(|tx| {
                tx.execute(sql, params)?;
                Ok(())
            })
            .unwrap();
    }

    /// Run the document loader over every raw document.
    pub fn load(&self) -> Vec<Diagnostic> {
        self.load_task(None)
    }

    pub fn load_task(&self, task: Option<&str>) -> Vec<Diagnostic> {
        let diagnostics = Diagnostics::new();
        DocumentLoader {
            store: &self.store,
            task,
            cancel: &CancellationToken::new(),
            diagnostics: &diagnostics,
        }
        .run()
        .unwrap();
        diagnostics.into_sorted()
    }

    /// First column of every row, as text.
    pub fn rows(&self, sql: &str) -> Vec<String> {
        self.store
            .read(|conn| {
                let mut stmt = conn.prepare(sql)?;
                let rows = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .unwrap()
    }

    pub fn count(&self, sql: &str) -> i64 {
        self.store
            .read(|conn| Ok(conn.query_row(sql, [], |row| row.get(0))?))
            .unwrap()
    }
}
