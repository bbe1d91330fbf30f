//! Relational IR store.
//!
//! One SQLite database per build, shared by every phase. Access follows a
//! single-writer, many-readers discipline:
//!
//! - [`Store::read`] checks out a pooled connection and runs a closure against it.
//! - [`Store::write`] additionally takes the process-wide write lock and wraps
//!   the closure in an `IMMEDIATE` transaction that commits on `Ok` and rolls
//!   back on `Err` (or unwind).
//!
//! Connections are returned to the pool when the guard drops, on every exit path.

pub mod schema;
pub mod statements;

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::diagnostics::PipelineError;

pub use schema::{ensure_schema, IR_SCHEMA_VERSION};
pub use statements::{ExtractStatements, LoaderStatements, SourcePos};

/// File name used by [`Store::open_in_dir`].
pub const DEFAULT_DB_NAME: &str = "ir.db";

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

pub type PooledConn = PooledConnection<SqliteConnectionManager>;

/// Pooled handle to the IR database.
#[derive(Debug)]
pub struct Store {
    pool: Pool<SqliteConnectionManager>,
    write_lock: Mutex<()>,
    path: PathBuf,
}

impl Store {
    /// Open (or create) the IR at `path` and make sure every table exists.
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.pragma_update(None, "foreign_keys", "ON")?;
            let _mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            Ok(())
        });

        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4) as u32;
        let pool = Pool::builder()
            .max_size(workers + 2)
            .connection_timeout(BUSY_TIMEOUT)
            .build(manager)?;

        let store = Self {
            pool,
            write_lock: Mutex::new(()),
            path: path.to_path_buf(),
        };

        {
            let _guard = store.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
            let conn = store.pool.get()?;
            ensure_schema(&conn, path)?;
        }

        tracing::debug!(path = %path.display(), "opened IR store");
        Ok(store)
    }

    /// Open `ir.db` inside `dir`.
    pub fn open_in_dir(dir: &Path) -> Result<Self, PipelineError> {
        Self::open(&dir.join(DEFAULT_DB_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check out a connection for a scoped read.
    pub fn connection(&self) -> Result<PooledConn, PipelineError> {
        Ok(self.pool.get()?)
    }

    /// Run `f` against a pooled connection.
    pub fn read<T, F>(&self, f: F) -> Result<T, PipelineError>
    where
        F: FnOnce(&Connection) -> Result<T, PipelineError>,
    {
        let conn = self.pool.get()?;
        f(&conn)
    }

    /// Run `f` inside the single write transaction.
    ///
    /// Blocks while another writer is active. The transaction is committed
    /// only if `f` returns `Ok`.
    pub fn write<T, F>(&self, f: F) -> Result<T, PipelineError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, PipelineError>,
    {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut conn = self.pool.get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Run `f` under a named SAVEPOINT on an open transaction.
///
/// `Ok(Ok(_))` releases the savepoint; `Ok(Err(_))` rolls back to it and hands
/// the closure's error back so the caller can record it and continue. The
/// outer `Err` is reserved for failures of the savepoint statements themselves.
pub fn with_savepoint<T, E, F>(conn: &Connection, name: &str, f: F) -> Result<Result<T, E>, rusqlite::Error>
where
    F: FnOnce() -> Result<T, E>,
{
    conn.execute_batch(&format!("SAVEPOINT {name}"))?;
    match f() {
        Ok(value) => {
            conn.execute_batch(&format!("RELEASE {name}"))?;
            Ok(Ok(value))
        }
        Err(err) => {
            conn.execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))?;
            Ok(Err(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn count(store: &Store, table: &str) -> i64 {
        store
            .read(|conn| Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?))
            .unwrap()
    }

    #[test]
    fn test_write_commits_on_ok() {
        let dir = TempDir::new().unwrap();
        let store = Store::open_in_dir(dir.path()).unwrap();

        store
            .write(|tx| {
                tx.execute("INSERT INTO raw_documents (filepath, content) VALUES ('a.ts', '{ a }')", [])?;
                Ok(())
            })
            .unwrap();

        assert_eq!(count(&store, "raw_documents"), 1);
    }

    #[test]
    fn test_write_rolls_back_on_err() {
        let dir = TempDir::new().unwrap();
        let store = Store::open_in_dir(dir.path()).unwrap();

        let result: Result<(), _> = store.write(|tx| {
            tx.execute("INSERT INTO raw_documents (filepath, content) VALUES ('a.ts', '{ a }')", [])?;
            Err(PipelineError::Cancelled)
        });

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(count(&store, "raw_documents"), 0);
    }

    #[test]
    fn test_savepoint_isolates_failures() {
        let dir = TempDir::new().unwrap();
        let store = Store::open_in_dir(dir.path()).unwrap();

        store
            .write(|tx| {
                let ok: Result<(), rusqlite::Error> = with_savepoint(tx, "doc", || {
                    tx.execute("INSERT INTO raw_documents (filepath, content) VALUES ('a.ts', 'x')", [])?;
                    Ok(())
                })?;
                assert!(ok.is_ok());

                let failed: Result<(), rusqlite::Error> = with_savepoint(tx, "doc", || {
                    tx.execute("INSERT INTO raw_documents (filepath, content) VALUES ('b.ts', 'y')", [])?;
                    tx.execute("INSERT INTO types (name, kind) VALUES ('X', 'NOPE')", [])?;
                    Ok(())
                })?;
                assert!(failed.is_err());
                Ok(())
            })
            .unwrap();

        assert_eq!(count(&store, "raw_documents"), 1);
    }

    #[test]
    fn test_reopen_keeps_rows() {
        let dir = TempDir::new().unwrap();
        {
            let store = Store::open_in_dir(dir.path()).unwrap();
            store
                .write(|tx| {
                    tx.execute("INSERT INTO types (name, kind) VALUES ('User', 'OBJECT')", [])?;
                    Ok(())
                })
                .unwrap();
        }
        let store = Store::open_in_dir(dir.path()).unwrap();
        assert_eq!(count(&store, "types"), 1);
    }
}
