// crates/litecache/src/store.rs
// ============================================================================
// Module: SQLite Store
// Description: Store capability and its SQLite WAL implementation.
// Purpose: Execute reads on pooled reader connections and mutations on one
//          writer connection inside a transaction.
// Dependencies: rusqlite, thiserror
// ============================================================================

//! ## Overview
//! [`Store`] is the boundary between the coordinator and the relational
//! engine. [`SqliteStore`] implements it with one writer connection and a
//! round-robin pool of read-only connections. Under WAL, readers keep working
//! while the writer holds a transaction and never observe a half-committed
//! write. Reader connections are opened read-only, so a mutating statement
//! sent down the read path is rejected by `SQLite` itself.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params_from_iter;
use thiserror::Error;

use crate::config::CoordinatorConfig;
use crate::value::Row;
use crate::value::RowSet;
use crate::value::SqlValue;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Introspection query used to decide whether the init script must run.
const ANY_TABLE_SQL: &str = "SELECT 1 FROM sqlite_master WHERE type = 'table' LIMIT 1";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error (malformed SQL, constraint violation, ...).
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Invalid configuration or input.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// The store handle has been released.
    #[error("sqlite store closed")]
    Closed,
}

// ============================================================================
// SECTION: Capability
// ============================================================================

/// Relational store consumed by the coordinator.
///
/// Implementations must guarantee that readers never observe a partially
/// applied mutation. Only the write serializer calls [`Store::apply`];
/// [`Store::initialize`] runs once while the coordinator is opening.
pub trait Store: Send + Sync {
    /// Returns true when at least one table exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the introspection query fails.
    fn has_tables(&self) -> Result<bool, StoreError>;

    /// Runs `script` if the store has no tables yet.
    ///
    /// Returns true when the script ran. A blank script never runs, so a
    /// store opened without a schema is not reported as newly created. Implementations should make the
    /// check and the script one atomic step so concurrent openers initialize
    /// exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when introspection or the script fails.
    fn initialize(&self, script: &str) -> Result<bool, StoreError> {
        if script.trim().is_empty() || self.has_tables()? {
            return Ok(false);
        }
        self.execute_script(script)?;
        Ok(true)
    }

    /// Runs a multi-statement script atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when any statement fails; nothing is applied.
    fn execute_script(&self, script: &str) -> Result<(), StoreError>;

    /// Runs a read and returns every row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the statement fails.
    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<RowSet, StoreError>;

    /// Runs a read and returns the first row, if any.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the statement fails.
    fn query_first(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>, StoreError> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Applies one mutation inside begin, execute, commit.
    ///
    /// Returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the statement or commit fails; the
    /// transaction is rolled back.
    fn apply(&self, sql: &str, params: &[SqlValue]) -> Result<usize, StoreError>;

    /// Releases every handle. Later calls return [`StoreError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when a connection fails to close cleanly.
    fn close(&self) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: SQLite Store
// ============================================================================

/// `SQLite`-backed store with WAL reader isolation.
///
/// # Invariants
/// - Exactly one connection issues mutating statements.
/// - Connection access is serialized per connection through a mutex.
pub struct SqliteStore {
    /// Database file path.
    path: PathBuf,
    /// Writer connection; `None` after close.
    write_connection: Mutex<Option<Connection>>,
    /// Read-only connection pool; entries are `None` after close.
    read_connections: Vec<Mutex<Option<Connection>>>,
    /// Round-robin cursor for reader selection.
    read_cursor: AtomicUsize,
}

impl SqliteStore {
    /// Opens (creating if needed) the database described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the path is unsafe or a connection cannot
    /// be opened and configured.
    pub fn open(config: &CoordinatorConfig) -> Result<Self, StoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let write_connection = open_write_connection(config)?;
        let mut read_connections = Vec::with_capacity(config.read_pool_size);
        for _ in 0 .. config.read_pool_size {
            read_connections.push(Mutex::new(Some(open_read_connection(config)?)));
        }
        Ok(Self {
            path: config.path.clone(),
            write_connection: Mutex::new(Some(write_connection)),
            read_connections,
            read_cursor: AtomicUsize::new(0),
        })
    }

    /// Returns the database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Selects the next reader connection.
    fn read_connection(&self) -> Result<MutexGuard<'_, Option<Connection>>, StoreError> {
        let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % self.read_connections.len();
        self.read_connections[index]
            .lock()
            .map_err(|_| StoreError::Io("sqlite read mutex poisoned".to_string()))
    }

    /// Locks the writer connection.
    fn write_connection(&self) -> Result<MutexGuard<'_, Option<Connection>>, StoreError> {
        self.write_connection
            .lock()
            .map_err(|_| StoreError::Io("sqlite write mutex poisoned".to_string()))
    }
}

impl Store for SqliteStore {
    fn has_tables(&self) -> Result<bool, StoreError> {
        let guard = self.write_connection()?;
        let connection = guard.as_ref().ok_or(StoreError::Closed)?;
        let found: Option<i64> = connection
            .query_row(ANY_TABLE_SQL, [], |row| row.get(0))
            .optional()
            .map_err(|err| StoreError::Db(err.to_string()))?;
        Ok(found.is_some())
    }

    fn execute_script(&self, script: &str) -> Result<(), StoreError> {
        let mut guard = self.write_connection()?;
        let connection = guard.as_mut().ok_or(StoreError::Closed)?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| StoreError::Db(err.to_string()))?;
        tx.execute_batch(script).map_err(|err| StoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| StoreError::Db(err.to_string()))
    }

    fn initialize(&self, script: &str) -> Result<bool, StoreError> {
        if script.trim().is_empty() {
            return Ok(false);
        }
        let mut guard = self.write_connection()?;
        let connection = guard.as_mut().ok_or(StoreError::Closed)?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| StoreError::Db(err.to_string()))?;
        let found: Option<i64> = tx
            .query_row(ANY_TABLE_SQL, [], |row| row.get(0))
            .optional()
            .map_err(|err| StoreError::Db(err.to_string()))?;
        if found.is_some() {
            return Ok(false);
        }
        tx.execute_batch(script).map_err(|err| StoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| StoreError::Db(err.to_string()))?;
        Ok(true)
    }

    fn query(&self, sql: &str, params: &[SqlValue]) -> Result<RowSet, StoreError> {
        let guard = self.read_connection()?;
        let connection = guard.as_ref().ok_or(StoreError::Closed)?;
        fetch_rows(connection, sql, params, None)
    }

    fn query_first(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>, StoreError> {
        let guard = self.read_connection()?;
        let connection = guard.as_ref().ok_or(StoreError::Closed)?;
        Ok(fetch_rows(connection, sql, params, Some(1))?.into_iter().next())
    }

    fn apply(&self, sql: &str, params: &[SqlValue]) -> Result<usize, StoreError> {
        let mut guard = self.write_connection()?;
        let connection = guard.as_mut().ok_or(StoreError::Closed)?;
        let tx = connection
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|err| StoreError::Db(err.to_string()))?;
        let affected = tx
            .execute(sql, params_from_iter(params.iter()))
            .map_err(|err| StoreError::Db(err.to_string()))?;
        tx.commit().map_err(|err| StoreError::Db(err.to_string()))?;
        Ok(affected)
    }

    fn close(&self) -> Result<(), StoreError> {
        let mut first_error = None;
        for slot in &self.read_connections {
            let taken = slot
                .lock()
                .map_err(|_| StoreError::Io("sqlite read mutex poisoned".to_string()))?
                .take();
            if let Some(connection) = taken
                && let Err((_, err)) = connection.close()
            {
                first_error.get_or_insert(StoreError::Db(err.to_string()));
            }
        }
        let taken = self.write_connection()?.take();
        if let Some(connection) = taken
            && let Err((_, err)) = connection.close()
        {
            first_error.get_or_insert(StoreError::Db(err.to_string()));
        }
        first_error.map_or(Ok(()), Err)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs `sql` and collects up to `limit` rows.
fn fetch_rows(
    connection: &Connection,
    sql: &str,
    params: &[SqlValue],
    limit: Option<usize>,
) -> Result<RowSet, StoreError> {
    let mut statement =
        connection.prepare_cached(sql).map_err(|err| StoreError::Db(err.to_string()))?;
    let columns = statement.column_count();
    let mut rows = statement
        .query(params_from_iter(params.iter()))
        .map_err(|err| StoreError::Db(err.to_string()))?;
    let mut collected = Vec::new();
    while let Some(row) = rows.next().map_err(|err| StoreError::Db(err.to_string()))? {
        let row =
            Row::from_sqlite(row, columns).map_err(|err| StoreError::Db(err.to_string()))?;
        collected.push(row);
        if limit.is_some_and(|limit| collected.len() >= limit) {
            break;
        }
    }
    Ok(collected)
}

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), StoreError> {
    let Some(parent) = path.parent() else {
        return Err(StoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| StoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), StoreError> {
    if path.as_os_str().is_empty() {
        return Err(StoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(StoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(StoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(StoreError::Invalid("store path must be a file, not a directory".to_string()));
    }
    Ok(())
}

/// Opens the writer connection and applies durability pragmas.
fn open_write_connection(config: &CoordinatorConfig) -> Result<Connection, StoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| StoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Opens a read-only reader connection.
///
/// The writer must already exist so the file and journal mode are in place.
pub(crate) fn open_read_connection(config: &CoordinatorConfig) -> Result<Connection, StoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| StoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| StoreError::Db(err.to_string()))?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability and isolation.
fn apply_pragmas(connection: &Connection, config: &CoordinatorConfig) -> Result<(), StoreError> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| StoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| StoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| StoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| StoreError::Db(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions and helpers are permitted."
    )]

    use super::*;

    fn temp_store(dir: &tempfile::TempDir) -> SqliteStore {
        SqliteStore::open(&CoordinatorConfig::for_location(dir.path(), "store")).unwrap()
    }

    #[test]
    fn blank_init_script_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        assert!(!store.initialize("").unwrap());
        assert!(!store.initialize("  \n\t").unwrap());
        assert!(!store.has_tables().unwrap());
        assert!(store.initialize("CREATE TABLE t (k TEXT NOT NULL);").unwrap());
        assert!(!store.initialize("CREATE TABLE t (k TEXT NOT NULL);").unwrap());
        store.close().unwrap();
    }

    #[test]
    fn operations_after_close_report_closed() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(&dir);
        store.close().unwrap();
        assert_eq!(store.query("SELECT 1", &[]), Err(StoreError::Closed));
        assert_eq!(store.apply("SELECT 1", &[]), Err(StoreError::Closed));
    }
}
