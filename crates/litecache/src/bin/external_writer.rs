//! External `SQLite` writer for cross-process invalidation tests.
// crates/litecache/src/bin/external_writer.rs
// ============================================================================
// Binary: Litecache External Writer
// Description: Applies one statement to a store from a separate process.
// Purpose: Exercise change detection for writes made outside a coordinator.
// Dependencies: litecache, rusqlite
// ============================================================================

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use litecache::SqlValue;
use rusqlite::params_from_iter;

/// Usage: `litecache-external-writer <db-path> <sql> [text-param ...]`.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = env::args().skip(1);
    let path = args.next().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "missing sqlite path")
    })?;
    let sql = args
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "missing sql"))?;
    let params: Vec<SqlValue> = args.map(SqlValue::from).collect();

    let mut conn = rusqlite::Connection::open(PathBuf::from(path))?;
    conn.busy_timeout(Duration::from_secs(5))?;
    let tx = conn.transaction()?;
    tx.execute(&sql, params_from_iter(params.iter()))?;
    tx.commit()?;
    conn.close().map_err(|(_, err)| err)?;
    Ok(())
}
