// crates/litecache/src/lib.rs
// ============================================================================
// Module: Litecache
// Description: Eventually consistent read cache and serialized writer over
//              an embedded SQLite store.
// Purpose: Make reads fast and consistent while writes funnel through one
//          writer thread.
// Dependencies: rusqlite, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! Litecache maps `(SQL, params, shape)` to memoized results and applies
//! mutations one at a time on a dedicated writer thread. A change watcher
//! observes the store, including writes made by other processes, and clears
//! the cache when anything changes. Reads may be stale for at most the
//! watcher's signal latency.
//!
//! ```no_run
//! use litecache::CacheCoordinator;
//! use litecache::SqlValue;
//!
//! # fn main() -> Result<(), litecache::LitecacheError> {
//! let cache = CacheCoordinator::open("/tmp", "test", "CREATE TABLE t (k TEXT NOT NULL);")?;
//! cache.mutate("INSERT INTO t VALUES (?)", &[SqlValue::from("fred")])?;
//! let rows = cache.query("SELECT * FROM t WHERE k=?", &[SqlValue::from("fred")])?;
//! cache.close()?;
//! # let _ = rows;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod fingerprint;
pub mod store;
pub mod value;
pub mod watcher;
pub mod writer;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cache::CacheEpoch;
pub use cache::CacheStatsSnapshot;
pub use cache::CachedResult;
pub use cache::ResultCache;
pub use config::CoordinatorConfig;
pub use config::InvalidationMode;
pub use config::JournalMode;
pub use config::MAX_WATCH_TIMEOUT_MS;
pub use config::SyncMode;
pub use config::WatchBackend;
pub use coordinator::CacheCoordinator;
pub use coordinator::CoordinatorState;
pub use coordinator::CoordinatorStatsSnapshot;
pub use error::LitecacheError;
pub use fingerprint::QueryFingerprint;
pub use fingerprint::ResultShape;
pub use store::SqliteStore;
pub use store::Store;
pub use store::StoreError;
pub use value::Row;
pub use value::RowSet;
pub use value::SqlValue;
pub use watcher::ChangeNotifier;
pub use watcher::ChangeSignal;
pub use watcher::ChangeWatcher;
pub use watcher::ChannelWatcher;
pub use watcher::DataVersionWatcher;
pub use watcher::FileStatWatcher;
pub use watcher::WatchError;
pub use watcher::WatcherStatsSnapshot;
pub use watcher::channel_watcher;
pub use writer::Ack;
pub use writer::PendingMutation;
pub use writer::Submission;
pub use writer::WriteMode;
pub use writer::WriteSerializer;
pub use writer::WriterStatsSnapshot;
