// crates/litecache/src/coordinator.rs
// ============================================================================
// Module: Cache Coordinator
// Description: Façade wiring the result cache, writer, watcher, and store.
// Purpose: Serve memoized reads and serialized writes with a defined
//          open/close lifecycle.
// Dependencies: tracing, crate::{cache, config, store, watcher, writer}
// ============================================================================

//! ## Overview
//! [`CacheCoordinator`] owns the [`ResultCache`], the [`WriteSerializer`],
//! and the watch loop, and shares the [`Store`] between the read path and
//! the writer thread.
//!
//! Reads check the cache first and fall through to the store on a miss.
//! Writes go through the serializer only. By default the change watcher is
//! the single source of invalidation, so a read right after a mutation may
//! still see the previous result until the watcher's next signal.
//! [`InvalidationMode::CommitAndWatcher`] additionally clears the cache on
//! the writer thread after each commit, before a blocking `mutate` returns.
//!
//! Lifecycle: `Opening -> Ready -> Closing -> Closed`. `close` stops
//! accepting mutations, drains the writer, joins the watcher, and only then
//! releases the store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::cache::CacheStatsSnapshot;
use crate::cache::CachedResult;
use crate::cache::ResultCache;
use crate::config::CoordinatorConfig;
use crate::config::InvalidationMode;
use crate::error::LitecacheError;
use crate::fingerprint::QueryFingerprint;
use crate::fingerprint::ResultShape;
use crate::store::SqliteStore;
use crate::store::Store;
use crate::store::StoreError;
use crate::value::Row;
use crate::value::RowSet;
use crate::value::SqlValue;
use crate::watcher::ChangeWatcher;
use crate::watcher::WatchLoop;
use crate::watcher::WatcherStatsSnapshot;
use crate::watcher::build_watcher;
use crate::writer::Ack;
use crate::writer::CommitHook;
use crate::writer::WriteSerializer;
use crate::writer::WriterStatsSnapshot;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Coordinator lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoordinatorState {
    /// Store, writer, and watcher are being started.
    Opening = 0,
    /// Serving reads and writes.
    Ready = 1,
    /// Draining the writer and stopping the watcher.
    Closing = 2,
    /// Terminal; every call fails with [`LitecacheError::Closed`].
    Closed = 3,
}

impl CoordinatorState {
    /// Decodes a state stored in an atomic.
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Opening,
            1 => Self::Ready,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Point-in-time coordinator diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorStatsSnapshot {
    /// Lifecycle state.
    pub state: CoordinatorState,
    /// Result cache counters.
    pub cache: CacheStatsSnapshot,
    /// Writer counters.
    pub writer: WriterStatsSnapshot,
    /// Watch loop state.
    pub watcher: WatcherStatsSnapshot,
}

/// Read cache and serialized-write coordinator over one store.
///
/// # Invariants
/// - Only the writer thread issues mutating statements after open.
/// - The store is closed only after the writer has drained and the watcher
///   thread has exited.
pub struct CacheCoordinator {
    /// Database file path.
    path: PathBuf,
    /// Shared store handle.
    store: Arc<dyn Store>,
    /// Memoized reads.
    cache: Arc<ResultCache>,
    /// Serialized writer.
    writer: WriteSerializer,
    /// Watch thread handle; its lock also serializes `close`.
    watch_loop: Mutex<WatchLoop>,
    /// Encoded [`CoordinatorState`].
    state: AtomicU8,
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

impl CacheCoordinator {
    /// Opens `<directory>/<name>.sqlite3` with default settings, running
    /// `init_script` if the store has no tables.
    ///
    /// # Errors
    ///
    /// Returns [`LitecacheError::Open`] when the store cannot be opened or
    /// initialized.
    pub fn open(
        directory: impl AsRef<Path>,
        name: &str,
        init_script: &str,
    ) -> Result<Self, LitecacheError> {
        Self::open_with_config(
            CoordinatorConfig::for_location(directory.as_ref(), name),
            init_script,
        )
    }

    /// Opens a coordinator using the built-in watcher named by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`LitecacheError::Open`] when the configuration is invalid or
    /// the store cannot be opened or initialized.
    pub fn open_with_config(
        config: CoordinatorConfig,
        init_script: &str,
    ) -> Result<Self, LitecacheError> {
        config.validate().map_err(LitecacheError::open)?;
        let store = SqliteStore::open(&config).map_err(LitecacheError::open)?;
        let store: Arc<dyn Store> = Arc::new(store);
        initialize_store(store.as_ref(), init_script, &config.path)?;
        let watcher = match build_watcher(&config) {
            Ok(watcher) => watcher,
            Err(err) => {
                let _ = store.close();
                return Err(LitecacheError::open(err));
            }
        };
        Self::start(config, store, watcher)
    }

    /// Opens a `SQLite` coordinator driven by a caller-supplied watcher.
    ///
    /// # Errors
    ///
    /// Returns [`LitecacheError::Open`] when the configuration is invalid or
    /// the store cannot be opened or initialized.
    pub fn open_with_watcher(
        config: CoordinatorConfig,
        init_script: &str,
        watcher: Box<dyn ChangeWatcher>,
    ) -> Result<Self, LitecacheError> {
        config.validate().map_err(LitecacheError::open)?;
        let store = SqliteStore::open(&config).map_err(LitecacheError::open)?;
        Self::open_with_store(config, Arc::new(store), init_script, watcher)
    }

    /// Opens a coordinator over any [`Store`] implementation.
    ///
    /// `config.path` is reported by [`CacheCoordinator::path`]; the remaining
    /// store settings are the caller's responsibility.
    ///
    /// # Errors
    ///
    /// Returns [`LitecacheError::Open`] when the configuration is invalid or
    /// initialization fails.
    pub fn open_with_store(
        config: CoordinatorConfig,
        store: Arc<dyn Store>,
        init_script: &str,
        watcher: Box<dyn ChangeWatcher>,
    ) -> Result<Self, LitecacheError> {
        config.validate().map_err(LitecacheError::open)?;
        initialize_store(store.as_ref(), init_script, &config.path)?;
        Self::start(config, store, watcher)
    }

    /// Starts the writer and watcher over an initialized store.
    fn start(
        config: CoordinatorConfig,
        store: Arc<dyn Store>,
        watcher: Box<dyn ChangeWatcher>,
    ) -> Result<Self, LitecacheError> {
        let cache = Arc::new(ResultCache::new());
        let on_commit: Option<CommitHook> = match config.invalidation {
            InvalidationMode::Watcher => None,
            InvalidationMode::CommitAndWatcher => {
                let commit_cache = Arc::clone(&cache);
                Some(Box::new(move |_ack: &Ack| commit_cache.clear()))
            }
        };
        let writer = match WriteSerializer::spawn(Arc::clone(&store), on_commit) {
            Ok(writer) => writer,
            Err(err) => {
                let _ = store.close();
                return Err(LitecacheError::open(err));
            }
        };
        let timeout = Duration::from_millis(config.watch_timeout_ms);
        let watch_loop = match WatchLoop::spawn(watcher, Arc::clone(&cache), timeout) {
            Ok(watch_loop) => watch_loop,
            Err(err) => {
                let _ = writer.shutdown();
                let _ = store.close();
                return Err(LitecacheError::open(err));
            }
        };
        tracing::info!(path = %config.path.display(), "litecache coordinator ready");
        Ok(Self {
            path: config.path,
            store,
            cache,
            writer,
            watch_loop: Mutex::new(watch_loop),
            state: AtomicU8::new(CoordinatorState::Ready as u8),
        })
    }

    /// Stops accepting mutations, drains accepted ones, stops the watcher,
    /// and releases the store.
    ///
    /// Blocks until every accepted mutation has been applied. Calling `close`
    /// on a closed coordinator is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`LitecacheError::Execution`] when a background thread
    /// panicked or the store failed to close cleanly. The coordinator is
    /// `Closed` either way.
    pub fn close(&self) -> Result<(), LitecacheError> {
        let mut watch_loop = self.watch_loop.lock().unwrap_or_else(PoisonError::into_inner);
        if self.state() == CoordinatorState::Closed {
            return Ok(());
        }
        self.state.store(CoordinatorState::Closing as u8, Ordering::Release);
        tracing::debug!(path = %self.path.display(), "closing litecache coordinator");
        let writer_result = self.writer.shutdown();
        let watcher_result = watch_loop.stop().map_err(|err| StoreError::Io(err.to_string()));
        drop(watch_loop);
        let store_result = self.store.close();
        self.cache.clear();
        self.state.store(CoordinatorState::Closed as u8, Ordering::Release);
        tracing::info!(path = %self.path.display(), "litecache coordinator closed");
        writer_result.and(watcher_result).and(store_result).map_err(LitecacheError::Execution)
    }
}

// ============================================================================
// SECTION: Operations
// ============================================================================

impl CacheCoordinator {
    /// Runs a read, returning memoized rows when available.
    ///
    /// # Errors
    ///
    /// Returns [`LitecacheError::Closed`] after close, or
    /// [`LitecacheError::Execution`] when the store rejects the statement.
    pub fn query(&self, sql: &str, params: &[SqlValue]) -> Result<Arc<RowSet>, LitecacheError> {
        self.ensure_ready()?;
        let fingerprint = QueryFingerprint::new(sql, params, ResultShape::RowSet);
        if let Some(CachedResult::Rows(rows)) = self.cache.lookup(&fingerprint) {
            return Ok(rows);
        }
        let epoch = self.cache.epoch();
        let rows = Arc::new(self.store.query(sql, params)?);
        self.cache.store_at(epoch, fingerprint, CachedResult::Rows(Arc::clone(&rows)));
        Ok(rows)
    }

    /// Runs a read expected to return one row, returning a memoized row when
    /// available.
    ///
    /// # Errors
    ///
    /// Returns [`LitecacheError::NotFound`] carrying `not_found` when the
    /// read yields no rows, [`LitecacheError::Closed`] after close, or
    /// [`LitecacheError::Execution`] when the store rejects the statement.
    pub fn query_one(
        &self,
        sql: &str,
        params: &[SqlValue],
        not_found: impl Into<Vec<u8>>,
    ) -> Result<Arc<Row>, LitecacheError> {
        self.ensure_ready()?;
        let fingerprint = QueryFingerprint::new(sql, params, ResultShape::SingleRow);
        if let Some(CachedResult::Row(row)) = self.cache.lookup(&fingerprint) {
            return Ok(row);
        }
        let epoch = self.cache.epoch();
        let Some(row) = self.store.query_first(sql, params)? else {
            return Err(LitecacheError::NotFound {
                payload: not_found.into(),
            });
        };
        let row = Arc::new(row);
        self.cache.store_at(epoch, fingerprint, CachedResult::Row(Arc::clone(&row)));
        Ok(row)
    }

    /// Applies a mutation and waits for it to commit.
    ///
    /// # Errors
    ///
    /// Returns [`LitecacheError::Closed`] after close, or
    /// [`LitecacheError::Execution`] when the store rejects the statement.
    pub fn mutate(&self, sql: &str, params: &[SqlValue]) -> Result<Ack, LitecacheError> {
        self.ensure_ready()?;
        Ok(self.writer.submit_blocking(sql, params)?)
    }

    /// Queues a mutation without waiting. Failures are logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns [`LitecacheError::Closed`] when the coordinator no longer
    /// accepts mutations.
    pub fn mutate_async(&self, sql: &str, params: &[SqlValue]) -> Result<(), LitecacheError> {
        self.ensure_ready()?;
        self.writer.submit_async(sql, params)?;
        Ok(())
    }

    /// Clears every memoized result immediately.
    pub fn invalidate(&self) {
        self.cache.clear();
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> CoordinatorState {
        CoordinatorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns the database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a snapshot of cache, writer, and watcher diagnostics.
    #[must_use]
    pub fn stats(&self) -> CoordinatorStatsSnapshot {
        let watcher = self.watch_loop.lock().unwrap_or_else(PoisonError::into_inner).stats();
        CoordinatorStatsSnapshot {
            state: self.state(),
            cache: self.cache.stats(),
            writer: self.writer.stats(),
            watcher,
        }
    }

    /// Fails with [`LitecacheError::Closed`] unless the coordinator is ready.
    fn ensure_ready(&self) -> Result<(), LitecacheError> {
        match self.state() {
            CoordinatorState::Ready => Ok(()),
            CoordinatorState::Opening | CoordinatorState::Closing | CoordinatorState::Closed => {
                Err(LitecacheError::Closed)
            }
        }
    }
}

impl Drop for CacheCoordinator {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            tracing::warn!(error = %err, "litecache coordinator close on drop failed");
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs the init script once on an empty store, closing the store on failure.
fn initialize_store(
    store: &dyn Store,
    init_script: &str,
    path: &Path,
) -> Result<(), LitecacheError> {
    match store.initialize(init_script) {
        Ok(true) => {
            tracing::info!(path = %path.display(), "created new database");
            Ok(())
        }
        Ok(false) => Ok(()),
        Err(err) => {
            let _ = store.close();
            Err(LitecacheError::open(err))
        }
    }
}
