// crates/litecache/src/config.rs
// ============================================================================
// Module: Coordinator Configuration
// Description: Store, watcher, and invalidation settings for a coordinator.
// Purpose: Describe how a coordinator opens SQLite and detects changes.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`CoordinatorConfig`] is deserializable so it can be embedded in a TOML
//! file (see the `litecache-config` crate) and carries serde defaults for
//! every tunable. [`CoordinatorConfig::validate`] is called on open and
//! rejects out-of-range values before any connection is made.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::store::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// File extension appended to store names.
pub const STORE_FILE_EXTENSION: &str = "sqlite3";
/// Upper bound on the watcher wait timeout, bounding shutdown latency.
pub const MAX_WATCH_TIMEOUT_MS: u64 = 2_000;
/// Maximum number of reader connections.
pub const MAX_READ_POOL_SIZE: usize = 64;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Modes
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    /// WAL journal mode; readers never block on the writer.
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl JournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Built-in change detection backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WatchBackend {
    /// Poll `PRAGMA data_version` on a dedicated connection.
    #[default]
    DataVersion,
    /// Poll size and mtime of the database and WAL files.
    FileStat,
}

/// Who clears the result cache after a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationMode {
    /// Only the change watcher clears the cache.
    #[default]
    Watcher,
    /// The writer clears after each commit; the watcher still clears for
    /// external writes.
    CommitAndWatcher,
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for a [`crate::CacheCoordinator`].
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `read_pool_size` is in `1..=MAX_READ_POOL_SIZE`.
/// - `watch_timeout_ms` is in `1..=MAX_WATCH_TIMEOUT_MS`.
/// - `watch_poll_interval_ms` is nonzero and no greater than `watch_timeout_ms`.
/// - Unknown keys are rejected when deserializing.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: JournalMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SyncMode,
    /// Number of reader connections serving cache misses.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
    /// Change detection backend.
    #[serde(default)]
    pub watch_backend: WatchBackend,
    /// Maximum time the watcher blocks before checking for shutdown (ms).
    #[serde(default = "default_watch_timeout_ms")]
    pub watch_timeout_ms: u64,
    /// Poll period used by the built-in watchers (ms).
    #[serde(default = "default_watch_poll_interval_ms")]
    pub watch_poll_interval_ms: u64,
    /// Cache invalidation discipline.
    #[serde(default)]
    pub invalidation: InvalidationMode,
}

impl CoordinatorConfig {
    /// Creates a configuration for `path` with default settings.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: JournalMode::default(),
            sync_mode: SyncMode::default(),
            read_pool_size: default_read_pool_size(),
            watch_backend: WatchBackend::default(),
            watch_timeout_ms: default_watch_timeout_ms(),
            watch_poll_interval_ms: default_watch_poll_interval_ms(),
            invalidation: InvalidationMode::default(),
        }
    }

    /// Creates a configuration for `<directory>/<name>.sqlite3`.
    #[must_use]
    pub fn for_location(directory: &Path, name: &str) -> Self {
        Self::new(store_file_path(directory, name))
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when a setting is out of range.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.read_pool_size == 0 || self.read_pool_size > MAX_READ_POOL_SIZE {
            return Err(StoreError::Invalid(format!(
                "read_pool_size out of range: {} (max {MAX_READ_POOL_SIZE})",
                self.read_pool_size
            )));
        }
        if self.watch_timeout_ms == 0 || self.watch_timeout_ms > MAX_WATCH_TIMEOUT_MS {
            return Err(StoreError::Invalid(format!(
                "watch_timeout_ms out of range: {} (max {MAX_WATCH_TIMEOUT_MS})",
                self.watch_timeout_ms
            )));
        }
        if self.watch_poll_interval_ms == 0 {
            return Err(StoreError::Invalid(
                "watch_poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.watch_poll_interval_ms > self.watch_timeout_ms {
            return Err(StoreError::Invalid(
                "watch_poll_interval_ms must not exceed watch_timeout_ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns `<directory>/<name>.sqlite3`.
#[must_use]
pub fn store_file_path(directory: &Path, name: &str) -> PathBuf {
    directory.join(format!("{name}.{STORE_FILE_EXTENSION}"))
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default reader pool size.
const fn default_read_pool_size() -> usize {
    4
}

/// Returns the default watcher wait timeout in milliseconds.
const fn default_watch_timeout_ms() -> u64 {
    1_000
}

/// Returns the default watcher poll period in milliseconds.
const fn default_watch_poll_interval_ms() -> u64 {
    20
}
