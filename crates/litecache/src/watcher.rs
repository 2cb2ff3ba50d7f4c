// crates/litecache/src/watcher.rs
// ============================================================================
// Module: Change Watchers
// Description: Store change detection and the cache invalidation loop.
// Purpose: Turn "the store was written" signals into result cache clears.
// Dependencies: rusqlite, thiserror, tracing, crate::cache, crate::config
// ============================================================================

//! ## Overview
//! [`ChangeWatcher`] hides how changes are detected. Two backends ship with
//! the crate and are selected by [`WatchBackend`]:
//! - [`DataVersionWatcher`] polls `PRAGMA data_version` on its own
//!   connection. The value moves whenever any other connection, in this
//!   process or another, commits.
//! - [`FileStatWatcher`] polls size and modification time of the database
//!   file and its `-wal` companion.
//!
//! [`channel_watcher`] builds a third, push-based watcher for applications
//! that already receive OS file notifications and want to forward them.
//!
//! The watch loop runs on its own thread. Each signal clears the whole
//! cache; bursts collapse into one clear. A watcher error puts the loop in
//! degraded mode: it logs, exits, and the cache is no longer invalidated by
//! the watcher.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;

use rusqlite::Connection;
use thiserror::Error;

use crate::cache::ResultCache;
use crate::config::CoordinatorConfig;
use crate::config::WatchBackend;
use crate::store::open_read_connection;

// ============================================================================
// SECTION: Capability
// ============================================================================

/// Result of one bounded wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSignal {
    /// The store changed at least once since the previous signal.
    Changed,
    /// The timeout elapsed with no change.
    Timeout,
}

/// Change watcher errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WatchError {
    /// Filesystem error while inspecting the store.
    #[error("change watcher io error: {0}")]
    Io(String),
    /// `SQLite` error while polling the store.
    #[error("change watcher db error: {0}")]
    Db(String),
    /// The signal source went away.
    #[error("change watcher source disconnected")]
    Disconnected,
}

/// Source of "the backing store was written" signals.
pub trait ChangeWatcher: Send {
    /// Blocks until a change is observed or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError`] when the watcher can no longer observe changes.
    fn wait_for_change(&mut self, timeout: Duration) -> Result<ChangeSignal, WatchError>;

    /// Releases watcher resources. Called once when the watch loop exits.
    fn stop(&mut self) {}
}

/// Builds the built-in watcher selected by `config.watch_backend`.
///
/// # Errors
///
/// Returns [`WatchError`] when the watcher cannot take its initial reading.
pub fn build_watcher(config: &CoordinatorConfig) -> Result<Box<dyn ChangeWatcher>, WatchError> {
    let poll_interval = Duration::from_millis(config.watch_poll_interval_ms);
    match config.watch_backend {
        WatchBackend::DataVersion => {
            Ok(Box::new(DataVersionWatcher::watch(config, poll_interval)?))
        }
        WatchBackend::FileStat => {
            Ok(Box::new(FileStatWatcher::watch(&config.path, poll_interval)?))
        }
    }
}

/// Polls `check` every `poll_interval` until it reports a change or `timeout`
/// elapses.
fn poll_until<F>(
    timeout: Duration,
    poll_interval: Duration,
    mut check: F,
) -> Result<ChangeSignal, WatchError>
where
    F: FnMut() -> Result<bool, WatchError>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if check()? {
            return Ok(ChangeSignal::Changed);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(ChangeSignal::Timeout);
        }
        thread::sleep(poll_interval.min(deadline.saturating_duration_since(now)));
    }
}

// ============================================================================
// SECTION: Data Version Watcher
// ============================================================================

/// Watches `PRAGMA data_version` on a dedicated read-only connection.
pub struct DataVersionWatcher {
    /// Polling connection; `None` after stop.
    connection: Option<Connection>,
    /// Last observed data version.
    last_version: i64,
    /// Poll period.
    poll_interval: Duration,
}

impl DataVersionWatcher {
    /// Opens a polling connection and records the current data version.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Db`] when the connection or pragma fails.
    pub fn watch(config: &CoordinatorConfig, poll_interval: Duration) -> Result<Self, WatchError> {
        let connection =
            open_read_connection(config).map_err(|err| WatchError::Db(err.to_string()))?;
        let last_version = read_data_version(&connection)?;
        Ok(Self {
            connection: Some(connection),
            last_version,
            poll_interval,
        })
    }
}

impl ChangeWatcher for DataVersionWatcher {
    fn wait_for_change(&mut self, timeout: Duration) -> Result<ChangeSignal, WatchError> {
        let Some(connection) = self.connection.as_ref() else {
            return Err(WatchError::Disconnected);
        };
        let last_version = &mut self.last_version;
        poll_until(timeout, self.poll_interval, || {
            let version = read_data_version(connection)?;
            if version == *last_version {
                return Ok(false);
            }
            *last_version = version;
            Ok(true)
        })
    }

    fn stop(&mut self) {
        if let Some(connection) = self.connection.take()
            && let Err((_, err)) = connection.close()
        {
            tracing::debug!(error = %err, "data version watcher connection close failed");
        }
    }
}

/// Reads `PRAGMA data_version`.
fn read_data_version(connection: &Connection) -> Result<i64, WatchError> {
    connection
        .query_row("PRAGMA data_version", [], |row| row.get(0))
        .map_err(|err| WatchError::Db(err.to_string()))
}

// ============================================================================
// SECTION: File Stat Watcher
// ============================================================================

/// Size and modification time of one file; `None` when it does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    /// File length in bytes.
    len: u64,
    /// Last modification time, when the platform reports one.
    modified: Option<SystemTime>,
}

/// Watches file metadata of the database and its write-ahead log.
pub struct FileStatWatcher {
    /// Watched files.
    paths: Vec<PathBuf>,
    /// Last stamp per watched file.
    stamps: Vec<Option<FileStamp>>,
    /// Poll period.
    poll_interval: Duration,
}

impl FileStatWatcher {
    /// Records initial metadata for `path` and `path-wal`.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Io`] when metadata cannot be read.
    pub fn watch(path: &Path, poll_interval: Duration) -> Result<Self, WatchError> {
        let mut wal = OsString::from(path.as_os_str());
        wal.push("-wal");
        let paths = vec![path.to_path_buf(), PathBuf::from(wal)];
        let stamps = paths.iter().map(|path| file_stamp(path)).collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            paths,
            stamps,
            poll_interval,
        })
    }
}

impl ChangeWatcher for FileStatWatcher {
    fn wait_for_change(&mut self, timeout: Duration) -> Result<ChangeSignal, WatchError> {
        let paths = &self.paths;
        let stamps = &mut self.stamps;
        poll_until(timeout, self.poll_interval, || {
            let mut changed = false;
            for (path, last) in paths.iter().zip(stamps.iter_mut()) {
                let current = file_stamp(path)?;
                if current != *last {
                    *last = current;
                    changed = true;
                }
            }
            Ok(changed)
        })
    }
}

/// Reads the stamp for `path`, treating a missing file as `None`.
fn file_stamp(path: &Path) -> Result<Option<FileStamp>, WatchError> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(Some(FileStamp {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        })),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(WatchError::Io(err.to_string())),
    }
}

// ============================================================================
// SECTION: Channel Watcher
// ============================================================================

/// Sending half of a [`ChannelWatcher`].
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    /// Signal sender.
    sender: mpsc::Sender<()>,
}

impl ChangeNotifier {
    /// Signals a change. Returns false once the watcher is gone.
    pub fn notify(&self) -> bool {
        self.sender.send(()).is_ok()
    }
}

/// Push-based watcher fed by [`ChangeNotifier`] handles.
///
/// Dropping every notifier disconnects the watcher, which the watch loop
/// treats as a lost signal source.
#[derive(Debug)]
pub struct ChannelWatcher {
    /// Signal receiver.
    receiver: mpsc::Receiver<()>,
}

/// Creates a connected notifier and watcher pair.
#[must_use]
pub fn channel_watcher() -> (ChangeNotifier, ChannelWatcher) {
    let (sender, receiver) = mpsc::channel();
    (
        ChangeNotifier {
            sender,
        },
        ChannelWatcher {
            receiver,
        },
    )
}

impl ChangeWatcher for ChannelWatcher {
    fn wait_for_change(&mut self, timeout: Duration) -> Result<ChangeSignal, WatchError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(()) => {
                while self.receiver.try_recv().is_ok() {}
                Ok(ChangeSignal::Changed)
            }
            Err(RecvTimeoutError::Timeout) => Ok(ChangeSignal::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(WatchError::Disconnected),
        }
    }
}

// ============================================================================
// SECTION: Watch Loop
// ============================================================================

/// Point-in-time watch loop state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherStatsSnapshot {
    /// Change signals that produced a cache clear.
    pub signals: u64,
    /// True once the watcher failed and stopped invalidating.
    pub degraded: bool,
}

/// State shared between the watch thread and its owner.
#[derive(Default)]
struct WatchShared {
    /// Set by the owner to request exit.
    shutdown: AtomicBool,
    /// Set by the loop when the watcher failed.
    degraded: AtomicBool,
    /// Signals observed.
    signals: AtomicU64,
}

/// Handle to the running watch thread.
pub(crate) struct WatchLoop {
    /// Shared flags and counters.
    shared: Arc<WatchShared>,
    /// Thread handle; taken on stop.
    handle: Option<JoinHandle<()>>,
}

impl WatchLoop {
    /// Starts a thread that clears `cache` on every signal from `watcher`.
    pub(crate) fn spawn(
        watcher: Box<dyn ChangeWatcher>,
        cache: Arc<ResultCache>,
        timeout: Duration,
    ) -> Result<Self, WatchError> {
        let shared = Arc::new(WatchShared::default());
        let loop_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("litecache-watcher".to_string())
            .spawn(move || watch_loop(watcher, &cache, &loop_shared, timeout))
            .map_err(|err| WatchError::Io(format!("failed to spawn watcher thread: {err}")))?;
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Requests exit and blocks until the thread has finished.
    pub(crate) fn stop(&mut self) -> Result<(), WatchError> {
        self.shared.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| WatchError::Io("watcher thread panicked".to_string()))?;
        }
        Ok(())
    }

    /// Returns a snapshot of loop state.
    pub(crate) fn stats(&self) -> WatcherStatsSnapshot {
        WatcherStatsSnapshot {
            signals: self.shared.signals.load(Ordering::Relaxed),
            degraded: self.shared.degraded.load(Ordering::Acquire),
        }
    }
}

/// Waits for signals until shutdown is requested or the watcher fails.
fn watch_loop(
    mut watcher: Box<dyn ChangeWatcher>,
    cache: &ResultCache,
    shared: &WatchShared,
    timeout: Duration,
) {
    while !shared.shutdown.load(Ordering::Acquire) {
        match watcher.wait_for_change(timeout) {
            Ok(ChangeSignal::Changed) => {
                cache.clear();
                shared.signals.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("store changed; result cache cleared");
            }
            Ok(ChangeSignal::Timeout) => {}
            Err(err) => {
                shared.degraded.store(true, Ordering::Release);
                tracing::warn!(
                    error = %err,
                    "change watcher failed; result cache is no longer invalidated by the watcher"
                );
                break;
            }
        }
    }
    watcher.stop();
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions and helpers are permitted."
    )]

    use super::*;

    #[test]
    fn channel_watcher_coalesces_pending_signals() {
        let (notifier, mut watcher) = channel_watcher();
        for _ in 0 .. 5 {
            assert!(notifier.notify());
        }
        let timeout = Duration::from_millis(50);
        assert_eq!(watcher.wait_for_change(timeout).unwrap(), ChangeSignal::Changed);
        assert_eq!(watcher.wait_for_change(timeout).unwrap(), ChangeSignal::Timeout);
    }

    #[test]
    fn channel_watcher_reports_lost_source() {
        let (notifier, mut watcher) = channel_watcher();
        drop(notifier);
        let err = watcher.wait_for_change(Duration::from_millis(10)).unwrap_err();
        assert_eq!(err, WatchError::Disconnected);
    }

    #[test]
    fn file_stat_watcher_sees_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watched.sqlite3");
        fs::write(&path, b"a").unwrap();
        let mut watcher = FileStatWatcher::watch(&path, Duration::from_millis(5)).unwrap();
        let timeout = Duration::from_millis(30);
        assert_eq!(watcher.wait_for_change(timeout).unwrap(), ChangeSignal::Timeout);
        fs::write(&path, b"ab").unwrap();
        assert_eq!(watcher.wait_for_change(timeout).unwrap(), ChangeSignal::Changed);
    }
}
