// crates/litecache/tests/common/mod.rs
// ============================================================================
// Module: Litecache Test Helpers
// Description: Shared fixtures for coordinator integration tests.
// Purpose: Build fast-polling configs and wait on eventually consistent reads.
// Dependencies: litecache, tempfile
// ============================================================================

#![allow(dead_code, reason = "Each test binary uses a different subset of helpers.")]

use std::time::Duration;
use std::time::Instant;

use litecache::CoordinatorConfig;
use litecache::Row;
use litecache::SqlValue;
use tempfile::TempDir;

/// Init script used by most tests.
pub const INIT_SCRIPT: &str = "CREATE TABLE t (k TEXT NOT NULL);";

/// Upper bound for eventually consistent assertions.
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Returns a config for `<dir>/test.sqlite3` with fast watcher polling.
pub fn fast_config(dir: &TempDir) -> CoordinatorConfig {
    let mut config = CoordinatorConfig::for_location(dir.path(), "test");
    config.watch_timeout_ms = 100;
    config.watch_poll_interval_ms = 5;
    config.busy_timeout_ms = 5_000;
    config
}

/// Polls `condition` until it holds or [`SETTLE_TIMEOUT`] elapses.
pub fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Builds a one-column text row.
pub fn text_row(value: &str) -> Row {
    Row::new(vec![SqlValue::from(value)])
}
