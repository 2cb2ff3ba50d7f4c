// crates/litecache-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared helpers for config loading tests.
// Purpose: Write config files into scratch directories.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::fs;
use std::path::PathBuf;

use litecache_config::ConfigError;
use tempfile::TempDir;

/// Init script used by the config suites.
pub const INIT_SCRIPT: &str = "CREATE TABLE t (k TEXT NOT NULL);";

/// Writes `contents` to `<dir>/<name>` and returns the path.
pub fn write_file(dir: &TempDir, name: &str, contents: &str) -> Result<PathBuf, String> {
    let path = dir.path().join(name);
    fs::write(&path, contents).map_err(|err| err.to_string())?;
    Ok(path)
}

/// Checks that `result` failed with a message containing `needle`.
pub fn assert_error_contains<T>(result: Result<T, ConfigError>, needle: &str) -> Result<(), String> {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected config error".to_string()),
    }
}
