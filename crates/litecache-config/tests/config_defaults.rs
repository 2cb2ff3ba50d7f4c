//! Config defaults tests for litecache-config.
// crates/litecache-config/tests/config_defaults.rs
// =============================================================================
// Module: Config Defaults Tests
// Description: Validate defaults applied to a minimal config.
// Purpose: Ensure a config naming only the store path is valid and complete.
// =============================================================================

use litecache::InvalidationMode;
use litecache::JournalMode;
use litecache::SyncMode;
use litecache::WatchBackend;
use litecache_config::LitecacheConfig;

type TestResult = Result<(), String>;

fn minimal_config() -> Result<LitecacheConfig, String> {
    LitecacheConfig::from_toml_str("[store]\npath = \"/tmp/app.sqlite3\"\n")
        .map_err(|err| err.to_string())
}

#[test]
fn minimal_config_validates() -> TestResult {
    let config = minimal_config()?;
    config.validate().map_err(|err| err.to_string())
}

#[test]
fn store_defaults_match_coordinator_defaults() -> TestResult {
    let config = minimal_config()?;
    let store = &config.store;
    if store.journal_mode != JournalMode::Wal || store.sync_mode != SyncMode::Full {
        return Err("store should default to wal journaling with full sync".to_string());
    }
    if store.busy_timeout_ms != 5_000 || store.read_pool_size != 4 {
        return Err(format!(
            "unexpected busy_timeout_ms={} read_pool_size={}",
            store.busy_timeout_ms, store.read_pool_size
        ));
    }
    if store.watch_backend != WatchBackend::DataVersion {
        return Err("watch_backend should default to data_version".to_string());
    }
    if store.invalidation != InvalidationMode::Watcher {
        return Err("invalidation should default to watcher".to_string());
    }
    if store.watch_timeout_ms != 1_000 || store.watch_poll_interval_ms != 20 {
        return Err("unexpected watcher timing defaults".to_string());
    }
    Ok(())
}

#[test]
fn missing_init_yields_empty_script() -> TestResult {
    let config = minimal_config()?;
    let script = config.init_script().map_err(|err| err.to_string())?;
    if !script.is_empty() {
        return Err("init script should be empty without an [init] section".to_string());
    }
    Ok(())
}

#[test]
fn enum_settings_parse_in_snake_case() -> TestResult {
    let config = LitecacheConfig::from_toml_str(
        "[store]\npath = \"/tmp/app.sqlite3\"\njournal_mode = \"delete\"\nsync_mode = \
         \"normal\"\nwatch_backend = \"file_stat\"\ninvalidation = \"commit_and_watcher\"\n",
    )
    .map_err(|err| err.to_string())?;
    if config.store.journal_mode != JournalMode::Delete
        || config.store.sync_mode != SyncMode::Normal
        || config.store.watch_backend != WatchBackend::FileStat
        || config.store.invalidation != InvalidationMode::CommitAndWatcher
    {
        return Err("enum settings did not round into the expected variants".to_string());
    }
    Ok(())
}
