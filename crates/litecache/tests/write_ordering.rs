// crates/litecache/tests/write_ordering.rs
// ============================================================================
// Module: Write Ordering Tests
// Description: Serialized application of mutations from many threads.
// Purpose: Validate that the store applies mutations in submission order.
// Dependencies: litecache, tempfile
// ============================================================================

//! ## Overview
//! Mutations are applied by one writer thread in the order they were
//! accepted. These tests observe that order through autoincrement ids and
//! through non-commutative updates.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::thread;

use common::fast_config;
use litecache::CacheCoordinator;
use litecache::InvalidationMode;
use litecache::SqlValue;
use tempfile::TempDir;

// ============================================================================
// SECTION: Tests
// ============================================================================

const LOG_SCHEMA: &str =
    "CREATE TABLE log (id INTEGER PRIMARY KEY AUTOINCREMENT, writer TEXT NOT NULL);";

#[test]
fn concurrent_blocking_mutations_commit_in_sequence_order() {
    let dir = TempDir::new().unwrap();
    let mut config = fast_config(&dir);
    config.invalidation = InvalidationMode::CommitAndWatcher;
    let cache = Arc::new(CacheCoordinator::open_with_config(config, LOG_SCHEMA).unwrap());

    let handles: Vec<_> = (0 .. 8)
        .map(|worker| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                (0 .. 25)
                    .map(|step| {
                        let tag = SqlValue::from(format!("{worker}:{step}"));
                        let ack =
                            cache.mutate("INSERT INTO log (writer) VALUES (?)", &[tag]).unwrap();
                        (ack.sequence, format!("{worker}:{step}"))
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let mut acked: Vec<(u64, String)> =
        handles.into_iter().flat_map(|handle| handle.join().unwrap()).collect();
    acked.sort();

    let rows = cache.query("SELECT writer FROM log ORDER BY id", &[]).unwrap();
    let stored: Vec<String> = rows
        .iter()
        .map(|row| row.get(0).and_then(SqlValue::as_text).unwrap().to_string())
        .collect();
    let expected: Vec<String> = acked.into_iter().map(|(_, tag)| tag).collect();
    assert_eq!(stored, expected);
    cache.close().unwrap();
}

#[test]
fn async_updates_apply_in_submission_order() {
    let dir = TempDir::new().unwrap();
    let cache = CacheCoordinator::open_with_config(
        fast_config(&dir),
        "CREATE TABLE counter (v INTEGER NOT NULL); INSERT INTO counter VALUES (1);",
    )
    .unwrap();

    let mut expected: i64 = 1;
    for step in 0_i64 .. 40 {
        if step % 2 == 0 {
            cache.mutate_async("UPDATE counter SET v = v + ?", &[SqlValue::from(step)]).unwrap();
            expected += step;
        } else {
            cache.mutate_async("UPDATE counter SET v = v * 2 % 1000003", &[]).unwrap();
            expected = expected * 2 % 1_000_003;
        }
    }
    cache.close().unwrap();

    let reopened = CacheCoordinator::open_with_config(fast_config(&dir), "").unwrap();
    let row = reopened.query_one("SELECT v FROM counter", &[], "counter missing").unwrap();
    assert_eq!(row.get(0).and_then(SqlValue::as_integer), Some(expected));
    reopened.close().unwrap();
}

#[test]
fn sequences_are_strictly_increasing() {
    let dir = TempDir::new().unwrap();
    let cache = CacheCoordinator::open_with_config(fast_config(&dir), LOG_SCHEMA).unwrap();
    let first = cache.mutate("INSERT INTO log (writer) VALUES ('a')", &[]).unwrap();
    cache.mutate_async("INSERT INTO log (writer) VALUES ('b')", &[]).unwrap();
    let third = cache.mutate("INSERT INTO log (writer) VALUES ('c')", &[]).unwrap();
    assert_eq!(third.sequence, first.sequence + 2);
    cache.close().unwrap();
}
