// crates/litecache/src/cache.rs
// ============================================================================
// Module: Result Cache
// Description: In-memory memoization of read results keyed by fingerprint.
// Purpose: Serve repeated reads without touching the store until invalidated.
// Dependencies: crate::fingerprint, crate::value
// ============================================================================

//! ## Overview
//! [`ResultCache`] is the single read-path memoization authority. All state
//! sits behind one mutex, so `lookup`, `store`, and `clear` are each atomic
//! with respect to one another and no caller manages locks directly.
//!
//! Every `clear` advances an epoch. Readers capture the epoch before a cache
//! miss goes to the store and fill through [`ResultCache::store_at`], which
//! discards the fill if a clear happened while the read was in flight. A
//! result that predates the triggering write is therefore never reabsorbed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::fingerprint::QueryFingerprint;
use crate::value::Row;
use crate::value::RowSet;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Memoized read result.
///
/// # Invariants
/// - Immutable once stored; clones share the same allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedResult {
    /// Result of a single-row read.
    Row(Arc<Row>),
    /// Result of a row-set read.
    Rows(Arc<RowSet>),
}

impl CachedResult {
    /// Returns the single row, if this is a single-row result.
    #[must_use]
    pub fn as_row(&self) -> Option<&Row> {
        match self {
            Self::Row(row) => Some(row),
            Self::Rows(_) => None,
        }
    }

    /// Returns the row set, if this is a row-set result.
    #[must_use]
    pub fn as_rows(&self) -> Option<&RowSet> {
        match self {
            Self::Rows(rows) => Some(rows),
            Self::Row(_) => None,
        }
    }
}

impl From<Row> for CachedResult {
    fn from(row: Row) -> Self {
        Self::Row(Arc::new(row))
    }
}

impl From<RowSet> for CachedResult {
    fn from(rows: RowSet) -> Self {
        Self::Rows(Arc::new(rows))
    }
}

/// Invalidation epoch observed before a cache fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CacheEpoch(u64);

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    /// Entries currently memoized.
    pub entries: usize,
    /// Lookups answered from memory.
    pub hits: u64,
    /// Lookups that fell through to the store.
    pub misses: u64,
    /// Entries written.
    pub inserts: u64,
    /// Fills discarded because a clear raced them.
    pub stale_fills: u64,
    /// Completed clear passes.
    pub clears: u64,
}

/// Mutex-guarded cache state.
#[derive(Debug, Default)]
struct CacheState {
    /// Fingerprint to result mapping.
    entries: HashMap<QueryFingerprint, CachedResult>,
    /// Number of clears performed so far.
    epoch: u64,
}

/// Thread-safe fingerprint to result map.
#[derive(Debug, Default)]
pub struct ResultCache {
    /// Entries and epoch, guarded together.
    state: Mutex<CacheState>,
    /// Lookup hit counter.
    hits: AtomicU64,
    /// Lookup miss counter.
    misses: AtomicU64,
    /// Insert counter.
    inserts: AtomicU64,
    /// Discarded fill counter.
    stale_fills: AtomicU64,
}

// ============================================================================
// SECTION: Implementation
// ============================================================================

impl ResultCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the memoized result for `fingerprint`, if any.
    #[must_use]
    pub fn lookup(&self, fingerprint: &QueryFingerprint) -> Option<CachedResult> {
        let found = self.lock().entries.get(fingerprint).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Returns the current invalidation epoch.
    #[must_use]
    pub fn epoch(&self) -> CacheEpoch {
        CacheEpoch(self.lock().epoch)
    }

    /// Stores `result`, overwriting any entry under the same fingerprint.
    pub fn store(&self, fingerprint: QueryFingerprint, result: CachedResult) {
        self.lock().entries.insert(fingerprint, result);
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    /// Stores `result` only if no clear happened since `epoch` was observed.
    ///
    /// Returns true when the entry was stored.
    pub fn store_at(
        &self,
        epoch: CacheEpoch,
        fingerprint: QueryFingerprint,
        result: CachedResult,
    ) -> bool {
        let mut state = self.lock();
        if state.epoch != epoch.0 {
            drop(state);
            self.stale_fills.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        state.entries.insert(fingerprint, result);
        drop(state);
        self.inserts.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Empties the cache and advances the epoch.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.epoch = state.epoch.wrapping_add(1);
    }

    /// Returns the number of memoized entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns true when nothing is memoized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Returns a snapshot of cache counters.
    #[must_use]
    pub fn stats(&self) -> CacheStatsSnapshot {
        let (entries, clears) = {
            let state = self.lock();
            (state.entries.len(), state.epoch)
        };
        CacheStatsSnapshot {
            entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            stale_fills: self.stale_fills.load(Ordering::Relaxed),
            clears,
        }
    }

    /// Locks cache state, recovering from poisoning.
    ///
    /// Each critical section is a single map operation, so a panicking holder
    /// cannot leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::ResultShape;
    use crate::value::SqlValue;

    fn key(name: &str) -> QueryFingerprint {
        QueryFingerprint::new("SELECT * FROM t WHERE k=?", &[SqlValue::from(name)], ResultShape::RowSet)
    }

    fn rows(name: &str) -> CachedResult {
        CachedResult::from(vec![Row::new(vec![SqlValue::from(name)])])
    }

    #[test]
    fn fill_after_clear_is_discarded() {
        let cache = ResultCache::new();
        let epoch = cache.epoch();
        cache.clear();
        assert!(!cache.store_at(epoch, key("fred"), rows("fred")));
        assert!(cache.lookup(&key("fred")).is_none());
        assert_eq!(cache.stats().stale_fills, 1);
    }

    #[test]
    fn fill_with_current_epoch_is_kept() {
        let cache = ResultCache::new();
        let epoch = cache.epoch();
        assert!(cache.store_at(epoch, key("fred"), rows("fred")));
        assert_eq!(cache.lookup(&key("fred")), Some(rows("fred")));
    }

    #[test]
    fn shape_accessors_match_variant() {
        let single = CachedResult::from(Row::new(vec![SqlValue::from("fred")]));
        assert_eq!(single.as_row().and_then(|row| row.get(0)), Some(&SqlValue::from("fred")));
        assert!(single.as_rows().is_none());
        let many = rows("fred");
        assert_eq!(many.as_rows().map(Vec::len), Some(1));
        assert!(many.as_row().is_none());
    }

    #[test]
    fn stats_count_hits_and_misses() {
        let cache = ResultCache::new();
        let _ = cache.lookup(&key("a"));
        cache.store(key("a"), rows("a"));
        let _ = cache.lookup(&key("a"));
        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.inserts, 1);
        assert_eq!(stats.clears, 1);
        assert_eq!(stats.entries, 0);
    }
}
