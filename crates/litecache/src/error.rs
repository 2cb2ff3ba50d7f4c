// crates/litecache/src/error.rs
// ============================================================================
// Module: Coordinator Errors
// Description: Error taxonomy surfaced by the cache coordinator.
// Purpose: Separate fatal open failures, expected misses, store failures, and
//          use-after-close.
// Dependencies: thiserror, crate::store
// ============================================================================

//! ## Overview
//! [`LitecacheError`] is what callers of [`crate::CacheCoordinator`] see.
//! Store-level failures arrive wrapped in [`LitecacheError::Execution`], except
//! [`StoreError::Closed`], which maps to [`LitecacheError::Closed`].

use thiserror::Error;

use crate::store::StoreError;

/// Coordinator errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - `NotFound` carries exactly the payload supplied by the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LitecacheError {
    /// The store could not be opened or initialized. Not retryable.
    #[error("litecache open failed: {0}")]
    Open(String),
    /// `query_one` matched zero rows.
    #[error("litecache row not found: {}", String::from_utf8_lossy(payload))]
    NotFound {
        /// Caller-supplied payload.
        payload: Vec<u8>,
    },
    /// The store rejected a statement.
    #[error("litecache execution failed: {0}")]
    Execution(StoreError),
    /// The coordinator has been closed.
    #[error("litecache coordinator closed")]
    Closed,
}

impl LitecacheError {
    /// Returns the caller payload for a `NotFound` error.
    #[must_use]
    pub fn not_found_payload(&self) -> Option<&[u8]> {
        match self {
            Self::NotFound {
                payload,
            } => Some(payload),
            _ => None,
        }
    }

    /// Builds an open failure from any displayable error.
    pub(crate) fn open(error: impl std::fmt::Display) -> Self {
        Self::Open(error.to_string())
    }
}

impl From<StoreError> for LitecacheError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Closed => Self::Closed,
            other => Self::Execution(other),
        }
    }
}
