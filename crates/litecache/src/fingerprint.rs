// crates/litecache/src/fingerprint.rs
// ============================================================================
// Module: Query Fingerprints
// Description: Structural cache keys for memoized reads.
// Purpose: Identify a read by SQL text, bound parameters, and result shape.
// Dependencies: crate::value
// ============================================================================

//! ## Overview
//! A [`QueryFingerprint`] is the cache key for a memoized read. Two reads hit
//! the same entry only when their SQL text, ordered parameters, and
//! [`ResultShape`] are all identical, so `query` and `query_one` over the same
//! statement never collide.

use crate::value::SqlValue;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Expected result shape of a memoized read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultShape {
    /// Exactly one row (`query_one`).
    SingleRow,
    /// Zero or more rows (`query`).
    RowSet,
}

/// Immutable cache key for a read.
///
/// # Invariants
/// - Equality is structural over all three components.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryFingerprint {
    /// SQL text exactly as submitted.
    sql: String,
    /// Bound parameters in positional order.
    params: Vec<SqlValue>,
    /// Shape tag distinguishing single-row and row-set reads.
    shape: ResultShape,
}

impl QueryFingerprint {
    /// Builds a fingerprint from its components.
    #[must_use]
    pub fn new(sql: impl Into<String>, params: &[SqlValue], shape: ResultShape) -> Self {
        Self {
            sql: sql.into(),
            params: params.to_vec(),
            shape,
        }
    }

    /// Returns the SQL text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Returns the bound parameters.
    #[must_use]
    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// Returns the result shape tag.
    #[must_use]
    pub const fn shape(&self) -> ResultShape {
        self.shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_tag_separates_keys() {
        let params = [SqlValue::from("fred")];
        let one = QueryFingerprint::new("SELECT * FROM t WHERE k=?", &params, ResultShape::SingleRow);
        let many = QueryFingerprint::new("SELECT * FROM t WHERE k=?", &params, ResultShape::RowSet);
        assert_ne!(one, many);
    }

    #[test]
    fn accessors_return_construction_inputs() {
        let fingerprint = QueryFingerprint::new(
            "SELECT * FROM t WHERE k=?",
            &[SqlValue::from("fred")],
            ResultShape::SingleRow,
        );
        assert_eq!(fingerprint.sql(), "SELECT * FROM t WHERE k=?");
        assert_eq!(fingerprint.params(), &[SqlValue::from("fred")][..]);
        assert_eq!(fingerprint.shape(), ResultShape::SingleRow);
    }

    #[test]
    fn parameter_order_matters() {
        let left = QueryFingerprint::new(
            "SELECT ?, ?",
            &[SqlValue::from(1_i64), SqlValue::from(2_i64)],
            ResultShape::RowSet,
        );
        let right = QueryFingerprint::new(
            "SELECT ?, ?",
            &[SqlValue::from(2_i64), SqlValue::from(1_i64)],
            ResultShape::RowSet,
        );
        assert_ne!(left, right);
    }
}
