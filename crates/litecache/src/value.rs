// crates/litecache/src/value.rs
// ============================================================================
// Module: SQL Values
// Description: Owned scalar values, rows, and row sets exchanged with SQLite.
// Purpose: Provide hashable parameter and result values for cache keys.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! [`SqlValue`] mirrors the five `SQLite` storage classes. Unlike
//! `rusqlite::types::Value` it implements [`Eq`] and [`Hash`] so bound
//! parameters can participate in a [`crate::QueryFingerprint`]. Reals compare
//! and hash by bit pattern, which keeps equality and hashing consistent (a
//! `NaN` parameter matches itself).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::hash::Hash;
use std::hash::Hasher;

use rusqlite::ToSql;
use rusqlite::types::ToSqlOutput;
use rusqlite::types::ValueRef;

// ============================================================================
// SECTION: Values
// ============================================================================

/// Owned `SQLite` scalar value.
#[derive(Debug, Clone)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes, including TEXT values that are not valid UTF-8.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Returns the text payload, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the integer payload, if this is an integer value.
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the blob payload, if this is a blob value.
    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(value) => Some(value),
            _ => None,
        }
    }

    /// Returns true for SQL `NULL`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Builds an owned value from a borrowed column value.
    ///
    /// `SQLite` does not enforce UTF-8 in TEXT columns. Text that is not valid
    /// UTF-8 is returned as [`SqlValue::Blob`] holding the stored bytes
    /// unchanged.
    pub(crate) fn from_value_ref(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(value) => Self::Integer(value),
            ValueRef::Real(value) => Self::Real(value),
            ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => Self::Text(text.to_string()),
                Err(_) => Self::Blob(bytes.to_vec()),
            },
            ValueRef::Blob(bytes) => Self::Blob(bytes.to_vec()),
        }
    }
}

impl PartialEq for SqlValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Integer(left), Self::Integer(right)) => left == right,
            (Self::Real(left), Self::Real(right)) => left.to_bits() == right.to_bits(),
            (Self::Text(left), Self::Text(right)) => left == right,
            (Self::Blob(left), Self::Blob(right)) => left == right,
            _ => false,
        }
    }
}

impl Eq for SqlValue {}

impl Hash for SqlValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Integer(value) => value.hash(state),
            Self::Real(value) => value.to_bits().hash(state),
            Self::Text(value) => value.hash(state),
            Self::Blob(value) => value.hash(state),
        }
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            Self::Null => ValueRef::Null,
            Self::Integer(value) => ValueRef::Integer(*value),
            Self::Real(value) => ValueRef::Real(*value),
            Self::Text(value) => ValueRef::Text(value.as_bytes()),
            Self::Blob(value) => ValueRef::Blob(value),
        };
        Ok(ToSqlOutput::Borrowed(value))
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Blob(value)
    }
}

impl From<&[u8]> for SqlValue {
    fn from(value: &[u8]) -> Self {
        Self::Blob(value.to_vec())
    }
}

impl<T: Into<Self>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// ============================================================================
// SECTION: Rows
// ============================================================================

/// One result row as an ordered sequence of values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Row(Vec<SqlValue>);

impl Row {
    /// Creates a row from column values in select order.
    #[must_use]
    pub const fn new(values: Vec<SqlValue>) -> Self {
        Self(values)
    }

    /// Returns the value at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.0.get(index)
    }

    /// Returns all column values.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.0
    }

    /// Returns the number of columns.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true when the row has no columns.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consumes the row, returning its values.
    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.0
    }

    /// Copies a `rusqlite` row into an owned row.
    pub(crate) fn from_sqlite(row: &rusqlite::Row<'_>, columns: usize) -> rusqlite::Result<Self> {
        let mut values = Vec::with_capacity(columns);
        for index in 0 .. columns {
            values.push(SqlValue::from_value_ref(row.get_ref(index)?));
        }
        Ok(Self(values))
    }
}

impl From<Vec<SqlValue>> for Row {
    fn from(values: Vec<SqlValue>) -> Self {
        Self(values)
    }
}

/// Ordered set of result rows.
pub type RowSet = Vec<Row>;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn reals_compare_by_bits() {
        assert_eq!(SqlValue::Real(f64::NAN), SqlValue::Real(f64::NAN));
        assert_ne!(SqlValue::Real(0.0), SqlValue::Real(-0.0));
    }

    #[test]
    fn storage_classes_never_collide() {
        let mut seen = HashSet::new();
        seen.insert(SqlValue::Integer(1));
        seen.insert(SqlValue::Real(1.0));
        seen.insert(SqlValue::Text("1".to_string()));
        seen.insert(SqlValue::Blob(vec![1]));
        seen.insert(SqlValue::Null);
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn invalid_utf8_text_keeps_its_bytes() {
        let value = SqlValue::from_value_ref(ValueRef::Text(&[0xFF, 0x61]));
        assert_eq!(value.as_blob(), Some(&[0xFF, 0x61][..]));
        assert_eq!(value.as_text(), None);
        let value = SqlValue::from_value_ref(ValueRef::Text(b"fred"));
        assert_eq!(value.as_text(), Some("fred"));
    }

    #[test]
    fn row_accessors_expose_values_in_order() {
        let row = Row::new(vec![SqlValue::from(1_i64), SqlValue::from(&b"ab"[..])]);
        assert_eq!(row.len(), 2);
        assert_eq!(row.values()[0].as_integer(), Some(1));
        assert_eq!(row.get(1).and_then(SqlValue::as_blob), Some(&b"ab"[..]));
        assert_eq!(row.into_values(), vec![SqlValue::Integer(1), SqlValue::Blob(b"ab".to_vec())]);
    }

    #[test]
    fn option_maps_none_to_null() {
        assert!(SqlValue::from(None::<i64>).is_null());
        assert_eq!(SqlValue::from(Some("fred")).as_text(), Some("fred"));
    }
}
