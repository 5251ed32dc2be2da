//! SQL values, candidate records and primary-key tuples.
//!
//! Values are always owned: a candidate batch is handed over by the caller,
//! validated, collapsed and bound once, so there is no source buffer to borrow from.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};

/// Text layout used to bind timestamps (fraction only printed when non-zero).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Text layout used to bind dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single SQL value supplied by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL.
    Null,

    /// Boolean value.
    Bool(bool),

    /// Signed integer (widened to 64 bits).
    Int(i64),

    /// Double precision float.
    Float(f64),

    /// Text data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// Timestamp without timezone.
    Timestamp(NaiveDateTime),

    /// Date without time component.
    Date(NaiveDate),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Timestamps and dates rendered the way they are bound.
    #[must_use]
    pub fn temporal_text(&self) -> Option<String> {
        match self {
            SqlValue::Timestamp(v) => Some(v.format(TIMESTAMP_FORMAT).to_string()),
            SqlValue::Date(v) => Some(v.format(DATE_FORMAT).to_string()),
            _ => None,
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i16> for SqlValue {
    fn from(v: i16) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f32> for SqlValue {
    fn from(v: f32) -> Self {
        SqlValue::Float(f64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<&[u8]> for SqlValue {
    fn from(v: &[u8]) -> Self {
        SqlValue::Bytes(v.to_vec())
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// One candidate record: column name to value.
///
/// Columns not present in the record are left to the staging column default.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    values: BTreeMap<String, SqlValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.values.insert(column.into(), value.into());
        self
    }

    /// Set a column value, returning the previous one.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Option<SqlValue> {
        self.values.insert(column.into(), value.into())
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.values.get(column)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    /// Column names in sorted order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Record
where
    K: Into<String>,
    V: Into<SqlValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Hashable form of one key column value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyPart {
    Bool(bool),
    Int(i64),
    /// Bit pattern; `0.0` and `-0.0` are normalized.
    Float(u64),
    Text(String),
    Bytes(Vec<u8>),
    Timestamp(NaiveDateTime),
    Date(NaiveDate),
}

/// Primary-key tuple of a record, usable as a map key.
///
/// Built only from non-NULL values; NULL keys are rejected before collapse.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyValue(Vec<KeyPart>);

impl KeyValue {
    /// Build the key tuple from values in key-column order.
    ///
    /// Returns `None` if any value is NULL.
    pub fn from_values<'a, I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a SqlValue>,
    {
        let parts = values
            .into_iter()
            .map(|v| match v {
                SqlValue::Null => None,
                SqlValue::Bool(b) => Some(KeyPart::Bool(*b)),
                SqlValue::Int(i) => Some(KeyPart::Int(*i)),
                SqlValue::Float(f) => {
                    let f = if *f == 0.0 { 0.0 } else { *f };
                    Some(KeyPart::Float(f.to_bits()))
                }
                SqlValue::Text(s) => Some(KeyPart::Text(s.clone())),
                SqlValue::Bytes(b) => Some(KeyPart::Bytes(b.clone())),
                SqlValue::Timestamp(t) => Some(KeyPart::Timestamp(*t)),
                SqlValue::Date(d) => Some(KeyPart::Date(*d)),
            })
            .collect::<Option<Vec<_>>>()?;
        Some(KeyValue(parts))
    }

    /// Number of key columns.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.0.len()
    }
}
