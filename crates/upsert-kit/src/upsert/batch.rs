//! Candidate batch validation and duplicate-key collapse.
//!
//! A batch is checked against the target description before any statement
//! runs. Records inside one batch that share a primary key collapse to the
//! last occurrence, which is the row that gets staged and resolved.

use std::collections::HashSet;

use tracing::debug;

use crate::core::schema::{Column, Table};
use crate::core::value::{KeyValue, Record, SqlValue};
use crate::error::{Result, UpsertError};

/// A validated, collapsed batch ready for loading.
#[derive(Debug)]
pub struct PreparedBatch<'a> {
    /// Columns every record supplies, in target declaration order.
    pub columns: Vec<&'a Column>,

    /// Records to stage, one per distinct key.
    pub rows: Vec<&'a Record>,

    /// Records dropped because a later record had the same key.
    pub collapsed: usize,
}

impl<'a> PreparedBatch<'a> {
    /// Validate `records` against `table` and collapse duplicate keys.
    ///
    /// Fails with a configuration error when a record names a column the
    /// table does not have, misses or nulls a primary-key value, or supplies a
    /// different column set than the first record.
    pub fn prepare(table: &'a Table, records: &'a [Record]) -> Result<Self> {
        let Some(first) = records.first() else {
            return Ok(Self {
                columns: Vec::new(),
                rows: Vec::new(),
                collapsed: 0,
            });
        };

        for name in first.columns() {
            if table.find_column(name).is_none() {
                return Err(UpsertError::Configuration(format!(
                    "Record 0 has column '{}' which is not in table {}",
                    name,
                    table.full_name()
                )));
            }
        }

        let columns: Vec<&Column> = table
            .columns
            .iter()
            .filter(|c| first.contains(&c.name))
            .collect();

        for (idx, record) in records.iter().enumerate() {
            if record.len() != first.len() || !first.columns().all(|c| record.contains(c)) {
                return Err(UpsertError::Configuration(format!(
                    "Record {} supplies columns {:?}, expected {:?} like the first record",
                    idx,
                    record.columns().collect::<Vec<_>>(),
                    first.columns().collect::<Vec<_>>()
                )));
            }
        }

        let mut seen: HashSet<KeyValue> = HashSet::with_capacity(records.len());
        let mut rows: Vec<&Record> = Vec::with_capacity(records.len());
        for (idx, record) in records.iter().enumerate().rev() {
            let key = key_of(table, record).ok_or_else(|| {
                UpsertError::Configuration(format!(
                    "Record {} is missing a value for primary key {:?} of {}",
                    idx,
                    table.primary_key,
                    table.full_name()
                ))
            })?;
            if seen.insert(key) {
                rows.push(record);
            }
        }
        rows.reverse();

        let collapsed = records.len() - rows.len();
        if collapsed > 0 {
            debug!(
                "Collapsed {} duplicate-key records for {} (last occurrence wins)",
                collapsed,
                table.full_name()
            );
        }

        Ok(Self {
            columns,
            rows,
            collapsed,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Check whether every record supplies `column`.
    pub fn supplies(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name == column)
    }

    /// Bind values for `rows`, row-major, in [`columns`](Self::columns) order.
    pub fn values_for(&self, rows: &[&Record]) -> Vec<SqlValue> {
        rows.iter()
            .flat_map(|record| {
                self.columns
                    .iter()
                    .map(move |c| record.get(&c.name).cloned().unwrap_or(SqlValue::Null))
            })
            .collect()
    }
}

/// Primary-key tuple of `record`, `None` if any key value is missing or NULL.
fn key_of(table: &Table, record: &Record) -> Option<KeyValue> {
    let values = table
        .primary_key
        .iter()
        .map(|pk| record.get(pk))
        .collect::<Option<Vec<_>>>()?;
    KeyValue::from_values(values)
}
