//! Schema metadata for target and staging tables.
//!
//! A [`Table`] is the explicit, caller-built description of a target relation:
//! column names, declared types, nullability, defaults and primary-key columns.
//! The staging table is cloned from it structurally, so no runtime reflection of
//! the live database is needed (see [`crate::inspect`] when it is wanted anyway).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::identifier::validate_identifier;
use crate::error::{Result, UpsertError};

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Schema name (`None` = connection default: `main`, `public`, current database).
    #[serde(default)]
    pub schema: Option<String>,

    /// Table name.
    pub name: String,

    /// Column definitions in declaration order.
    pub columns: Vec<Column>,

    /// Primary key column names, in key order.
    #[serde(default)]
    pub primary_key: Vec<String>,
}

impl Table {
    /// Start describing a table with no columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
        }
    }

    /// Set the schema the table lives in.
    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Append a column.
    pub fn column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }

    /// Declare the primary key columns (order matters for composite keys).
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Get the qualified table name for messages.
    pub fn full_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }

    /// Check if the table has a primary key.
    pub fn has_pk(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Look up a column by name.
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Check if `name` is one of the primary key columns.
    pub fn is_pk_column(&self, name: &str) -> bool {
        self.primary_key.iter().any(|pk| pk == name)
    }

    /// Primary key columns, in key order.
    pub fn pk_columns(&self) -> Vec<&Column> {
        self.primary_key
            .iter()
            .filter_map(|pk| self.find_column(pk))
            .collect()
    }

    /// Check the description is usable as an upsert target.
    ///
    /// Requires at least one column, unique valid column names, and a primary
    /// key made of declared columns.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name)?;
        if let Some(schema) = &self.schema {
            validate_identifier(schema)?;
        }

        if self.columns.is_empty() {
            return Err(UpsertError::Configuration(format!(
                "Table {} has no columns",
                self.full_name()
            )));
        }

        let mut seen = HashSet::new();
        for col in &self.columns {
            validate_identifier(&col.name)?;
            if !seen.insert(col.name.as_str()) {
                return Err(UpsertError::Configuration(format!(
                    "Table {} declares column '{}' twice",
                    self.full_name(),
                    col.name
                )));
            }
        }

        if !self.has_pk() {
            return Err(UpsertError::Configuration(format!(
                "Table {} has no primary key - upsert requires primary keys",
                self.full_name()
            )));
        }

        for pk in &self.primary_key {
            if !seen.contains(pk.as_str()) {
                return Err(UpsertError::Configuration(format!(
                    "Primary key column '{}' is not a column of {}",
                    pk,
                    self.full_name()
                )));
            }
        }

        Ok(())
    }

    /// Structural clone used for the staging table.
    ///
    /// Same columns, types, nullability and defaults; the primary key list is
    /// carried for join building but never emitted as a constraint.
    pub fn staging_clone(&self, name: impl Into<String>, schema: Option<String>) -> Table {
        Table {
            schema: schema.or_else(|| self.schema.clone()),
            name: name.into(),
            columns: self.columns.clone(),
            primary_key: self.primary_key.clone(),
        }
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Declared type as the engine spells it (e.g., "INTEGER", "varchar(50)", "timestamp").
    pub data_type: String,

    /// Whether the column allows NULL.
    #[serde(default = "default_true")]
    pub is_nullable: bool,

    /// Default expression, copied verbatim into staging DDL.
    #[serde(default)]
    pub default: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Column {
    /// Create a nullable column without default.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            default: None,
        }
    }

    /// Mark the column NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    /// Attach a default expression (e.g., `CURRENT_TIMESTAMP`, `'n/a'`).
    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }
}
