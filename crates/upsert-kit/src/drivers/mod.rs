//! Database driver implementations.
//!
//! This module provides database-specific implementations of the [`Dialect`] trait:
//!
//! - [`sqlite`]: SQLite driver
//! - [`postgres`]: PostgreSQL driver
//! - [`mysql`]: MySQL/MariaDB driver
//!
//! # Static dispatch
//!
//! [`DialectImpl`] wraps the concrete dialects in an enum and forwards every
//! trait method with a `match`, so the pipeline holds a plain value instead of
//! a `Box<dyn Dialect>`.
//!
//! # Adding New Databases
//!
//! 1. Create a new module under `drivers/` with a `dialect.rs`
//! 2. Implement `Dialect`, overriding the default statement shapes the engine rejects
//! 3. Add an enum variant to `DialectImpl` and the URL scheme / backend name mapping

pub mod mysql;
pub mod postgres;
pub mod sqlite;

pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::core::schema::{Column, Table};
use crate::core::traits::{Dialect, Statement};
use crate::error::{Result, UpsertError};

/// Enum-based static dispatch for dialects.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Sqlite(SqliteDialect),
    Postgres(PostgresDialect),
    Mysql(MysqlDialect),
}

macro_rules! dispatch {
    ($self:ident, $d:ident => $call:expr) => {
        match $self {
            DialectImpl::Sqlite($d) => $call,
            DialectImpl::Postgres($d) => $call,
            DialectImpl::Mysql($d) => $call,
        }
    };
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        dispatch!(self, d => d.name())
    }

    fn quote_ident(&self, name: &str) -> String {
        dispatch!(self, d => d.quote_ident(name))
    }

    fn max_bind_params(&self) -> usize {
        dispatch!(self, d => d.max_bind_params())
    }

    fn placeholder(&self, index: usize, column: &Column) -> String {
        dispatch!(self, d => d.placeholder(index, column))
    }

    fn build_staging_ddl(&self, staging: &Table) -> String {
        dispatch!(self, d => d.build_staging_ddl(staging))
    }

    fn build_drop_staging(&self, staging: &Table) -> String {
        dispatch!(self, d => d.build_drop_staging(staging))
    }

    fn build_table_exists(&self, schema: Option<&str>, name: &str) -> Statement {
        dispatch!(self, d => d.build_table_exists(schema, name))
    }

    fn build_describe_table(&self, schema: Option<&str>, name: &str) -> Statement {
        dispatch!(self, d => d.build_describe_table(schema, name))
    }

    fn build_list_tables(&self, schema: Option<&str>, prefix: &str) -> Statement {
        dispatch!(self, d => d.build_list_tables(schema, prefix))
    }

    fn begin_statement(&self) -> Option<&'static str> {
        dispatch!(self, d => d.begin_statement())
    }

    fn build_bulk_insert(&self, staging: &Table, columns: &[&Column], rows: usize) -> String {
        dispatch!(self, d => d.build_bulk_insert(staging, columns, rows))
    }

    fn build_conflict_detect(&self, target: &Table, staging: &Table) -> String {
        dispatch!(self, d => d.build_conflict_detect(target, staging))
    }

    fn build_insert_new(&self, target: &Table, staging: &Table) -> String {
        dispatch!(self, d => d.build_insert_new(target, staging))
    }

    fn build_insert_all(&self, target: &Table, staging: &Table) -> String {
        dispatch!(self, d => d.build_insert_all(target, staging))
    }

    fn build_delete_conflicts(&self, target: &Table, staging: &Table) -> String {
        dispatch!(self, d => d.build_delete_conflicts(target, staging))
    }

    fn build_merge_update(&self, target: &Table, staging: &Table, columns: &[&str]) -> String {
        dispatch!(self, d => d.build_merge_update(target, staging, columns))
    }
}

impl DialectImpl {
    /// Create a dialect implementation from a database type string.
    ///
    /// # Errors
    ///
    /// Returns an error if the database type is not recognized.
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        match db_type.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(DialectImpl::Sqlite(SqliteDialect::new())),
            "postgres" | "postgresql" | "pg" => Ok(DialectImpl::Postgres(PostgresDialect::new())),
            "mysql" | "mariadb" => Ok(DialectImpl::Mysql(MysqlDialect::new())),
            other => Err(UpsertError::Configuration(format!(
                "Unknown database type: '{}'. Supported types: sqlite, postgres, mysql",
                other
            ))),
        }
    }

    /// Pick the dialect from a connection URL scheme (`postgres://...`).
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split_once(':').map(|(s, _)| s).unwrap_or_default();
        if scheme.is_empty() {
            return Err(UpsertError::Configuration(
                "Database URL has no scheme (expected sqlite:, postgres: or mysql:)".to_string(),
            ));
        }
        Self::from_db_type(scheme)
    }

    /// Pick the dialect from `AnyConnection::backend_name()`.
    pub fn from_backend_name(backend: &str) -> Result<Self> {
        match backend {
            "SQLite" => Ok(DialectImpl::Sqlite(SqliteDialect::new())),
            "PostgreSQL" => Ok(DialectImpl::Postgres(PostgresDialect::new())),
            "MySQL" => Ok(DialectImpl::Mysql(MysqlDialect::new())),
            other => Self::from_db_type(other),
        }
    }
}
