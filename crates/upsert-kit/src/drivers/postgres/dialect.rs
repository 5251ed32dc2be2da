//! PostgreSQL SQL dialect (Strategy pattern).
//!
//! Provides PostgreSQL-specific SQL syntax for identifier quoting, typed
//! parameter placeholders, staging DDL and catalog introspection.

use crate::core::identifier::quote_double;
use crate::core::schema::{Column, Table};
use crate::core::traits::{like_prefix_pattern, Dialect, Statement};
use crate::core::value::SqlValue;

/// Wire protocol limit on bind parameters (Int16 count).
const POSTGRES_MAX_BIND_PARAMS: usize = 65535;

/// PostgreSQL dialect implementation.
///
/// Implements the Strategy pattern for SQL syntax differences.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_double(name)
    }

    fn max_bind_params(&self) -> usize {
        POSTGRES_MAX_BIND_PARAMS
    }

    /// `$n::type`: timestamps and dates are bound as text, so every
    /// placeholder is cast to the declared column type.
    fn placeholder(&self, index: usize, column: &Column) -> String {
        format!("${}::{}", index, column.data_type)
    }

    // UNLOGGED skips WAL for the staging rows; they never need crash recovery.
    fn build_staging_ddl(&self, staging: &Table) -> String {
        format!(
            "CREATE UNLOGGED TABLE {} ({})",
            self.qualified(staging),
            self.column_definitions(staging)
        )
    }

    fn build_drop_staging(&self, staging: &Table) -> String {
        format!("DROP TABLE IF EXISTS {}", self.qualified(staging))
    }

    fn build_table_exists(&self, schema: Option<&str>, name: &str) -> Statement {
        Statement::with_params(
            "SELECT COUNT(*) FROM pg_catalog.pg_class c \
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
             WHERE c.relname::text = $1 AND n.nspname::text = COALESCE($2::text, current_schema())",
            vec![SqlValue::from(name), SqlValue::from(schema)],
        )
    }

    fn build_describe_table(&self, schema: Option<&str>, name: &str) -> Statement {
        Statement::with_params(
            "SELECT a.attname::text, \
                    pg_catalog.format_type(a.atttypid, a.atttypmod), \
                    CASE WHEN a.attnotnull THEN 1 ELSE 0 END::int8, \
                    pg_catalog.pg_get_expr(d.adbin, d.adrelid), \
                    COALESCE((SELECT k.ord FROM unnest(i.indkey::int2[]) WITH ORDINALITY AS k(attnum, ord) \
                              WHERE k.attnum = a.attnum), 0)::int8 \
             FROM pg_catalog.pg_attribute a \
             JOIN pg_catalog.pg_class c ON c.oid = a.attrelid \
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
             LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum \
             LEFT JOIN pg_catalog.pg_index i ON i.indrelid = c.oid AND i.indisprimary \
             WHERE c.relname::text = $1 \
               AND n.nspname::text = COALESCE($2::text, current_schema()) \
               AND a.attnum > 0 AND NOT a.attisdropped \
             ORDER BY a.attnum",
            vec![SqlValue::from(name), SqlValue::from(schema)],
        )
    }

    fn build_list_tables(&self, schema: Option<&str>, prefix: &str) -> Statement {
        Statement::with_params(
            "SELECT c.relname::text FROM pg_catalog.pg_class c \
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
             WHERE c.relkind IN ('r', 'p') AND c.relname::text LIKE $1 \
               AND n.nspname::text = COALESCE($2::text, current_schema()) \
             ORDER BY 1",
            vec![SqlValue::Text(like_prefix_pattern(prefix)), SqlValue::from(schema)],
        )
    }
}
