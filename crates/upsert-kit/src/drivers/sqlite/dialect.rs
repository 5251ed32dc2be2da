//! SQLite SQL dialect (Strategy pattern).

use crate::core::identifier::quote_double;
use crate::core::schema::{Column, Table};
use crate::core::traits::{like_prefix_pattern, Dialect, Statement};
use crate::core::value::SqlValue;

/// Default `SQLITE_MAX_VARIABLE_NUMBER` since SQLite 3.32.
const SQLITE_MAX_BIND_PARAMS: usize = 32766;

/// SQLite dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Create a new SQLite dialect instance.
    pub fn new() -> Self {
        Self
    }

    /// `sqlite_master` of the given attached schema.
    fn master_table(&self, schema: Option<&str>) -> String {
        match schema {
            Some(s) => format!("{}.sqlite_master", self.quote_ident(s)),
            None => "sqlite_master".to_string(),
        }
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_double(name)
    }

    fn max_bind_params(&self) -> usize {
        SQLITE_MAX_BIND_PARAMS
    }

    fn placeholder(&self, _index: usize, _column: &Column) -> String {
        "?".to_string()
    }

    fn build_staging_ddl(&self, staging: &Table) -> String {
        format!(
            "CREATE TABLE {} ({})",
            self.qualified(staging),
            self.column_definitions(staging)
        )
    }

    fn build_drop_staging(&self, staging: &Table) -> String {
        format!("DROP TABLE IF EXISTS {}", self.qualified(staging))
    }

    // A deferred transaction that reads before its first write gets
    // SQLITE_BUSY on the write instead of waiting out the busy timeout.
    fn begin_statement(&self) -> Option<&'static str> {
        Some("BEGIN IMMEDIATE")
    }

    fn build_table_exists(&self, schema: Option<&str>, name: &str) -> Statement {
        Statement::with_params(
            format!(
                "SELECT COUNT(*) FROM {} WHERE type IN ('table', 'view') AND name = ?",
                self.master_table(schema)
            ),
            vec![SqlValue::from(name)],
        )
    }

    fn build_describe_table(&self, schema: Option<&str>, name: &str) -> Statement {
        let cols = "SELECT name, type, \"notnull\", dflt_value, pk";
        match schema {
            Some(s) => Statement::with_params(
                format!("{} FROM pragma_table_info(?, ?) ORDER BY cid", cols),
                vec![SqlValue::from(name), SqlValue::from(s)],
            ),
            None => Statement::with_params(
                format!("{} FROM pragma_table_info(?) ORDER BY cid", cols),
                vec![SqlValue::from(name)],
            ),
        }
    }

    fn build_list_tables(&self, schema: Option<&str>, prefix: &str) -> Statement {
        Statement::with_params(
            format!(
                "SELECT name FROM {} WHERE type = 'table' AND name LIKE ? ESCAPE '\\' ORDER BY name",
                self.master_table(schema)
            ),
            vec![SqlValue::Text(like_prefix_pattern(prefix))],
        )
    }
}
