//! MySQL SQL dialect implementation.

use crate::core::identifier::quote_backtick;
use crate::core::schema::{Column, Table};
use crate::core::traits::{like_prefix_pattern, Dialect, Statement, STAGING_ALIAS, TARGET_ALIAS};
use crate::core::value::SqlValue;

/// MySQL placeholder limit per prepared statement.
const MYSQL_MAX_PLACEHOLDERS: usize = 65535;

/// MySQL dialect for SQL generation.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        quote_backtick(name)
    }

    fn max_bind_params(&self) -> usize {
        MYSQL_MAX_PLACEHOLDERS
    }

    fn placeholder(&self, _index: usize, _column: &Column) -> String {
        "?".to_string()
    }

    /// TEMPORARY keeps the enclosing transaction open (no implicit commit).
    fn build_staging_ddl(&self, staging: &Table) -> String {
        format!(
            "CREATE TEMPORARY TABLE {} ({})",
            self.qualified(staging),
            self.column_definitions(staging)
        )
    }

    fn build_drop_staging(&self, staging: &Table) -> String {
        format!("DROP TEMPORARY TABLE IF EXISTS {}", self.qualified(staging))
    }

    // Temporary tables are not listed in information_schema; a collision with
    // another temporary table of this session surfaces when CREATE runs.
    fn build_table_exists(&self, schema: Option<&str>, name: &str) -> Statement {
        Statement::with_params(
            "SELECT COUNT(*) FROM information_schema.TABLES \
             WHERE TABLE_NAME = ? AND TABLE_SCHEMA = COALESCE(?, DATABASE())",
            vec![SqlValue::from(name), SqlValue::from(schema)],
        )
    }

    fn build_describe_table(&self, schema: Option<&str>, name: &str) -> Statement {
        Statement::with_params(
            "SELECT CAST(c.COLUMN_NAME AS CHAR), CAST(c.COLUMN_TYPE AS CHAR), \
                    CAST(c.IS_NULLABLE = 'NO' AS SIGNED), \
                    CAST(CASE WHEN c.COLUMN_DEFAULT IS NULL THEN NULL \
                              WHEN c.EXTRA LIKE '%DEFAULT_GENERATED%' THEN c.COLUMN_DEFAULT \
                              ELSE QUOTE(c.COLUMN_DEFAULT) END AS CHAR), \
                    CAST(COALESCE(k.ORDINAL_POSITION, 0) AS SIGNED) \
             FROM information_schema.COLUMNS c \
             LEFT JOIN information_schema.KEY_COLUMN_USAGE k \
               ON k.TABLE_SCHEMA = c.TABLE_SCHEMA AND k.TABLE_NAME = c.TABLE_NAME \
              AND k.COLUMN_NAME = c.COLUMN_NAME AND k.CONSTRAINT_NAME = 'PRIMARY' \
             WHERE c.TABLE_NAME = ? AND c.TABLE_SCHEMA = COALESCE(?, DATABASE()) \
             ORDER BY c.ORDINAL_POSITION",
            vec![SqlValue::from(name), SqlValue::from(schema)],
        )
    }

    fn build_list_tables(&self, schema: Option<&str>, prefix: &str) -> Statement {
        Statement::with_params(
            "SELECT CAST(TABLE_NAME AS CHAR) FROM information_schema.TABLES \
             WHERE TABLE_NAME LIKE ? AND TABLE_SCHEMA = COALESCE(?, DATABASE()) \
             ORDER BY 1",
            vec![SqlValue::Text(like_prefix_pattern(prefix)), SqlValue::from(schema)],
        )
    }

    // MySQL has no DELETE .. AS alias WHERE EXISTS form; use the multi-table delete.
    fn build_delete_conflicts(&self, target: &Table, staging: &Table) -> String {
        format!(
            "DELETE {t} FROM {tgt} AS {t} INNER JOIN {stg} AS {s} ON {on}",
            t = TARGET_ALIAS,
            s = STAGING_ALIAS,
            tgt = self.qualified(target),
            stg = self.qualified(staging),
            on = self.key_join_predicate(target),
        )
    }

    fn build_merge_update(&self, target: &Table, staging: &Table, columns: &[&str]) -> String {
        let set = columns
            .iter()
            .map(|c| {
                let q = self.quote_ident(c);
                format!("{}.{} = {}.{}", TARGET_ALIAS, q, STAGING_ALIAS, q)
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "UPDATE {tgt} AS {t} INNER JOIN {stg} AS {s} ON {on} SET {set}",
            t = TARGET_ALIAS,
            s = STAGING_ALIAS,
            tgt = self.qualified(target),
            stg = self.qualified(staging),
            on = self.key_join_predicate(target),
        )
    }
}
