//! Dialect abstraction consumed by the upsert pipeline.
//!
//! The pipeline never spells SQL itself. It asks the [`Dialect`] for a
//! staging DDL, a bulk insert, a conflict-detect query and the policy
//! statements. The default methods hold the ANSI-ish shapes shared by SQLite,
//! PostgreSQL and MySQL; drivers override only where their grammar differs.

use crate::core::schema::{Column, Table};
use crate::core::value::SqlValue;

/// Alias used for the target table in generated statements.
pub const TARGET_ALIAS: &str = "t";

/// Alias used for the staging table in generated statements.
pub const STAGING_ALIAS: &str = "s";

/// A SQL statement plus the values bound to its placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    /// Statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Statement with bound parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// SQL syntax strategy for one database engine.
///
/// # Template Method
///
/// Every `build_*` statement has a default implementation expressed through
/// [`quote_ident`](Dialect::quote_ident) and [`qualified`](Dialect::qualified).
/// Implementations must provide the engine-specific pieces (quoting,
/// placeholders, DDL, introspection) and may override any default.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g., "sqlite", "postgres").
    fn name(&self) -> &str;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_ident(&self, name: &str) -> String;

    /// Maximum number of bound parameters per statement.
    fn max_bind_params(&self) -> usize;

    /// Placeholder for the 1-based parameter `index` that lands in `column`.
    fn placeholder(&self, index: usize, column: &Column) -> String;

    /// `CREATE` statement for the staging table (no key constraints).
    fn build_staging_ddl(&self, staging: &Table) -> String;

    /// Idempotent `DROP` for the staging table.
    fn build_drop_staging(&self, staging: &Table) -> String;

    /// Query returning one `COUNT(*)` row: whether `schema.name` already exists.
    fn build_table_exists(&self, schema: Option<&str>, name: &str) -> Statement;

    /// Query returning one row per column:
    /// `(name, data_type, not_null, default_expr, pk_position)`.
    ///
    /// `not_null` and `pk_position` are integers; `pk_position` is 0 for
    /// non-key columns and 1-based key order otherwise.
    fn build_describe_table(&self, schema: Option<&str>, name: &str) -> Statement;

    /// Query returning the names of tables whose name starts with `prefix`.
    fn build_list_tables(&self, schema: Option<&str>, prefix: &str) -> Statement;

    /// Statement opening a self-managed transaction; `None` uses the driver's
    /// plain `BEGIN`.
    fn begin_statement(&self) -> Option<&'static str> {
        None
    }

    /// Schema-qualified, quoted table name.
    fn qualified(&self, table: &Table) -> String {
        match &table.schema {
            Some(schema) => format!(
                "{}.{}",
                self.quote_ident(schema),
                self.quote_ident(&table.name)
            ),
            None => self.quote_ident(&table.name),
        }
    }

    /// Column definitions shared by every engine's staging DDL.
    fn column_definitions(&self, table: &Table) -> String {
        table
            .columns
            .iter()
            .map(|col| {
                let mut def = format!("{} {}", self.quote_ident(&col.name), col.data_type);
                if !col.is_nullable {
                    def.push_str(" NOT NULL");
                }
                if let Some(default) = &col.default {
                    def.push_str(" DEFAULT ");
                    def.push_str(default);
                }
                def
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Multi-row `INSERT .. VALUES` into the staging table for `rows` rows.
    fn build_bulk_insert(&self, staging: &Table, columns: &[&Column], rows: usize) -> String {
        let col_list = columns
            .iter()
            .map(|c| self.quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");

        let mut index = 0;
        let tuples = (0..rows)
            .map(|_| {
                let slots = columns
                    .iter()
                    .map(|c| {
                        index += 1;
                        self.placeholder(index, c)
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({})", slots)
            })
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.qualified(staging),
            col_list,
            tuples
        )
    }

    /// `s.k1 = t.k1 AND s.k2 = t.k2 ...` over the primary key.
    fn key_join_predicate(&self, target: &Table) -> String {
        target
            .pk_columns()
            .iter()
            .map(|pk| {
                let q = self.quote_ident(&pk.name);
                format!("{}.{} = {}.{}", STAGING_ALIAS, q, TARGET_ALIAS, q)
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// Single row `(staged, conflicts)`: total staged rows and staged rows whose
    /// key already exists in the target.
    fn build_conflict_detect(&self, target: &Table, staging: &Table) -> String {
        format!(
            "SELECT COUNT(*), COUNT({t}.{k0}) FROM {stg} AS {s} LEFT JOIN {tgt} AS {t} ON {on}",
            t = TARGET_ALIAS,
            s = STAGING_ALIAS,
            k0 = self.quote_ident(&target.primary_key[0]),
            stg = self.qualified(staging),
            tgt = self.qualified(target),
            on = self.key_join_predicate(target),
        )
    }

    /// Insert staged rows whose key is absent from the target (anti-join).
    fn build_insert_new(&self, target: &Table, staging: &Table) -> String {
        let cols = quoted_columns(self, target);
        let select = target
            .columns
            .iter()
            .map(|c| format!("{}.{}", STAGING_ALIAS, self.quote_ident(&c.name)))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {tgt} ({cols}) SELECT {select} FROM {stg} AS {s} \
             LEFT JOIN {tgt} AS {t} ON {on} WHERE {t}.{k0} IS NULL",
            tgt = self.qualified(target),
            stg = self.qualified(staging),
            s = STAGING_ALIAS,
            t = TARGET_ALIAS,
            on = self.key_join_predicate(target),
            k0 = self.quote_ident(&target.primary_key[0]),
        )
    }

    /// Insert every staged row into the target.
    fn build_insert_all(&self, target: &Table, staging: &Table) -> String {
        let cols = quoted_columns(self, target);
        format!(
            "INSERT INTO {} ({}) SELECT {} FROM {} AS {}",
            self.qualified(target),
            cols,
            cols,
            self.qualified(staging),
            STAGING_ALIAS
        )
    }

    /// Delete target rows whose key is present in the staging table.
    fn build_delete_conflicts(&self, target: &Table, staging: &Table) -> String {
        format!(
            "DELETE FROM {tgt} AS {t} WHERE EXISTS (SELECT 1 FROM {stg} AS {s} WHERE {on})",
            tgt = self.qualified(target),
            stg = self.qualified(staging),
            t = TARGET_ALIAS,
            s = STAGING_ALIAS,
            on = self.key_join_predicate(target),
        )
    }

    /// Overwrite `columns` of conflicting target rows with the staged values.
    fn build_merge_update(&self, target: &Table, staging: &Table, columns: &[&str]) -> String {
        let set = columns
            .iter()
            .map(|c| {
                let q = self.quote_ident(c);
                format!("{} = {}.{}", q, STAGING_ALIAS, q)
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "UPDATE {tgt} AS {t} SET {set} FROM {stg} AS {s} WHERE {on}",
            tgt = self.qualified(target),
            stg = self.qualified(staging),
            t = TARGET_ALIAS,
            s = STAGING_ALIAS,
            on = self.key_join_predicate(target),
        )
    }
}

fn quoted_columns<D: Dialect + ?Sized>(dialect: &D, table: &Table) -> String {
    table
        .columns
        .iter()
        .map(|c| dialect.quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Escape `%`, `_` and `\` so `prefix` matches literally in a `LIKE` pattern.
pub fn like_prefix_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}
