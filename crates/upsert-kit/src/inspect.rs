//! Live schema introspection.
//!
//! The upsert pipeline works from a caller-built [`Table`]; these helpers are
//! for callers that want to build it from the database instead, and for
//! verifying that no staging table outlives a call.

use sqlx::{AnyConnection, Row};
use tracing::debug;

use crate::core::schema::{Column, Table};
use crate::core::traits::Dialect;
use crate::drivers::DialectImpl;
use crate::error::{Result, UpsertError};
use crate::session;

/// Check whether a table (or view) named `name` exists in `schema`.
pub async fn table_exists(
    conn: &mut AnyConnection,
    dialect: &DialectImpl,
    schema: Option<&str>,
    name: &str,
) -> Result<bool> {
    let stmt = dialect.build_table_exists(schema, name);
    let row = session::fetch_one(conn, &stmt).await?;
    let count: i64 = row.try_get(0)?;
    Ok(count > 0)
}

/// Build a [`Table`] description from the live catalog.
///
/// Fails with a schema error if the table does not exist or the catalog
/// cannot be read.
pub async fn describe_table(
    conn: &mut AnyConnection,
    dialect: &DialectImpl,
    schema: Option<&str>,
    name: &str,
) -> Result<Table> {
    let label = match schema {
        Some(s) => format!("{}.{}", s, name),
        None => name.to_string(),
    };

    let stmt = dialect.build_describe_table(schema, name);
    let rows = session::fetch_all(conn, &stmt)
        .await
        .map_err(|e| UpsertError::schema_db(format!("cannot introspect table {}", label), e))?;

    if rows.is_empty() {
        return Err(UpsertError::schema(format!(
            "table {} not found or has no columns",
            label
        )));
    }

    let mut table = Table::new(name);
    table.schema = schema.map(str::to_string);
    let mut keyed: Vec<(i64, String)> = Vec::new();

    for row in &rows {
        let decode = |e| UpsertError::schema_db(format!("cannot decode catalog row for {}", label), e);
        let col_name: String = row.try_get(0).map_err(decode)?;
        let data_type: String = row.try_get(1).map_err(decode)?;
        let not_null: i64 = row.try_get(2).map_err(decode)?;
        let default: Option<String> = row.try_get(3).map_err(decode)?;
        let pk_pos: i64 = row.try_get(4).map_err(decode)?;

        if pk_pos > 0 {
            keyed.push((pk_pos, col_name.clone()));
        }
        // SQLite reports INTEGER PRIMARY KEY columns as nullable
        let mut column = Column::new(col_name, data_type);
        column.is_nullable = not_null == 0 && pk_pos == 0;
        column.default = default;
        table.columns.push(column);
    }

    keyed.sort_by_key(|(pos, _)| *pos);
    table.primary_key = keyed.into_iter().map(|(_, name)| name).collect();

    debug!(
        "Described {}: {} columns, primary key {:?}",
        label,
        table.columns.len(),
        table.primary_key
    );
    Ok(table)
}

/// List table names starting with `prefix` (matched literally).
pub async fn list_tables(
    conn: &mut AnyConnection,
    dialect: &DialectImpl,
    schema: Option<&str>,
    prefix: &str,
) -> Result<Vec<String>> {
    let stmt = dialect.build_list_tables(schema, prefix);
    let rows = session::fetch_all(conn, &stmt).await?;
    rows.iter()
        .map(|row| row.try_get::<String, _>(0).map_err(UpsertError::from))
        .collect()
}
