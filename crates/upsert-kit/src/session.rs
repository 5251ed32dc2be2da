//! Statement execution on a single `sqlx` Any connection.
//!
//! Every pipeline step goes through these helpers so values are bound in one
//! place. They return the raw `sqlx::Error`; callers decide which
//! [`UpsertError`](crate::error::UpsertError) kind a failure maps to.

use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyConnection};
use tracing::debug;

use crate::core::traits::Statement;
use crate::core::value::SqlValue;

type AnyQuery<'q> = Query<'q, Any, AnyArguments<'q>>;

/// Bind one value. Timestamps and dates travel as text.
fn bind_value<'q>(query: AnyQuery<'q>, value: &SqlValue) -> AnyQuery<'q> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::Int(v) => query.bind(*v),
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
        SqlValue::Bytes(v) => query.bind(v.clone()),
        SqlValue::Timestamp(_) | SqlValue::Date(_) => query.bind(value.temporal_text()),
    }
}

fn prepare(stmt: &Statement) -> AnyQuery<'_> {
    stmt.params
        .iter()
        .fold(sqlx::query(&stmt.sql), |q, v| bind_value(q, v))
}

/// Execute a statement, returning the rows affected.
pub async fn execute(conn: &mut AnyConnection, stmt: &Statement) -> Result<u64, sqlx::Error> {
    debug!("Executing ({} params): {}", stmt.params.len(), stmt.sql);
    let result = prepare(stmt).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// Execute parameterless SQL (DDL, set-based policy statements).
pub async fn execute_sql(conn: &mut AnyConnection, sql: &str) -> Result<u64, sqlx::Error> {
    debug!("Executing: {}", sql);
    let result = sqlx::query(sql).execute(&mut *conn).await?;
    Ok(result.rows_affected())
}

/// Fetch exactly one row.
pub async fn fetch_one(conn: &mut AnyConnection, stmt: &Statement) -> Result<AnyRow, sqlx::Error> {
    debug!("Querying ({} params): {}", stmt.params.len(), stmt.sql);
    prepare(stmt).fetch_one(&mut *conn).await
}

/// Fetch all rows.
pub async fn fetch_all(
    conn: &mut AnyConnection,
    stmt: &Statement,
) -> Result<Vec<AnyRow>, sqlx::Error> {
    debug!("Querying ({} params): {}", stmt.params.len(), stmt.sql);
    prepare(stmt).fetch_all(&mut *conn).await
}
