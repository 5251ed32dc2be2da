//! Bulk loading of a prepared batch into the staging table.

use sqlx::AnyConnection;
use tracing::debug;

use crate::core::traits::{Dialect, Statement};
use crate::drivers::DialectImpl;
use crate::error::{Result, UpsertError};
use crate::session;
use crate::upsert::batch::PreparedBatch;
use crate::upsert::staging::StagingTable;

/// Rows per `INSERT` statement: bounded by the engine's bind limit and by
/// `max_rows_per_statement`.
pub fn rows_per_statement(bind_limit: usize, num_cols: usize, max_rows_per_statement: usize) -> usize {
    (bind_limit / num_cols.max(1)).min(max_rows_per_statement).max(1)
}

/// Insert every row of `batch` into `staging`.
///
/// Uses one multi-row statement when the batch fits, otherwise consecutive
/// chunks. Returns the number of rows loaded, which always equals
/// `batch.len()`; a different count reported by the database is a load error.
pub async fn load(
    conn: &mut AnyConnection,
    dialect: &DialectImpl,
    staging: &StagingTable,
    batch: &PreparedBatch<'_>,
    max_rows_per_statement: usize,
) -> Result<u64> {
    let table = staging.table();
    let chunk_size = rows_per_statement(
        dialect.max_bind_params(),
        batch.columns.len(),
        max_rows_per_statement,
    );

    let mut loaded = 0u64;
    let mut chunks = 0usize;
    for chunk in batch.rows.chunks(chunk_size) {
        let sql = dialect.build_bulk_insert(table, &batch.columns, chunk.len());
        let stmt = Statement::with_params(sql, batch.values_for(chunk));
        loaded += session::execute(conn, &stmt)
            .await
            .map_err(|e| UpsertError::load(table.full_name(), e))?;
        chunks += 1;
    }

    let expected = batch.len() as u64;
    if loaded != expected {
        return Err(UpsertError::Load {
            table: table.full_name(),
            message: format!("loaded {} rows, expected {}", loaded, expected),
            source: None,
        });
    }

    debug!(
        "Loaded {} rows into {} in {} statement(s)",
        loaded,
        table.full_name(),
        chunks
    );
    Ok(loaded)
}
