//! Conflict detection between the staging table and the target.
//!
//! One set-based query joins staging to target on the primary key; only two
//! counts cross the wire. The join itself is rebuilt by every policy
//! statement, so the conflict set never needs to be materialized.

use sqlx::{AnyConnection, Row};
use tracing::debug;

use crate::core::schema::Table;
use crate::core::traits::{Dialect, Statement};
use crate::drivers::DialectImpl;
use crate::error::Result;
use crate::session;
use crate::upsert::staging::StagingTable;

/// Sizes of the conflict set and of the staged batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictSummary {
    /// Rows in the staging table.
    pub staged: u64,

    /// Staged rows whose key exists in the target.
    pub conflicts: u64,
}

impl ConflictSummary {
    /// Staged rows whose key does not exist in the target.
    #[must_use]
    pub fn new_rows(&self) -> u64 {
        self.staged.saturating_sub(self.conflicts)
    }
}

/// Count staged rows and conflicting keys.
pub async fn detect(
    conn: &mut AnyConnection,
    dialect: &DialectImpl,
    target: &Table,
    staging: &StagingTable,
) -> Result<ConflictSummary> {
    let stmt = Statement::new(dialect.build_conflict_detect(target, staging.table()));
    let row = session::fetch_one(conn, &stmt).await?;

    let staged: i64 = row.try_get(0)?;
    let conflicts: i64 = row.try_get(1)?;
    let summary = ConflictSummary {
        staged: staged.max(0) as u64,
        conflicts: conflicts.max(0) as u64,
    };

    debug!(
        "{}: {} staged, {} conflicting, {} new",
        target.full_name(),
        summary.staged,
        summary.conflicts,
        summary.new_rows()
    );
    Ok(summary)
}
