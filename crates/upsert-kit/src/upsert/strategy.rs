//! Conflict-resolution policies.
//!
//! Each policy is one or two set-based statements joining the staging table
//! to the target on the primary key:
//!
//! | Policy  | Statements                                        | `policy_rows`  |
//! |---------|---------------------------------------------------|----------------|
//! | Ignore  | anti-join insert                                  | rows skipped   |
//! | Replace | delete conflicting target rows, insert all staged | rows replaced  |
//! | Merge   | update named columns of conflicts, anti-join insert | rows merged  |
//!
//! Counts come from the conflict detector. Row counts reported by the
//! statements are only cross-checked and logged when they differ (MySQL, for
//! instance, does not count rows an `UPDATE` left unchanged).

use std::fmt;

use sqlx::AnyConnection;
use tracing::{debug, warn};

use crate::core::schema::Table;
use crate::core::traits::Dialect;
use crate::drivers::DialectImpl;
use crate::error::{Result, UpsertError};
use crate::session;
use crate::upsert::batch::PreparedBatch;
use crate::upsert::detect::ConflictSummary;
use crate::upsert::staging::StagingTable;
use crate::upsert::UpsertCounts;

/// How rows whose key already exists in the target are handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Leave conflicting target rows untouched.
    Ignore,

    /// Replace conflicting target rows entirely with the staged row.
    Replace,

    /// Overwrite only the named columns of conflicting target rows.
    Merge(Vec<String>),
}

impl ConflictPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            ConflictPolicy::Ignore => "ignore",
            ConflictPolicy::Replace => "replace",
            ConflictPolicy::Merge(_) => "merge",
        }
    }

    /// Validate policy parameters against the target and the batch.
    ///
    /// Merge columns must be non-empty, exist in the target, exclude key
    /// columns, appear once, and be supplied by every record of a non-empty
    /// batch (a merge must not overwrite with defaults).
    pub fn validate(&self, table: &Table, batch: &PreparedBatch<'_>) -> Result<()> {
        let ConflictPolicy::Merge(columns) = self else {
            return Ok(());
        };

        if columns.is_empty() {
            return Err(UpsertError::Configuration(
                "merge requires at least one column to overwrite".to_string(),
            ));
        }

        for (idx, col) in columns.iter().enumerate() {
            if table.find_column(col).is_none() {
                return Err(UpsertError::Configuration(format!(
                    "merge column '{}' is not a column of {}",
                    col,
                    table.full_name()
                )));
            }
            if table.is_pk_column(col) {
                return Err(UpsertError::Configuration(format!(
                    "merge column '{}' is part of the primary key of {}",
                    col,
                    table.full_name()
                )));
            }
            if columns[..idx].contains(col) {
                return Err(UpsertError::Configuration(format!(
                    "merge column '{}' is listed twice",
                    col
                )));
            }
            if !batch.is_empty() && !batch.supplies(col) {
                return Err(UpsertError::Configuration(format!(
                    "merge column '{}' is not supplied by the batch",
                    col
                )));
            }
        }

        Ok(())
    }

    /// Run the policy statements and report the resulting counts.
    pub async fn apply(
        &self,
        conn: &mut AnyConnection,
        dialect: &DialectImpl,
        target: &Table,
        staging: &StagingTable,
        summary: ConflictSummary,
    ) -> Result<UpsertCounts> {
        let stg = staging.table();
        match self {
            ConflictPolicy::Ignore => {
                let sql = dialect.build_insert_new(target, stg);
                self.run(conn, target, &sql, summary.new_rows()).await?;
            }
            ConflictPolicy::Replace => {
                let delete = dialect.build_delete_conflicts(target, stg);
                self.run(conn, target, &delete, summary.conflicts).await?;
                let insert = dialect.build_insert_all(target, stg);
                self.run(conn, target, &insert, summary.staged).await?;
            }
            ConflictPolicy::Merge(columns) => {
                let cols: Vec<&str> = columns.iter().map(String::as_str).collect();
                let update = dialect.build_merge_update(target, stg, &cols);
                self.run(conn, target, &update, summary.conflicts).await?;
                let insert = dialect.build_insert_new(target, stg);
                self.run(conn, target, &insert, summary.new_rows()).await?;
            }
        }

        Ok(UpsertCounts {
            policy_rows: summary.conflicts,
            inserted_rows: summary.new_rows(),
        })
    }

    async fn run(
        &self,
        conn: &mut AnyConnection,
        target: &Table,
        sql: &str,
        expected: u64,
    ) -> Result<u64> {
        let affected = session::execute_sql(conn, sql)
            .await
            .map_err(|e| UpsertError::policy(self.name(), target.full_name(), e))?;
        if affected != expected {
            warn!(
                "{} policy on {}: statement reported {} rows, detector expected {}",
                self.name(),
                target.full_name(),
                affected,
                expected
            );
        } else {
            debug!("{} policy on {}: {} rows", self.name(), target.full_name(), affected);
        }
        Ok(affected)
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::Merge(columns) => write!(f, "merge({})", columns.join(", ")),
            other => f.write_str(other.name()),
        }
    }
}
