//! Staging table lifecycle.
//!
//! A staging table is a structural clone of the target without key
//! constraints, owned by exactly one upsert call. Names are claimed in a
//! [`StagingRegistry`] for the duration of the call so two callers sharing a
//! registry cannot stage into the same table.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use sqlx::AnyConnection;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::identifier::{fit_identifier, validate_identifier, MAX_STAGING_NAME_LENGTH};
use crate::core::schema::Table;
use crate::core::traits::Dialect;
use crate::drivers::DialectImpl;
use crate::error::{Result, UpsertError};
use crate::inspect;
use crate::session;

/// Caller-owned set of in-flight staging table names.
///
/// Cloning shares the same set. Each [`UpsertEngine`](crate::UpsertEngine)
/// owns one; pass your own through
/// [`UpsertOptions::registry`](crate::UpsertOptions::registry) to share
/// isolation between engines.
#[derive(Debug, Clone, Default)]
pub struct StagingRegistry {
    names: Arc<Mutex<HashSet<String>>>,
}

impl StagingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the set half-updated.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.names.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `name` until the returned guard is dropped.
    pub fn claim(&self, name: &str) -> Result<StagingClaim> {
        if !self.lock().insert(name.to_string()) {
            return Err(UpsertError::schema(format!(
                "staging table name '{}' is already in use by another upsert",
                name
            )));
        }
        Ok(StagingClaim {
            registry: self.clone(),
            name: name.to_string(),
        })
    }

    /// Check whether `name` is currently claimed.
    pub fn contains(&self, name: &str) -> bool {
        self.lock().contains(name)
    }

    /// Number of names currently claimed.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A claimed staging name; released from the registry on drop.
#[derive(Debug)]
pub struct StagingClaim {
    registry: StagingRegistry,
    name: String,
}

impl Drop for StagingClaim {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.name);
    }
}

/// Generate `<prefix>_<UTC yyyymmddHHMMSS>_<8 hex>_<table>`, at most 63 bytes.
pub fn generate_staging_name(prefix: &str, table_name: &str) -> String {
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let simple = Uuid::new_v4().simple().to_string();
    let suffix = &simple[..8];
    let name = format!("{}_{}_{}_{}", prefix, stamp, suffix, table_name);
    fit_identifier(&name, MAX_STAGING_NAME_LENGTH).to_string()
}

/// Handle to a created staging table.
///
/// [`release`](Self::release) must be awaited on every exit path; dropping
/// an unreleased handle only logs a warning, since `Drop` cannot run the
/// asynchronous `DROP TABLE`.
#[must_use = "a staging table must be released on every exit path"]
#[derive(Debug)]
pub struct StagingTable {
    table: Table,
    drop_sql: String,
    released: bool,
    _claim: StagingClaim,
}

impl StagingTable {
    /// Claim `name` and create the staging table for `target`.
    ///
    /// Fails with a schema error if the name is claimed in `registry`, if an
    /// object with that name already exists, or if the DDL is rejected. An
    /// existing object is never dropped: it is not ours.
    pub async fn create(
        conn: &mut AnyConnection,
        dialect: &DialectImpl,
        target: &Table,
        name: String,
        schema: Option<String>,
        registry: &StagingRegistry,
    ) -> Result<Self> {
        validate_identifier(&name)?;
        let claim = registry.claim(&name)?;
        let table = target.staging_clone(name, schema);

        if inspect::table_exists(conn, dialect, table.schema.as_deref(), &table.name).await? {
            return Err(UpsertError::schema(format!(
                "staging table {} already exists",
                table.full_name()
            )));
        }

        let ddl = dialect.build_staging_ddl(&table);
        session::execute_sql(conn, &ddl).await.map_err(|e| {
            UpsertError::schema_db(
                format!("cannot create staging table {}", table.full_name()),
                e,
            )
        })?;
        debug!("Created staging table {}", table.full_name());

        Ok(Self {
            drop_sql: dialect.build_drop_staging(&table),
            table,
            released: false,
            _claim: claim,
        })
    }

    /// Staging table description (target columns, staging name).
    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn name(&self) -> &str {
        &self.table.name
    }

    /// Drop the staging table. Idempotent (`DROP .. IF EXISTS`).
    pub async fn release(&mut self, conn: &mut AnyConnection) -> std::result::Result<(), sqlx::Error> {
        session::execute_sql(conn, &self.drop_sql).await?;
        self.released = true;
        debug!("Dropped staging table {}", self.table.full_name());
        Ok(())
    }

    /// Drop the staging table after a failure; errors are logged, never returned.
    pub async fn release_best_effort(&mut self, conn: &mut AnyConnection) {
        if let Err(e) = self.release(conn).await {
            warn!(
                "Failed to drop staging table {} during cleanup: {}",
                self.table.full_name(),
                e
            );
            self.released = true;
        }
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for StagingTable {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                "Staging table {} was not released; it may need manual cleanup",
                self.table.full_name()
            );
        }
    }
}
