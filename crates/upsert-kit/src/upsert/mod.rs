//! Bulk upsert engine.
//!
//! One call stages a candidate batch into an ephemeral table, counts which
//! staged keys already exist in the target, and resolves them with one of three
//! policies using a constant number of set-based statements:
//!
//! 1. existence check + `CREATE` of the staging table
//! 2. multi-row `INSERT` into staging (chunked only past the engine's limits)
//! 3. conflict-detect query
//! 4. one or two policy statements
//! 5. `DROP` of the staging table
//!
//! # Transactions
//!
//! By default the engine takes a pooled connection, opens a transaction and
//! commits on success or rolls back on failure. Passing
//! [`UpsertOptions::transaction`] runs every statement on the caller's
//! transaction instead; the engine then never commits or rolls back, and an
//! error may leave the transaction aborted: roll it back.
//!
//! # Duplicate keys
//!
//! Records sharing a primary key inside one batch collapse to the last
//! occurrence before loading. Deduplicate upstream for a different tie-break.

pub mod batch;
pub mod coordinator;
pub mod detect;
pub mod loader;
pub mod staging;
pub mod strategy;

use sqlx::any::AnyPoolOptions;
use sqlx::{Any, AnyPool, Transaction};
use tracing::{debug, info};

use crate::config::UpsertConfig;
use crate::core::identifier::validate_identifier;
use crate::core::schema::Table;
use crate::core::traits::Dialect;
use crate::core::value::Record;
use crate::drivers::DialectImpl;
use crate::error::Result;

use batch::PreparedBatch;
use coordinator::UpsertRequest;
use staging::{generate_staging_name, StagingRegistry};
use strategy::ConflictPolicy;

/// Result of a successful upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    /// Conflicting rows: skipped (ignore), replaced (replace) or merged (merge).
    pub policy_rows: u64,

    /// Rows whose key was not in the target.
    pub inserted_rows: u64,
}

impl From<UpsertCounts> for (u64, u64) {
    fn from(counts: UpsertCounts) -> Self {
        (counts.policy_rows, counts.inserted_rows)
    }
}

/// Optional per-call settings.
///
/// ```ignore
/// let counts = engine
///     .insert_or_ignore(&table, &records, UpsertOptions::new().transaction(&mut tx))
///     .await?;
/// ```
#[derive(Default)]
pub struct UpsertOptions<'a, 'c> {
    registry: Option<&'a StagingRegistry>,
    staging_name: Option<String>,
    transaction: Option<&'a mut Transaction<'c, Any>>,
}

impl<'a, 'c> UpsertOptions<'a, 'c> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the staging name in `registry` instead of the engine's own.
    pub fn registry(mut self, registry: &'a StagingRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use `name` verbatim for the staging table. The caller guarantees it is
    /// unique among concurrent calls.
    pub fn staging_name(mut self, name: impl Into<String>) -> Self {
        self.staging_name = Some(name.into());
        self
    }

    /// Run on the caller's transaction (user-managed mode).
    ///
    /// The transaction carries its connection, so connection and transaction
    /// are always supplied together.
    pub fn transaction(mut self, tx: &'a mut Transaction<'c, Any>) -> Self {
        self.transaction = Some(tx);
        self
    }

    /// Whether a caller transaction was supplied.
    pub fn is_user_managed(&self) -> bool {
        self.transaction.is_some()
    }
}

/// Bulk upsert engine bound to one target database.
#[derive(Debug, Clone)]
pub struct UpsertEngine {
    pool: AnyPool,
    dialect: DialectImpl,
    config: UpsertConfig,
    registry: StagingRegistry,
}

impl UpsertEngine {
    /// Validate `config` and open a connection pool to its database.
    pub async fn connect(config: &UpsertConfig) -> Result<Self> {
        config.validate()?;
        sqlx::any::install_default_drivers();

        let dialect = DialectImpl::from_url(&config.database.url)?;
        let pool = AnyPoolOptions::new()
            .max_connections(config.database.max_connections)
            .acquire_timeout(config.database.acquire_timeout())
            .connect(&config.database.url)
            .await?;

        info!(
            "Connected to {} ({} dialect, pool size {})",
            config.database.redacted_url(),
            dialect.name(),
            config.database.max_connections
        );
        Ok(Self::from_pool(pool, dialect, config.clone()))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: AnyPool, dialect: DialectImpl, config: UpsertConfig) -> Self {
        Self {
            pool,
            dialect,
            config,
            registry: StagingRegistry::new(),
        }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> &DialectImpl {
        &self.dialect
    }

    pub fn config(&self) -> &UpsertConfig {
        &self.config
    }

    /// The engine's default staging registry.
    pub fn registry(&self) -> &StagingRegistry {
        &self.registry
    }

    /// Insert rows whose key is absent; leave conflicting target rows untouched.
    ///
    /// Returns `(skipped, inserted)` counts.
    pub async fn insert_or_ignore(
        &self,
        table: &Table,
        records: &[Record],
        options: UpsertOptions<'_, '_>,
    ) -> Result<UpsertCounts> {
        self.upsert(table, records, ConflictPolicy::Ignore, options)
            .await
    }

    /// Replace conflicting target rows entirely (every column takes the staged
    /// value) and insert the rest.
    ///
    /// Returns `(replaced, inserted)` counts.
    pub async fn insert_or_replace(
        &self,
        table: &Table,
        records: &[Record],
        options: UpsertOptions<'_, '_>,
    ) -> Result<UpsertCounts> {
        self.upsert(table, records, ConflictPolicy::Replace, options)
            .await
    }

    /// Overwrite only `columns` of conflicting target rows and insert the rest
    /// with every staged column.
    ///
    /// `columns` must be non-empty, name target columns outside the primary
    /// key, and be supplied by the batch. Returns `(merged, inserted)` counts.
    pub async fn insert_or_merge(
        &self,
        table: &Table,
        records: &[Record],
        columns: &[&str],
        options: UpsertOptions<'_, '_>,
    ) -> Result<UpsertCounts> {
        let policy = ConflictPolicy::Merge(columns.iter().map(|c| c.to_string()).collect());
        self.upsert(table, records, policy, options).await
    }

    async fn upsert(
        &self,
        table: &Table,
        records: &[Record],
        policy: ConflictPolicy,
        options: UpsertOptions<'_, '_>,
    ) -> Result<UpsertCounts> {
        table.validate()?;
        let batch = PreparedBatch::prepare(table, records)?;
        policy.validate(table, &batch)?;

        if batch.is_empty() {
            debug!("{} upsert on {}: empty batch", policy, table.full_name());
            return Ok(UpsertCounts::default());
        }

        let staging_name = match options.staging_name {
            Some(name) => {
                validate_identifier(&name)?;
                name
            }
            None => generate_staging_name(&self.config.staging.prefix, &table.name),
        };
        let collapsed = batch.collapsed;

        let req = UpsertRequest {
            target: table,
            batch,
            policy: &policy,
            staging_name,
            staging_schema: self.config.staging.schema.clone(),
            registry: options.registry.unwrap_or(&self.registry),
            max_rows_per_statement: self.config.load.max_rows_per_statement,
        };

        let result = match options.transaction {
            Some(tx) => {
                let dialect = DialectImpl::from_backend_name(tx.backend_name())?;
                coordinator::run_user_managed(tx, &dialect, req).await
            }
            None => coordinator::run_self_managed(&self.pool, &self.dialect, req).await,
        };

        match &result {
            Ok(counts) => info!(
                "{} upsert on {}: {} conflicting, {} inserted ({} duplicate records collapsed)",
                policy,
                table.full_name(),
                counts.policy_rows,
                counts.inserted_rows,
                collapsed
            ),
            Err(e) => debug!(
                "{} upsert on {} failed ({}): {}",
                policy,
                table.full_name(),
                e.kind(),
                e
            ),
        }
        result
    }
}
