//! Transaction coordination for one upsert call.
//!
//! Self-managed calls own a pooled connection and a transaction:
//!
//! ```text
//! Idle -> Opened -> Staged -> Detected -> Applied -> Committed
//!           \________\__________\__________\______-> RolledBack
//! ```
//!
//! User-managed calls run on the caller's transaction and never commit,
//! roll back or close it:
//!
//! ```text
//! Idle -> Staged -> Detected -> Applied -> Done
//!    \_______\_________\__________\______-> Failed
//! ```
//!
//! The staging table is dropped on every path. On success it is dropped inside
//! the unit of work; on failure it is dropped after the rollback (self-managed)
//! or right away (user-managed), on the same connection, because MySQL
//! temporary tables are session-scoped and DDL is not transactional
//! everywhere. Cleanup failures are logged and never replace the original error.

use std::fmt;

use sqlx::{Any, AnyConnection, AnyPool, Connection, Transaction};
use tracing::{debug, warn};

use crate::core::schema::Table;
use crate::core::traits::Dialect;
use crate::drivers::DialectImpl;
use crate::error::Result;
use crate::upsert::batch::PreparedBatch;
use crate::upsert::staging::{StagingRegistry, StagingTable};
use crate::upsert::strategy::ConflictPolicy;
use crate::upsert::{detect, loader, UpsertCounts};

/// Who owns the transaction for the duration of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    SelfManaged,
    UserManaged,
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionMode::SelfManaged => f.write_str("self-managed"),
            TransactionMode::UserManaged => f.write_str("user-managed"),
        }
    }
}

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Opened,
    Staged,
    Detected,
    Applied,
    Committed,
    RolledBack,
    Done,
    Failed,
}

impl Phase {
    /// Whether `self -> next` is a legal transition in `mode`.
    pub fn can_advance_to(self, next: Phase, mode: TransactionMode) -> bool {
        use Phase::*;
        match mode {
            TransactionMode::SelfManaged => matches!(
                (self, next),
                (Idle, Opened)
                    | (Opened, Staged)
                    | (Staged, Detected)
                    | (Detected, Applied)
                    | (Applied, Committed)
                    | (Opened | Staged | Detected | Applied, RolledBack)
            ),
            TransactionMode::UserManaged => matches!(
                (self, next),
                (Idle, Staged)
                    | (Staged, Detected)
                    | (Detected, Applied)
                    | (Applied, Done)
                    | (Idle | Staged | Detected | Applied, Failed)
            ),
        }
    }

    /// Terminal phases end the call.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Phase::Committed | Phase::RolledBack | Phase::Done | Phase::Failed
        )
    }
}

/// Tracks and logs the phase of one call.
#[derive(Debug)]
pub struct PhaseTracker {
    mode: TransactionMode,
    table: String,
    phase: Phase,
}

impl PhaseTracker {
    pub fn new(mode: TransactionMode, table: impl Into<String>) -> Self {
        Self {
            mode,
            table: table.into(),
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_advance_to(next, self.mode),
            "illegal transition {:?} -> {:?} ({})",
            self.phase,
            next,
            self.mode
        );
        debug!(
            "{} upsert on {}: {:?} -> {:?}",
            self.mode, self.table, self.phase, next
        );
        self.phase = next;
    }
}

/// Everything one call needs once its inputs are validated.
pub(crate) struct UpsertRequest<'a> {
    pub target: &'a Table,
    pub batch: PreparedBatch<'a>,
    pub policy: &'a ConflictPolicy,
    pub staging_name: String,
    pub staging_schema: Option<String>,
    pub registry: &'a StagingRegistry,
    pub max_rows_per_statement: usize,
}

/// Stage, load, detect, apply and drop the staging table on `conn`.
///
/// The created staging table is parked in `slot` so the caller can clean up
/// whatever step fails.
async fn run_steps(
    tracker: &mut PhaseTracker,
    conn: &mut AnyConnection,
    dialect: &DialectImpl,
    req: &UpsertRequest<'_>,
    slot: &mut Option<StagingTable>,
) -> Result<UpsertCounts> {
    let staging = slot.insert(
        StagingTable::create(
            conn,
            dialect,
            req.target,
            req.staging_name.clone(),
            req.staging_schema.clone(),
            req.registry,
        )
        .await?,
    );
    loader::load(conn, dialect, staging, &req.batch, req.max_rows_per_statement).await?;
    tracker.advance(Phase::Staged);

    let summary = detect::detect(conn, dialect, req.target, staging).await?;
    tracker.advance(Phase::Detected);

    let counts = req
        .policy
        .apply(conn, dialect, req.target, staging, summary)
        .await?;
    tracker.advance(Phase::Applied);

    staging.release(conn).await?;
    Ok(counts)
}

/// Run a call on a pooled connection inside its own transaction.
pub(crate) async fn run_self_managed(
    pool: &AnyPool,
    dialect: &DialectImpl,
    req: UpsertRequest<'_>,
) -> Result<UpsertCounts> {
    let mut tracker = PhaseTracker::new(TransactionMode::SelfManaged, req.target.full_name());
    let mut conn = pool.acquire().await?;
    let mut slot: Option<StagingTable> = None;

    let mut tx = match dialect.begin_statement() {
        Some(begin) => Connection::begin_with(&mut *conn, begin).await?,
        None => Connection::begin(&mut *conn).await?,
    };
    tracker.advance(Phase::Opened);

    let result = run_steps(&mut tracker, &mut tx, dialect, &req, &mut slot).await;
    let result = match result {
        Ok(counts) => tx.commit().await.map(|_| counts).map_err(Into::into),
        Err(e) => {
            if let Err(rb) = tx.rollback().await {
                warn!(
                    "Rollback of upsert on {} failed: {}",
                    req.target.full_name(),
                    rb
                );
            }
            Err(e)
        }
    };

    match result {
        Ok(counts) => {
            tracker.advance(Phase::Committed);
            Ok(counts)
        }
        Err(e) => {
            tracker.advance(Phase::RolledBack);
            if let Some(staging) = slot.as_mut() {
                staging.release_best_effort(&mut conn).await;
            }
            Err(e)
        }
    }
}

/// Run a call on the caller's transaction. Never commits or rolls back.
///
/// After an error the transaction may be aborted by the server (PostgreSQL
/// refuses further statements until rollback); the caller must roll back.
pub(crate) async fn run_user_managed(
    tx: &mut Transaction<'_, Any>,
    dialect: &DialectImpl,
    req: UpsertRequest<'_>,
) -> Result<UpsertCounts> {
    let mut tracker = PhaseTracker::new(TransactionMode::UserManaged, req.target.full_name());
    let conn: &mut AnyConnection = tx;
    let mut slot: Option<StagingTable> = None;

    match run_steps(&mut tracker, conn, dialect, &req, &mut slot).await {
        Ok(counts) => {
            tracker.advance(Phase::Done);
            Ok(counts)
        }
        Err(e) => {
            tracker.advance(Phase::Failed);
            if let Some(staging) = slot.as_mut() {
                staging.release_best_effort(conn).await;
            }
            Err(e)
        }
    }
}
