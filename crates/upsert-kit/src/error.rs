//! Error types for bulk upsert operations.

use sqlx::error::DatabaseError;
use sqlx::mysql::MySqlDatabaseError;
use sqlx::postgres::PgDatabaseError;
use sqlx::sqlite::SqliteError;
use thiserror::Error;

/// Main error type for upsert operations.
///
/// Every variant maps to one failing step of the pipeline. Errors raised after
/// the staging table exists are only returned once best-effort cleanup has run.
#[derive(Error, Debug)]
pub enum UpsertError {
    /// Invalid call shape: bad merge columns, malformed batch, bad config values.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Staging name collision, or the target schema could not be introspected.
    #[error("Schema error: {message}")]
    Schema {
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// Bulk load into the staging table failed.
    #[error("Bulk load into staging table {table} failed: {message}")]
    Load {
        table: String,
        message: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// A set-based statement of the chosen conflict policy failed.
    #[error("{policy} policy failed on table {table}: {source}")]
    PolicyExecution {
        policy: &'static str,
        table: String,
        #[source]
        source: sqlx::Error,
    },

    /// Connection lost, transaction aborted by the server, pool exhausted, etc.
    #[error("Database error: {0}")]
    Infrastructure(#[from] sqlx::Error),

    /// IO error (config file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl UpsertError {
    /// Create a Schema error without an underlying database error.
    pub fn schema(message: impl Into<String>) -> Self {
        UpsertError::Schema {
            message: message.into(),
            source: None,
        }
    }

    /// Create a Schema error wrapping the database error that caused it.
    ///
    /// Connection, lock and aborted-transaction failures stay `Infrastructure`.
    pub fn schema_db(message: impl Into<String>, source: sqlx::Error) -> Self {
        if is_infrastructure(&source) {
            return UpsertError::Infrastructure(source);
        }
        UpsertError::Schema {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a Load error wrapping the database error that caused it.
    pub fn load(table: impl Into<String>, source: sqlx::Error) -> Self {
        if is_infrastructure(&source) {
            return UpsertError::Infrastructure(source);
        }
        let message = source.to_string();
        UpsertError::Load {
            table: table.into(),
            message,
            source: Some(source),
        }
    }

    /// Create a PolicyExecution error for a failed policy statement.
    pub fn policy(policy: &'static str, table: impl Into<String>, source: sqlx::Error) -> Self {
        if is_infrastructure(&source) {
            return UpsertError::Infrastructure(source);
        }
        UpsertError::PolicyExecution {
            policy,
            table: table.into(),
            source,
        }
    }

    /// Short name of the error kind, used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            UpsertError::Configuration(_) => "configuration",
            UpsertError::Schema { .. } => "schema",
            UpsertError::Load { .. } => "load",
            UpsertError::PolicyExecution { .. } => "policy_execution",
            UpsertError::Infrastructure(_) => "infrastructure",
            UpsertError::Io(_) | UpsertError::Yaml(_) => "config_file",
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Whether `err` comes from the connection, the pool, lock contention or a
/// transaction the server gave up on, rather than from the statement itself.
pub(crate) fn is_infrastructure(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => {
            if let Some(e) = db.try_downcast_ref::<SqliteError>() {
                e.code().is_some_and(|code| sqlite_code_is_infrastructure(&code))
            } else if let Some(e) = db.try_downcast_ref::<PgDatabaseError>() {
                postgres_code_is_infrastructure(e.code())
            } else if let Some(e) = db.try_downcast_ref::<MySqlDatabaseError>() {
                mysql_number_is_infrastructure(e.number())
            } else {
                false
            }
        }
        _ => false,
    }
}

/// SQLite reports extended result codes; the primary code is the low byte.
fn sqlite_code_is_infrastructure(code: &str) -> bool {
    const BUSY: i32 = 5;
    const LOCKED: i32 = 6;
    const IOERR: i32 = 10;
    const FULL: i32 = 13;
    const CANTOPEN: i32 = 14;

    code.parse::<i32>()
        .map(|c| matches!(c & 0xff, BUSY | LOCKED | IOERR | FULL | CANTOPEN))
        .unwrap_or(false)
}

/// SQLSTATE classes 08 (connection), 53 (resources), 57P (operator
/// intervention) plus serialization failure, deadlock and aborted transaction.
fn postgres_code_is_infrastructure(code: &str) -> bool {
    code.starts_with("08")
        || code.starts_with("53")
        || code.starts_with("57P")
        || matches!(code, "40001" | "40P01" | "25P02")
}

/// Lock wait timeout, deadlock, too many connections, server gone/lost.
fn mysql_number_is_infrastructure(number: u16) -> bool {
    matches!(number, 1205 | 1213 | 1040 | 2006 | 2013)
}

/// Result type alias for upsert operations.
pub type Result<T> = std::result::Result<T, UpsertError>;
