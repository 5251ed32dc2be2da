//! # upsert-kit
//!
//! Set-based bulk upsert for SQLite, PostgreSQL and MySQL.
//!
//! A batch of records is staged into an ephemeral table, conflicts with the
//! target's primary key are counted with one join, and one of three policies
//! resolves them:
//!
//! - **Ignore**: keep existing rows, insert new ones
//! - **Replace**: overwrite existing rows entirely, insert new ones
//! - **Merge**: overwrite only the named columns of existing rows, insert new ones
//!
//! Every call runs in one transaction (its own, or the caller's) and drops
//! its staging table on every exit path.
//!
//! ## Example
//!
//! ```rust,no_run
//! use upsert_kit::{Column, Record, Table, UpsertConfig, UpsertEngine, UpsertOptions};
//!
//! #[tokio::main]
//! async fn main() -> upsert_kit::Result<()> {
//!     let config = UpsertConfig::load("upsert.yaml")?;
//!     let engine = UpsertEngine::connect(&config).await?;
//!
//!     let table = Table::new("records")
//!         .column(Column::new("id", "INTEGER").not_null())
//!         .column(Column::new("description", "TEXT"))
//!         .primary_key(["id"]);
//!     let batch = vec![Record::new().with("id", 5).with("description", "E")];
//!
//!     let (skipped, inserted) = engine
//!         .insert_or_ignore(&table, &batch, UpsertOptions::new())
//!         .await?
//!         .into();
//!     println!("{} skipped, {} inserted", skipped, inserted);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod inspect;
pub mod session;
pub mod upsert;

// Re-exports for convenient access
pub use config::{DatabaseConfig, LoadConfig, StagingConfig, UpsertConfig};
pub use self::core::{Column, Dialect, KeyValue, Record, SqlValue, Statement, Table};
pub use drivers::DialectImpl;
pub use error::{Result, UpsertError};
pub use upsert::coordinator::{Phase, TransactionMode};
pub use upsert::staging::StagingRegistry;
pub use upsert::strategy::ConflictPolicy;
pub use upsert::{UpsertCounts, UpsertEngine, UpsertOptions};
