//! SQLite driver.
//!
//! - [`SqliteDialect`]: SQL syntax strategy for SQLite
//!
//! # Connection String
//!
//! ```text
//! sqlite:///absolute/path/app.db?mode=rwc
//! sqlite::memory:
//! ```
//!
//! Staging tables are ordinary tables in the target's schema. SQLite DDL is
//! transactional, so a rollback also removes the staging table.

mod dialect;

pub use dialect::SqliteDialect;
