//! Core abstractions shared by every dialect.
//!
//! - [`schema`]: table and column descriptions
//! - [`value`]: SQL values, candidate records, key tuples
//! - [`identifier`]: identifier validation and quoting
//! - [`traits`]: the [`Dialect`] strategy and [`Statement`]
//!
//! Driver modules (`drivers/sqlite`, `drivers/postgres`, `drivers/mysql`)
//! implement [`Dialect`]; the upsert pipeline only talks to the trait.

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

// Re-export commonly used types for convenience
pub use schema::{Column, Table};
pub use traits::{Dialect, Statement};
pub use value::{KeyValue, Record, SqlValue};
