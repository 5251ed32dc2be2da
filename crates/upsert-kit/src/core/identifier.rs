//! Identifier validation and quoting.
//!
//! Table and column names cannot be bound as statement parameters, so every
//! identifier that reaches generated SQL is validated here first and then quoted
//! with the engine's quoting rules. Values are always bound, never inlined.

use crate::error::{Result, UpsertError};

/// Maximum identifier length accepted from callers.
/// - PostgreSQL: 63 bytes
/// - MySQL: 64 characters
/// - SQLite: unlimited
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Length generated staging names are fitted to, so they stay valid on PostgreSQL.
pub const MAX_STAGING_NAME_LENGTH: usize = 63;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing NUL bytes and identifiers
/// exceeding [`MAX_IDENTIFIER_LENGTH`].
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(UpsertError::Configuration(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(UpsertError::Configuration(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(UpsertError::Configuration(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote an identifier with double quotes (SQLite, PostgreSQL).
///
/// Embedded double quotes are doubled.
pub fn quote_double(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a MySQL identifier using backticks.
///
/// Embedded backticks are doubled.
pub fn quote_backtick(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Cut `name` to at most `max_bytes` bytes without splitting a UTF-8 character.
pub fn fit_identifier(name: &str, max_bytes: usize) -> &str {
    if name.len() <= max_bytes {
        return name;
    }
    let mut end = max_bytes;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}
