//! Configuration validation.

use super::UpsertConfig;
use crate::core::identifier::validate_identifier;
use crate::drivers::DialectImpl;
use crate::error::{Result, UpsertError};

/// Validate the configuration.
pub fn validate(config: &UpsertConfig) -> Result<()> {
    if config.database.url.is_empty() {
        return Err(UpsertError::Configuration("database.url is required".into()));
    }
    DialectImpl::from_url(&config.database.url)?;

    if config.database.max_connections == 0 {
        return Err(UpsertError::Configuration(
            "database.max_connections must be at least 1".into(),
        ));
    }
    if config.database.acquire_timeout_secs == 0 {
        return Err(UpsertError::Configuration(
            "database.acquire_timeout_secs must be at least 1".into(),
        ));
    }

    validate_identifier(&config.staging.prefix).map_err(|e| {
        UpsertError::Configuration(format!("staging.prefix is not a valid identifier: {}", e))
    })?;
    if let Some(schema) = &config.staging.schema {
        validate_identifier(schema).map_err(|e| {
            UpsertError::Configuration(format!("staging.schema is not a valid identifier: {}", e))
        })?;
    }

    if config.load.max_rows_per_statement == 0 {
        return Err(UpsertError::Configuration(
            "load.max_rows_per_statement must be at least 1".into(),
        ));
    }

    Ok(())
}
