//! Configuration loading and validation.
//!
//! ```yaml
//! database:
//!   url: "postgres://app:secret@db:5432/main"
//!   max_connections: 4
//!   acquire_timeout_secs: 30
//! staging:
//!   prefix: temp
//! load:
//!   max_rows_per_statement: 1000
//! ```

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl UpsertConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: UpsertConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}
