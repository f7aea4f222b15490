// Engine configuration

use serde::{Deserialize, Serialize};

use crate::error::{DbError, Result};

/// Session-level knobs for planning and execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on rows per batch emitted by operators that build new
    /// batches (aggregate, sort, nested-loop join).
    pub batch_size_rows: usize,
    /// Maximum number of optimizer rule passes before giving up on a fixpoint.
    pub max_optimizer_passes: usize,
    /// When false, the unoptimized plan is executed as built.
    pub enable_optimizer: bool,
    /// Longest accepted table name.
    pub max_identifier_length: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size_rows: 8192,
            max_optimizer_passes: 8,
            enable_optimizer: true,
            max_identifier_length: 255,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(text).map_err(|e| DbError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size_rows == 0 {
            return Err(DbError::InvalidConfig(
                "batch_size_rows must be greater than zero".to_string(),
            ));
        }
        if self.max_identifier_length == 0 {
            return Err(DbError::InvalidConfig(
                "max_identifier_length must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
