//! Configuration types for the propagation engine

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Default values
pub mod defaults {
    /// Ceiling on node evaluations within a single propagation pass
    pub const MAX_EVALUATIONS_PER_PASS: usize = 1024;
    /// Values arriving through a connection do not promote the target control
    pub const PROMOTE_ON_CONNECTION_SYNC: bool = false;
}

/// Propagation engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Hard bound on evaluations per pass, on top of the rule that a control
    /// is written at most once per pass
    pub max_evaluations_per_pass: usize,
    /// Whether a connection sync promotes the receiving control in the
    /// receiving node's priorities, as a direct edit would
    pub promote_on_connection_sync: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_evaluations_per_pass: defaults::MAX_EVALUATIONS_PER_PASS,
            promote_on_connection_sync: defaults::PROMOTE_ON_CONNECTION_SYNC,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_evaluations_per_pass == 0 {
            return Err(EngineError::InvalidConfig(
                "maxEvaluationsPerPass must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_max_evaluations_per_pass(mut self, max: usize) -> Self {
        self.max_evaluations_per_pass = max;
        self
    }

    pub fn with_promote_on_connection_sync(mut self, promote: bool) -> Self {
        self.promote_on_connection_sync = promote;
        self
    }
}
