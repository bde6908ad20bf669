//! Aggregate engine configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    core::history::HistoryConfig, runtime::handle::RuntimeConfig,
    segment::orchestrator::OrchestratorConfig,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid engine config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Every tunable of the engine in one place. Missing sections and fields
/// take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub history: HistoryConfig,
    pub orchestrator: OrchestratorConfig,
    pub runtime: RuntimeConfig,
}

impl EngineConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = EngineConfig::from_json_str(r#"{"history":{"max_depth":5}}"#).unwrap();
        assert_eq!(cfg.history.max_depth, 5);
        assert_eq!(cfg.orchestrator, OrchestratorConfig::default());
        assert_eq!(cfg.runtime.command_queue_bound, 256);
    }

    #[test]
    fn empty_object_is_default() {
        assert_eq!(EngineConfig::from_json_str("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            EngineConfig::from_json_str("{\"history\":"),
            Err(ConfigError::Json(_))
        ));
    }
}
