//! Host configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::Path;

use greenproof_types::{EngineConfig, Identity};

use crate::logging::LogFormat;
use crate::NodeError;

/// Configuration for a greenproof host.
///
/// Loaded from TOML via [`NodeConfig::from_toml_file`] or built in code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub log_format: LogFormat,

    /// Filter directive: "trace", "debug", "info", "warn", "error", or a
    /// full `EnvFilter` string.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Initial engine registers. Ignored for registers the store already holds.
    #[serde(default = "default_engine")]
    pub engine: EngineConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_engine() -> EngineConfig {
    EngineConfig::new(Identity::new("admin"))
}

impl NodeConfig {
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config
            .engine
            .validate()
            .map_err(|e| NodeError::Config(e.to_string()))?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            engine: default_engine(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use greenproof_types::{Category, PayoutMode};
    use std::io::Write;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string().expect("serializable");
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.log_format, LogFormat::Human);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.engine.verification.quorum_threshold, 3);
        assert_eq!(config.engine.reward.cooldown_blocks, 144);
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            log_format = "json"

            [engine]
            authority = "council"

            [engine.verification]
            quorum_threshold = 5

            [engine.reward]
            base_reward = 2500
            payout_mode = "mint"

            [[engine.reward.multipliers]]
            category = "organic"
            multiplier = 250
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.engine.authority, Identity::new("council"));
        assert_eq!(config.engine.verification.quorum_threshold, 5);
        assert_eq!(config.engine.verification.expiry_window, 52_560);
        assert_eq!(config.engine.reward.base_reward, 2_500);
        assert_eq!(config.engine.reward.payout_mode, PayoutMode::Mint);
        assert_eq!(config.engine.reward.multipliers.len(), 1);
        assert_eq!(config.engine.reward.multipliers[&Category::Organic], 250);
    }

    #[test]
    fn out_of_bounds_registers_are_rejected() {
        let toml = r#"
            [engine]
            authority = "council"

            [engine.verification]
            quorum_threshold = 11
        "#;
        assert!(matches!(
            NodeConfig::from_toml_str(toml),
            Err(NodeError::Config(_))
        ));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "log_level = \"debug\"").unwrap();
        let config = NodeConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/greenproof.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}
