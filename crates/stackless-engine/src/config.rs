//! Engine configuration (stackless.toml)

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::runtime::with_state;
use crate::transform::OracleKind;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub transform: TransformConfig,
}

/// Runtime state settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RuntimeConfig {
    /// Maximum number of frame records on the logical stack; unbounded if unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth_limit: Option<usize>,
}

/// Transformer settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformConfig {
    pub oracle: OracleKind,
}

impl Config {
    /// Parse from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Apply the runtime settings to this thread's state
    pub fn apply(&self) {
        with_state(|s| s.set_depth_limit(self.runtime.depth_limit));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.runtime.depth_limit, None);
        assert_eq!(config.transform.oracle, OracleKind::CallGraph);
    }

    #[test]
    fn test_parse() {
        let config = Config::parse(
            r#"
[runtime]
depth-limit = 64

[transform]
oracle = "all-calls"
"#,
        )
        .unwrap();
        assert_eq!(config.runtime.depth_limit, Some(64));
        assert_eq!(config.transform.oracle, OracleKind::AllCalls);
    }

    #[test]
    fn test_unknown_oracle_rejected() {
        let err = Config::parse("[transform]\noracle = \"maybe\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
