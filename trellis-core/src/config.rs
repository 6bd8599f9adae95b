//! Runtime Configuration
//!
//! The runtime has very few knobs. They are grouped in [`RuntimeConfig`] so
//! a host application can load them alongside its own settings.

use serde::{Deserialize, Serialize};

use crate::error::{ReactiveError, Result};

/// Default limit for nested emissions.
pub const DEFAULT_MAX_EMIT_DEPTH: usize = 128;

/// Settings for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How deeply emissions may nest before the runtime treats the chain as
    /// a cycle and aborts it.
    ///
    /// Every `set` made from inside an observer opens one more level.
    pub max_emit_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_emit_depth: DEFAULT_MAX_EMIT_DEPTH,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.max_emit_depth == 0 {
            return Err(ReactiveError::InvalidConfig(
                "max_emit_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_emit_depth, DEFAULT_MAX_EMIT_DEPTH);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn from_json_fills_missing_fields() {
        let config = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());

        let config = RuntimeConfig::from_json(r#"{"max_emit_depth": 8}"#).unwrap();
        assert_eq!(config.max_emit_depth, 8);
    }

    #[test]
    fn zero_depth_is_rejected() {
        let err = RuntimeConfig::from_json(r#"{"max_emit_depth": 0}"#).unwrap_err();
        assert!(matches!(err, ReactiveError::InvalidConfig(_)));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = RuntimeConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ReactiveError::ConfigParse(_)));
    }
}
