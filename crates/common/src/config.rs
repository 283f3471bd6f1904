//! Common configuration types for room controller components.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors produced by the shared configuration helpers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigValueError {
    #[error("Invalid boolean for {name}: {value}")]
    InvalidBool { name: String, value: String },
}

/// Parse a boolean flag from an environment value.
///
/// Accepts `true`/`false`, `1`/`0`, `yes`/`no` (case-insensitive).
///
/// # Errors
///
/// Returns `ConfigValueError::InvalidBool` for anything else.
pub fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigValueError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigValueError::InvalidBool {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl ObservabilityConfig {
    /// Read `{prefix}_JSON_LOGS` from `vars`, defaulting to plain-text logs.
    ///
    /// # Errors
    ///
    /// Returns `ConfigValueError::InvalidBool` if the flag is not a boolean.
    pub fn from_vars(
        vars: &HashMap<String, String>,
        prefix: &str,
    ) -> Result<Self, ConfigValueError> {
        let name = format!("{prefix}_JSON_LOGS");
        let json_logs = match vars.get(&name) {
            Some(value) => parse_bool(&name, value)?,
            None => false,
        };
        Ok(Self { json_logs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_variants() {
        assert_eq!(parse_bool("X", "TRUE"), Ok(true));
        assert_eq!(parse_bool("X", " 0 "), Ok(false));
        assert_eq!(parse_bool("X", "yes"), Ok(true));
        assert!(matches!(
            parse_bool("X", "maybe"),
            Err(ConfigValueError::InvalidBool { .. })
        ));
    }

    #[test]
    fn test_observability_defaults_to_plain_logs() {
        let config = ObservabilityConfig::from_vars(&HashMap::new(), "RC");
        assert_eq!(config, Ok(ObservabilityConfig { json_logs: false }));
    }

    #[test]
    fn test_observability_reads_prefixed_flag() {
        let vars = HashMap::from([("RC_JSON_LOGS".to_string(), "true".to_string())]);
        let config = ObservabilityConfig::from_vars(&vars, "RC");
        assert_eq!(config, Ok(ObservabilityConfig { json_logs: true }));
    }
}
