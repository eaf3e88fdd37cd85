use crate::config::types::{CoordinatorError, Result, TimeLimits};
use crate::config::validator::validate_limits;
use crate::protocol::InitialParameters;
/// Configuration loading from JSON
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything a coordinator needs besides the isolate itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub limits: TimeLimits,
    /// Seed handed to the guest on instantiate
    #[serde(default)]
    pub rng_seed: u64,
    /// Game parameters offered to the guest on instantiate
    #[serde(default = "default_params")]
    pub params: InitialParameters,
}

/// Layout version the built-in bots understand.
pub const PARAMS_VERSION: u16 = 7;

fn default_params() -> InitialParameters {
    InitialParameters {
        params_version: PARAMS_VERSION,
        engine_version_major: 0,
        engine_version_minor: 1,
        engine_version_patch: 0,
        diagonal_movement: true,
        player_stride: 1,
        player_open_reach: 1,
    }
}

impl CoordinatorConfig {
    pub fn new(limits: TimeLimits, rng_seed: u64) -> Self {
        Self {
            limits,
            rng_seed,
            params: default_params(),
        }
    }

    /// Parse and validate configuration from a JSON document
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: CoordinatorConfig = serde_json::from_str(content)
            .map_err(|e| CoordinatorError::Config(format!("Failed to parse config JSON: {}", e)))?;
        validate_limits(&config.limits)?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            CoordinatorError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_json_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    const SAMPLE: &str = r#"{
        "limits": {
            "setup_time_limit_ms": 2000,
            "tick_warn_time_limit_ms": 50,
            "tick_kill_time_limit_ms": 500,
            "minimum_tick_time_ms": 5,
            "max_strikes": 3
        },
        "rng_seed": 42
    }"#;

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = CoordinatorConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.rng_seed, 42);
        assert_eq!(config.limits.tick_kill_time_limit, Duration::from_millis(500));
    }

    #[test]
    fn test_seed_defaults_to_zero() {
        let trimmed = SAMPLE.replace(",\n        \"rng_seed\": 42", "");
        let config = CoordinatorConfig::from_json_str(&trimmed).unwrap();
        assert_eq!(config.rng_seed, 0);
        assert_eq!(config.params.params_version, PARAMS_VERSION);
        assert!(config.params.diagonal_movement);
    }

    #[test]
    fn test_params_override() {
        let with_params = SAMPLE.replace(
            "\"rng_seed\": 42",
            r#""rng_seed": 42,
        "params": {
            "params_version": 7,
            "engine_version_major": 1,
            "engine_version_minor": 2,
            "engine_version_patch": 3,
            "diagonal_movement": false,
            "player_stride": 2,
            "player_open_reach": 1
        }"#,
        );
        let config = CoordinatorConfig::from_json_str(&with_params).unwrap();
        assert!(!config.params.diagonal_movement);
        assert_eq!(config.params.player_stride, 2);
        assert_eq!(config.params.engine_version_patch, 3);
    }

    #[test]
    fn test_invalid_limits_fail_to_load() {
        let broken = SAMPLE.replace("\"max_strikes\": 3", "\"max_strikes\": 0");
        assert!(matches!(
            CoordinatorConfig::from_json_str(&broken),
            Err(CoordinatorError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = CoordinatorConfig::from_json_file("/nonexistent/botbox.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
