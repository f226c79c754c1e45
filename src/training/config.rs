//! Training configuration

use crate::error::{DiamondError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_MAX_DEPTH: usize = 5;
pub const DEFAULT_TEST_SIZE: f64 = 0.2;
pub const DEFAULT_RANDOM_STATE: u64 = 42;
pub const DEFAULT_TRACKING_URI: &str = "file:./mlruns";
pub const DEFAULT_EXPERIMENT: &str = "diamond_price_experiment";
pub const DEFAULT_MODEL_PATH: &str = "models/diamond_price_model.bin";
pub const DEFAULT_DATA_PATH: &str = "data/diamonds.csv";
pub const DEFAULT_ALIAS: &str = "champion";

/// Parameters of one training invocation.
///
/// `Default` reads the environment, CLI flags override on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// `None` means unbounded
    pub max_depth: Option<usize>,
    pub test_size: f64,
    pub random_state: u64,
    pub tracking_uri: String,
    pub experiment_name: String,
    pub run_name: Option<String>,
    pub model_path: PathBuf,
    pub data_path: PathBuf,
    /// Register the artifact under this model name after logging
    pub register_model: Option<String>,
    pub alias: String,
}

impl Default for TrainingConfig {
    /// Malformed numeric settings are logged and replaced by their defaults
    fn default() -> Self {
        let (config, problems) = Self::from_lookup(|key| std::env::var(key).ok());
        for problem in &problems {
            warn!(error = %problem, "Ignoring training environment setting");
        }
        config
    }
}

impl TrainingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a key lookup; unparsable values fall back to defaults and are reported
    fn from_lookup<F>(lookup: F) -> (Self, Vec<DiamondError>)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut problems = Vec::new();

        let max_depth = match lookup("MAX_DEPTH") {
            Some(raw) => parse_max_depth(&raw).unwrap_or_else(|e| {
                problems.push(DiamondError::ConfigError(format!("MAX_DEPTH: {}", e)));
                Some(DEFAULT_MAX_DEPTH)
            }),
            None => Some(DEFAULT_MAX_DEPTH),
        };
        let test_size = env_number(&lookup, "TEST_SIZE", DEFAULT_TEST_SIZE, &mut problems);
        let random_state = env_number(&lookup, "RANDOM_STATE", DEFAULT_RANDOM_STATE, &mut problems);

        let config = Self {
            max_depth,
            test_size,
            random_state,
            tracking_uri: lookup("MLFLOW_TRACKING_URI").unwrap_or_else(|| DEFAULT_TRACKING_URI.to_string()),
            experiment_name: lookup("MLFLOW_EXPERIMENT_NAME").unwrap_or_else(|| DEFAULT_EXPERIMENT.to_string()),
            run_name: None,
            model_path: lookup("MODEL_OUTPUT_PATH")
                .unwrap_or_else(|| DEFAULT_MODEL_PATH.to_string())
                .into(),
            data_path: lookup("DIAMONDS_DATA_PATH")
                .unwrap_or_else(|| DEFAULT_DATA_PATH.to_string())
                .into(),
            register_model: None,
            alias: DEFAULT_ALIAS.to_string(),
        };
        (config, problems)
    }

    pub fn with_max_depth(mut self, max_depth: Option<usize>) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_tracking_uri(mut self, uri: impl Into<String>) -> Self {
        self.tracking_uri = uri.into();
        self
    }

    pub fn with_experiment(mut self, name: impl Into<String>) -> Self {
        self.experiment_name = name.into();
        self
    }

    pub fn with_model_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model_path = path.into();
        self
    }

    pub fn with_register_model(mut self, name: Option<String>) -> Self {
        self.register_model = name;
        self
    }

    /// Reject parameter values the workflow cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == Some(0) {
            return Err(DiamondError::InvalidParameter {
                name: "max_depth".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1 or unbounded".to_string(),
            });
        }
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(DiamondError::InvalidParameter {
                name: "test_size".to_string(),
                value: self.test_size.to_string(),
                reason: "must be strictly between 0 and 1".to_string(),
            });
        }
        if self.experiment_name.trim().is_empty() {
            return Err(DiamondError::ConfigError("experiment name is empty".to_string()));
        }
        Ok(())
    }

    /// Parameters logged to the tracker, in logging order
    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("max_depth", format_max_depth(self.max_depth)),
            ("test_size", self.test_size.to_string()),
            ("random_state", self.random_state.to_string()),
            ("tracking_uri", self.tracking_uri.clone()),
        ]
    }
}

/// Parse a depth given as a positive integer or `unbounded`/`none`
pub fn parse_max_depth(s: &str) -> Result<Option<usize>> {
    let trimmed = s.trim();
    if trimmed.eq_ignore_ascii_case("unbounded") || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    match trimmed.parse::<usize>() {
        Ok(0) | Err(_) => Err(DiamondError::InvalidParameter {
            name: "max_depth".to_string(),
            value: trimmed.to_string(),
            reason: "expected a positive integer or 'unbounded'".to_string(),
        }),
        Ok(d) => Ok(Some(d)),
    }
}

pub fn format_max_depth(depth: Option<usize>) -> String {
    depth.map_or_else(|| "None".to_string(), |d| d.to_string())
}

fn env_number<F, T>(lookup: &F, key: &str, default: T, problems: &mut Vec<DiamondError>) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            problems.push(DiamondError::ConfigError(format!("{} = '{}' is not a valid number", key, raw)));
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_max_depth() {
        assert_eq!(parse_max_depth("5").unwrap(), Some(5));
        assert_eq!(parse_max_depth("unbounded").unwrap(), None);
        assert_eq!(parse_max_depth("None").unwrap(), None);
        assert!(parse_max_depth("0").is_err());
        assert!(parse_max_depth("-3").is_err());
    }

    #[test]
    fn test_malformed_env_values_are_reported() {
        let env = |key: &str| match key {
            "MAX_DEPTH" => Some("0".to_string()),
            "TEST_SIZE" => Some("abc".to_string()),
            "RANDOM_STATE" => Some("7".to_string()),
            _ => None,
        };
        let (config, problems) = TrainingConfig::from_lookup(env);
        assert_eq!(config.max_depth, Some(DEFAULT_MAX_DEPTH));
        assert_eq!(config.test_size, DEFAULT_TEST_SIZE);
        assert_eq!(config.random_state, 7);
        assert_eq!(problems.len(), 2);
        assert!(problems.iter().all(|p| matches!(p, DiamondError::ConfigError(_))));
        assert!(problems[1].to_string().contains("TEST_SIZE"));
    }

    #[test]
    fn test_clean_env_has_no_problems() {
        let (config, problems) = TrainingConfig::from_lookup(|_| None);
        assert!(problems.is_empty());
        assert_eq!(config.max_depth, Some(DEFAULT_MAX_DEPTH));
        assert_eq!(config.tracking_uri, DEFAULT_TRACKING_URI);
    }

    #[test]
    fn test_validate_test_size() {
        let config = TrainingConfig::new().with_test_size(1.0);
        assert!(matches!(config.validate(), Err(DiamondError::InvalidParameter { .. })));
        let config = TrainingConfig::new().with_test_size(0.25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_params_order() {
        let config = TrainingConfig::new()
            .with_max_depth(None)
            .with_tracking_uri("file:/tmp/x");
        let params = config.params();
        assert_eq!(params[0], ("max_depth", "None".to_string()));
        assert_eq!(params[3].1, "file:/tmp/x");
    }
}
