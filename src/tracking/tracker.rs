//! Tracker interface and run records

use crate::error::{DiamondError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use super::{FileTracker, HttpTracker};

/// Status of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
    Killed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
            RunStatus::Killed => "KILLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single logged metric value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub key: String,
    pub value: f64,
    pub step: u64,
    pub timestamp: DateTime<Utc>,
}

/// A run within an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub run_name: String,
    pub experiment_id: String,
    pub experiment_name: String,
    pub status: RunStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub params: BTreeMap<String, String>,
    /// Latest value per key
    pub metrics: BTreeMap<String, f64>,
    pub metrics_history: Vec<Metric>,
    /// Artifact paths relative to the run's artifact root
    pub artifacts: Vec<String>,
    /// `models:/<name>/<version>` for every registration made from this run
    pub registered_models: Vec<String>,
}

impl RunRecord {
    pub fn new(run_id: String, run_name: String, experiment_id: String, experiment_name: String) -> Self {
        Self {
            run_id,
            run_name,
            experiment_id,
            experiment_name,
            status: RunStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            params: BTreeMap::new(),
            metrics: BTreeMap::new(),
            metrics_history: Vec::new(),
            artifacts: Vec::new(),
            registered_models: Vec::new(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status.is_terminal()
    }

    /// Error if the run no longer accepts writes
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(DiamondError::ValidationError(format!(
                "run {} is already {}",
                self.run_id, self.status
            )));
        }
        Ok(())
    }

    pub fn duration_secs(&self) -> f64 {
        let end = self.end_time.unwrap_or_else(Utc::now);
        (end - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}

/// Experiment tracker backend.
///
/// Parameters and metrics overwrite by key and artifacts are de-duplicated,
/// so repeating a call is harmless. Writes to a closed run are rejected.
pub trait Tracker: Send {
    /// Open a run in `experiment`, creating the experiment if needed
    fn start_run(&mut self, experiment: &str, run_name: Option<&str>) -> Result<String>;

    fn log_param(&mut self, run_id: &str, key: &str, value: &str) -> Result<()>;

    fn log_metric(&mut self, run_id: &str, key: &str, value: f64) -> Result<()>;

    /// Store a copy of the file at `path` under `artifact_dir`
    fn log_artifact(&mut self, run_id: &str, path: &Path, artifact_dir: &str) -> Result<()>;

    /// Register the logged artifact as a new model version, returning the version
    fn register_model(
        &mut self,
        run_id: &str,
        artifact_path: &Path,
        name: &str,
        alias: Option<&str>,
    ) -> Result<u32>;

    fn end_run(&mut self, run_id: &str, status: RunStatus) -> Result<()>;

    /// Human-readable location of the store
    fn uri(&self) -> String;
}

/// Parsed tracking location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingUri {
    /// Local directory (`file:<dir>`, `file://<dir>` or a bare path)
    File(PathBuf),
    /// MLflow tracking server base URL
    Http(String),
}

impl TrackingUri {
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(DiamondError::ConfigError("tracking URI is empty".to_string()));
        }
        if uri.starts_with("http://") || uri.starts_with("https://") {
            return Ok(TrackingUri::Http(uri.trim_end_matches('/').to_string()));
        }
        if let Some(rest) = uri.strip_prefix("file:") {
            let path = rest.strip_prefix("//").unwrap_or(rest);
            if path.is_empty() {
                return Err(DiamondError::ConfigError(format!("tracking URI '{}' has no path", uri)));
            }
            return Ok(TrackingUri::File(PathBuf::from(path)));
        }
        if let Some((scheme, _)) = uri.split_once("://") {
            return Err(DiamondError::ConfigError(format!(
                "unsupported tracking URI scheme '{}'",
                scheme
            )));
        }
        Ok(TrackingUri::File(PathBuf::from(uri)))
    }

    /// Open the backend for this URI
    pub fn connect(&self) -> Result<Box<dyn Tracker>> {
        match self {
            TrackingUri::File(root) => Ok(Box::new(FileTracker::open(root)?)),
            TrackingUri::Http(base) => Ok(Box::new(HttpTracker::new(base)?)),
        }
    }
}

impl fmt::Display for TrackingUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingUri::File(p) => write!(f, "file:{}", p.display()),
            TrackingUri::Http(u) => f.write_str(u),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_uris() {
        assert_eq!(
            TrackingUri::parse("file:./mlruns").unwrap(),
            TrackingUri::File(PathBuf::from("./mlruns"))
        );
        assert_eq!(
            TrackingUri::parse("file:///tmp/mlruns").unwrap(),
            TrackingUri::File(PathBuf::from("/tmp/mlruns"))
        );
        assert_eq!(
            TrackingUri::parse("mlruns").unwrap(),
            TrackingUri::File(PathBuf::from("mlruns"))
        );
    }

    #[test]
    fn test_parse_http_uri() {
        assert_eq!(
            TrackingUri::parse("http://localhost:5000/").unwrap(),
            TrackingUri::Http("http://localhost:5000".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_unknown_scheme() {
        assert!(TrackingUri::parse("databricks://workspace").is_err());
        assert!(TrackingUri::parse("").is_err());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&RunStatus::Finished).unwrap(), "\"FINISHED\"");
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }

    #[test]
    fn test_closed_run_rejects_writes() {
        let mut run = RunRecord::new("r".into(), "n".into(), "0".into(), "e".into());
        assert!(run.ensure_open().is_ok());
        run.status = RunStatus::Finished;
        assert!(run.ensure_open().is_err());
    }
}
