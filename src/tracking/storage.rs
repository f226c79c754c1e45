//! Local file system tracking store
//!
//! Layout under the root:
//! ```text
//! experiments.json                      experiment name -> record
//! <experiment_id>/<run_id>/run.json     RunRecord
//! <experiment_id>/<run_id>/artifacts/   copied artifact files
//! registry/                             model registry
//! ```

use crate::error::{DiamondError, Result};
use crate::export::{write_atomic, ModelRegistry, ModelUri};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::tracker::{Metric, RunRecord, RunStatus, Tracker};

/// Entry of `experiments.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub experiment_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Tracker writing JSON run records to a local directory
#[derive(Debug)]
pub struct FileTracker {
    root: PathBuf,
    /// run_id -> run directory, for runs started by this instance
    run_dirs: HashMap<String, PathBuf>,
}

fn unavailable(context: &str, err: impl std::fmt::Display) -> DiamondError {
    DiamondError::TrackerUnavailable(format!("{}: {}", context, err))
}

impl FileTracker {
    /// Open (and create) the store at `root`
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .map_err(|e| unavailable(&format!("cannot create tracking store {}", root.display()), e))?;
        Ok(Self {
            root,
            run_dirs: HashMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry_dir(&self) -> PathBuf {
        self.root.join("registry")
    }

    fn experiments_file(&self) -> PathBuf {
        self.root.join("experiments.json")
    }

    pub fn list_experiments(&self) -> Result<BTreeMap<String, ExperimentRecord>> {
        let path = self.experiments_file();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let bytes = fs::read(&path).map_err(|e| unavailable("cannot read experiments.json", e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn get_or_create_experiment(&self, name: &str) -> Result<ExperimentRecord> {
        let mut experiments = self.list_experiments()?;
        if let Some(existing) = experiments.get(name) {
            return Ok(existing.clone());
        }

        let next_id = experiments
            .values()
            .filter_map(|e| e.experiment_id.parse::<u64>().ok())
            .max()
            .map_or(0, |m| m + 1);
        let record = ExperimentRecord {
            experiment_id: next_id.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };
        experiments.insert(name.to_string(), record.clone());

        let bytes = serde_json::to_vec_pretty(&experiments)?;
        write_atomic(&self.experiments_file(), &bytes)
            .map_err(|e| unavailable("cannot write experiments.json", e))?;
        debug!(experiment = name, experiment_id = %record.experiment_id, "Created experiment");
        Ok(record)
    }

    fn run_dir(&self, run_id: &str) -> Result<PathBuf> {
        if let Some(dir) = self.run_dirs.get(run_id) {
            return Ok(dir.clone());
        }
        // Runs started by another process: look through every experiment
        for exp in self.list_experiments()?.values() {
            let candidate = self.root.join(&exp.experiment_id).join(run_id);
            if candidate.join("run.json").exists() {
                return Ok(candidate);
            }
        }
        Err(DiamondError::ValidationError(format!("unknown run {}", run_id)))
    }

    pub fn get_run(&self, run_id: &str) -> Result<RunRecord> {
        let path = self.run_dir(run_id)?.join("run.json");
        let bytes = fs::read(&path).map_err(|e| unavailable(&format!("cannot read {}", path.display()), e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_run(&self, run: &RunRecord) -> Result<()> {
        let path = self.run_dir(&run.run_id)?.join("run.json");
        let bytes = serde_json::to_vec_pretty(run)?;
        write_atomic(&path, &bytes).map_err(|e| unavailable(&format!("cannot write {}", path.display()), e))
    }

    /// Load an open run, apply `f`, persist
    fn update_run<F>(&self, run_id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut RunRecord) -> Result<()>,
    {
        let mut run = self.get_run(run_id)?;
        run.ensure_open()?;
        f(&mut run)?;
        self.write_run(&run)
    }

    /// All runs of an experiment, newest first
    pub fn list_runs(&self, experiment: &str) -> Result<Vec<RunRecord>> {
        let experiments = self.list_experiments()?;
        let Some(exp) = experiments.get(experiment) else {
            return Ok(Vec::new());
        };
        let exp_dir = self.root.join(&exp.experiment_id);
        if !exp_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        for entry in fs::read_dir(&exp_dir)? {
            let path = entry?.path().join("run.json");
            if path.exists() {
                let bytes = fs::read(&path)?;
                runs.push(serde_json::from_slice::<RunRecord>(&bytes)?);
            }
        }
        runs.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(runs)
    }
}

impl Tracker for FileTracker {
    fn start_run(&mut self, experiment: &str, run_name: Option<&str>) -> Result<String> {
        let exp = self.get_or_create_experiment(experiment)?;
        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let run_name = run_name
            .map(str::to_string)
            .unwrap_or_else(|| format!("run-{}", Utc::now().format("%Y%m%d-%H%M%S")));

        let dir = self.root.join(&exp.experiment_id).join(&run_id);
        fs::create_dir_all(&dir).map_err(|e| unavailable(&format!("cannot create {}", dir.display()), e))?;
        self.run_dirs.insert(run_id.clone(), dir);

        let run = RunRecord::new(run_id.clone(), run_name, exp.experiment_id, exp.name);
        self.write_run(&run)?;
        debug!(run_id = %run_id, experiment, "Started run");
        Ok(run_id)
    }

    fn log_param(&mut self, run_id: &str, key: &str, value: &str) -> Result<()> {
        self.update_run(run_id, |run| {
            run.params.insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn log_metric(&mut self, run_id: &str, key: &str, value: f64) -> Result<()> {
        self.update_run(run_id, |run| {
            run.metrics.insert(key.to_string(), value);
            run.metrics_history.push(Metric {
                key: key.to_string(),
                value,
                step: 0,
                timestamp: Utc::now(),
            });
            Ok(())
        })
    }

    fn log_artifact(&mut self, run_id: &str, path: &Path, artifact_dir: &str) -> Result<()> {
        let file_name = path
            .file_name()
            .ok_or_else(|| DiamondError::ValidationError(format!("{} is not a file", path.display())))?
            .to_string_lossy()
            .into_owned();
        let relative = if artifact_dir.is_empty() {
            file_name
        } else {
            format!("{}/{}", artifact_dir.trim_matches('/'), file_name)
        };
        let dest = self.run_dir(run_id)?.join("artifacts").join(&relative);

        self.update_run(run_id, |run| {
            let bytes = fs::read(path)?;
            write_atomic(&dest, &bytes).map_err(|e| unavailable(&format!("cannot write {}", dest.display()), e))?;
            if !run.artifacts.contains(&relative) {
                run.artifacts.push(relative.clone());
            }
            Ok(())
        })
    }

    fn register_model(
        &mut self,
        run_id: &str,
        artifact_path: &Path,
        name: &str,
        alias: Option<&str>,
    ) -> Result<u32> {
        let mut registry = ModelRegistry::open(self.registry_dir())?;
        let version = registry.register(name, artifact_path, Some(run_id))?;
        if let Some(alias) = alias {
            registry.set_alias(name, alias, version)?;
        }

        let uri = ModelUri::Version {
            name: name.to_string(),
            version,
        }
        .to_string();
        self.update_run(run_id, |run| {
            run.registered_models.push(uri);
            Ok(())
        })?;
        Ok(version)
    }

    fn end_run(&mut self, run_id: &str, status: RunStatus) -> Result<()> {
        self.update_run(run_id, |run| {
            run.status = status;
            run.end_time = Some(Utc::now());
            Ok(())
        })?;
        debug!(run_id, %status, "Ended run");
        Ok(())
    }

    fn uri(&self) -> String {
        format!("file:{}", self.root.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = FileTracker::open(dir.path()).unwrap();

        let run_id = tracker.start_run("exp", Some("first")).unwrap();
        tracker.log_param(&run_id, "max_depth", "5").unwrap();
        tracker.log_param(&run_id, "max_depth", "3").unwrap();
        tracker.log_metric(&run_id, "mae", 12.5).unwrap();
        tracker.end_run(&run_id, RunStatus::Finished).unwrap();

        let run = tracker.get_run(&run_id).unwrap();
        assert_eq!(run.run_name, "first");
        assert_eq!(run.params.get("max_depth").map(String::as_str), Some("3"));
        assert_eq!(run.metrics.get("mae"), Some(&12.5));
        assert_eq!(run.status, RunStatus::Finished);
        assert!(run.end_time.is_some());
    }

    #[test]
    fn test_closed_run_is_immutable() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = FileTracker::open(dir.path()).unwrap();
        let run_id = tracker.start_run("exp", None).unwrap();
        tracker.end_run(&run_id, RunStatus::Failed).unwrap();

        assert!(tracker.log_metric(&run_id, "mae", 1.0).is_err());
        assert!(tracker.end_run(&run_id, RunStatus::Finished).is_err());
        assert_eq!(tracker.get_run(&run_id).unwrap().status, RunStatus::Failed);
    }

    #[test]
    fn test_experiments_reused_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = FileTracker::open(dir.path()).unwrap();
        tracker.start_run("a", None).unwrap();
        tracker.start_run("b", None).unwrap();
        tracker.start_run("a", None).unwrap();

        let experiments = tracker.list_experiments().unwrap();
        assert_eq!(experiments.len(), 2);
        assert_eq!(experiments["a"].experiment_id, "0");
        assert_eq!(experiments["b"].experiment_id, "1");
        assert_eq!(tracker.list_runs("a").unwrap().len(), 2);
    }

    #[test]
    fn test_artifact_copied_once() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("model.bin");
        fs::write(&file, b"bytes").unwrap();

        let mut tracker = FileTracker::open(dir.path().join("store")).unwrap();
        let run_id = tracker.start_run("exp", None).unwrap();
        tracker.log_artifact(&run_id, &file, "exported_model").unwrap();
        tracker.log_artifact(&run_id, &file, "exported_model").unwrap();

        let run = tracker.get_run(&run_id).unwrap();
        assert_eq!(run.artifacts, vec!["exported_model/model.bin".to_string()]);
        let copied = tracker
            .run_dir(&run_id)
            .unwrap()
            .join("artifacts/exported_model/model.bin");
        assert_eq!(fs::read(copied).unwrap(), b"bytes");
    }

    #[test]
    fn test_run_found_by_fresh_instance() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = FileTracker::open(dir.path()).unwrap().start_run("exp", None).unwrap();
        let mut other = FileTracker::open(dir.path()).unwrap();
        other.end_run(&run_id, RunStatus::Finished).unwrap();
        assert_eq!(other.get_run(&run_id).unwrap().status, RunStatus::Finished);
    }

    #[test]
    fn test_unwritable_root() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let err = FileTracker::open(blocker.join("store")).unwrap_err();
        assert!(matches!(err, DiamondError::TrackerUnavailable(_)));
    }
}
