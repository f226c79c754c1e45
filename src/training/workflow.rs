//! Training workflow: split, build, fit, evaluate, persist, log
//!
//! Stages run strictly in order. A failure before [`WorkflowStage::Persisted`]
//! aborts the run with no artifact written. Once the artifact exists, tracker
//! failures are downgraded to warnings and reported in the result.

use super::config::TrainingConfig;
use super::metrics::RegressionMetrics;
use super::pipeline::build_model_with_seed;
use crate::data::{split_features_target, train_test_split};
use crate::error::{DiamondError, Result};
use crate::export::{save_pipeline, PipelineArtifact, TrainingParams};
use crate::preprocessing::FeatureSchema;
use crate::tracking::{RunStatus, Tracker};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Artifact directory name used when logging the model to the tracker
pub const ARTIFACT_DIR: &str = "exported_model";

/// Stages of one training invocation, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkflowStage {
    Initialized,
    Split,
    Built,
    Fitted,
    Evaluated,
    Persisted,
    Logged,
}

/// Outcome of a training invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    /// `None` when the tracker could not open a run
    pub run_id: Option<String>,
    pub metrics: RegressionMetrics,
    pub model_path: PathBuf,
    pub n_train: usize,
    pub n_test: usize,
    pub final_stage: WorkflowStage,
    /// Tracker failure, if logging did not complete
    pub tracking_error: Option<String>,
    pub registered_version: Option<u32>,
    pub elapsed_secs: f64,
}

/// Runs the training stages for one configuration
#[derive(Debug, Clone)]
pub struct TrainingWorkflow {
    config: TrainingConfig,
    schema: FeatureSchema,
    stage: WorkflowStage,
}

impl TrainingWorkflow {
    pub fn new(config: TrainingConfig) -> Self {
        Self::with_schema(config, FeatureSchema::diamonds())
    }

    pub fn with_schema(config: TrainingConfig, schema: FeatureSchema) -> Self {
        Self {
            config,
            schema,
            stage: WorkflowStage::Initialized,
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Last stage reached
    pub fn stage(&self) -> WorkflowStage {
        self.stage
    }

    fn advance(&mut self, stage: WorkflowStage) {
        self.stage = stage;
        info!(stage = ?stage, "Training stage complete");
    }

    /// Train on `dataset` (features plus `price`) and log the run to `tracker`
    pub fn run(&mut self, dataset: &DataFrame, tracker: &mut dyn Tracker) -> Result<TrainingReport> {
        let start = Instant::now();
        self.stage = WorkflowStage::Initialized;
        self.config.validate()?;

        let (features, target) = split_features_target(dataset)?;
        let split = train_test_split(
            &features,
            &target,
            self.config.test_size,
            self.config.random_state,
        )?;
        let n_train = split.x_train.height();
        let n_test = split.x_test.height();
        self.advance(WorkflowStage::Split);

        let mut pipeline = build_model_with_seed(
            &self.schema,
            &split.x_train,
            self.config.max_depth,
            self.config.random_state,
        )?;
        self.advance(WorkflowStage::Built);

        pipeline.fit(&split.x_train, &split.y_train)?;
        self.advance(WorkflowStage::Fitted);

        let predictions = pipeline.predict(&split.x_test)?;
        let metrics = RegressionMetrics::compute(&split.y_test, &predictions)?;
        info!(
            mae = metrics.mae,
            rmse = metrics.rmse,
            r2 = metrics.r2,
            "Evaluated on held-out partition"
        );
        self.advance(WorkflowStage::Evaluated);

        let params = TrainingParams {
            max_depth: self.config.max_depth,
            test_size: self.config.test_size,
            random_state: self.config.random_state,
            n_train,
            n_test,
        };
        let artifact = PipelineArtifact::new(pipeline, params, Some(metrics));
        save_pipeline(&self.config.model_path, &artifact)?;
        self.advance(WorkflowStage::Persisted);

        let mut report = TrainingReport {
            run_id: None,
            metrics,
            model_path: self.config.model_path.clone(),
            n_train,
            n_test,
            final_stage: WorkflowStage::Persisted,
            tracking_error: None,
            registered_version: None,
            elapsed_secs: 0.0,
        };

        match self.log_run(tracker, &metrics, n_train, n_test, &mut report) {
            Ok(()) => {
                self.advance(WorkflowStage::Logged);
                report.final_stage = WorkflowStage::Logged;
            }
            Err(e) => {
                warn!(
                    error = %e,
                    tracker = %tracker.uri(),
                    model_path = %self.config.model_path.display(),
                    "Experiment tracking failed; artifact was saved"
                );
                if let Some(run_id) = &report.run_id {
                    if let Err(close_err) = tracker.end_run(run_id, RunStatus::Failed) {
                        warn!(error = %close_err, run_id = %run_id, "Could not mark run as failed");
                    }
                }
                report.tracking_error = Some(e.to_string());
            }
        }

        report.elapsed_secs = start.elapsed().as_secs_f64();
        Ok(report)
    }

    fn log_run(
        &self,
        tracker: &mut dyn Tracker,
        metrics: &RegressionMetrics,
        n_train: usize,
        n_test: usize,
        report: &mut TrainingReport,
    ) -> Result<()> {
        let run_id = tracker.start_run(&self.config.experiment_name, self.config.run_name.as_deref())?;
        report.run_id = Some(run_id.clone());

        for (key, value) in self.config.params() {
            tracker.log_param(&run_id, key, &value)?;
        }
        tracker.log_param(&run_id, "n_train", &n_train.to_string())?;
        tracker.log_param(&run_id, "n_test", &n_test.to_string())?;

        for (key, value) in metrics.as_pairs() {
            tracker.log_metric(&run_id, key, value)?;
        }

        let model_path: &Path = &self.config.model_path;
        tracker.log_artifact(&run_id, model_path, ARTIFACT_DIR)?;

        if let Some(name) = &self.config.register_model {
            let version = tracker.register_model(&run_id, model_path, name, Some(&self.config.alias))?;
            info!(model = %name, version, alias = %self.config.alias, "Registered model");
            report.registered_version = Some(version);
        }

        tracker.end_run(&run_id, RunStatus::Finished)?;
        info!(run_id = %run_id, tracker = %tracker.uri(), "Logged training run");
        Ok(())
    }
}

/// Convenience wrapper: train with `config`, logging to the tracker its URI names
pub fn train(config: TrainingConfig, dataset: &DataFrame) -> Result<TrainingReport> {
    let tracker = crate::tracking::TrackingUri::parse(&config.tracking_uri).and_then(|uri| uri.connect());
    let mut workflow = TrainingWorkflow::new(config);
    match tracker {
        Ok(mut tracker) => workflow.run(dataset, tracker.as_mut()),
        Err(e) => {
            // Train anyway; the run is reported as not logged
            warn!(error = %e, "Tracker unavailable, training without logging");
            let mut offline = Unavailable(e.to_string());
            workflow.run(dataset, &mut offline)
        }
    }
}

/// Stand-in used when the configured tracker cannot be reached at all
struct Unavailable(String);

impl Tracker for Unavailable {
    fn start_run(&mut self, _experiment: &str, _run_name: Option<&str>) -> Result<String> {
        Err(DiamondError::TrackerUnavailable(self.0.clone()))
    }

    fn log_param(&mut self, _run_id: &str, _key: &str, _value: &str) -> Result<()> {
        Err(DiamondError::TrackerUnavailable(self.0.clone()))
    }

    fn log_metric(&mut self, _run_id: &str, _key: &str, _value: f64) -> Result<()> {
        Err(DiamondError::TrackerUnavailable(self.0.clone()))
    }

    fn log_artifact(&mut self, _run_id: &str, _path: &Path, _artifact_dir: &str) -> Result<()> {
        Err(DiamondError::TrackerUnavailable(self.0.clone()))
    }

    fn register_model(&mut self, _run_id: &str, _path: &Path, _name: &str, _alias: Option<&str>) -> Result<u32> {
        Err(DiamondError::TrackerUnavailable(self.0.clone()))
    }

    fn end_run(&mut self, _run_id: &str, _status: RunStatus) -> Result<()> {
        Err(DiamondError::TrackerUnavailable(self.0.clone()))
    }

    fn uri(&self) -> String {
        "unavailable".to_string()
    }
}
